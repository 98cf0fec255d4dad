// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `IdentityTable`: the unit of join (spec §4.6) — exactly one row with
//! no columns.

use std::sync::Arc;

use indexmap::IndexMap;

use super::{Query, Table};
use crate::error::{Error, Result};
use crate::evaluator::Args;
use crate::order_by::OrderBy;
use crate::row::{ColumnName, RowInfo};
use crate::scanner::{ArrayScanner, RowComparator, Scanner};
use crate::storage::Transaction;
use crate::updater::Updater;

pub struct IdentityTable<R> {
	row_info: RowInfo,
	factory: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R> IdentityTable<R> {
	pub fn new(factory: Arc<dyn Fn() -> R + Send + Sync>) -> Self {
		let row_info = RowInfo::build("identity", IndexMap::new(), IndexMap::new(), vec![], vec![])
			.expect("a zero-column row type is always a valid RowInfo");
		IdentityTable { row_info, factory }
	}
}

impl<R: Send + Sync + 'static> Table<R> for IdentityTable<R> {
	fn row_info(&self) -> &RowInfo {
		&self.row_info
	}

	fn has_primary_key(&self) -> bool {
		false
	}

	fn new_row(&self) -> R {
		(self.factory)()
	}

	fn clone_row(&self, _row: &R) -> R {
		(self.factory)()
	}

	fn unset_row(&self, _row: &mut R) {}
	fn clean_row(&self, _row: &mut R) {}
	fn copy_row(&self, _from: &R, _to: &mut R) {}

	fn is_set(&self, _row: &R) -> bool {
		true
	}

	fn for_each(&self, _row: &R, _visit: &mut dyn FnMut(&ColumnName, &[u8])) {}

	fn new_scanner(&self, row: R, _txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<R>>> {
		Ok(Box::new(ArrayScanner::new(vec![row])))
	}

	fn new_updater(&self, _row: R, _txn: &mut dyn Transaction) -> Result<Box<dyn Updater<R>>> {
		Err(Error::Unsupported("IdentityTable has no rows to modify".into()))
	}

	fn query(&self, spec: &str) -> Result<Box<dyn Query<R>>> {
		let trimmed = spec.trim();
		if !trimmed.is_empty() && trimmed != "{}" {
			return Err(Error::MalformedSpec {
				spec: spec.to_string(),
				reason: "IdentityTable accepts only the empty query".into(),
			});
		}
		Ok(Box::new(IdentityQuery { factory: self.factory.clone() }))
	}

	fn derive(&self, spec: &str, _args: Args) -> Result<Box<dyn Query<R>>> {
		self.query(spec)
	}

	fn distinct(&self) -> Box<dyn Query<R>> {
		Box::new(IdentityQuery { factory: self.factory.clone() })
	}

	fn try_load(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<Option<R>> {
		Ok(Some((self.factory)()))
	}

	fn exists(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<bool> {
		Ok(true)
	}

	fn is_empty(&self, _txn: &mut dyn Transaction) -> Result<bool> {
		Ok(false)
	}

	fn is_closed(&self) -> bool {
		false
	}

	fn close(&self) -> Result<()> {
		Ok(())
	}

	fn comparator(&self, _spec: &OrderBy) -> Arc<dyn RowComparator<R>> {
		Arc::new(|_: &R, _: &R| std::cmp::Ordering::Equal)
	}
}

pub struct IdentityQuery<R> {
	factory: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R: Send + Sync + 'static> Query<R> for IdentityQuery<R> {
	fn argument_count(&self) -> usize {
		0
	}

	fn new_scanner(&self, row: R, _txn: &mut dyn Transaction, _args: &Args) -> Result<Box<dyn Scanner<R>>> {
		Ok(Box::new(ArrayScanner::new(vec![row])))
	}

	fn any_rows(&self, _txn: &mut dyn Transaction, _args: &Args) -> Result<bool> {
		Ok(true)
	}

	fn delete_all(&self, _txn: &mut dyn Transaction, _args: &Args) -> Result<u64> {
		Err(Error::Unsupported("IdentityTable rows cannot be deleted".into()))
	}

	fn scanner_plan(&self, _args: &Args) -> String {
		"Identity".into()
	}

	fn updater_plan(&self, _args: &Args) -> String {
		"Identity".into()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_shot_scanner_yields_one_row_then_stops() {
		let table: IdentityTable<()> = IdentityTable::new(Arc::new(|| ()));
		let mut txn = crate::testkit::FakeTransaction::new();
		let mut scanner = table.new_scanner((), &mut txn).unwrap();
		assert_eq!(scanner.row(), Some(&()));
		assert_eq!(scanner.step().unwrap(), None);
	}

	#[test]
	fn try_load_and_exists_are_always_true() {
		let table: IdentityTable<()> = IdentityTable::new(Arc::new(|| ()));
		let mut txn = crate::testkit::FakeTransaction::new();
		assert!(table.try_load(&mut txn, b"anything").unwrap().is_some());
		assert!(table.exists(&mut txn, b"anything").unwrap());
	}

	#[test]
	fn new_updater_is_unsupported() {
		let table: IdentityTable<()> = IdentityTable::new(Arc::new(|| ()));
		let mut txn = crate::testkit::FakeTransaction::new();
		assert!(matches!(table.new_updater((), &mut txn), Err(Error::Unsupported(_))));
	}
}
