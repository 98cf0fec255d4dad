// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `EmptyTable`: wraps a table known to be empty by construction,
//! fixing its emptiness-reporting surface without re-probing storage,
//! while still validating queries against the wrapped table (spec §4.6).

use std::sync::Arc;

use super::{Query, Table};
use crate::error::Result;
use crate::evaluator::Args;
use crate::order_by::OrderBy;
use crate::row::{ColumnName, RowInfo};
use crate::scanner::{EmptyScanner, RowComparator, Scanner};
use crate::storage::Transaction;
use crate::updater::Updater;

pub struct EmptyTable<R> {
	inner: Box<dyn Table<R>>,
}

impl<R> EmptyTable<R> {
	pub fn new(inner: Box<dyn Table<R>>) -> Self {
		EmptyTable { inner }
	}
}

impl<R: Send + Sync + 'static> Table<R> for EmptyTable<R> {
	fn row_info(&self) -> &RowInfo {
		self.inner.row_info()
	}

	fn has_primary_key(&self) -> bool {
		self.inner.has_primary_key()
	}

	fn new_row(&self) -> R {
		self.inner.new_row()
	}

	fn clone_row(&self, row: &R) -> R {
		self.inner.clone_row(row)
	}

	fn unset_row(&self, row: &mut R) {
		self.inner.unset_row(row)
	}

	fn clean_row(&self, row: &mut R) {
		self.inner.clean_row(row)
	}

	fn copy_row(&self, from: &R, to: &mut R) {
		self.inner.copy_row(from, to)
	}

	fn is_set(&self, row: &R) -> bool {
		self.inner.is_set(row)
	}

	fn for_each(&self, row: &R, visit: &mut dyn FnMut(&ColumnName, &[u8])) {
		self.inner.for_each(row, visit)
	}

	fn new_scanner(&self, row: R, _txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<R>>> {
		let _ = row;
		Ok(Box::new(EmptyScanner::new()))
	}

	fn new_updater(&self, row: R, txn: &mut dyn Transaction) -> Result<Box<dyn Updater<R>>> {
		self.inner.new_updater(row, txn)
	}

	fn query(&self, spec: &str) -> Result<Box<dyn Query<R>>> {
		let inner = self.inner.query(spec)?;
		Ok(Box::new(EmptyQuery { inner }))
	}

	fn derive(&self, spec: &str, args: Args) -> Result<Box<dyn Query<R>>> {
		let inner = self.inner.derive(spec, args)?;
		Ok(Box::new(EmptyQuery { inner }))
	}

	fn distinct(&self) -> Box<dyn Query<R>> {
		Box::new(EmptyQuery { inner: self.inner.distinct() })
	}

	fn try_load(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<Option<R>> {
		Ok(None)
	}

	fn exists(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<bool> {
		Ok(false)
	}

	fn is_empty(&self, _txn: &mut dyn Transaction) -> Result<bool> {
		Ok(true)
	}

	fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	fn close(&self) -> Result<()> {
		self.inner.close()
	}

	fn comparator(&self, spec: &OrderBy) -> Arc<dyn RowComparator<R>> {
		self.inner.comparator(spec)
	}
}

pub struct EmptyQuery<R> {
	inner: Box<dyn Query<R>>,
}

impl<R: Send + Sync + 'static> Query<R> for EmptyQuery<R> {
	fn argument_count(&self) -> usize {
		self.inner.argument_count()
	}

	fn new_scanner(&self, row: R, _txn: &mut dyn Transaction, _args: &Args) -> Result<Box<dyn Scanner<R>>> {
		let _ = row;
		Ok(Box::new(EmptyScanner::new()))
	}

	fn any_rows(&self, _txn: &mut dyn Transaction, _args: &Args) -> Result<bool> {
		Ok(false)
	}

	fn delete_all(&self, _txn: &mut dyn Transaction, _args: &Args) -> Result<u64> {
		Ok(0)
	}

	fn scanner_plan(&self, args: &Args) -> String {
		format!("Empty({})", self.inner.scanner_plan(args))
	}

	fn updater_plan(&self, args: &Args) -> String {
		format!("Empty({})", self.inner.updater_plan(args))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::table::IdentityTable;

	#[test]
	fn reports_empty_regardless_of_the_wrapped_table() {
		let inner: Box<dyn Table<()>> = Box::new(IdentityTable::new(Arc::new(|| ())));
		let empty = EmptyTable::new(inner);
		let mut txn = crate::testkit::FakeTransaction::new();
		assert!(empty.is_empty(&mut txn).unwrap());
		assert_eq!(empty.try_load(&mut txn, b"k").unwrap(), None);
		assert!(!empty.exists(&mut txn, b"k").unwrap());
	}

	#[test]
	fn still_validates_query_specs_against_the_wrapped_table() {
		let inner: Box<dyn Table<()>> = Box::new(IdentityTable::new(Arc::new(|| ())));
		let empty = EmptyTable::new(inner);
		assert!(empty.query("not-the-empty-spec").is_err());
	}
}
