// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `ConcatTable`: the static composer over several sources presenting
//! the same row type (spec §4.5). Picks `ConcatQuery` when the query
//! spec has no order-by clause, `MergeQuery` otherwise.

use std::sync::Arc;

use super::{MultiSourceTable, Query, Table};
use crate::error::Result;
use crate::evaluator::Args;
use crate::order_by::OrderBy;
use crate::row::{ColumnName, RowInfo};
use crate::scanner::{ConcatScanner, MergeScanner, RowComparator, Scanner};
use crate::storage::Transaction;
use crate::updater::{ConcatUpdater, MergeUpdater, Updater};

pub struct ConcatTable<R> {
	base: MultiSourceTable<R>,
}

impl<R: Send + Sync + 'static> ConcatTable<R> {
	/// Flattens any source that is itself a `ConcatTable` (spec §4.5)
	/// via [`Table::as_concat`], since a full `Any`-based downcast isn't
	/// available over an arbitrary `Table` implementation.
	pub fn new(sources: Vec<Arc<dyn Table<R>>>) -> Self {
		let mut flat = Vec::with_capacity(sources.len());
		for source in sources {
			match source.as_concat() {
				Some(nested) => flat.extend(nested.base.sources().iter().cloned()),
				None => flat.push(source),
			}
		}
		ConcatTable { base: MultiSourceTable::new(flat) }
	}
}

impl<R: Send + Sync + 'static> Table<R> for ConcatTable<R> {
	fn row_info(&self) -> &RowInfo {
		self.base.row_info()
	}

	fn has_primary_key(&self) -> bool {
		self.base.has_primary_key()
	}

	fn new_row(&self) -> R {
		self.base.new_row()
	}

	fn clone_row(&self, row: &R) -> R {
		self.base.clone_row(row)
	}

	fn unset_row(&self, row: &mut R) {
		self.base.unset_row(row)
	}

	fn clean_row(&self, row: &mut R) {
		self.base.clean_row(row)
	}

	fn copy_row(&self, from: &R, to: &mut R) {
		self.base.copy_row(from, to)
	}

	fn is_set(&self, row: &R) -> bool {
		self.base.is_set(row)
	}

	fn for_each(&self, row: &R, visit: &mut dyn FnMut(&ColumnName, &[u8])) {
		self.base.for_each(row, visit)
	}

	fn new_scanner(&self, row: R, txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<R>>> {
		self.query("")?.new_scanner(row, txn, &Vec::new())
	}

	fn new_updater(&self, row: R, txn: &mut dyn Transaction) -> Result<Box<dyn Updater<R>>> {
		self.query("")?.new_updater(row, txn, &Vec::new())
	}

	fn query(&self, spec: &str) -> Result<Box<dyn Query<R>>> {
		let order = OrderBy::for_spec(self.row_info(), spec)?;
		if order.is_empty() {
			Ok(Box::new(ConcatQuery { tables: self.base.sources().to_vec(), spec: spec.to_string() }))
		} else {
			let comparator = self.comparator(&order);
			Ok(Box::new(MergeQuery { tables: self.base.sources().to_vec(), spec: spec.to_string(), comparator }))
		}
	}

	fn derive(&self, spec: &str, _args: Args) -> Result<Box<dyn Query<R>>> {
		self.query(spec)
	}

	fn distinct(&self) -> Box<dyn Query<R>> {
		Box::new(ConcatQuery { tables: self.base.sources().to_vec(), spec: String::new() })
	}

	fn try_load(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<Option<R>> {
		self.base.try_load(txn, key)
	}

	fn exists(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<bool> {
		self.base.exists(txn, key)
	}

	fn is_empty(&self, txn: &mut dyn Transaction) -> Result<bool> {
		Ok(!self.base.any_rows(txn, "")?)
	}

	fn is_closed(&self) -> bool {
		self.base.is_closed()
	}

	fn close(&self) -> Result<()> {
		self.base.close()
	}

	fn comparator(&self, spec: &OrderBy) -> Arc<dyn RowComparator<R>> {
		self.base.comparator(spec)
	}

	fn as_concat(&self) -> Option<&ConcatTable<R>> {
		Some(self)
	}
}

/// Chains each source's own query left to right (spec §4.5
/// `ConcatQuery`). Built for the caller's query spec on every call
/// rather than cached, since this layer has no query-factory cache of
/// its own (see `cache` module for that concern).
pub struct ConcatQuery<R> {
	tables: Vec<Arc<dyn Table<R>>>,
	spec: String,
}

impl<R: Send + Sync + 'static> ConcatQuery<R> {
	fn built(&self) -> Result<Vec<Box<dyn Query<R>>>> {
		self.tables.iter().map(|t| t.query(&self.spec)).collect()
	}
}

impl<R: Send + Sync + 'static> Query<R> for ConcatQuery<R> {
	fn argument_count(&self) -> usize {
		0
	}

	fn new_scanner(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Scanner<R>>> {
		let _ = row;
		let queries = self.built()?;
		let mut scanners = Vec::with_capacity(queries.len());
		for (table, query) in self.tables.iter().zip(queries.iter()) {
			scanners.push(query.new_scanner(table.new_row(), txn, args)?);
		}
		Ok(Box::new(ConcatScanner::new(scanners)?))
	}

	fn new_updater(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Updater<R>>> {
		let _ = row;
		let queries = self.built()?;
		let mut updaters = Vec::with_capacity(queries.len());
		for (table, query) in self.tables.iter().zip(queries.iter()) {
			updaters.push(query.new_updater(table.new_row(), txn, args)?);
		}
		Ok(Box::new(ConcatUpdater::new(updaters)?))
	}

	fn any_rows(&self, txn: &mut dyn Transaction, args: &Args) -> Result<bool> {
		for query in self.built()? {
			if query.any_rows(txn, args)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Enters a nested transaction scope and sums per-source counts,
	/// committing on success (spec §4.5 `ConcatQuery.deleteAll`).
	fn delete_all(&self, txn: &mut dyn Transaction, args: &Args) -> Result<u64> {
		txn.enter()?;
		let result = self.delete_all_body(txn, args);
		match result {
			Ok(total) => {
				txn.commit()?;
				txn.exit()?;
				Ok(total)
			}
			Err(e) => {
				let _ = txn.exit();
				Err(e)
			}
		}
	}

	fn scanner_plan(&self, args: &Args) -> String {
		let parts =
			self.built().map(|qs| qs.iter().map(|q| q.scanner_plan(args)).collect::<Vec<_>>()).unwrap_or_default();
		format!("Concat({})", parts.join(", "))
	}

	fn updater_plan(&self, args: &Args) -> String {
		let parts =
			self.built().map(|qs| qs.iter().map(|q| q.updater_plan(args)).collect::<Vec<_>>()).unwrap_or_default();
		format!("Concat({})", parts.join(", "))
	}
}

impl<R: Send + Sync + 'static> ConcatQuery<R> {
	fn delete_all_body(&self, txn: &mut dyn Transaction, args: &Args) -> Result<u64> {
		let mut total = 0u64;
		for query in self.built()? {
			total = total.saturating_add(query.delete_all(txn, args)?);
		}
		Ok(total)
	}
}

/// Binary-tree merge over each source's own query, driven by a row
/// comparator (spec §4.5 `MergeQuery`). Chosen over `ConcatQuery` when
/// the bound query spec carries an order-by clause.
pub struct MergeQuery<R> {
	tables: Vec<Arc<dyn Table<R>>>,
	spec: String,
	comparator: Arc<dyn RowComparator<R>>,
}

impl<R: Send + Sync + 'static> MergeQuery<R> {
	fn built(&self) -> Result<Vec<Box<dyn Query<R>>>> {
		self.tables.iter().map(|t| t.query(&self.spec)).collect()
	}
}

impl<R: Send + Sync + 'static> Query<R> for MergeQuery<R> {
	fn argument_count(&self) -> usize {
		0
	}

	fn new_scanner(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Scanner<R>>> {
		let _ = row;
		let queries = self.built()?;
		let mut scanners = Vec::with_capacity(queries.len());
		for (table, query) in self.tables.iter().zip(queries.iter()) {
			scanners.push(query.new_scanner(table.new_row(), txn, args)?);
		}
		Ok(Box::new(MergeScanner::new(scanners, self.comparator.clone())?))
	}

	fn new_updater(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Updater<R>>> {
		let _ = row;
		let queries = self.built()?;
		let mut updaters = Vec::with_capacity(queries.len());
		for (table, query) in self.tables.iter().zip(queries.iter()) {
			updaters.push(query.new_updater(table.new_row(), txn, args)?);
		}
		Ok(Box::new(MergeUpdater::new(updaters, self.comparator.clone())))
	}

	fn any_rows(&self, txn: &mut dyn Transaction, args: &Args) -> Result<bool> {
		for query in self.built()? {
			if query.any_rows(txn, args)? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn delete_all(&self, txn: &mut dyn Transaction, args: &Args) -> Result<u64> {
		txn.enter()?;
		let result = self.delete_all_body(txn, args);
		match result {
			Ok(total) => {
				txn.commit()?;
				txn.exit()?;
				Ok(total)
			}
			Err(e) => {
				let _ = txn.exit();
				Err(e)
			}
		}
	}

	fn scanner_plan(&self, args: &Args) -> String {
		let parts =
			self.built().map(|qs| qs.iter().map(|q| q.scanner_plan(args)).collect::<Vec<_>>()).unwrap_or_default();
		format!("Merge({})", parts.join(", "))
	}

	fn updater_plan(&self, args: &Args) -> String {
		let parts =
			self.built().map(|qs| qs.iter().map(|q| q.updater_plan(args)).collect::<Vec<_>>()).unwrap_or_default();
		format!("Merge({})", parts.join(", "))
	}
}

impl<R: Send + Sync + 'static> MergeQuery<R> {
	fn delete_all_body(&self, txn: &mut dyn Transaction, args: &Args) -> Result<u64> {
		let mut total = 0u64;
		for query in self.built()? {
			total = total.saturating_add(query.delete_all(txn, args)?);
		}
		Ok(total)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::table::IdentityTable;

	#[test]
	fn flattens_nested_concat_tables() {
		let leaf_a: Arc<dyn Table<()>> = Arc::new(IdentityTable::new(Arc::new(|| ())));
		let leaf_b: Arc<dyn Table<()>> = Arc::new(IdentityTable::new(Arc::new(|| ())));
		let inner = Arc::new(ConcatTable::new(vec![leaf_a, leaf_b]));
		let leaf_c: Arc<dyn Table<()>> = Arc::new(IdentityTable::new(Arc::new(|| ())));
		let outer = ConcatTable::new(vec![inner, leaf_c]);
		assert_eq!(outer.base.sources().len(), 3);
	}

	#[test]
	fn no_order_by_yields_a_concat_query() {
		let a: Arc<dyn Table<()>> = Arc::new(IdentityTable::new(Arc::new(|| ())));
		let b: Arc<dyn Table<()>> = Arc::new(IdentityTable::new(Arc::new(|| ())));
		let table = ConcatTable::new(vec![a, b]);
		let mut txn = crate::testkit::FakeTransaction::new();
		let query = table.query("").unwrap();
		let mut scanner = query.new_scanner((), &mut txn, &Vec::new()).unwrap();
		let mut count = if scanner.row().is_some() { 1 } else { 0 };
		while scanner.step().unwrap().is_some() {
			count += 1;
		}
		assert_eq!(count, 2);
	}
}
