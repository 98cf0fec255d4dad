// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `StoredQueryLauncher`: dispatches a bound query spec against a table,
//! with the narrow retry spec §5/§7 describe — construction of the
//! scanner or updater is retried once, by refetching the query from the
//! table, on `ClosedIndex`/`LockFailure`; any other failure, and any
//! failure once a scanner/updater has already been handed back to the
//! caller, propagates unchanged (spec §9's "no retry on nothing written"
//! note — see DESIGN.md).

use std::sync::Arc;

use crate::error::Result;
use crate::evaluator::Args;
use crate::scanner::Scanner;
use crate::storage::Transaction;
use crate::table::{Query, Table};
use crate::updater::Updater;

pub struct StoredQueryLauncher<R> {
	table: Arc<dyn Table<R>>,
	spec: String,
	args: Args,
}

impl<R: Send + Sync + 'static> StoredQueryLauncher<R> {
	pub fn new(table: Arc<dyn Table<R>>, spec: impl Into<String>, args: Args) -> Self {
		StoredQueryLauncher { table, spec: spec.into(), args }
	}

	fn fetch(&self) -> Result<Box<dyn Query<R>>> {
		self.table.query(&self.spec)
	}

	#[tracing::instrument(level = "debug", skip(self, txn))]
	pub fn scan_read(&self, txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<R>>> {
		self.dispatch(txn, |launcher, row, txn, args| launcher.new_scanner(row, txn, args))
	}

	/// Builds the updater for this launcher's spec (spec §9 `scanWrite`).
	/// Once this call returns a live `Updater`, nothing here retries
	/// further: a `ClosedIndex`/`LockFailure` surfacing mid-scan, after
	/// rows may already have reached the caller, is rethrown unchanged
	/// rather than silently restarting the write.
	#[tracing::instrument(level = "debug", skip(self, txn))]
	pub fn scan_write(&self, txn: &mut dyn Transaction) -> Result<Box<dyn Updater<R>>> {
		self.dispatch(txn, |launcher, row, txn, args| launcher.new_updater(row, txn, args))
	}

	fn dispatch<T>(
		&self,
		txn: &mut dyn Transaction,
		op: impl Fn(&dyn Query<R>, R, &mut dyn Transaction, &Args) -> Result<T>,
	) -> Result<T> {
		let launcher = self.fetch()?;
		match op(launcher.as_ref(), self.table.new_row(), txn, &self.args) {
			Ok(v) => Ok(v),
			Err(e) if e.is_retryable() => {
				tracing::warn!(error = %e, "refetching launcher and retrying once");
				let launcher = self.fetch()?;
				op(launcher.as_ref(), self.table.new_row(), txn, &self.args)
			}
			Err(e) => Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	use super::*;
	use crate::error::Error;
	use crate::order_by::OrderBy;
	use crate::row::RowInfo;
	use crate::scanner::{ArrayScanner, RowComparator};
	use crate::table::Table;

	struct FlakyTable {
		query_attempts: Arc<AtomicUsize>,
		fail_kind: FailKind,
		row_info: RowInfo,
	}

	#[derive(Clone, Copy)]
	enum FailKind {
		ClosedIndexOnce,
		AlwaysUnsupported,
	}

	impl Table<i32> for FlakyTable {
		fn row_info(&self) -> &RowInfo {
			&self.row_info
		}
		fn has_primary_key(&self) -> bool {
			false
		}
		fn new_row(&self) -> i32 {
			0
		}
		fn clone_row(&self, row: &i32) -> i32 {
			*row
		}
		fn unset_row(&self, _row: &mut i32) {}
		fn clean_row(&self, _row: &mut i32) {}
		fn copy_row(&self, from: &i32, to: &mut i32) {
			*to = *from;
		}
		fn is_set(&self, _row: &i32) -> bool {
			true
		}
		fn for_each(&self, _row: &i32, _visit: &mut dyn FnMut(&crate::row::ColumnName, &[u8])) {}
		fn new_scanner(&self, row: i32, _txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<i32>>> {
			Ok(Box::new(ArrayScanner::new(vec![row])))
		}
		fn query(&self, _spec: &str) -> Result<Box<dyn Query<i32>>> {
			let attempt = self.query_attempts.fetch_add(1, Ordering::SeqCst);
			Ok(Box::new(FlakyQuery { fail_kind: self.fail_kind, already_failed_once: attempt > 0 }))
		}
		fn derive(&self, spec: &str, _args: Args) -> Result<Box<dyn Query<i32>>> {
			self.query(spec)
		}
		fn distinct(&self) -> Box<dyn Query<i32>> {
			self.query("").unwrap()
		}
		fn try_load(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<Option<i32>> {
			Ok(None)
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
		fn comparator(&self, _spec: &OrderBy) -> Arc<dyn RowComparator<i32>> {
			Arc::new(|a: &i32, b: &i32| a.cmp(b))
		}
	}

	struct FlakyQuery {
		fail_kind: FailKind,
		already_failed_once: bool,
	}

	impl Query<i32> for FlakyQuery {
		fn argument_count(&self) -> usize {
			0
		}
		fn new_scanner(&self, row: i32, _txn: &mut dyn Transaction, _args: &Args) -> Result<Box<dyn Scanner<i32>>> {
			match self.fail_kind {
				FailKind::ClosedIndexOnce if !self.already_failed_once => {
					Err(Error::ClosedIndex("stale launcher".into()))
				}
				FailKind::ClosedIndexOnce => Ok(Box::new(ArrayScanner::new(vec![row]))),
				FailKind::AlwaysUnsupported => Err(Error::Unsupported("never supported".into())),
			}
		}
		fn any_rows(&self, _txn: &mut dyn Transaction, _args: &Args) -> Result<bool> {
			Ok(true)
		}
		fn scanner_plan(&self, _args: &Args) -> String {
			"Flaky".into()
		}
		fn updater_plan(&self, _args: &Args) -> String {
			"Flaky".into()
		}
	}

	fn flaky_row_info() -> RowInfo {
		RowInfo::build("flaky", indexmap::IndexMap::new(), indexmap::IndexMap::new(), vec![], vec![]).unwrap()
	}

	#[test]
	fn retries_once_on_closed_index_then_succeeds() {
		let table: Arc<dyn Table<i32>> = Arc::new(FlakyTable {
			query_attempts: Arc::new(AtomicUsize::new(0)),
			fail_kind: FailKind::ClosedIndexOnce,
			row_info: flaky_row_info(),
		});
		let launcher = StoredQueryLauncher::new(table, "", Vec::new());
		let mut txn = crate::testkit::FakeTransaction::new();
		let scanner = launcher.scan_read(&mut txn).unwrap();
		assert_eq!(scanner.row(), Some(&0));
	}

	#[test]
	fn does_not_retry_non_retryable_errors() {
		let query_attempts = Arc::new(AtomicUsize::new(0));
		let table: Arc<dyn Table<i32>> = Arc::new(FlakyTable {
			query_attempts: query_attempts.clone(),
			fail_kind: FailKind::AlwaysUnsupported,
			row_info: flaky_row_info(),
		});
		let launcher = StoredQueryLauncher::new(table, "", Vec::new());
		let mut txn = crate::testkit::FakeTransaction::new();
		assert!(matches!(launcher.scan_read(&mut txn), Err(Error::Unsupported(_))));
		// only the single initial fetch ran `query()`, no refetch-and-retry.
		assert_eq!(query_attempts.load(Ordering::SeqCst), 1);
	}
}
