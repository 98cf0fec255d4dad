// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `Table`/`Query`, the surface exposed to clients (spec §6), and the
//! composed table shapes spec §4.5-4.6 names directly. A concrete
//! single-source table over one row type is generated per row type by
//! the (out-of-scope, spec §1) row-class codegen; this module provides
//! the trait that generated code implements plus the composite shapes
//! (`IdentityTable`, `EmptyTable`, `MultiSourceTable`, `ConcatTable`)
//! that are table-shape logic rather than per-row-type codegen.

mod concat;
mod empty;
mod identity;
mod multi_source;

pub use concat::{ConcatQuery, ConcatTable, MergeQuery};
pub use empty::{EmptyQuery, EmptyTable};
pub use identity::{IdentityQuery, IdentityTable};
pub use multi_source::MultiSourceTable;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::evaluator::Args;
use crate::order_by::OrderBy;
use crate::row::{ColumnName, RowInfo};
use crate::scanner::{RowComparator, Scanner};
use crate::storage::Transaction;
use crate::updater::Updater;

/// Exposed to clients (spec §6): row shape plus query construction over
/// one logical row type.
pub trait Table<R>: Send + Sync {
	fn row_info(&self) -> &RowInfo;
	fn has_primary_key(&self) -> bool;

	fn new_row(&self) -> R;
	fn clone_row(&self, row: &R) -> R;
	fn unset_row(&self, row: &mut R);
	fn clean_row(&self, row: &mut R);
	fn copy_row(&self, from: &R, to: &mut R);
	fn is_set(&self, row: &R) -> bool;

	/// Visits every column currently set on `row`, in declaration order
	/// (spec §4.5, §6). Column encoding is a per-row-type codegen concern
	/// (spec §1); this only lets generic tooling walk a row's columns
	/// without depending on the concrete row type's fields.
	fn for_each(&self, row: &R, visit: &mut dyn FnMut(&ColumnName, &[u8]));

	fn new_scanner(&self, row: R, txn: &mut dyn Transaction) -> Result<Box<dyn Scanner<R>>>;

	/// Fails with `Unsupported` unless overridden (spec §4.6: `IdentityTable`
	/// always fails here; most derived/composite tables do too).
	fn new_updater(&self, row: R, txn: &mut dyn Transaction) -> Result<Box<dyn Updater<R>>> {
		let _ = (row, txn);
		Err(Error::Unsupported("newUpdater".into()))
	}

	fn query(&self, spec: &str) -> Result<Box<dyn Query<R>>>;
	fn derive(&self, spec: &str, args: Args) -> Result<Box<dyn Query<R>>>;
	fn distinct(&self) -> Box<dyn Query<R>>;

	fn try_load(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<Option<R>>;
	fn exists(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<bool> {
		Ok(self.try_load(txn, key)?.is_some())
	}

	fn is_empty(&self, txn: &mut dyn Transaction) -> Result<bool>;
	fn is_closed(&self) -> bool;
	fn close(&self) -> Result<()>;

	fn comparator(&self, spec: &OrderBy) -> Arc<dyn RowComparator<R>>;

	/// Lets `ConcatTable::new` detect and flatten nested concat sources
	/// (spec §4.5: "on construction it flattens any source that is
	/// itself a `ConcatTable` with the same target row type") without a
	/// full `Any`-based downcast over every `Table` implementation.
	fn as_concat(&self) -> Option<&ConcatTable<R>> {
		None
	}
}

/// Exposed to clients (spec §6): a bound query plan over a `Table`.
pub trait Query<R>: Send + Sync {
	fn argument_count(&self) -> usize;

	fn new_scanner(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Scanner<R>>>;

	fn new_updater(&self, row: R, txn: &mut dyn Transaction, args: &Args) -> Result<Box<dyn Updater<R>>> {
		let _ = (row, txn, args);
		Err(Error::Unsupported("newUpdater".into()))
	}

	fn any_rows(&self, txn: &mut dyn Transaction, args: &Args) -> Result<bool>;

	fn delete_all(&self, txn: &mut dyn Transaction, args: &Args) -> Result<u64> {
		let _ = (txn, args);
		Err(Error::Unsupported("deleteAll".into()))
	}

	fn scanner_plan(&self, args: &Args) -> String;
	fn updater_plan(&self, args: &Args) -> String;
}
