// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `MultiSourceTable`: the shared row-shape logic behind composite
//! tables with more than one backing source (spec §4.5). Rust has no
//! inheritance, so this is a struct `ConcatTable` composes rather than
//! a base class it extends.

use std::sync::Arc;

use super::Table;
use crate::error::{Error, Result};
use crate::order_by::OrderBy;
use crate::row::{ColumnName, RowInfo};
use crate::scanner::RowComparator;
use crate::storage::Transaction;

/// Delegates the row-shape methods (`newRow`, `cloneRow`, `copyRow`,
/// `isSet`, `forEach`, `unsetRow`, `cleanRow`) to the first source; all
/// sources must present the same row type (spec §4.5). `tryLoad`/`exists` fail
/// with `ViewConstraint` since no single source owns "the" row for an
/// arbitrary key; `anyRows` short-circuits across sources.
pub struct MultiSourceTable<R> {
	sources: Vec<Arc<dyn Table<R>>>,
}

impl<R> MultiSourceTable<R> {
	pub fn new(sources: Vec<Arc<dyn Table<R>>>) -> Self {
		assert!(!sources.is_empty(), "MultiSourceTable needs at least one source");
		MultiSourceTable { sources }
	}

	pub fn sources(&self) -> &[Arc<dyn Table<R>>] {
		&self.sources
	}

	fn first(&self) -> &dyn Table<R> {
		self.sources[0].as_ref()
	}

	pub fn row_info(&self) -> &RowInfo {
		self.first().row_info()
	}

	pub fn has_primary_key(&self) -> bool {
		self.first().has_primary_key()
	}

	pub fn new_row(&self) -> R {
		self.first().new_row()
	}

	pub fn clone_row(&self, row: &R) -> R {
		self.first().clone_row(row)
	}

	pub fn unset_row(&self, row: &mut R) {
		self.first().unset_row(row)
	}

	pub fn clean_row(&self, row: &mut R) {
		self.first().clean_row(row)
	}

	pub fn copy_row(&self, from: &R, to: &mut R) {
		self.first().copy_row(from, to)
	}

	pub fn is_set(&self, row: &R) -> bool {
		self.first().is_set(row)
	}

	pub fn for_each(&self, row: &R, visit: &mut dyn FnMut(&ColumnName, &[u8])) {
		self.first().for_each(row, visit)
	}

	pub fn comparator(&self, spec: &OrderBy) -> Arc<dyn RowComparator<R>> {
		self.first().comparator(spec)
	}

	pub fn try_load(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<Option<R>> {
		Err(Error::ViewConstraint("tryLoad is not defined over a multi-source table".into()))
	}

	pub fn exists(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<bool> {
		Err(Error::ViewConstraint("exists is not defined over a multi-source table".into()))
	}

	/// Short-circuited OR across sources (spec §4.5).
	pub fn any_rows(&self, txn: &mut dyn Transaction, spec: &str) -> Result<bool> {
		for source in &self.sources {
			if source.query(spec)?.any_rows(txn, &Vec::new())? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	pub fn is_closed(&self) -> bool {
		self.sources.iter().any(|s| s.is_closed())
	}

	pub fn close(&self) -> Result<()> {
		let mut first_err = None;
		for source in &self.sources {
			if let Err(e) = source.close() {
				first_err.get_or_insert(e);
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}
