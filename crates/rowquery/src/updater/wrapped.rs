// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `WrappedUpdater` (spec §4.3 variant table: "drives updates through a
//! table's row-level API instead of an index cursor") and its
//! `EndCommit` variant (commits once, whenever the scan finishes —
//! normally, via error, or via an explicit close).

use std::sync::Arc;

use super::Updater;
use crate::error::Result;
use crate::scanner::{RowComparator, Scanner};

/// The row-level mutation surface of a higher-level table API (spec §6,
/// §4.6): unlike `Index`, it manages its own transaction and locking, so
/// `WrappedUpdater` doesn't need a `Transaction` handle of its own.
pub trait RowStore<R>: Send + Sync {
	fn store(&self, row: &R) -> Result<()>;
	fn delete(&self, row: &R) -> Result<()>;
}

/// Drives `update`/`delete` through a `RowStore` while delegating plain
/// iteration to a wrapped `Scanner` (spec §4.3, §4.6).
pub struct WrappedUpdater<R> {
	inner: Box<dyn Scanner<R>>,
	store: Arc<dyn RowStore<R>>,
}

impl<R> WrappedUpdater<R> {
	pub fn new(inner: Box<dyn Scanner<R>>, store: Arc<dyn RowStore<R>>) -> Self {
		WrappedUpdater { inner, store }
	}
}

impl<R> Scanner<R> for WrappedUpdater<R> {
	fn row(&self) -> Option<&R> {
		self.inner.row()
	}

	fn step(&mut self) -> Result<Option<&R>> {
		self.inner.step()
	}

	fn close(&mut self) -> Result<()> {
		self.inner.close()
	}

	fn estimate_size(&self) -> u64 {
		self.inner.estimate_size()
	}

	fn characteristics(&self) -> u32 {
		self.inner.characteristics()
	}

	fn get_comparator(&self) -> Result<Arc<dyn RowComparator<R>>> {
		self.inner.get_comparator()
	}
}

impl<R> Updater<R> for WrappedUpdater<R> {
	fn update(&mut self, row: R) -> Result<()> {
		self.store.store(&row)?;
		self.inner.step()?;
		Ok(())
	}

	fn delete(&mut self) -> Result<()> {
		if let Some(row) = self.inner.row() {
			self.store.delete(row)?;
		}
		self.inner.step()?;
		Ok(())
	}
}

/// Anything that can commit the transaction a `WrappedUpdater` is
/// mutating through (spec §4.3).
pub trait Committer: Send + Sync {
	fn commit(&self) -> Result<()>;
}

/// Wraps a `WrappedUpdater` to commit exactly once, whenever the scan
/// ends — normally (iteration exhausted), abnormally (an operation
/// returns `Err`), or explicitly (`close`) — whichever happens first
/// (spec §4.3 "commits on finish/throw/close").
pub struct EndCommit<R> {
	inner: WrappedUpdater<R>,
	committer: Arc<dyn Committer>,
	committed: bool,
}

impl<R> EndCommit<R> {
	pub fn new(inner: WrappedUpdater<R>, committer: Arc<dyn Committer>) -> Self {
		EndCommit { inner, committer, committed: false }
	}

	fn commit_once(&mut self) -> Result<()> {
		if self.committed {
			return Ok(());
		}
		self.committed = true;
		self.committer.commit()
	}
}

impl<R> Scanner<R> for EndCommit<R> {
	fn row(&self) -> Option<&R> {
		self.inner.row()
	}

	fn step(&mut self) -> Result<Option<&R>> {
		let result = self.inner.step();
		match result {
			Ok(Some(_)) => Ok(self.inner.row()),
			Ok(None) => {
				self.commit_once()?;
				Ok(None)
			}
			Err(e) => {
				let _ = self.commit_once();
				Err(e)
			}
		}
	}

	fn close(&mut self) -> Result<()> {
		let result = self.inner.close();
		let _ = self.commit_once();
		result
	}

	fn estimate_size(&self) -> u64 {
		self.inner.estimate_size()
	}

	fn characteristics(&self) -> u32 {
		self.inner.characteristics()
	}

	fn get_comparator(&self) -> Result<Arc<dyn RowComparator<R>>> {
		self.inner.get_comparator()
	}
}

impl<R> Updater<R> for EndCommit<R> {
	fn update(&mut self, row: R) -> Result<()> {
		let result = self.inner.update(row);
		if result.is_err() {
			let _ = self.commit_once();
		}
		result
	}

	fn delete(&mut self) -> Result<()> {
		let result = self.inner.delete();
		if result.is_err() {
			let _ = self.commit_once();
		}
		result
	}
}
