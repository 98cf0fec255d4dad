// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `AutoCommitUpdater` (spec §4.3 variant table: "commits after every
//! store/delete; commits and exits scope on close; releases freshly
//! acquired locks on step-over").

use std::sync::Arc;

use super::non_repeatable::{NonRepeatableDiscipline, NonRepeatableUpdater};
use super::Updater;
use crate::controller::ScanController;
use crate::error::Result;
use crate::scanner::Scanner;
use crate::storage::{Index, RowPredicateLock, Transaction, View};
use crate::trigger::Trigger;

/// Caps `BasicUpdater`'s internal skip-set so a long auto-committed scan
/// with many key-changing updates doesn't grow it unboundedly. Past this,
/// `update` fails rather than evicting an entry and risking the
/// re-observation the skip-set exists to prevent (spec.md §9 defers the
/// temp-index spill alternative; see DESIGN.md).
const DEFAULT_SKIP_CAP: usize = 4096;

/// Wraps [`NonRepeatableUpdater`] to commit the surrounding transaction
/// after every mutation, and on close, rather than leaving the caller to
/// do so (spec §4.3). Composition, not a discipline, because the commit
/// needs to happen *around* `update`/`delete` themselves, not just around
/// `to_first`/`to_next`.
pub struct AutoCommitUpdater<'txn, R> {
	inner: NonRepeatableUpdater<'txn, R>,
}

impl<'txn, R> AutoCommitUpdater<'txn, R> {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		view: Arc<dyn View>,
		index: Arc<dyn Index>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		trigger: Option<Arc<Trigger<R>>>,
		predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
		seed: R,
	) -> Result<Self> {
		// Brackets the updater's whole lifetime in a nested scope so
		// `close` has one to commit and exit (spec §4.3).
		txn.enter()?;
		let mut inner = crate::updater::BasicUpdater::with_discipline(
			view,
			index,
			txn,
			controller,
			trigger,
			predicate_lock,
			seed,
			NonRepeatableDiscipline,
		)?;
		inner.set_skip_cap(DEFAULT_SKIP_CAP);
		Ok(AutoCommitUpdater { inner })
	}
}

impl<'txn, R> Scanner<R> for AutoCommitUpdater<'txn, R> {
	fn row(&self) -> Option<&R> {
		self.inner.row()
	}

	fn step(&mut self) -> Result<Option<&R>> {
		self.inner.step()
	}

	fn close(&mut self) -> Result<()> {
		self.inner.txn_mut().commit()?;
		self.inner.txn_mut().exit()?;
		self.inner.close()
	}

	fn estimate_size(&self) -> u64 {
		self.inner.estimate_size()
	}

	fn characteristics(&self) -> u32 {
		self.inner.characteristics()
	}
}

impl<'txn, R> Updater<R> for AutoCommitUpdater<'txn, R> {
	fn update(&mut self, row: R) -> Result<()> {
		self.inner.update(row)?;
		self.inner.txn_mut().commit()
	}

	fn delete(&mut self) -> Result<()> {
		self.inner.delete()?;
		self.inner.txn_mut().commit()
	}
}
