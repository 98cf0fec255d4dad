// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `UpgradableUpdater` (spec §4.3 variant table: "temporarily switches to
//! upgradable-read mode around `toFirst`/`toNext`").

use std::sync::Arc;

use super::BasicUpdater;
use crate::controller::ScanController;
use crate::error::Result;
use crate::scanner::ScanDiscipline;
use crate::storage::{Cursor, Index, LockMode, RowPredicateLock, Transaction, View};
use crate::trigger::Trigger;

/// Brackets `to_first`/`to_next` with a switch to `LockMode::Upgradable`,
/// restoring whatever mode was active beforehand once the cursor has
/// moved (spec §4.3). An upgradable read lock lets the same transaction
/// later promote to exclusive for this updater's own store/delete
/// without a lock-upgrade conflict against itself.
#[derive(Default)]
pub struct UpgradableDiscipline;

impl<R> ScanDiscipline<R> for UpgradableDiscipline {
	fn to_first(&mut self, txn: &mut dyn Transaction, controller: &dyn ScanController<R>, cursor: &mut dyn Cursor) -> Result<()> {
		let previous = txn.set_lock_mode(LockMode::Upgradable);
		let result = controller.position_first(cursor);
		txn.set_lock_mode(previous);
		result
	}

	fn to_next(&mut self, txn: &mut dyn Transaction, controller: &dyn ScanController<R>, cursor: &mut dyn Cursor) -> Result<()> {
		let previous = txn.set_lock_mode(LockMode::Upgradable);
		let result = if controller.is_reverse() { cursor.previous() } else { cursor.next() };
		txn.set_lock_mode(previous);
		result
	}
}

/// `BasicUpdater` wired with [`UpgradableDiscipline`] (spec §4.3).
pub type UpgradableUpdater<'txn, R> = BasicUpdater<'txn, R, UpgradableDiscipline>;

impl<'txn, R> UpgradableUpdater<'txn, R> {
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
		BasicUpdater::with_discipline(view, index, txn, controller, trigger, predicate_lock, seed, UpgradableDiscipline)
	}
}
