// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `NonRepeatableUpdater` (spec §4.3 variant table: same locking as
//! `UpgradableUpdater`, but additionally releases the row just stepped
//! past if this scan was the one that freshly acquired its lock).

use std::sync::Arc;

use super::BasicUpdater;
use crate::controller::ScanController;
use crate::error::Result;
use crate::scanner::ScanDiscipline;
use crate::storage::{Cursor, Index, LockMode, RowPredicateLock, Transaction, View};
use crate::trigger::Trigger;

/// Same upgradable-mode bracketing as [`super::upgradable::UpgradableDiscipline`],
/// plus releasing the row being left behind before moving off it — a scan
/// under this discipline never holds more than one row's lock at a time
/// beyond what `update`/`delete` itself needs (spec §4.3).
#[derive(Default)]
pub struct NonRepeatableDiscipline;

impl<R> ScanDiscipline<R> for NonRepeatableDiscipline {
	fn to_first(&mut self, txn: &mut dyn Transaction, controller: &dyn ScanController<R>, cursor: &mut dyn Cursor) -> Result<()> {
		let previous = txn.set_lock_mode(LockMode::Upgradable);
		let result = controller.position_first(cursor);
		txn.set_lock_mode(previous);
		result
	}

	fn to_next(&mut self, txn: &mut dyn Transaction, controller: &dyn ScanController<R>, cursor: &mut dyn Cursor) -> Result<()> {
		if let Some(key) = cursor.key() {
			if cursor.lock_result().freshly_acquired() {
				let key = key.to_vec();
				txn.unlock(&key);
			}
		}
		let previous = txn.set_lock_mode(LockMode::Upgradable);
		let result = if controller.is_reverse() { cursor.previous() } else { cursor.next() };
		txn.set_lock_mode(previous);
		result
	}
}

/// `BasicUpdater` wired with [`NonRepeatableDiscipline`] (spec §4.3).
pub type NonRepeatableUpdater<'txn, R> = BasicUpdater<'txn, R, NonRepeatableDiscipline>;

impl<'txn, R> NonRepeatableUpdater<'txn, R> {
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
		BasicUpdater::with_discipline(view, index, txn, controller, trigger, predicate_lock, seed, NonRepeatableDiscipline)
	}
}
