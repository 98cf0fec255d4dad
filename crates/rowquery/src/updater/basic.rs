// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::sync::Arc;

use super::Updater;
use crate::controller::ScanController;
use crate::error::{Error, Result};
use crate::evaluator::EvalOutcome;
use crate::scanner::{DefaultDiscipline, ScanDiscipline, Scanner};
use crate::storage::{Cursor, Index, RowPredicateLock, Transaction, View};
use crate::trigger::{Trigger, TriggerMode};
use crossbeam_skiplist::SkipSet;
use tracing::{instrument, trace};

/// Primary-index scan that can also modify or delete the row at its
/// cursor (spec §4.3 `BasicUpdater`). The iteration loop mirrors
/// `BasicScanner`'s (kept as a separate implementation since Rust has
/// no virtual dispatch to share it through inheritance), with the
/// extra skip-set check described in spec §4.3 step 4.
pub struct BasicUpdater<'txn, R, D: ScanDiscipline<R> = DefaultDiscipline> {
	view: Arc<dyn View>,
	index: Arc<dyn Index>,
	txn: &'txn mut dyn Transaction,
	controller: Option<Arc<dyn ScanController<R>>>,
	cursor: Option<Box<dyn Cursor>>,
	discipline: D,
	trigger: Option<Arc<Trigger<R>>>,
	predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
	/// Keys whose new position sorts higher than this scanner's current
	/// cursor and would otherwise be re-observed later in the same scan
	/// (spec §4.3 step 4). Bound/spill policy: see `AutoCommitUpdater`.
	skip_set: SkipSet<Vec<u8>>,
	/// Hard cap on `skip_set`'s size, used by `AutoCommitUpdater` to bound
	/// memory on long auto-committed scans (see DESIGN.md: spec.md §9
	/// defers the temp-index spill, so exceeding the cap fails the
	/// update rather than silently dropping an entry and risking a
	/// duplicate emission). `None` means unbounded, correct for every
	/// variant except AutoCommit.
	skip_cap: Option<usize>,
	row: Option<R>,
	closed: bool,
}

impl<'txn, R> BasicUpdater<'txn, R, DefaultDiscipline> {
	pub fn new(
		view: Arc<dyn View>,
		index: Arc<dyn Index>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		trigger: Option<Arc<Trigger<R>>>,
		predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
		seed: R,
	) -> Result<Self> {
		Self::with_discipline(view, index, txn, controller, trigger, predicate_lock, seed, DefaultDiscipline)
	}
}

impl<'txn, R, D: ScanDiscipline<R>> BasicUpdater<'txn, R, D> {
	#[allow(clippy::too_many_arguments)]
	pub fn with_discipline(
		view: Arc<dyn View>,
		index: Arc<dyn Index>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		trigger: Option<Arc<Trigger<R>>>,
		predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
		seed: R,
		discipline: D,
	) -> Result<Self> {
		let mut u = BasicUpdater {
			view,
			index,
			txn,
			controller: Some(controller),
			cursor: None,
			discipline,
			trigger,
			predicate_lock,
			skip_set: SkipSet::new(),
			skip_cap: None,
			row: Some(seed),
			closed: false,
		};
		u.open_current()?;
		u.advance(true)?;
		Ok(u)
	}

	/// Direct access to the underlying transaction, for variants (namely
	/// `AutoCommitUpdater`) that need to commit around this updater's own
	/// mutation paths rather than through them.
	pub(crate) fn txn_mut(&mut self) -> &mut dyn Transaction {
		self.txn
	}

	/// Bounds `skip_set`'s size; once exceeded, `update` fails rather than
	/// evicting an entry and risking the re-observation the skip-set
	/// exists to prevent (see DESIGN.md).
	pub(crate) fn set_skip_cap(&mut self, cap: usize) {
		self.skip_cap = Some(cap);
	}

	fn open_current(&mut self) -> Result<()> {
		let Some(controller) = self.controller.clone() else {
			self.cursor = None;
			return Ok(());
		};
		if let Some(row) = self.row.as_mut() {
			self.discipline.begin_batch(row);
		}
		let mut cursor = controller.new_cursor(self.view.as_ref(), self.txn);
		self.discipline.to_first(self.txn, controller.as_ref(), cursor.as_mut())?;
		self.cursor = Some(cursor);
		Ok(())
	}

	fn advance(&mut self, mut first: bool) -> Result<()> {
		loop {
			let Some(controller) = self.controller.clone() else {
				self.row = None;
				return Ok(());
			};
			if self.cursor.as_ref().and_then(|c| c.key()).is_none() {
				self.controller = controller.successor();
				self.open_current()?;
				first = true;
				continue;
			}
			if !first {
				self.discipline.to_next(self.txn, controller.as_ref(), self.cursor.as_mut().unwrap())?;
				if self.cursor.as_ref().unwrap().key().is_none() {
					self.controller = controller.successor();
					self.open_current()?;
					first = true;
					continue;
				}
			}
			first = false;

			let key = self.cursor.as_ref().unwrap().key().unwrap().to_vec();
			if self.skip_set.contains(&key) {
				continue;
			}

			let mut row = self.row.take().expect("BasicUpdater always holds a row buffer");
			let cursor = self.cursor.as_mut().unwrap();
			let lock_result = cursor.lock_result();
			let outcome = controller
				.evaluator()
				.eval_row(cursor.as_mut(), lock_result, &mut row)
				.map_err(|e| Error::scan_failure("BasicUpdater", e))?;

			match outcome {
				EvalOutcome::Admitted => {
					self.row = Some(row);
					return Ok(());
				}
				EvalOutcome::Rejected => {
					self.discipline.unlocked(self.txn, &key, lock_result);
					self.row = Some(row);
				}
				EvalOutcome::Stopped => {
					self.discipline.unlocked(self.txn, &key, lock_result);
					self.row = Some(row);
					first = true;
				}
			}
		}
	}

	fn current_key(&self) -> Result<Vec<u8>> {
		self.cursor
			.as_ref()
			.and_then(|c| c.key())
			.map(|k| k.to_vec())
			.ok_or_else(|| Error::IllegalState("No current row".into()))
	}

	/// Store-in-place path (spec §4.3 step 2): same key, new value.
	#[instrument(skip(self, value))]
	fn store_in_place(&mut self, key: &[u8], row: &R, value: &[u8]) -> Result<()> {
		let Some(trigger) = self.trigger.clone() else {
			return self.cursor.as_mut().unwrap().store(value);
		};
		loop {
			let guard = trigger.acquire_shared();
			match guard.mode() {
				TriggerMode::Active => {
					self.txn.enter()?;
					let result = guard.ops().store_p(self.txn, row, key, value);
					drop(guard);
					match result {
						Ok(()) => {
							self.txn.commit()?;
							self.txn.exit()?;
							return Ok(());
						}
						Err(e) => {
							let _ = self.txn.exit();
							return Err(e);
						}
					}
				}
				TriggerMode::Skip => {
					drop(guard);
					return self.cursor.as_mut().unwrap().store(value);
				}
				TriggerMode::Disabled => {
					drop(guard);
					trace!("trigger disabled mid-store, retrying");
					continue;
				}
			}
		}
	}

	/// Delete+insert path (spec §4.3 step 3).
	#[instrument(skip(self, row, new_value))]
	fn delete_insert(&mut self, row: &R, old_key: &[u8], new_key: &[u8], new_value: &[u8]) -> Result<()> {
		self.txn.enter()?;
		let result = self.delete_insert_body(row, old_key, new_key, new_value);
		match result {
			Ok(()) => {
				self.txn.commit()?;
				self.txn.exit()?;
				Ok(())
			}
			Err(e) => {
				let _ = self.txn.exit();
				Err(e)
			}
		}
	}

	fn delete_insert_body(&mut self, row: &R, old_key: &[u8], new_key: &[u8], new_value: &[u8]) -> Result<()> {
		if let Some(trigger) = self.trigger.clone() {
			let guard = trigger.acquire_shared();
			if guard.mode() == TriggerMode::Active {
				guard.ops().delete(self.txn, old_key)?;
			}
		}
		self.cursor.as_mut().unwrap().delete()?;

		let inserted = if let Some(lock) = self.predicate_lock.clone() {
			lock.redo_predicate_mode(self.txn);
			let closer = lock.open_acquire_p(self.txn, row, new_key, new_value)?;
			let inserted = self.index.insert(self.txn, new_key, new_value)?;
			closer(self.txn);
			inserted
		} else {
			self.index.insert(self.txn, new_key, new_value)?
		};
		if !inserted {
			return Err(Error::UniqueConstraint { key: new_key.to_vec() });
		}

		if let Some(trigger) = self.trigger.clone() {
			let guard = trigger.acquire_shared();
			if guard.mode() == TriggerMode::Active {
				guard.ops().insert(self.txn, new_key, new_value)?;
			}
		}
		Ok(())
	}
}

impl<'txn, R, D: ScanDiscipline<R>> Scanner<R> for BasicUpdater<'txn, R, D> {
	fn row(&self) -> Option<&R> {
		if self.closed {
			None
		} else {
			self.row.as_ref()
		}
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed {
			return Ok(None);
		}
		self.advance(false)?;
		Ok(self.row.as_ref())
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		self.cursor = None;
		self.row = None;
		Ok(())
	}

	fn estimate_size(&self) -> u64 {
		self.controller.as_ref().map(|c| c.estimate_size()).unwrap_or(0)
	}

	fn characteristics(&self) -> u32 {
		self.controller.as_ref().map(|c| c.characteristics()).unwrap_or(0)
	}
}

impl<'txn, R, D: ScanDiscipline<R>> Updater<R> for BasicUpdater<'txn, R, D> {
	fn update(&mut self, row: R) -> Result<()> {
		let current_key = self.current_key()?;
		let current_value =
			self.cursor.as_ref().and_then(|c| c.value()).map(|v| v.to_vec()).unwrap_or_default();
		let evaluator = self.controller.as_ref().expect("updater has a controller").evaluator().clone();
		let new_key = evaluator.update_key(&row, &current_key);
		let new_value = evaluator.update_value(&row, &current_value);

		match new_key {
			None => self.store_in_place(&current_key, &row, &new_value)?,
			Some(new_key) if new_key == current_key => self.store_in_place(&current_key, &row, &new_value)?,
			Some(new_key) => {
				let sorts_higher = new_key.as_slice() > current_key.as_slice();
				let result = self.delete_insert(&row, &current_key, &new_key, &new_value);
				match result {
					Ok(()) if sorts_higher => {
						if let Some(cap) = self.skip_cap {
							if self.skip_set.len() >= cap {
								return Err(Error::scan_failure(
									"BasicUpdater",
									Error::IllegalState("skip-set capacity exceeded".into()),
								));
							}
						}
						self.skip_set.insert(new_key);
					}
					Err(e @ Error::UniqueConstraint { .. }) => {
						self.skip_set.remove(&new_key);
						return Err(e);
					}
					other => other?,
				}
			}
		}
		self.row = Some(row);
		self.advance(false)
	}

	fn delete(&mut self) -> Result<()> {
		let key = self.current_key()?;
		if let Some(trigger) = self.trigger.clone() {
			let guard = trigger.acquire_shared();
			if guard.mode() == TriggerMode::Active {
				guard.ops().delete(self.txn, &key)?;
			}
		}
		self.cursor.as_mut().unwrap().delete()?;
		self.advance(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::{Bound, SingleScanController};
	use crate::evaluator::RowEvaluator;
	use crate::storage::LockResult;
	use crate::testkit::{FakeTransaction, MemIndex};

	/// A row is `(key, value)`, both single bytes; `update_key` changes
	/// the stored key whenever the row's key byte differs from the
	/// cursor's current key.
	struct KeyChangeEvaluator;

	impl RowEvaluator<(u8, u8)> for KeyChangeEvaluator {
		fn eval_row(&self, cursor: &mut dyn Cursor, _lock_result: LockResult, row: &mut (u8, u8)) -> Result<EvalOutcome> {
			match (cursor.key(), cursor.value()) {
				(Some(k), Some(v)) => {
					*row = (k[0], v[0]);
					Ok(EvalOutcome::Admitted)
				}
				_ => Ok(EvalOutcome::Rejected),
			}
		}

		fn decode_row(&self, key: &[u8], value: &[u8], row: &mut (u8, u8)) -> Result<()> {
			*row = (key[0], value[0]);
			Ok(())
		}

		fn write_row(&self, row: &(u8, u8)) -> (Vec<u8>, Vec<u8>) {
			(vec![row.0], vec![row.1])
		}

		fn update_key(&self, row: &(u8, u8), current_key: &[u8]) -> Option<Vec<u8>> {
			if current_key.len() == 1 && current_key[0] == row.0 { None } else { Some(vec![row.0]) }
		}

		fn update_value(&self, row: &(u8, u8), _current_value: &[u8]) -> Vec<u8> {
			vec![row.1]
		}

		fn evolvable_table_id(&self) -> u64 {
			0
		}
	}

	fn seeded_updater<'t>(
		mem: &Arc<MemIndex>,
		txn: &'t mut FakeTransaction,
	) -> BasicUpdater<'t, (u8, u8), DefaultDiscipline> {
		let view: Arc<dyn View> = mem.clone();
		let index: Arc<dyn Index> = mem.clone();
		let evaluator: Arc<dyn RowEvaluator<(u8, u8)>> = Arc::new(KeyChangeEvaluator);
		let controller: Arc<dyn ScanController<(u8, u8)>> =
			Arc::new(SingleScanController::new(Bound::Unbounded, true, Bound::Unbounded, true, false, evaluator, None));
		BasicUpdater::new(view, index, txn, controller, None, None, (0, 0)).unwrap()
	}

	/// Spec §8 scenario 2: rows (1,a),(2,b),(3,c); updating the row at
	/// key 1 to key 5 must leave exactly (2,b),(3,c),(5,a) — one delete,
	/// one insert, no duplicate emission.
	#[test]
	fn key_changing_update_deletes_old_key_and_inserts_new_one() {
		let mem = MemIndex::from_pairs(1, vec![(vec![1], vec![b'a']), (vec![2], vec![b'b']), (vec![3], vec![b'c'])]);
		let mut txn = FakeTransaction::new();
		let mut updater = seeded_updater(&mem, &mut txn);

		assert_eq!(updater.row(), Some(&(1, b'a')));
		updater.update((5, b'a')).unwrap();

		let mut snapshot = mem.snapshot();
		snapshot.sort();
		assert_eq!(
			snapshot,
			vec![(vec![2], vec![b'b']), (vec![3], vec![b'c']), (vec![5], vec![b'a'])]
		);
	}

	#[test]
	fn same_key_update_stores_in_place_without_delete_insert() {
		let mem = MemIndex::from_pairs(1, vec![(vec![1], vec![b'a']), (vec![2], vec![b'b'])]);
		let mut txn = FakeTransaction::new();
		let mut updater = seeded_updater(&mem, &mut txn);

		updater.update((1, b'z')).unwrap();

		let mut snapshot = mem.snapshot();
		snapshot.sort();
		assert_eq!(snapshot, vec![(vec![1], vec![b'z']), (vec![2], vec![b'b'])]);
	}

	#[test]
	fn key_changing_update_into_an_existing_key_fails_unique_constraint() {
		let mem = MemIndex::from_pairs(1, vec![(vec![1], vec![b'a']), (vec![2], vec![b'b']), (vec![3], vec![b'c'])]);
		let mut txn = FakeTransaction::new();
		let mut updater = seeded_updater(&mem, &mut txn);

		let result = updater.update((2, b'a'));
		assert!(matches!(result, Err(Error::UniqueConstraint { key }) if key == vec![2]));
	}
}
