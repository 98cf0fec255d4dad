// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `JoinedUpdater` (spec §4.3 variant table: "iterates a secondary index
//! but mutates through the primary index"). The read side is the same
//! secondary-to-primary resolution `JoinedScanner` performs; the write
//! side stores/deletes through `primary`, exactly as `BasicUpdater` does
//! for a plain primary-index scan.

use std::sync::Arc;

use super::Updater;
use crate::controller::ScanController;
use crate::error::{Error, Result};
use crate::evaluator::{EvalOutcome, RowEvaluator};
use crate::scanner::{DefaultDiscipline, JoinedRowEvaluator, ScanDiscipline, Scanner};
use crate::storage::{Cursor, Index, RowPredicateLock, Transaction, View};
use crate::trigger::{Trigger, TriggerMode};
use crossbeam_skiplist::SkipSet;
use tracing::{instrument, trace};

/// Lets a secondary index's own trigger tell a `JoinedUpdater` scanning
/// that same secondary to skip keys the trigger just wrote itself, and
/// to short-circuit a delete it already performed (spec §4.3, §4.8:
/// triggers and the scans they feed share a transaction and must not
/// re-observe each other's writes).
pub trait TriggerIndexAccessor: Send + Sync {
	fn should_skip(&self, secondary_key: &[u8]) -> bool;
	fn mark_handled(&self, secondary_key: &[u8]);
}

/// A `TriggerIndexAccessor` that never skips or intercepts anything.
pub struct NullTriggerIndexAccessor;
impl TriggerIndexAccessor for NullTriggerIndexAccessor {
	fn should_skip(&self, _secondary_key: &[u8]) -> bool {
		false
	}
	fn mark_handled(&self, _secondary_key: &[u8]) {}
}

/// Iterates a secondary index, resolving each candidate to its primary
/// row, and stores/deletes through the primary index (spec §4.3).
pub struct JoinedUpdater<'txn, R, D: ScanDiscipline<R> = DefaultDiscipline> {
	secondary_view: Arc<dyn View>,
	primary: Arc<dyn Index>,
	txn: &'txn mut dyn Transaction,
	controller: Option<Arc<dyn ScanController<R>>>,
	evaluator: Arc<dyn JoinedRowEvaluator<R>>,
	row_evaluator: Arc<dyn RowEvaluator<R>>,
	accessor: Arc<dyn TriggerIndexAccessor>,
	discipline: D,
	trigger: Option<Arc<Trigger<R>>>,
	predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
	skip_set: SkipSet<Vec<u8>>,
	cursor: Option<Box<dyn Cursor>>,
	primary_key: Option<Vec<u8>>,
	row: Option<R>,
	closed: bool,
}

impl<'txn, R> JoinedUpdater<'txn, R, DefaultDiscipline> {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		secondary_view: Arc<dyn View>,
		primary: Arc<dyn Index>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		evaluator: Arc<dyn JoinedRowEvaluator<R>>,
		row_evaluator: Arc<dyn RowEvaluator<R>>,
		accessor: Arc<dyn TriggerIndexAccessor>,
		trigger: Option<Arc<Trigger<R>>>,
		predicate_lock: Option<Arc<dyn RowPredicateLock<R>>>,
		seed: R,
	) -> Result<Self> {
		let mut u = JoinedUpdater {
			secondary_view,
			primary,
			txn,
			controller: Some(controller),
			evaluator,
			row_evaluator,
			accessor,
			discipline: DefaultDiscipline,
			trigger,
			predicate_lock,
			skip_set: SkipSet::new(),
			cursor: None,
			primary_key: None,
			row: Some(seed),
			closed: false,
		};
		u.open_current()?;
		u.advance(true)?;
		Ok(u)
	}
}

impl<'txn, R, D: ScanDiscipline<R>> JoinedUpdater<'txn, R, D> {
	fn open_current(&mut self) -> Result<()> {
		let Some(controller) = self.controller.clone() else {
			self.cursor = None;
			return Ok(());
		};
		let mut cursor = controller.new_cursor(self.secondary_view.as_ref(), self.txn);
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
			let Some(cursor) = self.cursor.as_ref() else {
				self.row = None;
				return Ok(());
			};
			if cursor.key().is_none() {
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

			let secondary_key = self.cursor.as_ref().unwrap().key().unwrap().to_vec();
			if self.accessor.should_skip(&secondary_key) || self.skip_set.contains(&secondary_key) {
				continue;
			}
			let primary_key = self.evaluator.primary_key_of(&secondary_key);
			let mut primary_cursor = self.primary.new_cursor(self.txn);
			primary_cursor.find_ceiling(&primary_key)?;
			let resolved = matches!(primary_cursor.key(), Some(k) if k == primary_key.as_slice());
			if !resolved {
				continue;
			}

			let mut row = self.row.take().expect("JoinedUpdater always holds a row buffer");
			let lock_result = primary_cursor.lock_result();
			let secondary_cursor = self.cursor.as_mut().unwrap();
			let outcome = self
				.evaluator
				.eval_joined_row(secondary_cursor.as_mut(), primary_cursor.as_mut(), lock_result, &mut row)
				.map_err(|e| Error::scan_failure("JoinedUpdater", e))?;

			match outcome {
				EvalOutcome::Admitted => {
					self.primary_key = Some(primary_key);
					self.row = Some(row);
					return Ok(());
				}
				EvalOutcome::Rejected => {
					if lock_result.freshly_acquired() {
						self.discipline.unlocked(self.txn, &primary_key, lock_result);
					}
					self.row = Some(row);
				}
				EvalOutcome::Stopped => {
					if lock_result.freshly_acquired() {
						self.discipline.unlocked(self.txn, &primary_key, lock_result);
					}
					self.row = Some(row);
					first = true;
				}
			}
		}
	}

	#[instrument(skip(self, row, new_value))]
	fn store_in_place(&mut self, key: &[u8], row: &R, new_value: &[u8]) -> Result<()> {
		let Some(trigger) = self.trigger.clone() else {
			return self.store_through_primary(key, new_value);
		};
		loop {
			let guard = trigger.acquire_shared();
			match guard.mode() {
				TriggerMode::Active => {
					self.txn.enter()?;
					let result = guard.ops().store_p(self.txn, row, key, new_value);
					drop(guard);
					return match result {
						Ok(()) => {
							self.txn.commit()?;
							self.txn.exit()
						}
						Err(e) => {
							let _ = self.txn.exit();
							Err(e)
						}
					};
				}
				TriggerMode::Skip => {
					drop(guard);
					return self.store_through_primary(key, new_value);
				}
				TriggerMode::Disabled => {
					drop(guard);
					trace!("trigger disabled mid-store, retrying");
					continue;
				}
			}
		}
	}

	/// `self.primary` has no standing cursor (unlike `BasicUpdater`, which
	/// scans the primary index directly), so a same-key store needs a
	/// fresh cursor positioned on `key` rather than `Index::insert`, which
	/// fails on an existing key instead of overwriting it.
	fn store_through_primary(&mut self, key: &[u8], new_value: &[u8]) -> Result<()> {
		let mut c = self.primary.new_cursor(self.txn);
		c.find_ceiling(key)?;
		if matches!(c.key(), Some(k) if k == key) {
			c.store(new_value)
		} else {
			Err(Error::IllegalState("store-in-place target key not found in primary".into()))
		}
	}

	/// Delete+insert path (spec §4.3 step 3), through the primary index.
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
		{
			let mut c = self.primary.new_cursor(self.txn);
			c.find_ceiling(old_key)?;
			if matches!(c.key(), Some(k) if k == old_key) {
				c.delete()?;
			}
		}

		let inserted = if let Some(lock) = self.predicate_lock.clone() {
			lock.redo_predicate_mode(self.txn);
			let closer = lock.open_acquire_p(self.txn, row, new_key, new_value)?;
			let inserted = self.primary.insert(self.txn, new_key, new_value)?;
			closer(self.txn);
			inserted
		} else {
			self.primary.insert(self.txn, new_key, new_value)?
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

impl<'txn, R, D: ScanDiscipline<R>> Scanner<R> for JoinedUpdater<'txn, R, D> {
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
		self.controller.as_ref().map(|c| c.characteristics()).unwrap_or(0) & !crate::scanner::characteristics::SORTED
	}
}

impl<'txn, R, D: ScanDiscipline<R>> Updater<R> for JoinedUpdater<'txn, R, D> {
	fn update(&mut self, row: R) -> Result<()> {
		let current_key = self
			.primary_key
			.clone()
			.ok_or_else(|| Error::IllegalState("No current row".into()))?;
		let current_value = {
			let mut c = self.primary.new_cursor(self.txn);
			c.find_ceiling(&current_key)?;
			c.value().map(|v| v.to_vec()).unwrap_or_default()
		};
		let new_key = self.row_evaluator.update_key(&row, &current_key);
		let new_value = self.row_evaluator.update_value(&row, &current_value);

		match new_key {
			None => self.store_in_place(&current_key, &row, &new_value)?,
			Some(new_key) if new_key == current_key => self.store_in_place(&current_key, &row, &new_value)?,
			Some(new_key) => {
				let sorts_higher = new_key.as_slice() > current_key.as_slice();
				let result = self.delete_insert(&row, &current_key, &new_key, &new_value);
				match result {
					Ok(()) if sorts_higher => {
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
		if let Some(secondary_key) = self.cursor.as_ref().and_then(|c| c.key()).map(|k| k.to_vec()) {
			self.accessor.mark_handled(&secondary_key);
		}
		self.row = Some(row);
		self.advance(false)
	}

	fn delete(&mut self) -> Result<()> {
		let current_key = self
			.primary_key
			.clone()
			.ok_or_else(|| Error::IllegalState("No current row".into()))?;
		if let Some(trigger) = self.trigger.clone() {
			let guard = trigger.acquire_shared();
			if guard.mode() == TriggerMode::Active {
				guard.ops().delete(self.txn, &current_key)?;
			}
		}
		let mut c = self.primary.new_cursor(self.txn);
		c.find_ceiling(&current_key)?;
		if matches!(c.key(), Some(k) if k == current_key.as_slice()) {
			c.delete()?;
		}
		self.advance(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::{Bound, SingleScanController};
	use crate::storage::LockResult;
	use crate::testkit::{FakeTransaction, MemIndex};
	use crate::trigger::NullTriggerOps;

	/// Secondary keys equal their primary key (a degenerate one-column
	/// index), so `primary_key_of` is the identity.
	struct JoinedKeyChangeEvaluator;

	impl JoinedRowEvaluator<(u8, u8)> for JoinedKeyChangeEvaluator {
		fn eval_joined_row(
			&self,
			_secondary: &mut dyn Cursor,
			primary: &mut dyn Cursor,
			_lock_result: LockResult,
			row: &mut (u8, u8),
		) -> Result<EvalOutcome> {
			match (primary.key(), primary.value()) {
				(Some(k), Some(v)) => {
					*row = (k[0], v[0]);
					Ok(EvalOutcome::Admitted)
				}
				_ => Ok(EvalOutcome::Rejected),
			}
		}

		fn primary_key_of(&self, secondary_key: &[u8]) -> Vec<u8> {
			secondary_key.to_vec()
		}
	}

	impl RowEvaluator<(u8, u8)> for JoinedKeyChangeEvaluator {
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

	#[allow(clippy::too_many_arguments)]
	fn seeded_updater<'t>(
		primary: &Arc<MemIndex>,
		secondary: &Arc<MemIndex>,
		txn: &'t mut FakeTransaction,
		trigger: Option<Arc<Trigger<(u8, u8)>>>,
	) -> JoinedUpdater<'t, (u8, u8), DefaultDiscipline> {
		let secondary_view: Arc<dyn View> = secondary.clone();
		let primary_index: Arc<dyn Index> = primary.clone();
		let concrete = Arc::new(JoinedKeyChangeEvaluator);
		let evaluator: Arc<dyn JoinedRowEvaluator<(u8, u8)>> = concrete.clone();
		let row_evaluator: Arc<dyn RowEvaluator<(u8, u8)>> = concrete.clone();
		let comparator_evaluator: Arc<dyn RowEvaluator<(u8, u8)>> = concrete;
		let controller: Arc<dyn ScanController<(u8, u8)>> = Arc::new(SingleScanController::new(
			Bound::Unbounded,
			true,
			Bound::Unbounded,
			true,
			false,
			comparator_evaluator,
			None,
		));
		JoinedUpdater::new(
			secondary_view,
			primary_index,
			txn,
			controller,
			evaluator,
			row_evaluator,
			Arc::new(NullTriggerIndexAccessor),
			trigger,
			None,
			(0, 0),
		)
		.unwrap()
	}

	fn mirrored_indexes(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> (Arc<MemIndex>, Arc<MemIndex>) {
		let primary = MemIndex::from_pairs(1, pairs.clone());
		let secondary = MemIndex::from_pairs(2, pairs.into_iter().map(|(k, _)| (k, Vec::new())).collect());
		(primary, secondary)
	}

	/// Spec §8 scenario 2, driven through the secondary-to-primary join:
	/// rows (1,a),(2,b),(3,c); updating the row resolved from secondary
	/// key 1 to primary key 5 must leave exactly (2,b),(3,c),(5,a).
	#[test]
	fn key_changing_update_deletes_old_primary_key_and_inserts_new_one() {
		let (primary, secondary) =
			mirrored_indexes(vec![(vec![1], vec![b'a']), (vec![2], vec![b'b']), (vec![3], vec![b'c'])]);
		let mut txn = FakeTransaction::new();
		let mut updater = seeded_updater(&primary, &secondary, &mut txn, None);

		assert_eq!(updater.row(), Some(&(1, b'a')));
		updater.update((5, b'a')).unwrap();

		let mut snapshot = primary.snapshot();
		snapshot.sort();
		assert_eq!(
			snapshot,
			vec![(vec![2], vec![b'b']), (vec![3], vec![b'c']), (vec![5], vec![b'a'])]
		);
		// the scan continues through the (untouched) secondary index.
		assert_eq!(updater.row(), Some(&(2, b'b')));
	}

	#[test]
	fn same_key_update_stores_in_place_without_delete_insert() {
		let (primary, secondary) = mirrored_indexes(vec![(vec![1], vec![b'a']), (vec![2], vec![b'b'])]);
		let mut txn = FakeTransaction::new();
		let mut updater = seeded_updater(&primary, &secondary, &mut txn, None);

		updater.update((1, b'z')).unwrap();

		let mut snapshot = primary.snapshot();
		snapshot.sort();
		assert_eq!(snapshot, vec![(vec![1], vec![b'z']), (vec![2], vec![b'b'])]);
	}

	#[test]
	fn store_in_place_under_skip_mode_writes_directly_through_primary() {
		let (primary, secondary) = mirrored_indexes(vec![(vec![1], vec![b'a'])]);
		let mut txn = FakeTransaction::new();
		let trigger = Trigger::with_mode(Arc::new(NullTriggerOps), TriggerMode::Skip);
		let mut updater = seeded_updater(&primary, &secondary, &mut txn, Some(trigger));

		updater.update((1, b'z')).unwrap();

		assert_eq!(primary.snapshot(), vec![(vec![1], vec![b'z'])]);
	}
}
