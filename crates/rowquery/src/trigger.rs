// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Trigger latch and table/secondary-index reconciliation (spec §4.8,
//! §3 "Trigger state", §5 "Trigger installation strictly happens-before
//! the next scanner... observes ACTIVE").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::storage::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
	Active,
	Skip,
	Disabled,
}

/// The operational methods a concrete trigger supports. The base
/// (`Trigger`) throws `Unsupported` for whichever of these a given
/// table doesn't need (spec §4.8: "base class throws `Unsupported` for
/// the abstract ones").
pub trait TriggerOps<R>: Send + Sync {
	fn store(&self, _txn: &mut dyn Transaction, _key: &[u8], _old_value: &[u8], _new_value: &[u8]) -> Result<()> {
		Err(Error::Unsupported("store".into()))
	}

	fn store_p(&self, _txn: &mut dyn Transaction, _row: &R, _key: &[u8], _new_value: &[u8]) -> Result<()> {
		Err(Error::Unsupported("storeP".into()))
	}

	fn insert(&self, _txn: &mut dyn Transaction, _key: &[u8], _value: &[u8]) -> Result<()> {
		Err(Error::Unsupported("insert".into()))
	}

	fn insert_p(&self, _txn: &mut dyn Transaction, _row: &R, _key: &[u8], _value: &[u8]) -> Result<()> {
		Err(Error::Unsupported("insertP".into()))
	}

	fn delete(&self, _txn: &mut dyn Transaction, _key: &[u8]) -> Result<()> {
		Err(Error::Unsupported("delete".into()))
	}
}

/// A no-op trigger, installed when a table has no live secondary
/// indexes: every operation falls through to the base `Unsupported`
/// handlers, which `BasicUpdater` interprets as "no trigger work to do".
pub struct NullTriggerOps;
impl<R> TriggerOps<R> for NullTriggerOps {}

/// Reference-counted many-readers/one-writer latch around a mode field
/// (spec §3, §4.8, §9 "copy-on-write under a many-readers-one-writer
/// latch"). Readers call [`Trigger::acquire_shared`] to read `mode`
/// consistently with any concurrent `disable()`.
pub struct Trigger<R> {
	mode: RwLock<TriggerMode>,
	ops: Arc<dyn TriggerOps<R>>,
}

impl<R> Trigger<R> {
	pub fn new(ops: Arc<dyn TriggerOps<R>>) -> Arc<Trigger<R>> {
		Arc::new(Trigger { mode: RwLock::new(TriggerMode::Active), ops })
	}

	pub fn with_mode(ops: Arc<dyn TriggerOps<R>>, mode: TriggerMode) -> Arc<Trigger<R>> {
		Arc::new(Trigger { mode: RwLock::new(mode), ops })
	}

	/// Acquires the shared latch for the duration of the returned guard.
	/// While it's held, a concurrent `disable()` blocks until the guard
	/// drops — so an in-flight ACTIVE operation always finishes before
	/// DISABLED takes effect, and any reader acquiring *after* `disable`
	/// returns is guaranteed to observe it (spec §4.8, §9).
	pub fn acquire_shared(&self) -> SharedGuard<'_, R> {
		let guard = self.mode.read();
		let mode = *guard;
		SharedGuard { _guard: guard, mode, ops: &self.ops }
	}

	/// Transitions to `DISABLED` under the exclusive latch, fencing any
	/// reader that had already acquired the shared latch before this
	/// call (spec §4.8, §9). Once this returns, every later
	/// `acquire_shared` observes `DISABLED`.
	#[instrument(skip(self))]
	pub fn disable(&self) {
		let mut guard = self.mode.write();
		*guard = TriggerMode::Disabled;
	}

	pub fn mode(&self) -> TriggerMode {
		*self.mode.read()
	}
}

/// Held for the duration of a trigger operation; see
/// [`Trigger::acquire_shared`].
pub struct SharedGuard<'a, R> {
	_guard: RwLockReadGuard<'a, TriggerMode>,
	mode: TriggerMode,
	ops: &'a Arc<dyn TriggerOps<R>>,
}

impl<'a, R> SharedGuard<'a, R> {
	pub fn mode(&self) -> TriggerMode {
		self.mode
	}

	pub fn ops(&self) -> &Arc<dyn TriggerOps<R>> {
		self.ops
	}
}

/// State of one secondary index as known to the catalog (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryIndexState {
	Live,
	Backfill,
	Deleting,
}

/// Catalog-supplied shape for one secondary index (spec §4.8,
/// "secondary descriptor").
#[derive(Debug, Clone)]
pub struct SecondaryDescriptor {
	pub id: u64,
	pub bytes: Vec<u8>,
	pub state: SecondaryIndexState,
}

/// Memoized per-descriptor trigger, keyed by the secondary descriptor's
/// id (spec §4.8: "materialise a `SecondaryInfo`, cached weakly keyed by
/// `D`"). This crate has no row-object identity system to key a
/// generational weak cache against, so the memo here is a plain map
/// cleared explicitly on reconciliation rather than GC-driven (see
/// DESIGN.md).
struct SecondaryInfo<R> {
	descriptor: SecondaryDescriptor,
	trigger: Arc<Trigger<R>>,
}

/// A clear-query-cache task returned by [`TableManager::update`]. The
/// caller must run it *after* the transaction commits — running it
/// before may deadlock against the transaction's own lock (spec §4.8).
pub struct ClearQueryCacheTask {
	pub table_id: u64,
}

impl ClearQueryCacheTask {
	pub fn run(self, clearer: &dyn QueryCacheClearer) {
		clearer.clear_table(self.table_id);
	}
}

pub trait QueryCacheClearer: Send + Sync {
	fn clear_table(&self, table_id: u64);
}

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Reconciles the set of installed secondary-index triggers with the
/// live descriptor set (spec §4.8 `TableManager.update`).
pub struct TableManager<R> {
	table_id: u64,
	installed: Mutex<IndexMap<u64, SecondaryInfo<R>>>,
	backfills_spawned: Mutex<HashMap<u64, ()>>,
}

impl<R> TableManager<R> {
	pub fn new() -> Self {
		TableManager {
			table_id: NEXT_TABLE_ID.fetch_add(1, AtomicOrdering::Relaxed),
			installed: Mutex::new(IndexMap::new()),
			backfills_spawned: Mutex::new(HashMap::new()),
		}
	}

	pub fn table_id(&self) -> u64 {
		self.table_id
	}

	/// Reconciles `descriptors` against the currently installed
	/// triggers:
	/// - `Deleting` descriptors are dropped.
	/// - `Backfill` descriptors spawn a backfill (via `spawn_backfill`,
	///   called at most once per descriptor id) if not already running.
	/// - `Live` descriptors get a trigger built via `build_ops`.
	///
	/// Returns a clear-query-cache task if anything changed.
	#[instrument(skip(self, descriptors, build_ops, spawn_backfill))]
	pub fn update(
		&self,
		descriptors: &[SecondaryDescriptor],
		build_ops: impl Fn(&SecondaryDescriptor) -> Arc<dyn TriggerOps<R>>,
		mut spawn_backfill: impl FnMut(&SecondaryDescriptor),
	) -> Result<Option<ClearQueryCacheTask>> {
		let mut installed = self.installed.lock();
		let mut backfills = self.backfills_spawned.lock();
		let mut changed = false;

		let live_ids: std::collections::HashSet<u64> =
			descriptors.iter().filter(|d| d.state != SecondaryIndexState::Deleting).map(|d| d.id).collect();
		installed.retain(|id, _| {
			let keep = live_ids.contains(id);
			changed |= !keep;
			keep
		});
		backfills.retain(|id, _| live_ids.contains(id));

		for d in descriptors {
			match d.state {
				SecondaryIndexState::Deleting => continue,
				SecondaryIndexState::Backfill => {
					if !backfills.contains_key(&d.id) {
						spawn_backfill(d);
						backfills.insert(d.id, ());
						changed = true;
					}
				}
				SecondaryIndexState::Live => {
					let needs_install = match installed.get(&d.id) {
						Some(info) => info.descriptor.bytes != d.bytes,
						None => true,
					};
					if needs_install {
						if let Some(old) = installed.get(&d.id) {
							old.trigger.disable();
						}
						let ops = build_ops(d);
						installed.insert(d.id, SecondaryInfo { descriptor: d.clone(), trigger: Trigger::new(ops) });
						changed = true;
					}
				}
			}
		}

		Ok(if changed { Some(ClearQueryCacheTask { table_id: self.table_id }) } else { None })
	}

	pub fn trigger_for(&self, descriptor_id: u64) -> Option<Arc<Trigger<R>>> {
		self.installed.lock().get(&descriptor_id).map(|info| info.trigger.clone())
	}

	pub fn active_triggers(&self) -> Vec<Arc<Trigger<R>>> {
		self.installed.lock().values().map(|info| info.trigger.clone()).collect()
	}
}

impl<R> Default for TableManager<R> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disable_is_observed_by_later_readers() {
		let trigger: Arc<Trigger<()>> = Trigger::new(Arc::new(NullTriggerOps));
		assert_eq!(trigger.mode(), TriggerMode::Active);
		trigger.disable();
		assert_eq!(trigger.acquire_shared().mode(), TriggerMode::Disabled);
	}

	#[test]
	fn update_installs_live_and_drops_deleting() {
		let manager: TableManager<()> = TableManager::new();
		let descriptors = vec![
			SecondaryDescriptor { id: 1, bytes: vec![1], state: SecondaryIndexState::Live },
			SecondaryDescriptor { id: 2, bytes: vec![2], state: SecondaryIndexState::Deleting },
		];
		let task = manager.update(&descriptors, |_| Arc::new(NullTriggerOps), |_| {}).unwrap();
		assert!(task.is_some());
		assert!(manager.trigger_for(1).is_some());
		assert!(manager.trigger_for(2).is_none());
	}

	#[test]
	fn update_spawns_backfill_once() {
		let manager: TableManager<()> = TableManager::new();
		let descriptors = vec![SecondaryDescriptor { id: 3, bytes: vec![3], state: SecondaryIndexState::Backfill }];
		let mut spawned = 0;
		manager.update(&descriptors, |_| Arc::new(NullTriggerOps), |_| spawned += 1).unwrap();
		manager.update(&descriptors, |_| Arc::new(NullTriggerOps), |_| spawned += 1).unwrap();
		assert_eq!(spawned, 1);
	}
}
