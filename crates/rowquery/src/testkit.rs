// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! In-process fakes for the storage-engine contracts of spec §6,
//! shared by this crate's unit tests. The storage engine itself is an
//! out-of-scope external collaborator (spec §1); these fakes back an
//! in-memory `BTreeMap` rather than exercising a real engine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::evaluator::{EvalOutcome, RowEvaluator};
use crate::storage::{Cursor, Index, LockMode, LockResult, Transaction, View};

pub type SharedMap = Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>;

pub struct MemIndex {
	id: u64,
	map: SharedMap,
}

impl MemIndex {
	pub fn new(id: u64) -> Arc<MemIndex> {
		Arc::new(MemIndex { id, map: Arc::new(Mutex::new(BTreeMap::new())) })
	}

	pub fn from_pairs(id: u64, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Arc<MemIndex> {
		let idx = Self::new(id);
		idx.map.lock().unwrap().extend(pairs);
		idx
	}

	pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
		self.map.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}
}

impl Index for MemIndex {
	fn id(&self) -> u64 {
		self.id
	}

	fn is_empty(&self, _txn: &mut dyn Transaction) -> Result<bool> {
		Ok(self.map.lock().unwrap().is_empty())
	}

	fn load(&self, _txn: &mut dyn Transaction, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.map.lock().unwrap().get(key).cloned())
	}

	fn insert(&self, _txn: &mut dyn Transaction, key: &[u8], value: &[u8]) -> Result<bool> {
		let mut map = self.map.lock().unwrap();
		if map.contains_key(key) {
			return Ok(false);
		}
		map.insert(key.to_vec(), value.to_vec());
		Ok(true)
	}

	fn new_cursor(&self, _txn: &mut dyn Transaction) -> Box<dyn Cursor> {
		Box::new(MemCursor { map: self.map.clone(), at: None })
	}
}

impl View for MemIndex {
	fn new_cursor(&self, txn: &mut dyn Transaction) -> Box<dyn Cursor> {
		Index::new_cursor(self, txn)
	}
}

pub struct MemCursor {
	map: SharedMap,
	/// The cursor's own copy of the entry it's positioned on, refreshed
	/// on every navigation — mirrors a real cursor owning its buffer
	/// rather than borrowing from the index.
	at: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemCursor {
	pub fn from_pairs(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> MemCursor {
		MemCursor { map: Arc::new(Mutex::new(pairs.into_iter().collect())), at: None }
	}

	fn settle(&mut self, key: Option<Vec<u8>>) {
		let map = self.map.lock().unwrap();
		self.at = key.and_then(|k| map.get(&k).map(|v| (k, v.clone())));
	}
}

impl Cursor for MemCursor {
	fn first(&mut self) -> Result<()> {
		let key = self.map.lock().unwrap().keys().next().cloned();
		self.settle(key);
		Ok(())
	}

	fn last(&mut self) -> Result<()> {
		let key = self.map.lock().unwrap().keys().next_back().cloned();
		self.settle(key);
		Ok(())
	}

	fn next(&mut self) -> Result<()> {
		let key = {
			let map = self.map.lock().unwrap();
			match &self.at {
				Some((k, _)) => map
					.range((std::ops::Bound::Excluded(k.clone()), std::ops::Bound::Unbounded))
					.next()
					.map(|(k, _)| k.clone()),
				None => None,
			}
		};
		self.settle(key);
		Ok(())
	}

	fn previous(&mut self) -> Result<()> {
		let key = {
			let map = self.map.lock().unwrap();
			match &self.at {
				Some((k, _)) => map
					.range((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(k.clone())))
					.next_back()
					.map(|(k, _)| k.clone()),
				None => None,
			}
		};
		self.settle(key);
		Ok(())
	}

	fn find_ceiling(&mut self, key: &[u8]) -> Result<()> {
		let found = {
			let map = self.map.lock().unwrap();
			map.range((std::ops::Bound::Included(key.to_vec()), std::ops::Bound::Unbounded))
				.next()
				.map(|(k, _)| k.clone())
		};
		self.settle(found);
		Ok(())
	}

	fn find_floor(&mut self, key: &[u8]) -> Result<()> {
		let found = {
			let map = self.map.lock().unwrap();
			map.range((std::ops::Bound::Unbounded, std::ops::Bound::Included(key.to_vec())))
				.next_back()
				.map(|(k, _)| k.clone())
		};
		self.settle(found);
		Ok(())
	}

	fn key(&self) -> Option<&[u8]> {
		self.at.as_ref().map(|(k, _)| k.as_slice())
	}

	fn value(&self) -> Option<&[u8]> {
		self.at.as_ref().map(|(_, v)| v.as_slice())
	}

	fn lock_result(&self) -> LockResult {
		LockResult::Acquired
	}

	fn compare_key_to(&self, key: &[u8]) -> std::cmp::Ordering {
		self.key().unwrap_or(&[]).cmp(key)
	}

	fn store(&mut self, value: &[u8]) -> Result<()> {
		let Some((k, _)) = self.at.clone() else {
			return Err(Error::UnpositionedCursor);
		};
		self.map.lock().unwrap().insert(k.clone(), value.to_vec());
		self.at = Some((k, value.to_vec()));
		Ok(())
	}

	fn delete(&mut self) -> Result<()> {
		let Some((k, _)) = self.at.take() else {
			return Err(Error::UnpositionedCursor);
		};
		self.map.lock().unwrap().remove(&k);
		Ok(())
	}

	fn reset(&mut self) {
		self.at = None;
	}
}

pub struct FakeTransaction {
	pub mode: LockMode,
	pub acquired: std::collections::HashSet<Vec<u8>>,
	pub depth: u32,
	pub committed: u32,
}

impl FakeTransaction {
	pub fn new() -> FakeTransaction {
		FakeTransaction { mode: LockMode::Upgradable, acquired: Default::default(), depth: 0, committed: 0 }
	}
}

impl Default for FakeTransaction {
	fn default() -> Self {
		Self::new()
	}
}

impl Transaction for FakeTransaction {
	fn lock_mode(&self) -> LockMode {
		self.mode
	}

	fn set_lock_mode(&mut self, mode: LockMode) -> LockMode {
		std::mem::replace(&mut self.mode, mode)
	}

	fn unlock(&mut self, key: &[u8]) {
		self.acquired.remove(key);
	}

	fn unlock_combine(&mut self, secondary_key: &[u8], primary_key: &[u8]) {
		self.acquired.remove(secondary_key);
		self.acquired.remove(primary_key);
	}

	fn enter(&mut self) -> Result<()> {
		self.depth += 1;
		Ok(())
	}

	fn exit(&mut self) -> Result<()> {
		self.depth = self.depth.saturating_sub(1);
		Ok(())
	}

	fn commit(&mut self) -> Result<()> {
		self.committed += 1;
		Ok(())
	}

	fn was_acquired(&self, key: &[u8]) -> bool {
		self.acquired.contains(key)
	}
}

/// A `RowEvaluator<Vec<u8>>` where the row *is* the raw value bytes;
/// `update_key` never changes the key. Good enough to exercise
/// controller/scanner plumbing without a real row-class codegen.
pub struct IdentityByteEvaluator;

impl RowEvaluator<Vec<u8>> for IdentityByteEvaluator {
	fn eval_row(&self, cursor: &mut dyn Cursor, _lock_result: LockResult, row: &mut Vec<u8>) -> Result<EvalOutcome> {
		match cursor.value() {
			Some(v) => {
				*row = v.to_vec();
				Ok(EvalOutcome::Admitted)
			}
			None => Ok(EvalOutcome::Rejected),
		}
	}

	fn decode_row(&self, _key: &[u8], value: &[u8], row: &mut Vec<u8>) -> Result<()> {
		*row = value.to_vec();
		Ok(())
	}

	fn write_row(&self, row: &Vec<u8>) -> (Vec<u8>, Vec<u8>) {
		(row.clone(), row.clone())
	}

	fn update_key(&self, _row: &Vec<u8>, _current_key: &[u8]) -> Option<Vec<u8>> {
		None
	}

	fn update_value(&self, row: &Vec<u8>, _current_value: &[u8]) -> Vec<u8> {
		row.clone()
	}

	fn evolvable_table_id(&self) -> u64 {
		0
	}
}

pub fn fake_evaluator() -> Arc<dyn RowEvaluator<Vec<u8>>> {
	Arc::new(IdentityByteEvaluator)
}
