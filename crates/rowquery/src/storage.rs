// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Contracts consumed from the storage engine (spec §6). The storage
//! engine itself — the ordered key/value store, its lock manager and
//! its transactions — is an out-of-scope external collaborator
//! (spec §1); this module only pins down the trait surface the query
//! core drives.

use crate::error::Result;

/// Mirrors the storage engine's lock-acquisition outcomes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
	Unowned,
	Acquired,
	OwnedShared,
	OwnedUpgradable,
	OwnedExclusive,
	Interrupted,
	TimedOut,
}

impl LockResult {
	/// True when this step newly took the lock, as opposed to finding it
	/// already held — used to decide whether to release it again on a
	/// rejected or stepped-over row (spec §4.2, §4.3).
	pub fn freshly_acquired(self) -> bool {
		matches!(self, LockResult::Acquired)
	}

	pub fn is_owned(self) -> bool {
		matches!(self, LockResult::OwnedShared | LockResult::OwnedUpgradable | LockResult::OwnedExclusive)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
	Unlocked,
	ReadCommitted,
	Repeatable,
	Upgradable,
	Exclusive,
}

/// A storage transaction (spec §6). Lifetimes of nested scopes follow
/// `enter`/`exit`, mirroring the source's "nested transaction scope"
/// used for key-changing updates and auto-commit.
pub trait Transaction: Send {
	fn lock_mode(&self) -> LockMode;
	fn set_lock_mode(&mut self, mode: LockMode) -> LockMode;

	fn unlock(&mut self, key: &[u8]);
	/// Releases a secondary+primary lock pair atomically (spec §5).
	fn unlock_combine(&mut self, secondary_key: &[u8], primary_key: &[u8]);

	fn enter(&mut self) -> Result<()>;
	fn exit(&mut self) -> Result<()>;
	fn commit(&mut self) -> Result<()>;

	fn was_acquired(&self, key: &[u8]) -> bool;
}

/// A storage cursor (spec §6), positioned over one index.
pub trait Cursor: Send {
	fn first(&mut self) -> Result<()>;
	fn last(&mut self) -> Result<()>;
	fn next(&mut self) -> Result<()>;
	fn previous(&mut self) -> Result<()>;
	/// Positions at the smallest key >= `key` (ceiling), or unpositioned
	/// if none exists.
	fn find_ceiling(&mut self, key: &[u8]) -> Result<()>;
	/// Positions at the largest key <= `key` (floor), or unpositioned if
	/// none exists.
	fn find_floor(&mut self, key: &[u8]) -> Result<()>;

	fn key(&self) -> Option<&[u8]>;
	fn value(&self) -> Option<&[u8]>;
	fn lock_result(&self) -> LockResult;

	fn compare_key_to(&self, key: &[u8]) -> std::cmp::Ordering;

	fn store(&mut self, value: &[u8]) -> Result<()>;
	fn delete(&mut self) -> Result<()>;
	fn exists(&self) -> bool {
		self.key().is_some()
	}

	fn reset(&mut self);
}

/// A storage index (spec §6).
pub trait Index: Send + Sync {
	fn id(&self) -> u64;
	fn is_empty(&self, txn: &mut dyn Transaction) -> Result<bool>;

	fn load(&self, txn: &mut dyn Transaction, key: &[u8]) -> Result<Option<Vec<u8>>>;
	fn insert(&self, txn: &mut dyn Transaction, key: &[u8], value: &[u8]) -> Result<bool>;

	fn new_cursor(&self, txn: &mut dyn Transaction) -> Box<dyn Cursor>;
}

/// Read-only view over an index (spec §6), used where a controller must
/// open a cursor without assuming write access.
pub trait View: Send + Sync {
	fn new_cursor(&self, txn: &mut dyn Transaction) -> Box<dyn Cursor>;
}

/// A lock object preventing inserts of rows matching a predicate, used
/// while a key-changing update is in flight (spec §6, §4.3).
pub trait RowPredicateLock<R>: Send + Sync {
	/// Acquires the predicate lock for `(row, new_key, new_value)` and
	/// returns a closer that releases it; the caller must hold the
	/// closer for the duration of the nested transaction scope.
	fn open_acquire_p(
		&self,
		txn: &mut dyn Transaction,
		row: &R,
		new_key: &[u8],
		new_value: &[u8],
	) -> Result<Box<dyn FnOnce(&mut dyn Transaction) + Send>>;

	/// Switches the transaction into predicate-lock redo mode ahead of a
	/// key-changing insert (spec §4.3 step 3).
	fn redo_predicate_mode(&self, txn: &mut dyn Transaction);
}
