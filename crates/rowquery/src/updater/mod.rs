// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Scanners that can modify or delete the row at their cursor (spec
//! §4.3, §6).

mod auto_commit;
mod basic;
mod concat;
mod joined;
mod merge;
mod non_repeatable;
mod upgradable;
mod wrapped;

pub use auto_commit::AutoCommitUpdater;
pub use basic::BasicUpdater;
pub use concat::ConcatUpdater;
pub use joined::{JoinedUpdater, NullTriggerIndexAccessor, TriggerIndexAccessor};
pub use merge::MergeUpdater;
pub use non_repeatable::{NonRepeatableDiscipline, NonRepeatableUpdater};
pub use upgradable::{UpgradableDiscipline, UpgradableUpdater};
pub use wrapped::{Committer, EndCommit, RowStore, WrappedUpdater};

use crate::error::Result;
use crate::scanner::Scanner;

/// A `Scanner` that can additionally modify or delete the row currently
/// at its cursor (spec §6).
pub trait Updater<R>: Scanner<R> {
	/// Stores `row` at the cursor's current position, possibly under a
	/// different key (spec §4.3), then advances.
	fn update(&mut self, row: R) -> Result<()>;

	/// Deletes the row at the cursor's current position, then advances.
	fn delete(&mut self) -> Result<()>;
}
