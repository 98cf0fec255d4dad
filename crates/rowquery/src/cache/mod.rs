// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Single-flight, capacity-bounded caches for dynamically generated
//! query plans and catalog lookups (spec §4.7).
//!
//! The source bounds cache size with GC-driven soft/weak references
//! drained from a reference queue on every mutating op. This crate has
//! no garbage collector, so per spec §9's option (a) these are
//! replaced with an explicit LRU over a configured capacity plus an
//! eviction callback. Single-flight is built on `once_cell::sync::OnceCell`
//! stored per key rather than a hand-rolled exclusive/shared latch table:
//! the first caller to reach a key's cell runs the builder inside
//! `OnceCell::get_or_try_init`, and every concurrent caller for the same
//! key blocks on that same call until it resolves — which is exactly the
//! "install a latch, wait on it, loop back to the fast path" protocol
//! spec §4.7 describes, with the waiting and publishing folded into one
//! primitive instead of kept as two.

mod multi;
mod query_factory;
mod weak;

pub use multi::{CacheKey, KeyType, MultiKeyCache};
pub use query_factory::QueryFactoryCache;
pub use weak::{WeakCache, WeakClassCache};

/// Tunable knobs for the caches in this module (spec §9: "cache
/// capacity before rehash" among the externally-tunable constants).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
	/// Entries held before the LRU starts evicting the least recently
	/// touched one. Spec §4.7 rehashes a GC-sized table at `size >=
	/// capacity`; here capacity is a hard cap rather than a resize
	/// trigger, since there is no backing hash table to grow.
	pub capacity: usize,
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfig { capacity: 4096 }
	}
}
