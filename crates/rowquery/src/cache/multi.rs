// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `MultiKeyCache`: up to four logical key-types sharing one cache
//! (spec §4.7). A Java hash table mixes a type-specific multiplier into
//! the hash to keep the types from colliding in one bucket array; a Rust
//! map's key can just be the `(KeyType, K)` pair directly, so that
//! mixing trick has no counterpart here.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::CacheConfig;
use crate::error::{Error, Result};

/// One of up to four logical partitions sharing a `MultiKeyCache`
/// (spec §4.7: "up to four logical key-types in one table").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
	A,
	B,
	C,
	D,
}

pub type CacheKey<K> = (KeyType, K);

struct Slot<V> {
	cell: Arc<OnceCell<V>>,
}

/// Single-flight, LRU-bounded cache over `(KeyType, K) -> V` (spec
/// §4.7). `obtain` is the spec's `obtain(type, key, helper)`.
pub struct MultiKeyCache<K, V> {
	entries: DashMap<CacheKey<K>, Slot<V>>,
	order: Mutex<VecDeque<CacheKey<K>>>,
	config: CacheConfig,
	on_evict: Option<Box<dyn Fn(KeyType, &K, &V) + Send + Sync>>,
}

impl<K: Eq + Hash + Clone + Send + Sync, V: Clone + Send + Sync> MultiKeyCache<K, V> {
	pub fn new(config: CacheConfig) -> Self {
		MultiKeyCache { entries: DashMap::new(), order: Mutex::new(VecDeque::new()), config, on_evict: None }
	}

	pub fn with_eviction_callback(mut self, f: impl Fn(KeyType, &K, &V) + Send + Sync + 'static) -> Self {
		self.on_evict = Some(Box::new(f));
		self
	}

	pub fn get(&self, kind: KeyType, key: &K) -> Option<V> {
		let k = (kind, key.clone());
		let value = self.entries.get(&k).and_then(|slot| slot.cell.get().cloned());
		if value.is_some() {
			self.touch(&k);
		}
		value
	}

	/// Single-flights construction of the value for `(kind, key)` (spec
	/// §4.7 `obtain`). Concurrent callers for the same key block inside
	/// `helper` on the shared `OnceCell` rather than racing to build it
	/// twice. Failed construction removes the (still-empty) slot so a
	/// later `obtain` retries instead of observing a permanently-poisoned
	/// cell.
	#[tracing::instrument(level = "trace", skip(self, helper))]
	pub fn obtain<F>(&self, kind: KeyType, key: K, helper: F) -> Result<V>
	where
		F: FnOnce() -> Result<V>,
	{
		let k = (kind, key);
		if let Some(slot) = self.entries.get(&k) {
			if let Some(v) = slot.cell.get() {
				tracing::trace!("multi-key cache hit");
				self.touch(&k);
				return Ok(v.clone());
			}
		}
		let cell = self.entries.entry(k.clone()).or_insert_with(|| Slot { cell: Arc::new(OnceCell::new()) }).cell.clone();
		tracing::trace!("multi-key cache single-flight build");
		let result = cell.get_or_try_init(helper);
		match result {
			Ok(v) => {
				self.touch(&k);
				self.evict_if_needed();
				Ok(v.clone())
			}
			Err(e) => {
				self.entries.remove(&k);
				Err(e)
			}
		}
	}

	fn touch(&self, k: &CacheKey<K>) {
		let mut order = self.order.lock();
		if let Some(pos) = order.iter().position(|e| e == k) {
			order.remove(pos);
		}
		order.push_back(k.clone());
	}

	fn evict_if_needed(&self) {
		loop {
			if self.entries.len() <= self.config.capacity {
				return;
			}
			let oldest = {
				let mut order = self.order.lock();
				order.pop_front()
			};
			let Some((kind, key)) = oldest else { return };
			if let Some((_, slot)) = self.entries.remove(&(kind, key.clone())) {
				if let (Some(cb), Some(v)) = (&self.on_evict, slot.cell.get()) {
					cb(kind, &key, v);
				}
			}
		}
	}

	pub fn remove(&self, kind: KeyType, key: &K) {
		self.entries.remove(&(kind, key.clone()));
		let mut order = self.order.lock();
		if let Some(pos) = order.iter().position(|e| e == &(kind, key.clone())) {
			order.remove(pos);
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn obtain_caches_the_built_value() {
		let cache: MultiKeyCache<String, i32> = MultiKeyCache::new(CacheConfig::default());
		let builds = AtomicUsize::new(0);
		let v1 = cache
			.obtain(KeyType::A, "x".into(), || {
				builds.fetch_add(1, Ordering::SeqCst);
				Ok(42)
			})
			.unwrap();
		let v2 = cache
			.obtain(KeyType::A, "x".into(), || {
				builds.fetch_add(1, Ordering::SeqCst);
				Ok(99)
			})
			.unwrap();
		assert_eq!(v1, 42);
		assert_eq!(v2, 42);
		assert_eq!(builds.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn distinct_key_types_do_not_collide_on_the_same_key_value() {
		let cache: MultiKeyCache<String, i32> = MultiKeyCache::new(CacheConfig::default());
		cache.obtain(KeyType::A, "x".into(), || Ok(1)).unwrap();
		cache.obtain(KeyType::B, "x".into(), || Ok(2)).unwrap();
		assert_eq!(cache.get(KeyType::A, &"x".to_string()), Some(1));
		assert_eq!(cache.get(KeyType::B, &"x".to_string()), Some(2));
	}

	#[test]
	fn failed_build_does_not_poison_the_slot() {
		let cache: MultiKeyCache<String, i32> = MultiKeyCache::new(CacheConfig::default());
		assert!(cache.obtain(KeyType::A, "x".into(), || Err(Error::Unsupported("boom".into()))).is_err());
		let v = cache.obtain(KeyType::A, "x".into(), || Ok(7)).unwrap();
		assert_eq!(v, 7);
	}

	#[test]
	fn evicts_the_least_recently_touched_entry_over_capacity() {
		let cache: MultiKeyCache<i32, i32> = MultiKeyCache::new(CacheConfig { capacity: 2 });
		cache.obtain(KeyType::A, 1, || Ok(1)).unwrap();
		cache.obtain(KeyType::A, 2, || Ok(2)).unwrap();
		cache.obtain(KeyType::A, 3, || Ok(3)).unwrap();
		assert_eq!(cache.get(KeyType::A, &1), None);
		assert_eq!(cache.get(KeyType::A, &2), Some(2));
		assert_eq!(cache.get(KeyType::A, &3), Some(3));
	}

	#[test]
	fn single_flight_builds_only_once_across_threads() {
		let cache: Arc<MultiKeyCache<String, i32>> = Arc::new(MultiKeyCache::new(CacheConfig::default()));
		let builds = Arc::new(AtomicUsize::new(0));
		std::thread::scope(|scope| {
			for _ in 0..8 {
				let cache = cache.clone();
				let builds = builds.clone();
				scope.spawn(move || {
					cache
						.obtain(KeyType::A, "shared".into(), || {
							builds.fetch_add(1, Ordering::SeqCst);
							std::thread::sleep(std::time::Duration::from_millis(5));
							Ok(7)
						})
						.unwrap()
				});
			}
		});
		assert_eq!(builds.load(Ordering::SeqCst), 1);
	}
}
