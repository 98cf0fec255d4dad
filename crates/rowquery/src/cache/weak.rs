// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `WeakCache`/`WeakClassCache` (spec §4.7): same single-flight,
//! LRU-bounded shape as [`super::MultiKeyCache`] — the source's "weak
//! reference" bound is replaced the same way the strong cache's "soft
//! reference" bound is (spec §9 option (a)), so there is nothing
//! structurally different here beyond the key shape each variant uses.

use std::any::TypeId;
use std::hash::Hash;

use super::{CacheConfig, KeyType, MultiKeyCache};
use crate::error::Result;

/// Row-type-keyed cache (spec §4.7: "`WeakCache` ... used for row-type
/// keys").
pub struct WeakCache<K, V> {
	inner: MultiKeyCache<K, V>,
}

impl<K: Eq + Hash + Clone + Send + Sync, V: Clone + Send + Sync> WeakCache<K, V> {
	pub fn new(config: CacheConfig) -> Self {
		WeakCache { inner: MultiKeyCache::new(config) }
	}

	pub fn get(&self, key: &K) -> Option<V> {
		self.inner.get(KeyType::A, key)
	}

	pub fn obtain<F>(&self, key: K, helper: F) -> Result<V>
	where
		F: FnOnce() -> Result<V>,
	{
		self.inner.obtain(KeyType::A, key, helper)
	}

	pub fn remove(&self, key: &K) {
		self.inner.remove(KeyType::A, key)
	}
}

/// Class-identity-keyed cache (spec §4.7: "keys are class identities
/// ..., matched by identity comparison of the referent"). Rust's
/// `TypeId` is exactly that identity comparison with no reflection or
/// weak-reference machinery needed to get it.
pub struct WeakClassCache<V> {
	inner: MultiKeyCache<TypeId, V>,
}

impl<V: Clone + Send + Sync> WeakClassCache<V> {
	pub fn new(config: CacheConfig) -> Self {
		WeakClassCache { inner: MultiKeyCache::new(config) }
	}

	pub fn get<T: 'static>(&self) -> Option<V> {
		self.inner.get(KeyType::A, &TypeId::of::<T>())
	}

	pub fn obtain<T: 'static, F>(&self, helper: F) -> Result<V>
	where
		F: FnOnce() -> Result<V>,
	{
		self.inner.obtain(KeyType::A, TypeId::of::<T>(), helper)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn weak_class_cache_keys_by_type_identity() {
		struct Foo;
		struct Bar;
		let cache: WeakClassCache<&'static str> = WeakClassCache::new(CacheConfig::default());
		cache.obtain::<Foo, _>(|| Ok("foo")).unwrap();
		cache.obtain::<Bar, _>(|| Ok("bar")).unwrap();
		assert_eq!(cache.get::<Foo>(), Some("foo"));
		assert_eq!(cache.get::<Bar>(), Some("bar"));
	}
}
