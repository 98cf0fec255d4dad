// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `QueryFactoryCache` (spec §4.7): string-keyed cache of generated
//! query-factory handles, with canonical-key aliasing — "on insert, if
//! the parsed query's canonical form differs from the key, the factory
//! under the canonical key is obtained recursively and aliased back".
//!
//! `order_by::OrderBy::for_spec`/`spec` already produces exactly this
//! kind of deterministic canonical form (spec §3); `canonicalize` here
//! is typically that round-trip, passed in rather than hardcoded so this
//! cache also serves query specs beyond order-by clauses.

use super::{CacheConfig, KeyType, MultiKeyCache};
use crate::error::Result;

pub struct QueryFactoryCache<V> {
	inner: MultiKeyCache<String, V>,
	canonicalize: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
}

impl<V: Clone + Send + Sync> QueryFactoryCache<V> {
	pub fn new(config: CacheConfig, canonicalize: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
		QueryFactoryCache { inner: MultiKeyCache::new(config), canonicalize: Box::new(canonicalize) }
	}

	/// Obtains the factory handle for `spec`, building it via `build` at
	/// most once per canonical form even when called under several
	/// non-canonical aliases.
	#[tracing::instrument(level = "trace", skip(self, build))]
	pub fn obtain<F>(&self, spec: &str, build: F) -> Result<V>
	where
		F: Fn() -> Result<V>,
	{
		let canonical = (self.canonicalize)(spec)?;
		if canonical == spec {
			return self.inner.obtain(KeyType::A, spec.to_string(), &build);
		}
		let value = self.inner.obtain(KeyType::A, canonical, &build)?;
		self.inner.obtain(KeyType::A, spec.to_string(), || Ok(value.clone()))?;
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn non_canonical_spec_is_aliased_to_the_canonical_build() {
		let builds = AtomicUsize::new(0);
		let cache: QueryFactoryCache<i32> = QueryFactoryCache::new(CacheConfig::default(), |spec| {
			Ok(spec.trim_start_matches('+').to_string())
		});
		let v1 = cache
			.obtain("+name", || {
				builds.fetch_add(1, Ordering::SeqCst);
				Ok(1)
			})
			.unwrap();
		let v2 = cache
			.obtain("+name", || {
				builds.fetch_add(1, Ordering::SeqCst);
				Ok(2)
			})
			.unwrap();
		let v3 = cache
			.obtain("name", || {
				builds.fetch_add(1, Ordering::SeqCst);
				Ok(3)
			})
			.unwrap();
		assert_eq!((v1, v2, v3), (1, 1, 1));
		assert_eq!(builds.load(Ordering::SeqCst), 1);
	}
}
