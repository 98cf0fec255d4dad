// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::cmp::Ordering;
use std::sync::Arc;

use super::{characteristics, MergeScanner, RowComparator, Scanner};
use crate::error::Result;

/// `MergeScanner` followed by a dedup step: no two adjacent rows compare
/// equal under the union comparator (spec §4.5, §8). Requires `R: Clone`
/// to remember the last-emitted row across a `step()` call, since the
/// merge tree's row reference can't outlive the mutable borrow `step`
/// needs to advance it.
pub struct UnionScanner<R> {
	inner: MergeScanner<R>,
	comparator: Arc<dyn RowComparator<R>>,
	last: Option<R>,
	closed: bool,
}

impl<R: Clone + Send + 'static> UnionScanner<R> {
	pub fn new(sources: Vec<Box<dyn Scanner<R>>>, comparator: Arc<dyn RowComparator<R>>) -> Result<Self> {
		let inner = MergeScanner::new(sources, comparator.clone())?;
		let last = inner.row().cloned();
		Ok(UnionScanner { inner, comparator, last, closed: false })
	}
}

impl<R: Clone + Send> Scanner<R> for UnionScanner<R> {
	fn row(&self) -> Option<&R> {
		if self.closed {
			None
		} else {
			self.inner.row()
		}
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed {
			return Ok(None);
		}
		loop {
			self.inner.step()?;
			match self.inner.row() {
				None => {
					self.last = None;
					return Ok(None);
				}
				Some(r) => {
					let dup = self.last.as_ref().is_some_and(|l| self.comparator.compare(l, r) == Ordering::Equal);
					if dup {
						continue;
					}
					self.last = Some(r.clone());
					return Ok(self.inner.row());
				}
			}
		}
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		self.inner.close()
	}

	fn estimate_size(&self) -> u64 {
		self.inner.estimate_size()
	}

	fn characteristics(&self) -> u32 {
		characteristics::SORTED | characteristics::ORDERED | characteristics::DISTINCT
	}

	fn get_comparator(&self) -> Result<Arc<dyn RowComparator<R>>> {
		Ok(self.comparator.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scanner::ArrayScanner;

	fn nat_order() -> Arc<dyn RowComparator<i32>> {
		Arc::new(|a: &i32, b: &i32| a.cmp(b))
	}

	#[test]
	fn union_dedups_adjacent_equal_rows() {
		let a: Box<dyn Scanner<i32>> = Box::new(ArrayScanner::new(vec![1, 2, 4]));
		let b: Box<dyn Scanner<i32>> = Box::new(ArrayScanner::new(vec![2, 3, 4]));
		let mut s = UnionScanner::new(vec![a, b], nat_order()).unwrap();
		let mut out = vec![*s.row().unwrap()];
		while let Some(r) = s.step().unwrap() {
			out.push(*r);
		}
		assert_eq!(out, vec![1, 2, 3, 4]);
	}
}
