// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::sync::Arc;

use super::{Bound, MergedScanController, ScanController};
use crate::evaluator::{RowEvaluator, RowPredicate};
use crate::storage::{Cursor, Transaction, View};

/// A chain of controllers ordered by ascending low bound, opportunistically
/// collapsing adjacent/overlapping members into a single
/// `MergedScanController` at construction time (spec §4.5 union scan).
pub struct RangeUnionScanController<R> {
	members: Vec<Arc<dyn ScanController<R>>>,
}

impl<R> RangeUnionScanController<R> {
	/// Builds the chain from `controllers`, which must already be sorted
	/// by ascending low bound and share the same reverse direction. Runs
	/// are merged left to right wherever `MergedScanController::try_merge`
	/// succeeds.
	pub fn new(controllers: Vec<Arc<dyn ScanController<R>>>) -> Self {
		let mut members: Vec<Arc<dyn ScanController<R>>> = Vec::with_capacity(controllers.len());
		for next in controllers {
			if next.is_empty() {
				continue;
			}
			if let Some(prev) = members.pop() {
				match MergedScanController::try_merge(prev, next) {
					Ok(merged) => members.push(Arc::new(merged)),
					Err((prev, next)) => {
						members.push(prev);
						members.push(next);
					}
				}
			} else {
				members.push(next);
			}
		}
		RangeUnionScanController { members }
	}

	fn head(&self) -> Option<&Arc<dyn ScanController<R>>> {
		self.members.first()
	}
}

impl<R> ScanController<R> for RangeUnionScanController<R> {
	fn new_cursor(&self, view: &dyn View, txn: &mut dyn Transaction) -> Box<dyn Cursor> {
		match self.head() {
			Some(c) => c.new_cursor(view, txn),
			None => view.new_cursor(txn),
		}
	}

	fn evaluator(&self) -> &Arc<dyn RowEvaluator<R>> {
		self.head().expect("range union must have at least one member to evaluate").evaluator()
	}

	fn successor(&self) -> Option<Arc<dyn ScanController<R>>> {
		if self.members.len() <= 1 {
			self.head().and_then(|c| c.successor())
		} else {
			Some(Arc::new(RangeUnionScanController { members: self.members[1..].to_vec() }))
		}
	}

	fn predicate(&self) -> Option<&Arc<dyn RowPredicate<R>>> {
		self.head().and_then(|c| c.predicate())
	}

	fn predicate_at(&self, key: &[u8]) -> Option<Arc<dyn RowPredicate<R>>> {
		self.head().and_then(|c| c.predicate_at(key))
	}

	fn characteristics(&self) -> u32 {
		self.head().map(|c| c.characteristics()).unwrap_or(0) & !super::characteristics::SIZED
	}

	fn estimate_size(&self) -> u64 {
		self.members.iter().fold(0u64, |acc, c| acc.saturating_add(c.estimate_size()))
	}

	fn is_joined(&self) -> bool {
		self.members.iter().any(|c| c.is_joined())
	}

	fn is_reverse(&self) -> bool {
		self.head().map(|c| c.is_reverse()).unwrap_or(false)
	}

	fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	fn low_bound(&self) -> &Bound {
		self.head().map(|c| c.low_bound()).unwrap_or(&Bound::Unbounded)
	}

	fn low_inclusive(&self) -> bool {
		self.head().map(|c| c.low_inclusive()).unwrap_or(true)
	}

	fn high_bound(&self) -> &Bound {
		self.members.last().map(|c| c.high_bound()).unwrap_or(&Bound::Unbounded)
	}

	fn high_inclusive(&self) -> bool {
		self.members.last().map(|c| c.high_inclusive()).unwrap_or(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::SingleScanController;
	use crate::testkit::fake_evaluator;

	fn ctrl(lo: u8, hi: u8) -> Arc<dyn ScanController<Vec<u8>>> {
		Arc::new(SingleScanController::new(
			Bound::Bytes(vec![lo]),
			true,
			Bound::Bytes(vec![hi]),
			true,
			false,
			fake_evaluator(),
			None,
		))
	}

	#[test]
	fn adjacent_ranges_merge_into_one_member() {
		let union = RangeUnionScanController::new(vec![ctrl(1, 5), ctrl(3, 8), ctrl(20, 30)]);
		assert_eq!(union.members.len(), 2);
	}

	#[test]
	fn disjoint_ranges_stay_separate() {
		let union = RangeUnionScanController::new(vec![ctrl(1, 2), ctrl(5, 6), ctrl(9, 10)]);
		assert_eq!(union.members.len(), 3);
	}

	#[test]
	fn empty_members_are_dropped() {
		let empty: Arc<dyn ScanController<Vec<u8>>> =
			Arc::new(SingleScanController::<Vec<u8>>::empty(fake_evaluator()));
		let union = RangeUnionScanController::new(vec![empty, ctrl(1, 5)]);
		assert_eq!(union.members.len(), 1);
	}

	#[test]
	fn estimate_size_sums_members() {
		let a: Arc<dyn ScanController<Vec<u8>>> = Arc::new(
			SingleScanController::new(Bound::Bytes(vec![1]), true, Bound::Bytes(vec![2]), true, false, fake_evaluator(), None)
				.with_estimate(10),
		);
		let b: Arc<dyn ScanController<Vec<u8>>> = Arc::new(
			SingleScanController::new(Bound::Bytes(vec![5]), true, Bound::Bytes(vec![6]), true, false, fake_evaluator(), None)
				.with_estimate(20),
		);
		let union = RangeUnionScanController::new(vec![a, b]);
		assert_eq!(union.estimate_size(), 30);
	}
}
