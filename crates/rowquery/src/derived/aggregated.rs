// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `AggregatedScanner` (spec §4.4): folds consecutive source rows that
//! share a group key into one target row per non-empty group.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::evaluator::Aggregator;
use crate::scanner::{RowComparator, Scanner};

/// Folds a source scanner, sorted by the group key, into target rows via
/// a caller-supplied [`Aggregator`] (spec §4.4). `comparator` decides
/// group membership; `aggregator.begin`/`accumulate` fold rows, and
/// `finish` either produces a target row or signals an empty group.
pub struct AggregatedScanner<S, T> {
	source: Box<dyn Scanner<S>>,
	aggregator: Box<dyn Aggregator<S, T>>,
	comparator: Arc<dyn RowComparator<S>>,
	/// The first row of the current group, as handed back by
	/// `aggregator.begin`; `None` once the source is exhausted.
	header: Option<S>,
	target: Option<T>,
	closed: bool,
}

impl<S, T> AggregatedScanner<S, T> {
	pub fn new(
		source: Box<dyn Scanner<S>>,
		mut aggregator: Box<dyn Aggregator<S, T>>,
		comparator: Arc<dyn RowComparator<S>>,
		seed: T,
	) -> Result<Self> {
		let header = match source.row() {
			Some(row) => aggregator.begin(row),
			None => None,
		};
		let mut scanner =
			AggregatedScanner { source, aggregator, comparator, header, target: Some(seed), closed: false };
		scanner.advance()?;
		Ok(scanner)
	}

	/// Drives the fold loop until a non-empty group produces a target
	/// row, or the source is exhausted (spec §4.4 steps 1-3).
	fn advance(&mut self) -> Result<()> {
		loop {
			if self.header.is_none() {
				self.target = None;
				return Ok(());
			}

			loop {
				let stepped =
					self.source.step().map_err(|e| Error::scan_failure("AggregatedScanner", e))?;
				if stepped.is_none() {
					break;
				}
				let same_group = {
					let header = self.header.as_ref().expect("group in progress");
					let row = self.source.row().expect("just stepped to a row");
					self.comparator.compare(header, row) == Ordering::Equal
				};
				if !same_group {
					break;
				}
				let row = self.source.row().expect("just stepped to a row");
				let _ = self.aggregator.accumulate(row);
			}

			let mut target = self.target.take().expect("AggregatedScanner always holds a target buffer");
			let produced = self.aggregator.finish(&mut target);
			self.target = Some(target);

			self.header = match self.source.row() {
				Some(row) => self.aggregator.begin(row),
				None => None,
			};

			if produced {
				return Ok(());
			}
			// empty group (spec §8: "emit nothing"); loop to fold the next one.
		}
	}
}

impl<S, T> Scanner<T> for AggregatedScanner<S, T> {
	fn row(&self) -> Option<&T> {
		if self.closed {
			None
		} else {
			self.target.as_ref()
		}
	}

	fn step(&mut self) -> Result<Option<&T>> {
		if self.closed {
			return Ok(None);
		}
		self.advance()?;
		Ok(self.target.as_ref())
	}

	fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		let result = self.source.close();
		self.aggregator.close();
		self.target = None;
		result
	}

	fn estimate_size(&self) -> u64 {
		self.source.estimate_size()
	}

	fn characteristics(&self) -> u32 {
		0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scanner::ArrayScanner;

	struct SumByGroup {
		group: i64,
		total: i64,
	}

	impl Aggregator<(i64, i64), (i64, i64)> for SumByGroup {
		fn begin(&mut self, source: &(i64, i64)) -> Option<(i64, i64)> {
			self.group = source.0;
			self.total = source.1;
			Some(*source)
		}

		fn accumulate(&mut self, source: &(i64, i64)) -> Option<(i64, i64)> {
			self.total += source.1;
			Some(*source)
		}

		fn finish(&mut self, target: &mut (i64, i64)) -> bool {
			*target = (self.group, self.total);
			true
		}

		fn close(&mut self) {}
	}

	#[test]
	fn sums_consecutive_equal_group_keys() {
		let source: Box<dyn Scanner<(i64, i64)>> = Box::new(ArrayScanner::new(vec![
			(1, 10),
			(1, 20),
			(2, 5),
			(2, 5),
			(3, 0),
		]));
		let aggregator = Box::new(SumByGroup { group: 0, total: 0 });
		let comparator: Arc<dyn RowComparator<(i64, i64)>> = Arc::new(|a: &(i64, i64), b: &(i64, i64)| a.0.cmp(&b.0));

		let mut scanner = AggregatedScanner::new(source, aggregator, comparator, (0, 0)).unwrap();
		let mut seen = Vec::new();
		if let Some(row) = scanner.row() {
			seen.push(*row);
		}
		while let Some(row) = scanner.step().unwrap() {
			seen.push(*row);
		}
		assert_eq!(seen, vec![(1, 30), (2, 10), (3, 0)]);
	}
}
