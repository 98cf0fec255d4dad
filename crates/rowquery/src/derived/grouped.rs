// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `GroupedScanner` (spec §4.4): like [`super::AggregatedScanner`], but
//! the grouper can emit several target rows per group. Implemented as
//! the flagged `BeginPending`/`InGroup`/`Emitting`/`Done` state machine
//! (see DESIGN.md: the un-flagged variant was not implemented).

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::evaluator::Grouper;
use crate::scanner::{RowComparator, Scanner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// The next source row starts a new group.
	BeginPending,
	/// Same-group rows are being folded into the grouper via `accumulate`.
	InGroup,
	/// Repeatedly draining `grouper.step(target)` for the current group.
	Emitting,
	/// Source exhausted, grouper closed; no more rows will be produced.
	Done,
}

/// Folds a source scanner, sorted by the group key, into zero or more
/// target rows per group via a caller-supplied [`Grouper`] (spec §4.4).
pub struct GroupedScanner<S, T> {
	source: Box<dyn Scanner<S>>,
	grouper: Box<dyn Grouper<S, T>>,
	comparator: Arc<dyn RowComparator<S>>,
	header: Option<S>,
	state: State,
	target: Option<T>,
	closed: bool,
}

impl<S, T> GroupedScanner<S, T> {
	pub fn new(
		source: Box<dyn Scanner<S>>,
		grouper: Box<dyn Grouper<S, T>>,
		comparator: Arc<dyn RowComparator<S>>,
		seed: T,
	) -> Result<Self> {
		let mut scanner = GroupedScanner {
			source,
			grouper,
			comparator,
			header: None,
			state: State::BeginPending,
			target: Some(seed),
			closed: false,
		};
		scanner.advance()?;
		Ok(scanner)
	}

	fn advance(&mut self) -> Result<()> {
		loop {
			match self.state {
				State::Done => {
					self.target = None;
					return Ok(());
				}

				State::BeginPending => match self.source.row() {
					Some(row) => {
						self.header = self.grouper.begin(row);
						self.state = State::InGroup;
					}
					None => {
						self.grouper.close();
						self.state = State::Done;
					}
				},

				State::InGroup => {
					loop {
						let stepped = self
							.source
							.step()
							.map_err(|e| Error::scan_failure("GroupedScanner", e))?;
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
						let _ = self.grouper.accumulate(row);
					}
					self.state = State::Emitting;
				}

				State::Emitting => {
					let mut target =
						self.target.take().expect("GroupedScanner always holds a target buffer");
					let produced = self.grouper.step(&mut target);
					if !produced {
						self.target = Some(target);
						self.state = State::BeginPending;
						continue;
					}
					let accept = self.grouper.finish(&mut target)?;
					self.target = Some(target);
					if accept {
						return Ok(());
					}
					// filter hook rejected this row; keep draining the same group.
				}
			}
		}
	}
}

impl<S, T> Scanner<T> for GroupedScanner<S, T> {
	fn row(&self) -> Option<&T> {
		if self.closed || self.state == State::Done {
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
		if self.state == State::Done {
			Ok(None)
		} else {
			Ok(self.target.as_ref())
		}
	}

	fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		let result = self.source.close();
		if self.state != State::Done {
			self.grouper.close();
		}
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

	/// Emits each row of a group twice.
	struct Doubler {
		remaining: Vec<(i64, i64)>,
	}

	impl Grouper<(i64, i64), (i64, i64)> for Doubler {
		fn begin(&mut self, source: &(i64, i64)) -> Option<(i64, i64)> {
			self.remaining = vec![*source, *source];
			Some(*source)
		}

		fn accumulate(&mut self, source: &(i64, i64)) -> Option<(i64, i64)> {
			self.remaining.push(*source);
			self.remaining.push(*source);
			Some(*source)
		}

		fn step(&mut self, target: &mut (i64, i64)) -> bool {
			match self.remaining.pop() {
				Some(row) => {
					*target = row;
					true
				}
				None => false,
			}
		}

		fn finished(&self) -> bool {
			self.remaining.is_empty()
		}

		fn close(&mut self) {}
	}

	#[test]
	fn emits_each_row_twice_per_group() {
		let source: Box<dyn Scanner<(i64, i64)>> =
			Box::new(ArrayScanner::new(vec![(1, 10), (1, 20), (2, 5)]));
		let grouper = Box::new(Doubler { remaining: Vec::new() });
		let comparator: Arc<dyn RowComparator<(i64, i64)>> = Arc::new(|a: &(i64, i64), b: &(i64, i64)| a.0.cmp(&b.0));

		let mut scanner = GroupedScanner::new(source, grouper, comparator, (0, 0)).unwrap();
		let mut seen = Vec::new();
		if let Some(row) = scanner.row() {
			seen.push(*row);
		}
		while let Some(row) = scanner.step().unwrap() {
			seen.push(*row);
		}
		assert_eq!(seen.len(), 6);
		assert_eq!(seen.iter().filter(|r| r.0 == 1).count(), 4);
		assert_eq!(seen.iter().filter(|r| r.0 == 2).count(), 2);
	}
}
