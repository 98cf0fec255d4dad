// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `MergeUpdater` (spec §4.5 variant table): merges several updaters by
//! row order and routes `update`/`delete` to whichever child currently
//! holds the merged head.
//!
//! `MergeScanner` picks the head via a binary tournament tree so that
//! each step is `O(log n)`; an updatable merge additionally has to
//! mutate through whichever leaf is current, which a tree of trait
//! objects can't expose without downcasting. This picks the minimum by
//! a linear scan instead — `O(n)` per step, acceptable for the small
//! fan-ins key-changing updates realistically merge (see DESIGN.md).

use std::cmp::Ordering;
use std::sync::Arc;

use super::Updater;
use crate::error::{Error, Result};
use crate::scanner::{RowComparator, Scanner};

pub struct MergeUpdater<R> {
	sources: Vec<Box<dyn Updater<R>>>,
	comparator: Arc<dyn RowComparator<R>>,
	current: Option<usize>,
	closed: bool,
}

impl<R> MergeUpdater<R> {
	pub fn new(sources: Vec<Box<dyn Updater<R>>>, comparator: Arc<dyn RowComparator<R>>) -> Self {
		let mut m = MergeUpdater { sources, comparator, current: None, closed: false };
		m.pick_current();
		m
	}

	fn pick_current(&mut self) {
		let mut best: Option<usize> = None;
		for (i, s) in self.sources.iter().enumerate() {
			let Some(row) = s.row() else { continue };
			best = Some(match best {
				None => i,
				Some(b) => {
					let other = self.sources[b].row().expect("candidate index always has a row");
					if self.comparator.compare(row, other) == Ordering::Less {
						i
					} else {
						b
					}
				}
			});
		}
		self.current = best;
	}
}

impl<R> Scanner<R> for MergeUpdater<R> {
	fn row(&self) -> Option<&R> {
		self.current.and_then(|i| self.sources[i].row())
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed {
			return Ok(None);
		}
		if let Some(i) = self.current {
			self.sources[i].step()?;
		}
		self.pick_current();
		Ok(self.row())
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		for s in self.sources.iter_mut() {
			s.close()?;
		}
		Ok(())
	}

	fn estimate_size(&self) -> u64 {
		self.sources.iter().map(|s| s.estimate_size()).fold(0u64, |a, b| a.saturating_add(b))
	}

	fn characteristics(&self) -> u32 {
		crate::scanner::characteristics::SORTED
	}

	fn get_comparator(&self) -> Result<Arc<dyn RowComparator<R>>> {
		Ok(self.comparator.clone())
	}
}

impl<R> Updater<R> for MergeUpdater<R> {
	fn update(&mut self, row: R) -> Result<()> {
		let i = self.current.ok_or_else(|| Error::IllegalState("No current row".into()))?;
		self.sources[i].update(row)?;
		self.pick_current();
		Ok(())
	}

	fn delete(&mut self) -> Result<()> {
		let i = self.current.ok_or_else(|| Error::IllegalState("No current row".into()))?;
		self.sources[i].delete()?;
		self.pick_current();
		Ok(())
	}
}
