// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! `ConcatUpdater` (spec §4.5-4.6): chains several updaters end to end,
//! the way `ConcatScanner` chains plain scanners, and routes
//! `update`/`delete` to whichever one currently holds the row.

use super::Updater;
use crate::error::{Error, Result};
use crate::scanner::Scanner;

pub struct ConcatUpdater<R> {
	sources: Vec<Box<dyn Updater<R>>>,
	index: usize,
	closed: bool,
}

impl<R> ConcatUpdater<R> {
	pub fn new(mut sources: Vec<Box<dyn Updater<R>>>) -> Result<Self> {
		let mut index = 0;
		while index < sources.len() && sources[index].row().is_none() {
			sources[index].close()?;
			index += 1;
		}
		Ok(ConcatUpdater { sources, index, closed: false })
	}

	fn skip_exhausted(&mut self) -> Result<()> {
		while self.index < self.sources.len() && self.sources[self.index].row().is_none() {
			self.sources[self.index].close()?;
			self.index += 1;
		}
		Ok(())
	}

	fn current(&mut self) -> Result<&mut Box<dyn Updater<R>>> {
		self.sources.get_mut(self.index).ok_or_else(|| Error::IllegalState("No current row".into()))
	}
}

impl<R> Scanner<R> for ConcatUpdater<R> {
	fn row(&self) -> Option<&R> {
		self.sources.get(self.index).and_then(|s| s.row())
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed || self.index >= self.sources.len() {
			return Ok(None);
		}
		self.sources[self.index].step()?;
		self.skip_exhausted()?;
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
		self.sources.iter().map(|s| s.characteristics()).fold(u32::MAX, |a, b| a & b)
	}
}

impl<R> Updater<R> for ConcatUpdater<R> {
	fn update(&mut self, row: R) -> Result<()> {
		self.current()?.update(row)?;
		self.skip_exhausted()
	}

	fn delete(&mut self) -> Result<()> {
		self.current()?.delete()?;
		self.skip_exhausted()
	}
}
