// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::sync::Arc;

use super::discipline::{DefaultDiscipline, ScanDiscipline};
use super::Scanner;
use crate::controller::ScanController;
use crate::error::{Error, Result};
use crate::evaluator::EvalOutcome;
use crate::storage::{Cursor, Transaction, View};

/// Primary-index scan driven by a chain of `ScanController`s (spec §4.2).
pub struct BasicScanner<'txn, R, D: ScanDiscipline<R> = DefaultDiscipline> {
	view: Arc<dyn View>,
	txn: &'txn mut dyn Transaction,
	controller: Option<Arc<dyn ScanController<R>>>,
	cursor: Option<Box<dyn Cursor>>,
	discipline: D,
	row: Option<R>,
	closed: bool,
}

impl<'txn, R> BasicScanner<'txn, R, DefaultDiscipline> {
	pub fn new(
		view: Arc<dyn View>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		seed: R,
	) -> Result<Self> {
		Self::with_discipline(view, txn, controller, seed, DefaultDiscipline)
	}
}

impl<'txn, R, D: ScanDiscipline<R>> BasicScanner<'txn, R, D> {
	pub fn with_discipline(
		view: Arc<dyn View>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		seed: R,
		discipline: D,
	) -> Result<Self> {
		let mut scanner = BasicScanner {
			view,
			txn,
			controller: Some(controller),
			cursor: None,
			discipline,
			row: Some(seed),
			closed: false,
		};
		scanner.init()?;
		Ok(scanner)
	}

	fn init(&mut self) -> Result<()> {
		self.open_current_controller()?;
		self.advance(true)
	}

	/// Opens a cursor on the current controller and positions it at the
	/// first candidate (spec §4.2 step 1b).
	fn open_current_controller(&mut self) -> Result<()> {
		let Some(controller) = self.controller.clone() else {
			self.cursor = None;
			return Ok(());
		};
		if let Some(row) = self.row.as_mut() {
			self.discipline.begin_batch(row);
		}
		let mut cursor = controller.new_cursor(self.view.as_ref(), self.txn);
		self.discipline.to_first(self.txn, controller.as_ref(), cursor.as_mut())?;
		self.cursor = Some(cursor);
		Ok(())
	}

	/// Drives the evaluation loop until a row is admitted or the whole
	/// controller chain is exhausted. `first` controls whether the very
	/// first position is evaluated without advancing first.
	fn advance(&mut self, mut first: bool) -> Result<()> {
		loop {
			let Some(controller) = self.controller.clone() else {
				self.row = None;
				return Ok(());
			};
			let Some(cursor) = self.cursor.as_mut() else {
				self.row = None;
				return Ok(());
			};

			if cursor.key().is_none() {
				// spec §4.2 step 1c: exhausted this controller, move to the
				// next link in the chain.
				self.controller = controller.successor();
				self.open_current_controller()?;
				first = true;
				continue;
			}

			if !first {
				match self.discipline.to_next(self.txn, controller.as_ref(), self.cursor.as_mut().unwrap()) {
					Ok(()) => {}
					Err(Error::UnpositionedCursor) => {
						self.controller = controller.successor();
						self.open_current_controller()?;
						first = true;
						continue;
					}
					Err(e) => return Err(wrap_scan_failure(e)),
				}
				let cursor = self.cursor.as_mut().unwrap();
				if cursor.key().is_none() {
					self.controller = controller.successor();
					self.open_current_controller()?;
					first = true;
					continue;
				}
			}
			first = false;

			let mut row = self.row.take().expect("BasicScanner always holds a row buffer between steps");
			let cursor = self.cursor.as_mut().unwrap();
			let lock_result = cursor.lock_result();
			let key = cursor.key().map(|k| k.to_vec());
			let outcome = controller.evaluator().eval_row(cursor.as_mut(), lock_result, &mut row).map_err(wrap_scan_failure)?;

			match outcome {
				EvalOutcome::Admitted => {
					self.row = Some(row);
					return Ok(());
				}
				EvalOutcome::Rejected => {
					if let Some(key) = key {
						self.discipline.unlocked(self.txn, &key, lock_result);
					}
					self.row = Some(row);
					// loop again: advance past this position.
				}
				EvalOutcome::Stopped => {
					if let Some(key) = key {
						self.discipline.unlocked(self.txn, &key, lock_result);
					}
					self.row = Some(row);
					first = true; // retry at the same position, don't advance.
				}
			}
		}
	}
}

fn wrap_scan_failure(source: Error) -> Error {
	Error::scan_failure("BasicScanner", source)
}

impl<'txn, R, D: ScanDiscipline<R>> Scanner<R> for BasicScanner<'txn, R, D> {
	fn row(&self) -> Option<&R> {
		if self.closed {
			None
		} else {
			self.row.as_ref()
		}
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed {
			return Ok(None);
		}
		self.advance(false)?;
		Ok(self.row.as_ref())
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		self.cursor = None;
		self.row = None;
		Ok(())
	}

	fn estimate_size(&self) -> u64 {
		self.controller.as_ref().map(|c| c.estimate_size()).unwrap_or(0)
	}

	fn characteristics(&self) -> u32 {
		self.controller.as_ref().map(|c| c.characteristics()).unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::{Bound, SingleScanController};
	use crate::testkit::{fake_evaluator, FakeTransaction, MemIndex};

	#[test]
	fn basic_scan_yields_rows_in_order() {
		let index = MemIndex::from_pairs(
			1,
			vec![(vec![1], vec![10]), (vec![2], vec![20]), (vec![3], vec![30])],
		);
		let controller: Arc<dyn ScanController<Vec<u8>>> =
			Arc::new(SingleScanController::new(Bound::Unbounded, true, Bound::Unbounded, true, false, fake_evaluator(), None));
		let mut txn = FakeTransaction::new();
		let mut scanner = BasicScanner::new(index.clone(), &mut txn, controller, Vec::new()).unwrap();

		let mut seen = Vec::new();
		if let Some(row) = scanner.row() {
			seen.push(row.clone());
		}
		while let Some(row) = scanner.step().unwrap() {
			seen.push(row.clone());
		}
		assert_eq!(seen, vec![vec![10], vec![20], vec![30]]);
	}

	#[test]
	fn empty_controller_yields_nothing() {
		let index = MemIndex::new(1);
		let controller: Arc<dyn ScanController<Vec<u8>>> =
			Arc::new(SingleScanController::<Vec<u8>>::empty(fake_evaluator()));
		let mut txn = FakeTransaction::new();
		let scanner = BasicScanner::new(index, &mut txn, controller, Vec::new()).unwrap();
		assert!(scanner.row().is_none());
	}
}
