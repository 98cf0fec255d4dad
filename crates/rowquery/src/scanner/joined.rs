// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::sync::Arc;

use super::discipline::{DefaultDiscipline, ScanDiscipline};
use super::Scanner;
use crate::controller::ScanController;
use crate::error::{Error, Result};
use crate::evaluator::EvalOutcome;
use crate::storage::{Cursor, Index, LockResult, Transaction, View};

/// A `RowEvaluator` variant for joined scans: the cursor walking the
/// secondary index only carries the indexed columns, so decoding a row
/// additionally needs a primary-index cursor resolved from the
/// secondary key (spec §6 "`evalRow(cursor, lockResult, row[,
/// primaryCursor])`").
pub trait JoinedRowEvaluator<R>: Send + Sync {
	fn eval_joined_row(
		&self,
		secondary: &mut dyn Cursor,
		primary: &mut dyn Cursor,
		lock_result: LockResult,
		row: &mut R,
	) -> Result<EvalOutcome>;

	/// Extracts the primary key embedded in a secondary-index key.
	fn primary_key_of(&self, secondary_key: &[u8]) -> Vec<u8>;
}

/// Iterates a secondary index, resolving each candidate through the
/// primary index before handing both cursors to the evaluator (spec
/// §4.3 `JoinedUpdater`'s read side).
pub struct JoinedScanner<'txn, R, D: ScanDiscipline<R> = DefaultDiscipline> {
	secondary_view: Arc<dyn View>,
	primary: Arc<dyn Index>,
	txn: &'txn mut dyn Transaction,
	controller: Option<Arc<dyn ScanController<R>>>,
	evaluator: Arc<dyn JoinedRowEvaluator<R>>,
	discipline: D,
	cursor: Option<Box<dyn Cursor>>,
	row: Option<R>,
	closed: bool,
}

impl<'txn, R> JoinedScanner<'txn, R, DefaultDiscipline> {
	pub fn new(
		secondary_view: Arc<dyn View>,
		primary: Arc<dyn Index>,
		txn: &'txn mut dyn Transaction,
		controller: Arc<dyn ScanController<R>>,
		evaluator: Arc<dyn JoinedRowEvaluator<R>>,
		seed: R,
	) -> Result<Self> {
		let mut scanner = JoinedScanner {
			secondary_view,
			primary,
			txn,
			controller: Some(controller),
			evaluator,
			discipline: DefaultDiscipline,
			cursor: None,
			row: Some(seed),
			closed: false,
		};
		scanner.open_current()?;
		scanner.advance(true)?;
		Ok(scanner)
	}
}

impl<'txn, R, D: ScanDiscipline<R>> JoinedScanner<'txn, R, D> {
	fn open_current(&mut self) -> Result<()> {
		let Some(controller) = self.controller.clone() else {
			self.cursor = None;
			return Ok(());
		};
		let mut cursor = controller.new_cursor(self.secondary_view.as_ref(), self.txn);
		self.discipline.to_first(self.txn, controller.as_ref(), cursor.as_mut())?;
		self.cursor = Some(cursor);
		Ok(())
	}

	fn advance(&mut self, mut first: bool) -> Result<()> {
		loop {
			let Some(controller) = self.controller.clone() else {
				self.row = None;
				return Ok(());
			};
			let Some(cursor) = self.cursor.as_ref() else {
				self.row = None;
				return Ok(());
			};
			if cursor.key().is_none() {
				self.controller = controller.successor();
				self.open_current()?;
				first = true;
				continue;
			}
			if !first {
				self.discipline.to_next(self.txn, controller.as_ref(), self.cursor.as_mut().unwrap())?;
				if self.cursor.as_ref().unwrap().key().is_none() {
					self.controller = controller.successor();
					self.open_current()?;
					first = true;
					continue;
				}
			}
			first = false;

			let secondary_key = self.cursor.as_ref().unwrap().key().unwrap().to_vec();
			let primary_key = self.evaluator.primary_key_of(&secondary_key);
			let mut primary_cursor = self.primary.new_cursor(self.txn);
			primary_cursor.find_ceiling(&primary_key)?;
			let resolved = matches!(primary_cursor.key(), Some(k) if k == primary_key.as_slice());
			if !resolved {
				// the primary row vanished under us (deleted between the
				// secondary entry being written and this read); treat it
				// like a rejected candidate and move on.
				continue;
			}

			let mut row = self.row.take().expect("JoinedScanner always holds a row buffer");
			let lock_result = primary_cursor.lock_result();
			let secondary_cursor = self.cursor.as_mut().unwrap();
			let outcome = self
				.evaluator
				.eval_joined_row(secondary_cursor.as_mut(), primary_cursor.as_mut(), lock_result, &mut row)
				.map_err(|e| Error::scan_failure("JoinedScanner", e))?;

			match outcome {
				EvalOutcome::Admitted => {
					self.row = Some(row);
					return Ok(());
				}
				EvalOutcome::Rejected => {
					if lock_result.freshly_acquired() {
						self.discipline.unlocked(self.txn, &primary_key, lock_result);
					}
					self.row = Some(row);
				}
				EvalOutcome::Stopped => {
					if lock_result.freshly_acquired() {
						self.discipline.unlocked(self.txn, &primary_key, lock_result);
					}
					self.row = Some(row);
					first = true;
				}
			}
		}
	}
}

impl<'txn, R, D: ScanDiscipline<R>> Scanner<R> for JoinedScanner<'txn, R, D> {
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
		self.controller.as_ref().map(|c| c.characteristics()).unwrap_or(0) & !super::characteristics::SORTED
	}
}
