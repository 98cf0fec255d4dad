// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Error kinds raised by the query execution core (spec §7).
//!
//! `StoppedCursor` is deliberately absent: the source signals a
//! controlled scan abort with an exception, but here it is represented
//! as [`crate::evaluator::EvalOutcome::Stopped`] and never escapes as
//! an `Error`.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Operation not allowed on this table (e.g. update on `IdentityTable`).
	#[error("unsupported operation: {0}")]
	Unsupported(String),

	/// Operation violates the view's capability (e.g. `tryLoad` on a non-pk derived table).
	#[error("view constraint violated: {0}")]
	ViewConstraint(String),

	/// Key insertion failed the duplicate check.
	#[error("unique constraint violated for key {key:?}")]
	UniqueConstraint { key: Vec<u8> },

	/// The underlying index was dropped or closed.
	#[error("index closed: {0}")]
	ClosedIndex(String),

	/// Lock acquisition timed out or was denied.
	#[error("lock failure: {0}")]
	LockFailure(String),

	/// Cursor advanced past the valid range.
	#[error("cursor is unpositioned")]
	UnpositionedCursor,

	/// Bad order-by or query spec string.
	#[error("malformed spec {spec:?}: {reason}")]
	MalformedSpec { spec: String, reason: String },

	/// `RowHeader::decode` saw bad lengths or left trailing bytes.
	#[error("malformed row header: {0}")]
	MalformedHeader(String),

	/// Secondary-index lookup by id returned nothing.
	#[error("corrupt catalog: secondary index {0} not found")]
	CorruptCatalog(String),

	/// Any unexpected error during scan/update, annotated with scanner identity.
	#[error("scan failure in {scanner}: {source}")]
	ScanFailure { scanner: String, #[source] source: Box<Error> },

	/// Mirrors the source's `IllegalState("No current row")` raised when
	/// `update`/`delete` is called on an unpositioned updater.
	#[error("illegal state: {0}")]
	IllegalState(String),
}

impl Error {
	pub fn scan_failure(scanner: impl fmt::Display, source: Error) -> Error {
		Error::ScanFailure { scanner: scanner.to_string(), source: Box::new(source) }
	}

	/// `ClosedIndex`/`LockFailure` are the only kinds `StoredQueryLauncher`
	/// retries (spec §5, §7).
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::ClosedIndex(_) | Error::LockFailure(_))
	}
}
