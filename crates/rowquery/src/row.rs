// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Row and column metadata (spec §3 "Row", "RowInfo").
//!
//! Row *values* are an external collaborator's concern (row-class
//! codegen, spec §1 out-of-scope); this module only models the
//! metadata the query core needs to reason about a row type:
//! [`ColumnInfo`], [`RowInfo`] and the [`ColumnSet`] shape shared by
//! alternate keys and secondary indexes.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// An interned column name. Cheap to clone; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnName(Arc<str>);

impl ColumnName {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ColumnName {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl std::fmt::Display for ColumnName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

/// Base storage type of a column, independent of the descending/null-low/
/// nullable modifiers carried alongside it in [`TypeCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
	Bool,
	Int,
	Long,
	Uint,
	Ulong,
	Float,
	Double,
	Utf8,
	Bytes,
}

impl BaseType {
	/// The auto-increment eligible base types (spec §3: "Its type code
	/// must be one of {uint, ulong, int, long}").
	pub fn is_auto_eligible(self) -> bool {
		matches!(self, BaseType::Uint | BaseType::Ulong | BaseType::Int | BaseType::Long)
	}
}

/// Column type code plus the descending/null-low/nullable modifiers
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode {
	pub base: BaseType,
	pub nullable: bool,
	pub descending: bool,
	pub null_low: bool,
}

impl TypeCode {
	pub fn new(base: BaseType, nullable: bool) -> Self {
		Self { base, nullable, descending: false, null_low: false }
	}

	pub fn with_descending(mut self, descending: bool) -> Self {
		self.descending = descending;
		self
	}

	pub fn with_null_low(mut self, null_low: bool) -> Self {
		self.null_low = self.normalize_null_low(null_low);
		self
	}

	/// Non-nullable primitive columns cannot be null-low; the source
	/// silently clears the modifier rather than rejecting it.
	fn normalize_null_low(&self, requested: bool) -> bool {
		requested && self.nullable
	}
}

/// Auto-increment range. `min == max` means the column is not auto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRange {
	pub min: i64,
	pub max: i64,
}

impl AutoRange {
	pub const NONE: AutoRange = AutoRange { min: 0, max: 0 };

	pub fn is_auto(&self) -> bool {
		self.min != self.max
	}
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
	pub name: ColumnName,
	pub type_code: TypeCode,
	pub auto_range: AutoRange,
	pub hidden: bool,
}

impl ColumnInfo {
	pub fn new(name: impl Into<ColumnName>, type_code: TypeCode) -> Self {
		Self { name: name.into(), type_code, auto_range: AutoRange::NONE, hidden: false }
	}

	pub fn with_auto_range(mut self, min: i64, max: i64) -> Self {
		self.auto_range = AutoRange { min, max };
		self
	}

	pub fn with_hidden(mut self, hidden: bool) -> Self {
		self.hidden = hidden;
		self
	}

	pub fn is_auto(&self) -> bool {
		self.auto_range.is_auto()
	}
}

/// A declaration-ordered set of key and value columns, used both for a
/// row type's own primary key/value split and for each alternate key /
/// secondary index (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
	pub key_columns: IndexMap<ColumnName, ColumnInfo>,
	pub value_columns: IndexMap<ColumnName, ColumnInfo>,
}

impl ColumnSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn column_names(&self) -> impl Iterator<Item = &ColumnName> {
		self.key_columns.keys().chain(self.value_columns.keys())
	}
}

/// Metadata for a row type (spec §3 "RowInfo"). Immutable once built;
/// the host caches one instance per row type.
#[derive(Debug, Clone)]
pub struct RowInfo {
	pub full_name: String,
	pub all_columns: IndexMap<ColumnName, ColumnInfo>,
	pub key_columns: IndexMap<ColumnName, ColumnInfo>,
	pub value_columns: IndexMap<ColumnName, ColumnInfo>,
	pub alternate_keys: Vec<ColumnSet>,
	pub secondary_indexes: Vec<ColumnSet>,
}

impl RowInfo {
	/// Validates and assembles a `RowInfo`. Returns `Error::MalformedSpec`
	/// on any invariant violation from spec §3:
	/// - `key_columns ∪ value_columns == all_columns`, disjoint.
	/// - every alternate-key/secondary-index column exists in `all_columns`.
	/// - at most one auto column, of an eligible base type, with `min <= max`.
	pub fn build(
		full_name: impl Into<String>,
		key_columns: IndexMap<ColumnName, ColumnInfo>,
		value_columns: IndexMap<ColumnName, ColumnInfo>,
		alternate_keys: Vec<ColumnSet>,
		secondary_indexes: Vec<ColumnSet>,
	) -> Result<RowInfo> {
		let full_name = full_name.into();
		for name in key_columns.keys() {
			if value_columns.contains_key(name) {
				return Err(malformed(&full_name, format!("column {name} is both key and value")));
			}
		}

		let mut all_columns = IndexMap::with_capacity(key_columns.len() + value_columns.len());
		all_columns.extend(key_columns.iter().map(|(n, c)| (n.clone(), c.clone())));
		all_columns.extend(value_columns.iter().map(|(n, c)| (n.clone(), c.clone())));

		let mut auto_count = 0usize;
		for info in all_columns.values() {
			if info.is_auto() {
				auto_count += 1;
				if !info.type_code.base.is_auto_eligible() {
					return Err(malformed(
						&full_name,
						format!("auto column {} has ineligible base type", info.name),
					));
				}
				if info.auto_range.min > info.auto_range.max {
					return Err(malformed(
						&full_name,
						format!("auto column {} has autoMin > autoMax", info.name),
					));
				}
			}
		}
		if auto_count > 1 {
			return Err(malformed(&full_name, "at most one auto column is allowed"));
		}

		for set in alternate_keys.iter().chain(secondary_indexes.iter()) {
			for name in set.column_names() {
				if !all_columns.contains_key(name) {
					return Err(malformed(
						&full_name,
						format!("alternate key/index column {name} not in allColumns"),
					));
				}
			}
		}

		Ok(RowInfo { full_name, all_columns, key_columns, value_columns, alternate_keys, secondary_indexes })
	}

	pub fn column(&self, name: &ColumnName) -> Option<&ColumnInfo> {
		self.all_columns.get(name)
	}
}

fn malformed(full_name: &str, reason: impl Into<String>) -> Error {
	Error::MalformedSpec { spec: full_name.to_string(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn col(name: &str, base: BaseType, nullable: bool) -> ColumnInfo {
		ColumnInfo::new(name, TypeCode::new(base, nullable))
	}

	#[test]
	fn builds_valid_row_info() {
		let mut key = IndexMap::new();
		key.insert(ColumnName::new("k"), col("k", BaseType::Int, false));
		let mut value = IndexMap::new();
		value.insert(ColumnName::new("v"), col("v", BaseType::Utf8, true));

		let info = RowInfo::build("t", key, value, vec![], vec![]).unwrap();
		assert_eq!(info.all_columns.len(), 2);
		assert_eq!(info.key_columns.len(), 1);
	}

	#[test]
	fn rejects_column_in_both_key_and_value() {
		let mut key = IndexMap::new();
		key.insert(ColumnName::new("k"), col("k", BaseType::Int, false));
		let mut value = IndexMap::new();
		value.insert(ColumnName::new("k"), col("k", BaseType::Int, false));

		let err = RowInfo::build("t", key, value, vec![], vec![]).unwrap_err();
		assert!(matches!(err, Error::MalformedSpec { .. }));
	}

	#[test]
	fn rejects_second_auto_column() {
		let mut key = IndexMap::new();
		key.insert(
			ColumnName::new("a"),
			col("a", BaseType::Int, false).with_auto_range(1, 100),
		);
		key.insert(
			ColumnName::new("b"),
			col("b", BaseType::Long, false).with_auto_range(1, 100),
		);
		let err = RowInfo::build("t", key, IndexMap::new(), vec![], vec![]).unwrap_err();
		assert!(matches!(err, Error::MalformedSpec { .. }));
	}

	#[test]
	fn rejects_ineligible_auto_base_type() {
		let mut key = IndexMap::new();
		key.insert(
			ColumnName::new("a"),
			col("a", BaseType::Utf8, false).with_auto_range(1, 100),
		);
		let err = RowInfo::build("t", key, IndexMap::new(), vec![], vec![]).unwrap_err();
		assert!(matches!(err, Error::MalformedSpec { .. }));
	}

	#[test]
	fn null_low_is_cleared_for_non_nullable_columns() {
		let tc = TypeCode::new(BaseType::Int, false).with_null_low(true);
		assert!(!tc.null_low);
	}

	#[test]
	fn alternate_key_column_must_exist_in_all_columns() {
		let mut key = IndexMap::new();
		key.insert(ColumnName::new("k"), col("k", BaseType::Int, false));

		let mut alt = ColumnSet::new();
		alt.key_columns.insert(ColumnName::new("missing"), col("missing", BaseType::Int, false));

		let err = RowInfo::build("t", key, IndexMap::new(), vec![alt], vec![]).unwrap_err();
		assert!(matches!(err, Error::MalformedSpec { .. }));
	}
}
