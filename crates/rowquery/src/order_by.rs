// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Order-by specification parsing (spec §3 "OrderBy", §6 grammar).
//!
//! Grammar: `(('+' | '-') '!'? name)+`. `'!'` sets null-low, `'-'` sets
//! descending. Parsing is exhaustive; duplicate column names are
//! ignored after their first occurrence. The printed form is
//! deterministic and is reused verbatim as a cache key by callers
//! (e.g. the query-factory cache, spec §4.7).

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::row::{ColumnInfo, ColumnName, RowInfo, TypeCode};

#[derive(Debug, Clone)]
pub struct Rule {
	pub column: ColumnInfo,
	/// `column.type_code` with only the descending/null-low bits
	/// possibly flipped by this particular ordering.
	pub effective_type: TypeCode,
}

impl Rule {
	pub fn descending(&self) -> bool {
		self.effective_type.descending
	}

	pub fn null_low(&self) -> bool {
		self.effective_type.null_low
	}
}

#[derive(Debug, Clone, Default)]
pub struct OrderBy {
	rules: IndexMap<ColumnName, Rule>,
}

impl OrderBy {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	pub fn rules(&self) -> impl Iterator<Item = &Rule> {
		self.rules.values()
	}

	pub fn get(&self, name: &ColumnName) -> Option<&Rule> {
		self.rules.get(name)
	}

	/// Parses `spec` against `row_info`, resolving each referenced column.
	/// An empty string means "no order" (spec §3).
	pub fn for_spec(row_info: &RowInfo, spec: &str) -> Result<OrderBy> {
		if spec.is_empty() {
			return Ok(OrderBy::empty());
		}

		let mut rules = IndexMap::new();
		let chars: Vec<char> = spec.chars().collect();
		let mut i = 0usize;

		while i < chars.len() {
			let sign = chars[i];
			if sign != '+' && sign != '-' {
				return Err(bad_spec(spec, format!("expected '+' or '-' at offset {i}")));
			}
			let descending = sign == '-';
			i += 1;

			let mut null_low = false;
			if i < chars.len() && chars[i] == '!' {
				null_low = true;
				i += 1;
			}

			let start = i;
			while i < chars.len() && chars[i] != '+' && chars[i] != '-' {
				i += 1;
			}
			if start == i {
				return Err(bad_spec(spec, format!("empty column name at offset {start}")));
			}
			let name: String = chars[start..i].iter().collect();
			if name.chars().any(char::is_whitespace) {
				return Err(bad_spec(spec, format!("column name {name:?} contains whitespace")));
			}
			let column_name = ColumnName::new(name.as_str());

			if rules.contains_key(&column_name) {
				// duplicates are ignored after the first occurrence
				continue;
			}

			let column = row_info
				.column(&column_name)
				.ok_or_else(|| bad_spec(spec, format!("unknown column {name:?}")))?
				.clone();
			let effective_type = column.type_code.with_descending(descending).with_null_low(null_low);
			rules.insert(column_name, Rule { column, effective_type });
		}

		Ok(OrderBy { rules })
	}

	/// Deterministic canonical form; `for_spec(row, spec(x)) == x` for
	/// any well-formed `x` built by this type.
	pub fn spec(&self) -> String {
		let mut out = String::new();
		for rule in self.rules.values() {
			out.push(if rule.descending() { '-' } else { '+' });
			if rule.null_low() {
				out.push('!');
			}
			out.push_str(rule.column.name.as_str());
		}
		out
	}
}

impl PartialEq for OrderBy {
	fn eq(&self, other: &Self) -> bool {
		self.spec() == other.spec()
	}
}

fn bad_spec(spec: &str, reason: impl Into<String>) -> Error {
	Error::MalformedSpec { spec: spec.to_string(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::row::BaseType;

	fn row_info() -> RowInfo {
		let mut key = IndexMap::new();
		key.insert(ColumnName::new("g"), ColumnInfo::new("g", TypeCode::new(BaseType::Int, false)));
		let mut value = IndexMap::new();
		value.insert(ColumnName::new("v"), ColumnInfo::new("v", TypeCode::new(BaseType::Int, true)));
		RowInfo::build("t", key, value, vec![], vec![]).unwrap()
	}

	#[test]
	fn parses_basic_spec() {
		let row = row_info();
		let ob = OrderBy::for_spec(&row, "-!g+v").unwrap();
		let g = ob.get(&ColumnName::new("g")).unwrap();
		assert!(g.descending());
		assert!(g.null_low());
		let v = ob.get(&ColumnName::new("v")).unwrap();
		assert!(!v.descending());
	}

	#[test]
	fn empty_spec_means_no_order() {
		let row = row_info();
		assert!(OrderBy::for_spec(&row, "").unwrap().is_empty());
	}

	#[test]
	fn duplicate_columns_keep_first_occurrence() {
		let row = row_info();
		let ob = OrderBy::for_spec(&row, "+g-g").unwrap();
		let g = ob.get(&ColumnName::new("g")).unwrap();
		assert!(!g.descending(), "first occurrence (+g) must win");
		assert_eq!(ob.rules().count(), 1);
	}

	#[test]
	fn round_trips_through_spec_string() {
		let row = row_info();
		let ob = OrderBy::for_spec(&row, "-!g+v").unwrap();
		let roundtrip = OrderBy::for_spec(&row, &ob.spec()).unwrap();
		assert_eq!(ob, roundtrip);
	}

	#[test]
	fn rejects_unknown_column() {
		let row = row_info();
		assert!(OrderBy::for_spec(&row, "+nope").is_err());
	}

	#[test]
	fn rejects_missing_sign() {
		let row = row_info();
		assert!(OrderBy::for_spec(&row, "g").is_err());
	}
}
