// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

//! Wire-serialized row header for remoting (spec §3 "RowHeader", §6).
//!
//! ```text
//! [length:u32]? hash:i32 numKeys:i32 numColumns:i32
//! repeat numColumns: (strlen:u16, name:utf8[strlen], type:i32, flags:i32)
//! ```
//! All integers are big-endian. `encode`/`decode` with a length prefix
//! are the remoting entry points; the `_unframed` pair is for callers
//! that already know the boundary (e.g. a length-delimited channel).

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone)]
pub struct RowHeader {
	num_keys: i32,
	column_names: Vec<String>,
	column_types: Vec<i32>,
	column_flags: Vec<i32>,
	hash: OnceCell<i32>,
}

impl RowHeader {
	pub fn new(
		num_keys: i32,
		column_names: Vec<String>,
		column_types: Vec<i32>,
		column_flags: Vec<i32>,
	) -> Result<RowHeader> {
		if column_names.len() != column_types.len() || column_names.len() != column_flags.len() {
			return Err(malformed("column_names/column_types/column_flags length mismatch"));
		}
		let mut seen = std::collections::HashSet::with_capacity(column_names.len());
		for name in &column_names {
			if name.is_empty() {
				return Err(malformed("column name must not be empty"));
			}
			if name.len() > MAX_NAME_LEN {
				return Err(malformed(format!("column name {name:?} exceeds 65535 bytes")));
			}
			if !seen.insert(name.as_str()) {
				return Err(malformed(format!("duplicate column name {name:?}")));
			}
		}
		Ok(RowHeader { num_keys, column_names, column_types, column_flags, hash: OnceCell::new() })
	}

	pub fn num_keys(&self) -> i32 {
		self.num_keys
	}

	pub fn column_names(&self) -> &[String] {
		&self.column_names
	}

	pub fn column_types(&self) -> &[i32] {
		&self.column_types
	}

	pub fn column_flags(&self) -> &[i32] {
		&self.column_flags
	}

	pub fn hash(&self) -> i32 {
		*self.hash.get_or_init(|| self.compute_hash())
	}

	fn compute_hash(&self) -> i32 {
		// FNV-1a over the big-endian body, folded into 32 bits.
		let mut h: u64 = 0xcbf29ce484222325;
		let mut mix = |bytes: &[u8]| {
			for &b in bytes {
				h ^= b as u64;
				h = h.wrapping_mul(0x100000001b3);
			}
		};
		mix(&self.num_keys.to_be_bytes());
		mix(&(self.column_names.len() as i32).to_be_bytes());
		for i in 0..self.column_names.len() {
			mix(self.column_names[i].as_bytes());
			mix(&self.column_types[i].to_be_bytes());
			mix(&self.column_flags[i].to_be_bytes());
		}
		(h ^ (h >> 32)) as i32
	}

	pub fn encode(&self) -> Vec<u8> {
		let body = self.encode_unframed();
		let mut out = Vec::with_capacity(body.len() + 4);
		out.extend_from_slice(&(body.len() as u32).to_be_bytes());
		out.extend_from_slice(&body);
		out
	}

	pub fn decode(bytes: &[u8]) -> Result<RowHeader> {
		if bytes.len() < 4 {
			return Err(malformed("truncated before length prefix"));
		}
		let length = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
		let body = &bytes[4..];
		if body.len() != length {
			return Err(malformed(format!(
				"advertised length {length} does not match actual body length {}",
				body.len()
			)));
		}
		Self::decode_unframed(body)
	}

	pub fn encode_unframed(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(&self.hash().to_be_bytes());
		out.extend_from_slice(&self.num_keys.to_be_bytes());
		out.extend_from_slice(&(self.column_names.len() as i32).to_be_bytes());
		for i in 0..self.column_names.len() {
			let name_bytes = self.column_names[i].as_bytes();
			out.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
			out.extend_from_slice(name_bytes);
			out.extend_from_slice(&self.column_types[i].to_be_bytes());
			out.extend_from_slice(&self.column_flags[i].to_be_bytes());
		}
		out
	}

	pub fn decode_unframed(bytes: &[u8]) -> Result<RowHeader> {
		let mut cursor = Cursor::new(bytes);
		let declared_hash = cursor.read_i32()?;
		let num_keys = cursor.read_i32()?;
		let num_columns = cursor.read_i32()?;
		if num_columns < 0 {
			return Err(malformed("negative numColumns"));
		}
		let num_columns = num_columns as usize;

		let mut column_names = Vec::with_capacity(num_columns);
		let mut column_types = Vec::with_capacity(num_columns);
		let mut column_flags = Vec::with_capacity(num_columns);
		for _ in 0..num_columns {
			let strlen = cursor.read_u16()? as usize;
			let name_bytes = cursor.read_exact(strlen)?;
			let name = String::from_utf8(name_bytes.to_vec())
				.map_err(|e| malformed(format!("column name is not valid utf8: {e}")))?;
			let type_code = cursor.read_i32()?;
			let flags = cursor.read_i32()?;
			column_names.push(name);
			column_types.push(type_code);
			column_flags.push(flags);
		}
		if !cursor.is_empty() {
			return Err(malformed("trailing bytes after last column"));
		}

		let header = RowHeader::new(num_keys, column_names, column_types, column_flags)?;
		if header.hash() != declared_hash {
			return Err(malformed("hash mismatch"));
		}
		Ok(header)
	}
}

impl PartialEq for RowHeader {
	fn eq(&self, other: &Self) -> bool {
		self.num_keys == other.num_keys
			&& self.column_names == other.column_names
			&& self.column_types == other.column_types
			&& self.column_flags == other.column_flags
	}
}
impl Eq for RowHeader {}

impl std::hash::Hash for RowHeader {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		state.write_i32(self.hash());
	}
}

struct Cursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	fn is_empty(&self) -> bool {
		self.pos == self.bytes.len()
	}

	fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
		if self.pos + n > self.bytes.len() {
			return Err(malformed("unexpected end of header body"));
		}
		let slice = &self.bytes[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	fn read_i32(&mut self) -> Result<i32> {
		Ok(i32::from_be_bytes(self.read_exact(4)?.try_into().unwrap()))
	}

	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_exact(2)?.try_into().unwrap()))
	}
}

fn malformed(reason: impl Into<String>) -> Error {
	Error::MalformedHeader(reason.into())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> RowHeader {
		RowHeader::new(
			1,
			vec!["k".into(), "v".into()],
			vec![1, 2],
			vec![0, 1],
		)
		.unwrap()
	}

	#[test]
	fn encode_decode_round_trips() {
		let header = sample();
		let encoded = header.encode();
		let decoded = RowHeader::decode(&encoded).unwrap();
		assert_eq!(header, decoded);
	}

	#[test]
	fn decode_rejects_mismatched_length() {
		let header = sample();
		let mut encoded = header.encode();
		// corrupt the length prefix
		encoded[3] = encoded[3].wrapping_add(1);
		assert!(matches!(RowHeader::decode(&encoded), Err(Error::MalformedHeader(_))));
	}

	#[test]
	fn decode_rejects_trailing_bytes_unframed() {
		let header = sample();
		let mut body = header.encode_unframed();
		body.push(0xFF);
		assert!(RowHeader::decode_unframed(&body).is_err());
	}

	#[test]
	fn rejects_duplicate_column_names() {
		let err = RowHeader::new(0, vec!["a".into(), "a".into()], vec![1, 1], vec![0, 0]).unwrap_err();
		assert!(matches!(err, Error::MalformedHeader(_)));
	}

	#[test]
	fn rejects_empty_column_name() {
		let err = RowHeader::new(0, vec!["".into()], vec![1], vec![0]).unwrap_err();
		assert!(matches!(err, Error::MalformedHeader(_)));
	}

	#[test]
	fn hash_is_value_based_and_cached() {
		let a = sample();
		let b = sample();
		assert_eq!(a.hash(), b.hash());
		// calling twice must hit the cached value, not recompute differently
		assert_eq!(a.hash(), a.hash());
	}
}
