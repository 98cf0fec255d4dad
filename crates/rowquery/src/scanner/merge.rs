// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 The rowquery authors

use std::cmp::Ordering;
use std::sync::Arc;

use super::{characteristics, RowComparator, Scanner};
use crate::error::Result;

enum Node<R> {
	Leaf(Box<dyn Scanner<R>>),
	Branch { left: Box<Node<R>>, right: Box<Node<R>>, left_is_current: bool },
}

/// Binary-tree merge over already-sorted sources, each internal node
/// choosing the smaller of its two children's current rows (spec §4.5
/// `MergeScanner`). Ties favour the left child (stable).
pub struct MergeScanner<R> {
	comparator: Arc<dyn RowComparator<R>>,
	root: Option<Node<R>>,
	closed: bool,
}

impl<R: Send + 'static> MergeScanner<R> {
	/// Builds a balanced tree from `sources` using half-even rounding
	/// (`mid = start + round(len/2)`), per spec §4.5.
	pub fn new(sources: Vec<Box<dyn Scanner<R>>>, comparator: Arc<dyn RowComparator<R>>) -> Result<Self> {
		let root = build_tree(sources, comparator.as_ref())?;
		Ok(MergeScanner { comparator, root, closed: false })
	}
}

fn round_half_even(len: usize) -> usize {
	// len/2 with ties rounding to even, matching spec's `round(len/2)`.
	let half = len / 2;
	if len % 2 == 0 {
		half
	} else if half % 2 == 0 {
		half
	} else {
		half + 1
	}
}

fn build_tree<R>(mut sources: Vec<Box<dyn Scanner<R>>>, comparator: &dyn RowComparator<R>) -> Result<Option<Node<R>>> {
	match sources.len() {
		0 => Ok(None),
		1 => Ok(Some(Node::Leaf(sources.pop().unwrap()))),
		len => {
			let mid = round_half_even(len).max(1).min(len - 1);
			let right_part = sources.split_off(mid);
			let left = build_tree(sources, comparator)?.expect("non-empty left half");
			let right = build_tree(right_part, comparator)?.expect("non-empty right half");
			let left_is_current = pick(&left, &right, comparator);
			Ok(Some(Node::Branch { left: Box::new(left), right: Box::new(right), left_is_current }))
		}
	}
}

fn row_of<R>(node: &Node<R>) -> Option<&R> {
	match node {
		Node::Leaf(s) => s.row(),
		Node::Branch { left, right, left_is_current } => {
			if *left_is_current {
				row_of(left)
			} else {
				row_of(right)
			}
		}
	}
}

fn pick<R>(left: &Node<R>, right: &Node<R>, comparator: &dyn RowComparator<R>) -> bool {
	match (row_of(left), row_of(right)) {
		(Some(l), Some(r)) => comparator.compare(l, r) != Ordering::Greater,
		(Some(_), None) => true,
		(None, Some(_)) => false,
		(None, None) => true,
	}
}

/// Advances whichever child currently holds the smaller row, then
/// recomputes which side is current.
fn step_node<R>(node: &mut Node<R>, comparator: &dyn RowComparator<R>) -> Result<()> {
	match node {
		Node::Leaf(s) => {
			s.step()?;
		}
		Node::Branch { left, right, left_is_current } => {
			if *left_is_current {
				step_node(left, comparator)?;
			} else {
				step_node(right, comparator)?;
			}
			*left_is_current = pick(left, right, comparator);
		}
	}
	Ok(())
}

fn close_node<R>(node: &mut Node<R>) -> Result<()> {
	match node {
		Node::Leaf(s) => s.close(),
		Node::Branch { left, right, .. } => {
			let l = close_node(left);
			let r = close_node(right);
			l.and(r)
		}
	}
}

fn estimate_node<R>(node: &Node<R>) -> u64 {
	match node {
		Node::Leaf(s) => s.estimate_size(),
		Node::Branch { left, right, .. } => estimate_node(left).saturating_add(estimate_node(right)),
	}
}

impl<R: Send> Scanner<R> for MergeScanner<R> {
	fn row(&self) -> Option<&R> {
		if self.closed {
			return None;
		}
		self.root.as_ref().and_then(row_of)
	}

	fn step(&mut self) -> Result<Option<&R>> {
		if self.closed {
			return Ok(None);
		}
		if let Some(root) = self.root.as_mut() {
			step_node(root, self.comparator.as_ref())?;
		}
		Ok(self.root.as_ref().and_then(row_of))
	}

	fn close(&mut self) -> Result<()> {
		self.closed = true;
		match self.root.as_mut() {
			Some(root) => close_node(root),
			None => Ok(()),
		}
	}

	fn estimate_size(&self) -> u64 {
		self.root.as_ref().map(estimate_node).unwrap_or(0)
	}

	fn characteristics(&self) -> u32 {
		characteristics::SORTED | characteristics::ORDERED
	}

	fn get_comparator(&self) -> Result<Arc<dyn RowComparator<R>>> {
		Ok(self.comparator.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scanner::ArrayScanner;

	fn nat_order() -> Arc<dyn RowComparator<i32>> {
		Arc::new(|a: &i32, b: &i32| a.cmp(b))
	}

	#[test]
	fn merge_interleaves_sorted_sources() {
		let a: Box<dyn Scanner<i32>> = Box::new(ArrayScanner::new(vec![1, 3, 5]));
		let b: Box<dyn Scanner<i32>> = Box::new(ArrayScanner::new(vec![2, 4, 6]));
		let mut s = MergeScanner::new(vec![a, b], nat_order()).unwrap();
		let mut out = vec![*s.row().unwrap()];
		while let Some(r) = s.step().unwrap() {
			out.push(*r);
		}
		assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
	}

	#[test]
	fn ties_favour_left_input() {
		let a: Box<dyn Scanner<(i32, &'static str)>> = Box::new(ArrayScanner::new(vec![(1, "left")]));
		let b: Box<dyn Scanner<(i32, &'static str)>> = Box::new(ArrayScanner::new(vec![(1, "right")]));
		let cmp: Arc<dyn RowComparator<(i32, &'static str)>> = Arc::new(|a: &(i32, &str), b: &(i32, &str)| a.0.cmp(&b.0));
		let s = MergeScanner::new(vec![a, b], cmp).unwrap();
		assert_eq!(s.row(), Some(&(1, "left")));
	}
}
