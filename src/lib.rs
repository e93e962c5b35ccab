//! B+Tree ordered multimap with cursor-based traversal.
//!
//! This crate provides [`BoughMap`], an in-memory ordered map in which
//! every entry lives in a leaf node and the leaves are chained into one
//! sorted sequence. It differs from `std::collections::BTreeMap` in two
//! deliberate ways:
//!
//! - **Duplicate keys are kept.** [`insert`](BoughMap::insert) never
//!   overwrites; entries with equal keys accumulate and iterate in the
//!   order they arrived.
//! - **Positions are explicit.** Operations hand back a [`Cursor`] — a
//!   copyable token addressing one entry — instead of a borrowing
//!   iterator. A cursor survives until the leaf it points into is mutated,
//!   after which using it reports [`Error::InvalidCursor`] rather than
//!   reading entries that may have shifted.
//!
//! # Example
//!
//! ```
//! use bough_tree::BoughMap;
//!
//! let mut map = BoughMap::with_branching_factor(4);
//! for (k, v) in [(3, "fir"), (1, "oak"), (4, "ash"), (1, "oak again")] {
//!     map.insert(k, v)?;
//! }
//!
//! // Lower-bound search: the entry found is at-or-above the probe and
//! // the caller decides whether it is an exact match.
//! let cursor = map.search(&2);
//! assert_eq!(map.entry(cursor)?, (&3, &"fir"));
//!
//! let keys: Vec<i32> = map.iter().map(|(k, _)| *k).collect();
//! assert_eq!(keys, [1, 1, 3, 4]);
//! # Ok::<(), bough_tree::Error>(())
//! ```
//!
//! # Implementation
//!
//! Nodes are handle-addressed slots in a single append-only arena owned by
//! the map, so parent pointers and the doubly linked leaf chain are plain
//! indices with no ownership cycles. Internal nodes pair each child with
//! the lowest key of its subtree; inserts descend by those separators and
//! split full nodes bottom-up, promoting a new root when a split reaches
//! it. There is no deletion path, so nodes live as long as the map and
//! handles never dangle.

#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod error;
mod raw;

pub mod bough_map;

pub use bough_map::{BoughMap, Cursor, Iter};
pub use error::{Error, Result};
