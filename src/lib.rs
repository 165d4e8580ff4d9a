//! An in-memory ordered index built on a B+ tree.
//!
//! [`BPlusTree`] keeps every entry in leaf nodes that are chained in key order,
//! with internal nodes holding only separator keys. It supports:
//!
//! - [`search`](BPlusTree::search) - the first value stored under a key
//! - [`search_range`](BPlusTree::search_range) / [`range`](BPlusTree::range) - ordered scans along the leaf chain
//! - [`insert`](BPlusTree::insert) - duplicate keys are kept, in insertion order
//! - [`update`](BPlusTree::update) / [`delete`](BPlusTree::delete) - act on every entry with a key
//!
//! # Example
//!
//! ```
//! use bplus_index::BPlusTree;
//!
//! let mut index = BPlusTree::new(4);
//! for (k, v) in [(5, "e"), (1, "a"), (3, "c"), (9, "i"), (7, "g")] {
//!     index.insert(k, v);
//! }
//!
//! assert_eq!(index.search(&3), Some(&"c"));
//! assert_eq!(index.search_range(&2, &7), [&"c", &"e", &"g"]);
//!
//! index.insert(3, "cc");
//! assert_eq!(index.update(&3, "C"), 2);
//! assert_eq!(index.delete(&3), 2);
//! assert_eq!(index.get_keys(), [1, 5, 7, 9]);
//! ```
//!
//! # Features
//!
//! - **`no_std` compatible** - Only requires `alloc`, no standard library dependency
//! - **Arena storage** - Nodes refer to each other by index, so the leaf chain never owns a node
//! - **Structural events** - Splits, merges and root changes are reported through [`tracing`]
//!
//! # Implementation
//!
//! Nodes live in a slot arena owned by the tree. Insertion and deletion recurse
//! from the root; a child reports a split or an underflow to its parent, which
//! adopts the new sibling or redistributes/merges. Only the tree itself replaces
//! the root, growing the height on a root split and shrinking it when an
//! internal root runs out of separators.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod order;
mod raw;

pub mod bplus_tree;

pub use bplus_tree::{BPlusTree, Key, Value};
pub use error::{Result, TreeError};
pub use order::Order;
