//! Error types for the index.

use thiserror::Error;

/// Result type alias using [`TreeError`].
pub type Result<T> = core::result::Result<T, TreeError>;

/// Errors that can occur when configuring a [`BPlusTree`](crate::BPlusTree).
///
/// Lookups never fail: a missing key is reported as `None` or as zero affected
/// entries, not as an error.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum TreeError {
    #[error("tree order must be >= 1 (got {order})")]
    InvalidOrder { order: usize },
}
