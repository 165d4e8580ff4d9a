use core::fmt;
use core::num::NonZero;

use crate::error::{Result, TreeError};

/// The order of a [`BPlusTree`](crate::BPlusTree): the maximum number of keys a
/// single node may hold.
///
/// Internal nodes hold up to `order` separator keys and `order + 1` children;
/// leaves hold up to `order` entries. The order is fixed when the tree is built.
///
/// # Examples
///
/// ```
/// use bplus_index::Order;
///
/// let order = Order::new(4).unwrap();
/// assert_eq!(order.max_keys(), 4);
/// assert_eq!(order.min_leaf_keys(), 2);
///
/// assert!(Order::new(0).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Order(NonZero<usize>);

impl Order {
    /// The order used by [`BPlusTree::default`](crate::BPlusTree::default).
    pub const DEFAULT: Self = Self(NonZero::new(128).unwrap());

    /// Validates `order`, which must be at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidOrder`] if `order` is zero.
    pub const fn new(order: usize) -> Result<Self> {
        match NonZero::new(order) {
            Some(order) => Ok(Self(order)),
            None => Err(TreeError::InvalidOrder { order }),
        }
    }

    /// Returns the order as a plain integer.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Maximum number of keys (separators or entries) in any node.
    #[inline]
    #[must_use]
    pub const fn max_keys(self) -> usize {
        self.0.get()
    }

    /// Minimum number of entries in a non-root leaf: `ceil(order / 2)`.
    #[inline]
    #[must_use]
    pub const fn min_leaf_keys(self) -> usize {
        self.0.get().div_ceil(2)
    }

    /// Minimum number of separators in a non-root internal node: `floor(order / 2)`.
    ///
    /// An internal split promotes its middle key, leaving `order` keys to share
    /// between the halves, so odd orders cannot guarantee `ceil(order / 2)` on
    /// both sides.
    #[inline]
    #[must_use]
    pub const fn min_internal_keys(self) -> usize {
        self.0.get() / 2
    }

    /// Number of entries kept by the left half when an overfull leaf
    /// (`order + 1` entries) splits: `ceil((order + 1) / 2)`.
    #[inline]
    #[must_use]
    pub const fn leaf_split_point(self) -> usize {
        (self.0.get() + 1).div_ceil(2)
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = TreeError;

    fn try_from(order: usize) -> Result<Self> {
        Self::new(order)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
