use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Bound, RangeBounds};

use crate::error::Result;
use crate::order::Order;
use crate::raw::{Handle, RawBPlusTree};

/// Default key type: an ordered byte sequence, compared lexicographically.
pub type Key = Vec<u8>;

/// Default value type: an opaque byte sequence.
pub type Value = Vec<u8>;

/// A position inside the leaf chain: leaf handle and slot index.
type Position = Option<(Handle, usize)>;

/// Returns `true` when no key can satisfy both bounds.
fn is_empty_range<T, R>(range: &R) -> bool
where
    T: ?Sized + Ord,
    R: RangeBounds<T>,
{
    match (range.start_bound(), range.end_bound()) {
        (Bound::Included(start), Bound::Included(end)) => start > end,
        (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) => {
            start >= end
        }
        _ => false,
    }
}

/// An in-memory ordered index based on a [B+ tree].
///
/// Entries live only in the leaves, which are chained in key order; internal
/// nodes hold separator keys that route lookups. Every node holds at most
/// [`order`](BPlusTree::order) keys, and every node except the root stays at
/// least half full, so all operations are logarithmic in the number of
/// entries.
///
/// Unlike [`BTreeMap`], a key may be stored any number of times. Entries with
/// equal keys keep their insertion order: [`search`](BPlusTree::search)
/// returns the first one, while [`update`](BPlusTree::update) and
/// [`delete`](BPlusTree::delete) act on all of them.
///
/// Keys and values default to byte vectors ([`Key`], [`Value`]); any
/// `K: Ord + Clone` works as a key.
///
/// It is a logic error for a key to be modified in such a way that the key's
/// ordering relative to any other key, as determined by the [`Ord`] trait,
/// changes while it is in the tree.
///
/// [B+ tree]: https://en.wikipedia.org/wiki/B%2B_tree
/// [`BTreeMap`]: alloc::collections::BTreeMap
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut index: BPlusTree = BPlusTree::new(4);
///
/// index.insert(b"pear".to_vec(), b"green".to_vec());
/// index.insert(b"apple".to_vec(), b"red".to_vec());
/// index.insert(b"apple".to_vec(), b"yellow".to_vec());
///
/// // The first of several equal keys wins.
/// assert_eq!(index.search(b"apple".as_slice()), Some(&b"red".to_vec()));
///
/// // Both apples, in insertion order.
/// let apples = index.search_range(b"apple".as_slice(), b"apple".as_slice());
/// assert_eq!(apples, [&b"red".to_vec(), &b"yellow".to_vec()]);
///
/// assert_eq!(index.delete(b"apple".as_slice()), 2);
/// assert_eq!(index.get_keys(), [b"pear".to_vec()]);
/// ```
#[derive(Clone)]
pub struct BPlusTree<K = Key, V = Value> {
    raw: RawBPlusTree<K, V>,
}

/// An iterator over the entries of a `BPlusTree`, in key order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front: Position,
    remaining: usize,
}

/// An iterator over the keys of a `BPlusTree`, in order.
///
/// This `struct` is created by the [`keys`] method on [`BPlusTree`].
///
/// [`keys`]: BPlusTree::keys
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

/// An iterator over the values of a `BPlusTree`, in key order.
///
/// This `struct` is created by the [`values`] method on [`BPlusTree`].
///
/// [`values`]: BPlusTree::values
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

/// An iterator over a sub-range of entries in a `BPlusTree`.
///
/// This `struct` is created by the [`range`] method on [`BPlusTree`].
///
/// [`range`]: BPlusTree::range
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front: Position,
    /// First position past the range; `None` runs to the end of the chain.
    back: Position,
}

impl<K, V> BPlusTree<K, V> {
    /// Makes a new, empty tree whose nodes hold at most `order` keys.
    ///
    /// # Panics
    ///
    /// Panics if `order` is zero. Use [`try_new`](Self::try_new) to handle an
    /// untrusted order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3);
    /// tree.insert(1, "a");
    /// assert_eq!(tree.order(), 3);
    /// ```
    #[must_use]
    pub fn new(order: usize) -> Self {
        Self::try_new(order).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Makes a new, empty tree, rejecting an order below 1.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidOrder`](crate::TreeError::InvalidOrder) if
    /// `order` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, TreeError};
    ///
    /// assert!(BPlusTree::<u32, u32>::try_new(8).is_ok());
    /// assert_eq!(
    ///     BPlusTree::<u32, u32>::try_new(0).err(),
    ///     Some(TreeError::InvalidOrder { order: 0 }),
    /// );
    /// ```
    pub fn try_new(order: usize) -> Result<Self> {
        Order::new(order).map(Self::with_order)
    }

    /// Makes a new, empty tree with an already validated order.
    #[must_use]
    pub fn with_order(order: Order) -> Self {
        BPlusTree {
            raw: RawBPlusTree::new(order),
        }
    }

    /// Returns the maximum number of keys per node.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.raw.order().get()
    }

    /// Returns the number of entries, counting every duplicate.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(7, 'a');
    /// tree.insert(7, 'b');
    /// assert_eq!(tree.len(), 2);
    /// ```
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of node levels. An empty tree or a tree whose
    /// root is a leaf has height 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(2);
    /// assert_eq!(tree.height(), 1);
    /// tree.extend([(1, ()), (2, ()), (3, ())]);
    /// assert_eq!(tree.height(), 2);
    /// ```
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Removes every entry, leaving a single empty leaf. The order is kept.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Gets an iterator over the entries, sorted by key. Equal keys come out
    /// in insertion order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(3, "c");
    /// tree.insert(1, "a");
    /// tree.insert(3, "d");
    ///
    /// let entries: Vec<_> = tree.iter().collect();
    /// assert_eq!(entries, [(&1, &"a"), (&3, &"c"), (&3, &"d")]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            front: self.raw.first_position(),
            remaining: self.raw.len(),
        }
    }

    /// Gets an iterator over the keys, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values, in key order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns every key in sorted order, duplicates included.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = [(2, 'b'), (1, 'a'), (2, 'c')].into_iter().collect();
    /// assert_eq!(tree.get_keys(), [1, 2, 2]);
    /// assert_eq!(tree.get_values(), ['a', 'b', 'c']);
    /// ```
    #[must_use]
    pub fn get_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.keys().cloned().collect()
    }

    /// Returns every value in key order, parallel to [`get_keys`](Self::get_keys).
    #[must_use]
    pub fn get_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.values().cloned().collect()
    }

    /// Returns the entry with the smallest key (the first inserted, if the
    /// key is duplicated).
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.raw.first_position().map(|position| self.raw.entry(position))
    }

    /// Returns the entry with the largest key (the last inserted, if the key
    /// is duplicated).
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// assert_eq!(tree.last_key_value(), None);
    /// tree.insert(9, "x");
    /// tree.insert(9, "y");
    /// tree.insert(1, "z");
    /// assert_eq!(tree.first_key_value(), Some((&1, &"z")));
    /// assert_eq!(tree.last_key_value(), Some((&9, &"y")));
    /// ```
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.raw.last_position().map(|position| self.raw.entry(position))
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Returns the value of the first entry whose key equals `key`.
    ///
    /// The key may be any borrowed form of the tree's key type, but the
    /// ordering on the borrowed form *must* match the ordering on the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(1, "a");
    /// tree.insert(1, "b");
    /// assert_eq!(tree.search(&1), Some(&"a"));
    /// assert_eq!(tree.search(&2), None);
    /// ```
    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns `true` if at least one entry has the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.search(key).is_some()
    }

    /// Returns the values of every entry with a key in `low..=high`, in
    /// ascending key order. An inverted range yields nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = [1, 3, 5, 7, 9].map(|k| (k, k * 10)).into_iter().collect();
    /// assert_eq!(tree.search_range(&2, &7), [&30, &50, &70]);
    /// assert!(tree.search_range(&7, &2).is_empty());
    /// ```
    #[must_use]
    pub fn search_range<Q>(&self, low: &Q, high: &Q) -> Vec<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.range::<Q, _>((Bound::Included(low), Bound::Included(high)))
            .map(|(_, value)| value)
            .collect()
    }

    /// Constructs an iterator over the entries whose keys fall in `range`.
    ///
    /// The simplest way is to use the range syntax `min..max`, thus
    /// `range(min..max)` will yield elements from min (inclusive) to max
    /// (exclusive). The range may also be entered as `(Bound<T>, Bound<T>)`.
    /// A range whose start lies after its end yields nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::ops::Bound::{Excluded, Included};
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(3);
    /// tree.insert(3, "a");
    /// tree.insert(5, "b");
    /// tree.insert(8, "c");
    /// tree.insert(5, "d");
    ///
    /// let found: Vec<_> = tree.range((Excluded(3), Included(8))).collect();
    /// assert_eq!(found, [(&5, &"b"), (&5, &"d"), (&8, &"c")]);
    /// assert_eq!(tree.range(6..).next(), Some((&8, &"c")));
    /// assert_eq!(tree.range(..5).count(), 1);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n) to create the iterator; each step follows the leaf chain.
    pub fn range<T, R>(&self, range: R) -> Range<'_, K, V>
    where
        T: ?Sized + Ord,
        K: Borrow<T>,
        R: RangeBounds<T>,
    {
        if is_empty_range(&range) {
            return Range {
                tree: &self.raw,
                front: None,
                back: None,
            };
        }

        let front = match range.start_bound() {
            Bound::Included(start) => self.raw.lower_bound(start),
            Bound::Excluded(start) => self.raw.upper_bound(start),
            Bound::Unbounded => self.raw.first_position(),
        };
        let back = match range.end_bound() {
            Bound::Included(end) => self.raw.upper_bound(end),
            Bound::Excluded(end) => self.raw.lower_bound(end),
            Bound::Unbounded => None,
        };

        Range {
            tree: &self.raw,
            front,
            back,
        }
    }

    /// Inserts an entry. Existing entries with an equal key are kept; the new
    /// one is placed after them.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(37, "a");
    /// tree.insert(37, "b");
    /// assert_eq!(tree.search_range(&37, &37), [&"a", &"b"]);
    /// ```
    pub fn insert(&mut self, key: K, value: V) {
        self.raw.insert(key, value);
    }

    /// Sets `value` on every entry whose key equals `key` and returns how
    /// many entries changed. Nothing is inserted when the key is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(1, "a");
    /// tree.insert(1, "b");
    /// assert_eq!(tree.update(&1, "c"), 2);
    /// assert_eq!(tree.update(&2, "c"), 0);
    /// assert_eq!(tree.get_values(), ["c", "c"]);
    /// ```
    pub fn update<Q>(&mut self, key: &Q, value: V) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        V: Clone,
    {
        self.raw.update(key, value)
    }

    /// Removes every entry whose key equals `key` and returns how many were
    /// removed. Removing an absent key does nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::new(4);
    /// tree.insert(1, "a");
    /// tree.insert(1, "b");
    /// tree.insert(2, "c");
    /// assert_eq!(tree.delete(&1), 2);
    /// assert_eq!(tree.delete(&1), 0);
    /// assert_eq!(tree.len(), 1);
    /// ```
    pub fn delete<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.delete(key)
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for BPlusTree<K, V> {
    fn eq(&self, other: &BPlusTree<K, V>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for BPlusTree<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// Creates an empty tree of order [`Order::DEFAULT`].
    fn default() -> Self {
        BPlusTree::with_order(Order::DEFAULT)
    }
}

impl<K: Ord + Clone, V> FromIterator<(K, V)> for BPlusTree<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = BPlusTree::default();
        tree.extend(iter);
        tree
    }
}

impl<K: Ord + Clone, V> Extend<(K, V)> for BPlusTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let (leaf, index) = self.front?;
        self.front = self.tree.next_position(leaf, index);
        self.remaining -= 1;
        Some(self.tree.entry((leaf, index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front: self.front,
            remaining: self.remaining,
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

impl<K, V> fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys").field("remaining", &self.inner.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<K, V> FusedIterator for Values<'_, K, V> {}

impl<K, V> fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values").field("remaining", &self.inner.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (leaf, index) = self.front?;
        if self.front == self.back {
            self.front = None;
            return None;
        }

        self.front = self.tree.next_position(leaf, index);
        Some(self.tree.entry((leaf, index)))
    }
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

impl<K, V> Clone for Range<'_, K, V> {
    fn clone(&self) -> Self {
        Range {
            tree: self.tree,
            front: self.front,
            back: self.back,
        }
    }
}

impl<K, V> fmt::Debug for Range<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range").field("exhausted", &self.front.is_none()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec;

    fn sample() -> BPlusTree<u32, char> {
        let mut tree = BPlusTree::new(3);
        for (i, c) in ('a'..='j').enumerate() {
            tree.insert(u32::try_from(i).unwrap() * 2, c);
        }
        tree
    }

    #[test]
    #[should_panic(expected = "tree order must be >= 1")]
    fn zero_order_panics() {
        let _ = BPlusTree::<u8, u8>::new(0);
    }

    #[test]
    fn empty_range_shapes() {
        let tree = sample();
        assert_eq!(tree.range(4..4).count(), 0);
        assert_eq!(tree.range((Bound::Excluded(4), Bound::Included(4))).count(), 0);
        assert_eq!(tree.range((Bound::Included(6), Bound::Included(2))).count(), 0);
        assert_eq!(tree.range(4..=4).count(), 1);
    }

    #[test]
    fn range_between_stored_keys() {
        let tree = sample();
        // Stored keys are 0, 2, .., 18.
        let found: Vec<u32> = tree.range(3..=9).map(|(k, _)| *k).collect();
        assert_eq!(found, vec![4, 6, 8]);
        assert_eq!(tree.range(19..).count(), 0);
        assert_eq!(tree.range(..=0).count(), 1);
        assert_eq!(tree.range(..).count(), tree.len());
    }

    #[test]
    fn iterator_lengths_are_exact() {
        let tree = sample();
        let mut iter = tree.iter();
        assert_eq!(iter.len(), 10);
        iter.next();
        assert_eq!(iter.len(), 9);
        assert_eq!(tree.keys().len(), 10);
        assert_eq!(tree.values().len(), 10);
    }

    #[test]
    fn debug_lists_entries_in_order() {
        let mut tree = BPlusTree::new(2);
        tree.insert(2, 'b');
        tree.insert(1, 'a');
        assert_eq!(format!("{tree:?}"), "[(1, 'a'), (2, 'b')]");
    }

    #[test]
    fn clones_are_independent() {
        let mut tree = sample();
        let copy = tree.clone();
        tree.delete(&4);
        assert_eq!(copy.len(), 10);
        assert_eq!(tree.len(), 9);
        assert_ne!(tree, copy);
    }

    #[test]
    fn default_uses_default_order() {
        let tree: BPlusTree = BPlusTree::default();
        assert_eq!(tree.order(), Order::DEFAULT.get());
        assert!(tree.is_empty());
    }
}
