use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::order::Order;

/// Slots stored inline before a node spills to the heap. Nodes of larger
/// orders work the same way, they just allocate.
#[cfg(test)]
pub(crate) const INLINE_SLOTS: usize = 4;
#[cfg(not(test))]
pub(crate) const INLINE_SLOTS: usize = 16;

type Slots<T> = SmallVec<[T; INLINE_SLOTS]>;

/// Coarse occupancy of a node relative to the tree order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FillState {
    /// No occupied slots.
    Empty,
    /// Between 1 and `order - 1` occupied slots.
    PartiallyFull,
    /// `order` occupied slots (or more, transiently, before a split).
    Full,
}

impl FillState {
    #[inline]
    pub(crate) const fn of(count: usize, order: Order) -> Self {
        if count == 0 {
            FillState::Empty
        } else if count < order.max_keys() {
            FillState::PartiallyFull
        } else {
            FillState::Full
        }
    }
}

#[derive(Clone)]
#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

/// Separator keys and child handles.
///
/// For keys `k_0..k_{n-1}` and children `c_0..c_n`, every key stored under
/// `c_i` lies in `k_{i-1} <= key <= k_i`. Runs of equal keys may straddle a
/// separator, which is why both bounds are inclusive.
#[derive(Clone)]
pub(crate) struct InternalNode<K> {
    keys: Slots<K>,
    children: Slots<Handle>,
}

/// Sorted entries and the link to the next leaf in key order.
#[derive(Clone)]
pub(crate) struct LeafNode<K, V> {
    next: Option<Handle>,
    keys: Slots<K>,
    values: Slots<V>,
}

/// Result of inserting into a subtree.
pub(crate) enum InsertResult<K> {
    /// The subtree absorbed the entry.
    Done,
    /// The subtree root overflowed and split; the parent must adopt `right`
    /// immediately after the child it descended into.
    Split {
        /// Smallest key reachable through `right`.
        separator: K,
        /// The new right sibling.
        right: Handle,
    },
}

/// Result of deleting from a subtree. Both variants carry the number of
/// entries removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DeleteResult {
    Done(usize),
    /// The subtree root is below its minimum occupancy and the parent must
    /// redistribute or merge.
    Underflow(usize),
}

impl DeleteResult {
    pub(crate) const fn removed(self) -> usize {
        match self {
            DeleteResult::Done(n) | DeleteResult::Underflow(n) => n,
        }
    }
}

impl<K, V> Node<K, V> {
    /// Creates a new empty leaf node.
    pub(crate) fn new_leaf() -> Self {
        Node::Leaf(LeafNode::new())
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Number of separators (internal) or entries (leaf).
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.key_count(),
            Node::Leaf(leaf) => leaf.key_count(),
        }
    }

    pub(crate) fn fill_state(&self, order: Order) -> FillState {
        FillState::of(self.key_count(), order)
    }
}

impl<K> InternalNode<K> {
    /// Creates the node that sits above a split root.
    pub(crate) fn with_children(left: Handle, separator: K, right: Handle) -> Self {
        let mut node = Self {
            keys: Slots::new(),
            children: Slots::new(),
        };
        node.keys.push(separator);
        node.children.push(left);
        node.children.push(right);
        node
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Index of the first child that may hold `key`: the number of
    /// separators strictly less than `key`.
    #[inline]
    pub(crate) fn lower_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() < key)
    }

    /// Index of the last child that may hold `key`: the number of separators
    /// less than or equal to `key`. Keys equal to a separator route right.
    #[inline]
    pub(crate) fn upper_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Adopts `child` as the right neighbour of `children[index]`, separated
    /// by `key`.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
        self.debug_assert_counts();
    }

    /// Removes `keys[index]` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        self.debug_assert_counts();
        (key, child)
    }

    /// Replaces the separator at `index`, returning the old one.
    pub(crate) fn replace_key(&mut self, index: usize, key: K) -> K {
        core::mem::replace(&mut self.keys[index], key)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    pub(crate) fn push_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    pub(crate) fn push_back(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Detaches the first child together with the separator to its right.
    pub(crate) fn pop_front(&mut self) -> (K, Handle) {
        assert!(!self.keys.is_empty(), "pop_front on an internal node without separators");
        (self.keys.remove(0), self.children.remove(0))
    }

    /// Detaches the last child together with the separator to its left.
    pub(crate) fn pop_back(&mut self) -> (K, Handle) {
        assert!(!self.keys.is_empty(), "pop_back on an internal node without separators");
        let last = self.keys.len() - 1;
        (self.keys.remove(last), self.children.remove(last + 1))
    }

    /// Splits an overfull node around its middle separator, which moves up to
    /// the parent and is kept by neither half. Returns (`median`, `right`).
    pub(crate) fn split(&mut self) -> (K, InternalNode<K>) {
        let mid = self.keys.len() / 2;

        let right = InternalNode {
            keys: self.keys.drain(mid + 1..).collect(),
            children: self.children.drain(mid + 1..).collect(),
        };
        let median = self.keys.pop().expect("split of an internal node without separators");

        self.debug_assert_counts();
        right.debug_assert_counts();
        (median, right)
    }

    /// Absorbs the right sibling, pulling `separator` down between the two.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
        self.debug_assert_counts();
    }

    #[inline]
    fn debug_assert_counts(&self) {
        debug_assert_eq!(
            self.children.len(),
            self.keys.len() + 1,
            "internal node must hold one more child than separators"
        );
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            next: None,
            keys: Slots::new(),
            values: Slots::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> &V {
        &self.values[index]
    }

    pub(crate) fn set_value(&mut self, index: usize, value: V) {
        self.values[index] = value;
    }

    /// Index of the first entry whose key is not less than `key`.
    #[inline]
    pub(crate) fn lower_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() < key)
    }

    /// Index of the first entry whose key is greater than `key`.
    #[inline]
    pub(crate) fn upper_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Inserts after every entry with an equal key, so duplicates keep their
    /// insertion order.
    pub(crate) fn insert(&mut self, key: K, value: V)
    where
        K: Ord,
    {
        let index = self.upper_index(&key);
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    /// Removes every entry whose key equals `key`, returning how many went.
    pub(crate) fn remove_matching<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let start = self.lower_index(key);
        let end = self.upper_index(key);
        self.keys.drain(start..end);
        self.values.drain(start..end);
        end - start
    }

    /// Moves entries `[at..]` into a new leaf that takes over this leaf's
    /// `next` link. The caller links this leaf to the new one.
    pub(crate) fn split(&mut self, at: usize) -> LeafNode<K, V> {
        LeafNode {
            next: self.next,
            keys: self.keys.drain(at..).collect(),
            values: self.values.drain(at..).collect(),
        }
    }

    /// Moves the first `count` entries of `right` onto the end of this leaf.
    pub(crate) fn borrow_front(&mut self, right: &mut Self, count: usize) {
        self.keys.extend(right.keys.drain(..count));
        self.values.extend(right.values.drain(..count));
    }

    /// Moves the last `count` entries of `left` onto the front of this leaf.
    pub(crate) fn borrow_back(&mut self, left: &mut Self, count: usize) {
        let start = left.keys.len() - count;
        self.keys.insert_many(0, left.keys.drain(start..));
        self.values.insert_many(0, left.values.drain(start..));
    }

    /// Absorbs the right sibling and takes over its `next` link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K, V>) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }
}
