use core::borrow::Borrow;

use tracing::{debug, trace};

use super::arena::Arena;
use super::handle::Handle;
use super::node::{DeleteResult, FillState, InsertResult, InternalNode, LeafNode, Node};
use crate::order::Order;

/// The core B+Tree implementation backing `BPlusTree`.
///
/// Nodes live in an arena and refer to each other by [`Handle`]. The only
/// owning relation is parent-to-child containment; leaf `next` links are plain
/// handles into the same arena. Insertion and deletion recurse from the root
/// and report structural changes upward through [`InsertResult`] and
/// [`DeleteResult`]; only this type swaps the root.
#[derive(Clone)]
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root node. An empty tree has an empty leaf root.
    root: Handle,
    /// Maximum keys per node.
    order: Order,
    /// Total number of entries in the tree.
    len: usize,
}

/// How a deficient child was repaired by its parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Repair {
    /// Entries moved in from the left sibling.
    BorrowedLeft,
    /// Entries moved in from the right sibling.
    BorrowedRight,
    /// The child was folded into its left sibling.
    MergedLeft,
    /// The right sibling was folded into the child.
    MergedRight,
    /// The parent has no other child to pair with.
    Unresolved,
}

/// Which half of an adjacent pair is short of entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Side {
    Left,
    Right,
}

impl<K, V> RawBPlusTree<K, V> {
    /// Creates an empty tree: a single empty leaf.
    pub(crate) fn new(order: Order) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new_leaf());
        Self {
            nodes,
            root,
            order,
            len: 0,
        }
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every entry and node, keeping the order.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = self.nodes.alloc(Node::new_leaf());
        self.len = 0;
    }

    /// Number of levels, counting the leaf level. A lone leaf root has height 1.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
            height += 1;
        }
        height
    }

    /// Returns a reference to a leaf by handle.
    pub(crate) fn leaf(&self, handle: Handle) -> &LeafNode<K, V> {
        self.nodes.get(handle).as_leaf()
    }

    /// The leftmost leaf, found by descending through `c_0`.
    pub(crate) fn first_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
        }
        current
    }

    /// The rightmost leaf, found by descending through `c_n`.
    pub(crate) fn last_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.child_count() - 1);
        }
        current
    }

    /// Turns `(leaf, index)` into the position of an actual entry, following
    /// the leaf chain when `index` is past the end of `leaf`. `None` means the
    /// position is past the last entry of the tree.
    pub(crate) fn normalize(&self, mut leaf: Handle, mut index: usize) -> Option<(Handle, usize)> {
        loop {
            let node = self.leaf(leaf);
            if index < node.key_count() {
                return Some((leaf, index));
            }
            leaf = node.next()?;
            index = 0;
        }
    }

    /// Position of the smallest entry.
    pub(crate) fn first_position(&self) -> Option<(Handle, usize)> {
        self.normalize(self.first_leaf(), 0)
    }

    /// Position of the largest entry.
    pub(crate) fn last_position(&self) -> Option<(Handle, usize)> {
        let leaf = self.last_leaf();
        self.leaf(leaf).key_count().checked_sub(1).map(|index| (leaf, index))
    }

    /// Position of the entry after `(leaf, index)`.
    #[inline]
    pub(crate) fn next_position(&self, leaf: Handle, index: usize) -> Option<(Handle, usize)> {
        self.normalize(leaf, index + 1)
    }

    /// Entry stored at a normalized position.
    #[inline]
    pub(crate) fn entry(&self, (leaf, index): (Handle, usize)) -> (&K, &V) {
        let leaf = self.leaf(leaf);
        (leaf.key(index), leaf.value(index))
    }
}

impl<K: Ord, V> RawBPlusTree<K, V> {
    /// Position of the first entry whose key is `>= key`.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.lower_child(key)),
                Node::Leaf(leaf) => return self.normalize(current, leaf.lower_index(key)),
            }
        }
    }

    /// Position of the first entry whose key is `> key`.
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.upper_child(key)),
                Node::Leaf(leaf) => return self.normalize(current, leaf.upper_index(key)),
            }
        }
    }

    /// Position of the first (leftmost) entry equal to `key`.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let position = self.lower_bound(key)?;
        (self.entry(position).0.borrow() == key).then_some(position)
    }

    /// Returns the value of the first entry with a matching key.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(key).map(|position| self.entry(position).1)
    }

    /// Overwrites the value of every entry whose key equals `key`. Returns how
    /// many entries were updated.
    pub(crate) fn update<Q>(&mut self, key: &Q, value: V) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
        V: Clone,
    {
        let Some((mut leaf, mut index)) = self.lower_bound(key) else {
            return 0;
        };

        // The matching run may continue into following leaves.
        let mut updated = 0;
        loop {
            let node = self.nodes.get_mut(leaf).as_leaf_mut();
            while index < node.key_count() && node.key(index).borrow() == key {
                node.set_value(index, value.clone());
                updated += 1;
                index += 1;
            }
            if index < node.key_count() {
                break;
            }
            match node.next() {
                Some(next) => {
                    leaf = next;
                    index = 0;
                }
                None => break,
            }
        }
        updated
    }
}

impl<K: Ord + Clone, V> RawBPlusTree<K, V> {
    /// Inserts an entry after any existing entries with an equal key.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        if let InsertResult::Split { separator, right } = self.insert_into(self.root, key, value) {
            let root = InternalNode::with_children(self.root, separator, right);
            self.root = self.nodes.alloc(Node::Internal(root));
            debug!(height = self.height(), "root split, tree grew");
        }
        self.len += 1;
    }

    fn insert_into(&mut self, handle: Handle, key: K, value: V) -> InsertResult<K> {
        let order = self.order;
        let node = self.nodes.get_mut(handle);
        let was_full = node.fill_state(order) == FillState::Full;
        match node {
            Node::Leaf(leaf) => {
                leaf.insert(key, value);
                if was_full {
                    self.split_leaf(handle)
                } else {
                    InsertResult::Done
                }
            }
            Node::Internal(internal) => {
                let index = internal.upper_child(&key);
                let child = internal.child(index);
                match self.insert_into(child, key, value) {
                    InsertResult::Done => InsertResult::Done,
                    InsertResult::Split { separator, right } => {
                        let internal = self.nodes.get_mut(handle).as_internal_mut();
                        internal.insert_child(index, separator, right);
                        if internal.key_count() <= order.max_keys() {
                            return InsertResult::Done;
                        }

                        let (separator, right) = internal.split();
                        let right = self.nodes.alloc(Node::Internal(right));
                        trace!(?handle, ?right, "split internal node");
                        InsertResult::Split { separator, right }
                    }
                }
            }
        }
    }

    /// Splits an overfull leaf and links the new right half into the chain.
    fn split_leaf(&mut self, handle: Handle) -> InsertResult<K> {
        let at = self.order.leaf_split_point();
        let right = self.nodes.get_mut(handle).as_leaf_mut().split(at);
        let separator = right.key(0).clone();

        let right = self.nodes.alloc(Node::Leaf(right));
        self.nodes.get_mut(handle).as_leaf_mut().set_next(Some(right));
        trace!(?handle, ?right, "split leaf");

        InsertResult::Split { separator, right }
    }

    /// Removes every entry whose key equals `key`. Returns how many went.
    pub(crate) fn delete<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        // The root is exempt from minimum occupancy; an underflow report from
        // it only matters once it has run out of separators.
        let removed = self.delete_from(self.root, key).removed();
        self.len -= removed;
        self.collapse_root();
        removed
    }

    /// Replaces an internal root that has no separators left with its only child.
    fn collapse_root(&mut self) {
        while let Node::Internal(root) = self.nodes.get(self.root) {
            if root.key_count() > 0 {
                break;
            }
            let child = root.child(0);
            self.nodes.free(self.root);
            self.root = child;
            debug!(height = self.height(), "root collapsed, tree shrank");
        }
    }

    fn delete_from<Q>(&mut self, handle: Handle, key: &Q) -> DeleteResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let order = self.order;
        let start = match self.nodes.get_mut(handle) {
            Node::Leaf(leaf) => {
                let removed = leaf.remove_matching(key);
                return if leaf.key_count() < order.min_leaf_keys() {
                    DeleteResult::Underflow(removed)
                } else {
                    DeleteResult::Done(removed)
                };
            }
            Node::Internal(internal) => internal.lower_child(key),
        };

        // Equal keys may span several children: walk every child whose
        // separators admit `key`, repairing each one before moving on.
        let mut removed = 0;
        let mut index = start;
        loop {
            let internal = self.nodes.get(handle).as_internal();
            if index >= internal.child_count() || (index > 0 && internal.key(index - 1).borrow() > key) {
                break;
            }

            let child = internal.child(index);
            match self.delete_from(child, key) {
                DeleteResult::Done(n) => {
                    removed += n;
                    index += 1;
                }
                DeleteResult::Underflow(n) => {
                    removed += n;
                    match self.repair_child(handle, index) {
                        // The left sibling never holds `key` (it sorts lower or
                        // was already visited), so the child is finished.
                        Repair::BorrowedLeft => index += 1,
                        // After a left merge `index` names the next unvisited
                        // child; otherwise entries taken from the right
                        // sibling may still match, so the child is revisited.
                        Repair::MergedLeft | Repair::BorrowedRight | Repair::MergedRight => {}
                        Repair::Unresolved => break,
                    }
                }
            }
        }

        // A repaired child can fall short again when its own children merge
        // while it settles, after the walk has moved past it.
        self.settle(handle);

        if self.is_deficient(handle) {
            DeleteResult::Underflow(removed)
        } else {
            DeleteResult::Done(removed)
        }
    }

    /// True when a non-root node needs its parent to redistribute or merge.
    ///
    /// Order 1 permits internal nodes with a single child and no separators;
    /// such a node is deficient whenever that child is.
    fn is_deficient(&self, handle: Handle) -> bool {
        match self.nodes.get(handle) {
            Node::Leaf(leaf) => leaf.key_count() < self.order.min_leaf_keys(),
            Node::Internal(internal) => {
                internal.key_count() < self.order.min_internal_keys()
                    || (internal.child_count() == 1 && self.is_deficient(internal.child(0)))
            }
        }
    }

    /// How many entries (leaf) or separators (internal) a deficient node must
    /// gain. At least one: a node can be deficient through its only child.
    fn shortfall(&self, handle: Handle) -> usize {
        let node = self.nodes.get(handle);
        let min = if node.is_leaf() {
            self.order.min_leaf_keys()
        } else {
            self.order.min_internal_keys()
        };
        min.saturating_sub(node.key_count()).max(1)
    }

    /// True when `sibling` can give up `count` entries and stay at minimum.
    fn can_lend(&self, sibling: Handle, count: usize) -> bool {
        let node = self.nodes.get(sibling);
        let min = if node.is_leaf() {
            self.order.min_leaf_keys()
        } else {
            self.order.min_internal_keys()
        };
        node.key_count() >= min + count
    }

    /// Repairs the deficient child at `index` of `parent`: borrow from the
    /// left sibling, else from the right, else merge (left preferred).
    fn repair_child(&mut self, parent: Handle, index: usize) -> Repair {
        let node = self.nodes.get(parent).as_internal();
        let child_count = node.child_count();
        if child_count < 2 {
            return Repair::Unresolved;
        }

        let need = self.shortfall(node.child(index));
        if index > 0 && self.can_lend(node.child(index - 1), need) {
            self.redistribute(parent, index - 1, Side::Right, need);
            return Repair::BorrowedLeft;
        }
        if index + 1 < child_count && self.can_lend(node.child(index + 1), need) {
            self.redistribute(parent, index, Side::Left, need);
            return Repair::BorrowedRight;
        }

        if index > 0 {
            self.merge_children(parent, index - 1);
            Repair::MergedLeft
        } else {
            self.merge_children(parent, index);
            Repair::MergedRight
        }
    }

    /// Moves `count` entries into the deficient half of the pair of children
    /// around separator `separator_index` and fixes that separator.
    fn redistribute(&mut self, parent: Handle, separator_index: usize, deficient: Side, count: usize) {
        let node = self.nodes.get(parent).as_internal();
        let left = node.child(separator_index);
        let right = node.child(separator_index + 1);

        if self.nodes.get(left).is_leaf() {
            let (l, r) = self.nodes.get_pair_mut(left, right);
            let (l, r) = (l.as_leaf_mut(), r.as_leaf_mut());
            match deficient {
                Side::Left => l.borrow_front(r, count),
                Side::Right => r.borrow_back(l, count),
            }
            let separator = r.key(0).clone();
            self.nodes.get_mut(parent).as_internal_mut().set_key(separator_index, separator);
            trace!(?left, ?right, count, "redistributed leaf entries");
            return;
        }

        // Internal nodes rotate through the parent: a child crosses over and
        // the separators shift by one position each step.
        for _ in 0..count {
            match deficient {
                Side::Left => {
                    let (key, child) = self.nodes.get_mut(right).as_internal_mut().pop_front();
                    let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(separator_index, key);
                    self.nodes.get_mut(left).as_internal_mut().push_back(separator, child);
                }
                Side::Right => {
                    let (key, child) = self.nodes.get_mut(left).as_internal_mut().pop_back();
                    let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(separator_index, key);
                    self.nodes.get_mut(right).as_internal_mut().push_front(separator, child);
                }
            }
        }
        trace!(?left, ?right, count, "redistributed internal children");

        self.settle(match deficient {
            Side::Left => left,
            Side::Right => right,
        });
    }

    /// Folds the child right of separator `separator_index` into its left
    /// neighbour and drops the separator from `parent`.
    fn merge_children(&mut self, parent: Handle, separator_index: usize) {
        let (separator, right) = self.nodes.get_mut(parent).as_internal_mut().remove_child(separator_index);
        let left = self.nodes.get(parent).as_internal().child(separator_index);

        match self.nodes.take(right) {
            Node::Leaf(right_leaf) => {
                self.nodes.get_mut(left).as_leaf_mut().merge_with_right(right_leaf);
                trace!(?left, ?right, "merged leaves");
            }
            Node::Internal(right_internal) => {
                self.nodes.get_mut(left).as_internal_mut().merge_with_right(separator, right_internal);
                trace!(?left, ?right, "merged internal nodes");
                self.settle(left);
            }
        }
    }

    /// Repairs deficient children of `handle` until none is left or `handle`
    /// is down to a single child. Repairs can make a child short again (its
    /// own children may merge while it settles), so the scan restarts after
    /// each one. Every pass either fixes a child or removes a node by
    /// merging, which bounds the loop.
    fn settle(&mut self, handle: Handle) {
        loop {
            let internal = self.nodes.get(handle).as_internal();
            let deficient = internal.children().iter().position(|&child| self.is_deficient(child));
            let Some(index) = deficient else {
                return;
            };
            if self.repair_child(handle, index) == Repair::Unresolved {
                return;
            }
        }
    }
}
