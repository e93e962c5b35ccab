use core::borrow::Borrow;
use core::fmt;
use core::fmt::Write as _;

use log::{debug, trace};

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, lower_bound};

use crate::error::{Error, Result};

/// A raw position: the leaf holding the entry, the entry's index inside
/// it, and the leaf version captured when the position was taken. The
/// all-empty value is the end sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RawCursor {
    pub(crate) leaf: Option<Handle>,
    pub(crate) index: usize,
    pub(crate) version: u64,
}

impl RawCursor {
    pub(crate) const END: Self = Self {
        leaf: None,
        index: 0,
        version: 0,
    };
}

/// The core B+Tree implementation backing `BoughMap`.
///
/// All nodes live in one append-only arena; the tree is the sole owner of
/// the arena and the only place the root handle is ever reassigned (root
/// promotion after a parentless split).
pub(crate) struct RawBoughMap<K, V> {
    nodes: Arena<Node<K, V>>,
    root: Handle,
    branching: usize,
    len: usize,
}

impl<K, V> RawBoughMap<K, V> {
    /// Creates an empty tree whose root is a fresh leaf.
    pub(crate) fn new(branching: usize) -> Self {
        assert!(branching >= 2, "branching factor must be at least 2");
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new()));
        Self {
            nodes,
            root,
            branching,
            len: 0,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn branching_factor(&self) -> usize {
        self.branching
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    /// Number of levels from the root down to the leaves, inclusive.
    pub(crate) fn height(&self) -> usize {
        let mut levels = 1;
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    levels += 1;
                    current = internal.child(0);
                }
                Node::Leaf(_) => return levels,
            }
        }
    }

    /// Leftmost leaf, reached by taking the first child at every level.
    pub(crate) fn first_leaf(&self) -> Handle {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Cursor at the first entry in key order. On an empty tree this
    /// addresses slot 0 of the empty root leaf and is not dereferenceable.
    pub(crate) fn begin(&self) -> RawCursor {
        let leaf = self.first_leaf();
        RawCursor {
            leaf: Some(leaf),
            index: 0,
            version: self.nodes.get(leaf).as_leaf().version(),
        }
    }

    /// Checks the validity predicate and returns the cursor's leaf handle:
    /// present, in this arena, still a leaf, unchanged since capture, and
    /// with the index inside the live entries.
    fn live_leaf(&self, cursor: RawCursor) -> Result<Handle> {
        let handle = cursor.leaf.ok_or(Error::InvalidCursor)?;
        let Some(Node::Leaf(leaf)) = self.nodes.try_get(handle) else {
            return Err(Error::InvalidCursor);
        };
        if leaf.version() != cursor.version || cursor.index >= leaf.len() {
            return Err(Error::InvalidCursor);
        }
        Ok(handle)
    }

    pub(crate) fn entry(&self, cursor: RawCursor) -> Result<(&K, &V)> {
        let handle = self.live_leaf(cursor)?;
        let leaf = self.nodes.get(handle).as_leaf();
        Ok((leaf.key(cursor.index), leaf.value(cursor.index)))
    }

    pub(crate) fn entry_mut(&mut self, cursor: RawCursor) -> Result<(&K, &mut V)> {
        let handle = self.live_leaf(cursor)?;
        let leaf = self.nodes.get_mut(handle).as_leaf_mut();
        Ok(leaf.entry_mut(cursor.index))
    }

    /// One step forward: next index in the same leaf, else the front of
    /// the next sibling, else the end cursor. The starting cursor must
    /// itself be valid, exactly as for a dereference.
    pub(crate) fn advance(&self, cursor: RawCursor) -> Result<RawCursor> {
        let handle = self.live_leaf(cursor)?;
        let leaf = self.nodes.get(handle).as_leaf();
        let next_index = cursor.index + 1;
        if next_index < leaf.len() {
            return Ok(RawCursor {
                leaf: cursor.leaf,
                index: next_index,
                version: cursor.version,
            });
        }
        Ok(match leaf.next() {
            Some(next) => RawCursor {
                leaf: Some(next),
                index: 0,
                version: self.nodes.get(next).as_leaf().version(),
            },
            None => RawCursor::END,
        })
    }
}

impl<K: Clone + Ord, V> RawBoughMap<K, V> {
    /// Inserts an entry and returns a cursor to it. Duplicate keys are
    /// kept, new entries landing after the existing run.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<RawCursor> {
        let leaf = self.descend_for_insert(&key)?;
        let target = if self.nodes.get(leaf).as_leaf().is_full(self.branching) {
            self.split_leaf_for_insert(leaf, &key)
        } else {
            leaf
        };

        let node = self.nodes.get_mut(target).as_leaf_mut();
        let index = node.insert(key, value);
        let version = node.version();
        self.len += 1;
        Ok(RawCursor {
            leaf: Some(target),
            index,
            version,
        })
    }

    /// Walks from the root to the leaf that must hold `key`, failing before
    /// any mutation when an internal node has no child at or below the key.
    fn descend_for_insert(&self, key: &K) -> Result<Handle> {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let slot = internal
                        .route_for_insert(key)
                        .ok_or(Error::RoutingUnderflow)?;
                    trace!("routing through {current:?} slot {slot}");
                    current = internal.child(slot);
                }
                Node::Leaf(_) => return Ok(current),
            }
        }
    }

    /// Splits a full leaf, wires the sibling chain, pushes the new leaf
    /// into the parent (recursively splitting), promotes a new root when
    /// there is no parent, and returns the half that must receive the
    /// pending key: the new right leaf iff `pending >= split key`.
    fn split_leaf_for_insert(&mut self, leaf: Handle, pending: &K) -> Handle {
        let node = self.nodes.get_mut(leaf).as_leaf_mut();
        let (split_key, mut right) = node.split_off();
        let old_next = node.next();
        let parent = node.parent();

        right.set_prev(Some(leaf));
        right.set_next(old_next);
        let right_handle = self.nodes.alloc(Node::Leaf(right));

        self.nodes.get_mut(leaf).as_leaf_mut().set_next(Some(right_handle));
        if let Some(next) = old_next {
            self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(right_handle));
        }
        debug!("split leaf {leaf:?}, new right sibling {right_handle:?}");

        match parent {
            Some(parent) => self.insert_child(parent, split_key.clone(), right_handle),
            None => self.promote_root(leaf, right_handle),
        }

        if *pending >= split_key { right_handle } else { leaf }
    }

    /// Inserts a freshly split-off child under `node`, splitting `node`
    /// first when it is already at capacity.
    fn insert_child(&mut self, node: Handle, separator: K, child: Handle) {
        let target = if self.nodes.get(node).as_internal().is_full(self.branching) {
            self.split_internal_for_insert(node, &separator)
        } else {
            node
        };
        self.nodes.get_mut(child).set_parent(Some(target));
        self.nodes
            .get_mut(target)
            .as_internal_mut()
            .insert_pair(separator, child);
    }

    /// The internal-node half of split propagation. Identical shape to the
    /// leaf split, plus re-pointing the parent handle of every moved child.
    fn split_internal_for_insert(&mut self, node: Handle, pending: &K) -> Handle {
        let internal = self.nodes.get_mut(node).as_internal_mut();
        let (split_key, right) = internal.split_off();
        let parent = internal.parent();

        let right_handle = self.nodes.alloc(Node::Internal(right));
        let moved: Vec<Handle> = self
            .nodes
            .get(right_handle)
            .as_internal()
            .children()
            .to_vec();
        for child in moved {
            self.nodes.get_mut(child).set_parent(Some(right_handle));
        }
        debug!("split internal node {node:?}, new right sibling {right_handle:?}");

        match parent {
            Some(parent) => self.insert_child(parent, split_key.clone(), right_handle),
            None => self.promote_root(node, right_handle),
        }

        if *pending >= split_key { right_handle } else { node }
    }

    /// Replaces the root with a new internal node owning the two halves of
    /// the old root, keyed by their lowest keys.
    fn promote_root(&mut self, left: Handle, right: Handle) {
        let left_key = self.nodes.get(left).lowest_key().clone();
        let right_key = self.nodes.get(right).lowest_key().clone();

        let mut root = InternalNode::new();
        root.insert_pair(left_key, left);
        root.insert_pair(right_key, right);
        let root_handle = self.nodes.alloc(Node::Internal(root));

        self.nodes.get_mut(left).set_parent(Some(root_handle));
        self.nodes.get_mut(right).set_parent(Some(root_handle));
        self.root = root_handle;
        debug!("promoted new root {root_handle:?}");
    }

    /// Cursor at an entry holding the smallest key `>=` the probe, or the
    /// end cursor when every stored key is smaller. The entry's key is
    /// *not* verified to equal the probe; callers compare after
    /// dereferencing. Within a run of duplicates that was split across
    /// leaves the cursor may land partway through the run, because equal
    /// separators route to the rightmost child at or below the probe.
    ///
    /// Routing sends the probe to the child whose range starts at or below
    /// it, so the in-leaf lower bound can fall off that leaf's end; the
    /// first greater entry is then the front of the next leaf in the chain.
    pub(crate) fn lower_bound_cursor<Q>(&self, key: &Q) -> RawCursor
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    current = internal.child(internal.route_for_search(key));
                }
                Node::Leaf(leaf) => {
                    let index = lower_bound(leaf.keys(), key);
                    if index < leaf.len() {
                        return RawCursor {
                            leaf: Some(current),
                            index,
                            version: leaf.version(),
                        };
                    }
                    return match leaf.next() {
                        Some(next) => RawCursor {
                            leaf: Some(next),
                            index: 0,
                            version: self.nodes.get(next).as_leaf().version(),
                        },
                        None => RawCursor::END,
                    };
                }
            }
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> RawBoughMap<K, V> {
    /// Recursive diagnostic rendering of the node structure. No format
    /// stability is promised.
    pub(crate) fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.root, 0, &mut out);
        out
    }

    fn dump_node(&self, handle: Handle, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self.nodes.get(handle) {
            Node::Internal(internal) => {
                let _ = writeln!(out, "{pad}internal_node:{handle:?}");
                for i in 0..internal.len() {
                    let _ = writeln!(out, "{pad}  separator: {:?}", internal.separator(i));
                }
                for i in 0..internal.len() {
                    self.dump_node(internal.child(i), depth + 1, out);
                }
            }
            Node::Leaf(leaf) => {
                let _ = writeln!(out, "{pad}leaf_node:{handle:?}");
                for i in 0..leaf.len() {
                    let _ = writeln!(out, "{pad}  ({:?}, {:?})", leaf.key(i), leaf.value(i));
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    impl<K: Clone + Ord + fmt::Debug, V> RawBoughMap<K, V> {
        /// Validates the structural invariants: sorted nodes, occupancy,
        /// lowest-key separators, parent consistency, uniform leaf depth,
        /// and a complete doubly linked leaf chain. Panics with the full
        /// list of violations.
        fn validate_invariants(&self) {
            let mut errors: Vec<String> = Vec::new();
            let mut leaves: Vec<Handle> = Vec::new();
            let mut leaf_depth: Option<usize> = None;

            if let Node::Internal(internal) = self.nodes.get(self.root)
                && internal.parent().is_some()
            {
                errors.push("root has a parent".into());
            }
            if let Node::Leaf(leaf) = self.nodes.get(self.root)
                && leaf.parent().is_some()
            {
                errors.push("root has a parent".into());
            }

            let total = self.validate_node(self.root, 0, &mut leaf_depth, &mut leaves, &mut errors);
            if total != self.len {
                errors.push(format!("len mismatch: stored {}, counted {total}", self.len));
            }

            self.validate_leaf_chain(&leaves, &mut errors);

            assert!(errors.is_empty(), "tree invariant violations:\n{}", errors.join("\n"));
        }

        fn validate_node(
            &self,
            handle: Handle,
            depth: usize,
            leaf_depth: &mut Option<usize>,
            leaves: &mut Vec<Handle>,
            errors: &mut Vec<String>,
        ) -> usize {
            match self.nodes.get(handle) {
                Node::Leaf(leaf) => {
                    match *leaf_depth {
                        None => *leaf_depth = Some(depth),
                        Some(expected) if expected != depth => {
                            errors.push(format!(
                                "leaf {handle:?} at depth {depth}, expected {expected}"
                            ));
                        }
                        Some(_) => {}
                    }
                    if leaf.len() > self.branching {
                        errors.push(format!(
                            "leaf {handle:?} holds {} entries, branching factor {}",
                            leaf.len(),
                            self.branching
                        ));
                    }
                    for i in 1..leaf.len() {
                        if leaf.key(i - 1) > leaf.key(i) {
                            errors.push(format!("leaf {handle:?} keys out of order at {i}"));
                        }
                    }
                    leaves.push(handle);
                    leaf.len()
                }
                Node::Internal(internal) => {
                    if internal.len() > self.branching {
                        errors.push(format!(
                            "internal {handle:?} holds {} pairs, branching factor {}",
                            internal.len(),
                            self.branching
                        ));
                    }
                    // Separators are strictly increasing for distinct keys
                    // but repeat when a run of duplicates outgrows a node.
                    for i in 1..internal.len() {
                        if internal.separator(i - 1) > internal.separator(i) {
                            errors.push(format!(
                                "internal {handle:?} separators out of order at {i}"
                            ));
                        }
                    }
                    let mut total = 0;
                    for i in 0..internal.len() {
                        let child = internal.child(i);
                        let child_parent = match self.nodes.get(child) {
                            Node::Internal(node) => node.parent(),
                            Node::Leaf(node) => node.parent(),
                        };
                        if child_parent != Some(handle) {
                            errors.push(format!(
                                "child {child:?} of {handle:?} has parent {child_parent:?}"
                            ));
                        }
                        if self.nodes.get(child).lowest_key() != internal.separator(i) {
                            errors.push(format!(
                                "separator {i} of {handle:?} is not its child's lowest key"
                            ));
                        }
                        total += self.validate_node(child, depth + 1, leaf_depth, leaves, errors);
                    }
                    total
                }
            }
        }

        fn validate_leaf_chain(&self, leaves: &[Handle], errors: &mut Vec<String>) {
            // In-order traversal and the sibling chain must name the same
            // leaves, doubly linked, and globally sorted end to end.
            let mut walked = Vec::new();
            let mut current = Some(self.first_leaf());
            let mut prev: Option<Handle> = None;
            let mut last_key: Option<&K> = None;
            while let Some(handle) = current {
                let leaf = self.nodes.get(handle).as_leaf();
                if leaf.prev() != prev {
                    errors.push(format!("leaf {handle:?} prev link is {:?}", leaf.prev()));
                }
                for i in 0..leaf.len() {
                    if let Some(last) = last_key
                        && last > leaf.key(i)
                    {
                        errors.push(format!("chain breaks sort order entering {handle:?}"));
                    }
                    last_key = Some(leaf.key(i));
                }
                walked.push(handle);
                prev = Some(handle);
                current = leaf.next();
            }
            if walked != leaves {
                errors.push(format!(
                    "chain walks {} leaves, traversal found {}",
                    walked.len(),
                    leaves.len()
                ));
            }
        }
    }

    fn collect_entries(map: &RawBoughMap<i64, i64>) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        let mut current = Some(map.first_leaf());
        while let Some(handle) = current {
            let leaf = map.node(handle).as_leaf();
            for i in 0..leaf.len() {
                out.push((*leaf.key(i), *leaf.value(i)));
            }
            current = leaf.next();
        }
        out
    }

    fn leaf_shapes(map: &RawBoughMap<i64, i64>) -> Vec<Vec<i64>> {
        let mut out = Vec::new();
        let mut current = Some(map.first_leaf());
        while let Some(handle) = current {
            let leaf = map.node(handle).as_leaf();
            out.push(leaf.keys().to_vec());
            current = leaf.next();
        }
        out
    }

    #[test]
    fn first_split_shape_matches_half_index() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(4);
        for k in 0..4 {
            map.insert(k, k).unwrap();
            map.validate_invariants();
        }
        assert_eq!(map.height(), 1);

        // The fifth insert overflows the root leaf: split index 4 / 2 = 2,
        // left keeps [0, 1], right takes [2, 3] and receives the 4.
        map.insert(4, 4).unwrap();
        map.validate_invariants();
        assert_eq!(map.height(), 2);
        assert_eq!(leaf_shapes(&map), [vec![0, 1], vec![2, 3, 4]]);
    }

    #[test]
    fn root_promotion_reaches_three_levels() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(4);
        let mut heights = Vec::new();
        for k in 0..11 {
            map.insert(k, k * 100).unwrap();
            map.validate_invariants();
            heights.push(map.height());
        }
        // Height never decreases and the eleventh insert splits the root
        // internal node.
        assert!(heights.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(map.height(), 3);
        assert_eq!(
            collect_entries(&map),
            (0..11).map(|k| (k, k * 100)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_keys_stay_in_arrival_order_across_splits() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(4);
        for run in 0..6 {
            map.insert(7, run).unwrap();
            map.insert(3, run).unwrap();
            map.validate_invariants();
        }
        let entries = collect_entries(&map);
        let threes: Vec<i64> = entries.iter().filter(|(k, _)| *k == 3).map(|(_, v)| *v).collect();
        let sevens: Vec<i64> = entries.iter().filter(|(k, _)| *k == 7).map(|(_, v)| *v).collect();
        assert_eq!(threes, (0..6).collect::<Vec<_>>());
        assert_eq!(sevens, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn routing_underflow_is_reported_and_harmless() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(2);
        for k in [10, 20, 30] {
            map.insert(k, k).unwrap();
        }
        assert!(map.height() > 1);
        let before = collect_entries(&map);

        assert_eq!(map.insert(5, 5), Err(Error::RoutingUnderflow));
        map.validate_invariants();
        assert_eq!(collect_entries(&map), before);
        assert_eq!(map.len(), 3);

        // Equal to the minimum is routable; only strictly below fails.
        map.insert(10, 11).unwrap();
        map.validate_invariants();
    }

    #[test]
    fn lower_bound_hops_to_the_next_leaf() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(4);
        for k in [0, 10, 20, 30, 40] {
            map.insert(k, k).unwrap();
        }
        // Leaves are now [0, 10] and [20, 30, 40]; 15 routes into the
        // first leaf but its lower bound lies past that leaf's entries.
        assert_eq!(leaf_shapes(&map), [vec![0, 10], vec![20, 30, 40]]);
        let cursor = map.lower_bound_cursor(&15);
        assert_eq!(map.entry(cursor).unwrap(), (&20, &20));

        assert_eq!(map.lower_bound_cursor(&41), RawCursor::END);
    }

    #[test]
    fn dump_renders_every_node() {
        let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(4);
        for k in 0..5 {
            map.insert(k, k).unwrap();
        }
        let rendered = map.dump();
        assert!(rendered.contains("internal_node:"));
        assert_eq!(rendered.matches("leaf_node:").count(), 2);
        assert!(rendered.contains("separator: 0"));
        assert!(rendered.contains("(4, 4)"));
    }

    proptest! {
        /// Replays a random insertion sequence against a sorted-vector
        /// model (stable among equal keys) and validates the structural
        /// invariants after every step. A sentinel minimum goes in first
        /// so routing underflow cannot fire.
        #[test]
        fn random_inserts_match_model(
            branching in 2usize..9,
            keys in prop::collection::vec(-50i64..50, 0..300),
        ) {
            let mut map: RawBoughMap<i64, i64> = RawBoughMap::new(branching);
            let mut model: Vec<(i64, i64)> = Vec::new();

            map.insert(i64::MIN, 0).unwrap();
            model.push((i64::MIN, 0));

            for (serial, &key) in keys.iter().enumerate() {
                let value = serial as i64;
                let cursor = map.insert(key, value).unwrap();
                prop_assert_eq!(map.entry(cursor).unwrap(), (&key, &value));

                let at = model.partition_point(|(k, _)| *k <= key);
                model.insert(at, (key, value));

                map.validate_invariants();
            }

            prop_assert_eq!(map.len(), model.len());
            prop_assert_eq!(collect_entries(&map), model);
        }
    }
}
