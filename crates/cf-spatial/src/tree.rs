//! Dynamic bounding box tree with a persistent pair cache.
//!
//! Leaves store a possibly fattened copy of each object's box. Internal nodes
//! store the union of their two children. Inserting picks the child whose
//! area grows least, so the tree stays reasonably balanced without rotations.
//!
//! # Pair cache
//!
//! Every leaf heads a doubly linked list ("thread") of the overlap pairs it
//! takes part in. A pair is linked into the threads of both of its leaves.
//! During [`BBTree::reindex_query`], a leaf whose box did not need to change
//! replays its cached pairs instead of querying the tree, so the cost of a
//! pass is proportional to the number of objects that actually moved.
//!
//! Each leaf also records the stamp at which it was last reinserted. Only
//! leaves with the current stamp query the tree, and a pair is reported by
//! exactly one of its two leaves.
//!
//! # Static leaves
//!
//! Leaves inserted with [`BBTree::insert_static`] live under a second root.
//! They pair with dynamic leaves but never with each other, and reindexing
//! the dynamic leaves does not touch them.
//!
//! # Storage
//!
//! Nodes and pairs live in two arenas addressed by index. Removed entries
//! are pushed on a free stack and reused before the arena grows.

use std::collections::BTreeMap;
use std::fmt::Debug;

use nalgebra::Point2;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Aabb, SpatialError, SpatialSource};

// ============================================================================
// Configuration
// ============================================================================

/// How stored leaf boxes are fattened when the source reports a velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeConfig {
    /// Margin added on every side, as a fraction of the box size.
    pub fattening: f64,
    /// Velocity multiplier for the extra margin in the direction of travel.
    pub velocity_scale: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            fattening: 0.1,
            velocity_scale: 0.1,
        }
    }
}

impl TreeConfig {
    /// No fattening at all; stored boxes equal the source boxes.
    #[must_use]
    pub fn tight() -> Self {
        Self {
            fattening: 0.0,
            velocity_scale: 0.0,
        }
    }

    /// Set the size-relative margin.
    #[must_use]
    pub fn with_fattening(mut self, fattening: f64) -> Self {
        self.fattening = fattening;
        self
    }

    /// Set the velocity multiplier.
    #[must_use]
    pub fn with_velocity_scale(mut self, velocity_scale: f64) -> Self {
        self.velocity_scale = velocity_scale;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is negative or not finite.
    pub fn validate(&self) -> Result<(), SpatialError> {
        if !self.fattening.is_finite() || self.fattening < 0.0 {
            return Err(SpatialError::invalid_config(format!(
                "fattening must be finite and non-negative, got {}",
                self.fattening
            )));
        }
        if !self.velocity_scale.is_finite() || self.velocity_scale < 0.0 {
            return Err(SpatialError::invalid_config(format!(
                "velocity_scale must be finite and non-negative, got {}",
                self.velocity_scale
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Arena entries
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Leaf<K> {
    key: K,
    stamp: u64,
    /// Head of this leaf's pair thread.
    pairs: Option<usize>,
    is_static: bool,
}

#[derive(Debug, Clone, Copy)]
enum NodeKind<K> {
    Internal { a: usize, b: usize },
    Leaf(Leaf<K>),
    Free,
}

#[derive(Debug, Clone, Copy)]
struct Node<K> {
    bb: Aabb,
    parent: Option<usize>,
    kind: NodeKind<K>,
}

/// One leaf's links inside a pair.
#[derive(Debug, Clone, Copy)]
struct Thread {
    prev: Option<usize>,
    leaf: usize,
    next: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Pair {
    a: Thread,
    b: Thread,
}

// ============================================================================
// Tree
// ============================================================================

/// A dynamic AABB tree over keys of type `K`.
///
/// # Example
///
/// ```
/// use cf_spatial::{Aabb, BBTree};
///
/// let mut boxes = vec![
///     Aabb::from_edges(0.0, 0.0, 1.0, 1.0),
///     Aabb::from_edges(0.5, 0.5, 1.5, 1.5),
///     Aabb::from_edges(5.0, 5.0, 6.0, 6.0),
/// ];
///
/// let mut tree = BBTree::new();
/// for key in 0..boxes.len() {
///     tree.insert(key, &|i: usize| boxes[i]).unwrap();
/// }
///
/// let mut pairs = Vec::new();
/// tree.reindex_query(&|i: usize| boxes[i], |a, b| pairs.push((a.min(b), a.max(b))));
/// assert_eq!(pairs, vec![(0, 1)]);
///
/// // Move box 2 onto box 1.
/// boxes[2] = Aabb::from_edges(1.2, 1.2, 2.0, 2.0);
/// let mut pairs = Vec::new();
/// tree.reindex_query(&|i: usize| boxes[i], |a, b| pairs.push((a.min(b), a.max(b))));
/// pairs.sort_unstable();
/// assert_eq!(pairs, vec![(0, 1), (1, 2)]);
/// ```
#[derive(Debug, Clone)]
pub struct BBTree<K> {
    config: TreeConfig,
    nodes: Vec<Node<K>>,
    free_nodes: Vec<usize>,
    pairs: Vec<Pair>,
    free_pairs: Vec<usize>,
    leaves: BTreeMap<K, usize>,
    root: Option<usize>,
    static_root: Option<usize>,
    stamp: u64,
}

impl<K: Copy + Ord + Debug> Default for BBTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Ord + Debug> BBTree<K> {
    /// Create an empty tree with the default fattening.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with the given configuration.
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            pairs: Vec::new(),
            free_pairs: Vec::new(),
            leaves: BTreeMap::new(),
            root: None,
            static_root: None,
            stamp: 0,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of indexed keys, static and dynamic.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree indexes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Whether `key` is indexed.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.leaves.contains_key(&key)
    }

    /// Whether `key` is a static leaf, or `None` if it is not indexed.
    #[must_use]
    pub fn is_static(&self, key: K) -> Option<bool> {
        let node = *self.leaves.get(&key)?;
        self.leaf(node).map(|leaf| leaf.is_static)
    }

    /// Current stamp. Advances after every insert and reindex.
    #[must_use]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// The stored (possibly fattened) box of `key`.
    #[must_use]
    pub fn fat_bounds(&self, key: K) -> Option<Aabb> {
        self.leaves.get(&key).map(|&node| self.nodes[node].bb)
    }

    /// Number of overlap pairs currently cached.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len() - self.free_pairs.len()
    }

    /// Keys that share a cached pair with `key`, in thread order.
    #[must_use]
    pub fn cached_pairs(&self, key: K) -> Vec<K> {
        let Some(&leaf) = self.leaves.get(&key) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut pair = self.leaf_pairs(leaf);
        while let Some(p) = pair {
            let Pair { a, b } = self.pairs[p];
            let (own, other) = if a.leaf == leaf { (a, b) } else { (b, a) };
            if let Some(other) = self.key_of(other.leaf) {
                out.push(other);
            }
            pair = own.next;
        }
        out
    }

    // ------------------------------------------------------------------------
    // Insertion and removal
    // ------------------------------------------------------------------------

    /// Insert a dynamic key.
    ///
    /// The new leaf immediately pairs with every dynamic and static leaf it
    /// overlaps.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateKey`] if `key` is already indexed.
    pub fn insert<S>(&mut self, key: K, source: &S) -> Result<(), SpatialError>
    where
        S: SpatialSource<K> + ?Sized,
    {
        self.insert_leaf(key, source, false)
    }

    /// Insert a static key.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateKey`] if `key` is already indexed.
    pub fn insert_static<S>(&mut self, key: K, source: &S) -> Result<(), SpatialError>
    where
        S: SpatialSource<K> + ?Sized,
    {
        self.insert_leaf(key, source, true)
    }

    fn insert_leaf<S>(&mut self, key: K, source: &S, is_static: bool) -> Result<(), SpatialError>
    where
        S: SpatialSource<K> + ?Sized,
    {
        if self.leaves.contains_key(&key) {
            return Err(SpatialError::duplicate_key(&key));
        }

        let bb = self.stored_bounds(key, source);
        let leaf = self.alloc_node(Node {
            bb,
            parent: None,
            kind: NodeKind::Leaf(Leaf {
                key,
                stamp: self.stamp,
                pairs: None,
                is_static,
            }),
        });
        self.leaves.insert(key, leaf);

        let root = self.subtree_insert(self.root_for(is_static), leaf);
        self.nodes[root].parent = None;
        self.set_root(is_static, Some(root));

        self.leaf_add_pairs(leaf);
        self.stamp += 1;
        Ok(())
    }

    /// Remove a key and every cached pair it takes part in.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownKey`] if `key` is not indexed.
    pub fn remove(&mut self, key: K) -> Result<(), SpatialError> {
        let leaf = self
            .leaves
            .remove(&key)
            .ok_or_else(|| SpatialError::unknown_key(&key))?;

        self.detach_leaf(leaf);
        self.pairs_clear(leaf);
        self.recycle_node(leaf);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reindexing
    // ------------------------------------------------------------------------

    /// Refresh one key's box and pairs.
    ///
    /// If the new box still fits the stored one, nothing changes apart from
    /// the stamp.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownKey`] if `key` is not indexed.
    pub fn reindex_object<S>(&mut self, key: K, source: &S) -> Result<(), SpatialError>
    where
        S: SpatialSource<K> + ?Sized,
    {
        let leaf = *self
            .leaves
            .get(&key)
            .ok_or_else(|| SpatialError::unknown_key(&key))?;

        if self.leaf_update(leaf, source) {
            self.leaf_add_pairs(leaf);
        }
        self.stamp += 1;
        Ok(())
    }

    /// Refresh every dynamic leaf without reporting pairs.
    pub fn reindex<S>(&mut self, source: &S)
    where
        S: SpatialSource<K> + ?Sized,
    {
        self.reindex_query(source, |_, _| {});
    }

    /// Refresh every static leaf.
    ///
    /// Static leaves whose box escaped the stored one are reinserted and
    /// re-paired with the dynamic leaves they now overlap.
    pub fn reindex_static<S>(&mut self, source: &S)
    where
        S: SpatialSource<K> + ?Sized,
    {
        for leaf in self.leaf_nodes(true) {
            if self.leaf_update(leaf, source) {
                self.leaf_add_pairs(leaf);
            }
        }
        self.stamp += 1;
    }

    /// Refresh every dynamic leaf, then report each overlapping pair once.
    ///
    /// The callback receives every dynamic/dynamic and dynamic/static pair
    /// whose stored boxes overlap. Static/static pairs are never reported.
    /// The order of the two keys within a pair is unspecified.
    pub fn reindex_query<S, F>(&mut self, source: &S, mut callback: F)
    where
        S: SpatialSource<K> + ?Sized,
        F: FnMut(K, K),
    {
        if self.root.is_none() {
            return;
        }

        let mut moved = 0_usize;
        for leaf in self.leaf_nodes(false) {
            if self.leaf_update(leaf, source) {
                moved += 1;
            }
        }
        trace!(moved, stamp = self.stamp, "reindexed dynamic leaves");

        if let Some(root) = self.root {
            self.mark_subtree(root, &mut callback);
        }
        self.stamp += 1;
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Report every key whose stored box intersects `bb`.
    ///
    /// Dynamic leaves are visited before static ones.
    pub fn query<F>(&self, bb: &Aabb, mut callback: F)
    where
        F: FnMut(K),
    {
        for root in [self.root, self.static_root].into_iter().flatten() {
            self.subtree_query(root, bb, &mut callback);
        }
    }

    /// Report every key whose stored box contains `point`.
    pub fn point_query<F>(&self, point: &Point2<f64>, callback: F)
    where
        F: FnMut(K),
    {
        self.query(&Aabb::from_point(*point), callback);
    }

    /// Walk the leaves along the segment `start -> end`, nearest box first.
    ///
    /// The callback returns the fraction at which the segment hits the
    /// object, or anything `>= t_exit` for a miss. Subtrees whose box is
    /// entered at or beyond the smallest fraction so far are skipped.
    /// Returns that smallest fraction, or `t_exit` if nothing was hit.
    ///
    /// # Example
    ///
    /// ```
    /// use cf_spatial::{Aabb, BBTree};
    /// use nalgebra::Point2;
    ///
    /// let boxes = [
    ///     Aabb::from_edges(2.0, -1.0, 3.0, 1.0),
    ///     Aabb::from_edges(6.0, -1.0, 7.0, 1.0),
    /// ];
    /// let source = |i: usize| boxes[i];
    /// let mut tree = BBTree::new();
    /// tree.insert(0, &source).unwrap();
    /// tree.insert(1, &source).unwrap();
    ///
    /// let (start, end) = (Point2::new(0.0, 0.0), Point2::new(10.0, 0.0));
    /// let mut visited = Vec::new();
    /// let t = tree.segment_query(&start, &end, 1.0, |key| {
    ///     visited.push(key);
    ///     boxes[key].segment_fraction(&start, &end)
    /// });
    ///
    /// assert_eq!(t, 0.2);
    /// assert_eq!(visited, vec![0]);
    /// ```
    pub fn segment_query<F>(
        &self,
        start: &Point2<f64>,
        end: &Point2<f64>,
        t_exit: f64,
        mut callback: F,
    ) -> f64
    where
        F: FnMut(K) -> f64,
    {
        let mut roots: Vec<(f64, usize)> = [self.root, self.static_root]
            .into_iter()
            .flatten()
            .map(|root| (self.nodes[root].bb.segment_fraction(start, end), root))
            .collect();
        roots.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut t_exit = t_exit;
        for (t, root) in roots {
            if t < t_exit {
                t_exit = t_exit.min(self.subtree_segment_query(root, start, end, t_exit, &mut callback));
            }
        }
        t_exit
    }

    /// Visit every key in key order.
    pub fn each<F>(&self, mut callback: F)
    where
        F: FnMut(K),
    {
        for &key in self.leaves.keys() {
            callback(key);
        }
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Rebuild both hierarchies top-down by median splits.
    ///
    /// Leaves, their stored boxes and their cached pairs are untouched; only
    /// the internal nodes are replaced.
    pub fn optimize(&mut self) {
        for is_static in [false, true] {
            let Some(root) = self.root_for(is_static) else {
                continue;
            };

            let mut leaves = self.leaf_nodes(is_static);
            self.subtree_recycle(root);
            for &leaf in &leaves {
                self.nodes[leaf].parent = None;
            }

            let root = self.partition_nodes(&mut leaves);
            self.nodes[root].parent = None;
            self.set_root(is_static, Some(root));

            debug!(leaves = leaves.len(), is_static, "rebuilt bounding box tree");
        }
    }

    /// Check the structural invariants of both hierarchies and all threads.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::CorruptTree`] or
    /// [`SpatialError::CorruptPairThread`] describing the first failed check.
    pub fn validate(&self) -> Result<(), SpatialError> {
        let mut reached = 0;
        for (root, is_static) in [(self.root, false), (self.static_root, true)] {
            let Some(root) = root else {
                continue;
            };
            if self.nodes[root].parent.is_some() {
                return Err(SpatialError::corrupt_tree(format!(
                    "root {root} has a parent"
                )));
            }
            reached += self.validate_subtree(root, is_static)?;
        }

        if reached != self.leaves.len() {
            return Err(SpatialError::corrupt_tree(format!(
                "{reached} leaves reachable from the roots, {} indexed",
                self.leaves.len()
            )));
        }

        for &leaf in self.leaves.values() {
            self.validate_thread(leaf)?;
        }
        Ok(())
    }

    // ========================================================================
    // Node arena
    // ========================================================================

    fn alloc_node(&mut self, node: Node<K>) -> usize {
        if let Some(index) = self.free_nodes.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn recycle_node(&mut self, index: usize) {
        self.nodes[index].parent = None;
        self.nodes[index].kind = NodeKind::Free;
        self.free_nodes.push(index);
    }

    fn new_internal(&mut self, a: usize, b: usize) -> usize {
        let bb = self.nodes[a].bb.union(&self.nodes[b].bb);
        let node = self.alloc_node(Node {
            bb,
            parent: None,
            kind: NodeKind::Internal { a, b },
        });
        self.nodes[a].parent = Some(node);
        self.nodes[b].parent = Some(node);
        node
    }

    fn children(&self, node: usize) -> Option<(usize, usize)> {
        match self.nodes[node].kind {
            NodeKind::Internal { a, b } => Some((a, b)),
            _ => None,
        }
    }

    fn leaf(&self, node: usize) -> Option<&Leaf<K>> {
        match &self.nodes[node].kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    fn leaf_mut(&mut self, node: usize) -> Option<&mut Leaf<K>> {
        match &mut self.nodes[node].kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    fn key_of(&self, node: usize) -> Option<K> {
        self.leaf(node).map(|leaf| leaf.key)
    }

    fn stamp_of(&self, node: usize) -> u64 {
        self.leaf(node).map_or(0, |leaf| leaf.stamp)
    }

    fn leaf_pairs(&self, node: usize) -> Option<usize> {
        self.leaf(node).and_then(|leaf| leaf.pairs)
    }

    fn set_leaf_pairs(&mut self, node: usize, pairs: Option<usize>) {
        if let Some(leaf) = self.leaf_mut(node) {
            leaf.pairs = pairs;
        }
    }

    fn set_child(&mut self, parent: usize, old: usize, new: usize) {
        if let NodeKind::Internal { a, b } = &mut self.nodes[parent].kind {
            if *a == old {
                *a = new;
            } else if *b == old {
                *b = new;
            }
        }
        self.nodes[new].parent = Some(parent);
    }

    fn other_child(&self, node: usize, child: usize) -> Option<usize> {
        let (a, b) = self.children(node)?;
        Some(if a == child { b } else { a })
    }

    fn root_for(&self, is_static: bool) -> Option<usize> {
        if is_static {
            self.static_root
        } else {
            self.root
        }
    }

    fn set_root(&mut self, is_static: bool, root: Option<usize>) {
        if is_static {
            self.static_root = root;
        } else {
            self.root = root;
        }
    }

    /// Leaf node indices of one partition, in key order.
    fn leaf_nodes(&self, is_static: bool) -> Vec<usize> {
        self.leaves
            .values()
            .copied()
            .filter(|&node| self.leaf(node).is_some_and(|leaf| leaf.is_static == is_static))
            .collect()
    }

    fn stored_bounds<S>(&self, key: K, source: &S) -> Aabb
    where
        S: SpatialSource<K> + ?Sized,
    {
        let bb = source.bounds(key);
        let Some(velocity) = source.velocity(key) else {
            return bb;
        };

        let x = bb.width() * self.config.fattening;
        let y = bb.height() * self.config.fattening;
        let v = velocity * self.config.velocity_scale;
        Aabb::from_edges(
            bb.min.x + (-x).min(v.x),
            bb.min.y + (-y).min(v.y),
            bb.max.x + x.max(v.x),
            bb.max.y + y.max(v.y),
        )
    }

    // ========================================================================
    // Hierarchy edits
    // ========================================================================

    /// Insert `leaf` below `subtree` and return the new subtree root.
    fn subtree_insert(&mut self, subtree: Option<usize>, leaf: usize) -> usize {
        let Some(subtree) = subtree else {
            return leaf;
        };
        let Some((a, b)) = self.children(subtree) else {
            return self.new_internal(leaf, subtree);
        };

        let leaf_bb = self.nodes[leaf].bb;
        let bb_a = self.nodes[a].bb;
        let bb_b = self.nodes[b].bb;

        let mut cost_a = bb_b.area() + bb_a.merged_area(&leaf_bb);
        let mut cost_b = bb_a.area() + bb_b.merged_area(&leaf_bb);
        if cost_a == cost_b {
            cost_a = bb_a.proximity(&leaf_bb);
            cost_b = bb_b.proximity(&leaf_bb);
        }

        if cost_b < cost_a {
            let child = self.subtree_insert(Some(b), leaf);
            self.set_child(subtree, b, child);
        } else {
            let child = self.subtree_insert(Some(a), leaf);
            self.set_child(subtree, a, child);
        }

        self.nodes[subtree].bb = self.nodes[subtree].bb.union(&leaf_bb);
        subtree
    }

    /// Remove `leaf` from below `subtree` and return the new subtree root.
    fn subtree_remove(&mut self, subtree: usize, leaf: usize) -> Option<usize> {
        if leaf == subtree {
            return None;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            return Some(subtree);
        };
        let Some(other) = self.other_child(parent, leaf) else {
            return Some(subtree);
        };

        if parent == subtree {
            self.nodes[other].parent = self.nodes[subtree].parent;
            self.recycle_node(subtree);
            Some(other)
        } else {
            if let Some(grandparent) = self.nodes[parent].parent {
                self.replace_child(grandparent, parent, other);
            }
            Some(subtree)
        }
    }

    /// Replace `child` of `parent` with `value`, recycle `child` and refit
    /// every ancestor box.
    fn replace_child(&mut self, parent: usize, child: usize, value: usize) {
        debug_assert!(
            self.children(parent)
                .is_some_and(|(a, b)| a == child || b == child),
            "node {child} is not a child of {parent}"
        );

        self.recycle_node(child);
        self.set_child(parent, child, value);

        let mut node = Some(parent);
        while let Some(n) = node {
            if let Some((a, b)) = self.children(n) {
                self.nodes[n].bb = self.nodes[a].bb.union(&self.nodes[b].bb);
            }
            node = self.nodes[n].parent;
        }
    }

    /// Take a leaf out of its hierarchy, leaving its pairs alone.
    fn detach_leaf(&mut self, leaf: usize) {
        let Some(is_static) = self.leaf(leaf).map(|l| l.is_static) else {
            return;
        };
        if let Some(root) = self.root_for(is_static) {
            let root = self.subtree_remove(root, leaf);
            self.set_root(is_static, root);
        }
        self.nodes[leaf].parent = None;
    }

    /// Recycle every internal node below and including `node`.
    fn subtree_recycle(&mut self, node: usize) {
        if let Some((a, b)) = self.children(node) {
            self.subtree_recycle(a);
            self.subtree_recycle(b);
            self.recycle_node(node);
        }
    }

    /// Reinsert a leaf if its source box escaped the stored box.
    ///
    /// Returns whether it was reinserted. A reinserted leaf drops its pairs
    /// and takes the current stamp.
    fn leaf_update<S>(&mut self, leaf: usize, source: &S) -> bool
    where
        S: SpatialSource<K> + ?Sized,
    {
        let Some(Leaf { key, is_static, .. }) = self.leaf(leaf).copied() else {
            return false;
        };

        let bb = source.bounds(key);
        if self.nodes[leaf].bb.contains(&bb) {
            return false;
        }

        self.detach_leaf(leaf);
        self.nodes[leaf].bb = self.stored_bounds(key, source);
        let root = self.subtree_insert(self.root_for(is_static), leaf);
        self.nodes[root].parent = None;
        self.set_root(is_static, Some(root));

        self.pairs_clear(leaf);
        let stamp = self.stamp;
        if let Some(leaf) = self.leaf_mut(leaf) {
            leaf.stamp = stamp;
        }
        true
    }

    fn partition_nodes(&mut self, nodes: &mut [usize]) -> usize {
        match *nodes {
            [leaf] => return leaf,
            [a, b] => return self.new_internal(a, b),
            _ => {}
        }

        let bb = nodes
            .iter()
            .fold(self.nodes[nodes[0]].bb, |acc, &n| acc.union(&self.nodes[n].bb));
        let split_width = bb.width() > bb.height();

        let mut bounds: Vec<f64> = nodes
            .iter()
            .flat_map(|&n| {
                let bb = self.nodes[n].bb;
                if split_width {
                    [bb.min.x, bb.max.x]
                } else {
                    [bb.min.y, bb.max.y]
                }
            })
            .collect();
        bounds.sort_by(f64::total_cmp);

        let count = nodes.len();
        let split = (bounds[count - 1] + bounds[count]) * 0.5;

        let (mut half_a, mut half_b) = (bb, bb);
        if split_width {
            half_a.max.x = split;
            half_b.min.x = split;
        } else {
            half_a.max.y = split;
            half_b.min.y = split;
        }

        let mut left = 0;
        let mut right = count;
        while left < right {
            let node_bb = self.nodes[nodes[left]].bb;
            if node_bb.merged_area(&half_b) < node_bb.merged_area(&half_a) {
                right -= 1;
                nodes.swap(left, right);
            } else {
                left += 1;
            }
        }

        // Everything landed on one side; fall back to incremental insertion.
        if right == 0 || right == count {
            let mut root = None;
            for &leaf in nodes.iter() {
                root = Some(self.subtree_insert(root, leaf));
            }
            return root.unwrap_or(nodes[0]);
        }

        let (lower, upper) = nodes.split_at_mut(right);
        let a = self.partition_nodes(lower);
        let b = self.partition_nodes(upper);
        self.new_internal(a, b)
    }

    // ========================================================================
    // Pair threads
    // ========================================================================

    fn thread_mut(&mut self, pair: usize, leaf: usize) -> &mut Thread {
        let pair = &mut self.pairs[pair];
        debug_assert!(
            pair.a.leaf == leaf || pair.b.leaf == leaf,
            "pair thread corrupt: node {leaf} is not part of the pair"
        );
        if pair.a.leaf == leaf {
            &mut pair.a
        } else {
            &mut pair.b
        }
    }

    /// Push a new pair on the front of both leaves' threads.
    fn pair_insert(&mut self, a: usize, b: usize) {
        let next_a = self.leaf_pairs(a);
        let next_b = self.leaf_pairs(b);
        let pair = Pair {
            a: Thread {
                prev: None,
                leaf: a,
                next: next_a,
            },
            b: Thread {
                prev: None,
                leaf: b,
                next: next_b,
            },
        };

        let index = if let Some(index) = self.free_pairs.pop() {
            self.pairs[index] = pair;
            index
        } else {
            self.pairs.push(pair);
            self.pairs.len() - 1
        };

        self.set_leaf_pairs(a, Some(index));
        self.set_leaf_pairs(b, Some(index));
        if let Some(next) = next_a {
            self.thread_mut(next, a).prev = Some(index);
        }
        if let Some(next) = next_b {
            self.thread_mut(next, b).prev = Some(index);
        }
    }

    fn thread_unlink(&mut self, thread: Thread) {
        if let Some(next) = thread.next {
            self.thread_mut(next, thread.leaf).prev = thread.prev;
        }
        match thread.prev {
            Some(prev) => self.thread_mut(prev, thread.leaf).next = thread.next,
            None => self.set_leaf_pairs(thread.leaf, thread.next),
        }
    }

    /// Drop every pair of `leaf`, unlinking each from the other leaf's thread.
    fn pairs_clear(&mut self, leaf: usize) {
        let mut pair = self.leaf_pairs(leaf);
        self.set_leaf_pairs(leaf, None);

        while let Some(p) = pair {
            let Pair { a, b } = self.pairs[p];
            if a.leaf == leaf {
                pair = a.next;
                self.thread_unlink(b);
            } else {
                pair = b.next;
                self.thread_unlink(a);
            }
            self.free_pairs.push(p);
        }
    }

    // ========================================================================
    // Marking
    // ========================================================================

    /// Find leaves under `subtree` overlapping `leaf`.
    ///
    /// With `left` set the pair is only cached; the other leaf reports it
    /// later in the same pass. Otherwise the pair is reported now, and cached
    /// if the other leaf is older.
    fn mark_leaf_query<F>(&mut self, subtree: usize, leaf: usize, left: bool, callback: &mut F)
    where
        F: FnMut(K, K),
    {
        if !self.nodes[leaf].bb.intersects(&self.nodes[subtree].bb) {
            return;
        }

        match self.nodes[subtree].kind {
            NodeKind::Internal { a, b } => {
                self.mark_leaf_query(a, leaf, left, callback);
                self.mark_leaf_query(b, leaf, left, callback);
            }
            NodeKind::Leaf(other) => {
                if left {
                    self.pair_insert(leaf, subtree);
                } else {
                    if other.stamp < self.stamp_of(leaf) {
                        self.pair_insert(subtree, leaf);
                    }
                    if let Some(key) = self.key_of(leaf) {
                        callback(key, other.key);
                    }
                }
            }
            NodeKind::Free => {}
        }
    }

    fn mark_leaf<F>(&mut self, leaf: usize, callback: &mut F)
    where
        F: FnMut(K, K),
    {
        let Some(info) = self.leaf(leaf).copied() else {
            return;
        };

        if info.stamp == self.stamp {
            if let Some(static_root) = self.static_root {
                self.mark_leaf_query(static_root, leaf, false, callback);
            }

            let mut node = leaf;
            while let Some(parent) = self.nodes[node].parent {
                if let Some((a, b)) = self.children(parent) {
                    if node == a {
                        self.mark_leaf_query(b, leaf, true, callback);
                    } else {
                        self.mark_leaf_query(a, leaf, false, callback);
                    }
                }
                node = parent;
            }
        } else {
            let mut pair = info.pairs;
            while let Some(p) = pair {
                let Pair { a, b } = self.pairs[p];
                if b.leaf == leaf {
                    if let Some(other) = self.key_of(a.leaf) {
                        callback(other, info.key);
                    }
                    pair = b.next;
                } else {
                    pair = a.next;
                }
            }
        }
    }

    fn mark_subtree<F>(&mut self, node: usize, callback: &mut F)
    where
        F: FnMut(K, K),
    {
        match self.nodes[node].kind {
            NodeKind::Internal { a, b } => {
                self.mark_subtree(a, callback);
                self.mark_subtree(b, callback);
            }
            NodeKind::Leaf(_) => self.mark_leaf(node, callback),
            NodeKind::Free => {}
        }
    }

    /// Cache pairs for a freshly inserted or reinserted leaf.
    fn leaf_add_pairs(&mut self, leaf: usize) {
        let Some(is_static) = self.leaf(leaf).map(|l| l.is_static) else {
            return;
        };

        if is_static {
            if let Some(root) = self.root {
                self.mark_leaf_query(root, leaf, true, &mut |_, _| {});
            }
        } else {
            self.mark_leaf(leaf, &mut |_, _| {});
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn subtree_query<F>(&self, node: usize, bb: &Aabb, callback: &mut F)
    where
        F: FnMut(K),
    {
        if !self.nodes[node].bb.intersects(bb) {
            return;
        }
        match self.nodes[node].kind {
            NodeKind::Internal { a, b } => {
                self.subtree_query(a, bb, callback);
                self.subtree_query(b, bb, callback);
            }
            NodeKind::Leaf(leaf) => callback(leaf.key),
            NodeKind::Free => {}
        }
    }

    fn subtree_segment_query<F>(
        &self,
        node: usize,
        start: &Point2<f64>,
        end: &Point2<f64>,
        mut t_exit: f64,
        callback: &mut F,
    ) -> f64
    where
        F: FnMut(K) -> f64,
    {
        match self.nodes[node].kind {
            NodeKind::Leaf(leaf) => callback(leaf.key),
            NodeKind::Internal { a, b } => {
                let t_a = self.nodes[a].bb.segment_fraction(start, end);
                let t_b = self.nodes[b].bb.segment_fraction(start, end);
                let order = if t_a < t_b {
                    [(t_a, a), (t_b, b)]
                } else {
                    [(t_b, b), (t_a, a)]
                };

                for (t, child) in order {
                    if t < t_exit {
                        t_exit = t_exit.min(self.subtree_segment_query(
                            child, start, end, t_exit, callback,
                        ));
                    }
                }
                t_exit
            }
            NodeKind::Free => t_exit,
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn validate_subtree(&self, node: usize, is_static: bool) -> Result<usize, SpatialError> {
        match self.nodes[node].kind {
            NodeKind::Free => Err(SpatialError::corrupt_tree(format!(
                "free node {node} is still linked"
            ))),
            NodeKind::Leaf(leaf) => {
                if leaf.is_static != is_static {
                    return Err(SpatialError::corrupt_tree(format!(
                        "leaf {:?} is under the wrong root",
                        leaf.key
                    )));
                }
                if self.leaves.get(&leaf.key) != Some(&node) {
                    return Err(SpatialError::corrupt_tree(format!(
                        "leaf {:?} is not indexed at node {node}",
                        leaf.key
                    )));
                }
                Ok(1)
            }
            NodeKind::Internal { a, b } => {
                for child in [a, b] {
                    if self.nodes[child].parent != Some(node) {
                        return Err(SpatialError::corrupt_tree(format!(
                            "node {child} does not point back to parent {node}"
                        )));
                    }
                }
                let merged = self.nodes[a].bb.union(&self.nodes[b].bb);
                if self.nodes[node].bb != merged {
                    return Err(SpatialError::corrupt_tree(format!(
                        "box of node {node} is not the union of its children"
                    )));
                }
                Ok(self.validate_subtree(a, is_static)? + self.validate_subtree(b, is_static)?)
            }
        }
    }

    fn validate_thread(&self, leaf: usize) -> Result<(), SpatialError> {
        let mut prev = None;
        let mut pair = self.leaf_pairs(leaf);
        let mut steps = 0;

        while let Some(p) = pair {
            steps += 1;
            if steps > self.pairs.len() {
                return Err(SpatialError::corrupt_pairs(format!(
                    "thread of node {leaf} loops"
                )));
            }

            let Pair { a, b } = *self.pairs.get(p).ok_or_else(|| {
                SpatialError::corrupt_pairs(format!("pair {p} is out of range"))
            })?;
            let (own, other) = if a.leaf == leaf {
                (a, b)
            } else if b.leaf == leaf {
                (b, a)
            } else {
                return Err(SpatialError::corrupt_pairs(format!(
                    "pair {p} is in the thread of node {leaf} but does not reference it"
                )));
            };

            if own.prev != prev {
                return Err(SpatialError::corrupt_pairs(format!(
                    "pair {p} has a stale back link"
                )));
            }
            if self.leaf(other.leaf).is_none() {
                return Err(SpatialError::corrupt_pairs(format!(
                    "pair {p} references non-leaf node {}",
                    other.leaf
                )));
            }

            prev = Some(p);
            pair = own.next;
        }
        Ok(())
    }
}
