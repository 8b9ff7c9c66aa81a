//! Red-black tree with per-node multiplicity and weighted subtree sums.
//!
//! Each node stores, for every configured exponent, the sum of
//! `weight_i(key) * multiplicity` over its subtree. The invariant
//! `agg(n) = own(n) + agg(left) + agg(right)` is re-established after every
//! link, unlink, rotation and multiplicity change by recomputing ("pulling")
//! each affected node bottom-up. Recoloring never touches aggregates.
//!
//! Two semantics share the same code path:
//! - [`Semantics::Multiset`]: every insertion creates its own node. Equal keys
//!   are placed to the right of existing ones.
//! - [`Semantics::Map`]: one node per distinct key. Inserting an existing key
//!   bumps its multiplicity in place.

use crate::error::TreeError;
use crate::store::{Color, CompactStore, NodeId, NodeStore};
use crate::weight::{RankVector, TreeKey, WeightSet};
use std::marker::PhantomData;

/// How repeated keys are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    Multiset,
    Map,
}

/// Reference to a live node.
///
/// A handle is invalidated when its node is structurally removed. Using it
/// afterwards yields [`TreeError::StaleHandle`] rather than touching
/// whatever node now occupies the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u32,
}

/// Augmented order-statistics tree.
#[derive(Debug, Clone)]
pub struct AggregateTree<K: TreeKey, S: NodeStore<K> = CompactStore<K>> {
    store: S,
    weights: WeightSet,
    root: S::Id,
    semantics: Semantics,
    _key: PhantomData<K>,
}

impl<K: TreeKey, S: NodeStore<K>> AggregateTree<K, S> {
    pub fn new(semantics: Semantics, weights: WeightSet) -> Self {
        let store = S::new(weights.width());
        Self::with_store(semantics, weights, store)
    }

    /// Build on a caller-provided empty store (e.g. one with a node limit).
    pub fn with_store(semantics: Semantics, weights: WeightSet, store: S) -> Self {
        Self {
            store,
            weights,
            root: S::Id::NIL,
            semantics,
            _key: PhantomData,
        }
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    /// Number of weight functions.
    pub fn width(&self) -> usize {
        self.weights.width()
    }

    /// Total multiplicity over all keys.
    pub fn len(&self) -> u64 {
        self.store.node(self.root).count
    }

    pub fn is_empty(&self) -> bool {
        self.root == S::Id::NIL
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.store.live()
    }

    /// Output buffer sized for this tree.
    pub fn rank_vector(&self) -> RankVector {
        RankVector::new(self.width())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Exact lookup. Under multiset semantics returns the leftmost node with `key`.
    pub fn find(&self, key: K) -> Option<Handle> {
        let mut x = self.root;
        let mut found = S::Id::NIL;
        while x != S::Id::NIL {
            let n = self.store.node(x);
            if key < n.key {
                x = n.left;
            } else if n.key < key {
                x = n.right;
            } else {
                found = x;
                if self.semantics == Semantics::Map {
                    break;
                }
                x = n.left;
            }
        }
        (found != S::Id::NIL).then(|| self.handle(found))
    }

    /// First node whose key is not less than `key`.
    pub fn lower_bound(&self, key: K) -> Option<Handle> {
        let mut x = self.root;
        let mut best = S::Id::NIL;
        while x != S::Id::NIL {
            let n = self.store.node(x);
            if n.key < key {
                x = n.right;
            } else {
                best = x;
                x = n.left;
            }
        }
        (best != S::Id::NIL).then(|| self.handle(best))
    }

    pub fn key(&self, handle: Handle) -> Result<K, TreeError> {
        let id = self.resolve(handle, "key")?;
        Ok(self.store.node(id).key)
    }

    pub fn multiplicity(&self, handle: Handle) -> Result<u64, TreeError> {
        let id = self.resolve(handle, "multiplicity")?;
        Ok(self.store.node(id).multiplicity)
    }

    /// Weighted rank of the handle's key: for every exponent, the sum of
    /// `weight_i(k) * count(k)` over all keys `k <= key`, plus the plain count.
    pub fn weighted_rank(&self, handle: Handle, out: &mut RankVector) -> Result<(), TreeError> {
        let id = self.resolve(handle, "weighted_rank")?;
        let key = self.store.node(id).key;
        self.rank_of_key(key, out);
        Ok(())
    }

    /// Same as [`weighted_rank`](Self::weighted_rank) for an arbitrary key,
    /// present or not. Single root-to-leaf descent.
    ///
    /// A key at or above the maximum gets the stored totals verbatim, so its
    /// rank equals [`norm`](Self::norm) bit for bit. The descent sums in a
    /// different order than the aggregates and would otherwise round past it.
    pub fn rank_of_key(&self, key: K, out: &mut RankVector) {
        let width = self.width();
        out.reset(width);
        let mut x = self.root;
        while x != S::Id::NIL {
            let n = self.store.node(x);
            if key < n.key {
                x = n.left;
                continue;
            }
            let left = self.store.node(n.left);
            out.count += left.count + n.multiplicity;
            let left_agg = self.store.aggregate(n.left);
            let base = n.key.weight_base();
            for (slot, acc) in out.weighted.iter_mut().enumerate() {
                *acc += left_agg[slot] + self.weights.contribution(slot, base, n.multiplicity);
            }
            x = n.right;
        }
        let root = self.store.node(self.root);
        if out.count == root.count {
            out.weighted.copy_from_slice(self.store.aggregate(self.root));
        }
    }

    /// Totals over the whole tree. All zeros when empty.
    pub fn norm(&self, out: &mut RankVector) {
        out.reset(self.width());
        out.count = self.store.node(self.root).count;
        out.weighted.copy_from_slice(self.store.aggregate(self.root));
    }

    /// In-order `(key, multiplicity)` pairs.
    pub fn iter(&self) -> Iter<'_, K, S> {
        let mut it = Iter {
            tree: self,
            stack: Vec::new(),
        };
        it.push_left(self.root);
        it
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Add one unit of `key`.
    pub fn insert(&mut self, key: K) -> Result<Handle, TreeError> {
        self.insert_count(key, 1)
    }

    /// Add `count` units of `key`.
    pub fn insert_count(&mut self, key: K, count: u64) -> Result<Handle, TreeError> {
        if count == 0 {
            return Err(TreeError::ZeroMultiplicity {
                operation: "insert",
            });
        }

        let mut parent = S::Id::NIL;
        let mut x = self.root;
        let mut go_left = false;
        while x != S::Id::NIL {
            parent = x;
            let n = self.store.node(x);
            if key < n.key {
                go_left = true;
                x = n.left;
            } else if self.semantics == Semantics::Map && n.key == key {
                self.store.node_mut(x).multiplicity += count;
                self.pull_to_root(x);
                return Ok(self.handle(x));
            } else {
                go_left = false;
                x = n.right;
            }
        }

        let z = self.store.allocate(key, count)?;
        self.store.node_mut(z).parent = parent;
        if parent == S::Id::NIL {
            self.root = z;
        } else if go_left {
            self.store.node_mut(parent).left = z;
        } else {
            self.store.node_mut(parent).right = z;
        }
        self.pull_to_root(z);
        self.insert_fixup(z);
        Ok(self.handle(z))
    }

    /// Remove one unit through `handle`. The node is unlinked once its
    /// multiplicity reaches zero, which invalidates the handle.
    pub fn erase(&mut self, handle: Handle) -> Result<(), TreeError> {
        let id = self.resolve(handle, "erase")?;
        let mult = self.store.node(id).multiplicity;
        if mult > 1 {
            self.store.node_mut(id).multiplicity = mult - 1;
            self.pull_to_root(id);
        } else {
            self.delete_node(id);
        }
        Ok(())
    }

    /// Remove one unit of `key`.
    pub fn erase_key(&mut self, key: K) -> Result<(), TreeError> {
        let handle = self.find(key).ok_or_else(|| TreeError::KeyNotFound {
            key: key.to_string(),
            operation: "erase",
        })?;
        self.erase(handle)
    }

    /// Overwrite a node's multiplicity. Zero unlinks the node.
    pub fn set_multiplicity(&mut self, handle: Handle, count: u64) -> Result<(), TreeError> {
        let id = self.resolve(handle, "set_multiplicity")?;
        if count == 0 {
            self.delete_node(id);
        } else {
            self.store.node_mut(id).multiplicity = count;
            self.pull_to_root(id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn handle(&self, id: S::Id) -> Handle {
        Handle {
            index: id.index(),
            generation: self.store.node(id).generation,
        }
    }

    fn resolve(&self, handle: Handle, operation: &'static str) -> Result<S::Id, TreeError> {
        let stale = TreeError::StaleHandle {
            index: handle.index,
            operation,
        };
        let id = self.store.id_at(handle.index).ok_or_else(|| stale.clone())?;
        let node = self.store.node(id);
        if !node.live || node.generation != handle.generation {
            return Err(stale);
        }
        Ok(id)
    }

    #[inline]
    fn left(&self, x: S::Id) -> S::Id {
        self.store.node(x).left
    }

    #[inline]
    fn right(&self, x: S::Id) -> S::Id {
        self.store.node(x).right
    }

    #[inline]
    fn parent(&self, x: S::Id) -> S::Id {
        self.store.node(x).parent
    }

    #[inline]
    fn color(&self, x: S::Id) -> Color {
        self.store.node(x).color
    }

    #[inline]
    fn set_color(&mut self, x: S::Id, color: Color) {
        if x != S::Id::NIL {
            self.store.node_mut(x).color = color;
        }
    }

    fn pull_to_root(&mut self, mut x: S::Id) {
        while x != S::Id::NIL {
            self.store.pull(x, &self.weights);
            x = self.parent(x);
        }
    }

    /// Replace the link to `u` in its parent with `v`.
    fn transplant(&mut self, u: S::Id, v: S::Id) {
        let up = self.parent(u);
        if up == S::Id::NIL {
            self.root = v;
        } else if u == self.left(up) {
            self.store.node_mut(up).left = v;
        } else {
            self.store.node_mut(up).right = v;
        }
        self.store.node_mut(v).parent = up;
    }

    fn rotate_left(&mut self, x: S::Id) {
        let y = self.right(x);
        let yl = self.left(y);
        self.store.node_mut(x).right = yl;
        if yl != S::Id::NIL {
            self.store.node_mut(yl).parent = x;
        }
        self.transplant(x, y);
        self.store.node_mut(y).left = x;
        self.store.node_mut(x).parent = y;
        self.store.pull(x, &self.weights);
        self.store.pull(y, &self.weights);
    }

    fn rotate_right(&mut self, x: S::Id) {
        let y = self.left(x);
        let yr = self.right(y);
        self.store.node_mut(x).left = yr;
        if yr != S::Id::NIL {
            self.store.node_mut(yr).parent = x;
        }
        self.transplant(x, y);
        self.store.node_mut(y).right = x;
        self.store.node_mut(x).parent = y;
        self.store.pull(x, &self.weights);
        self.store.pull(y, &self.weights);
    }

    fn insert_fixup(&mut self, mut z: S::Id) {
        while self.color(self.parent(z)) == Color::Red {
            let p = self.parent(z);
            let g = self.parent(p);
            if p == self.left(g) {
                let uncle = self.right(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.right(p) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.left(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.left(p) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    fn minimum(&self, mut x: S::Id) -> S::Id {
        while self.left(x) != S::Id::NIL {
            x = self.left(x);
        }
        x
    }

    fn delete_node(&mut self, z: S::Id) {
        let mut removed_color = self.color(z);
        let x;
        let x_parent;

        if self.left(z) == S::Id::NIL {
            x = self.right(z);
            x_parent = self.parent(z);
            self.transplant(z, x);
        } else if self.right(z) == S::Id::NIL {
            x = self.left(z);
            x_parent = self.parent(z);
            self.transplant(z, x);
        } else {
            let y = self.minimum(self.right(z));
            removed_color = self.color(y);
            x = self.right(y);
            if self.parent(y) == z {
                x_parent = y;
                self.store.node_mut(x).parent = y;
            } else {
                x_parent = self.parent(y);
                self.transplant(y, x);
                let zr = self.right(z);
                self.store.node_mut(y).right = zr;
                self.store.node_mut(zr).parent = y;
            }
            self.transplant(z, y);
            let zl = self.left(z);
            self.store.node_mut(y).left = zl;
            self.store.node_mut(zl).parent = y;
            let zc = self.color(z);
            self.store.node_mut(y).color = zc;
        }

        self.pull_to_root(x_parent);
        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }
        self.store.release(z);
    }

    fn delete_fixup(&mut self, mut x: S::Id, mut xp: S::Id) {
        while x != self.root && self.color(x) == Color::Black {
            if x == self.left(xp) {
                let mut w = self.right(xp);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(xp, Color::Red);
                    self.rotate_left(xp);
                    w = self.right(xp);
                }
                if self.color(self.left(w)) == Color::Black
                    && self.color(self.right(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = xp;
                    xp = self.parent(x);
                } else {
                    if self.color(self.right(w)) == Color::Black {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(xp);
                    }
                    let pc = self.color(xp);
                    self.set_color(w, pc);
                    self.set_color(xp, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.rotate_left(xp);
                    x = self.root;
                    xp = S::Id::NIL;
                }
            } else {
                let mut w = self.left(xp);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(xp, Color::Red);
                    self.rotate_right(xp);
                    w = self.left(xp);
                }
                if self.color(self.right(w)) == Color::Black
                    && self.color(self.left(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = xp;
                    xp = self.parent(x);
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(xp);
                    }
                    let pc = self.color(xp);
                    self.set_color(w, pc);
                    self.set_color(xp, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.rotate_right(xp);
                    x = self.root;
                    xp = S::Id::NIL;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Full O(n) structural check: red-black rules, parent links, key order,
    /// subtree counts and aggregates recomputed independently. Aggregates must
    /// match bit for bit.
    pub fn check_invariants(&self) -> Result<(), String> {
        let nil = S::Id::NIL;
        let sentinel = self.store.node(nil);
        if sentinel.count != 0 || sentinel.color != Color::Black {
            return Err("sentinel was modified".into());
        }
        if self.store.aggregate(nil).iter().any(|&x| x != 0.0) {
            return Err("sentinel aggregate was modified".into());
        }
        if self.root != nil {
            if self.parent(self.root) != nil {
                return Err("root has a parent".into());
            }
            if self.color(self.root) != Color::Black {
                return Err("root is red".into());
            }
        }
        let summary = self.check_subtree(self.root, None, None)?;
        if summary.nodes != self.store.live() {
            return Err(format!(
                "{} nodes reachable but store reports {} live",
                summary.nodes,
                self.store.live()
            ));
        }
        Ok(())
    }

    fn check_subtree(&self, x: S::Id, lo: Option<K>, hi: Option<K>) -> Result<Subtree, String> {
        let width = self.width();
        if x == S::Id::NIL {
            return Ok(Subtree {
                black_height: 1,
                count: 0,
                nodes: 0,
                sums: vec![0.0; width],
            });
        }
        let n = self.store.node(x);
        if !n.live {
            return Err(format!("released node {:?} is still linked", x));
        }
        if n.multiplicity == 0 {
            return Err(format!("node {:?} has zero multiplicity", x));
        }
        if lo.is_some_and(|lo| n.key < lo) || hi.is_some_and(|hi| n.key > hi) {
            return Err(format!("key {} violates search order", n.key));
        }
        for child in [n.left, n.right] {
            if child != S::Id::NIL && self.parent(child) != x {
                return Err(format!("child {:?} does not point back to {:?}", child, x));
            }
        }
        if n.color == Color::Red
            && (self.color(n.left) == Color::Red || self.color(n.right) == Color::Red)
        {
            return Err(format!("red node {} has a red child", n.key));
        }

        let left = self.check_subtree(n.left, lo, Some(n.key))?;
        let right = self.check_subtree(n.right, Some(n.key), hi)?;
        if left.black_height != right.black_height {
            return Err(format!("black height mismatch under key {}", n.key));
        }

        let count = n.multiplicity + left.count + right.count;
        if count != n.count {
            return Err(format!(
                "count of key {} is {} but subtree holds {}",
                n.key, n.count, count
            ));
        }
        let base = n.key.weight_base();
        let mut sums = Vec::with_capacity(width);
        for slot in 0..width {
            let expected = self.weights.contribution(slot, base, n.multiplicity)
                + left.sums[slot]
                + right.sums[slot];
            let stored = self.store.aggregate(x)[slot];
            if stored != expected {
                return Err(format!(
                    "aggregate {} of key {} is {} but subtree sums to {}",
                    slot, n.key, stored, expected
                ));
            }
            sums.push(expected);
        }

        Ok(Subtree {
            black_height: left.black_height + usize::from(n.color == Color::Black),
            count,
            nodes: left.nodes + right.nodes + 1,
            sums,
        })
    }
}

struct Subtree {
    black_height: usize,
    count: u64,
    nodes: usize,
    sums: Vec<f64>,
}

/// In-order iterator over `(key, multiplicity)`.
pub struct Iter<'a, K: TreeKey, S: NodeStore<K>> {
    tree: &'a AggregateTree<K, S>,
    stack: Vec<S::Id>,
}

impl<K: TreeKey, S: NodeStore<K>> Iter<'_, K, S> {
    fn push_left(&mut self, mut x: S::Id) {
        while x != S::Id::NIL {
            self.stack.push(x);
            x = self.tree.left(x);
        }
    }
}

impl<K: TreeKey, S: NodeStore<K>> Iterator for Iter<'_, K, S> {
    type Item = (K, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let x = self.stack.pop()?;
        let n = self.tree.store.node(x);
        let item = (n.key, n.multiplicity);
        let right = n.right;
        self.push_left(right);
        Some(item)
    }
}
