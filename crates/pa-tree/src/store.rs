//! Node storage for the aggregate tree.
//!
//! Nodes are addressed by integer ids, never by reference, so growing the
//! backing storage cannot invalidate links between nodes. Id 0 is the NIL
//! sentinel: always black, count zero, aggregates zero. The tree writes only
//! its `parent` field (during deletion), never its count or aggregates.
//!
//! Two stores are provided:
//! - [`CompactStore`]: 32-bit ids into one node vector plus a flat aggregate
//!   vector with stride M. Dense and cache friendly.
//! - [`BoxedStore`]: word-sized ids, one heap allocation per node with its
//!   own aggregate slice.
//!
//! Both recycle released slots through a free list. Every release bumps the
//! slot's generation so handles taken before the release are detected.

use crate::error::TreeError;
use crate::weight::{TreeKey, WeightSet};
use std::fmt::Debug;

/// Integer node address.
pub trait NodeId: Copy + Eq + Debug {
    const NIL: Self;

    fn index(self) -> usize;

    fn from_index(index: usize) -> Option<Self>;
}

impl NodeId for u32 {
    const NIL: Self = 0;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    #[inline]
    fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok()
    }
}

impl NodeId for usize {
    const NIL: Self = 0;

    #[inline]
    fn index(self) -> usize {
        self
    }

    #[inline]
    fn from_index(index: usize) -> Option<Self> {
        Some(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

/// Structural part of a tree node. Aggregates are kept by the store.
#[derive(Debug, Clone)]
pub struct Node<K, I> {
    pub key: K,
    /// Own multiplicity, at least 1 while the node is live.
    pub multiplicity: u64,
    /// Multiplicity sum over the subtree rooted here.
    pub count: u64,
    pub left: I,
    pub right: I,
    pub parent: I,
    pub color: Color,
    pub generation: u32,
    pub live: bool,
}

impl<K: TreeKey, I: NodeId> Node<K, I> {
    fn sentinel() -> Self {
        Self {
            key: K::default(),
            multiplicity: 0,
            count: 0,
            left: I::NIL,
            right: I::NIL,
            parent: I::NIL,
            color: Color::Black,
            generation: 0,
            live: false,
        }
    }

    fn reinit(&mut self, key: K, multiplicity: u64) {
        self.key = key;
        self.multiplicity = multiplicity;
        self.count = multiplicity;
        self.left = I::NIL;
        self.right = I::NIL;
        self.parent = I::NIL;
        self.color = Color::Red;
        self.live = true;
    }
}

/// Backing storage for tree nodes and their aggregates.
pub trait NodeStore<K: TreeKey> {
    type Id: NodeId;

    /// Empty store for `width` aggregate slots per node.
    fn new(width: usize) -> Self
    where
        Self: Sized;

    fn width(&self) -> usize;

    /// Allocate a red, unlinked node with zeroed aggregates.
    fn allocate(&mut self, key: K, multiplicity: u64) -> Result<Self::Id, TreeError>;

    /// Return a node to the free list and bump its generation.
    fn release(&mut self, id: Self::Id);

    fn node(&self, id: Self::Id) -> &Node<K, Self::Id>;

    fn node_mut(&mut self, id: Self::Id) -> &mut Node<K, Self::Id>;

    fn aggregate(&self, id: Self::Id) -> &[f64];

    /// Recompute `count` and aggregates of `id` from its own contribution and
    /// its children, in the order own + left + right.
    fn pull(&mut self, id: Self::Id, weights: &WeightSet);

    /// Id for a slot index, if the index addresses a non-sentinel slot.
    fn id_at(&self, index: usize) -> Option<Self::Id>;

    /// Number of live nodes.
    fn live(&self) -> usize;
}

// ============================================================================
// Compact store
// ============================================================================

/// Arena of nodes addressed by `u32` with a flat aggregate vector.
#[derive(Debug, Clone)]
pub struct CompactStore<K> {
    nodes: Vec<Node<K, u32>>,
    aggregates: Vec<f64>,
    width: usize,
    free: Vec<u32>,
    live: usize,
    limit: u32,
}

impl<K: TreeKey> CompactStore<K> {
    /// Store that refuses to hold more than `limit` nodes at once.
    pub fn with_limit(width: usize, limit: u32) -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            aggregates: vec![0.0; width],
            width,
            free: Vec::new(),
            live: 0,
            limit,
        }
    }

    /// Slots ever allocated, including recycled ones and excluding the sentinel.
    pub fn slots(&self) -> usize {
        self.nodes.len() - 1
    }
}

impl<K: TreeKey> NodeStore<K> for CompactStore<K> {
    type Id = u32;

    fn new(width: usize) -> Self {
        Self::with_limit(width, u32::MAX)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn allocate(&mut self, key: K, multiplicity: u64) -> Result<u32, TreeError> {
        if let Some(id) = self.free.pop() {
            let base = id as usize * self.width;
            self.aggregates[base..base + self.width]
                .iter_mut()
                .for_each(|x| *x = 0.0);
            self.nodes[id as usize].reinit(key, multiplicity);
            self.live += 1;
            return Ok(id);
        }

        let exhausted = TreeError::CapacityExhausted {
            limit: u64::from(self.limit),
        };
        if self.slots() >= self.limit as usize {
            return Err(exhausted);
        }
        let id = u32::from_index(self.nodes.len()).ok_or_else(|| exhausted.clone())?;
        self.nodes.try_reserve(1).map_err(|_| exhausted.clone())?;
        self.aggregates
            .try_reserve(self.width)
            .map_err(|_| exhausted)?;

        let mut node = Node::sentinel();
        node.reinit(key, multiplicity);
        self.nodes.push(node);
        self.aggregates.resize(self.aggregates.len() + self.width, 0.0);
        self.live += 1;
        Ok(id)
    }

    fn release(&mut self, id: u32) {
        let node = &mut self.nodes[id as usize];
        node.live = false;
        node.generation = node.generation.wrapping_add(1);
        self.free.push(id);
        self.live -= 1;
    }

    #[inline]
    fn node(&self, id: u32) -> &Node<K, u32> {
        &self.nodes[id as usize]
    }

    #[inline]
    fn node_mut(&mut self, id: u32) -> &mut Node<K, u32> {
        &mut self.nodes[id as usize]
    }

    #[inline]
    fn aggregate(&self, id: u32) -> &[f64] {
        let base = id as usize * self.width;
        &self.aggregates[base..base + self.width]
    }

    fn pull(&mut self, id: u32, weights: &WeightSet) {
        let i = id as usize;
        let (key, mult, l, r) = {
            let n = &self.nodes[i];
            (n.key, n.multiplicity, n.left as usize, n.right as usize)
        };
        self.nodes[i].count = mult + self.nodes[l].count + self.nodes[r].count;

        let w = self.width;
        let base = key.weight_base();
        for slot in 0..w {
            let own = weights.contribution(slot, base, mult);
            self.aggregates[i * w + slot] =
                own + self.aggregates[l * w + slot] + self.aggregates[r * w + slot];
        }
    }

    fn id_at(&self, index: usize) -> Option<u32> {
        if index == 0 || index >= self.nodes.len() {
            return None;
        }
        u32::from_index(index)
    }

    fn live(&self) -> usize {
        self.live
    }
}

// ============================================================================
// Boxed store
// ============================================================================

#[derive(Debug, Clone)]
struct BoxedSlot<K> {
    node: Node<K, usize>,
    aggregate: Box<[f64]>,
}

/// One heap allocation per node, addressed by `usize`.
#[derive(Debug, Clone)]
pub struct BoxedStore<K> {
    slots: Vec<Box<BoxedSlot<K>>>,
    width: usize,
    free: Vec<usize>,
    live: usize,
}

impl<K: TreeKey> NodeStore<K> for BoxedStore<K> {
    type Id = usize;

    fn new(width: usize) -> Self {
        Self {
            slots: vec![Box::new(BoxedSlot {
                node: Node::sentinel(),
                aggregate: vec![0.0; width].into_boxed_slice(),
            })],
            width,
            free: Vec::new(),
            live: 0,
        }
    }

    fn width(&self) -> usize {
        self.width
    }

    fn allocate(&mut self, key: K, multiplicity: u64) -> Result<usize, TreeError> {
        if let Some(id) = self.free.pop() {
            let slot = &mut self.slots[id];
            slot.aggregate.iter_mut().for_each(|x| *x = 0.0);
            slot.node.reinit(key, multiplicity);
            self.live += 1;
            return Ok(id);
        }

        self.slots
            .try_reserve(1)
            .map_err(|_| TreeError::CapacityExhausted {
                limit: self.slots.len() as u64,
            })?;
        let mut node = Node::sentinel();
        node.reinit(key, multiplicity);
        let id = self.slots.len();
        self.slots.push(Box::new(BoxedSlot {
            node,
            aggregate: vec![0.0; self.width].into_boxed_slice(),
        }));
        self.live += 1;
        Ok(id)
    }

    fn release(&mut self, id: usize) {
        let node = &mut self.slots[id].node;
        node.live = false;
        node.generation = node.generation.wrapping_add(1);
        self.free.push(id);
        self.live -= 1;
    }

    #[inline]
    fn node(&self, id: usize) -> &Node<K, usize> {
        &self.slots[id].node
    }

    #[inline]
    fn node_mut(&mut self, id: usize) -> &mut Node<K, usize> {
        &mut self.slots[id].node
    }

    #[inline]
    fn aggregate(&self, id: usize) -> &[f64] {
        &self.slots[id].aggregate
    }

    fn pull(&mut self, id: usize, weights: &WeightSet) {
        let (key, mult, l, r) = {
            let n = &self.slots[id].node;
            (n.key, n.multiplicity, n.left, n.right)
        };
        let count = mult + self.slots[l].node.count + self.slots[r].node.count;
        self.slots[id].node.count = count;

        let base = key.weight_base();
        for slot in 0..self.width {
            let own = weights.contribution(slot, base, mult);
            let sum = own + self.slots[l].aggregate[slot] + self.slots[r].aggregate[slot];
            self.slots[id].aggregate[slot] = sum;
        }
    }

    fn id_at(&self, index: usize) -> Option<usize> {
        (index != 0 && index < self.slots.len()).then_some(index)
    }

    fn live(&self) -> usize {
        self.live
    }
}
