//! Object-safe rank index used by the stream processor and the replays.
//!
//! Callers see a degree (or balance) distribution as a bag of positive keys:
//! add one unit, remove one unit, ask for the normalized rank of a present
//! key. The tree variant and node allocator are picked at run time.

use crate::error::TreeError;
use crate::store::{BoxedStore, CompactStore, NodeStore};
use crate::tree::{AggregateTree, Semantics};
use crate::weight::{RankVector, TreeKey, WeightSet};
use clap::ValueEnum;
use pa_common::RankSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tree semantics selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeVariant {
    /// One node per inserted unit
    #[default]
    Multiset,
    /// One node per distinct key with a count
    Map,
}

impl fmt::Display for TreeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeVariant::Multiset => write!(f, "multiset"),
            TreeVariant::Map => write!(f, "map"),
        }
    }
}

impl From<TreeVariant> for Semantics {
    fn from(v: TreeVariant) -> Self {
        match v {
            TreeVariant::Multiset => Semantics::Multiset,
            TreeVariant::Map => Semantics::Map,
        }
    }
}

/// Node allocator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Allocator {
    /// Dense arena with 32-bit node ids
    #[default]
    Compact,
    /// One heap allocation per node
    Boxed,
}

impl fmt::Display for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allocator::Compact => write!(f, "compact"),
            Allocator::Boxed => write!(f, "boxed"),
        }
    }
}

/// Distribution of positive keys with weighted rank queries.
pub trait RankIndex<K: TreeKey> {
    /// Add one unit of `key`. Non-positive keys are rejected.
    fn add(&mut self, key: K) -> Result<(), TreeError>;

    /// Remove one unit of `key`, which must be present.
    fn remove(&mut self, key: K) -> Result<(), TreeError>;

    /// Move one unit from `old` to `new`. Non-positive sides are skipped, so
    /// `replace(0, 1)` is a plain add and `replace(1, 0)` a plain remove.
    fn replace(&mut self, old: K, new: K) -> Result<(), TreeError> {
        if old.is_positive() {
            self.remove(old)?;
        }
        if new.is_positive() {
            self.add(new)?;
        }
        Ok(())
    }

    /// Normalized rank of a present key into `out`: `weighted[i] = R_i / N_i`,
    /// `count` the number of units with key `<= key`, `norm_count` the total.
    fn rank(&mut self, key: K, out: &mut RankSample) -> Result<(), TreeError>;

    /// Number of weight exponents.
    fn width(&self) -> usize;

    /// Total number of units.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node_count(&self) -> usize;

    /// Full O(n) invariant check.
    fn check(&self) -> Result<(), String>;
}

/// [`RankIndex`] over an [`AggregateTree`] with reusable query buffers.
pub struct TreeIndex<K: TreeKey, S: NodeStore<K>> {
    tree: AggregateTree<K, S>,
    rank_buf: RankVector,
    norm_buf: RankVector,
}

impl<K: TreeKey, S: NodeStore<K>> TreeIndex<K, S> {
    pub fn new(semantics: Semantics, weights: WeightSet) -> Self {
        let tree = AggregateTree::new(semantics, weights);
        let rank_buf = tree.rank_vector();
        let norm_buf = tree.rank_vector();
        Self {
            tree,
            rank_buf,
            norm_buf,
        }
    }

    pub fn tree(&self) -> &AggregateTree<K, S> {
        &self.tree
    }
}

impl<K: TreeKey, S: NodeStore<K>> RankIndex<K> for TreeIndex<K, S> {
    fn add(&mut self, key: K) -> Result<(), TreeError> {
        if !key.is_positive() {
            return Err(TreeError::NonPositiveKey {
                key: key.to_string(),
            });
        }
        self.tree.insert(key).map(|_| ())
    }

    fn remove(&mut self, key: K) -> Result<(), TreeError> {
        self.tree.erase_key(key)
    }

    fn rank(&mut self, key: K, out: &mut RankSample) -> Result<(), TreeError> {
        let handle = self.tree.find(key).ok_or_else(|| TreeError::KeyNotFound {
            key: key.to_string(),
            operation: "weighted_rank",
        })?;
        self.tree.weighted_rank(handle, &mut self.rank_buf)?;
        self.tree.norm(&mut self.norm_buf);

        let width = self.tree.width();
        if out.weighted.len() != width {
            out.weighted.resize(width, 0.0);
        }
        for (slot, value) in out.weighted.iter_mut().enumerate() {
            let norm = self.norm_buf.weighted[slot];
            if !norm.is_finite() {
                return Err(TreeError::NormOverflow {
                    key: key.to_string(),
                    exponent: self.tree.weights().exponents()[slot],
                });
            }
            if norm == 0.0 {
                return Err(TreeError::DegenerateNorm {
                    key: key.to_string(),
                });
            }
            // prefix sums below the maximum can still round a hair past the norm
            *value = (self.rank_buf.weighted[slot] / norm).min(1.0);
        }
        out.count = self.rank_buf.count;
        out.norm_count = self.norm_buf.count;
        Ok(())
    }

    fn width(&self) -> usize {
        self.tree.width()
    }

    fn len(&self) -> u64 {
        self.tree.len()
    }

    fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    fn check(&self) -> Result<(), String> {
        self.tree.check_invariants()
    }
}

/// Build a rank index for the selected variant and allocator.
pub fn build_index<K: TreeKey + 'static>(
    variant: TreeVariant,
    allocator: Allocator,
    exponents: &[f64],
) -> Box<dyn RankIndex<K>> {
    let weights = WeightSet::new(exponents.to_vec());
    let semantics = Semantics::from(variant);
    match allocator {
        Allocator::Compact => Box::new(TreeIndex::<K, CompactStore<K>>::new(semantics, weights)),
        Allocator::Boxed => Box::new(TreeIndex::<K, BoxedStore<K>>::new(semantics, weights)),
    }
}
