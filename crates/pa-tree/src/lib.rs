//! Augmented order-statistics tree for weighted rank queries.
//!
//! Keeps a multiset of integer keys (degrees or balances) in a red-black tree
//! whose nodes carry, for each of M weight exponents, the weighted sum over
//! their subtree. That makes the weighted CDF numerator of any key an
//! O(log n + M) descent.
//!
//! - [`AggregateTree`]: the tree itself, generic over key and node store
//! - [`CompactStore`] / [`BoxedStore`]: node allocators
//! - [`RankIndex`] / [`build_index`]: runtime-selected facade used by callers

pub mod error;
pub mod index;
pub mod store;
pub mod tree;
pub mod weight;

pub use error::TreeError;
pub use index::{build_index, Allocator, RankIndex, TreeIndex, TreeVariant};
pub use store::{BoxedStore, CompactStore, NodeId, NodeStore};
pub use tree::{AggregateTree, Handle, Semantics};
pub use weight::{RankVector, TreeKey, WeightSet};
