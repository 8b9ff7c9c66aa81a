//! Time-indexed eviction heap and the edge store it indexes into.
//!
//! The processor owns both halves. The heap stores `u32` edge ids and writes
//! each id's array position back into the [`EdgeStore`], so any tracked edge
//! can be removed or repositioned in O(log n) without a search.

pub mod buffer;
pub mod edges;
pub mod error;
pub mod heap;

pub use buffer::{SlotBuffer, DEFAULT_CHUNK, MAX_ENTRIES};
pub use edges::{EdgeRecord, EdgeStore, UNTRACKED};
pub use error::HeapError;
pub use heap::{EvictionHeap, HeapSlots};
