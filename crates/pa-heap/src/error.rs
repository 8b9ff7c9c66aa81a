//! Heap and edge store errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("pop from an empty eviction heap")]
    Empty,

    #[error("edge {id} is not tracked by the eviction heap")]
    NotTracked { id: u32 },

    #[error("edge {id} is already tracked by the eviction heap")]
    AlreadyTracked { id: u32 },

    #[error("capacity exhausted (limit {limit} entries)")]
    CapacityExhausted { limit: u64 },

    #[error("could not grow backing storage to {requested} entries")]
    AllocationFailed { requested: u64 },

    #[error("edge {src} -> {dst} is not in the preloaded link table")]
    UnknownEdge { src: u32, dst: u32 },
}

impl From<HeapError> for pa_common::Error {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::CapacityExhausted { limit } => pa_common::Error::ResourceExhausted {
                resource: "eviction heap",
                limit,
            },
            HeapError::AllocationFailed { requested } => pa_common::Error::ResourceExhausted {
                resource: "eviction heap memory",
                limit: requested,
            },
            other => pa_common::Error::InconsistentData(other.to_string()),
        }
    }
}
