//! Caller-owned edge records.
//!
//! The store is the single source of truth for edge identity. Everything
//! else (the heap, the processor) refers to an edge by its `u32` id.

use crate::error::HeapError;
use crate::heap::HeapSlots;
use std::collections::HashMap;

/// Offset value of an edge that is not in the heap.
pub const UNTRACKED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRecord {
    pub source: u32,
    pub target: u32,
    /// Timestamp of the last transaction on this edge.
    pub timestamp: u32,
    /// Position of this edge's id in the heap, or [`UNTRACKED`].
    pub offset: u32,
    /// Set once the edge has been activated at least once.
    pub seen: bool,
}

impl EdgeRecord {
    fn new(source: u32, target: u32) -> Self {
        Self {
            source,
            target,
            timestamp: 0,
            offset: UNTRACKED,
            seen: false,
        }
    }

    /// True while the edge is in the eviction heap.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.offset != UNTRACKED
    }
}

/// Append-only table of edges keyed by `(source, target)`.
#[derive(Debug, Default)]
pub struct EdgeStore {
    edges: Vec<EdgeRecord>,
    index: HashMap<(u32, u32), u32>,
    frozen: bool,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a fixed link table. Pairs not in the table
    /// are rejected by [`locate_or_insert`](Self::locate_or_insert).
    /// Duplicate pairs are collapsed.
    pub fn preload<I>(pairs: I) -> Result<Self, HeapError>
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut store = Self::new();
        for (source, target) in pairs {
            store.locate_or_insert(source, target)?;
        }
        store.frozen = true;
        Ok(store)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn lookup(&self, source: u32, target: u32) -> Option<u32> {
        self.index.get(&(source, target)).copied()
    }

    /// Id of the `(source, target)` edge, appending a fresh record if the
    /// store is not frozen.
    pub fn locate_or_insert(&mut self, source: u32, target: u32) -> Result<u32, HeapError> {
        if let Some(id) = self.lookup(source, target) {
            return Ok(id);
        }
        if self.frozen {
            return Err(HeapError::UnknownEdge {
                src: source,
                dst: target,
            });
        }
        // UNTRACKED doubles as the largest id, so it is never handed out.
        let id = u32::try_from(self.edges.len())
            .ok()
            .filter(|&id| id != UNTRACKED)
            .ok_or(HeapError::CapacityExhausted {
                limit: u64::from(UNTRACKED),
            })?;
        self.edges.push(EdgeRecord::new(source, target));
        self.index.insert((source, target), id);
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: u32) -> &EdgeRecord {
        &self.edges[id as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: u32) -> &mut EdgeRecord {
        &mut self.edges[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.iter()
    }

    /// Number of edges currently in the heap.
    pub fn active_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_active()).count()
    }
}

impl HeapSlots for EdgeStore {
    #[inline]
    fn timestamp(&self, id: u32) -> u32 {
        self.edges[id as usize].timestamp
    }

    #[inline]
    fn offset(&self, id: u32) -> u32 {
        self.edges[id as usize].offset
    }

    #[inline]
    fn set_offset(&mut self, id: u32, offset: u32) {
        self.edges[id as usize].offset = offset;
    }
}
