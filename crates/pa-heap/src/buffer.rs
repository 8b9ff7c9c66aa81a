//! Growable `u32` slot buffer.
//!
//! Grows by a fixed chunk of entries at a time with `try_reserve_exact`, so
//! an allocation failure surfaces as an error instead of an abort, and the
//! allocator is free to extend the block in place. Contents are plain ids,
//! so a relocating grow invalidates nothing.

use crate::error::HeapError;

/// Entries added per growth step unless configured otherwise.
pub const DEFAULT_CHUNK: usize = 131_072;

/// Largest entry count representable with 32-bit offsets. `u32::MAX` itself
/// marks an untracked edge.
pub const MAX_ENTRIES: usize = u32::MAX as usize;

#[derive(Debug, Clone)]
pub struct SlotBuffer {
    data: Vec<u32>,
    chunk: usize,
    limit: usize,
    grows: u64,
}

impl Default for SlotBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK, MAX_ENTRIES)
    }
}

impl SlotBuffer {
    /// `chunk` is clamped to at least 1; `limit` to at most [`MAX_ENTRIES`].
    pub fn new(chunk: usize, limit: usize) -> Self {
        Self {
            data: Vec::new(),
            chunk: chunk.max(1),
            limit: limit.min(MAX_ENTRIES),
            grows: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of growth steps taken so far.
    pub fn grows(&self) -> u64 {
        self.grows
    }

    pub fn push(&mut self, value: u32) -> Result<(), HeapError> {
        let len = self.data.len();
        if len >= self.limit {
            return Err(HeapError::CapacityExhausted {
                limit: self.limit as u64,
            });
        }
        if len == self.data.capacity() {
            let extra = self.chunk.min(self.limit - len);
            self.data
                .try_reserve_exact(extra)
                .map_err(|_| HeapError::AllocationFailed {
                    requested: (len + extra) as u64,
                })?;
            self.grows += 1;
        }
        self.data.push(value);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<u32> {
        self.data.pop()
    }

    #[inline]
    pub fn get(&self, pos: usize) -> Option<u32> {
        self.data.get(pos).copied()
    }

    #[inline]
    pub(crate) fn at(&self, pos: usize) -> u32 {
        self.data[pos]
    }

    #[inline]
    pub(crate) fn set(&mut self, pos: usize, value: u32) {
        self.data[pos] = value;
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }
}
