//! Binary min-heap of edge ids ordered by edge timestamp.
//!
//! The heap array holds ids only. Each tracked id's position is written back
//! into the caller's store (`offset`), which gives O(1) lookup for removal
//! and repositioning of an arbitrary edge. Invariants, for every tracked id:
//! - `heap[offset(id)] == id`
//! - `timestamp(heap[i]) <= timestamp(heap[2i + 1])` and likewise for `2i + 2`
//!
//! The store is passed into every operation rather than owned, so the heap
//! never holds references into it.

use crate::buffer::{SlotBuffer, MAX_ENTRIES};
use crate::edges::UNTRACKED;
use crate::error::HeapError;

/// Access to the timestamp and heap offset of each id.
pub trait HeapSlots {
    fn timestamp(&self, id: u32) -> u32;

    fn offset(&self, id: u32) -> u32;

    fn set_offset(&mut self, id: u32, offset: u32);
}

#[derive(Debug, Clone, Default)]
pub struct EvictionHeap {
    slots: SlotBuffer,
}

impl EvictionHeap {
    /// Heap growing by [`DEFAULT_CHUNK`](crate::buffer::DEFAULT_CHUNK) entries per step.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heap growing by `chunk` entries per step, holding at most `limit`.
    pub fn with_growth(chunk: usize, limit: usize) -> Self {
        Self {
            slots: SlotBuffer::new(chunk, limit),
        }
    }

    /// Heap growing by `chunk` entries per step, up to the full 32-bit limit.
    pub fn with_chunk(chunk: usize) -> Self {
        Self::with_growth(chunk, MAX_ENTRIES)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of times the backing storage has grown.
    pub fn grows(&self) -> u64 {
        self.slots.grows()
    }

    /// Id with the smallest timestamp, without removing it.
    #[inline]
    pub fn peek_min(&self) -> Option<u32> {
        self.slots.get(0)
    }

    /// True if `id` is currently in the heap.
    pub fn contains<S: HeapSlots>(&self, store: &S, id: u32) -> bool {
        let off = store.offset(id);
        off != UNTRACKED && self.slots.get(off as usize) == Some(id)
    }

    /// Insert `id` keyed by its current timestamp.
    pub fn push<S: HeapSlots>(&mut self, store: &mut S, id: u32) -> Result<(), HeapError> {
        if self.contains(store, id) {
            return Err(HeapError::AlreadyTracked { id });
        }
        let pos = self.slots.len();
        self.slots.push(id)?;
        store.set_offset(id, pos as u32);
        self.sift_up(store, pos);
        Ok(())
    }

    /// Remove and return the id with the smallest timestamp.
    pub fn pop_min<S: HeapSlots>(&mut self, store: &mut S) -> Result<u32, HeapError> {
        let top = self.slots.get(0).ok_or(HeapError::Empty)?;
        self.take_at(store, 0);
        Ok(top)
    }

    /// Remove an arbitrary tracked id.
    pub fn remove<S: HeapSlots>(&mut self, store: &mut S, id: u32) -> Result<(), HeapError> {
        if !self.contains(store, id) {
            return Err(HeapError::NotTracked { id });
        }
        let pos = store.offset(id) as usize;
        self.take_at(store, pos);
        Ok(())
    }

    /// Restore heap order after `id`'s timestamp was increased in place.
    /// Only moves the id towards the leaves.
    pub fn sift_down_for<S: HeapSlots>(&mut self, store: &mut S, id: u32) -> Result<(), HeapError> {
        if !self.contains(store, id) {
            return Err(HeapError::NotTracked { id });
        }
        let pos = store.offset(id) as usize;
        self.sift_down(store, pos);
        Ok(())
    }

    fn take_at<S: HeapSlots>(&mut self, store: &mut S, pos: usize) {
        let removed = self.slots.at(pos);
        store.set_offset(removed, UNTRACKED);
        let Some(last) = self.slots.pop() else {
            return;
        };
        if pos == self.slots.len() {
            return;
        }
        self.slots.set(pos, last);
        store.set_offset(last, pos as u32);
        if pos > 0 && store.timestamp(last) < store.timestamp(self.slots.at((pos - 1) / 2)) {
            self.sift_up(store, pos);
        } else {
            self.sift_down(store, pos);
        }
    }

    fn sift_up<S: HeapSlots>(&mut self, store: &mut S, mut pos: usize) {
        let id = self.slots.at(pos);
        let ts = store.timestamp(id);
        while pos > 0 {
            let parent = (pos - 1) / 2;
            let pid = self.slots.at(parent);
            if store.timestamp(pid) <= ts {
                break;
            }
            self.slots.set(pos, pid);
            store.set_offset(pid, pos as u32);
            pos = parent;
        }
        self.slots.set(pos, id);
        store.set_offset(id, pos as u32);
    }

    fn sift_down<S: HeapSlots>(&mut self, store: &mut S, mut pos: usize) {
        let len = self.slots.len();
        let id = self.slots.at(pos);
        let ts = store.timestamp(id);
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len
                && store.timestamp(self.slots.at(right)) < store.timestamp(self.slots.at(left))
            {
                child = right;
            }
            let cid = self.slots.at(child);
            if ts <= store.timestamp(cid) {
                break;
            }
            self.slots.set(pos, cid);
            store.set_offset(cid, pos as u32);
            pos = child;
        }
        self.slots.set(pos, id);
        store.set_offset(id, pos as u32);
    }

    /// Ids in heap array order.
    pub fn ids(&self) -> &[u32] {
        self.slots.as_slice()
    }

    /// O(n) check of heap order and offset back-references.
    pub fn check_invariants<S: HeapSlots>(&self, store: &S) -> Result<(), String> {
        let ids = self.slots.as_slice();
        for (pos, &id) in ids.iter().enumerate() {
            if store.offset(id) as usize != pos {
                return Err(format!(
                    "id {} sits at {} but its offset says {}",
                    id,
                    pos,
                    store.offset(id)
                ));
            }
            if pos > 0 {
                let parent = ids[(pos - 1) / 2];
                if store.timestamp(parent) > store.timestamp(id) {
                    return Err(format!(
                        "id {} (ts {}) is below id {} (ts {})",
                        id,
                        store.timestamp(id),
                        parent,
                        store.timestamp(parent)
                    ));
                }
            }
        }
        Ok(())
    }
}
