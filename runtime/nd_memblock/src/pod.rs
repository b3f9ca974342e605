//! Chunked bump allocator for variable-length payloads.
//!
//! Strings and variable-length dimensions store their elements out of line.
//! Every view that references such a payload holds the pod block, so chunks
//! are never moved or individually freed: allocation only bumps, and
//! [`PodArena::reset`] drops everything at once for scratch reuse.

use std::ptr::NonNull;

use crate::storage::RawStorage;
use crate::AllocError;

const MIN_CHUNK_SIZE: usize = 256;
const MAX_CHUNK_SIZE: usize = 1 << 20;
const CHUNK_ALIGN: usize = 16;

pub(crate) struct PodArena {
    chunks: Vec<RawStorage>,
    /// Bytes consumed in the last chunk.
    used: usize,
    next_chunk_size: usize,
    bytes_in_use: usize,
}

impl PodArena {
    pub(crate) fn new(initial_capacity: usize) -> Result<Self, AllocError> {
        let mut arena = Self {
            chunks: Vec::new(),
            used: 0,
            next_chunk_size: initial_capacity.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE),
            bytes_in_use: 0,
        };
        if initial_capacity > 0 {
            arena.push_chunk(initial_capacity, CHUNK_ALIGN)?;
        }
        Ok(arena)
    }

    pub(crate) fn allocate(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return Err(AllocError::InvalidLayout { size, align });
        }
        if let Some(ptr) = self.bump(size, align) {
            return Ok(ptr);
        }
        self.push_chunk(size, align)?;
        self.bump(size, align)
            .ok_or(AllocError::OutOfMemory { size, align })
    }

    pub(crate) fn reset(&mut self) {
        // Keep the largest chunk; an oversize request can follow a smaller one.
        if let Some(largest) = (0..self.chunks.len()).max_by_key(|&i| self.chunks[i].len()) {
            let keep = self.chunks.swap_remove(largest);
            self.chunks.clear();
            self.chunks.push(keep);
        }
        self.used = 0;
        self.bytes_in_use = 0;
    }

    pub(crate) fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let chunk = self.chunks.last()?;
        let cursor = chunk.as_ptr().wrapping_add(self.used);
        let start = self.used.checked_add(cursor.align_offset(align))?;
        let end = start.checked_add(size)?;
        if end > chunk.len() {
            return None;
        }
        self.used = end;
        self.bytes_in_use += size;
        // SAFETY: `start <= chunk.len()`, so the pointer stays inside the chunk.
        Some(unsafe { chunk.non_null().add(start) })
    }

    fn push_chunk(&mut self, size: usize, align: usize) -> Result<(), AllocError> {
        let capacity = self.next_chunk_size.max(size.saturating_add(align));
        let chunk = RawStorage::zeroed(capacity, align.max(CHUNK_ALIGN))?;
        tracing::trace!(capacity, chunks = self.chunks.len() + 1, "pod arena grew");
        self.chunks.push(chunk);
        self.used = 0;
        self.next_chunk_size = (self.next_chunk_size * 2).min(MAX_CHUNK_SIZE);
        Ok(())
    }
}
