//! Chunk metadata - one contiguous block owned by the arena
//!
//! Design: Capacity lives in this side record rather than in a header in
//! front of the block, so the whole block is usable and word-aligned.
//! Chunks carry an id that survives in-place growth, which is what snapshots
//! refer to instead of raw addresses.

use core::ptr::NonNull;

use super::raw::RawAlloc;

/// Identity of a chunk within its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub(crate) u64);

/// A block of arena memory
#[derive(Debug)]
pub(crate) struct Chunk {
    start: NonNull<u8>,
    capacity: usize,
    id: ChunkId,
}

impl Chunk {
    /// Acquire a new chunk from the backend
    pub(crate) fn new<A: RawAlloc>(raw: &A, capacity: usize, id: ChunkId) -> Option<Self> {
        debug_assert!(capacity > 0, "empty chunk");
        let start = raw.alloc(capacity)?;
        Some(Self { start, capacity, id })
    }

    /// Resize in place (the block may move)
    ///
    /// Only legal while no allocation points into this chunk. On failure the
    /// chunk is left as it was.
    pub(crate) fn extend<A: RawAlloc>(&mut self, raw: &A, capacity: usize) -> Option<()> {
        debug_assert!(capacity > self.capacity, "extend must enlarge the chunk");
        let start = unsafe { raw.grow(self.start, self.capacity, capacity)? };
        self.start = start;
        self.capacity = capacity;
        Some(())
    }

    /// Return the block to the backend
    pub(crate) fn release<A: RawAlloc>(self, raw: &A) {
        unsafe { raw.free(self.start, self.capacity) }
    }

    #[inline]
    pub(crate) fn start(&self) -> NonNull<u8> {
        self.start
    }

    /// Address at `offset` bytes into the chunk
    ///
    /// `offset` may equal the capacity (one past the end).
    #[inline]
    pub(crate) fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity, "offset outside chunk");
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(offset)) }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn id(&self) -> ChunkId {
        self.id
    }
}
