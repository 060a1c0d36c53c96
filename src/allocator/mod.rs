//! Scratch-pad memory - bump allocation with snapshots
//!
//! Design: Three-layer architecture:
//! 1. Bump allocation inside the current chunk (fast path)
//! 2. Chunk management: extend the current chunk while nothing points into
//!    it, otherwise retire it and start a new one (slow path)
//! 3. Backend memory through [`RawAlloc`] (rare, bulk acquisition)
//!
//! There is no per-allocation header and no way to free a single allocation.
//! Memory comes back through [`Arena::reset`], through rolling back a
//! [`Snapshot`] or [`Checkpoint`], or when the arena is dropped. The arena
//! learns its peak usage while running; a reset after growth coalesces all
//! chunks into one chunk of that size.

mod bump;
mod chunk;
mod raw;
mod snapshot;


pub use bump::{Growth, WORD};
pub use chunk::ChunkId;
pub use raw::{RawAlloc, System, CHUNK_ALIGN};
pub use snapshot::{Checkpoint, Snapshot};

use core::cmp;
use core::mem;
use core::ptr::{self, NonNull};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{ArenaConfig, POISON_BYTE};
use crate::error::{ArenaError, Result};
use crate::logging::{
    error, log_allocation, log_allocation_failure, log_chunk_acquired, log_chunk_released,
    log_coalesce, log_rollback_rejected, warn,
};
use bump::{clamp_align, padding};
use chunk::Chunk;
use snapshot::Position;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an arena, used to reject checkpoints from another arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(u64);

impl ArenaId {
    fn next() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Bump allocator for short-lived, variable-size data
///
/// Single owner, single thread. Pointers returned by the `alloc*` methods
/// stay valid until [`reset`](Self::reset), a rollback that discards them, or
/// drop. Alignment is capped at [`WORD`]; types with a larger alignment get
/// word-aligned memory only.
pub struct Arena<A: RawAlloc = System> {
    raw: A,
    config: ArenaConfig,
    /// Chunk the bump pointer lives in
    current: Option<Chunk>,
    /// Full chunks, oldest first; live allocations may still point into them
    retired: Vec<Chunk>,
    /// Bytes used in `current`
    used: usize,
    /// Bytes handed out over all chunks, padding included
    total: usize,
    /// Highest `total` seen
    peak: usize,
    id: ArenaId,
    generation: u64,
    next_chunk: u64,
    /// Marks of the checkpoints that may still be rolled back, ascending
    marks: Vec<u64>,
    next_mark: u64,
}

impl Arena<System> {
    /// Empty arena on the platform heap; the first allocation acquires a chunk
    pub fn new() -> Self {
        Self::unreserved(System, ArenaConfig::default())
    }

    /// Arena on the platform heap with `reserve` bytes available up front
    pub fn with_capacity(reserve: usize) -> Result<Self> {
        Self::with_config(ArenaConfig::default().with_reserve(reserve))
    }

    pub fn with_config(config: ArenaConfig) -> Result<Self> {
        Self::with_backend(System, config)
    }
}

impl Default for Arena<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAlloc> Arena<A> {
    /// Arena drawing its chunks from `raw`
    ///
    /// Fails with [`ArenaError::InvalidConfig`] when `config` does not pass
    /// [`ArenaConfig::validate`].
    pub fn with_backend(raw: A, config: ArenaConfig) -> Result<Self> {
        config.validate()?;
        let mut arena = Self::unreserved(raw, config);
        arena.reserve(config.reserve)?;
        Ok(arena)
    }

    fn unreserved(raw: A, config: ArenaConfig) -> Self {
        debug_assert!(config.spare > 0, "spare must be positive");
        Self {
            raw,
            config,
            current: None,
            retired: Vec::new(),
            used: 0,
            total: 0,
            peak: 0,
            id: ArenaId::next(),
            generation: 0,
            next_chunk: 0,
            marks: Vec::new(),
            next_mark: 0,
        }
    }

    /// Allocate room for `count` values of `T`, aligned for `T` (capped at [`WORD`])
    ///
    /// The memory is uninitialized. With poisoning enabled every byte reads
    /// [`POISON_BYTE`].
    #[inline]
    pub fn alloc<T>(&mut self, count: usize) -> Result<NonNull<T>> {
        self.alloc_aligned(count, mem::align_of::<T>())
    }

    /// Allocate room for `count` values of `T` with an explicit alignment
    ///
    /// `align` is clamped to `1..=WORD`.
    pub fn alloc_aligned<T>(&mut self, count: usize, align: usize) -> Result<NonNull<T>> {
        let size = match count.checked_mul(mem::size_of::<T>()) {
            Some(size) => size,
            None => {
                return Err(self.overflow(count.saturating_mul(mem::size_of::<T>())));
            }
        };
        Ok(self.alloc_bytes(size, align)?.cast())
    }

    /// Allocate `size` raw bytes
    ///
    /// A zero-sized request returns the start of the current chunk, acquiring
    /// one first if the arena has none. It does not change [`size`](Self::size).
    pub fn alloc_bytes(&mut self, size: usize, align: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return self.alloc_zero_sized();
        }

        let align = clamp_align(align);
        let padding = padding(self.used, align);

        let total = match self
            .total
            .checked_add(padding)
            .and_then(|t| t.checked_add(size))
            .filter(|&t| t <= self.config.max_size)
        {
            Some(total) => total,
            None => return Err(self.overflow(size)),
        };

        // used <= total, so none of the offsets below can overflow.
        let capacity = self.current_capacity();
        let mut offset = self.used + padding;

        if offset + size > capacity {
            let growth = if offset <= capacity {
                // The padding still fits; make room for the rest, anticipating the peak.
                self.plan_growth(offset, cmp::max(self.peak - self.total, size))
            } else {
                // Not even the padding fits. A fresh chunk is always aligned.
                Some(Growth::Replace {
                    capacity: cmp::max(self.peak - self.total, size.saturating_add(self.config.spare)),
                })
            };

            if let Some(growth) = growth {
                self.grow(growth)?;
                if let Growth::Replace { .. } = growth {
                    offset = 0;
                }
            }
        }

        let ptr = match &self.current {
            Some(chunk) => chunk.at(offset),
            None => unreachable!("a chunk was acquired above"),
        };

        self.used = offset + size;
        // Padding counts even when it was left behind in a retired chunk, as a
        // coalesced chunk would need it.
        self.total = total;
        if total > self.peak {
            self.peak = total;
        }

        debug_assert!(self.used <= self.current_capacity());
        debug_assert!(self.used <= self.total);

        if self.config.poison {
            unsafe { ptr::write_bytes(ptr.as_ptr(), POISON_BYTE, size) };
        }

        log_allocation(size, padding, total, ptr.as_ptr());
        Ok(ptr)
    }

    /// Copy `src` into the arena
    pub fn alloc_copy<T: Copy>(&mut self, src: &[T]) -> Result<NonNull<[T]>> {
        let ptr = self.alloc::<T>(src.len())?;
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
        Ok(NonNull::slice_from_raw_parts(ptr, src.len()))
    }

    /// Allocate, aborting the process when that is impossible
    ///
    /// For callers with no way to recover from a failed allocation halfway
    /// through their work.
    pub fn alloc_or_abort<T>(&mut self, count: usize) -> NonNull<T> {
        match self.alloc(count) {
            Ok(ptr) => ptr,
            Err(err) => {
                error!(target: "stored_arena::alloc", error = %err, "unrecoverable arena failure, aborting");
                std::process::abort()
            }
        }
    }

    fn alloc_zero_sized(&mut self) -> Result<NonNull<u8>> {
        if self.current.is_none() {
            self.reserve(self.config.spare)?;
        }
        match &self.current {
            Some(chunk) => Ok(chunk.start()),
            None => unreachable!("reserve acquired a chunk"),
        }
    }

    fn overflow(&self, requested: usize) -> ArenaError {
        let err = ArenaError::AllocationOverflow {
            requested,
            total: self.total,
            limit: self.config.max_size,
        };
        log_allocation_failure(&err);
        err
    }

    /// Make sure `more` bytes fit after the bytes in use
    pub fn reserve(&mut self, more: usize) -> Result<()> {
        match self.plan_growth(self.used, more) {
            Some(growth) => self.grow(growth),
            None => Ok(()),
        }
    }

    /// Decide how to fit `more` bytes at `offset` of the current chunk
    fn plan_growth(&self, offset: usize, more: usize) -> Option<Growth> {
        let capacity = offset.saturating_add(more);
        if capacity <= self.current_capacity() {
            return None;
        }

        if self.current.is_some() && offset == 0 {
            // Nobody points into the current chunk, so it may move.
            Some(Growth::Extend { capacity })
        } else {
            // Moving would invalidate live allocations; start a new chunk.
            Some(Growth::Replace {
                capacity: more.saturating_add(self.config.spare),
            })
        }
    }

    fn grow(&mut self, growth: Growth) -> Result<()> {
        let capacity = growth.capacity();

        if let (Growth::Extend { .. }, Some(chunk)) = (growth, self.current.as_mut()) {
            if chunk.extend(&self.raw, capacity).is_none() {
                return Err(self.out_of_memory(capacity));
            }
            log_chunk_acquired(chunk.id().0, capacity, true);
            return Ok(());
        }

        let id = ChunkId(self.next_chunk);
        let chunk = match Chunk::new(&self.raw, capacity, id) {
            Some(chunk) => chunk,
            None => return Err(self.out_of_memory(capacity)),
        };
        self.next_chunk += 1;

        if let Some(old) = self.current.replace(chunk) {
            self.retired.push(old);
        }
        self.used = 0;

        log_chunk_acquired(id.0, capacity, false);
        Ok(())
    }

    fn out_of_memory(&self, requested: usize) -> ArenaError {
        let err = ArenaError::OutOfMemory { requested };
        log_allocation_failure(&err);
        err
    }

    /// Drop every allocation, keeping the capacity
    ///
    /// Multiple chunks are coalesced into one chunk of [`max`](Self::max)
    /// bytes. All outstanding checkpoints become stale.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.marks.clear();
        self.clear();
    }

    fn clear(&mut self) {
        self.used = 0;
        self.total = 0;

        if self.retired.is_empty() {
            return;
        }

        log_coalesce(self.retired.len(), self.peak);
        for chunk in self.retired.drain(..) {
            log_chunk_released(chunk.id().0, chunk.capacity());
            chunk.release(&self.raw);
        }

        if let Err(err) = self.reserve(self.peak) {
            // Coalescing is an optimization; the current chunk still works.
            warn!(target: "stored_arena::chunk", error = %err, "could not coalesce chunks");
        }
    }

    /// Scoped snapshot; rolls back when dropped unless released
    pub fn snapshot(&mut self) -> Snapshot<'_, A> {
        Snapshot::new(self)
    }

    /// Detached snapshot handle, consumed by [`rollback`](Self::rollback) or
    /// [`forget`](Self::forget)
    ///
    /// Checkpoints roll back in reverse order of creation. Rolling one back
    /// invalidates every checkpoint taken after it.
    pub fn checkpoint(&mut self) -> Checkpoint {
        let position = match &self.current {
            Some(chunk) if self.total > 0 => Some(Position {
                chunk: chunk.id(),
                offset: self.used,
            }),
            _ => None,
        };

        let mark = self.next_mark;
        self.next_mark += 1;
        self.marks.push(mark);

        Checkpoint {
            arena: self.id,
            generation: self.generation,
            mark,
            position,
            total: self.total,
        }
    }

    /// Drop `checkpoint` without rolling back, keeping its allocations
    ///
    /// Checkpoints that are simply dropped stay on record until the next
    /// [`reset`](Self::reset) or an older rollback.
    pub fn forget(&mut self, checkpoint: Checkpoint) {
        if checkpoint.arena != self.id || checkpoint.generation != self.generation {
            return;
        }
        if let Ok(index) = self.marks.binary_search(&checkpoint.mark) {
            self.marks.remove(index);
        }
    }

    /// Undo every allocation made since `checkpoint` was taken
    ///
    /// A checkpoint of an empty arena clears the arena. Chunks acquired after
    /// the checkpoint are freed. A checkpoint that no longer matches the arena
    /// is rejected and nothing changes.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint.arena != self.id {
            log_rollback_rejected("foreign arena", checkpoint.total, self.total);
            return Err(ArenaError::ForeignSnapshot);
        }
        if checkpoint.generation != self.generation {
            log_rollback_rejected("arena was reset", checkpoint.total, self.total);
            return Err(ArenaError::StaleSnapshot);
        }

        let index = match self.marks.binary_search(&checkpoint.mark) {
            Ok(index) => index,
            Err(_) => {
                log_rollback_rejected("rolled back out of order", checkpoint.total, self.total);
                return Err(ArenaError::StaleSnapshot);
            }
        };

        let position = match checkpoint.position {
            Some(position) if checkpoint.total > 0 => position,
            _ => {
                self.marks.truncate(index);
                self.clear();
                return Ok(());
            }
        };

        if checkpoint.total > self.total {
            log_rollback_rejected("rolled back past it", checkpoint.total, self.total);
            return Err(ArenaError::StaleSnapshot);
        }

        let depth = match self.chunk_depth(position.chunk) {
            Some(depth) => depth,
            None => {
                log_rollback_rejected("chunk released", checkpoint.total, self.total);
                return Err(ArenaError::StaleSnapshot);
            }
        };

        // Chunks newer than the snapshot hold only discarded allocations.
        for _ in 0..depth {
            self.pop_chunk();
        }
        self.marks.truncate(index);

        debug_assert!(position.offset <= self.current_capacity());
        debug_assert!(position.offset <= checkpoint.total);
        self.total = checkpoint.total;
        self.used = position.offset;
        Ok(())
    }

    /// How many chunks to pop before `id` is current again
    fn chunk_depth(&self, id: ChunkId) -> Option<usize> {
        let current = self.current.as_ref()?;
        if current.id() == id {
            return Some(0);
        }
        self.retired
            .iter()
            .rev()
            .position(|chunk| chunk.id() == id)
            .map(|depth| depth + 1)
    }

    /// Free the current chunk and resume the most recently retired one
    fn pop_chunk(&mut self) {
        if let Some(chunk) = self.current.take() {
            log_chunk_released(chunk.id().0, chunk.capacity());
            chunk.release(&self.raw);
        }
        self.current = self.retired.pop();
        // Not tracked for retired chunks; the caller restores it.
        self.used = self.current_capacity();
    }

    /// Give unused memory back to the backend
    ///
    /// An empty arena releases all chunks and forgets its peak. Otherwise the
    /// peak is lowered to the current size, and the release happens at the next
    /// coalescing reset, since moving memory now would break live pointers.
    pub fn shrink_to_fit(&mut self) {
        if !self.is_empty() {
            self.peak = self.total;
            return;
        }

        self.peak = 0;
        self.used = 0;
        self.generation = self.generation.wrapping_add(1);
        self.marks.clear();

        for chunk in self.retired.drain(..) {
            log_chunk_released(chunk.id().0, chunk.capacity());
            chunk.release(&self.raw);
        }
        if let Some(chunk) = self.current.take() {
            log_chunk_released(chunk.id().0, chunk.capacity());
            chunk.release(&self.raw);
        }
    }

    /// Whether nothing is allocated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Bytes allocated, padding included
    #[inline]
    pub fn size(&self) -> usize {
        self.total
    }

    /// Highest [`size`](Self::size) seen; lowered only by [`shrink_to_fit`](Self::shrink_to_fit)
    #[inline]
    pub fn max(&self) -> usize {
        self.peak
    }

    /// Bytes the arena can hold without acquiring another chunk
    #[inline]
    pub fn capacity(&self) -> usize {
        self.total - self.used + self.current_capacity()
    }

    /// Number of chunks held; more than one means the arena is still learning its peak
    #[inline]
    pub fn chunks(&self) -> usize {
        self.retired.len() + usize::from(self.current.is_some())
    }

    #[inline]
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Incremented by every reset, invalidating older checkpoints
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Snapshot of the introspection counters
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            size: self.size(),
            max: self.max(),
            capacity: self.capacity(),
            chunks: self.chunks(),
        }
    }

    #[inline]
    fn current_capacity(&self) -> usize {
        self.current.as_ref().map_or(0, Chunk::capacity)
    }
}

impl<A: RawAlloc> Drop for Arena<A> {
    fn drop(&mut self) {
        if let Some(chunk) = self.current.take() {
            chunk.release(&self.raw);
        }
        for chunk in self.retired.drain(..) {
            chunk.release(&self.raw);
        }
    }
}

impl<A: RawAlloc> core::fmt::Debug for Arena<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("size", &self.total)
            .field("max", &self.peak)
            .field("capacity", &self.capacity())
            .field("chunks", &self.chunks())
            .finish()
    }
}

/// Arena statistics for monitoring and tuning the initial reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    pub size: usize,
    pub max: usize,
    pub capacity: usize,
    pub chunks: usize,
}
