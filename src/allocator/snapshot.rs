//! Snapshots - stack-discipline rollback points
//!
//! Design: A [`Checkpoint`] records where the bump pointer was, by chunk id and
//! offset rather than by address, together with the arena id and generation so
//! a stale or foreign checkpoint is detected instead of trusted.
//! [`Snapshot`] wraps a checkpoint in a guard that borrows the arena: work goes
//! through the guard, and dropping it rolls back unless it was released.
//! Nested guards borrow their parent, which keeps rollbacks in reverse order
//! of creation.

use core::ops::{Deref, DerefMut};

use super::chunk::ChunkId;
use super::raw::{RawAlloc, System};
use super::{Arena, ArenaId};

/// Bump pointer position inside a specific chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) chunk: ChunkId,
    pub(crate) offset: usize,
}

/// Detached rollback point of an [`Arena`]
///
/// Taken with [`Arena::checkpoint`] and consumed by [`Arena::rollback`], so it
/// can be rolled back at most once. Rolling back an older checkpoint first
/// makes this one stale.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a checkpoint does nothing unless rolled back"]
pub struct Checkpoint {
    pub(crate) arena: ArenaId,
    pub(crate) generation: u64,
    /// Creation order within the generation
    pub(crate) mark: u64,
    /// `None` when the arena was empty
    pub(crate) position: Option<Position>,
    pub(crate) total: usize,
}

impl Checkpoint {
    /// Arena size when the checkpoint was taken
    #[inline]
    pub fn size(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Scoped rollback point
///
/// Dereferences to the arena, so allocation continues through the snapshot.
/// Dropping a live snapshot rolls the arena back; call
/// [`release`](Self::release) to keep the allocations instead.
#[must_use = "dropping a snapshot immediately rolls it back"]
pub struct Snapshot<'a, A: RawAlloc = System> {
    arena: &'a mut Arena<A>,
    checkpoint: Option<Checkpoint>,
}

impl<'a, A: RawAlloc> Snapshot<'a, A> {
    pub(super) fn new(arena: &'a mut Arena<A>) -> Self {
        let checkpoint = arena.checkpoint();
        Self {
            arena,
            checkpoint: Some(checkpoint),
        }
    }

    /// Undo every allocation made since the snapshot was taken
    ///
    /// Only the first call does anything. If the arena was reset in the
    /// meantime, the rollback is skipped and [`StaleSnapshot`] is returned.
    ///
    /// [`StaleSnapshot`]: crate::ArenaError::StaleSnapshot
    pub fn rollback(&mut self) -> crate::Result<()> {
        match self.checkpoint.take() {
            Some(checkpoint) => self.arena.rollback(checkpoint),
            None => Ok(()),
        }
    }

    /// Keep all allocations; the snapshot will not roll back
    pub fn release(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.arena.forget(checkpoint);
        }
    }

    /// Whether a rollback is still pending
    #[inline]
    pub fn is_live(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Arena size when the snapshot was taken
    ///
    /// `None` once the snapshot was rolled back or released.
    #[inline]
    pub fn captured_size(&self) -> Option<usize> {
        self.checkpoint.as_ref().map(Checkpoint::size)
    }
}

impl<A: RawAlloc> Deref for Snapshot<'_, A> {
    type Target = Arena<A>;

    fn deref(&self) -> &Arena<A> {
        &*self.arena
    }
}

impl<A: RawAlloc> DerefMut for Snapshot<'_, A> {
    fn deref_mut(&mut self) -> &mut Arena<A> {
        &mut *self.arena
    }
}

impl<A: RawAlloc> Drop for Snapshot<'_, A> {
    fn drop(&mut self) {
        // A rejected rollback was already logged by the arena.
        let _ = self.rollback();
    }
}

impl<A: RawAlloc> core::fmt::Debug for Snapshot<'_, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Snapshot")
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}
