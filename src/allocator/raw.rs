//! System memory boundary - where chunks come from
//!
//! Design: Three primitives (alloc, grow, free) so the arena can run on the
//! platform heap or on any other backend that hands out word-aligned blocks.
//! Every chunk is word-aligned, which is the strongest alignment the arena
//! ever promises.

use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, realloc, Layout};

/// Alignment of every chunk handed out by a backend
pub const CHUNK_ALIGN: usize = core::mem::size_of::<usize>();

/// Source of raw chunk memory for an [`Arena`](super::Arena)
///
/// A backend reports failure by returning `None`; the arena turns that into
/// [`ArenaError::OutOfMemory`](crate::ArenaError::OutOfMemory).
///
/// # Safety
///
/// Implementations must return blocks of at least the requested size that are
/// aligned to [`CHUNK_ALIGN`], and must keep them valid until `free`.
/// `grow` must preserve the first `old_size` bytes and, on failure, leave the
/// original block untouched.
pub unsafe trait RawAlloc {
    /// Allocate a block of `size` bytes (`size > 0`)
    fn alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Resize a block to `new_size` bytes, possibly moving it
    ///
    /// # Safety
    ///
    /// `ptr` must come from this backend with size `old_size`.
    unsafe fn grow(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>>;

    /// Release a block
    ///
    /// # Safety
    ///
    /// `ptr` must come from this backend with size `size`, and must not be
    /// used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// Platform heap backend
///
/// Uses the global allocator for portability.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

unsafe impl RawAlloc for System {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(size > 0, "zero-sized chunk");
        let layout = Layout::from_size_align(size, CHUNK_ALIGN).ok()?;
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn grow(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        debug_assert!(new_size > old_size, "grow must enlarge the chunk");
        // Reject sizes that do not form a valid layout before realloc sees them.
        Layout::from_size_align(new_size, CHUNK_ALIGN).ok()?;
        let layout = Layout::from_size_align_unchecked(old_size, CHUNK_ALIGN);
        NonNull::new(realloc(ptr.as_ptr(), layout, new_size))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        let layout = Layout::from_size_align_unchecked(size, CHUNK_ALIGN);
        dealloc(ptr.as_ptr(), layout);
    }
}
