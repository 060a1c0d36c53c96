//! Bump arithmetic - alignment and growth decisions
//!
//! Design: Offsets are aligned instead of addresses. Chunk starts are
//! word-aligned and the arena never aligns beyond the word size, so an aligned
//! offset is an aligned address.

/// Largest alignment the arena honours
pub const WORD: usize = core::mem::size_of::<usize>();

/// Clamp a requested alignment to `1..=WORD`
///
/// Non-power-of-two requests are rounded up to the next power of two first.
#[inline]
pub const fn clamp_align(align: usize) -> usize {
    if align <= 1 {
        1
    } else if align >= WORD {
        WORD
    } else {
        align.next_power_of_two()
    }
}

/// Bytes needed to bring `offset` up to a multiple of `align`
///
/// `align` must be a power of two.
#[inline(always)]
pub const fn padding(offset: usize, align: usize) -> usize {
    offset.wrapping_neg() & (align - 1)
}

/// How the arena makes room when the current chunk is too small
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Resize the current chunk to `capacity`; nothing points into it yet.
    Extend { capacity: usize },
    /// Retire the current chunk and start a new one of `capacity` bytes.
    Replace { capacity: usize },
}

impl Growth {
    /// Chunk capacity after the growth
    #[inline]
    pub fn capacity(self) -> usize {
        match self {
            Growth::Extend { capacity } | Growth::Replace { capacity } => capacity,
        }
    }
}
