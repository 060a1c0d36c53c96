//! stored-arena - scratch-pad memory for embedded debug protocols
//!
//! A bump allocator that serves the short-lived, variable-size allocations of
//! a protocol decoder without per-allocation bookkeeping. It grows while it
//! learns the peak working set, supports snapshots that undo everything
//! allocated after them, and coalesces into a single chunk on reset.
//!
//! ```
//! use stored_arena::Arena;
//!
//! let mut arena = Arena::new();
//! let header = arena.alloc::<u32>(4)?;
//! # let _ = header;
//!
//! {
//!     let mut scratch = arena.snapshot();
//!     let _tmp = scratch.alloc::<u8>(1000)?;
//!     assert_eq!(scratch.size(), 1016);
//! } // rolled back here
//!
//! assert_eq!(arena.size(), 16);
//! arena.reset();
//! assert!(arena.is_empty());
//! # Ok::<(), stored_arena::ArenaError>(())
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod logging;

// Re-export core types
pub use allocator::{Arena, ArenaId, ArenaStats, Checkpoint, RawAlloc, Snapshot, System};
pub use config::{ArenaConfig, Config};
pub use error::{ArenaError, ConfigError, Result};
