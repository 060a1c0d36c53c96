//! Logging infrastructure - structured tracing for arena decisions
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Console or file output, human-readable or JSON
//!
//! The allocator emits events through the `log_*` helpers below so that the
//! field names stay consistent across the crate.

use once_cell::sync::OnceCell;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state; holds the file writer guard so buffered lines get flushed
static LOGGER: OnceCell<Mutex<Option<WorkerGuard>>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; logs go to stderr when unset
    pub log_path: Option<PathBuf>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // STORED_ARENA_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("STORED_ARENA_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        if let Ok(path) = std::env::var("STORED_ARENA_LOG_FILE") {
            config.log_path = Some(PathBuf::from(path));
        }

        config.json_format = std::env::var("STORED_ARENA_LOG_JSON").is_ok();
        config.show_spans = std::env::var("STORED_ARENA_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for chasing allocation patterns
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call has an effect. If another subscriber is already
/// installed, it is left in place.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "stored_arena={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let (writer, guard) = make_writer(config.log_path.as_deref());

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(env_filter)
            .try_init()
            .ok(); // Ignore error if a subscriber is already installed

        Mutex::new(guard)
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

fn make_writer(path: Option<&Path>) -> (BoxMakeWriter, Option<WorkerGuard>) {
    match path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file = path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("stored_arena.log"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(io::stderr), None),
    }
}

// ============================================================================
// Arena events
// ============================================================================

/// Log a bump allocation
#[inline]
pub fn log_allocation(size: usize, padding: usize, total: usize, ptr: *const u8) {
    trace!(
        target: "stored_arena::alloc",
        size,
        padding,
        total,
        address = ?ptr,
        "allocated"
    );
}

/// Log a chunk being created or resized
#[inline]
pub fn log_chunk_acquired(chunk: u64, capacity: usize, extended: bool) {
    debug!(
        target: "stored_arena::chunk",
        chunk,
        capacity,
        extended,
        "chunk acquired"
    );
}

/// Log a chunk going back to the backend
#[inline]
pub fn log_chunk_released(chunk: u64, capacity: usize) {
    debug!(
        target: "stored_arena::chunk",
        chunk,
        capacity,
        "chunk released"
    );
}

/// Log retired chunks being merged into one
#[inline]
pub fn log_coalesce(freed_chunks: usize, peak: usize) {
    debug!(
        target: "stored_arena::chunk",
        freed_chunks,
        peak,
        "coalescing chunks"
    );
}

/// Log a rejected rollback
#[inline]
pub fn log_rollback_rejected(reason: &str, captured_total: usize, total: usize) {
    warn!(
        target: "stored_arena::snapshot",
        reason,
        captured_total,
        total,
        "rollback rejected"
    );
}

/// Log a failed allocation
#[inline]
pub fn log_allocation_failure(error: &crate::ArenaError) {
    error!(
        target: "stored_arena::alloc",
        error = %error,
        "allocation failed"
    );
}
