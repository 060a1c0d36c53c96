//! Error types for the arena and its configuration

use std::fmt;
use std::io;

/// Result alias for arena operations
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Failures reported by [`Arena`](crate::Arena)
///
/// Allocation failures leave the arena exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// The backend could not provide a chunk of `requested` bytes
    OutOfMemory { requested: usize },
    /// `total + requested` does not fit below `limit`
    AllocationOverflow { requested: usize, total: usize, limit: usize },
    /// The checkpoint no longer matches the arena state
    StaleSnapshot,
    /// The checkpoint was taken from a different arena
    ForeignSnapshot,
    /// The arena was constructed with settings that cannot work
    InvalidConfig(String),
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "Out of memory: cannot allocate a chunk of {} bytes", requested)
            }
            Self::AllocationOverflow { requested, total, limit } => {
                write!(
                    f,
                    "Allocation overflow: {} bytes requested with {} in use exceeds limit {}",
                    requested, total, limit
                )
            }
            Self::StaleSnapshot => {
                write!(f, "Snapshot is stale: the arena was reset or rolled back past it")
            }
            Self::ForeignSnapshot => {
                write!(f, "Snapshot belongs to a different arena")
            }
            Self::InvalidConfig(reason) => write!(f, "Invalid arena config: {}", reason),
        }
    }
}

impl std::error::Error for ArenaError {}

/// Failures while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(e) => write!(f, "Failed to parse config: {}", e),
            Self::Invalid(reason) => write!(f, "Invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for ArenaError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid(reason) => Self::InvalidConfig(reason),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}
