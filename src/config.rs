//! Arena and logging configuration, loadable from TOML
//!
//! ```toml
//! [arena]
//! reserve = 1024
//! max_size = 65535
//! poison = true
//!
//! [log]
//! level = "debug"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::logging::{parse_level, LogConfig};

/// Name of the file [`Config::discover`] looks for
pub const CONFIG_FILE: &str = "stored-arena.toml";

/// Byte pattern written into fresh allocations when poisoning is on
pub const POISON_BYTE: u8 = 0xEF;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub arena: ArenaConfig,

    #[serde(default)]
    pub log: LogSettings,
}

/// Arena tuning knobs
///
/// All values are fixed when the arena is built; nothing here is consulted
/// through global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Bytes to reserve when the arena is created
    #[serde(default)]
    pub reserve: usize,

    /// Slack added to every new chunk to amortize small allocations
    #[serde(default = "default_spare")]
    pub spare: usize,

    /// Upper bound for the total number of bytes in use
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Fill fresh allocations with [`POISON_BYTE`]
    #[serde(default = "default_poison")]
    pub poison: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            reserve: 0,
            spare: default_spare(),
            max_size: default_max_size(),
            poison: default_poison(),
        }
    }
}

impl ArenaConfig {
    /// Configuration matching a small embedded target: 16-bit size counters
    pub fn embedded() -> Self {
        Self {
            max_size: u16::MAX as usize,
            ..Self::default()
        }
    }

    pub fn with_reserve(mut self, reserve: usize) -> Self {
        self.reserve = reserve;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_poison(mut self, poison: bool) -> Self {
        self.poison = poison;
        self
    }

    /// Check the values are usable together
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spare == 0 {
            return Err(ConfigError::Invalid("arena.spare must be greater than zero".into()));
        }
        if self.reserve > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "arena.reserve ({}) exceeds arena.max_size ({})",
                self.reserve, self.max_size
            )));
        }
        Ok(())
    }
}

/// `[log]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub spans: bool,
}

impl LogSettings {
    /// Convert into a logging configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let mut config = LogConfig::default();
        if let Some(level) = &self.level {
            config.level = parse_level(level)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown log level '{}'", level)))?;
        }
        config.log_path = self.file.clone();
        config.json_format = self.json;
        config.show_spans = self.spans;
        Ok(config)
    }
}

fn default_spare() -> usize { 8 * core::mem::size_of::<usize>() }
fn default_max_size() -> usize { usize::MAX }
fn default_poison() -> bool { cfg!(debug_assertions) }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.arena.validate()?;
        Ok(config)
    }

    /// Find and load the configuration file from the current directory or its parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    /// Find and load the configuration file from `start` or its parents
    ///
    /// Unreadable or invalid files are skipped. Defaults apply when nothing is found.
    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start);

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return config;
                }
            }

            current = dir.parent();
        }

        Self::default()
    }
}
