//! ClassMap Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.classmap/config.toml`
//! - Local config: `.classmap/config.toml` (in workspace)
//! - An explicit config file passed on the command line
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → explicit file → CLI overrides.

mod error;
mod loader;

pub use error::{ConfigError, FileOperation};
pub use classmap_core::{DEFAULT_STATEMENT_CACHE_CAPACITY, DEFAULT_TABLE_SPACE};
pub use loader::ConfigLoader;

use classmap_core::is_valid_table_space;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for ClassMap.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClassMapConfig {
    /// Metadata database configuration
    pub database: DatabaseConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Metadata database location.
///
/// # Example TOML
///
/// ```toml
/// [database]
/// path = "model.db"
/// read_only = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; relative paths resolve against the workspace root
    pub path: Option<PathBuf>,

    /// Open the database read-only
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_only: true,
        }
    }
}

/// Cache configuration.
///
/// # Example TOML
///
/// ```toml
/// [cache]
/// table_space = "main"
/// statement_cache_capacity = 64
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite schema name holding the metadata tables
    pub table_space: String,

    /// Capacity of the prepared statement cache
    pub statement_cache_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            table_space: DEFAULT_TABLE_SPACE.to_string(),
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_space.is_empty() {
            return Err(ConfigError::invalid_value(
                "cache.table_space",
                "must not be empty",
            ));
        }
        if !is_valid_table_space(&self.table_space) {
            return Err(ConfigError::invalid_value(
                "cache.table_space",
                format!("'{}' is not a valid schema name", self.table_space),
            ));
        }
        if self.statement_cache_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "cache.statement_cache_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override database path
    pub database_path: Option<PathBuf>,

    /// Override read-only mode
    pub read_only: Option<bool>,

    /// Override tablespace
    pub table_space: Option<String>,

    /// Override log level
    pub log_level: Option<String>,

    /// Override log format
    pub log_format: Option<LogFormat>,
}

impl ClassMapConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref path) = overrides.database_path {
            self.database.path = Some(path.clone());
        }

        if let Some(read_only) = overrides.read_only {
            self.database.read_only = read_only;
        }

        if let Some(ref table_space) = overrides.table_space {
            self.cache.table_space = table_space.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }

        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()
    }

    /// Get the effective database path for a workspace.
    ///
    /// `None` when no database is configured.
    pub fn database_path(&self, workspace_root: &Path) -> Option<PathBuf> {
        let path = self.database.path.as_ref()?;
        if path.is_absolute() {
            Some(path.clone())
        } else {
            Some(workspace_root.join(path))
        }
    }
}
