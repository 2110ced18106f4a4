//! # Engine Configuration
//!
//! File and environment configuration for the reconciliation engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ALMACEN_DB_PATH=/var/lib/almacen/almacen.db                        │
//! │     ALMACEN_DISTRIBUTION_ORDER=newest_first                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/almacen/almacen.toml (Linux)                             │
//! │     ~/Library/Application Support/com.almacen.engine/almacen.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "./almacen.db"
//! max_connections = 5
//!
//! [ledger]
//! max_conflict_retries = 5
//! conflict_backoff_ms = 20
//! max_conflict_backoff_ms = 500
//! distribution_order = "oldest_first"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::pool::DbConfig;

// =============================================================================
// Distribution Order
// =============================================================================

/// Order in which a client's open fiado sales receive a lump payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionOrder {
    /// Oldest debt first (`created_at`, then `sale_number`).
    #[default]
    OldestFirst,
    /// Most recent debt first.
    NewestFirst,
}

impl std::fmt::Display for DistributionOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionOrder::OldestFirst => write!(f, "oldest_first"),
            DistributionOrder::NewestFirst => write!(f, "newest_first"),
        }
    }
}

impl std::str::FromStr for DistributionOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oldest_first" | "oldest" | "fifo" => Ok(DistributionOrder::OldestFirst),
            "newest_first" | "newest" | "lifo" => Ok(DistributionOrder::NewestFirst),
            other => Err(ConfigError::Invalid(format!(
                "Unknown distribution order: '{}'. Valid options: oldest_first, newest_first",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a held lock before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Retries after a write conflict before giving up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// First backoff after a conflict; doubles per retry.
    #[serde(default = "default_conflict_backoff")]
    pub conflict_backoff_ms: u64,

    /// Ceiling for a single backoff.
    #[serde(default = "default_max_conflict_backoff")]
    pub max_conflict_backoff_ms: u64,

    #[serde(default)]
    pub distribution_order: DistributionOrder,
}

fn default_max_conflict_retries() -> u32 {
    5
}
fn default_conflict_backoff() -> u64 {
    20
}
fn default_max_conflict_backoff() -> u64 {
    500
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            max_conflict_retries: default_max_conflict_retries(),
            conflict_backoff_ms: default_conflict_backoff(),
            max_conflict_backoff_ms: default_max_conflict_backoff(),
            distribution_order: DistributionOrder::default(),
        }
    }
}

// =============================================================================
// AlmacenConfig
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlmacenConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl AlmacenConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (almacen.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.ledger.conflict_backoff_ms > self.ledger.max_conflict_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "conflict_backoff_ms ({}) exceeds max_conflict_backoff_ms ({})",
                self.ledger.conflict_backoff_ms, self.ledger.max_conflict_backoff_ms
            )));
        }

        if self.ledger.max_conflict_retries > 100 {
            return Err(ConfigError::Invalid(
                "max_conflict_retries must be at most 100".into(),
            ));
        }

        Ok(())
    }

    /// Applies `ALMACEN_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("ALMACEN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(max) = lookup("ALMACEN_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid ALMACEN_MAX_CONNECTIONS"),
            }
        }

        if let Some(retries) = lookup("ALMACEN_MAX_CONFLICT_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.ledger.max_conflict_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid ALMACEN_MAX_CONFLICT_RETRIES"),
            }
        }

        if let Some(order) = lookup("ALMACEN_DISTRIBUTION_ORDER") {
            match order.parse() {
                Ok(parsed) => self.ledger.distribution_order = parsed,
                Err(_) => warn!(value = %order, "Ignoring unknown ALMACEN_DISTRIBUTION_ORDER"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "almacen", "engine")
            .map(|dirs| dirs.config_dir().join("almacen.toml"))
    }

    /// Returns the default database path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "almacen", "engine")
            .map(|dirs| dirs.data_dir().join("almacen.db"))
    }

    /// Builds the pool configuration this file describes.
    pub fn to_db_config(&self) -> ConfigResult<DbConfig> {
        let path = self
            .database
            .path
            .clone()
            .or_else(Self::default_database_path)
            .ok_or(ConfigError::NoConfigDir)?;

        Ok(DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .max_conflict_retries(self.ledger.max_conflict_retries)
            .conflict_backoff(Duration::from_millis(self.ledger.conflict_backoff_ms))
            .max_conflict_backoff(Duration::from_millis(self.ledger.max_conflict_backoff_ms))
            .distribution_order(self.ledger.distribution_order))
    }
}
