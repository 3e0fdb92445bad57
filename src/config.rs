//! Runtime configuration for cache-cascade.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. The level list is ordered: the first entry is the
//! hottest level, consulted first on every read.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Command-line arguments for the operational binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "cache-cascade", about = "Multi-level cache cascade tool")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "cascade.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Look up a key without populating any level.
    Get { key: String },
    /// Write a value to every level.
    Set { key: String, value: String },
    /// Delete a key from every level.
    Delete { key: String },
    /// Read through the levels, falling back to the given value on a full
    /// miss and backfilling the levels that lacked it.
    Fetch { key: String, fallback: String },
}

/// Top-level configuration: the ordered level list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Levels in consultation order (first = hottest).
    pub levels: Vec<LevelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelConfig::Memory(MemoryLevelConfig::default()),
                LevelConfig::Disk(DiskLevelConfig::default()),
            ],
        }
    }
}

/// One level of the cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelConfig {
    Memory(MemoryLevelConfig),
    Disk(DiskLevelConfig),
}

/// In-memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLevelConfig {
    /// Default time-to-live in seconds applied to entries written without
    /// an `expires_in` option (None = entries never expire).
    pub default_ttl_secs: Option<u64>,

    /// Maximum number of live entries. When full, writes of new keys are
    /// refused; overwrites of existing keys always land (None = unbounded).
    pub max_entries: Option<usize>,
}

impl Default for MemoryLevelConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: None,
            max_entries: None,
        }
    }
}

/// Disk store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskLevelConfig {
    /// Root directory for value files.
    pub path: PathBuf,

    /// Apply zstd compression when writing value files.
    pub zstd_compression: bool,

    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for DiskLevelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/cache-cascade"),
            zstd_compression: true,
            zstd_level: 3,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
