//! Reference store implementations satisfying the level contract:
//! - [`memory`]: in-memory store with per-entry TTL and an optional bound
//! - [`disk`]: file-per-key store with sharded directories and zstd

pub mod disk;
pub mod memory;

use std::sync::Arc;

use crate::cache::backend::{CacheResult, CacheStore};
use crate::cache::cascade::Cascade;
use crate::config::{Config, LevelConfig};

use disk::DiskStore;
use memory::MemoryStore;

/// Construct a cascade from configuration, keeping the declared level order.
pub async fn build_cascade(config: &Config) -> CacheResult<Cascade> {
    let mut levels: Vec<Arc<dyn CacheStore>> = Vec::with_capacity(config.levels.len());
    for level in &config.levels {
        match level {
            LevelConfig::Memory(cfg) => levels.push(Arc::new(MemoryStore::new(cfg.clone()))),
            LevelConfig::Disk(cfg) => levels.push(Arc::new(DiskStore::new(cfg.clone()).await?)),
        }
    }
    Ok(Cascade::new(levels))
}
