//! Disk-backed store: one file per key under a sharded directory tree.
//!
//! Keys are hex-encoded into file names and sharded by their first byte to
//! avoid piling every file into one directory. Value files are optionally
//! zstd-compressed. Uses tokio's async file I/O; a missing file is a cache
//! miss, not an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use tokio::fs;
use tracing::debug;

use crate::cache::backend::{CacheError, CacheResult, CacheStore, Options};
use crate::config::DiskLevelConfig;

/// Longest key the hex file-name encoding supports without overflowing
/// common file-name length limits.
const MAX_KEY_BYTES: usize = 100;

/// Cumulative I/O counters, mirrored out of the atomics on request.
#[derive(Debug, Clone, Default)]
pub struct DiskStats {
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_bytes_read: u64,
    pub total_bytes_written: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

/// Disk cache level.
pub struct DiskStore {
    config: DiskLevelConfig,
    counters: Counters,
}

impl DiskStore {
    /// Create a disk store, ensuring the root directory exists.
    pub async fn new(config: DiskLevelConfig) -> CacheResult<Self> {
        fs::create_dir_all(&config.path).await?;
        Ok(Self {
            config,
            counters: Counters::default(),
        })
    }

    /// Snapshot of the I/O counters.
    pub fn stats(&self) -> DiskStats {
        DiskStats {
            total_reads: self.counters.reads.load(Ordering::Relaxed),
            total_writes: self.counters.writes.load(Ordering::Relaxed),
            total_bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            total_bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// File path for a key: `<root>/<shard>/<hex(key)>.val`, sharded by the
    /// key's first byte.
    fn value_path(&self, key: &str) -> CacheResult<PathBuf> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey {
                key: key.to_owned(),
                reason: "empty key",
            });
        }
        if key.len() > MAX_KEY_BYTES {
            return Err(CacheError::InvalidKey {
                key: key.to_owned(),
                reason: "key exceeds the disk store length limit",
            });
        }

        let encoded = hex_encode(key.as_bytes());
        let shard = &encoded[..2];
        Ok(self.config.path.join(shard).join(format!("{encoded}.val")))
    }

    async fn read_value(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let path = self.value_path(key)?;

        let raw = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_read
            .fetch_add(raw.len() as u64, Ordering::Relaxed);

        let data = if self.config.zstd_compression {
            zstd::decode_all(raw.as_slice())?
        } else {
            raw
        };

        debug!(key = %key, path = %path.display(), size = data.len(), "disk read");
        Ok(Some(Bytes::from(data)))
    }

    async fn read_entry(&self, key: &String) -> CacheResult<(String, Option<Bytes>)> {
        let value = self.read_value(key).await?;
        Ok((key.clone(), value))
    }

    async fn write_value(&self, key: &str, value: &Bytes) -> CacheResult<()> {
        let path = self.value_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = if self.config.zstd_compression {
            zstd::encode_all(value.as_ref(), self.config.zstd_level)?
        } else {
            value.to_vec()
        };

        fs::write(&path, &data).await?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        debug!(key = %key, path = %path.display(), size = data.len(), "disk write");
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    fn name(&self) -> &str {
        "disk"
    }

    async fn get(&self, key: &str, _options: &Options) -> CacheResult<Option<Bytes>> {
        self.read_value(key).await
    }

    async fn get_batch(
        &self,
        keys: &[String],
        _options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        // One batch call is one round-trip to the caller; internally the
        // per-key reads run concurrently.
        let entries = future::try_join_all(keys.iter().map(|key| self.read_entry(key))).await?;

        let mut found = HashMap::new();
        for (key, value) in entries {
            if let Some(value) = value {
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Bytes, _options: &Options) -> CacheResult<bool> {
        self.write_value(key, &value).await?;
        Ok(true)
    }

    async fn set_batch(
        &self,
        entries: &HashMap<String, Bytes>,
        _options: &Options,
    ) -> CacheResult<bool> {
        future::try_join_all(
            entries
                .iter()
                .map(|(key, value)| self.write_value(key, value)),
        )
        .await?;
        Ok(true)
    }

    async fn delete(&self, key: &str, _options: &Options) -> CacheResult<bool> {
        let path = self.value_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, path = %path.display(), "disk delete");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
