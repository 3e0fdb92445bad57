//! In-memory store backed by a `HashMap` behind an async `RwLock`.
//!
//! Entries carry an optional deadline: a per-store default TTL, overridable
//! per call through the `expires_in` option (seconds). Expired entries read
//! as misses and are purged on the next write. An optional entry bound
//! refuses brand-new inserts when full; overwrites always land.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::cache::backend::{CacheResult, CacheStore, Options};
use crate::config::MemoryLevelConfig;

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory cache level.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    config: MemoryLevelConfig,
}

impl MemoryStore {
    pub fn new(config: MemoryLevelConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Deadline for a write: the `expires_in` option wins over the store's
    /// default TTL; neither means the entry never expires.
    fn deadline_for(&self, options: &Options, now: Instant) -> Option<Instant> {
        options
            .get_u64("expires_in")
            .or(self.config.default_ttl_secs)
            .map(|secs| now + Duration::from_secs(secs))
    }

    /// Insert under an already-held write lock. Returns false when the
    /// entry bound refuses a brand-new key.
    fn insert_locked(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: Bytes,
        expires_at: Option<Instant>,
    ) -> bool {
        if let Some(max) = self.config.max_entries {
            if !entries.contains_key(key) && entries.len() >= max {
                debug!(key = %key, max, "memory store full, refusing insert");
                return false;
            }
        }
        entries.insert(key.to_owned(), Entry { value, expires_at });
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryLevelConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str, _options: &Options) -> CacheResult<Option<Bytes>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn get_batch(
        &self,
        keys: &[String],
        _options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut found = HashMap::new();
        for key in keys {
            if let Some(entry) = entries.get(key).filter(|e| !e.is_expired(now)) {
                found.insert(key.clone(), entry.value.clone());
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: Bytes, options: &Options) -> CacheResult<bool> {
        let now = Instant::now();
        let expires_at = self.deadline_for(options, now);
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));
        Ok(self.insert_locked(&mut entries, key, value, expires_at))
    }

    async fn set_batch(
        &self,
        batch: &HashMap<String, Bytes>,
        options: &Options,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        let expires_at = self.deadline_for(options, now);
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));

        let mut all_stored = true;
        for (key, value) in batch {
            all_stored &= self.insert_locked(&mut entries, key, value.clone(), expires_at);
        }
        Ok(all_stored)
    }

    async fn delete(&self, key: &str, _options: &Options) -> CacheResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }
}
