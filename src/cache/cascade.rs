//! The cascade proxy: read-through, write-through, and partial-population
//! orchestration across an ordered list of cache levels.
//!
//! Earlier levels are consulted first; later levels act as backing stores.
//! On a partial hit, only the keys a level missed travel further down, and
//! only those keys are written back into it on the way up. Levels are
//! consulted strictly sequentially — a level past the first hit is never
//! touched by a read.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::debug;

use crate::cache::backend::{CacheResult, CacheStore, Compute, KeyedCompute, Options};

/// An ordered composition of cache levels exposing the unified contract.
///
/// A level is any [`CacheStore`], including another `Cascade` — the trait
/// impl at the bottom of this file is what allows nesting. The cascade
/// holds no state beyond the immutable level list, so clones are cheap and
/// concurrent use is as safe as the underlying stores.
#[derive(Clone)]
pub struct Cascade {
    levels: Arc<[Arc<dyn CacheStore>]>,
}

impl Cascade {
    /// Build a cascade over the given levels, in consultation order.
    ///
    /// An empty cascade is permitted: reads miss everywhere and `fetch`
    /// always invokes its compute closure.
    pub fn new(levels: Vec<Arc<dyn CacheStore>>) -> Self {
        Self {
            levels: levels.into(),
        }
    }

    /// Number of direct levels (nested cascades count as one).
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Read through the levels, computing the value on a full miss.
    ///
    /// Level `i` is consulted via its own `get_or_compute`; the fallback it
    /// receives resolves levels `i+1..`, bottoming out in `compute`. Each
    /// level stores its fallback's result before returning it, so whichever
    /// level (or the compute closure) produces the value, every level above
    /// the producer holds it by the time the call returns. `compute` runs
    /// at most once per call, and no level past the hit point is touched.
    pub async fn fetch(
        &self,
        key: &str,
        options: &Options,
        compute: Compute,
    ) -> CacheResult<Bytes> {
        self.fetch_at(0, key.to_owned(), options.clone(), compute)
            .await
    }

    fn fetch_at(
        &self,
        idx: usize,
        key: String,
        options: Options,
        compute: Compute,
    ) -> BoxFuture<'static, CacheResult<Bytes>> {
        let this = self.clone();
        Box::pin(async move {
            let Some(level) = this.levels.get(idx).cloned() else {
                debug!(key = %key, "all levels missed, invoking compute");
                return compute().await;
            };

            let fallback: Compute = if idx + 1 < this.levels.len() {
                let next = this.clone();
                let key = key.clone();
                let options = options.clone();
                Box::new(move || next.fetch_at(idx + 1, key, options, compute))
            } else {
                compute
            };

            level.get_or_compute(&key, &options, fallback).await
        })
    }

    /// Batched read-through with a per-key fallback.
    ///
    /// Returns a value for every requested key: found at the earliest level
    /// that has it, or computed when absent everywhere. The fallback runs
    /// once per missing key, never for a key already found.
    pub async fn fetch_multi(
        &self,
        keys: &[String],
        options: &Options,
        compute: KeyedCompute,
    ) -> CacheResult<HashMap<String, Bytes>> {
        self.fill_at(0, dedup_keys(keys), options.clone(), Some(compute))
            .await
    }

    /// Shrinking-key-set recursion shared by `fetch_multi` and the
    /// read-through half of the nesting contract (`get_batch_through`).
    ///
    /// The current level is probed once for the live key set; only the keys
    /// it missed travel to the tail, and only the entries resolved for
    /// those keys are written back into it before merging. A level below
    /// the first is therefore never asked about a key an earlier level
    /// already answered.
    fn fill_at(
        &self,
        idx: usize,
        keys: Vec<String>,
        options: Options,
        compute: Option<KeyedCompute>,
    ) -> BoxFuture<'static, CacheResult<HashMap<String, Bytes>>> {
        let this = self.clone();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(HashMap::new());
            }

            let Some(level) = this.levels.get(idx).cloned() else {
                // Levels exhausted: compute each leftover key, or report
                // the misses by omission when there is no fallback.
                let mut computed = HashMap::with_capacity(keys.len());
                if let Some(compute) = compute {
                    for key in keys {
                        let value = compute(key.clone()).await?;
                        computed.insert(key, value);
                    }
                }
                return Ok(computed);
            };

            let mut found = level.get_batch_through(&keys, &options).await?;
            let missing: Vec<String> = keys
                .iter()
                .filter(|k| !found.contains_key(*k))
                .cloned()
                .collect();

            debug!(
                level = idx,
                store = level.name(),
                requested = keys.len(),
                missing = missing.len(),
                "batch probe"
            );

            if missing.is_empty() {
                return Ok(found);
            }

            let resolved = this
                .fill_at(idx + 1, missing, options.clone(), compute)
                .await?;

            if !resolved.is_empty() {
                // Backfill the current level only with the entries it lacked.
                level.set_batch(&resolved, &options).await?;
                debug!(
                    level = idx,
                    store = level.name(),
                    entries = resolved.len(),
                    "backfilled level"
                );
                found.extend(resolved);
            }

            Ok(found)
        })
    }

    /// First value found scanning levels in order, or `None`.
    ///
    /// Purely observational: no level past the first hit is consulted and
    /// nothing is written.
    pub async fn read(&self, key: &str, options: &Options) -> CacheResult<Option<Bytes>> {
        for (idx, level) in self.levels.iter().enumerate() {
            if let Some(value) = level.get(key, options).await? {
                debug!(level = idx, store = level.name(), key = %key, "read hit");
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Batched observational read.
    ///
    /// Each level is asked only for keys still missing after the levels
    /// before it. Keys absent everywhere are omitted from the result —
    /// never an error, never a placeholder. Nothing is written.
    pub async fn read_multi(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        let mut remaining = dedup_keys(keys);
        let mut found = HashMap::with_capacity(remaining.len());

        for level in self.levels.iter() {
            if remaining.is_empty() {
                break;
            }
            let hits = level.get_batch(&remaining, options).await?;
            if !hits.is_empty() {
                remaining.retain(|k| !hits.contains_key(k));
                found.extend(hits);
            }
        }

        Ok(found)
    }

    /// Write the value to every level unconditionally, in level order.
    ///
    /// Returns one outcome per level; `false` marks a level that refused
    /// the write. Not atomic: a store error aborts the call and leaves the
    /// levels already written as they are.
    pub async fn write(
        &self,
        key: &str,
        value: Bytes,
        options: &Options,
    ) -> CacheResult<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter() {
            outcomes.push(level.set(key, value.clone(), options).await?);
        }
        Ok(outcomes)
    }

    /// Batched [`write`](Cascade::write): every level receives the whole
    /// entry mapping in one call. One outcome per level, in level order.
    pub async fn write_multi(
        &self,
        entries: &HashMap<String, Bytes>,
        options: &Options,
    ) -> CacheResult<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter() {
            outcomes.push(level.set_batch(entries, options).await?);
        }
        Ok(outcomes)
    }

    /// Delete the key from every level unconditionally, in level order.
    ///
    /// `false` marks a level where the key was absent; absence is not an
    /// error and does not stop the fan-out.
    pub async fn delete(&self, key: &str, options: &Options) -> CacheResult<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter() {
            outcomes.push(level.delete(key, options).await?);
        }
        Ok(outcomes)
    }
}

/// Batches are key sets: drop duplicates, keeping first-occurrence order.
fn dedup_keys(keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// A cascade satisfies the same capability contract as a plain store,
/// which is what allows one cascade to serve as a level of another.
///
/// The observational half (`get`, `get_batch`) maps to `read`/`read_multi`
/// so an outer read never writes through a nested cascade; the read-through
/// half (`get_batch_through`, `get_or_compute`) performs the nested
/// cascade's own internal backfill.
#[async_trait]
impl CacheStore for Cascade {
    fn name(&self) -> &str {
        "cascade"
    }

    async fn get(&self, key: &str, options: &Options) -> CacheResult<Option<Bytes>> {
        self.read(key, options).await
    }

    async fn get_batch(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        self.read_multi(keys, options).await
    }

    async fn get_batch_through(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        self.fill_at(0, dedup_keys(keys), options.clone(), None).await
    }

    async fn get_or_compute(
        &self,
        key: &str,
        options: &Options,
        fallback: Compute,
    ) -> CacheResult<Bytes> {
        self.fetch(key, options, fallback).await
    }

    async fn set(&self, key: &str, value: Bytes, options: &Options) -> CacheResult<bool> {
        let outcomes = self.write(key, value, options).await?;
        Ok(outcomes.iter().all(|&ok| ok))
    }

    async fn set_batch(
        &self,
        entries: &HashMap<String, Bytes>,
        options: &Options,
    ) -> CacheResult<bool> {
        let outcomes = self.write_multi(entries, options).await?;
        Ok(outcomes.iter().all(|&ok| ok))
    }

    async fn delete(&self, key: &str, options: &Options) -> CacheResult<bool> {
        let outcomes = Cascade::delete(self, key, options).await?;
        Ok(outcomes.iter().any(|&present| present))
    }
}
