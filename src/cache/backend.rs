//! The capability contract every cascade level satisfies.
//!
//! A level is anything that can answer single-key and batched get/set/delete
//! calls: an in-memory store, a disk store, a networked store, or another
//! [`Cascade`](crate::cache::cascade::Cascade). The cascade never looks past
//! this trait — expiration, serialization, and namespacing all stay on the
//! store's side of the boundary.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Caller-supplied fallback for a single-key fetch.
///
/// Invoked at most once per cascade call, only when no level holds the key.
pub type Compute = Box<dyn FnOnce() -> BoxFuture<'static, CacheResult<Bytes>> + Send>;

/// Caller-supplied fallback for a batched fetch.
///
/// Invoked independently once per key that no level holds — never as a
/// single batched call, and never for a key already found.
pub type KeyedCompute = Arc<dyn Fn(String) -> BoxFuture<'static, CacheResult<Bytes>> + Send + Sync>;

/// Wrap an async closure as a [`Compute`] fallback.
pub fn compute_once<F, Fut>(f: F) -> Compute
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = CacheResult<Bytes>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Wrap an async per-key closure as a [`KeyedCompute`] fallback.
pub fn compute_per_key<F, Fut>(f: F) -> KeyedCompute
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CacheResult<Bytes>> + Send + 'static,
{
    Arc::new(move |key| Box::pin(f(key)))
}

/// Pass-through option bag forwarded verbatim to every store call.
///
/// The cascade itself recognizes no keys; each store defines which entries
/// it reads (the memory store honors `expires_in` seconds, for example) and
/// ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options(HashMap<String, serde_json::Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Convenience accessor for numeric options such as `expires_in`.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(|v| v.as_u64())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The store capability contract.
///
/// All operations take the caller's [`Options`] verbatim. Batch results map
/// key to value for the keys found; absent keys are simply omitted. Errors
/// abort the calling cascade operation unmodified.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short store label used in structured logs.
    fn name(&self) -> &str {
        "store"
    }

    /// Look up a single key. `Ok(None)` is a miss, never an error.
    async fn get(&self, key: &str, options: &Options) -> CacheResult<Option<Bytes>>;

    /// Look up a batch of keys. Keys not found are omitted from the result.
    async fn get_batch(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>>;

    /// Batched lookup that lets a composite store warm itself.
    ///
    /// A plain store just reads (the default). A store that is itself a
    /// cascade overrides this to also backfill its own inner levels with
    /// values found deeper inside, without any fallback computation.
    async fn get_batch_through(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        self.get_batch(keys, options).await
    }

    /// Return the stored value, or invoke `fallback` once, store its result,
    /// and return it.
    async fn get_or_compute(
        &self,
        key: &str,
        options: &Options,
        fallback: Compute,
    ) -> CacheResult<Bytes> {
        if let Some(value) = self.get(key, options).await? {
            return Ok(value);
        }
        let value = fallback().await?;
        self.set(key, value.clone(), options).await?;
        Ok(value)
    }

    /// Store a value. `Ok(false)` means the store refused the write (e.g. a
    /// bounded store at capacity) without failing.
    async fn set(&self, key: &str, value: Bytes, options: &Options) -> CacheResult<bool>;

    /// Store a batch of entries in one round-trip.
    async fn set_batch(
        &self,
        entries: &HashMap<String, Bytes>,
        options: &Options,
    ) -> CacheResult<bool>;

    /// Remove a key. `Ok(false)` means the key was absent, never an error.
    async fn delete(&self, key: &str, options: &Options) -> CacheResult<bool>;
}
