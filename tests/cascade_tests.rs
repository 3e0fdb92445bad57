//! Integration tests for the cascade orchestration algorithm.
//!
//! A `Probe` level wraps a memory store and records every operation and
//! batch key set that reaches it, so the tests can assert not just results
//! but which levels were consulted and with which keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use cache_cascade::config::MemoryLevelConfig;
use cache_cascade::{
    compute_once, compute_per_key, CacheError, CacheResult, CacheStore, Cascade, Compute,
    KeyedCompute, MemoryStore, Options,
};

/// Memory-store wrapper recording which calls reach this level.
#[derive(Default)]
struct Probe {
    inner: MemoryStore,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    batch_requests: Mutex<Vec<Vec<String>>>,
    batch_writes: Mutex<Vec<Vec<String>>>,
}

impl Probe {
    fn total_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
            + self.set_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
            + self.batch_requests.lock().unwrap().len()
            + self.batch_writes.lock().unwrap().len()
    }

    fn batch_requests(&self) -> Vec<Vec<String>> {
        self.batch_requests.lock().unwrap().clone()
    }

    fn batch_writes(&self) -> Vec<Vec<String>> {
        self.batch_writes.lock().unwrap().clone()
    }
}

fn sorted(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.into_iter().collect();
    keys.sort();
    keys
}

#[async_trait]
impl CacheStore for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn get(&self, key: &str, options: &Options) -> CacheResult<Option<Bytes>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key, options).await
    }

    async fn get_batch(
        &self,
        keys: &[String],
        options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        self.batch_requests
            .lock()
            .unwrap()
            .push(sorted(keys.to_vec()));
        self.inner.get_batch(keys, options).await
    }

    async fn set(&self, key: &str, value: Bytes, options: &Options) -> CacheResult<bool> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, options).await
    }

    async fn set_batch(
        &self,
        entries: &HashMap<String, Bytes>,
        options: &Options,
    ) -> CacheResult<bool> {
        self.batch_writes
            .lock()
            .unwrap()
            .push(sorted(entries.keys().cloned()));
        self.inner.set_batch(entries, options).await
    }

    async fn delete(&self, key: &str, options: &Options) -> CacheResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key, options).await
    }
}

/// Level that fails every operation, for error-propagation tests.
struct FailingStore;

fn backend_down() -> CacheError {
    CacheError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "backend down",
    ))
}

#[async_trait]
impl CacheStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &str, _options: &Options) -> CacheResult<Option<Bytes>> {
        Err(backend_down())
    }

    async fn get_batch(
        &self,
        _keys: &[String],
        _options: &Options,
    ) -> CacheResult<HashMap<String, Bytes>> {
        Err(backend_down())
    }

    async fn set(&self, _key: &str, _value: Bytes, _options: &Options) -> CacheResult<bool> {
        Err(backend_down())
    }

    async fn set_batch(
        &self,
        _entries: &HashMap<String, Bytes>,
        _options: &Options,
    ) -> CacheResult<bool> {
        Err(backend_down())
    }

    async fn delete(&self, _key: &str, _options: &Options) -> CacheResult<bool> {
        Err(backend_down())
    }
}

fn probes(n: usize) -> (Vec<Arc<Probe>>, Cascade) {
    let probes: Vec<Arc<Probe>> = (0..n).map(|_| Arc::new(Probe::default())).collect();
    let cascade = Cascade::new(
        probes
            .iter()
            .map(|p| p.clone() as Arc<dyn CacheStore>)
            .collect(),
    );
    (probes, cascade)
}

fn counting_compute(counter: &Arc<AtomicUsize>, value: &str) -> Compute {
    let counter = counter.clone();
    let value = Bytes::from(value.to_owned());
    compute_once(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(value) }
    })
}

fn recording_keyed_compute(
    calls: &Arc<Mutex<Vec<String>>>,
    values: HashMap<String, Bytes>,
) -> KeyedCompute {
    let calls = calls.clone();
    compute_per_key(move |key: String| {
        calls.lock().unwrap().push(key.clone());
        let value = values.get(&key).cloned();
        async move {
            match value {
                Some(v) => Ok(v),
                None => Err(CacheError::Other(anyhow::anyhow!(
                    "no fallback value for {key}"
                ))),
            }
        }
    })
}

// A full miss computes once and populates every level.
#[tokio::test]
async fn test_fetch_backfills_all_levels_on_full_miss() {
    let (levels, cascade) = probes(3);
    let opts = Options::new();
    let computes = Arc::new(AtomicUsize::new(0));

    let value = cascade
        .fetch("foo", &opts, counting_compute(&computes, "bar"))
        .await
        .unwrap();

    assert_eq!(value, Bytes::from("bar"));
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    for level in &levels {
        assert_eq!(
            level.get("foo", &opts).await.unwrap(),
            Some(Bytes::from("bar"))
        );
    }
}

// A hole at level 0 is refilled from level 1 without touching level 2,
// and without recomputing.
#[tokio::test]
async fn test_fetch_refills_earlier_level_from_partial_hit() {
    let (levels, cascade) = probes(3);
    let opts = Options::new();
    let computes = Arc::new(AtomicUsize::new(0));

    cascade
        .fetch("foo", &opts, counting_compute(&computes, "bar"))
        .await
        .unwrap();

    // Punch a hole at level 0 only.
    levels[0].delete("foo", &opts).await.unwrap();

    let level2_calls_before = levels[2].total_calls();
    let value = cascade
        .fetch("foo", &opts, counting_compute(&computes, "wrong"))
        .await
        .unwrap();

    assert_eq!(value, Bytes::from("bar"));
    assert_eq!(computes.load(Ordering::SeqCst), 1, "compute must not rerun");
    assert_eq!(
        levels[2].total_calls(),
        level2_calls_before,
        "level past the hit point must not be consulted"
    );
    assert_eq!(
        levels[0].get("foo", &opts).await.unwrap(),
        Some(Bytes::from("bar")),
        "level 0 must be rewritten"
    );
}

// Reads never touch levels past the first hit.
#[tokio::test]
async fn test_read_short_circuits_at_first_hit() {
    let (levels, cascade) = probes(3);
    let opts = Options::new();

    levels[1].set("k", Bytes::from("v"), &opts).await.unwrap();

    let value = cascade.read("k", &opts).await.unwrap();
    assert_eq!(value, Some(Bytes::from("v")));
    assert_eq!(levels[2].total_calls(), 0);
}

// Lower levels see only the residual missing keys, the fallback runs only
// for keys absent everywhere, and each level is backfilled with exactly
// what it lacked.
#[tokio::test]
async fn test_fetch_multi_propagates_only_missing_keys() {
    let (levels, cascade) = probes(3);
    let opts = Options::new();

    levels[0].set("k1", Bytes::from("v1"), &opts).await.unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let compute = recording_keyed_compute(
        &calls,
        HashMap::from([("k2".to_string(), Bytes::from("v2"))]),
    );

    let keys = vec!["k1".to_string(), "k2".to_string()];
    let result = cascade.fetch_multi(&keys, &opts, compute).await.unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result["k1"], Bytes::from("v1"));
    assert_eq!(result["k2"], Bytes::from("v2"));

    assert_eq!(
        levels[0].batch_requests(),
        vec![vec!["k1".to_string(), "k2".to_string()]]
    );
    assert_eq!(levels[1].batch_requests(), vec![vec!["k2".to_string()]]);
    assert_eq!(levels[2].batch_requests(), vec![vec!["k2".to_string()]]);

    assert_eq!(*calls.lock().unwrap(), vec!["k2".to_string()]);

    // Every level lacked k2 and only k2.
    for level in &levels {
        assert_eq!(level.batch_writes(), vec![vec!["k2".to_string()]]);
    }
}

// One fallback invocation per missing key, even when several levels miss
// that key.
#[tokio::test]
async fn test_fetch_multi_computes_each_missing_key_once() {
    let (_, cascade) = probes(3);
    let opts = Options::new();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let compute = recording_keyed_compute(
        &calls,
        HashMap::from([
            ("a".to_string(), Bytes::from("1")),
            ("b".to_string(), Bytes::from("2")),
        ]),
    );

    let keys = vec!["a".to_string(), "b".to_string()];
    cascade.fetch_multi(&keys, &opts, compute).await.unwrap();

    assert_eq!(sorted(calls.lock().unwrap().clone()), vec!["a", "b"]);
}

// The observational batch read also shrinks the key set per level, and
// keys absent everywhere are omitted rather than erroring.
#[tokio::test]
async fn test_read_multi_shrinks_key_set_and_omits_misses() {
    let (levels, cascade) = probes(2);
    let opts = Options::new();

    levels[0].set("k1", Bytes::from("v1"), &opts).await.unwrap();

    let keys = vec!["k1".to_string(), "k2".to_string()];
    let result = cascade.read_multi(&keys, &opts).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result["k1"], Bytes::from("v1"));
    assert_eq!(levels[1].batch_requests(), vec![vec!["k2".to_string()]]);

    // No backfill on the observational path.
    assert!(levels[0].batch_writes().is_empty());
    assert!(levels[1].batch_writes().is_empty());
}

// Writes fan out to every level, one outcome per level in level order.
#[tokio::test]
async fn test_write_outcomes_follow_level_order() {
    let full: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(MemoryLevelConfig {
        default_ttl_secs: None,
        max_entries: Some(0),
    }));
    let cascade = Cascade::new(vec![
        Arc::new(MemoryStore::default()),
        full,
        Arc::new(MemoryStore::default()),
    ]);

    let outcomes = cascade
        .write("k", Bytes::from("v"), &Options::new())
        .await
        .unwrap();
    assert_eq!(outcomes, vec![true, false, true]);

    let outcomes = cascade
        .write_multi(
            &HashMap::from([("k2".to_string(), Bytes::from("v2"))]),
            &Options::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcomes, vec![true, false, true]);
}

// Reads on an empty cascade miss quietly.
#[tokio::test]
async fn test_read_misses_on_empty_cascade() {
    let (_, cascade) = probes(3);
    let opts = Options::new();

    assert_eq!(cascade.read("missing", &opts).await.unwrap(), None);

    let zero_level = Cascade::new(Vec::new());
    assert_eq!(zero_level.read("missing", &opts).await.unwrap(), None);
}

// Deleting an absent key succeeds with per-level "not found".
#[tokio::test]
async fn test_delete_absent_key_reports_not_found_per_level() {
    let (_, cascade) = probes(3);
    let outcomes = cascade.delete("x", &Options::new()).await.unwrap();
    assert_eq!(outcomes, vec![false, false, false]);
}

// A store error aborts the call unmodified; no retry, no wrapping.
#[tokio::test]
async fn test_store_error_propagates() {
    let cascade = Cascade::new(vec![
        Arc::new(MemoryStore::default()),
        Arc::new(FailingStore),
    ]);
    let opts = Options::new();

    let err = cascade.read("k", &opts).await.unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));

    let computes = Arc::new(AtomicUsize::new(0));
    let err = cascade
        .fetch("k", &opts, counting_compute(&computes, "v"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
    assert_eq!(
        computes.load(Ordering::SeqCst),
        0,
        "compute must not run once a level has failed"
    );
}

// Partial fan-out failure: levels written before the failing level stay
// written (self-healing cache, no rollback).
#[tokio::test]
async fn test_partial_write_is_not_rolled_back() {
    let mem = Arc::new(MemoryStore::default());
    let cascade = Cascade::new(vec![mem.clone(), Arc::new(FailingStore)]);
    let opts = Options::new();

    let err = cascade
        .write("k", Bytes::from("v"), &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
    assert_eq!(mem.get("k", &opts).await.unwrap(), Some(Bytes::from("v")));
}

// Options travel to the stores untouched: an `expires_in` written through
// the cascade expires in the memory levels.
#[tokio::test(start_paused = true)]
async fn test_options_pass_through_to_levels() {
    let (levels, cascade) = probes(2);
    let opts = Options::new().with("expires_in", 5);

    cascade.write("k", Bytes::from("v"), &opts).await.unwrap();
    assert!(cascade.read("k", &opts).await.unwrap().is_some());

    tokio::time::advance(std::time::Duration::from_secs(6)).await;
    assert_eq!(cascade.read("k", &opts).await.unwrap(), None);
    assert_eq!(levels[0].inner.len().await, 0);
}
