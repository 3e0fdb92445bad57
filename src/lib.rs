//! cache-cascade: a multi-level cache built by composing ordered backends.
//!
//! A [`Cascade`] chains independent cache stores (levels): earlier levels
//! are checked first, later levels act as backing stores, and partial hits
//! backfill the levels that missed. A cascade is itself a [`CacheStore`],
//! so cascades nest as levels of other cascades.
//!
//! The crate ships two reference stores — in-memory (TTL, optional bound)
//! and on-disk (sharded files, optional zstd) — but any type implementing
//! [`CacheStore`] can serve as a level.

pub mod cache;
pub mod config;
pub mod store;

pub use cache::backend::{
    compute_once, compute_per_key, CacheError, CacheResult, CacheStore, Compute, KeyedCompute,
    Options,
};
pub use cache::cascade::Cascade;
pub use store::build_cascade;
pub use store::disk::DiskStore;
pub use store::memory::MemoryStore;
