//! Core cache cascade orchestration.
//!
//! This module contains the capability contract and the cascade proxy:
//! - [`backend`]: the `CacheStore` trait every level satisfies, plus the
//!   options bag, fallback closure types, and the shared error type
//! - [`cascade`]: the `Cascade` proxy that sequences reads, writes, and
//!   backfill across an ordered list of levels

pub mod backend;
pub mod cascade;
