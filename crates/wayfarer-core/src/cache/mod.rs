//! Durable catalogue snapshots.
//!
//! `CacheManager` stores one JSON snapshot per location, keyed by the most
//! specific resolvable storage key, plus a `last_context.json` pointer used
//! when no location is known yet. Snapshots older than the configured age
//! are ignored. Read failures are treated as cache misses.

pub mod manager;

pub use manager::{CacheManager, CachedSection, CachedSnapshot, DEFAULT_MAX_AGE_HOURS};
