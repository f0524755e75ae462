//! Wayfarer core library.
//!
//! Streams location-scoped travel content from a push-event server and keeps
//! it in an in-memory catalogue that survives location changes and restarts:
//!
//! - `stream`: push-event text stream decoder
//! - `router`: dispatches decoded events to typed handlers
//! - `catalogue`: section store with upsert-merge semantics and geo-scope pruning
//! - `cache`: durable snapshots keyed by location
//! - `manager`: the `CatalogueManager` facade consumed by front ends
//! - `api`: HTTP transport that opens the push-event stream
//! - `config`: on-disk configuration

pub mod api;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod manager;
pub mod models;
pub mod router;
pub mod stream;

pub use catalogue::{CatalogueSection, CatalogueStore};
pub use manager::{CatalogueManager, RestoreOutcome};
pub use models::{GeoLevel, LocationContext, LocationSummary, Value};
