//! In-memory catalogue of content sections.
//!
//! `CatalogueStore` holds sections keyed by type with first-arrival ordering
//! and upsert-merge semantics. `pruning` removes content that is no longer
//! geographically valid after a location change.

pub mod pruning;
pub mod store;

pub use pruning::{prune, stale_levels, PruneReport, StaleLevels};
pub use store::{CatalogueSection, CatalogueStore};
