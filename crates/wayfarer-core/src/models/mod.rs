//! Data models shared by the catalogue, pruning engine and snapshot cache.
//!
//! - `GeoLevel`, `LocationContext`, `StorageKey`: the geographic hierarchy
//! - `LocationSummary`: serialized projection of a location for snapshots
//! - section helpers: reserved metadata keys and per-item `geo_scope`

pub mod location;
pub mod section;

pub use location::{GeoLevel, LocationContext, LocationSummary, StorageKey};
pub use section::{display_title_for, has_items, is_reserved_key, item_geo_scope, root_title, strip_metadata};

/// Dynamic content tree carried by catalogue sections.
///
/// Object keys keep first-insertion order (`preserve_order`), and the soft
/// accessors (`as_str`, `as_object`, `get`) return `None` on shape mismatch.
pub type Value = serde_json::Value;

/// Ordered string-keyed map inside a `Value`.
pub type ValueMap = serde_json::Map<String, Value>;
