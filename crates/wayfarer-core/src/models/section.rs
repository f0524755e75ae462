//! Helpers for catalogue content trees.
//!
//! Keys starting with `_` are metadata, not content items. Items carry their
//! own `_metadata` object with a `geo_scope` and rendering config; section
//! roots may carry metadata such as `_title`.

use super::{GeoLevel, Value};

/// Prefix marking metadata keys at any depth.
pub const RESERVED_PREFIX: char = '_';

/// Per-item metadata key.
pub const METADATA_KEY: &str = "_metadata";

/// Geo scope field inside an item's metadata.
pub const GEO_SCOPE_KEY: &str = "geo_scope";

/// Optional display title at a section root.
pub const TITLE_KEY: &str = "_title";

pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// True if `content` is a map with at least one non-metadata key.
pub fn has_items(content: &Value) -> bool {
    content
        .as_object()
        .map(|map| map.keys().any(|k| !is_reserved_key(k)))
        .unwrap_or(false)
}

/// Read an item's `geo_scope`, or `None` when the item is unscoped.
///
/// `_metadata` may be an object or a string holding a JSON object.
pub fn item_geo_scope(item: &Value) -> Option<GeoLevel> {
    let metadata = item.get(METADATA_KEY)?;
    let scope = match metadata {
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw).ok()?;
            parsed.get(GEO_SCOPE_KEY)?.as_str()?.to_string()
        }
        other => other.get(GEO_SCOPE_KEY)?.as_str()?.to_string(),
    };
    GeoLevel::from_identifier(&scope)
}

/// Copy of `value` with every reserved key removed, recursively.
/// Used at the render boundary; the store keeps metadata embedded.
pub fn strip_metadata(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !is_reserved_key(k))
                .map(|(k, v)| (k.clone(), strip_metadata(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_metadata).collect()),
        other => other.clone(),
    }
}

/// Non-blank `_title` at the section root.
pub fn root_title(content: &Value) -> Option<&str> {
    content
        .get(TITLE_KEY)
        .and_then(Value::as_str)
        .filter(|title| !title.trim().is_empty())
}

/// Title for a section: the root `_title` if present, else the section type
/// title-cased ("points_of_interest" -> "Points Of Interest").
pub fn display_title_for(section_type: &str, content: &Value) -> String {
    if let Some(title) = root_title(content) {
        return title.to_string();
    }

    section_type
        .split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
