//! Geographic hierarchy and location contexts.
//!
//! A `LocationContext` is a coordinate plus the names resolved at each
//! `GeoLevel`. Storage keys derived from those names drive both pruning
//! (which levels diverged between two contexts) and snapshot lookup.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between level names inside a storage key.
const KEY_SEPARATOR: char = '/';

/// Geographic scope, ordered from most general to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeoLevel {
    Country,
    AdminArea,
    SubAdminArea,
    Locality,
    SubLocality,
}

impl GeoLevel {
    /// Every level, most general first.
    pub const ALL: [GeoLevel; 5] = [
        GeoLevel::Country,
        GeoLevel::AdminArea,
        GeoLevel::SubAdminArea,
        GeoLevel::Locality,
        GeoLevel::SubLocality,
    ];

    /// Wire identifier (`country`, `adminArea`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::Country => "country",
            GeoLevel::AdminArea => "adminArea",
            GeoLevel::SubAdminArea => "subAdminArea",
            GeoLevel::Locality => "locality",
            GeoLevel::SubLocality => "subLocality",
        }
    }

    /// Parse a level identifier.
    /// Accepts camelCase and snake_case spellings, case-insensitively.
    pub fn from_identifier(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "country" => Some(GeoLevel::Country),
            "adminarea" => Some(GeoLevel::AdminArea),
            "subadminarea" => Some(GeoLevel::SubAdminArea),
            "locality" => Some(GeoLevel::Locality),
            "sublocality" => Some(GeoLevel::SubLocality),
            _ => None,
        }
    }

    /// Human-readable name for status lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            GeoLevel::Country => "Country",
            GeoLevel::AdminArea => "Region",
            GeoLevel::SubAdminArea => "District",
            GeoLevel::Locality => "City",
            GeoLevel::SubLocality => "Neighbourhood",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key identifying a location at one `GeoLevel`.
///
/// Built from the resolved names of every level up to and including that
/// level, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A coordinate plus the names resolved at each geographic level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationContext {
    pub latitude: f64,
    pub longitude: f64,
    names: BTreeMap<GeoLevel, String>,
}

impl LocationContext {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            names: BTreeMap::new(),
        }
    }

    /// Builder-style setter for a resolved name. Blank names are ignored.
    pub fn with_name(mut self, level: GeoLevel, name: impl Into<String>) -> Self {
        self.set_name(level, name);
        self
    }

    pub fn set_name(&mut self, level: GeoLevel, name: impl Into<String>) {
        let name = name.into();
        if name.trim().is_empty() {
            self.names.remove(&level);
        } else {
            self.names.insert(level, name);
        }
    }

    pub fn name(&self, level: GeoLevel) -> Option<&str> {
        self.names.get(&level).map(String::as_str)
    }

    /// Storage key at `level`, or `None` if that level is unresolved.
    pub fn storage_key(&self, level: GeoLevel) -> Option<StorageKey> {
        self.name(level)?;

        let parts: Vec<String> = self
            .names
            .range(..=level)
            .map(|(_, name)| name.trim().to_lowercase())
            .collect();
        Some(StorageKey(parts.join(&KEY_SEPARATOR.to_string())))
    }

    /// Storage keys for every level, most general first.
    pub fn storage_keys(&self) -> [Option<StorageKey>; 5] {
        GeoLevel::ALL.map(|level| self.storage_key(level))
    }

    /// The most specific resolvable key and its level.
    pub fn canonical_key(&self) -> Option<(StorageKey, GeoLevel)> {
        GeoLevel::ALL
            .iter()
            .rev()
            .find_map(|&level| self.storage_key(level).map(|key| (key, level)))
    }

    /// Most specific resolved name, for display.
    pub fn display_name(&self) -> Option<&str> {
        self.names.values().next_back().map(String::as_str)
    }

    pub fn summary(&self) -> LocationSummary {
        LocationSummary {
            lat: self.latitude,
            lon: self.longitude,
            resolved_names_by_level: self
                .names
                .iter()
                .map(|(level, name)| (level.as_str().to_string(), name.clone()))
                .collect(),
        }
    }
}

/// Serialized projection of a `LocationContext` stored alongside snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub resolved_names_by_level: BTreeMap<String, String>,
}

impl LocationSummary {
    /// Rebuild a context from the summary. Unknown level identifiers are dropped.
    pub fn to_location(&self) -> LocationContext {
        let mut location = LocationContext::new(self.lat, self.lon);
        for (level, name) in &self.resolved_names_by_level {
            if let Some(level) = GeoLevel::from_identifier(level) {
                location.set_name(level, name.clone());
            }
        }
        location
    }

    /// Names joined most specific first, e.g. "Shenzhen, Guangdong, China".
    pub fn label(&self) -> String {
        let location = self.to_location();
        let names: Vec<&str> = GeoLevel::ALL
            .iter()
            .rev()
            .filter_map(|&level| location.name(level))
            .collect();
        if names.is_empty() {
            format!("{:.4}, {:.4}", self.lat, self.lon)
        } else {
            names.join(", ")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
