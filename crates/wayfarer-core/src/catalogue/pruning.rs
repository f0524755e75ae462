//! Geo-scope pruning.
//!
//! When the location changes, content scoped at a level whose storage key
//! diverged (or at any more specific level) is removed. Items without a
//! readable `geo_scope` are removed on every change.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::store::CatalogueStore;
use crate::models::{is_reserved_key, item_geo_scope, GeoLevel, LocationContext, Value};

/// Levels whose content can no longer be trusted after a location change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleLevels(BTreeSet<GeoLevel>);

impl StaleLevels {
    pub fn contains(&self, level: GeoLevel) -> bool {
        self.0.contains(&level)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Most general stale level, i.e. where the two locations diverged.
    pub fn divergence(&self) -> Option<GeoLevel> {
        self.0.iter().next().copied()
    }

    pub fn levels(&self) -> impl Iterator<Item = GeoLevel> + '_ {
        self.0.iter().copied()
    }
}

/// Outcome of one pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// The store was cleared because there was no previous location.
    pub cleared: bool,
    pub stale: StaleLevels,
    pub removed_items: usize,
    pub removed_sections: Vec<String>,
}

/// Compare storage keys level by level, most general first.
///
/// A level is stale when its keys differ (absent vs present counts as a
/// difference) or when a more general level is already stale.
pub fn stale_levels(old: &LocationContext, new: &LocationContext) -> StaleLevels {
    let old_keys = old.storage_keys();
    let new_keys = new.storage_keys();

    let mut stale = BTreeSet::new();
    for (i, level) in GeoLevel::ALL.iter().enumerate() {
        if !stale.is_empty() || old_keys[i] != new_keys[i] {
            stale.insert(*level);
        }
    }
    StaleLevels(stale)
}

fn is_stale_item(item: &Value, stale: &StaleLevels) -> bool {
    match item_geo_scope(item) {
        Some(level) => stale.contains(level),
        None => true,
    }
}

/// Prune `store` for a move from `old` to `new`.
///
/// Must run against the previous location, before the new one is recorded
/// and before any content for it is merged. With no previous location the
/// store is cleared.
pub fn prune(store: &mut CatalogueStore, old: Option<&LocationContext>, new: &LocationContext) -> PruneReport {
    let Some(old) = old else {
        info!(sections = store.len(), "No previous location, clearing catalogue");
        store.clear_all();
        return PruneReport {
            cleared: true,
            stale: StaleLevels(GeoLevel::ALL.into_iter().collect()),
            ..PruneReport::default()
        };
    };

    let stale = stale_levels(old, new);
    if stale.is_empty() {
        debug!("Location unchanged at every level, nothing to prune");
        return PruneReport::default();
    }

    let mut report = PruneReport {
        stale,
        ..PruneReport::default()
    };

    for section_type in store.section_types() {
        let Some(section) = store.get_mut(&section_type) else {
            continue;
        };
        let Value::Object(content) = &mut section.content else {
            continue;
        };

        let before = content.len();
        let stale = &report.stale;
        content.retain(|key, item| is_reserved_key(key) || !is_stale_item(item, stale));
        report.removed_items += before - content.len();

        if !content.keys().any(|k| !is_reserved_key(k)) {
            store.remove(&section_type);
            report.removed_sections.push(section_type);
        }
    }

    info!(
        divergence = ?report.stale.divergence(),
        removed_items = report.removed_items,
        removed_sections = report.removed_sections.len(),
        "Pruned stale catalogue content"
    );
    report
}

// ============================================================================
// Tests
// ============================================================================
