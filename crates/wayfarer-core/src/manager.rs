//! Catalogue state management for front ends.
//!
//! `CatalogueManager` owns the catalogue store and the current location, and
//! exposes the command/query surface a renderer needs. Every store mutation
//! goes through `&mut self`, so upserts, pruning, clearing and restore merges
//! never interleave. Snapshot writes run in the background on an owned copy.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CachedSnapshot};
use crate::catalogue::{prune, CatalogueSection, CatalogueStore, PruneReport};
use crate::models::{LocationContext, LocationSummary, Value};
use crate::router::{EventHandler, MapMarker, Notification, RoutedEvent};

/// Non-catalogue state accumulated from the current burst.
#[derive(Debug, Clone, Default)]
pub struct StreamFeed {
    /// Narrative text built from `content` deltas.
    pub narrative: String,
    pub notification: Option<Notification>,
    pub markers: Vec<MapMarker>,
    /// Rendering config per section type.
    pub interfaces: HashMap<String, Value>,
    /// Set when the server signals the end of the burst.
    pub finished: bool,
}

/// Result of merging a cached snapshot into the live catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Hit {
        sections: usize,
        items_added: usize,
        age: String,
    },
    Miss,
}

pub struct CatalogueManager {
    store: CatalogueStore,
    location: Option<LocationContext>,
    location_from_device: bool,
    restored_summary: Option<LocationSummary>,
    cache: Option<Arc<CacheManager>>,
    feed: StreamFeed,
}

impl Default for CatalogueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogueManager {
    /// Manager without persistence.
    pub fn new() -> Self {
        Self {
            store: CatalogueStore::new(),
            location: None,
            location_from_device: false,
            restored_summary: None,
            cache: None,
            feed: StreamFeed::default(),
        }
    }

    pub fn with_cache(cache: CacheManager) -> Self {
        Self {
            cache: Some(Arc::new(cache)),
            ..Self::new()
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn ordered_sections(&self) -> Vec<&CatalogueSection> {
        self.store.ordered_sections()
    }

    pub fn store(&self) -> &CatalogueStore {
        &self.store
    }

    pub fn location(&self) -> Option<&LocationContext> {
        self.location.as_ref()
    }

    pub fn is_location_from_device(&self) -> bool {
        self.location_from_device
    }

    /// Summary of the current location, or of the restored last context.
    pub fn location_summary(&self) -> Option<LocationSummary> {
        self.location
            .as_ref()
            .map(LocationContext::summary)
            .or_else(|| self.restored_summary.clone())
    }

    pub fn feed(&self) -> &StreamFeed {
        &self.feed
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub fn handle_catalogue_update(&mut self, section_type: &str, display_title: &str, content: Value) {
        self.store.upsert(section_type, display_title, content);
    }

    pub fn remove_section(&mut self, section_type: &str) -> Option<CatalogueSection> {
        self.store.remove(section_type)
    }

    /// Drop all content and forget the current location.
    pub fn reset(&mut self) {
        self.store.clear_all();
        self.location = None;
        self.location_from_device = false;
        self.restored_summary = None;
        self.feed = StreamFeed::default();
    }

    /// Prune content that is not valid at `new_location`, comparing against
    /// the location recorded now. Does not record `new_location`.
    pub fn prune_stale_items(&mut self, new_location: &LocationContext) -> PruneReport {
        prune(&mut self.store, self.location.as_ref(), new_location)
    }

    /// Adopt a new location: prune against the previous one, then record it.
    pub fn set_location(&mut self, location: LocationContext, is_from_device: bool) -> PruneReport {
        let report = self.prune_stale_items(&location);
        if report.cleared || !report.stale.is_empty() {
            self.feed = StreamFeed::default();
        }

        debug!(
            location = ?location.display_name(),
            from_device = is_from_device,
            "Recording current location"
        );
        self.location = Some(location);
        self.location_from_device = is_from_device;
        self.restored_summary = None;
        report
    }

    /// Snapshot the catalogue now and write it in the background.
    ///
    /// Uses `location`, or the current location when `None`. Returns `None`
    /// when there is no cache, no location, or nothing to save. Write errors
    /// are logged. Outside a Tokio runtime the write happens inline and
    /// `None` is returned. Snapshots taken later win over earlier ones that
    /// finish writing after them.
    pub fn persist_current_state(&self, location: Option<&LocationContext>) -> Option<JoinHandle<()>> {
        let cache = self.cache.clone()?;
        let location = location.or(self.location.as_ref())?;
        if self.store.is_empty() {
            return None;
        }

        let (sections, order) = self.store.snapshot();
        let snapshot = CachedSnapshot::new(&sections, &order, location);
        match Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn_blocking(move || write_snapshot(&cache, &snapshot))),
            Err(_) => {
                debug!("No async runtime, writing snapshot inline");
                write_snapshot(&cache, &snapshot);
                None
            }
        }
    }

    /// Merge a cached snapshot into the live catalogue without overwriting
    /// live content.
    ///
    /// With a location, the snapshot for that location is used. Without one,
    /// the last persisted context is used, and its location becomes current
    /// if none is recorded yet so the next location change prunes against it.
    pub async fn restore_from_cache(&mut self, location: Option<&LocationContext>) -> RestoreOutcome {
        let Some(cache) = self.cache.clone() else {
            return RestoreOutcome::Miss;
        };

        let lookup = match location {
            Some(location) => {
                let location = location.clone();
                tokio::task::spawn_blocking(move || cache.restore(&location)).await
            }
            None => tokio::task::spawn_blocking(move || cache.restore_last_context()).await,
        };

        let snapshot = match lookup {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return RestoreOutcome::Miss,
            Err(e) => {
                warn!(error = %e, "Cache restore task failed, treating as miss");
                return RestoreOutcome::Miss;
            }
        };

        let outcome = self.merge_snapshot(&snapshot);

        if location.is_none() {
            if self.location.is_none() {
                self.location = Some(snapshot.location_summary.to_location());
                self.location_from_device = false;
            }
            self.restored_summary = Some(snapshot.location_summary);
        }
        outcome
    }

    fn merge_snapshot(&mut self, snapshot: &CachedSnapshot) -> RestoreOutcome {
        let mut sections = 0;
        let mut items_added = 0;
        for cached in snapshot.ordered_sections() {
            let added = self
                .store
                .fill_gaps(&cached.section_type, &cached.display_title, cached.content.clone());
            if added > 0 {
                sections += 1;
                items_added += added;
            }
        }

        info!(
            geo_key = ?snapshot.geo_key,
            sections,
            items_added,
            age = %snapshot.age_display(),
            "Restored catalogue from cache"
        );
        RestoreOutcome::Hit {
            sections,
            items_added,
            age: snapshot.age_display(),
        }
    }
}

fn write_snapshot(cache: &CacheManager, snapshot: &CachedSnapshot) {
    if let Err(e) = cache.persist_snapshot(snapshot) {
        warn!(error = %e, "Failed to persist catalogue snapshot");
    }
}

impl EventHandler for CatalogueManager {
    fn handle(&mut self, event: RoutedEvent) {
        match event {
            RoutedEvent::Catalogue(updates) => {
                for update in updates {
                    self.handle_catalogue_update(&update.section_type, &update.display_title, update.content);
                }
            }
            RoutedEvent::Content(delta) => self.feed.narrative.push_str(&delta.text),
            RoutedEvent::Notification(notification) => {
                info!(message = %notification.message, level = ?notification.level, "Server notification");
                self.feed.notification = Some(notification);
            }
            RoutedEvent::Finish(finish) => {
                debug!(reason = ?finish.reason, "Burst finished");
                self.feed.finished = true;
            }
            RoutedEvent::Map(update) => self.feed.markers = update.markers,
            RoutedEvent::Interface(update) => {
                self.feed.interfaces.insert(update.section_type, update.config);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
