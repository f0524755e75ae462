use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::catalogue::CatalogueSection;
use crate::models::{GeoLevel, LocationContext, LocationSummary, StorageKey, Value};

/// File holding the most recently persisted snapshot.
const LAST_CONTEXT_FILE: &str = "last_context.json";

/// Prefix for per-location snapshot files.
const SNAPSHOT_PREFIX: &str = "snapshot_";

/// Default age after which a snapshot is ignored on restore.
/// A week keeps trip content around across short gaps without serving very old lists.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 168;

/// Serialized projection of a catalogue section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSection {
    pub section_type: String,
    pub display_title: String,
    pub content: Value,
}

impl From<&CatalogueSection> for CachedSection {
    fn from(section: &CatalogueSection) -> Self {
        Self {
            section_type: section.section_type.clone(),
            display_title: section.display_title.clone(),
            content: section.content.clone(),
        }
    }
}

impl From<CachedSection> for CatalogueSection {
    fn from(cached: CachedSection) -> Self {
        CatalogueSection::new(cached.section_type, cached.display_title, cached.content)
    }
}

/// A persisted catalogue for one location.
///
/// The last-context pointer uses the same shape; its `geo_key` and `level`
/// are absent when the location had no resolvable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    #[serde(default)]
    pub geo_key: Option<String>,
    #[serde(default)]
    pub level: Option<GeoLevel>,
    pub saved_at: DateTime<Utc>,
    pub section_order: Vec<String>,
    pub sections: Vec<CachedSection>,
    pub location_summary: LocationSummary,
}

impl CachedSnapshot {
    pub fn new(sections: &[CatalogueSection], order: &[String], location: &LocationContext) -> Self {
        let (geo_key, level) = match location.canonical_key() {
            Some((key, level)) => (Some(key.into_string()), Some(level)),
            None => (None, None),
        };
        Self {
            geo_key,
            level,
            saved_at: Utc::now(),
            section_order: order.to_vec(),
            sections: sections.iter().map(CachedSection::from).collect(),
            location_summary: location.summary(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.saved_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Covers clock skew too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_older_than(&self, max_age: Duration) -> bool {
        Utc::now() - self.saved_at > max_age
    }

    /// Sections in `section_order`. Sections missing from the order list are
    /// appended; order entries without a section are skipped.
    pub fn ordered_sections(&self) -> Vec<&CachedSection> {
        let mut ordered: Vec<&CachedSection> = self
            .section_order
            .iter()
            .filter_map(|t| self.sections.iter().find(|s| &s.section_type == t))
            .collect();
        for section in &self.sections {
            if !self.section_order.contains(&section.section_type) {
                ordered.push(section);
            }
        }
        ordered
    }

    fn matches(&self, key: &StorageKey, level: GeoLevel) -> bool {
        self.geo_key.as_deref() == Some(key.as_str()) && self.level == Some(level)
    }
}

/// Durable catalogue snapshots keyed by location.
///
/// Writes are serialized, and a snapshot never replaces one with a later
/// `saved_at` at the same path.
pub struct CacheManager {
    cache_dir: PathBuf,
    max_age: Duration,
    /// `saved_at` of the newest snapshot written to each path.
    written: Mutex<HashMap<PathBuf, DateTime<Utc>>>,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        Ok(Self {
            cache_dir,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
            written: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age = Duration::hours(hours);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn snapshot_path(&self, key: &str, level: GeoLevel) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}_{}.json", SNAPSHOT_PREFIX, level.as_str(), encode_key(key)))
    }

    fn last_context_path(&self) -> PathBuf {
        self.cache_dir.join(LAST_CONTEXT_FILE)
    }

    fn load(&self, path: &Path) -> Result<Option<CachedSnapshot>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;

        let snapshot: CachedSnapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        Ok(Some(snapshot))
    }

    /// Write through a uniquely named temporary file, then rename it into
    /// place. Returns `Ok(false)` when a newer snapshot already went to `path`.
    fn save(&self, path: &Path, snapshot: &CachedSnapshot) -> Result<bool> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(newest) = written.get(path) {
            if *newest > snapshot.saved_at {
                debug!(path = %path.display(), "Newer snapshot already on disk, skipping write");
                return Ok(false);
            }
        }

        let contents = serde_json::to_string_pretty(snapshot)?;
        let mut temp = NamedTempFile::new_in(&self.cache_dir)
            .with_context(|| format!("Failed to create temporary file in: {}", self.cache_dir.display()))?;
        temp.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write cache file: {}", temp.path().display()))?;
        temp.persist(path)
            .with_context(|| format!("Failed to move cache file into place: {}", path.display()))?;

        written.insert(path.to_path_buf(), snapshot.saved_at);
        Ok(true)
    }

    /// Persist a catalogue copy for `location` and update the last-context
    /// pointer. Returns `Ok(false)` without writing when `sections` is empty.
    pub fn persist(&self, sections: &[CatalogueSection], order: &[String], location: &LocationContext) -> Result<bool> {
        self.persist_snapshot(&CachedSnapshot::new(sections, order, location))
    }

    /// Write an already taken snapshot to its location file and the
    /// last-context pointer.
    ///
    /// `saved_at` orders the writes: a snapshot older than the one already
    /// written to a file leaves that file alone. Returns `Ok(false)` when
    /// nothing was written.
    pub fn persist_snapshot(&self, snapshot: &CachedSnapshot) -> Result<bool> {
        if snapshot.sections.is_empty() {
            debug!("Nothing to persist");
            return Ok(false);
        }

        let mut wrote = false;
        match (&snapshot.geo_key, snapshot.level) {
            (Some(key), Some(level)) => {
                if self.save(&self.snapshot_path(key, level), snapshot)? {
                    info!(geo_key = %key, %level, sections = snapshot.sections.len(), "Persisted catalogue snapshot");
                    wrote = true;
                }
            }
            _ => debug!("Location has no resolved names, only updating last context"),
        }

        wrote |= self.save(&self.last_context_path(), snapshot)?;
        Ok(wrote)
    }

    /// Look up the snapshot for `location`. Read or decode errors are misses.
    pub fn restore(&self, location: &LocationContext) -> Option<CachedSnapshot> {
        let (key, level) = location.canonical_key()?;
        let path = self.snapshot_path(key.as_str(), level);

        let snapshot = match self.load(&path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(geo_key = %key, %level, "No cached snapshot");
                return None;
            }
            Err(e) => {
                warn!(geo_key = %key, error = %e, "Failed to load cached snapshot, treating as miss");
                return None;
            }
        };

        if !snapshot.matches(&key, level) {
            warn!(geo_key = %key, cached = ?snapshot.geo_key, "Cached snapshot key mismatch, treating as miss");
            return None;
        }
        self.fresh(snapshot)
    }

    /// Read the most recently persisted snapshot, for a location-less start.
    pub fn restore_last_context(&self) -> Option<CachedSnapshot> {
        match self.load(&self.last_context_path()) {
            Ok(Some(snapshot)) => self.fresh(snapshot),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load last context, treating as miss");
                None
            }
        }
    }

    /// Remove every snapshot and the last-context pointer.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let is_cache_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == LAST_CONTEXT_FILE || (n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(".json")))
                .unwrap_or(false);
            if is_cache_file {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache file: {}", path.display()))?;
                removed += 1;
            }
        }
        info!(removed, "Cleared catalogue cache");
        Ok(removed)
    }

    fn fresh(&self, snapshot: CachedSnapshot) -> Option<CachedSnapshot> {
        if snapshot.is_older_than(self.max_age) {
            debug!(age = %snapshot.age_display(), "Cached snapshot expired");
            None
        } else {
            Some(snapshot)
        }
    }
}

/// Make a storage key safe for use in a file name. Injective: every byte
/// outside `[a-z0-9]` becomes `-xx` hex.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "-{:02x}", byte);
        }
    }
    encoded
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shenzhen() -> LocationContext {
        LocationContext::new(22.54, 114.06)
            .with_name(GeoLevel::Country, "China")
            .with_name(GeoLevel::AdminArea, "Guangdong")
            .with_name(GeoLevel::Locality, "Shenzhen")
    }

    fn sections() -> (Vec<CatalogueSection>, Vec<String>) {
        let sections = vec![
            CatalogueSection::new("overview", "Overview", json!({"intro": {"text": "Hi"}})),
            CatalogueSection::new("cuisine", "Cuisine", json!({"dim_sum": {"name": "Dim sum"}})),
        ];
        let order = vec!["overview".to_string(), "cuisine".to_string()];
        (sections, order)
    }

    fn manager() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_persist_and_restore() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        assert!(cache.persist(&sections, &order, &shenzhen()).unwrap());

        let snapshot = cache.restore(&shenzhen()).unwrap();
        assert_eq!(snapshot.geo_key.as_deref(), Some("china/guangdong/shenzhen"));
        assert_eq!(snapshot.level, Some(GeoLevel::Locality));
        assert_eq!(snapshot.section_order, order);
        assert_eq!(snapshot.sections[1].content, sections[1].content);
    }

    #[test]
    fn test_persist_empty_is_noop() {
        let (_dir, cache) = manager();
        assert!(!cache.persist(&[], &[], &shenzhen()).unwrap());
        assert!(cache.restore_last_context().is_none());
    }

    #[test]
    fn test_restore_miss_for_other_location() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        cache.persist(&sections, &order, &shenzhen()).unwrap();

        let other = LocationContext::new(31.23, 121.47)
            .with_name(GeoLevel::Country, "China")
            .with_name(GeoLevel::AdminArea, "Shanghai")
            .with_name(GeoLevel::Locality, "Shanghai");
        assert!(cache.restore(&other).is_none());
    }

    #[test]
    fn test_corrupt_file_is_miss() {
        let (_dir, cache) = manager();
        let (key, level) = shenzhen().canonical_key().unwrap();
        std::fs::write(cache.snapshot_path(key.as_str(), level), "{ not json").unwrap();
        assert!(cache.restore(&shenzhen()).is_none());
    }

    #[test]
    fn test_last_context_written_without_names() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        let unnamed = LocationContext::new(1.5, 2.5);
        cache.persist(&sections, &order, &unnamed).unwrap();

        let snapshot = cache.restore_last_context().unwrap();
        assert!(snapshot.geo_key.is_none());
        assert_eq!(snapshot.location_summary.lat, 1.5);
        assert!(cache.restore(&unnamed).is_none());
    }

    #[test]
    fn test_expired_snapshot_is_miss() {
        let (_dir, cache) = manager();
        let cache = cache.with_max_age_hours(1);
        let (sections, order) = sections();
        let mut snapshot = CachedSnapshot::new(&sections, &order, &shenzhen());
        snapshot.saved_at = Utc::now() - Duration::hours(2);
        assert!(cache.save(&cache.last_context_path(), &snapshot).unwrap());
        assert!(cache.restore_last_context().is_none());
    }

    #[test]
    fn test_older_snapshot_does_not_replace_newer() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        let older = CachedSnapshot::new(&sections[..1], &order, &shenzhen());
        let mut newer = CachedSnapshot::new(&sections, &order, &shenzhen());
        newer.saved_at = older.saved_at + Duration::milliseconds(1);

        // Newer lands first, as when two background writes finish out of order
        assert!(cache.persist_snapshot(&newer).unwrap());
        assert!(!cache.persist_snapshot(&older).unwrap());

        assert_eq!(cache.restore(&shenzhen()).unwrap().sections.len(), 2);
        assert_eq!(cache.restore_last_context().unwrap().sections.len(), 2);
    }

    #[test]
    fn test_concurrent_writes_keep_newest() {
        let (_dir, cache) = manager();
        let cache = std::sync::Arc::new(cache);
        let big = Value::Object(
            (0..2000)
                .map(|i| (format!("item_{}", i), json!({"name": i})))
                .collect(),
        );
        let older = CachedSnapshot::new(
            &[CatalogueSection::new("a", "A", big.clone())],
            &["a".to_string()],
            &shenzhen(),
        );
        let mut newer = CachedSnapshot::new(
            &[CatalogueSection::new("a", "A", big), CatalogueSection::new("b", "B", json!({"k": 1}))],
            &["a".to_string(), "b".to_string()],
            &shenzhen(),
        );
        newer.saved_at = older.saved_at + Duration::milliseconds(1);

        let writers: Vec<_> = [older, newer]
            .into_iter()
            .map(|snapshot| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.persist_snapshot(&snapshot).unwrap())
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = cache.restore_last_context().unwrap();
        assert_eq!(last.section_order, vec!["a", "b"]);
        assert_eq!(cache.restore(&shenzhen()).unwrap().sections.len(), 2);

        let leftovers: Vec<_> = std::fs::read_dir(cache.cache_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().ends_with(".json"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_persist_into_missing_dir_is_error() {
        let (_dir, cache) = manager();
        std::fs::remove_dir_all(cache.cache_dir()).unwrap();
        let (sections, order) = sections();
        assert!(cache.persist(&sections, &order, &shenzhen()).is_err());
        assert!(cache.restore_last_context().is_none());
    }

    #[test]
    fn test_restore_rejects_mismatched_key() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        let mut snapshot = CachedSnapshot::new(&sections, &order, &shenzhen());
        snapshot.geo_key = Some("china/guangdong/guangzhou".to_string());
        let (key, level) = shenzhen().canonical_key().unwrap();
        assert!(cache.save(&cache.snapshot_path(key.as_str(), level), &snapshot).unwrap());
        assert!(cache.restore(&shenzhen()).is_none());

        snapshot.geo_key = Some(key.as_str().to_string());
        snapshot.level = Some(GeoLevel::AdminArea);
        assert!(cache.save(&cache.snapshot_path(key.as_str(), level), &snapshot).unwrap());
        assert!(cache.restore(&shenzhen()).is_none());
    }

    #[test]
    fn test_snapshot_file_shape() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        cache.persist(&sections, &order, &shenzhen()).unwrap();

        let raw = std::fs::read_to_string(cache.last_context_path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["level"], "locality");
        assert_eq!(value["sectionOrder"], json!(["overview", "cuisine"]));
        assert_eq!(value["sections"][0]["sectionType"], "overview");
        assert_eq!(value["locationSummary"]["resolvedNamesByLevel"]["adminArea"], "Guangdong");
        assert!(value["savedAt"].is_string());
    }

    #[test]
    fn test_clear_removes_snapshots() {
        let (_dir, cache) = manager();
        let (sections, order) = sections();
        cache.persist(&sections, &order, &shenzhen()).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.restore(&shenzhen()).is_none());
        assert!(cache.restore_last_context().is_none());
    }

    #[test]
    fn test_ordered_sections_follow_order_list() {
        let (sections, _) = sections();
        let order = vec!["cuisine".to_string(), "missing".to_string()];
        let snapshot = CachedSnapshot::new(&sections, &order, &shenzhen());
        let types: Vec<&str> = snapshot
            .ordered_sections()
            .iter()
            .map(|s| s.section_type.as_str())
            .collect();
        assert_eq!(types, vec!["cuisine", "overview"]);
    }

    #[test]
    fn test_encode_key_is_filename_safe() {
        assert_eq!(encode_key("china/guangdong"), "china-2fguangdong");
        assert_eq!(encode_key("a-b"), "a-2db");
    }

    #[test]
    fn test_age_display_just_now() {
        let (sections, order) = sections();
        let snapshot = CachedSnapshot::new(&sections, &order, &shenzhen());
        assert_eq!(snapshot.age_display(), "just now");
    }
}
