//! Replays captured push-event bursts through decoder, router and manager.

use std::convert::Infallible;

use futures::stream;
use serde_json::json;
use wayfarer_core::cache::CacheManager;
use wayfarer_core::router;
use wayfarer_core::stream::decode;
use wayfarer_core::{CatalogueManager, GeoLevel, LocationContext, RestoreOutcome};

const SHENZHEN_BURST: &str = "\
event: notification
data: {\"message\": \"Loading Shenzhen\"}

event: content
data: {\"text\": \"Shenzhen is a \"}

event: content
data: {\"text\": \"coastal city.\"}

: keep-alive

event: catalogue
id: 1
data: {\"cuisine\": {\"_title\": \"Local Cuisine\",
data:   \"chinese\": {\"name\": \"Chinese cuisine\", \"_metadata\": {\"geo_scope\": \"country\"}},
data:   \"cantonese\": {\"name\": \"Cantonese cuisine\", \"_metadata\": {\"geo_scope\": \"adminArea\"}}},
data:  \"points_of_interest\": {\"lianhuashan\": {\"name\": \"Lianhuashan Park\", \"_metadata\": {\"geo_scope\": \"locality\"}}}}

event: catalogue
data: {this is not json}

event: CATALOGUE
id: 2
data: {\"overview\": {\"intro\": {\"text\": \"Unscoped intro\"}}}

event: finish
data: {\"reason\": \"complete\"}

";

const SHANGHAI_BURST: &str = "\
event: catalogue
data: {\"cuisine\": {\"benbang\": {\"name\": \"Shanghainese cuisine\", \"_metadata\": {\"geo_scope\": \"adminArea\"}}}}

event: finish
data:

";

fn chunked(text: &'static str) -> impl futures::Stream<Item = Result<&'static [u8], Infallible>> {
    stream::iter(text.as_bytes().chunks(17).map(Ok).collect::<Vec<_>>())
}

fn location(admin: &str, locality: &str) -> LocationContext {
    LocationContext::new(0.0, 0.0)
        .with_name(GeoLevel::Country, "China")
        .with_name(GeoLevel::AdminArea, admin)
        .with_name(GeoLevel::Locality, locality)
}

fn section_types(manager: &CatalogueManager) -> Vec<String> {
    manager
        .ordered_sections()
        .iter()
        .map(|s| s.section_type.clone())
        .collect()
}

fn contents(manager: &CatalogueManager) -> Vec<(String, serde_json::Value)> {
    manager
        .ordered_sections()
        .iter()
        .map(|s| (s.section_type.clone(), s.content.clone()))
        .collect()
}

#[tokio::test]
async fn test_location_change_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = CatalogueManager::with_cache(CacheManager::new(dir.path().to_path_buf()).unwrap());

    let shenzhen = location("Guangdong", "Shenzhen");
    manager.set_location(shenzhen.clone(), true);
    let stats = router::run(decode(chunked(SHENZHEN_BURST)), &mut manager).await.unwrap();
    assert_eq!(stats.skipped, 1);
    assert!(manager.feed().finished);
    assert_eq!(manager.feed().narrative, "Shenzhen is a coastal city.");
    assert_eq!(section_types(&manager), vec!["cuisine", "points_of_interest", "overview"]);
    assert_eq!(manager.store().get("cuisine").unwrap().display_title, "Local Cuisine");

    manager.persist_current_state(None).unwrap().await.unwrap();
    let shenzhen_contents = contents(&manager);

    // Move to Shanghai: country-scoped content survives, the rest is pruned
    let shanghai = location("Shanghai", "Shanghai");
    manager.set_location(shanghai.clone(), true);
    assert_eq!(section_types(&manager), vec!["cuisine"]);
    assert!(manager.feed().narrative.is_empty());

    router::run(decode(chunked(SHANGHAI_BURST)), &mut manager).await.unwrap();
    let cuisine = &manager.store().get("cuisine").unwrap().content;
    assert!(cuisine.get("chinese").is_some());
    assert!(cuisine.get("benbang").is_some());
    assert!(cuisine.get("cantonese").is_none());

    // Round trip back to Shenzhen reuses the snapshot
    manager.set_location(shenzhen.clone(), true);
    let outcome = manager.restore_from_cache(Some(&shenzhen)).await;
    assert!(matches!(outcome, RestoreOutcome::Hit { .. }));
    assert_eq!(section_types(&manager), vec!["cuisine", "points_of_interest", "overview"]);
    assert_eq!(contents(&manager), shenzhen_contents);
}

#[tokio::test]
async fn test_cold_start_restores_last_context() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut manager = CatalogueManager::with_cache(CacheManager::new(dir.path().to_path_buf()).unwrap());
        manager.set_location(location("Guangdong", "Shenzhen"), true);
        router::run(decode(chunked(SHENZHEN_BURST)), &mut manager).await.unwrap();
        manager.persist_current_state(None).unwrap().await.unwrap();
    }

    let mut manager = CatalogueManager::with_cache(CacheManager::new(dir.path().to_path_buf()).unwrap());
    assert!(manager.ordered_sections().is_empty());
    manager.restore_from_cache(None).await;

    assert_eq!(manager.ordered_sections().len(), 3);
    let summary = manager.location_summary().unwrap();
    assert_eq!(summary.resolved_names_by_level.get("locality").map(String::as_str), Some("Shenzhen"));
    assert_eq!(
        manager.store().get("overview").unwrap().content,
        json!({"intro": {"text": "Unscoped intro"}})
    );
}
