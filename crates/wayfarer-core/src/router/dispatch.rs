use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::RouteError;
use super::payloads::{
    section_updates, ContentDelta, Finish, InterfaceUpdate, MapUpdate, Notification, SectionUpdate,
};
use crate::models::Value;
use crate::stream::{Event, StreamError};

/// Event names that carry catalogue section updates.
const CATALOGUE_EVENTS: &[&str] = &["catalogue", "catalog", "catalogue_update"];

/// A validated event ready for its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    Notification(Notification),
    Content(ContentDelta),
    Finish(Finish),
    Map(MapUpdate),
    Interface(InterfaceUpdate),
    Catalogue(Vec<SectionUpdate>),
}

/// Consumer of routed events.
///
/// `handle` runs to completion before the next event is pulled, so handlers
/// observe events in strict arrival order.
pub trait EventHandler {
    fn handle(&mut self, event: RoutedEvent);
}

/// Counts from one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub applied: usize,
    pub ignored: usize,
    pub skipped: usize,
}

fn parse<T: DeserializeOwned>(name: &str, data: &str) -> Result<T, RouteError> {
    serde_json::from_str(data).map_err(|e| {
        if e.is_data() {
            RouteError::invalid_payload(name, e.to_string())
        } else {
            RouteError::invalid_json(name, e)
        }
    })
}

/// Validate one event. `Ok(None)` means the event type is not recognized.
pub fn route(event: &Event) -> Result<Option<RoutedEvent>, RouteError> {
    let name = match event.event_name.as_deref() {
        Some(name) => name.trim().to_lowercase(),
        None => return Ok(None),
    };

    let routed = match name.as_str() {
        "notification" => RoutedEvent::Notification(parse(&name, &event.data)?),
        "content" => RoutedEvent::Content(parse(&name, &event.data)?),
        "finish" => {
            if event.data.trim().is_empty() {
                RoutedEvent::Finish(Finish::default())
            } else {
                RoutedEvent::Finish(parse(&name, &event.data)?)
            }
        }
        "map" => RoutedEvent::Map(parse(&name, &event.data)?),
        "interface" => RoutedEvent::Interface(parse(&name, &event.data)?),
        n if CATALOGUE_EVENTS.contains(&n) => {
            let payload: Value = parse(&name, &event.data)?;
            let updates = section_updates(payload)
                .ok_or_else(|| RouteError::invalid_payload(&name, "expected an object of sections"))?;
            RoutedEvent::Catalogue(updates)
        }
        _ => return Ok(None),
    };

    Ok(Some(routed))
}

/// Drive a decoded event stream into `handler`, one event at a time.
///
/// Invalid events are logged and skipped; unknown event types are ignored.
/// A transport error ends the run and is returned.
pub async fn run<S, H>(events: S, handler: &mut H) -> Result<RouterStats, StreamError>
where
    S: Stream<Item = Result<Event, StreamError>>,
    H: EventHandler + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut stats = RouterStats::default();

    while let Some(next) = events.next().await {
        let event = next?;
        match route(&event) {
            Ok(Some(routed)) => {
                handler.handle(routed);
                stats.applied += 1;
            }
            Ok(None) => {
                debug!(event = ?event.event_name, id = ?event.id, "Ignoring unknown event type");
                stats.ignored += 1;
            }
            Err(e) => {
                warn!(error = %e, id = ?event.id, "Skipping invalid event");
                stats.skipped += 1;
            }
        }
    }

    debug!(
        applied = stats.applied,
        ignored = stats.ignored,
        skipped = stats.skipped,
        "Event stream ended"
    );
    Ok(stats)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn event(name: &str, data: &str) -> Event {
        Event {
            event_name: Some(name.to_string()),
            data: data.to_string(),
            id: None,
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<RoutedEvent>,
    }

    impl EventHandler for Recorder {
        fn handle(&mut self, event: RoutedEvent) {
            self.events.push(event);
        }
    }

    #[test]
    fn test_route_is_case_insensitive() {
        let routed = route(&event("Notification", r#"{"message":"Welcome"}"#)).unwrap();
        assert!(matches!(routed, Some(RoutedEvent::Notification(n)) if n.message == "Welcome"));
    }

    #[test]
    fn test_route_unknown_event() {
        assert!(route(&event("telemetry", "{}")).unwrap().is_none());
        let unnamed = Event {
            data: "{}".to_string(),
            ..Event::default()
        };
        assert!(route(&unnamed).unwrap().is_none());
    }

    #[test]
    fn test_route_missing_required_field() {
        let err = route(&event("content", r#"{"delta":"x"}"#)).unwrap_err();
        assert!(matches!(err, RouteError::InvalidPayload { .. }));
    }

    #[test]
    fn test_route_malformed_json() {
        let err = route(&event("map", "{not json")).unwrap_err();
        assert!(matches!(err, RouteError::InvalidJson { .. }));
    }

    #[test]
    fn test_route_finish_allows_empty_data() {
        let routed = route(&event("finish", "")).unwrap();
        assert_eq!(routed, Some(RoutedEvent::Finish(Finish::default())));
    }

    #[test]
    fn test_route_catalogue_requires_object() {
        assert!(route(&event("catalogue", "[1,2]")).is_err());
        let routed = route(&event("catalogue", &json!({"overview": {"intro": "hi"}}).to_string()))
            .unwrap()
            .unwrap();
        match routed {
            RoutedEvent::Catalogue(updates) => assert_eq!(updates[0].section_type, "overview"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_skips_invalid_and_keeps_order() {
        let events = stream::iter(vec![
            Ok(event("content", r#"{"text":"Hello "}"#)),
            Ok(event("content", "{broken")),
            Ok(event("heartbeat", "")),
            Ok(event("content", r#"{"text":"world"}"#)),
        ]);
        let mut recorder = Recorder::default();
        let stats = run(events, &mut recorder).await.unwrap();

        assert_eq!(
            stats,
            RouterStats {
                applied: 2,
                ignored: 1,
                skipped: 1
            }
        );
        let texts: Vec<&str> = recorder
            .events
            .iter()
            .filter_map(|e| match e {
                RoutedEvent::Content(delta) => Some(delta.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hello ", "world"]);
    }

    #[tokio::test]
    async fn test_run_propagates_transport_error() {
        let events = stream::iter(vec![
            Ok(event("content", r#"{"text":"a"}"#)),
            Err(StreamError::transport("connection reset")),
        ]);
        let mut recorder = Recorder::default();
        assert!(run(events, &mut recorder).await.is_err());
        assert_eq!(recorder.events.len(), 1);
    }
}
