//! Typed payloads carried in the `data` field of each event type.

use serde::{Deserialize, Serialize};

use crate::models::{display_title_for, is_reserved_key, Value};

/// Status message for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
}

/// Cumulative narrative text. Deltas must be applied in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDelta {
    pub text: String,
}

/// End of the current burst.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finish {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub title: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapUpdate {
    pub markers: Vec<MapMarker>,
}

/// Rendering configuration for one section. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceUpdate {
    #[serde(alias = "sectionType")]
    pub section_type: String,
    #[serde(default)]
    pub config: Value,
}

/// One section extracted from a catalogue event.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionUpdate {
    pub section_type: String,
    pub display_title: String,
    pub content: Value,
}

/// Split a catalogue payload (`{sectionType: content, ...}`) into updates,
/// preserving payload order. Reserved top-level keys are ignored.
pub fn section_updates(payload: Value) -> Option<Vec<SectionUpdate>> {
    let Value::Object(map) = payload else {
        return None;
    };

    Some(
        map.into_iter()
            .filter(|(section_type, _)| !is_reserved_key(section_type) && !section_type.trim().is_empty())
            .map(|(section_type, content)| SectionUpdate {
                display_title: display_title_for(&section_type, &content),
                section_type,
                content,
            })
            .collect(),
    )
}
