use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::models::{has_items, root_title, Value};

/// A named bucket of content shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueSection {
    pub section_type: String,
    pub display_title: String,
    pub content: Value,
}

impl CatalogueSection {
    pub fn new(section_type: impl Into<String>, display_title: impl Into<String>, content: Value) -> Self {
        Self {
            section_type: section_type.into(),
            display_title: display_title.into(),
            content,
        }
    }

    /// Number of non-metadata items when content is a map.
    pub fn item_count(&self) -> usize {
        self.content
            .as_object()
            .map(|map| map.keys().filter(|k| !crate::models::is_reserved_key(k)).count())
            .unwrap_or(0)
    }
}

/// Sections keyed by type, with first-arrival ordering.
///
/// Invariants: every live section type appears exactly once in `order`, and
/// no section holds a map without items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogueStore {
    sections: HashMap<String, CatalogueSection>,
    order: Vec<String>,
}

impl CatalogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `content` into the section, creating it if needed.
    ///
    /// Map content is merged per key (last write wins); existing keys absent
    /// from `content` are kept. Non-map content, or a live section whose
    /// content is not a map, is replaced wholesale. A `_title` kept at the
    /// merged root outranks `display_title`.
    pub fn upsert(&mut self, section_type: &str, display_title: &str, content: Value) {
        match self.sections.get_mut(section_type) {
            Some(section) => {
                match (&mut section.content, content) {
                    (Value::Object(existing), Value::Object(incoming)) => {
                        trace!(section = section_type, keys = incoming.len(), "Merging section content");
                        for (key, value) in incoming {
                            existing.insert(key, value);
                        }
                    }
                    (existing, incoming) => {
                        debug!(section = section_type, "Replacing section content wholesale");
                        *existing = incoming;
                    }
                }
                section.display_title = root_title(&section.content).unwrap_or(display_title).to_string();
            }
            None => {
                self.insert_new(CatalogueSection::new(section_type, display_title, content));
            }
        }
        self.drop_if_empty(section_type);
    }

    /// Merge `content` without overwriting anything already live.
    ///
    /// Keys present in the live section are kept as-is; absent keys are added.
    /// A live section with non-map content is left untouched. Absent sections
    /// are created in full.
    pub fn fill_gaps(&mut self, section_type: &str, display_title: &str, content: Value) -> usize {
        match self.sections.get_mut(section_type) {
            Some(section) => match (&mut section.content, content) {
                (Value::Object(existing), Value::Object(incoming)) => {
                    let mut added = 0;
                    for (key, value) in incoming {
                        if !existing.contains_key(&key) {
                            existing.insert(key, value);
                            added += 1;
                        }
                    }
                    added
                }
                _ => 0,
            },
            None => {
                let section = CatalogueSection::new(section_type, display_title, content);
                let added = section.item_count().max(1);
                if self.insert_new(section) {
                    added
                } else {
                    0
                }
            }
        }
    }

    pub fn remove(&mut self, section_type: &str) -> Option<CatalogueSection> {
        self.order.retain(|t| t != section_type);
        self.sections.remove(section_type)
    }

    pub fn has(&self, section_type: &str) -> bool {
        self.sections.contains_key(section_type)
    }

    pub fn get(&self, section_type: &str) -> Option<&CatalogueSection> {
        self.sections.get(section_type)
    }

    pub(crate) fn get_mut(&mut self, section_type: &str) -> Option<&mut CatalogueSection> {
        self.sections.get_mut(section_type)
    }

    /// Live sections in first-arrival order.
    pub fn ordered_sections(&self) -> Vec<&CatalogueSection> {
        self.order
            .iter()
            .filter_map(|t| self.sections.get(t))
            .collect()
    }

    /// Section types in first-arrival order.
    pub fn section_types(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|t| self.sections.contains_key(t.as_str()))
            .cloned()
            .collect()
    }

    pub fn clear_all(&mut self) {
        self.sections.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Owned copy of the sections and order, for persistence.
    pub fn snapshot(&self) -> (Vec<CatalogueSection>, Vec<String>) {
        let sections = self.ordered_sections().into_iter().cloned().collect();
        (sections, self.section_types())
    }

    fn insert_new(&mut self, section: CatalogueSection) -> bool {
        if section.content.is_object() && !has_items(&section.content) {
            debug!(section = %section.section_type, "Not creating section without items");
            return false;
        }
        if !self.order.iter().any(|t| *t == section.section_type) {
            self.order.push(section.section_type.clone());
        }
        self.sections.insert(section.section_type.clone(), section);
        true
    }

    fn drop_if_empty(&mut self, section_type: &str) {
        let empty = self
            .sections
            .get(section_type)
            .map(|s| s.content.is_object() && !has_items(&s.content))
            .unwrap_or(false);
        if empty {
            debug!(section = section_type, "Removing section left without items");
            self.remove(section_type);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
