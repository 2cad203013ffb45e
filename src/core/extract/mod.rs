// src/core/extract/mod.rs

//! The boundary where reasoner output becomes typed records.
//!
//! Reasoner JSON frequently arrives wrapped in Markdown code fences and with
//! fields missing or mislabeled. Everything here parses defensively: records
//! that fail validation are dropped with a logged warning, never propagated
//! as a fatal error.

mod entity;
mod relationship;

pub use entity::{EntityResolver, ResolvedEntity};
pub use relationship::RelationshipExtractor;

use crate::core::common::{RagError, Result};
use crate::core::types::EntityType;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Entity names quoted back to the reasoner during gleaning passes.
pub(crate) const MAX_GLEANING_CONTEXT: usize = 20;

/// Entity names supplied to the relationship extraction prompt.
pub(crate) const MAX_RELATIONSHIP_CONTEXT: usize = 50;

/// Raw entity record as emitted by the reasoner, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct EntityRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
}

/// Raw relationship record as emitted by the reasoner, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RelationshipRecord {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default, rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strength: Option<f32>,
}

/// Strips a leading ```` ```json ````/```` ``` ```` fence and trailing fence.
pub(crate) fn clean_json_response(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parses a reasoner response into records of type `T`.
///
/// Accepts either a bare JSON array or an object holding the array under
/// `key`. Entirely unparseable output is a [`RagError::Serialization`];
/// individually malformed records are dropped with a warning.
pub(crate) fn parse_records<T: DeserializeOwned>(raw: &str, key: &str) -> Result<Vec<T>> {
    let cleaned = clean_json_response(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| RagError::Serialization(format!("reasoner returned unparseable JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("dropping malformed {key} record: {e}");
                None
            }
        })
        .collect())
}

/// Validates one entity record; malformed records become `None` with a
/// warning. Unknown type labels are clamped to [`EntityType::Concept`].
pub(crate) fn validate_entity(record: EntityRecord) -> Option<(String, EntityType, String)> {
    let name = record.name.trim().to_string();
    if name.is_empty() {
        warn!("dropping entity record with empty name");
        return None;
    }

    let entity_type = EntityType::parse(&record.entity_type).unwrap_or_else(|| {
        warn!(entity = %name, label = %record.entity_type, "unknown entity type, using CONCEPT");
        EntityType::Concept
    });

    Some((name, entity_type, record.description.trim().to_string()))
}
