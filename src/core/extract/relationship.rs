// src/core/extract/relationship.rs

//! Relationship extraction between entities already resolved from the same
//! chunk. Endpoints are normalized to existing identities; records whose
//! endpoints cannot be resolved are discarded.

use crate::core::common::Result;
use crate::core::extract::{parse_records, RelationshipRecord, MAX_RELATIONSHIP_CONTEXT};
use crate::core::model::Reasoner;
use crate::core::types::Relationship;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default strength for records that omit the field.
const DEFAULT_STRENGTH: f32 = 0.5;

/// Infers typed edges between already-resolved entities.
pub struct RelationshipExtractor {
    reasoner: Arc<dyn Reasoner>,
}

impl RelationshipExtractor {
    /// Creates a relationship extractor.
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Extracts relationships from one chunk, constrained to the supplied
    /// entity names.
    ///
    /// Endpoint matching is case-insensitive against the known names and the
    /// canonical name is stored. Duplicate edges are collapsed by
    /// `(source, target, type)`, keeping the longer description.
    pub async fn extract_chunk(
        &self,
        content: &str,
        known_entities: &[String],
    ) -> Result<Vec<Relationship>> {
        if known_entities.len() < 2 {
            return Ok(Vec::new());
        }

        let listed: Vec<&str> = known_entities
            .iter()
            .take(MAX_RELATIONSHIP_CONTEXT)
            .map(String::as_str)
            .collect();
        let prompt = relationship_prompt(content, &listed);
        let raw = self.reasoner.extract(&prompt).await?;
        let records = parse_records::<RelationshipRecord>(&raw, "relationships")?;

        let canonical: HashMap<String, &String> =
            known_entities.iter().map(|name| (name.to_lowercase(), name)).collect();

        let mut deduped: HashMap<(String, String, String), Relationship> = HashMap::new();
        for record in records {
            let source = canonical.get(&record.source.trim().to_lowercase());
            let target = canonical.get(&record.target.trim().to_lowercase());
            let (Some(&source), Some(&target)) = (source, target) else {
                warn!(
                    source = %record.source,
                    target = %record.target,
                    "discarding relationship with unresolved endpoint"
                );
                continue;
            };

            let relationship = Relationship::new(
                source.clone(),
                target.clone(),
                &record.rel_type,
                record.description.trim().to_string(),
                record.strength.unwrap_or(DEFAULT_STRENGTH),
            );

            let key = (
                relationship.source.to_lowercase(),
                relationship.target.to_lowercase(),
                relationship.rel_type.clone(),
            );
            match deduped.get_mut(&key) {
                Some(existing) => {
                    if relationship.description.len() > existing.description.len() {
                        existing.description = relationship.description;
                    }
                }
                None => {
                    deduped.insert(key, relationship);
                }
            }
        }

        let mut relationships: Vec<Relationship> = deduped.into_values().collect();
        relationships.sort_by(|a, b| a.source.cmp(&b.source).then(a.target.cmp(&b.target)));
        debug!(count = relationships.len(), "relationships extracted");
        Ok(relationships)
    }
}

fn relationship_prompt(content: &str, entities: &[&str]) -> String {
    format!(
        "Extract the relationships between these entities: {}. \
         Use only entities from that list as source and target. Respond with JSON of the form \
         {{\"relationships\": [{{\"source\": ..., \"target\": ..., \"type\": ..., \
         \"description\": ..., \"strength\": 0.0}}]}} where strength is between 0 and 1.\n\n\
         Text:\n{content}",
        entities.join(", ")
    )
}
