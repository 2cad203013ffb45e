// src/core/extract/entity.rs

//! Entity resolution over document chunks, with optional repeated-pass
//! "gleaning" to improve recall.

use crate::core::common::Result;
use crate::core::extract::{parse_records, validate_entity, EntityRecord, MAX_GLEANING_CONTEXT};
use crate::core::model::Reasoner;
use crate::core::types::Entity;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One resolved entity with its mention count within a single chunk.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    /// The resolved entity; first-seen description wins.
    pub entity: Entity,
    /// How many times the chunk referenced this entity across all passes.
    pub mentions: u64,
}

/// Resolves entities from chunk text through the external reasoner.
pub struct EntityResolver {
    reasoner: Arc<dyn Reasoner>,
    gleaning_rounds: usize,
}

impl EntityResolver {
    /// Creates a resolver running `gleaning_rounds` extra passes per chunk
    /// beyond the first.
    pub fn new(reasoner: Arc<dyn Reasoner>, gleaning_rounds: usize) -> Self {
        Self { reasoner, gleaning_rounds }
    }

    /// Extracts and resolves the entities of one chunk.
    ///
    /// Duplicates within the chunk are grouped by exact name: the first
    /// description seen is kept and every further reference adds a mention.
    /// Gleaning passes terminate early once a pass contributes no new name.
    /// A reasoner failure here fails the whole chunk; the caller isolates it
    /// from the rest of the batch.
    pub async fn resolve_chunk(&self, content: &str) -> Result<Vec<ResolvedEntity>> {
        let mut resolved: Vec<ResolvedEntity> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for pass in 0..=self.gleaning_rounds {
            let prompt = if pass == 0 {
                entity_prompt(content)
            } else {
                let known: Vec<&str> = resolved
                    .iter()
                    .take(MAX_GLEANING_CONTEXT)
                    .map(|r| r.entity.name.as_str())
                    .collect();
                gleaning_prompt(content, &known)
            };

            let raw = self.reasoner.extract(&prompt).await?;
            let records = parse_records::<EntityRecord>(&raw, "entities")?;

            let mut new_names = 0_usize;
            for record in records {
                let Some((name, entity_type, description)) = validate_entity(record) else {
                    continue;
                };
                match by_name.get(&name) {
                    Some(&index) => resolved[index].mentions += 1,
                    None => {
                        by_name.insert(name.clone(), resolved.len());
                        resolved.push(ResolvedEntity {
                            entity: Entity::new(name, entity_type, description),
                            mentions: 1,
                        });
                        new_names += 1;
                    }
                }
            }

            debug!(pass, new_names, total = resolved.len(), "entity extraction pass");
            if pass > 0 && new_names == 0 {
                break;
            }
        }

        Ok(resolved)
    }
}

fn entity_prompt(content: &str) -> String {
    format!(
        "Extract the named entities from the text below. Respond with JSON of the form \
         {{\"entities\": [{{\"name\": ..., \"type\": ..., \"description\": ...}}]}}. \
         Valid types: PERSON, ORGANIZATION, LOCATION, PRODUCT, EVENT, CONCEPT.\n\n\
         Text:\n{content}"
    )
}

fn gleaning_prompt(content: &str, known: &[&str]) -> String {
    format!(
        "The following entities were already identified in the text below: {}. \
         List only entities that were missed, in the same JSON form \
         {{\"entities\": [{{\"name\": ..., \"type\": ..., \"description\": ...}}]}}. \
         Respond with an empty list if nothing was missed.\n\n\
         Text:\n{content}",
        known.join(", ")
    )
}
