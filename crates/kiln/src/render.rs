//! Runtime-facing snapshot of a resolved schema.
//!
//! Query layers need to know, per model, which table it lives in and how its
//! relations join. [`RenderedSchema`] carries exactly that, detached from
//! the builder internals.

use crate::builder::ResolvedSchema;
use crate::relation::{RelationKind, RelationTarget};
use kiln_db_schema::Schema;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSchema {
    pub models: Vec<ModelInfo>,
    pub tables: Schema,
    pub stats: SchemaStats,
}

impl RenderedSchema {
    pub fn model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// One entity, as the runtime sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub table: String,
    pub role: String,
    pub primary_key: String,
    pub source: Option<String>,
    pub relations: Vec<RelationInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub name: String,
    pub kind: RelationKind,
    /// Entity name, or interface name for polymorphic relations.
    pub target: String,
    pub inner_key: String,
    pub outer_key: String,
    pub morph_key: Option<String>,
    pub pivot: Option<PivotInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotInfo {
    pub table: String,
    pub inner_key: String,
    pub outer_key: String,
}

/// Counts reported after a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaStats {
    pub models: usize,
    pub tables: usize,
    /// Distinct sources declared by models.
    pub sources: usize,
    pub relations: usize,
}

impl ResolvedSchema {
    pub fn render_schema(&self) -> RenderedSchema {
        let models: Vec<ModelInfo> = self
            .entities()
            .iter()
            .enumerate()
            .map(|(index, entity)| {
                let relations = self
                    .relations()
                    .iter()
                    .filter(|r| r.owner().index() == index)
                    .map(|r| {
                        let target = match r.target() {
                            RelationTarget::Entity(id) => self.entity(*id).name().to_string(),
                            RelationTarget::Morphed(morphed) => morphed.interface.clone(),
                        };
                        let definition = r.definition();
                        RelationInfo {
                            name: r.name().to_string(),
                            kind: r.kind(),
                            target,
                            inner_key: definition.inner_key.clone(),
                            outer_key: definition.outer_key.clone(),
                            morph_key: definition.morph_key.clone(),
                            pivot: definition.pivot.as_ref().map(|p| PivotInfo {
                                table: p.table.clone(),
                                inner_key: p.inner_key.clone(),
                                outer_key: p.outer_key.clone(),
                            }),
                        }
                    })
                    .collect();

                ModelInfo {
                    name: entity.name().to_string(),
                    table: entity.table_name().to_string(),
                    role: entity.role_name().to_string(),
                    primary_key: entity.primary_key_name().to_string(),
                    source: entity.source_name().map(str::to_string),
                    relations,
                }
            })
            .collect();

        let sources: HashSet<&str> = models
            .iter()
            .filter_map(|m| m.source.as_deref())
            .collect();

        let stats = SchemaStats {
            models: models.len(),
            tables: self.schema().tables.len(),
            sources: sources.len(),
            relations: self.relations().len(),
        };

        tracing::debug!(?stats, "rendered schema");

        RenderedSchema {
            stats,
            models,
            tables: self.schema().clone(),
        }
    }
}
