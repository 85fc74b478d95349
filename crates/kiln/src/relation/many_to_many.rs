//! Many-to-many through a pivot table.
//!
//! Both directions of a many-to-many describe the same pivot table, so every
//! contribution here is direction-independent: the unique index sorts its
//! columns by name, and the per-key indexes and foreign keys are keyed by
//! column.

use super::morphed::morph_column;
use super::{Inverse, PivotDefinition, RelationDefinition, RelationKind, RelationSchema, key_type};
use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::table::BuildContext;
use kiln_db_schema::{AbstractType, Column, ForeignKey, Index};

/// One side of a pivot table.
pub(super) struct PivotSide<'a> {
    pub key: &'a str,
    pub key_type: AbstractType,
    /// `(table, column)` the key references. `None` for a morphed side.
    pub references: Option<(&'a str, &'a str)>,
}

pub(super) fn build_pivot(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
    pivot: &PivotDefinition,
    sides: [PivotSide<'_>; 2],
    morph_key: Option<&str>,
) -> Result<(), SchemaError> {
    let table = pivot.table.as_str();
    let definition = &relation.definition;

    for side in &sides {
        ctx.add_column(
            table,
            Column::new(side.key, side.key_type),
            relation.contributor(),
        )?;
    }
    if let Some(morph_key) = morph_key {
        ctx.add_column(table, morph_column(morph_key, false), relation.contributor())?;
    }

    for side in &sides {
        ctx.add_index(table, Index::new(table, &[side.key]));
    }

    let mut unique: Vec<&str> = sides.iter().map(|side| side.key).collect();
    unique.extend(morph_key);
    unique.sort_unstable();
    ctx.add_index(table, Index::unique(table, &unique));

    if definition.constraint {
        for side in &sides {
            if let Some((references_table, references_column)) = side.references {
                ctx.add_foreign_key(
                    table,
                    ForeignKey::new(
                        table,
                        side.key,
                        references_table,
                        references_column,
                        definition.action,
                    ),
                    relation.contributor(),
                )?;
            }
        }
    }

    Ok(())
}

pub(super) fn pivot<'r>(
    relation: &'r RelationSchema,
    entities: &[EntitySchema],
) -> Result<&'r PivotDefinition, SchemaError> {
    relation.definition.pivot.as_ref().ok_or_else(|| SchemaError::MissingOption {
        entity: relation.owner_entity(entities).name().to_string(),
        relation: relation.name.clone(),
        option: "pivot_table",
    })
}

pub(super) fn build(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
) -> Result<(), SchemaError> {
    let entities = ctx.entities;
    let owner = relation.owner_entity(entities);
    let outer = relation.outer_entity(entities)?;
    let definition = &relation.definition;
    let pivot = pivot(relation, entities)?;

    let missing = |entity: &EntitySchema, key: &str| {
        relation.invalid(
            entities,
            format!("key `{}` is not a column of `{}`", key, entity.name()),
        )
    };
    let owner_type =
        key_type(owner, &definition.inner_key).ok_or_else(|| missing(owner, &definition.inner_key))?;
    let outer_type =
        key_type(outer, &definition.outer_key).ok_or_else(|| missing(outer, &definition.outer_key))?;

    // With a morph key this is the inverse of a many-to-morphed: the owner
    // is one of several implementors and can't be referenced.
    let owner_references = match definition.morph_key {
        Some(_) => None,
        None => Some((owner.table_name(), definition.inner_key.as_str())),
    };

    build_pivot(
        relation,
        ctx,
        pivot,
        [
            PivotSide {
                key: &pivot.inner_key,
                key_type: owner_type,
                references: owner_references,
            },
            PivotSide {
                key: &pivot.outer_key,
                key_type: outer_type,
                references: Some((outer.table_name(), definition.outer_key.as_str())),
            },
        ],
        definition.morph_key.as_deref(),
    )
}

/// Same pivot table, keys swapped.
pub(super) fn reverted_definition(
    relation: &RelationSchema,
    owner: &EntitySchema,
    pivot: &PivotDefinition,
) -> RelationDefinition {
    let definition = &relation.definition;
    RelationDefinition::many_to_many(owner.name())
        .inner_key(definition.outer_key.clone())
        .outer_key(definition.inner_key.clone())
        .pivot_table(pivot.table.clone())
        .pivot_inner_key(pivot.outer_key.clone())
        .pivot_outer_key(pivot.inner_key.clone())
        .constraint(definition.constraint)
        .action(definition.action)
}

pub(super) fn revert(
    relation: &RelationSchema,
    inverse: &Inverse,
    entities: &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
    match inverse.kind {
        None | Some(RelationKind::ManyToMany) if relation.definition.morph_key.is_none() => {}
        other => {
            return Err(relation.back_error(
                entities,
                Some(other.unwrap_or(RelationKind::ManyToMany)),
            ));
        }
    }

    let outer_id = relation.outer_id(entities)?;
    let owner = relation.owner_entity(entities);
    let pivot = pivot(relation, entities)?;

    Ok(vec![(outer_id, reverted_definition(relation, owner, pivot))])
}
