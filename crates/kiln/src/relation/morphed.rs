//! Polymorphic kinds: the target is any implementor of an interface.
//!
//! A morphed key can't carry a foreign key since it may point at several
//! tables, so the target is identified by a key column plus a discriminator
//! (the morph key) holding the implementor's role.

use super::many_to_many::{PivotSide, build_pivot, pivot, reverted_definition};
use super::{Inverse, RelationDefinition, RelationKind, RelationSchema};
use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::table::BuildContext;
use kiln_db_schema::{AbstractType, Column, Index};

/// Discriminator columns hold a role name.
pub const MORPH_KEY_TYPE: AbstractType = AbstractType::String(32);

pub(crate) fn morph_column(name: &str, nullable: bool) -> Column {
    Column::new(name, MORPH_KEY_TYPE).nullable(nullable)
}

/// Morphed keys always reference the implementors' shared primary key.
fn morphed_key_type(
    relation: &RelationSchema,
    entities: &[EntitySchema],
) -> Result<AbstractType, SchemaError> {
    let target = relation.morphed_target(entities)?;
    if relation.definition.outer_key != target.primary_key {
        return Err(relation.invalid(
            entities,
            format!(
                "outer key of a polymorphic relation must be the primary key `{}` of every `{}`",
                target.primary_key, target.interface
            ),
        ));
    }
    Ok(target.key_type)
}

fn morph_key<'r>(
    relation: &'r RelationSchema,
    entities: &[EntitySchema],
) -> Result<&'r str, SchemaError> {
    relation
        .definition
        .morph_key
        .as_deref()
        .ok_or_else(|| SchemaError::MissingOption {
            entity: relation.owner_entity(entities).name().to_string(),
            relation: relation.name.clone(),
            option: "morph_key",
        })
}

pub(super) fn build_belongs_to(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
) -> Result<(), SchemaError> {
    let entities = ctx.entities;
    let owner = relation.owner_entity(entities);
    let key_type = morphed_key_type(relation, entities)?;
    let morph_key = morph_key(relation, entities)?;
    let definition = &relation.definition;
    let table = owner.table_name();

    ctx.add_column(
        table,
        Column::new(definition.inner_key.clone(), key_type).nullable(definition.nullable),
        relation.contributor(),
    )?;
    ctx.add_column(
        table,
        morph_column(morph_key, definition.nullable),
        relation.contributor(),
    )?;
    ctx.add_index(
        table,
        Index::new(table, &[morph_key, definition.inner_key.as_str()]),
    );

    Ok(())
}

/// One has-one/has-many per implementor, each carrying the morph key.
pub(super) fn revert_belongs_to(
    relation: &RelationSchema,
    inverse: &Inverse,
    entities: &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
    let back = match inverse.kind {
        Some(kind @ (RelationKind::HasOne | RelationKind::HasMany)) => kind,
        other => return Err(relation.back_error(entities, other)),
    };
    let target = relation.morphed_target(entities)?;
    let morph_key = morph_key(relation, entities)?;
    let owner = relation.owner_entity(entities);
    let definition = &relation.definition;

    Ok(target
        .implementors
        .iter()
        .map(|&implementor| {
            let reverted = RelationDefinition::new(back, owner.name())
                .inner_key(definition.outer_key.clone())
                .outer_key(definition.inner_key.clone())
                .morph_key(morph_key)
                .constraint(definition.constraint)
                .action(definition.action)
                .nullable(definition.nullable);
            (implementor, reverted)
        })
        .collect())
}

pub(super) fn build_many_to_morphed(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
) -> Result<(), SchemaError> {
    let entities = ctx.entities;
    let owner = relation.owner_entity(entities);
    let outer_type = morphed_key_type(relation, entities)?;
    let morph_key = morph_key(relation, entities)?;
    let pivot = pivot(relation, entities)?;
    let definition = &relation.definition;

    let owner_type = super::key_type(owner, &definition.inner_key).ok_or_else(|| {
        relation.invalid(
            entities,
            format!(
                "key `{}` is not a column of `{}`",
                definition.inner_key,
                owner.name()
            ),
        )
    })?;

    build_pivot(
        relation,
        ctx,
        pivot,
        [
            PivotSide {
                key: &pivot.inner_key,
                key_type: owner_type,
                references: Some((owner.table_name(), definition.inner_key.as_str())),
            },
            PivotSide {
                key: &pivot.outer_key,
                key_type: outer_type,
                references: None,
            },
        ],
        Some(morph_key),
    )
}

/// A many-to-many on every implementor, sharing the pivot table.
pub(super) fn revert_many_to_morphed(
    relation: &RelationSchema,
    inverse: &Inverse,
    entities: &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
    if !matches!(inverse.kind, None | Some(RelationKind::ManyToMany)) {
        return Err(relation.back_error(entities, inverse.kind));
    }
    let target = relation.morphed_target(entities)?;
    let morph_key = morph_key(relation, entities)?;
    let owner = relation.owner_entity(entities);
    let pivot = pivot(relation, entities)?;

    Ok(target
        .implementors
        .iter()
        .map(|&implementor| {
            let reverted = reverted_definition(relation, owner, pivot).morph_key(morph_key);
            (implementor, reverted)
        })
        .collect())
}
