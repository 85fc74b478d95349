//! Has-one and has-many: the target rows point back at the owner.
//!
//! Both kinds place the same column on the target table; cardinality only
//! matters to the runtime, never to the schema.

use super::morphed::morph_column;
use super::{Inverse, RelationDefinition, RelationKind, RelationSchema, key_type};
use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::table::BuildContext;
use kiln_db_schema::{Column, ForeignKey, Index};

pub(super) fn build(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
) -> Result<(), SchemaError> {
    let entities = ctx.entities;
    let owner = relation.owner_entity(entities);
    let outer = relation.outer_entity(entities)?;
    let definition = &relation.definition;
    let table = outer.table_name();

    let key_type = key_type(owner, &definition.inner_key).ok_or_else(|| {
        relation.invalid(
            entities,
            format!(
                "inner key `{}` is not a column of `{}`",
                definition.inner_key,
                owner.name()
            ),
        )
    })?;

    ctx.add_column(
        table,
        Column::new(definition.outer_key.clone(), key_type).nullable(definition.nullable),
        relation.contributor(),
    )?;

    // Inverse of a morphed belongs-to: the target row may point at any
    // implementor, so no foreign key is possible.
    if let Some(morph_key) = &definition.morph_key {
        ctx.add_column(
            table,
            morph_column(morph_key, definition.nullable),
            relation.contributor(),
        )?;
        ctx.add_index(
            table,
            Index::new(table, &[morph_key, &definition.outer_key]),
        );
        return Ok(());
    }

    ctx.add_index(table, Index::new(table, &[&definition.outer_key]));

    if definition.constraint {
        ctx.add_foreign_key(
            table,
            ForeignKey::new(
                table,
                definition.outer_key.clone(),
                owner.table_name(),
                definition.inner_key.clone(),
                definition.action,
            ),
            relation.contributor(),
        )?;
    }

    Ok(())
}

/// The only inverse of has-one/has-many is belongs-to.
pub(super) fn revert(
    relation: &RelationSchema,
    inverse: &Inverse,
    entities: &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
    let definition = &relation.definition;
    match inverse.kind {
        None | Some(RelationKind::BelongsTo) if definition.morph_key.is_none() => {}
        other => {
            return Err(relation.back_error(
                entities,
                Some(other.unwrap_or(RelationKind::BelongsTo)),
            ));
        }
    }

    let outer_id = relation.outer_id(entities)?;
    let owner = relation.owner_entity(entities);

    let reverted = RelationDefinition::belongs_to(owner.name())
        .inner_key(definition.outer_key.clone())
        .outer_key(definition.inner_key.clone())
        .constraint(definition.constraint)
        .action(definition.action)
        .nullable(definition.nullable);

    Ok(vec![(outer_id, reverted)])
}
