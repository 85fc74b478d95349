//! Belongs-to: the owner row points at one parent row.

use super::{Inverse, RelationDefinition, RelationKind, RelationSchema, key_type};
use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::table::BuildContext;
use kiln_db_schema::{Column, ForeignKey, Index};

/// Inner key column on the owner table, typed after the parent's outer key,
/// indexed, and constrained unless `constraint` is off.
pub(super) fn build(
    relation: &RelationSchema,
    ctx: &mut BuildContext<'_>,
) -> Result<(), SchemaError> {
    let entities = ctx.entities;
    let owner = relation.owner_entity(entities);
    let outer = relation.outer_entity(entities)?;
    let definition = &relation.definition;
    let table = owner.table_name();

    let key_type = key_type(outer, &definition.outer_key).ok_or_else(|| {
        relation.invalid(
            entities,
            format!(
                "outer key `{}` is not a column of `{}`",
                definition.outer_key,
                outer.name()
            ),
        )
    })?;

    ctx.add_column(
        table,
        Column::new(definition.inner_key.clone(), key_type).nullable(definition.nullable),
        relation.contributor(),
    )?;
    ctx.add_index(table, Index::new(table, &[&definition.inner_key]));

    if definition.constraint {
        ctx.add_foreign_key(
            table,
            ForeignKey::new(
                table,
                definition.inner_key.clone(),
                outer.table_name(),
                definition.outer_key.clone(),
                definition.action,
            ),
            relation.contributor(),
        )?;
    }

    Ok(())
}

/// The parent sees this relation as has-one or has-many; which one can't be
/// inferred, so the back kind is mandatory.
pub(super) fn revert(
    relation: &RelationSchema,
    inverse: &Inverse,
    entities: &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
    let back = match inverse.kind {
        Some(kind @ (RelationKind::HasOne | RelationKind::HasMany)) => kind,
        other => return Err(relation.back_error(entities, other)),
    };
    let outer_id = relation.outer_id(entities)?;
    let owner = relation.owner_entity(entities);
    let definition = &relation.definition;

    let reverted = RelationDefinition::new(back, owner.name())
        .inner_key(definition.outer_key.clone())
        .outer_key(definition.inner_key.clone())
        .constraint(definition.constraint)
        .action(definition.action)
        .nullable(definition.nullable);

    Ok(vec![(outer_id, reverted)])
}
