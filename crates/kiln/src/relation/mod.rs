//! Relations between entities.
//!
//! A [`RelationDefinition`] is what an entity declares: a kind, a target
//! name, and optional overrides. During resolution the target is looked up,
//! the kind's defaults are merged in, and the result is a [`RelationSchema`]
//! that knows how to contribute columns, indexes and foreign keys to the
//! table builders, and how to synthesize its inverse on the target.
//!
//! Every kind is described by one row of a static dispatch table
//! ([`KindSpec`]): its convention defaults, its build function and its
//! revert function.
//!
//! ## Key templates
//!
//! Key options may reference either side of the relation:
//!
//! | placeholder | value |
//! |---|---|
//! | `{owner:role}` | role of the declaring entity |
//! | `{owner:primary_key}` | primary key column of the declaring entity |
//! | `{owner:table}` | table of the declaring entity |
//! | `{outer:role}` | role of the target |
//! | `{outer:primary_key}` | primary key column of the target |
//! | `{outer:table}` | table of the target (not available on morphed targets) |

mod belongs_to;
mod has;
mod many_to_many;
mod morphed;

pub use morphed::MORPH_KEY_TYPE;

use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::table::{BuildContext, Contributor};
use kiln_db_schema::{AbstractType, ReferentialAction};
use std::fmt;

/// The closed set of relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationKind {
    BelongsTo,
    BelongsToMorphed,
    HasOne,
    HasMany,
    ManyToMany,
    ManyToMorphed,
}

impl RelationKind {
    pub const ALL: [RelationKind; 6] = [
        RelationKind::BelongsTo,
        RelationKind::BelongsToMorphed,
        RelationKind::HasOne,
        RelationKind::HasMany,
        RelationKind::ManyToMany,
        RelationKind::ManyToMorphed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::BelongsToMorphed => "belongs_to_morphed",
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::ManyToMany => "many_to_many",
            RelationKind::ManyToMorphed => "many_to_morphed",
        }
    }

    /// The polymorphic kind substituted when the target is an interface
    /// with several implementors.
    pub fn equivalent(self) -> Option<RelationKind> {
        match self {
            RelationKind::BelongsTo => Some(RelationKind::BelongsToMorphed),
            RelationKind::ManyToMany => Some(RelationKind::ManyToMorphed),
            _ => None,
        }
    }

    /// Whether the target of this kind is a set of implementors rather than
    /// one entity.
    pub fn is_morphed(self) -> bool {
        matches!(
            self,
            RelationKind::BelongsToMorphed | RelationKind::ManyToMorphed
        )
    }

    pub(crate) fn spec(self) -> &'static KindSpec {
        let spec = &KINDS[self as usize];
        debug_assert_eq!(spec.kind, self);
        spec
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to register the inverse of a relation on its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inverse {
    /// Relation name on the target entity.
    pub name: String,
    /// Kind of the inverse. Required where cardinality can't be inferred.
    pub kind: Option<RelationKind>,
}

/// Author-supplied overrides. `None` falls back to the kind's convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationOptions {
    pub inner_key: Option<String>,
    pub outer_key: Option<String>,
    pub constraint: Option<bool>,
    pub action: Option<ReferentialAction>,
    pub nullable: Option<bool>,
    pub morph_key: Option<String>,
    pub pivot_table: Option<String>,
    pub pivot_inner_key: Option<String>,
    pub pivot_outer_key: Option<String>,
    pub inverse: Option<Inverse>,
}

/// A declared relation, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDefinition {
    kind: RelationKind,
    target: String,
    options: RelationOptions,
}

impl RelationDefinition {
    pub fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            options: RelationOptions::default(),
        }
    }

    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, target)
    }

    pub fn belongs_to_morphed(target: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsToMorphed, target)
    }

    pub fn has_one(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, target)
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, target)
    }

    pub fn many_to_many(target: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMany, target)
    }

    pub fn many_to_morphed(target: impl Into<String>) -> Self {
        Self::new(RelationKind::ManyToMorphed, target)
    }

    pub fn inner_key(mut self, key: impl Into<String>) -> Self {
        self.options.inner_key = Some(key.into());
        self
    }

    pub fn outer_key(mut self, key: impl Into<String>) -> Self {
        self.options.outer_key = Some(key.into());
        self
    }

    pub fn constraint(mut self, constraint: bool) -> Self {
        self.options.constraint = Some(constraint);
        self
    }

    pub fn action(mut self, action: ReferentialAction) -> Self {
        self.options.action = Some(action);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.options.nullable = Some(nullable);
        self
    }

    pub fn morph_key(mut self, key: impl Into<String>) -> Self {
        self.options.morph_key = Some(key.into());
        self
    }

    pub fn pivot_table(mut self, table: impl Into<String>) -> Self {
        self.options.pivot_table = Some(table.into());
        self
    }

    pub fn pivot_inner_key(mut self, key: impl Into<String>) -> Self {
        self.options.pivot_inner_key = Some(key.into());
        self
    }

    pub fn pivot_outer_key(mut self, key: impl Into<String>) -> Self {
        self.options.pivot_outer_key = Some(key.into());
        self
    }

    /// Register the inverse of this relation on the target, under `name`.
    pub fn inverse(mut self, name: impl Into<String>, kind: Option<RelationKind>) -> Self {
        self.options.inverse = Some(Inverse {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &RelationOptions {
        &self.options
    }
}

/// Position of a relation in the resolved relation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub(crate) usize);

impl RelationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The implementors of an interface, seen as one polymorphic target.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphedTarget {
    pub interface: String,
    pub role: String,
    pub primary_key: String,
    /// Reference type shared by every implementor's primary key.
    pub key_type: AbstractType,
    pub implementors: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationTarget {
    Entity(EntityId),
    Morphed(MorphedTarget),
}

impl RelationTarget {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            RelationTarget::Entity(id) => Some(*id),
            RelationTarget::Morphed(_) => None,
        }
    }

    pub fn morphed(&self) -> Option<&MorphedTarget> {
        match self {
            RelationTarget::Entity(_) => None,
            RelationTarget::Morphed(target) => Some(target),
        }
    }
}

/// Resolved pivot table settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotDefinition {
    pub table: String,
    /// Pivot column referencing the owner.
    pub inner_key: String,
    /// Pivot column referencing the target.
    pub outer_key: String,
}

/// Options with every default applied and every template expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDefinition {
    pub inner_key: String,
    pub outer_key: String,
    pub constraint: bool,
    pub action: ReferentialAction,
    pub nullable: bool,
    pub morph_key: Option<String>,
    pub pivot: Option<PivotDefinition>,
}

/// A relation bound to concrete entities.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSchema {
    pub(crate) id: RelationId,
    pub(crate) name: String,
    pub(crate) owner: EntityId,
    pub(crate) kind: RelationKind,
    pub(crate) declared_kind: RelationKind,
    pub(crate) target: RelationTarget,
    pub(crate) definition: ResolvedDefinition,
    pub(crate) inverse: Option<Inverse>,
    pub(crate) paired_with: Option<RelationId>,
}

impl RelationSchema {
    pub fn id(&self) -> RelationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Effective kind, after equivalent substitution.
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Kind as declared by the author.
    pub fn declared_kind(&self) -> RelationKind {
        self.declared_kind
    }

    pub fn target(&self) -> &RelationTarget {
        &self.target
    }

    pub fn definition(&self) -> &ResolvedDefinition {
        &self.definition
    }

    /// The relation this one was reverted from, if any.
    pub fn paired_with(&self) -> Option<RelationId> {
        self.paired_with
    }

    pub(crate) fn contributor(&self) -> Contributor {
        Contributor::Relation(self.id)
    }

    /// Contribute this relation's columns, indexes and foreign keys.
    ///
    /// Re-running against tables that already hold the contribution is a
    /// no-op.
    pub(crate) fn build_schema(&self, ctx: &mut BuildContext<'_>) -> Result<(), SchemaError> {
        (self.kind.spec().build)(self, ctx)
    }

    /// Definitions of the inverse relation, keyed by the entity that should
    /// receive them.
    pub(crate) fn revert(
        &self,
        inverse: &Inverse,
        entities: &[EntitySchema],
    ) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError> {
        (self.kind.spec().revert)(self, inverse, entities)
    }

    pub(crate) fn owner_entity<'e>(&self, entities: &'e [EntitySchema]) -> &'e EntitySchema {
        &entities[self.owner.index()]
    }

    /// The single target entity, for kinds that require one.
    pub(crate) fn outer_id(&self, entities: &[EntitySchema]) -> Result<EntityId, SchemaError> {
        self.target.entity().ok_or_else(|| {
            self.invalid(
                entities,
                format!("{} requires a single target entity", self.kind),
            )
        })
    }

    pub(crate) fn outer_entity<'e>(
        &self,
        entities: &'e [EntitySchema],
    ) -> Result<&'e EntitySchema, SchemaError> {
        Ok(&entities[self.outer_id(entities)?.index()])
    }

    pub(crate) fn morphed_target(
        &self,
        entities: &[EntitySchema],
    ) -> Result<&MorphedTarget, SchemaError> {
        self.target.morphed().ok_or_else(|| {
            self.invalid(
                entities,
                format!("{} requires a polymorphic target", self.kind),
            )
        })
    }

    pub(crate) fn invalid(&self, entities: &[EntitySchema], reason: String) -> SchemaError {
        SchemaError::InvalidOption {
            entity: self.owner_entity(entities).name().to_string(),
            relation: self.name.clone(),
            reason,
        }
    }

    pub(crate) fn back_error(
        &self,
        entities: &[EntitySchema],
        back: Option<RelationKind>,
    ) -> SchemaError {
        let entity = self.owner_entity(entities).name().to_string();
        match back {
            None => SchemaError::MissingBackRelation {
                entity,
                relation: self.name.clone(),
                kind: self.kind,
            },
            Some(back) => SchemaError::InvalidBackRelation {
                entity,
                relation: self.name.clone(),
                kind: self.kind,
                back,
            },
        }
    }
}

// =============================================================================
// Dispatch table
// =============================================================================

type BuildFn = fn(&RelationSchema, &mut BuildContext<'_>) -> Result<(), SchemaError>;
type RevertFn = fn(
    &RelationSchema,
    &Inverse,
    &[EntitySchema],
) -> Result<Vec<(EntityId, RelationDefinition)>, SchemaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PivotDefault {
    None,
    /// Owner and target roles, sorted and joined with `_`.
    Convention,
    Required,
}

pub(crate) struct KindSpec {
    pub kind: RelationKind,
    pub inner_key: &'static str,
    pub outer_key: &'static str,
    pub constraint: bool,
    pub nullable: bool,
    pub morph_key: Option<&'static str>,
    pub pivot: PivotDefault,
    pub build: BuildFn,
    pub revert: RevertFn,
}

const PIVOT_INNER_KEY: &str = "{owner:role}_{owner:primary_key}";
const PIVOT_OUTER_KEY: &str = "{outer:role}_{outer:primary_key}";

/// Indexed by `RelationKind as usize`.
static KINDS: [KindSpec; 6] = [
    KindSpec {
        kind: RelationKind::BelongsTo,
        inner_key: "{outer:role}_{outer:primary_key}",
        outer_key: "{outer:primary_key}",
        constraint: true,
        nullable: true,
        morph_key: None,
        pivot: PivotDefault::None,
        build: belongs_to::build,
        revert: belongs_to::revert,
    },
    KindSpec {
        kind: RelationKind::BelongsToMorphed,
        inner_key: "{outer:role}_{outer:primary_key}",
        outer_key: "{outer:primary_key}",
        constraint: false,
        nullable: true,
        morph_key: Some("{outer:role}_type"),
        pivot: PivotDefault::None,
        build: morphed::build_belongs_to,
        revert: morphed::revert_belongs_to,
    },
    KindSpec {
        kind: RelationKind::HasOne,
        inner_key: "{owner:primary_key}",
        outer_key: "{owner:role}_{owner:primary_key}",
        constraint: true,
        nullable: true,
        morph_key: None,
        pivot: PivotDefault::None,
        build: has::build,
        revert: has::revert,
    },
    KindSpec {
        kind: RelationKind::HasMany,
        inner_key: "{owner:primary_key}",
        outer_key: "{owner:role}_{owner:primary_key}",
        constraint: true,
        nullable: true,
        morph_key: None,
        pivot: PivotDefault::None,
        build: has::build,
        revert: has::revert,
    },
    KindSpec {
        kind: RelationKind::ManyToMany,
        inner_key: "{owner:primary_key}",
        outer_key: "{outer:primary_key}",
        constraint: true,
        nullable: false,
        morph_key: None,
        pivot: PivotDefault::Convention,
        build: many_to_many::build,
        revert: many_to_many::revert,
    },
    KindSpec {
        kind: RelationKind::ManyToMorphed,
        inner_key: "{owner:primary_key}",
        outer_key: "{outer:primary_key}",
        constraint: true,
        nullable: false,
        morph_key: Some("{outer:role}_type"),
        pivot: PivotDefault::Required,
        build: morphed::build_many_to_morphed,
        revert: morphed::revert_many_to_morphed,
    },
];

// =============================================================================
// Resolution
// =============================================================================

/// One side of a relation, as seen by key templates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Endpoint<'a> {
    pub role: &'a str,
    pub primary_key: &'a str,
    pub table: Option<&'a str>,
}

impl<'a> Endpoint<'a> {
    pub fn entity(entity: &'a EntitySchema) -> Self {
        Self {
            role: entity.role_name(),
            primary_key: entity.primary_key_name(),
            table: Some(entity.table_name()),
        }
    }

    pub fn morphed(target: &'a MorphedTarget) -> Self {
        Self {
            role: &target.role,
            primary_key: &target.primary_key,
            table: None,
        }
    }
}

/// Expand `{side:field}` placeholders. Returns the offending placeholder on
/// failure.
pub(crate) fn expand_template(
    template: &str,
    owner: &Endpoint<'_>,
    outer: &Endpoint<'_>,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(after.to_string());
        };
        let placeholder = &after[..end];
        let value = match placeholder {
            "owner:role" => Some(owner.role),
            "owner:primary_key" => Some(owner.primary_key),
            "owner:table" => owner.table,
            "outer:role" => Some(outer.role),
            "outer:primary_key" => Some(outer.primary_key),
            "outer:table" => outer.table,
            _ => None,
        };
        match value {
            Some(value) => out.push_str(value),
            None => return Err(placeholder.to_string()),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Merge `options` over the conventions of `kind`.
pub(crate) fn resolve_definition(
    kind: RelationKind,
    options: &RelationOptions,
    owner: &Endpoint<'_>,
    outer: &Endpoint<'_>,
    entity: &str,
    relation: &str,
) -> Result<ResolvedDefinition, SchemaError> {
    let spec = kind.spec();
    let expand = |template: &str| {
        expand_template(template, owner, outer).map_err(|placeholder| {
            SchemaError::UnknownPlaceholder {
                entity: entity.to_string(),
                relation: relation.to_string(),
                template: template.to_string(),
                placeholder,
            }
        })
    };

    let inner_key = expand(options.inner_key.as_deref().unwrap_or(spec.inner_key))?;
    let outer_key = expand(options.outer_key.as_deref().unwrap_or(spec.outer_key))?;
    let constraint = options.constraint.unwrap_or(spec.constraint);
    let action = options.action.unwrap_or_default();
    let nullable = options.nullable.unwrap_or(spec.nullable);
    let morph_key = match options.morph_key.as_deref().or(spec.morph_key) {
        Some(template) => Some(expand(template)?),
        None => None,
    };

    let pivot = match spec.pivot {
        PivotDefault::None => None,
        PivotDefault::Convention | PivotDefault::Required => {
            let table = match (&options.pivot_table, spec.pivot) {
                (Some(table), _) => expand(table)?,
                (None, PivotDefault::Convention) => {
                    let mut roles = [owner.role, outer.role];
                    roles.sort();
                    roles.join("_")
                }
                (None, _) => {
                    return Err(SchemaError::MissingOption {
                        entity: entity.to_string(),
                        relation: relation.to_string(),
                        option: "pivot_table",
                    });
                }
            };
            Some(PivotDefinition {
                table,
                inner_key: expand(options.pivot_inner_key.as_deref().unwrap_or(PIVOT_INNER_KEY))?,
                outer_key: expand(options.pivot_outer_key.as_deref().unwrap_or(PIVOT_OUTER_KEY))?,
            })
        }
    };

    if let Some(pivot) = pivot.as_ref().filter(|p| p.inner_key == p.outer_key) {
        return Err(SchemaError::InvalidOption {
            entity: entity.to_string(),
            relation: relation.to_string(),
            reason: format!(
                "both pivot keys are named `{}`; set pivot_inner_key or pivot_outer_key",
                pivot.inner_key
            ),
        });
    }

    if action == ReferentialAction::SetNull && constraint {
        let reason = if pivot.is_some() {
            Some("set-null action on pivot keys, which are never nullable")
        } else if !nullable {
            Some("set-null action on a non-nullable key")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SchemaError::InvalidOption {
                entity: entity.to_string(),
                relation: relation.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    Ok(ResolvedDefinition {
        inner_key,
        outer_key,
        constraint,
        action,
        nullable,
        morph_key,
        pivot,
    })
}

/// Type of `column` on `entity`, as referenced from another table.
pub(crate) fn key_type(entity: &EntitySchema, column: &str) -> Option<AbstractType> {
    if column == entity.primary_key_name() {
        return Some(entity.primary_type().reference_type());
    }
    entity
        .columns()
        .iter()
        .find(|c| c.name == column)
        .map(|c| c.abstract_type.reference_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Endpoint<'static> {
        Endpoint {
            role: "post",
            primary_key: "id",
            table: Some("posts"),
        }
    }

    fn outer() -> Endpoint<'static> {
        Endpoint {
            role: "user",
            primary_key: "uid",
            table: Some("users"),
        }
    }

    #[test]
    fn test_dispatch_table_is_indexed_by_kind() {
        for kind in RelationKind::ALL {
            assert_eq!(kind.spec().kind, kind);
        }
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_template("{outer:role}_{outer:primary_key}", &owner(), &outer()),
            Ok("user_uid".to_string())
        );
        assert_eq!(
            expand_template("{owner:table}_ref", &owner(), &outer()),
            Ok("posts_ref".to_string())
        );
        assert_eq!(
            expand_template("plain", &owner(), &outer()),
            Ok("plain".to_string())
        );
    }

    #[test]
    fn test_expand_template_unknown_placeholder() {
        assert_eq!(
            expand_template("{outer:name}_id", &owner(), &outer()),
            Err("outer:name".to_string())
        );

        let morphed = Endpoint {
            role: "commentable",
            primary_key: "id",
            table: None,
        };
        assert_eq!(
            expand_template("{outer:table}_id", &owner(), &morphed),
            Err("outer:table".to_string())
        );
    }

    #[test]
    fn test_belongs_to_defaults() {
        let resolved = resolve_definition(
            RelationKind::BelongsTo,
            &RelationOptions::default(),
            &owner(),
            &outer(),
            "Post",
            "author",
        )
        .unwrap();

        assert_eq!(resolved.inner_key, "user_uid");
        assert_eq!(resolved.outer_key, "uid");
        assert!(resolved.constraint);
        assert_eq!(resolved.action, ReferentialAction::Cascade);
        assert!(resolved.nullable);
        assert_eq!(resolved.morph_key, None);
        assert_eq!(resolved.pivot, None);
    }

    #[test]
    fn test_user_options_take_precedence() {
        let options = RelationDefinition::belongs_to("User")
            .inner_key("author_id")
            .action(ReferentialAction::Restrict)
            .options()
            .clone();
        let resolved = resolve_definition(
            RelationKind::BelongsTo,
            &options,
            &owner(),
            &outer(),
            "Post",
            "author",
        )
        .unwrap();

        assert_eq!(resolved.inner_key, "author_id");
        assert_eq!(resolved.action, ReferentialAction::Restrict);
    }

    #[test]
    fn test_pivot_convention_sorts_roles() {
        let resolved = resolve_definition(
            RelationKind::ManyToMany,
            &RelationOptions::default(),
            &owner(),
            &outer(),
            "Post",
            "readers",
        )
        .unwrap();

        let pivot = resolved.pivot.unwrap();
        assert_eq!(pivot.table, "post_user");
        assert_eq!(pivot.inner_key, "post_id");
        assert_eq!(pivot.outer_key, "user_uid");
    }

    #[test]
    fn test_many_to_morphed_requires_pivot_table() {
        let err = resolve_definition(
            RelationKind::ManyToMorphed,
            &RelationOptions::default(),
            &owner(),
            &outer(),
            "Tag",
            "taggables",
        )
        .unwrap_err();

        assert_eq!(
            err,
            SchemaError::MissingOption {
                entity: "Tag".to_string(),
                relation: "taggables".to_string(),
                option: "pivot_table",
            }
        );
    }

    #[test]
    fn test_set_null_requires_nullable_key() {
        let options = RelationDefinition::belongs_to("User")
            .action(ReferentialAction::SetNull)
            .nullable(false)
            .options()
            .clone();
        let err = resolve_definition(
            RelationKind::BelongsTo,
            &options,
            &owner(),
            &outer(),
            "Post",
            "author",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidOption { .. }));

        let options = RelationDefinition::belongs_to("User")
            .action(ReferentialAction::SetNull)
            .options()
            .clone();
        assert!(
            resolve_definition(
                RelationKind::BelongsTo,
                &options,
                &owner(),
                &outer(),
                "Post",
                "author",
            )
            .is_ok()
        );
    }

    #[test]
    fn test_equivalent_kinds() {
        assert_eq!(
            RelationKind::BelongsTo.equivalent(),
            Some(RelationKind::BelongsToMorphed)
        );
        assert_eq!(
            RelationKind::ManyToMany.equivalent(),
            Some(RelationKind::ManyToMorphed)
        );
        assert_eq!(RelationKind::HasMany.equivalent(), None);
    }
}
