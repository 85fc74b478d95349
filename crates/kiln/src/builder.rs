//! Schema assembly: from declared entities to frozen tables.
//!
//! ```ignore
//! let mut builder = SchemaBuilder::new();
//! builder.add_schema(user)?;
//! builder.add_schema(post)?;
//!
//! let resolved = builder.resolve_relations()?;
//! let live = kiln::introspect::load_schema(&client, &resolved.table_names()).await?;
//! let report = resolved.push_schema(&mut PostgresExecutor::new(&mut client), &live).await?;
//! ```
//!
//! Resolution happens in one pass that either fails before touching the
//! database or yields an immutable [`ResolvedSchema`].

use crate::diff::{SchemaDiff, TableComparator, diff_schemas};
use crate::entity::{EntityId, EntityRegistration, EntitySchema};
use crate::error::SchemaError;
use crate::push::{DdlExecutor, PushReport, apply_plan};
use crate::relation::{
    Endpoint, MorphedTarget, RelationDefinition, RelationId, RelationKind, RelationSchema,
    RelationTarget, resolve_definition,
};
use crate::solver::{CyclePolicy, OrderError, PushPlan, plan_push};
use crate::table::{BuildContext, TableBuilder};
use heck::ToSnakeCase;
use indexmap::IndexMap;
use kiln_db_schema::{Schema, Table};
use std::collections::HashMap;

/// Collects entity declarations for one build pass.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntitySchema>,
    cycle_policy: CyclePolicy,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder holding every entity submitted with
    /// `inventory::submit!(EntityRegistration::new(..))`, sorted by name.
    pub fn collect() -> Result<Self, SchemaError> {
        let mut declared: Vec<EntitySchema> = inventory::iter::<EntityRegistration>
            .into_iter()
            .map(EntityRegistration::declare)
            .collect();
        declared.sort_by(|a, b| a.name().cmp(b.name()));

        let mut builder = Self::new();
        for entity in declared {
            builder.add_schema(entity)?;
        }
        Ok(builder)
    }

    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    /// Register an entity.
    ///
    /// Entities may share a table as long as they agree on its primary key
    /// and on the columns both declare.
    pub fn add_schema(&mut self, entity: EntitySchema) -> Result<EntityId, SchemaError> {
        if self.entities.iter().any(|e| e.name() == entity.name()) {
            return Err(SchemaError::DuplicateEntity(entity.name().to_string()));
        }
        if let Some(relation) = entity.redeclared_relation() {
            return Err(SchemaError::DuplicateRelation {
                entity: entity.name().to_string(),
                relation: relation.to_string(),
            });
        }
        if let Some(existing) = self
            .entities
            .iter()
            .find(|e| e.table_name() == entity.table_name() && !e.compatible_with(&entity))
        {
            return Err(SchemaError::DuplicateSchema {
                table: entity.table_name().to_string(),
                entity: entity.name().to_string(),
                existing: existing.name().to_string(),
            });
        }

        let id = EntityId(self.entities.len());
        self.entities.push(entity);
        Ok(id)
    }

    /// Resolve every relation, build every table, and freeze the result.
    pub fn resolve_relations(self) -> Result<ResolvedSchema, SchemaError> {
        let Self {
            mut entities,
            cycle_policy,
        } = self;

        let index = EntityIndex::new(&entities);
        let mut relations = Vec::new();
        for (owner, entity) in entities.iter().enumerate() {
            for (name, definition) in entity.relations() {
                let id = RelationId(relations.len());
                relations.push(resolve_relation(
                    id,
                    EntityId(owner),
                    name,
                    definition,
                    &entities,
                    &index,
                )?);
            }
        }

        let declared = relations.len();
        for origin in 0..declared {
            let Some(inverse) = relations[origin].inverse.clone() else {
                continue;
            };
            let reverted = relations[origin].revert(&inverse, &entities)?;
            for (target, definition) in reverted {
                let target_entity = &mut entities[target.index()];
                if target_entity.has_relation(&inverse.name) {
                    return Err(SchemaError::DuplicateRelation {
                        entity: target_entity.name().to_string(),
                        relation: inverse.name.clone(),
                    });
                }
                target_entity.add_relation(inverse.name.clone(), definition.clone());

                let id = RelationId(relations.len());
                let mut schema =
                    resolve_relation(id, target, &inverse.name, &definition, &entities, &index)?;
                schema.paired_with = Some(RelationId(origin));
                relations.push(schema);
            }
        }

        let tables = build_tables(&entities, &relations)?;
        let schema: Schema = tables.into_values().map(TableBuilder::freeze).collect();

        if let Some(cycle) = find_cycle(&schema) {
            match cycle_policy {
                CyclePolicy::Reject => {
                    return Err(SchemaError::ConstraintCycle { tables: cycle });
                }
                CyclePolicy::Defer => {
                    tracing::warn!(
                        cycle = %cycle.join(" -> "),
                        "foreign keys form a cycle, their constraints will be deferred"
                    );
                }
            }
        }

        tracing::debug!(
            entities = entities.len(),
            relations = relations.len(),
            tables = schema.tables.len(),
            "schema resolved"
        );

        Ok(ResolvedSchema {
            entities,
            relations,
            schema,
            cycle_policy,
        })
    }
}

/// Name and interface lookup, built once per pass.
struct EntityIndex {
    by_name: HashMap<String, EntityId>,
    by_interface: HashMap<String, Vec<EntityId>>,
}

impl EntityIndex {
    fn new(entities: &[EntitySchema]) -> Self {
        let mut by_name = HashMap::new();
        let mut by_interface: HashMap<String, Vec<EntityId>> = HashMap::new();
        for (index, entity) in entities.iter().enumerate() {
            by_name.insert(entity.name().to_string(), EntityId(index));
            for interface in entity.interfaces() {
                by_interface
                    .entry(interface.clone())
                    .or_default()
                    .push(EntityId(index));
            }
        }
        Self {
            by_name,
            by_interface,
        }
    }

    fn implementors(&self, name: &str) -> &[EntityId] {
        self.by_interface.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn morphed_target(
    name: &str,
    role: String,
    implementors: Vec<EntityId>,
    entities: &[EntitySchema],
) -> Result<MorphedTarget, SchemaError> {
    let mut members = implementors.iter().map(|id| &entities[id.index()]);
    let Some(first) = members.next() else {
        return Err(SchemaError::MorphedKeyMismatch {
            target: name.to_string(),
            details: "no implementors".to_string(),
        });
    };
    let primary_key = first.primary_key_name();
    let key_type = first.primary_type().reference_type();

    if members.any(|e| {
        e.primary_key_name() != primary_key || e.primary_type().reference_type() != key_type
    }) {
        let details = implementors
            .iter()
            .map(|id| {
                let e = &entities[id.index()];
                format!(
                    "{}({} {})",
                    e.name(),
                    e.primary_key_name(),
                    e.primary_type().reference_type().abstract_name()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(SchemaError::MorphedKeyMismatch {
            target: name.to_string(),
            details,
        });
    }

    Ok(MorphedTarget {
        interface: name.to_string(),
        role,
        primary_key: primary_key.to_string(),
        key_type,
        implementors,
    })
}

/// Pick the effective kind and target of a declared relation.
fn resolve_target(
    kind: RelationKind,
    target: &str,
    index: &EntityIndex,
    entities: &[EntitySchema],
    entity: &str,
    relation: &str,
) -> Result<(RelationKind, RelationTarget), SchemaError> {
    let unresolved = || SchemaError::UnresolvedRelation {
        entity: entity.to_string(),
        relation: relation.to_string(),
        target: target.to_string(),
    };
    let implementors = index.implementors(target);

    if kind.is_morphed() {
        let (role, implementors) = match (implementors.is_empty(), index.by_name.get(target)) {
            (false, _) => (target.to_snake_case(), implementors.to_vec()),
            (true, Some(&id)) => (entities[id.index()].role_name().to_string(), vec![id]),
            (true, None) => return Err(unresolved()),
        };
        let morphed = morphed_target(target, role, implementors, entities)?;
        return Ok((kind, RelationTarget::Morphed(morphed)));
    }

    if let Some(&id) = index.by_name.get(target) {
        return Ok((kind, RelationTarget::Entity(id)));
    }

    match implementors {
        [] => Err(unresolved()),
        [id] => Ok((kind, RelationTarget::Entity(*id))),
        _ => match kind.equivalent() {
            Some(equivalent) => {
                let morphed =
                    morphed_target(target, target.to_snake_case(), implementors.to_vec(), entities)?;
                Ok((equivalent, RelationTarget::Morphed(morphed)))
            }
            None => Err(SchemaError::AmbiguousRelation {
                entity: entity.to_string(),
                relation: relation.to_string(),
                kind,
                target: target.to_string(),
                implementors: implementors.len(),
            }),
        },
    }
}

fn resolve_relation(
    id: RelationId,
    owner: EntityId,
    name: &str,
    definition: &RelationDefinition,
    entities: &[EntitySchema],
    index: &EntityIndex,
) -> Result<RelationSchema, SchemaError> {
    let owner_entity = &entities[owner.index()];
    let (kind, target) = resolve_target(
        definition.kind(),
        definition.target(),
        index,
        entities,
        owner_entity.name(),
        name,
    )?;

    let outer = match &target {
        RelationTarget::Entity(id) => Endpoint::entity(&entities[id.index()]),
        RelationTarget::Morphed(morphed) => Endpoint::morphed(morphed),
    };
    let resolved = resolve_definition(
        kind,
        definition.options(),
        &Endpoint::entity(owner_entity),
        &outer,
        owner_entity.name(),
        name,
    )?;

    if kind != definition.kind() {
        tracing::debug!(
            entity = owner_entity.name(),
            relation = name,
            declared = %definition.kind(),
            %kind,
            "target has several implementors, using the polymorphic kind"
        );
    }

    Ok(RelationSchema {
        id,
        name: name.to_string(),
        owner,
        kind,
        declared_kind: definition.kind(),
        target,
        definition: resolved,
        inverse: definition.options().inverse.clone(),
        paired_with: None,
    })
}

/// Seed one builder per table with the declared shapes, then let every
/// relation contribute in order.
fn build_tables(
    entities: &[EntitySchema],
    relations: &[RelationSchema],
) -> Result<IndexMap<String, TableBuilder>, SchemaError> {
    let mut tables: IndexMap<String, TableBuilder> = IndexMap::new();
    for (index, entity) in entities.iter().enumerate() {
        let table = tables
            .entry(entity.table_name().to_string())
            .or_insert_with(|| TableBuilder::new(entity.table_name()));
        table
            .seed(entity.declared_table(), EntityId(index))
            .map_err(|_| SchemaError::DuplicateSchema {
                table: entity.table_name().to_string(),
                entity: entity.name().to_string(),
                existing: entities
                    .iter()
                    .find(|e| e.table_name() == entity.table_name())
                    .map(|e| e.name().to_string())
                    .unwrap_or_default(),
            })?;
    }

    apply_relations(entities, relations, &mut tables)?;
    Ok(tables)
}

fn apply_relations(
    entities: &[EntitySchema],
    relations: &[RelationSchema],
    tables: &mut IndexMap<String, TableBuilder>,
) -> Result<(), SchemaError> {
    let mut ctx = BuildContext {
        entities,
        relations,
        tables,
    };
    for relation in relations {
        relation.build_schema(&mut ctx)?;
    }
    Ok(())
}

/// A foreign key cycle between distinct tables, as a closed path.
fn find_cycle(schema: &Schema) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    fn visit(
        schema: &Schema,
        table: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        marks[table] = Mark::Active;
        path.push(table);

        let (_, current) = schema.tables.get_index(table)?;
        for referenced in current.referenced_tables() {
            let Some(next) = schema.tables.get_index_of(referenced) else {
                continue;
            };
            match marks[next] {
                Mark::Active => {
                    let start = path.iter().position(|&t| t == next).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&t| schema.tables[t].name.clone())
                        .collect();
                    cycle.push(schema.tables[next].name.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(schema, next, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[table] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; schema.tables.len()];
    let mut path = Vec::new();
    for table in 0..schema.tables.len() {
        if marks[table] == Mark::Unvisited {
            if let Some(cycle) = visit(schema, table, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

/// The outcome of a successful build pass. Immutable.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    entities: Vec<EntitySchema>,
    relations: Vec<RelationSchema>,
    schema: Schema,
    cycle_policy: CyclePolicy,
}

/// A declared table together with its comparison against the live one.
#[derive(Debug, Clone)]
pub struct TableState<'a> {
    table: &'a Table,
    comparator: TableComparator,
}

impl<'a> TableState<'a> {
    pub fn table(&self) -> &'a Table {
        self.table
    }

    pub fn comparator(&self) -> &TableComparator {
        &self.comparator
    }

    pub fn has_changes(&self) -> bool {
        self.comparator.has_changes()
    }
}

impl ResolvedSchema {
    /// Entities, including inverse relations registered during resolution.
    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> &EntitySchema {
        &self.entities[id.index()]
    }

    pub fn relations(&self) -> &[RelationSchema] {
        &self.relations
    }

    pub fn relation(&self, id: RelationId) -> &RelationSchema {
        &self.relations[id.index()]
    }

    /// The declared tables: entity tables first, then pivot tables.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.schema.get_table(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.schema.tables.keys().cloned().collect()
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        self.cycle_policy
    }

    /// Every declared table paired with its comparator against `live`.
    pub fn tables<'a>(&'a self, live: &'a Schema) -> impl Iterator<Item = TableState<'a>> + 'a {
        self.schema.iter_tables().map(move |table| TableState {
            table,
            comparator: TableComparator::compare(table, live.get_table(&table.name)),
        })
    }

    pub fn has_changes(&self, live: &Schema) -> bool {
        self.tables(live).any(|state| state.has_changes())
    }

    pub fn diff(&self, live: &Schema) -> SchemaDiff {
        diff_schemas(&self.schema, live)
    }

    /// Order the changes against `live` into per-table steps.
    pub fn plan(&self, live: &Schema) -> Result<PushPlan, OrderError> {
        plan_push(&self.diff(live), live, self.cycle_policy)
    }

    /// Apply the changes against `live`, one table per step, in foreign key
    /// order. Tables without changes are skipped.
    ///
    /// Planning errors abort before any statement runs. Failures while
    /// applying are reported per step in the returned [`PushReport`].
    pub async fn push_schema<E: DdlExecutor>(
        &self,
        executor: &mut E,
        live: &Schema,
    ) -> crate::Result<PushReport> {
        let plan = self.plan(live)?;
        if plan.is_empty() {
            tracing::info!("schema is up to date");
        }
        Ok(apply_plan(&plan, executor).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_db_schema::{AbstractType, Column};

    fn blog() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder
            .add_schema(
                EntitySchema::new("User").column(Column::new("email", AbstractType::String(255))),
            )
            .unwrap();
        builder
            .add_schema(
                EntitySchema::new("Post")
                    .relation(
                        "author",
                        RelationDefinition::belongs_to("User")
                            .inverse("posts", Some(RelationKind::HasMany)),
                    )
                    .relation("tags", RelationDefinition::many_to_many("Tag").inverse("posts", None)),
            )
            .unwrap();
        builder.add_schema(EntitySchema::new("Tag")).unwrap();
        builder
    }

    #[test]
    fn test_build_is_idempotent() {
        let resolved = blog().resolve_relations().unwrap();

        let mut tables = build_tables(&resolved.entities, &resolved.relations).unwrap();
        let once: Schema = tables.values().cloned().map(TableBuilder::freeze).collect();

        apply_relations(&resolved.entities, &resolved.relations, &mut tables).unwrap();
        let twice: Schema = tables.into_values().map(TableBuilder::freeze).collect();

        assert_eq!(once, twice);
        assert_eq!(&once, resolved.schema());
    }

    #[test]
    fn test_inverses_are_paired() {
        let resolved = blog().resolve_relations().unwrap();

        let names: Vec<(&str, &str)> = resolved
            .relations()
            .iter()
            .map(|r| (resolved.entity(r.owner()).name(), r.name()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Post", "author"),
                ("Post", "tags"),
                ("User", "posts"),
                ("Tag", "posts"),
            ]
        );

        let posts = &resolved.relations()[2];
        assert_eq!(posts.kind(), RelationKind::HasMany);
        assert_eq!(posts.paired_with(), Some(RelationId(0)));
        assert_eq!(posts.definition().outer_key, "user_id");
        assert!(resolved.entities()[0].relations().contains_key("posts"));
    }

    #[test]
    fn test_pivot_table_is_shared() {
        let resolved = blog().resolve_relations().unwrap();
        let names = resolved.table_names();
        assert_eq!(names, vec!["user", "post", "tag", "post_tag"]);

        let pivot = resolved.table("post_tag").unwrap();
        assert_eq!(pivot.columns.len(), 2);
        assert_eq!(pivot.foreign_keys.len(), 2);
        // one per key plus the unique pair
        assert_eq!(pivot.indices.len(), 3);
    }

    #[test]
    fn test_find_cycle() {
        let mut a = Table::new("a");
        a.foreign_keys.push(kiln_db_schema::ForeignKey::new(
            "a",
            "b_id",
            "b",
            "id",
            Default::default(),
        ));
        let mut b = Table::new("b");
        b.foreign_keys.push(kiln_db_schema::ForeignKey::new(
            "b",
            "a_id",
            "a",
            "id",
            Default::default(),
        ));
        let c = Table::new("c");

        let schema: Schema = [c.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(
            find_cycle(&schema),
            Some(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );

        let schema: Schema = [c, a].into_iter().collect();
        assert_eq!(find_cycle(&schema), None);
    }
}
