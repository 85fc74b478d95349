//! Entity declarations.
//!
//! An [`EntitySchema`] is what an entity author writes: a name, the table it
//! maps to, its primary key, plain columns, and named relations to other
//! entities. Relation columns are never declared here; they are derived by
//! the relation kinds during [`SchemaBuilder::resolve_relations`].
//!
//! ```ignore
//! use kiln::{AbstractType, Column, EntitySchema, RelationDefinition};
//!
//! let post = EntitySchema::new("Post")
//!     .column(Column::new("title", AbstractType::String(255)))
//!     .relation("author", RelationDefinition::belongs_to("User"));
//! ```
//!
//! [`SchemaBuilder::resolve_relations`]: crate::SchemaBuilder::resolve_relations

use crate::relation::RelationDefinition;
use heck::ToSnakeCase;
use indexmap::IndexMap;
use kiln_db_schema::{AbstractType, Column, Index, Table};
use std::fmt;

/// Position of an entity in the builder's arena.
///
/// Assigned at registration; stable for the lifetime of a build pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IndexDecl {
    columns: Vec<String>,
    unique: bool,
}

/// Declared shape of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    name: String,
    table: String,
    role: String,
    primary_key: String,
    primary_type: AbstractType,
    implements: Vec<String>,
    source: Option<String>,
    columns: Vec<Column>,
    indices: Vec<IndexDecl>,
    relations: IndexMap<String, RelationDefinition>,
    /// Relation names declared more than once; refused at registration.
    redeclared: Vec<String>,
}

impl EntitySchema {
    /// Declare an entity. Role and table default to the snake_case name,
    /// the primary key to `id SERIAL`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let role = name.to_snake_case();
        Self {
            table: role.clone(),
            role,
            name,
            primary_key: "id".to_string(),
            primary_type: AbstractType::Primary,
            implements: Vec::new(),
            source: None,
            columns: Vec::new(),
            indices: Vec::new(),
            relations: IndexMap::new(),
            redeclared: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn primary_key(mut self, name: impl Into<String>, abstract_type: AbstractType) -> Self {
        self.primary_key = name.into();
        self.primary_type = abstract_type;
        self
    }

    /// Mark this entity as an implementor of `interface`.
    ///
    /// Relations may target an interface name instead of an entity; see
    /// [`RelationKind::equivalent`](crate::RelationKind::equivalent).
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Name of the record source (repository) serving this entity.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, columns: &[&str]) -> Self {
        self.indices.push(IndexDecl {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        });
        self
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.indices.push(IndexDecl {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: true,
        });
        self
    }

    /// Declare a relation. The first declaration of a name wins; repeating
    /// it makes [`SchemaBuilder::add_schema`](crate::SchemaBuilder::add_schema)
    /// fail with `DuplicateRelation`.
    pub fn relation(mut self, name: impl Into<String>, definition: RelationDefinition) -> Self {
        let name = name.into();
        if self.relations.contains_key(&name) {
            self.redeclared.push(name);
        } else {
            self.relations.insert(name, definition);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn role_name(&self) -> &str {
        &self.role
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    /// Declared primary key type (possibly auto-incrementing).
    pub fn primary_type(&self) -> AbstractType {
        self.primary_type
    }

    pub fn interfaces(&self) -> &[String] {
        &self.implements
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Relations in declaration order, including inverses registered during
    /// resolution.
    pub fn relations(&self) -> &IndexMap<String, RelationDefinition> {
        &self.relations
    }

    pub(crate) fn redeclared_relation(&self) -> Option<&str> {
        self.redeclared.first().map(String::as_str)
    }

    pub(crate) fn has_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub(crate) fn add_relation(&mut self, name: String, definition: RelationDefinition) {
        self.relations.insert(name, definition);
    }

    /// The table shape this entity declares on its own, before relations.
    pub fn declared_table(&self) -> Table {
        let mut table = Table::new(self.table.clone());
        table
            .columns
            .push(Column::primary(self.primary_key.clone(), self.primary_type));
        table.columns.extend(
            self.columns
                .iter()
                .filter(|c| c.name != self.primary_key)
                .cloned(),
        );
        for decl in &self.indices {
            let index = if decl.unique {
                Index::unique(&self.table, &decl.columns)
            } else {
                Index::new(&self.table, &decl.columns)
            };
            table.indices.push(index);
        }
        table
    }

    /// Whether `other` can share this entity's table.
    ///
    /// Both must agree on the primary key, and columns declared by both must
    /// have the same shape.
    pub fn compatible_with(&self, other: &EntitySchema) -> bool {
        if self.primary_key != other.primary_key || self.primary_type != other.primary_type {
            return false;
        }
        self.columns.iter().all(|mine| {
            other
                .columns
                .iter()
                .filter(|theirs| theirs.name == mine.name)
                .all(|theirs| theirs.same_shape(mine))
        })
    }
}

impl fmt::Display for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An entity declaration submitted through `inventory`.
///
/// ```ignore
/// fn user() -> kiln::EntitySchema {
///     kiln::EntitySchema::new("User")
/// }
///
/// kiln::inventory::submit!(kiln::EntityRegistration::new(user));
/// ```
pub struct EntityRegistration {
    declare: fn() -> EntitySchema,
}

impl EntityRegistration {
    pub const fn new(declare: fn() -> EntitySchema) -> Self {
        Self { declare }
    }

    pub fn declare(&self) -> EntitySchema {
        (self.declare)()
    }
}
