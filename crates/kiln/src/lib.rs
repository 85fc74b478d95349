//! ORM schema builder for Postgres.
//!
//! Entities declare their own columns plus relations to other entities (or
//! to interfaces several entities implement). kiln resolves those relations
//! into the physical tables they imply: foreign key columns, morph
//! discriminators, pivot tables, indexes and constraints. It then compares
//! the result against the live database and pushes the difference, or
//! writes it out as a migration.
//!
//! ```ignore
//! use kiln::{EntitySchema, RelationDefinition, RelationKind, SchemaBuilder, SchemaCodegen};
//!
//! let mut builder = SchemaBuilder::new();
//! builder.add_schema(EntitySchema::new("User"))?;
//! builder.add_schema(EntitySchema::new("Post").relation(
//!     "author",
//!     RelationDefinition::belongs_to("User").inverse("posts", Some(RelationKind::HasMany)),
//! ))?;
//!
//! let resolved = builder.resolve_relations()?;
//! println!("{}", resolved.schema().to_sql());
//! ```
//!
//! # Naming Convention
//!
//! **Table names use singular form** (e.g., `user`, `post`, `comment`).
//! Foreign key columns are `{role}_{primary key}` (`user_id`), pivot tables
//! join both roles alphabetically (`post_tag`).
//!
//! # Registration
//!
//! Entities can also be registered from anywhere in the program and picked
//! up with [`SchemaBuilder::collect`]:
//!
//! ```ignore
//! fn user() -> kiln::EntitySchema {
//!     kiln::EntitySchema::new("User")
//! }
//!
//! kiln::inventory::submit!(kiln::EntityRegistration::new(user));
//! ```

mod builder;
mod diff;
mod entity;
mod error;
pub mod introspect;
mod migration;
mod push;
pub mod relation;
mod render;
pub mod schema;
pub mod solver;
mod table;
mod traced;

pub use builder::{ResolvedSchema, SchemaBuilder, TableState};
pub use diff::{AlteredColumn, Change, SchemaDiff, TableComparator, TableDiff, diff_schemas};
pub use entity::{EntityId, EntityRegistration, EntitySchema};
pub use error::{Error, SchemaError};
pub use migration::{MigrationArtifact, MigrationHelper, SqlMigrationWriter, verify_checksum};
pub use push::{
    ApplyError, DdlExecutor, PostgresExecutor, PushReport, StepReport, StepStatus, apply_plan,
};
pub use relation::{
    Inverse, MORPH_KEY_TYPE, MorphedTarget, PivotDefinition, RelationDefinition, RelationId,
    RelationKind, RelationOptions, RelationSchema, RelationTarget, ResolvedDefinition,
};
pub use render::{ModelInfo, PivotInfo, RelationInfo, RenderedSchema, SchemaStats};
pub use schema::SchemaCodegen;
pub use solver::{CyclePolicy, OrderError, PushPlan, PushStep, StepPhase, plan_push};
pub use table::{Contributor, TableBuilder};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use kiln_db_schema::{
    AbstractType, Column, ForeignKey, Index, ReferentialAction, Schema, Table, quote_ident,
};

// Re-export inventory for entity registration
pub use inventory;

pub type Result<T> = std::result::Result<T, Error>;

inventory::collect!(EntityRegistration);
