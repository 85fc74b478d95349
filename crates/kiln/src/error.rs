use crate::RelationKind;
use crate::solver::OrderError;
use thiserror::Error;

/// Declaration and build errors.
///
/// All of these are raised by [`SchemaBuilder`](crate::SchemaBuilder) before
/// any statement reaches the database.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("entity `{0}` is declared twice")]
    DuplicateEntity(String),

    #[error("entity `{entity}` claims table `{table}`, already claimed by incompatible entity `{existing}`")]
    DuplicateSchema {
        table: String,
        entity: String,
        existing: String,
    },

    #[error("relation `{entity}.{relation}` targets unknown entity `{target}`")]
    UnresolvedRelation {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation `{entity}.{relation}` ({kind}) targets `{target}`, implemented by {implementors} entities, and has no polymorphic equivalent")]
    AmbiguousRelation {
        entity: String,
        relation: String,
        kind: RelationKind,
        target: String,
        implementors: usize,
    },

    #[error("unable to revert {kind} relation `{entity}.{relation}`: back relation type is missing")]
    MissingBackRelation {
        entity: String,
        relation: String,
        kind: RelationKind,
    },

    #[error("{kind} relation `{entity}.{relation}` cannot be reverted as {back}")]
    InvalidBackRelation {
        entity: String,
        relation: String,
        kind: RelationKind,
        back: RelationKind,
    },

    #[error("entity `{entity}` already declares relation `{relation}`")]
    DuplicateRelation { entity: String, relation: String },

    #[error("column `{table}.{column}` is contributed by both {first} and {second}")]
    DuplicateColumn {
        table: String,
        column: String,
        first: String,
        second: String,
    },

    #[error("column `{table}.{column}` is redeclared by {contributor} with a different shape")]
    ColumnConflict {
        table: String,
        column: String,
        contributor: String,
    },

    #[error("foreign key on `{table}({columns})` is redeclared by {contributor} with a different target or actions")]
    ConstraintConflict {
        table: String,
        columns: String,
        contributor: String,
    },

    #[error("relation `{entity}.{relation}` requires option `{option}`, which has no default")]
    MissingOption {
        entity: String,
        relation: String,
        option: &'static str,
    },

    #[error("relation `{entity}.{relation}`: unknown placeholder `{{{placeholder}}}` in `{template}`")]
    UnknownPlaceholder {
        entity: String,
        relation: String,
        template: String,
        placeholder: String,
    },

    #[error("relation `{entity}.{relation}`: {reason}")]
    InvalidOption {
        entity: String,
        relation: String,
        reason: String,
    },

    #[error("implementors of `{target}` disagree on their primary key: {details}")]
    MorphedKeyMismatch { target: String, details: String },

    #[error("foreign keys form a cycle: {}", .tables.join(" -> "))]
    ConstraintCycle { tables: Vec<String> },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
