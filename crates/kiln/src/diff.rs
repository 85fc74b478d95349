//! Schema diffing: compare declared tables against the live database.
//!
//! A [`TableComparator`] compares one declared table with its live
//! counterpart (or with nothing, when the table doesn't exist yet) and lists
//! the [`Change`]s needed to bring the database in line.
//!
//! Comparison is set-based: column, index and foreign key order never
//! matter. Indexes are identified by their columns and uniqueness, foreign
//! keys by their columns, target and actions; names are ignored on both, so
//! a constraint created by hand under another name is not reported.
//!
//! There is no rename detection. A renamed column shows up as a drop plus an
//! add:
//!
//! ```text
//! post:
//!   - author_id
//!   + user_id: INTEGER (nullable)
//! ```
//!
//! Tables that only exist in the database are left alone.

use crate::schema::{add_foreign_key_sql, create_index_sql, create_table_sql};
use kiln_db_schema::{AbstractType, Column, ForeignKey, Index, Schema, Table, quote_ident};
use std::fmt;

/// A diff between the declared schema and the live one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Changes organized by table, in declaration order.
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.table_diffs.iter().map(|t| t.changes.len()).sum()
    }

    /// Generate SQL statements for all changes in this diff, table by table.
    ///
    /// This ignores foreign key ordering between tables; see
    /// [`PushPlan::to_sql`](crate::PushPlan::to_sql) for an applyable script.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for table_diff in &self.table_diffs {
            sql.push_str(&format!("-- Table: {}\n", table_diff.table));
            for change in &table_diff.changes {
                sql.push_str(&change.to_sql(&table_diff.table));
                sql.push('\n');
            }
            sql.push('\n');
        }
        sql
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// List of changes, in safe execution order.
    pub changes: Vec<Change>,
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create a table (without its indexes and foreign keys).
    AddTable(Table),
    /// Add a new column.
    AddColumn(Column),
    /// Drop an existing column.
    DropColumn(String),
    /// Change a column's type.
    AlterColumnType {
        name: String,
        from: AbstractType,
        to: AbstractType,
    },
    /// Change a column's nullability.
    AlterColumnNullable { name: String, from: bool, to: bool },
    /// Change a column's default value.
    AlterColumnDefault {
        name: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Add a foreign key.
    AddForeignKey(ForeignKey),
    /// Drop a foreign key.
    DropForeignKey(ForeignKey),
    /// Add an index.
    AddIndex(Index),
    /// Drop an index.
    DropIndex(String),
}

impl Change {
    /// The statement for this change, against `table_name`.
    pub fn to_sql(&self, table_name: &str) -> String {
        let alter = |clause: String| format!("ALTER TABLE {} {};", quote_ident(table_name), clause);
        match self {
            Change::AddTable(t) => create_table_sql(t),
            Change::AddColumn(col) => alter(format!("ADD COLUMN {}", column_definition(col))),
            Change::DropColumn(name) => alter(format!("DROP COLUMN {}", quote_ident(name))),
            Change::AlterColumnType { name, to, .. } => {
                // serial types only exist at creation time
                let to = to.reference_type();
                let column = quote_ident(name);
                alter(format!("ALTER COLUMN {column} TYPE {to} USING {column}::{to}"))
            }
            Change::AlterColumnNullable { name, to, .. } => {
                let action = if *to { "DROP NOT NULL" } else { "SET NOT NULL" };
                alter(format!("ALTER COLUMN {} {}", quote_ident(name), action))
            }
            Change::AlterColumnDefault { name, to, .. } => {
                let action = match to {
                    Some(default) => format!("SET DEFAULT {default}"),
                    None => "DROP DEFAULT".to_string(),
                };
                alter(format!("ALTER COLUMN {} {}", quote_ident(name), action))
            }
            Change::AddForeignKey(fk) => add_foreign_key_sql(table_name, fk),
            Change::DropForeignKey(fk) => alter(format!("DROP CONSTRAINT {}", quote_ident(&fk.name))),
            Change::AddIndex(idx) => create_index_sql(table_name, idx),
            Change::DropIndex(name) => format!("DROP INDEX {};", quote_ident(name)),
        }
    }

    /// Rank in the intra-table execution order: constraints and columns go
    /// away before new ones arrive, and constraints come last.
    fn rank(&self) -> u8 {
        match self {
            Change::DropForeignKey(_) => 0,
            Change::DropIndex(_) => 1,
            Change::DropColumn(_) => 2,
            Change::AddTable(_) => 3,
            Change::AddColumn(_) => 4,
            Change::AlterColumnType { .. }
            | Change::AlterColumnNullable { .. }
            | Change::AlterColumnDefault { .. } => 5,
            Change::AddIndex(_) => 6,
            Change::AddForeignKey(_) => 7,
        }
    }
}

/// `"name" TYPE [PRIMARY KEY] [NOT NULL] [DEFAULT x]`
fn column_definition(col: &Column) -> String {
    let mut sql = format!("{} {}", quote_ident(&col.name), col.abstract_type);
    if col.primary_key {
        sql.push_str(" PRIMARY KEY");
    } else if !col.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

fn nullability(nullable: bool) -> &'static str {
    if nullable { "nullable" } else { "not null" }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::AddColumn(col) if col.nullable => {
                write!(f, "+ {}: {} (nullable)", col.name, col.abstract_type)
            }
            Change::AddColumn(col) => write!(f, "+ {}: {}", col.name, col.abstract_type),
            Change::DropColumn(name) => write!(f, "- {name}"),
            Change::AlterColumnType { name, from, to } => write!(f, "~ {name}: {from} -> {to}"),
            Change::AlterColumnNullable { name, from, to } => {
                write!(f, "~ {name}: {} -> {}", nullability(*from), nullability(*to))
            }
            Change::AlterColumnDefault { name, from, to } => write!(
                f,
                "~ {name} default: {} -> {}",
                from.as_deref().unwrap_or("(none)"),
                to.as_deref().unwrap_or("(none)")
            ),
            Change::AddForeignKey(fk) | Change::DropForeignKey(fk) => {
                let sign = if matches!(self, Change::AddForeignKey(_)) { '+' } else { '-' };
                write!(
                    f,
                    "{sign} FOREIGN KEY ({}) -> {}.{} ON DELETE {}",
                    fk.columns.join(", "),
                    fk.references_table,
                    fk.references_columns.join(", "),
                    fk.on_delete
                )
            }
            Change::AddIndex(idx) => write!(
                f,
                "+ {}INDEX {} ({})",
                if idx.unique { "UNIQUE " } else { "" },
                idx.name,
                idx.columns.join(", ")
            ),
            Change::DropIndex(name) => write!(f, "- INDEX {name}"),
        }
    }
}

/// A column present on both sides whose shape changed.
#[derive(Debug, Clone, PartialEq)]
pub struct AlteredColumn {
    pub current: Column,
    pub declared: Column,
}

/// Differences between one declared table and its live counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct TableComparator {
    declared: Table,
    exists: bool,
    added_columns: Vec<Column>,
    removed_columns: Vec<Column>,
    altered_columns: Vec<AlteredColumn>,
    added_indexes: Vec<Index>,
    removed_indexes: Vec<Index>,
    added_foreign_keys: Vec<ForeignKey>,
    removed_foreign_keys: Vec<ForeignKey>,
}

impl TableComparator {
    /// Compare `declared` with the live table, `None` meaning it doesn't
    /// exist yet.
    pub fn compare(declared: &Table, current: Option<&Table>) -> Self {
        let Some(current) = current else {
            return Self {
                declared: declared.clone(),
                exists: false,
                added_columns: declared.columns.clone(),
                removed_columns: Vec::new(),
                altered_columns: Vec::new(),
                added_indexes: declared.indices.clone(),
                removed_indexes: Vec::new(),
                added_foreign_keys: declared.foreign_keys.clone(),
                removed_foreign_keys: Vec::new(),
            };
        };

        let (added_columns, removed_columns, altered_columns) =
            diff_columns(&declared.columns, &current.columns);

        Self {
            declared: declared.clone(),
            exists: true,
            added_columns,
            removed_columns,
            altered_columns,
            added_indexes: missing_from(&declared.indices, &current.indices, Index::same_shape),
            removed_indexes: missing_from(&current.indices, &declared.indices, Index::same_shape),
            added_foreign_keys: missing_from(
                &declared.foreign_keys,
                &current.foreign_keys,
                ForeignKey::same_shape,
            ),
            removed_foreign_keys: missing_from(
                &current.foreign_keys,
                &declared.foreign_keys,
                ForeignKey::same_shape,
            ),
        }
    }

    pub fn table(&self) -> &str {
        &self.declared.name
    }

    /// Whether the table is missing from the database.
    pub fn is_new(&self) -> bool {
        !self.exists
    }

    pub fn has_changes(&self) -> bool {
        !self.exists
            || !self.added_columns.is_empty()
            || !self.removed_columns.is_empty()
            || !self.altered_columns.is_empty()
            || !self.added_indexes.is_empty()
            || !self.removed_indexes.is_empty()
            || !self.added_foreign_keys.is_empty()
            || !self.removed_foreign_keys.is_empty()
    }

    pub fn added_columns(&self) -> &[Column] {
        &self.added_columns
    }

    pub fn removed_columns(&self) -> &[Column] {
        &self.removed_columns
    }

    pub fn altered_columns(&self) -> &[AlteredColumn] {
        &self.altered_columns
    }

    pub fn added_indexes(&self) -> &[Index] {
        &self.added_indexes
    }

    pub fn removed_indexes(&self) -> &[Index] {
        &self.removed_indexes
    }

    pub fn added_foreign_keys(&self) -> &[ForeignKey] {
        &self.added_foreign_keys
    }

    pub fn removed_foreign_keys(&self) -> &[ForeignKey] {
        &self.removed_foreign_keys
    }

    /// The changes, in the order they must run.
    pub fn changes(&self) -> Vec<Change> {
        let mut changes = Vec::new();

        if self.exists {
            changes.extend(self.added_columns.iter().cloned().map(Change::AddColumn));
            changes.extend(
                self.removed_columns
                    .iter()
                    .map(|c| Change::DropColumn(c.name.clone())),
            );
            for altered in &self.altered_columns {
                changes.extend(alter_column(&altered.current, &altered.declared));
            }
        } else {
            changes.push(Change::AddTable(Table {
                indices: Vec::new(),
                foreign_keys: Vec::new(),
                ..self.declared.clone()
            }));
        }

        changes.extend(self.added_indexes.iter().cloned().map(Change::AddIndex));
        changes.extend(
            self.removed_indexes
                .iter()
                .map(|idx| Change::DropIndex(idx.name.clone())),
        );
        changes.extend(
            self.added_foreign_keys
                .iter()
                .cloned()
                .map(Change::AddForeignKey),
        );
        changes.extend(
            self.removed_foreign_keys
                .iter()
                .cloned()
                .map(Change::DropForeignKey),
        );

        // stable: keeps declaration order within a rank
        changes.sort_by_key(Change::rank);
        changes
    }

    pub fn to_diff(&self) -> TableDiff {
        TableDiff {
            table: self.declared.name.clone(),
            changes: self.changes(),
        }
    }
}

/// Items of `from` that have no same-shaped counterpart in `other`.
fn missing_from<T: Clone>(from: &[T], other: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<T> {
    from.iter()
        .filter(|item| !other.iter().any(|o| same(item, o)))
        .cloned()
        .collect()
}

/// Diff columns between declared and current state.
fn diff_columns(
    declared: &[Column],
    current: &[Column],
) -> (Vec<Column>, Vec<Column>, Vec<AlteredColumn>) {
    let mut added = Vec::new();
    let mut altered = Vec::new();

    for col in declared {
        match current.iter().find(|c| c.name == col.name) {
            None => added.push(col.clone()),
            Some(current_col) => {
                if !alter_column(current_col, col).is_empty() {
                    altered.push(AlteredColumn {
                        current: current_col.clone(),
                        declared: col.clone(),
                    });
                }
            }
        }
    }

    let removed = current
        .iter()
        .filter(|c| !declared.iter().any(|d| d.name == c.name))
        .cloned()
        .collect();

    (added, removed, altered)
}

fn alter_column(current: &Column, declared: &Column) -> Vec<Change> {
    let mut changes = Vec::new();

    // Type change
    if declared.abstract_type != current.abstract_type {
        changes.push(Change::AlterColumnType {
            name: declared.name.clone(),
            from: current.abstract_type,
            to: declared.abstract_type,
        });
    }

    // Nullability change
    if declared.nullable != current.nullable {
        changes.push(Change::AlterColumnNullable {
            name: declared.name.clone(),
            from: current.nullable,
            to: declared.nullable,
        });
    }

    // Default change
    if declared.default != current.default {
        changes.push(Change::AlterColumnDefault {
            name: declared.name.clone(),
            from: current.default.clone(),
            to: declared.default.clone(),
        });
    }

    changes
}

/// Diff every declared table against `live`, keeping tables with changes.
pub fn diff_schemas(declared: &Schema, live: &Schema) -> SchemaDiff {
    let table_diffs = declared
        .iter_tables()
        .map(|table| TableComparator::compare(table, live.get_table(&table.name)))
        .filter(TableComparator::has_changes)
        .map(|comparator| comparator.to_diff())
        .collect();

    SchemaDiff { table_diffs }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            writeln!(f, "Changes detected:\n")?;
            for table_diff in &self.table_diffs {
                writeln!(f, "  {}:", table_diff.table)?;
                for change in &table_diff.changes {
                    writeln!(f, "    {}", change)?;
                }
            }
        }
        Ok(())
    }
}
