//! Mutable table shapes used while relations are built.
//!
//! A [`TableBuilder`] accumulates columns, indexes and foreign keys and
//! remembers who contributed each column and constraint. That is what lets
//! a relation re-add its own column (or its inverse add the same column)
//! without error, while two unrelated relations claiming the same column
//! name fail the build. Builders only exist during
//! [`SchemaBuilder::resolve_relations`](crate::SchemaBuilder::resolve_relations);
//! afterwards they are frozen into plain [`Table`]s.

use crate::entity::{EntityId, EntitySchema};
use crate::error::SchemaError;
use crate::relation::{RelationId, RelationSchema};
use indexmap::IndexMap;
use kiln_db_schema::{Column, ForeignKey, Index, Table};

/// Who put a column or constraint on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contributor {
    /// The entity declared it itself.
    Declared(EntityId),
    /// A relation derived it.
    Relation(RelationId),
}

/// Why a contribution was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TableConflict {
    /// Same contributor group, different shape.
    Shape { column: String, existing: Contributor },
    /// Two unrelated contributors, same column name.
    Duplicate { column: String, existing: Contributor },
    /// Same foreign key columns, different target or actions.
    Constraint {
        columns: Vec<String>,
        existing: Contributor,
    },
}

#[derive(Debug, Clone)]
struct ColumnEntry {
    column: Column,
    by: Contributor,
    /// First relation to claim a declared column.
    adopted_by: Option<Contributor>,
}

#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: IndexMap<String, ColumnEntry>,
    indices: Vec<Index>,
    foreign_keys: Vec<(ForeignKey, Contributor)>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(|entry| &entry.column)
    }

    pub fn contributor(&self, column: &str) -> Option<Contributor> {
        self.columns.get(column).map(|entry| entry.by)
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().map(|(fk, _)| fk)
    }

    /// Merge an entity's declared shape into this table.
    pub(crate) fn seed(&mut self, declared: Table, entity: EntityId) -> Result<(), TableConflict> {
        let contributor = Contributor::Declared(entity);
        for column in declared.columns {
            self.add_column(column, contributor, |_, _| false)?;
        }
        for index in declared.indices {
            self.add_index(index);
        }
        for fk in declared.foreign_keys {
            self.add_foreign_key(fk, contributor)?;
        }
        Ok(())
    }

    /// Add a column.
    ///
    /// Re-adding an identical column from the same contributor group is a
    /// no-op. A relation may adopt a column its entity declared, provided
    /// the shapes match; once adopted, the column belongs to that relation's
    /// group and no unrelated relation can claim it.
    pub(crate) fn add_column(
        &mut self,
        column: Column,
        contributor: Contributor,
        paired: impl Fn(Contributor, Contributor) -> bool,
    ) -> Result<(), TableConflict> {
        let Some(entry) = self.columns.get_mut(&column.name) else {
            self.columns.insert(
                column.name.clone(),
                ColumnEntry {
                    column,
                    by: contributor,
                    adopted_by: None,
                },
            );
            return Ok(());
        };

        let owner = match (entry.by, entry.adopted_by, contributor) {
            (_, _, Contributor::Declared(_)) => None,
            (Contributor::Declared(_), None, _) => None,
            (Contributor::Declared(_), Some(adopter), _) => Some(adopter),
            (by, _, _) => Some(by),
        };
        if let Some(owner) = owner {
            if owner != contributor && !paired(owner, contributor) {
                return Err(TableConflict::Duplicate {
                    column: column.name,
                    existing: owner,
                });
            }
        }

        if !entry.column.same_shape(&column) {
            return Err(TableConflict::Shape {
                column: column.name,
                existing: entry.by,
            });
        }
        if matches!(entry.by, Contributor::Declared(_))
            && matches!(contributor, Contributor::Relation(_))
        {
            entry.adopted_by.get_or_insert(contributor);
        }
        Ok(())
    }

    /// Add an index, unless one over the same columns with the same
    /// uniqueness is already there.
    pub fn add_index(&mut self, index: Index) {
        if !self.indices.iter().any(|existing| existing.same_shape(&index)) {
            self.indices.push(index);
        }
    }

    /// Add a foreign key. At most one foreign key per column list.
    pub(crate) fn add_foreign_key(
        &mut self,
        fk: ForeignKey,
        contributor: Contributor,
    ) -> Result<(), TableConflict> {
        match self
            .foreign_keys
            .iter()
            .find(|(existing, _)| existing.columns == fk.columns)
        {
            Some((existing, _)) if existing.same_shape(&fk) => Ok(()),
            Some((_, existing_by)) => Err(TableConflict::Constraint {
                columns: fk.columns,
                existing: *existing_by,
            }),
            None => {
                self.foreign_keys.push((fk, contributor));
                Ok(())
            }
        }
    }

    pub fn freeze(self) -> Table {
        Table {
            name: self.name,
            columns: self.columns.into_values().map(|entry| entry.column).collect(),
            indices: self.indices,
            foreign_keys: self.foreign_keys.into_iter().map(|(fk, _)| fk).collect(),
        }
    }
}

/// Everything a relation sees while it builds: the entity arena, the other
/// relations (for pairing), and exclusive access to the table builders.
pub(crate) struct BuildContext<'a> {
    pub entities: &'a [EntitySchema],
    pub relations: &'a [RelationSchema],
    pub tables: &'a mut IndexMap<String, TableBuilder>,
}

impl BuildContext<'_> {
    fn table(&mut self, name: &str) -> &mut TableBuilder {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| TableBuilder::new(name))
    }

    /// Whether two contributors belong to the same relation pair. Inverses
    /// registered on several implementors share their origin, so they pair
    /// with each other too.
    fn paired(relations: &[RelationSchema], a: Contributor, b: Contributor) -> bool {
        let root = |contributor: Contributor| match contributor {
            Contributor::Relation(id) => {
                let relation = &relations[id.index()];
                Some(relation.paired_with.unwrap_or(relation.id))
            }
            Contributor::Declared(_) => None,
        };
        match (root(a), root(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn label(&self, contributor: Contributor) -> String {
        match contributor {
            Contributor::Declared(id) => {
                format!("entity `{}`", self.entities[id.index()].name())
            }
            Contributor::Relation(id) => {
                let relation = &self.relations[id.index()];
                format!(
                    "relation `{}.{}`",
                    self.entities[relation.owner.index()].name(),
                    relation.name
                )
            }
        }
    }

    fn conflict(&self, table: &str, conflict: TableConflict, by: Contributor) -> SchemaError {
        match conflict {
            TableConflict::Shape { column, .. } => SchemaError::ColumnConflict {
                table: table.to_string(),
                column,
                contributor: self.label(by),
            },
            TableConflict::Duplicate { column, existing } => SchemaError::DuplicateColumn {
                table: table.to_string(),
                column,
                first: self.label(existing),
                second: self.label(by),
            },
            TableConflict::Constraint { columns, .. } => SchemaError::ConstraintConflict {
                table: table.to_string(),
                columns: columns.join(", "),
                contributor: self.label(by),
            },
        }
    }

    pub fn add_column(
        &mut self,
        table: &str,
        column: Column,
        by: Contributor,
    ) -> Result<(), SchemaError> {
        let relations = self.relations;
        let result = self
            .table(table)
            .add_column(column, by, |a, b| Self::paired(relations, a, b));
        result.map_err(|conflict| self.conflict(table, conflict, by))
    }

    pub fn add_index(&mut self, table: &str, index: Index) {
        self.table(table).add_index(index);
    }

    pub fn add_foreign_key(
        &mut self,
        table: &str,
        fk: ForeignKey,
        by: Contributor,
    ) -> Result<(), SchemaError> {
        let result = self.table(table).add_foreign_key(fk, by);
        result.map_err(|conflict| self.conflict(table, conflict, by))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_db_schema::{AbstractType, ReferentialAction};

    const POST: Contributor = Contributor::Declared(EntityId(0));
    const AUTHOR: Contributor = Contributor::Relation(RelationId(0));
    const EDITOR: Contributor = Contributor::Relation(RelationId(1));

    fn unpaired(_: Contributor, _: Contributor) -> bool {
        false
    }

    fn user_id() -> Column {
        Column::new("user_id", AbstractType::Integer).nullable(true)
    }

    #[test]
    fn test_same_contributor_is_idempotent() {
        let mut table = TableBuilder::new("post");
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        table.add_index(Index::new("post", &["user_id"]));
        table.add_index(Index::new("post", &["user_id"]));

        let frozen = table.freeze();
        assert_eq!(frozen.columns.len(), 1);
        assert_eq!(frozen.indices.len(), 1);
    }

    #[test]
    fn test_unrelated_relations_conflict() {
        let mut table = TableBuilder::new("post");
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        let err = table.add_column(user_id(), EDITOR, unpaired).unwrap_err();
        assert_eq!(
            err,
            TableConflict::Duplicate {
                column: "user_id".to_string(),
                existing: AUTHOR,
            }
        );
    }

    #[test]
    fn test_paired_relations_share_columns() {
        let mut table = TableBuilder::new("post");
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        table
            .add_column(user_id(), EDITOR, |a, b| {
                (a, b) == (AUTHOR, EDITOR) || (a, b) == (EDITOR, AUTHOR)
            })
            .unwrap();

        let mismatched = Column::new("user_id", AbstractType::BigInteger);
        let err = table
            .add_column(mismatched, EDITOR, |_, _| true)
            .unwrap_err();
        assert!(matches!(err, TableConflict::Shape { .. }));
    }

    #[test]
    fn test_relation_adopts_declared_column() {
        let mut table = TableBuilder::new("post");
        table.add_column(user_id(), POST, unpaired).unwrap();
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        assert_eq!(table.contributor("user_id"), Some(POST));

        let err = table
            .add_column(Column::new("user_id", AbstractType::Integer), AUTHOR, unpaired)
            .unwrap_err();
        assert!(matches!(err, TableConflict::Shape { .. }));
    }

    #[test]
    fn test_adopted_column_is_not_shared() {
        let mut table = TableBuilder::new("post");
        table.add_column(user_id(), POST, unpaired).unwrap();
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();
        table.add_column(user_id(), AUTHOR, unpaired).unwrap();

        let err = table.add_column(user_id(), EDITOR, unpaired).unwrap_err();
        assert_eq!(
            err,
            TableConflict::Duplicate {
                column: "user_id".to_string(),
                existing: AUTHOR,
            }
        );
        table.add_column(user_id(), EDITOR, |_, _| true).unwrap();
    }

    #[test]
    fn test_foreign_key_conflicts() {
        let mut table = TableBuilder::new("post");
        let fk = ForeignKey::new("post", "user_id", "user", "id", ReferentialAction::Cascade);
        table.add_foreign_key(fk.clone(), AUTHOR).unwrap();
        table.add_foreign_key(fk.clone(), AUTHOR).unwrap();

        let restrict = ForeignKey::new("post", "user_id", "user", "id", ReferentialAction::Restrict);
        let err = table.add_foreign_key(restrict, EDITOR).unwrap_err();
        assert!(matches!(err, TableConflict::Constraint { .. }));
        assert_eq!(table.freeze().foreign_keys, vec![fk]);
    }
}
