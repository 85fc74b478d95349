//! SQL generation for table shapes.
//!
//! ## Naming Convention
//!
//! **Table names use singular form** (e.g., `user`, `post`, `comment`),
//! derived from the entity's role unless the entity sets one explicitly.
//! Pivot tables join the two roles in alphabetical order (`post_tag`).

pub mod codegen;

pub use kiln_db_schema::{Column, ForeignKey, Index, Schema, Table};
use kiln_db_schema::quote_ident;

/// Extension trait for Schema to add SQL generation.
pub trait SchemaCodegen {
    /// Generate SQL to create all tables, foreign keys, and indices.
    fn to_sql(&self) -> String;
}

impl SchemaCodegen for Schema {
    fn to_sql(&self) -> String {
        codegen::schema_to_sql(self)
    }
}

/// Generate CREATE TABLE SQL statement.
///
/// Does not include indexes or foreign key constraints (those are added
/// separately to handle table creation order).
pub fn create_table_sql(table: &Table) -> String {
    let mut sql = format!("CREATE TABLE {} (\n", quote_ident(&table.name));

    let pk_columns = table.primary_key();

    // If there's more than one PK column, we need a table constraint
    let use_table_pk_constraint = pk_columns.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let mut def = format!("    {} {}", quote_ident(&col.name), col.abstract_type);

            // Only add inline PRIMARY KEY for single-column PKs
            if col.primary_key && !use_table_pk_constraint {
                def.push_str(" PRIMARY KEY");
            }

            // PK columns are implicitly NOT NULL, except in a composite key
            if !col.nullable && (!col.primary_key || use_table_pk_constraint) {
                def.push_str(" NOT NULL");
            }

            if let Some(default) = &col.default {
                def.push_str(&format!(" DEFAULT {}", default));
            }

            def
        })
        .collect();

    if use_table_pk_constraint {
        let quoted_pk_cols: Vec<_> = pk_columns.iter().map(|c| quote_ident(c)).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted_pk_cols.join(", ")));
    }

    sql.push_str(&parts.join(",\n"));
    sql.push_str("\n);");

    sql
}

/// Generate CREATE INDEX SQL statement for a given index.
pub fn create_index_sql(table_name: &str, idx: &Index) -> String {
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let quoted_cols: Vec<_> = idx.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        unique,
        quote_ident(&idx.name),
        quote_ident(table_name),
        quoted_cols.join(", ")
    )
}

/// Generate the ALTER TABLE statement adding a foreign key.
pub fn add_foreign_key_sql(table_name: &str, fk: &ForeignKey) -> String {
    let quoted_cols: Vec<_> = fk.columns.iter().map(|c| quote_ident(c)).collect();
    let quoted_ref_cols: Vec<_> = fk
        .references_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {};",
        quote_ident(table_name),
        quote_ident(&fk.name),
        quoted_cols.join(", "),
        quote_ident(&fk.references_table),
        quoted_ref_cols.join(", "),
        fk.on_delete,
        fk.on_update
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_db_schema::{AbstractType, ReferentialAction};

    #[test]
    fn test_create_table_sql() {
        let mut table = Table::new("user");
        table.columns.push(Column::primary("id", AbstractType::Primary));
        table
            .columns
            .push(Column::new("email", AbstractType::String(255)));
        table.columns.push(
            Column::new("active", AbstractType::Boolean).default_value("true"),
        );
        table
            .columns
            .push(Column::new("bio", AbstractType::Text).nullable(true));

        insta::assert_snapshot!(create_table_sql(&table), @r#"
        CREATE TABLE "user" (
            "id" SERIAL PRIMARY KEY,
            "email" VARCHAR(255) NOT NULL,
            "active" BOOLEAN NOT NULL DEFAULT true,
            "bio" TEXT
        );
        "#);
    }

    #[test]
    fn test_composite_primary_key() {
        let mut table = Table::new("post_tag");
        table
            .columns
            .push(Column::primary("post_id", AbstractType::Integer));
        table
            .columns
            .push(Column::primary("tag_id", AbstractType::Integer));

        insta::assert_snapshot!(create_table_sql(&table), @r#"
        CREATE TABLE "post_tag" (
            "post_id" INTEGER NOT NULL,
            "tag_id" INTEGER NOT NULL,
            PRIMARY KEY ("post_id", "tag_id")
        );
        "#);
    }

    #[test]
    fn test_index_and_foreign_key_sql() {
        let idx = Index::unique("post_tag", &["post_id", "tag_id"]);
        assert_eq!(
            create_index_sql("post_tag", &idx),
            r#"CREATE UNIQUE INDEX "uq_post_tag_post_id_tag_id" ON "post_tag" ("post_id", "tag_id");"#
        );

        let fk = ForeignKey::new("post", "user_id", "user", "id", ReferentialAction::SetNull);
        assert_eq!(
            add_foreign_key_sql("post", &fk),
            r#"ALTER TABLE "post" ADD CONSTRAINT "fk_post_user_id" FOREIGN KEY ("user_id") REFERENCES "user" ("id") ON DELETE SET NULL ON UPDATE SET NULL;"#
        );
    }
}
