use super::{Schema, add_foreign_key_sql, create_index_sql, create_table_sql};

/// Generate SQL to create all tables, foreign keys, and indices.
///
/// Returns a complete SQL script that can be executed to create the schema.
/// Tables are created first, then foreign keys (as ALTER TABLE), then indices.
/// This order works for any schema, cyclic foreign keys included.
pub fn schema_to_sql(schema: &Schema) -> String {
    let mut sql = String::new();

    // Create tables (without foreign keys to avoid dependency issues)
    for table in schema.tables.values() {
        sql.push_str(&create_table_sql(table));
        sql.push_str("\n\n");
    }

    for table in schema.tables.values() {
        for fk in &table.foreign_keys {
            sql.push_str(&add_foreign_key_sql(&table.name, fk));
            sql.push('\n');
        }
    }

    if schema.tables.values().any(|t| !t.foreign_keys.is_empty()) {
        sql.push('\n');
    }

    for table in schema.tables.values() {
        for idx in &table.indices {
            sql.push_str(&create_index_sql(&table.name, idx));
            sql.push('\n');
        }
    }

    sql.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ForeignKey, Index, Table};
    use kiln_db_schema::{AbstractType, ReferentialAction};

    #[test]
    fn test_schema_to_sql() {
        let mut user = Table::new("user");
        user.columns.push(Column::primary("id", AbstractType::Primary));

        let mut post = Table::new("post");
        post.columns.push(Column::primary("id", AbstractType::Primary));
        post.columns
            .push(Column::new("user_id", AbstractType::Integer));
        post.indices.push(Index::new("post", &["user_id"]));
        post.foreign_keys.push(ForeignKey::new(
            "post",
            "user_id",
            "user",
            "id",
            ReferentialAction::Cascade,
        ));

        let schema: Schema = [user, post].into_iter().collect();

        insta::assert_snapshot!(schema_to_sql(&schema), @r#"
        CREATE TABLE "user" (
            "id" SERIAL PRIMARY KEY
        );

        CREATE TABLE "post" (
            "id" SERIAL PRIMARY KEY,
            "user_id" INTEGER NOT NULL
        );

        ALTER TABLE "post" ADD CONSTRAINT "fk_post_user_id" FOREIGN KEY ("user_id") REFERENCES "user" ("id") ON DELETE CASCADE ON UPDATE CASCADE;

        CREATE INDEX "idx_post_user_id" ON "post" ("user_id");
        "#);
    }
}
