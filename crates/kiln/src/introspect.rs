//! Reading the live shape of tables back from PostgreSQL.
//!
//! Only the tables kiln is asked about are loaded, from the connection's
//! current schema. Native types are mapped back to [`AbstractType`]s so
//! that the result compares directly with the declared shape.

use crate::traced::{Connection, ConnectionExt};
use crate::Result;
use indexmap::IndexMap;
use kiln_db_schema::{AbstractType, Column, ForeignKey, Index, ReferentialAction, Schema, Table};

const COLUMNS_QUERY: &str = r#"
SELECT c.table_name::text,
       c.column_name::text,
       c.data_type::text,
       c.character_maximum_length::int4,
       c.numeric_precision::int4,
       c.numeric_scale::int4,
       c.is_nullable::text = 'YES',
       c.column_default::text
FROM information_schema.columns c
WHERE c.table_schema = current_schema()
  AND c.table_name = ANY($1::text[])
ORDER BY c.table_name, c.ordinal_position
"#;

const PRIMARY_KEYS_QUERY: &str = r#"
SELECT tc.table_name::text, kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
 AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND tc.table_schema = current_schema()
  AND tc.table_name = ANY($1::text[])
ORDER BY tc.table_name, kcu.ordinal_position
"#;

const INDEXES_QUERY: &str = r#"
SELECT t.relname::text,
       i.relname::text,
       ix.indisunique,
       array_agg(a.attname::text ORDER BY k.ord)
FROM pg_index ix
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
WHERE n.nspname = current_schema()
  AND t.relname = ANY($1::text[])
  AND NOT ix.indisprimary
GROUP BY t.relname, i.relname, ix.indisunique
ORDER BY t.relname, i.relname
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
SELECT t.relname::text,
       con.conname::text,
       rt.relname::text,
       array(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       array(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       con.confdeltype::text,
       con.confupdtype::text
FROM pg_constraint con
JOIN pg_class t ON t.oid = con.conrelid
JOIN pg_class rt ON rt.oid = con.confrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE con.contype = 'f'
  AND n.nspname = current_schema()
  AND t.relname = ANY($1::text[])
ORDER BY t.relname, con.conname
"#;

/// Load the named tables from the database.
///
/// Tables that don't exist are simply absent from the result; the others
/// keep the order of `tables`.
pub async fn load_schema<C: Connection>(conn: &C, tables: &[String]) -> Result<Schema> {
    let conn = conn.traced();
    let names: Vec<&str> = tables.iter().map(String::as_str).collect();

    let mut loaded: IndexMap<String, Table> = IndexMap::new();

    for row in conn.query(COLUMNS_QUERY, &[&names]).await? {
        let table: String = row.try_get(0)?;
        let name: String = row.try_get(1)?;
        let data_type: String = row.try_get(2)?;
        let native = NativeType {
            data_type: &data_type,
            length: row.try_get(3)?,
            precision: row.try_get(4)?,
            scale: row.try_get(5)?,
        };
        let nullable: bool = row.try_get(6)?;
        let default: Option<String> = row.try_get(7)?;

        let Some(column) = live_column(&table, name, &native, nullable, default.as_deref()) else {
            continue;
        };
        loaded
            .entry(table.clone())
            .or_insert_with(|| Table::new(table))
            .columns
            .push(column);
    }

    for row in conn.query(PRIMARY_KEYS_QUERY, &[&names]).await? {
        let table: String = row.try_get(0)?;
        let column: String = row.try_get(1)?;
        if let Some(col) = loaded
            .get_mut(&table)
            .and_then(|t| t.columns.iter_mut().find(|c| c.name == column))
        {
            col.primary_key = true;
        }
    }

    for row in conn.query(INDEXES_QUERY, &[&names]).await? {
        let table: String = row.try_get(0)?;
        let index = Index {
            name: row.try_get(1)?,
            unique: row.try_get(2)?,
            columns: row.try_get(3)?,
        };
        if let Some(t) = loaded.get_mut(&table) {
            t.indices.push(index);
        }
    }

    for row in conn.query(FOREIGN_KEYS_QUERY, &[&names]).await? {
        let table: String = row.try_get(0)?;
        let on_delete: String = row.try_get(5)?;
        let on_update: String = row.try_get(6)?;
        let fk = ForeignKey {
            name: row.try_get(1)?,
            references_table: row.try_get(2)?,
            columns: row.try_get(3)?,
            references_columns: row.try_get(4)?,
            on_delete: map_action(&on_delete),
            on_update: map_action(&on_update),
        };
        if let Some(t) = loaded.get_mut(&table) {
            t.foreign_keys.push(fk);
        }
    }

    let schema: Schema = tables
        .iter()
        .filter_map(|name| loaded.shift_remove(name))
        .collect();
    tracing::debug!(
        requested = tables.len(),
        found = schema.tables.len(),
        "introspected tables"
    );
    Ok(schema)
}

/// Build a live column, or skip it with a warning when its type has no
/// abstract counterpart. Such columns are left alone by every push.
fn live_column(
    table: &str,
    name: String,
    native: &NativeType<'_>,
    nullable: bool,
    default: Option<&str>,
) -> Option<Column> {
    let Some((abstract_type, default)) = map_type(native, default) else {
        tracing::warn!(
            table,
            column = %name,
            data_type = native.data_type,
            "skipping column of unsupported type"
        );
        return None;
    };
    Some(Column {
        name,
        abstract_type,
        nullable,
        default,
        primary_key: false,
    })
}

/// A column type as `information_schema.columns` reports it.
struct NativeType<'a> {
    data_type: &'a str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
}

/// Map a native type and default back to an abstract type and the default
/// kiln would have declared.
///
/// Integer columns fed by a sequence are serial columns, whose default is
/// implied by the type.
fn map_type(native: &NativeType<'_>, default: Option<&str>) -> Option<(AbstractType, Option<String>)> {
    let serial = default.is_some_and(|d| d.starts_with("nextval("));

    let abstract_type = match native.data_type {
        "integer" if serial => AbstractType::Primary,
        "bigint" if serial => AbstractType::BigPrimary,
        "smallint" => AbstractType::SmallInteger,
        "integer" => AbstractType::Integer,
        "bigint" => AbstractType::BigInteger,
        "boolean" => AbstractType::Boolean,
        "real" => AbstractType::Float,
        "double precision" => AbstractType::Double,
        "numeric" => AbstractType::Decimal {
            precision: native.precision.and_then(|p| u8::try_from(p).ok()).unwrap_or(0),
            scale: native.scale.and_then(|s| u8::try_from(s).ok()).unwrap_or(0),
        },
        "character varying" => {
            AbstractType::String(native.length.and_then(|l| u16::try_from(l).ok()).unwrap_or(255))
        }
        "text" => AbstractType::Text,
        "bytea" => AbstractType::Binary,
        "date" => AbstractType::Date,
        "time without time zone" => AbstractType::Time,
        "timestamp with time zone" => AbstractType::Timestamp,
        "json" | "jsonb" => AbstractType::Json,
        "uuid" => AbstractType::Uuid,
        _ => return None,
    };

    let default = if abstract_type.is_auto_increment() {
        None
    } else {
        default.map(normalize_default)
    };

    Some((abstract_type, default))
}

/// Strip the cast PostgreSQL appends to literal defaults:
/// `'draft'::character varying` becomes `'draft'`.
fn normalize_default(default: &str) -> String {
    let Some(rest) = default.strip_prefix('\'') else {
        return default.to_string();
    };

    // find the closing quote, skipping '' escapes
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            let literal = &default[..i + 2];
            return if default[i + 2..].starts_with("::") {
                literal.to_string()
            } else {
                default.to_string()
            };
        }
        i += 1;
    }
    default.to_string()
}

fn map_action(code: &str) -> ReferentialAction {
    match code {
        "c" => ReferentialAction::Cascade,
        "r" => ReferentialAction::Restrict,
        "n" => ReferentialAction::SetNull,
        "a" => ReferentialAction::NoAction,
        other => {
            tracing::warn!(code = %other, "unsupported referential action, treating as NO ACTION");
            ReferentialAction::NoAction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(data_type: &str) -> NativeType<'_> {
        NativeType {
            data_type,
            length: None,
            precision: None,
            scale: None,
        }
    }

    #[test]
    fn test_serial_columns() {
        assert_eq!(
            map_type(&native("integer"), Some("nextval('user_id_seq'::regclass)")),
            Some((AbstractType::Primary, None))
        );
        assert_eq!(
            map_type(&native("bigint"), Some("nextval('post_id_seq'::regclass)")),
            Some((AbstractType::BigPrimary, None))
        );
        assert_eq!(
            map_type(&native("integer"), Some("0")),
            Some((AbstractType::Integer, Some("0".to_string())))
        );
    }

    #[test]
    fn test_sized_types() {
        let varchar = NativeType {
            length: Some(32),
            ..native("character varying")
        };
        assert_eq!(
            map_type(&varchar, None),
            Some((AbstractType::String(32), None))
        );

        let numeric = NativeType {
            precision: Some(10),
            scale: Some(2),
            ..native("numeric")
        };
        assert_eq!(
            map_type(&numeric, None),
            Some((
                AbstractType::Decimal {
                    precision: 10,
                    scale: 2
                },
                None
            ))
        );
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(map_type(&native("tsvector"), None), None);
    }

    #[test]
    fn test_unsupported_column_is_skipped() {
        let search = live_column("post", "search".to_string(), &native("tsvector"), true, None);
        assert_eq!(search, None);

        let title = live_column("post", "title".to_string(), &native("text"), false, None);
        assert_eq!(
            title.map(|c| (c.name, c.abstract_type, c.nullable)),
            Some(("title".to_string(), AbstractType::Text, false))
        );
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("'draft'::character varying"), "'draft'");
        assert_eq!(normalize_default("'it''s'::text"), "'it''s'");
        assert_eq!(normalize_default("'{}'::jsonb"), "'{}'");
        assert_eq!(normalize_default("now()"), "now()");
        assert_eq!(normalize_default("'plain'"), "'plain'");
        assert_eq!(normalize_default("true"), "true");
    }

    #[test]
    fn test_map_action() {
        assert_eq!(map_action("c"), ReferentialAction::Cascade);
        assert_eq!(map_action("r"), ReferentialAction::Restrict);
        assert_eq!(map_action("n"), ReferentialAction::SetNull);
        assert_eq!(map_action("a"), ReferentialAction::NoAction);
        assert_eq!(map_action("d"), ReferentialAction::NoAction);
    }
}
