//! Table-shape types for kiln.
//!
//! These types describe the physical side of a schema: tables, columns,
//! indexes and foreign keys. The same types describe both the declared
//! shape (derived from entities and their relations) and the live shape
//! (introspected from the database), which is what makes them comparable.
//!
//! ## Naming Convention
//!
//! Generated identifiers follow fixed prefixes:
//!
//! - indexes: `idx_{table}_{columns}`
//! - unique indexes: `uq_{table}_{columns}`
//! - foreign keys: `fk_{table}_{columns}`
//!
//! Names longer than Postgres' 63-byte identifier limit are shortened and
//! suffixed with a stable hash (see [`clamp_identifier`]).

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// Abstract column types.
///
/// Abstract types are what entity authors declare. Each one renders to a
/// concrete Postgres type; `Primary` and `BigPrimary` are auto-incrementing
/// and decay to plain integers when referenced from another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbstractType {
    /// SERIAL (auto-incrementing INTEGER)
    Primary,
    /// BIGSERIAL (auto-incrementing BIGINT)
    BigPrimary,
    /// BOOLEAN
    Boolean,
    /// SMALLINT
    SmallInteger,
    /// INTEGER
    Integer,
    /// BIGINT
    BigInteger,
    /// REAL
    Float,
    /// DOUBLE PRECISION
    Double,
    /// NUMERIC(precision, scale)
    Decimal { precision: u8, scale: u8 },
    /// VARCHAR(n)
    String(u16),
    /// TEXT
    Text,
    /// BYTEA
    Binary,
    /// DATE
    Date,
    /// TIME
    Time,
    /// TIMESTAMPTZ
    Timestamp,
    /// JSONB
    Json,
    /// UUID
    Uuid,
}

impl AbstractType {
    /// The type a column must have to reference a column of this type.
    ///
    /// Auto-incrementing types decay to their storage type; everything else
    /// references itself.
    pub fn reference_type(self) -> AbstractType {
        match self {
            AbstractType::Primary => AbstractType::Integer,
            AbstractType::BigPrimary => AbstractType::BigInteger,
            other => other,
        }
    }

    /// Whether the database generates values for this type.
    pub fn is_auto_increment(self) -> bool {
        matches!(self, AbstractType::Primary | AbstractType::BigPrimary)
    }

    /// Short abstract name, used in reports.
    pub fn abstract_name(&self) -> &'static str {
        match self {
            AbstractType::Primary => "primary",
            AbstractType::BigPrimary => "bigPrimary",
            AbstractType::Boolean => "boolean",
            AbstractType::SmallInteger => "smallInteger",
            AbstractType::Integer => "integer",
            AbstractType::BigInteger => "bigInteger",
            AbstractType::Float => "float",
            AbstractType::Double => "double",
            AbstractType::Decimal { .. } => "decimal",
            AbstractType::String(_) => "string",
            AbstractType::Text => "text",
            AbstractType::Binary => "binary",
            AbstractType::Date => "date",
            AbstractType::Time => "time",
            AbstractType::Timestamp => "timestamp",
            AbstractType::Json => "json",
            AbstractType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for AbstractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractType::Primary => write!(f, "SERIAL"),
            AbstractType::BigPrimary => write!(f, "BIGSERIAL"),
            AbstractType::Boolean => write!(f, "BOOLEAN"),
            AbstractType::SmallInteger => write!(f, "SMALLINT"),
            AbstractType::Integer => write!(f, "INTEGER"),
            AbstractType::BigInteger => write!(f, "BIGINT"),
            AbstractType::Float => write!(f, "REAL"),
            AbstractType::Double => write!(f, "DOUBLE PRECISION"),
            AbstractType::Decimal { precision, scale } => {
                write!(f, "NUMERIC({}, {})", precision, scale)
            }
            AbstractType::String(len) => write!(f, "VARCHAR({})", len),
            AbstractType::Text => write!(f, "TEXT"),
            AbstractType::Binary => write!(f, "BYTEA"),
            AbstractType::Date => write!(f, "DATE"),
            AbstractType::Time => write!(f, "TIME"),
            AbstractType::Timestamp => write!(f, "TIMESTAMPTZ"),
            AbstractType::Json => write!(f, "JSONB"),
            AbstractType::Uuid => write!(f, "UUID"),
        }
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    /// Propagate the change to referencing rows (default).
    #[default]
    Cascade,
    /// Refuse the change while referencing rows exist.
    Restrict,
    /// Set the referencing column to NULL.
    SetNull,
    /// Like `Restrict`, but checked at the end of the statement.
    NoAction,
}

impl ReferentialAction {
    /// Returns the SQL keyword(s) for this action.
    pub fn to_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = ParseActionError;

    /// Accepts `cascade`, `restrict`, `set-null` and `no-action` in any case,
    /// with `-`, `_` or a space as separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | '_' => ' ',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "cascade" => Ok(ReferentialAction::Cascade),
            "restrict" => Ok(ReferentialAction::Restrict),
            "set null" => Ok(ReferentialAction::SetNull),
            "no action" => Ok(ReferentialAction::NoAction),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}

/// Error returned when a string is not a known referential action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError(pub String);

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown constraint action '{}' (expected cascade, restrict, set-null or no-action)",
            self.0
        )
    }
}

impl std::error::Error for ParseActionError {}

/// A database column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Abstract type
    pub abstract_type: AbstractType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether this column is (part of) the primary key
    pub primary_key: bool,
}

impl Column {
    /// Create a NOT NULL column without default.
    pub fn new(name: impl Into<String>, abstract_type: AbstractType) -> Self {
        Self {
            name: name.into(),
            abstract_type,
            nullable: false,
            default: None,
            primary_key: false,
        }
    }

    /// Create a primary key column.
    pub fn primary(name: impl Into<String>, abstract_type: AbstractType) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, abstract_type)
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Whether two columns have the same shape (everything but the name).
    pub fn same_shape(&self, other: &Column) -> bool {
        self.abstract_type == other.abstract_type
            && self.nullable == other.nullable
            && self.default == other.default
            && self.primary_key == other.primary_key
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
    /// ON DELETE action
    pub on_delete: ReferentialAction,
    /// ON UPDATE action
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Create a single-column foreign key with the conventional name and
    /// the same action for delete and update.
    pub fn new(
        table: &str,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
        action: ReferentialAction,
    ) -> Self {
        let column = column.into();
        Self {
            name: foreign_key_name(table, &[column.as_str()]),
            columns: vec![column],
            references_table: references_table.into(),
            references_columns: vec![references_column.into()],
            on_delete: action,
            on_update: action,
        }
    }

    /// Whether two foreign keys enforce the same constraint, ignoring names.
    pub fn same_shape(&self, other: &ForeignKey) -> bool {
        self.columns == other.columns
            && self.references_table == other.references_table
            && self.references_columns == other.references_columns
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }
}

/// A database index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Indexed columns, in order
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
}

impl Index {
    /// Create a plain index with the conventional name.
    pub fn new(table: &str, columns: &[impl AsRef<str>]) -> Self {
        Self {
            name: index_name(table, columns),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            unique: false,
        }
    }

    /// Create a unique index with the conventional name.
    pub fn unique(table: &str, columns: &[impl AsRef<str>]) -> Self {
        Self {
            name: unique_index_name(table, columns),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            unique: true,
        }
    }

    /// Whether two indexes cover the same columns with the same uniqueness.
    pub fn same_shape(&self, other: &Index) -> bool {
        self.unique == other.unique && self.columns == other.columns
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns
    pub columns: Vec<Column>,
    /// Indices (primary key excluded)
    pub indices: Vec<Index>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary key columns.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Tables referenced by this table's foreign keys, self-references excluded.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references_table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// A complete database schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables in the schema, indexed by name
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Insert or replace a table.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }
}

impl FromIterator<Table> for Schema {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for table in iter {
            schema.insert(table);
        }
        schema
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Postgres truncates identifiers beyond this many bytes.
pub const PG_IDENT_MAX: usize = 63;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use kiln_db_schema::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Generate a standard index name for a table and columns.
///
/// # Examples
///
/// ```
/// assert_eq!(kiln_db_schema::index_name("post", &["user_id"]), "idx_post_user_id");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    clamp_identifier(&format!("idx_{}_{}", table, join_columns(columns)))
}

/// Generate a standard unique index name for a table and columns.
///
/// # Examples
///
/// ```
/// assert_eq!(kiln_db_schema::unique_index_name("post_tag", &["post_id", "tag_id"]), "uq_post_tag_post_id_tag_id");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    clamp_identifier(&format!("uq_{}_{}", table, join_columns(columns)))
}

/// Generate a standard foreign key constraint name for a table and columns.
///
/// # Examples
///
/// ```
/// assert_eq!(kiln_db_schema::foreign_key_name("comment", &["post_id"]), "fk_comment_post_id");
/// ```
pub fn foreign_key_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    clamp_identifier(&format!("fk_{}_{}", table, join_columns(columns)))
}

fn join_columns(columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    cols.join("_")
}

/// Shorten an identifier to fit [`PG_IDENT_MAX`].
///
/// Identifiers that fit are returned unchanged. Longer ones keep as much of
/// their prefix as fits and end with `_` plus 12 hex chars of the blake3
/// hash of the full name, so distinct long names stay distinct.
pub fn clamp_identifier(name: &str) -> String {
    if name.len() <= PG_IDENT_MAX {
        return name.to_string();
    }

    let hex = blake3::hash(name.as_bytes()).to_hex().to_string();
    let suffix = &hex[..12];

    let mut len = PG_IDENT_MAX - suffix.len() - 1;
    while len > 0 && !name.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &name[..len], suffix)
}

#[cfg(test)]
mod tests;
