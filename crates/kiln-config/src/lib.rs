//! Configuration schema for kiln.
//!
//! Lives in `.config/kiln.styx` at the project root:
//!
//! ```text
//! database-url "postgres://app@localhost/app"
//! migrations "db/migrations"
//! cycles defer
//! ```

use facet::Facet;

/// Root of `.config/kiln.styx`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct Config {
    /// Connection string. `DATABASE_URL` and `--database-url` take
    /// precedence.
    #[facet(default)]
    pub database_url: Option<String>,

    /// Directory migrations are written to, relative to the project root.
    #[facet(default)]
    pub migrations: Option<String>,

    /// What to do with foreign key cycles: `reject` or `defer`.
    #[facet(default)]
    pub cycles: Option<String>,
}

impl Config {
    pub const DEFAULT_MIGRATIONS: &'static str = "migrations";

    pub fn migrations_dir(&self) -> &str {
        self.migrations
            .as_deref()
            .unwrap_or(Self::DEFAULT_MIGRATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_fields() {
        let source = r#"{database-url "postgres://app@localhost/app", migrations "db/migrations", cycles defer}"#;
        let config: Config = facet_styx::from_str(source).unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://app@localhost/app")
        );
        assert_eq!(config.migrations_dir(), "db/migrations");
        assert_eq!(config.cycles.as_deref(), Some("defer"));
    }

    #[test]
    fn fields_are_optional() {
        let config: Config = facet_styx::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.migrations_dir(), "migrations");
    }
}
