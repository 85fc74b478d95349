//! Migration files.
//!
//! Instead of pushing changes directly, a [`MigrationHelper`] captures the
//! planned DDL so it can be reviewed and applied later. The bundled
//! [`SqlMigrationWriter`] writes plain SQL files named
//! `m_{YYYY_MM_DD_HHMMSS}_{name}.sql`:
//!
//! ```text
//! -- kiln migration 2026_10_19_101500
//! -- checksum: blake3:5f0c...
//!
//! CREATE TABLE "user" (
//! ...
//! ```
//!
//! The checksum covers everything after the header, so an edited file can
//! be told apart from the generated one.

use crate::builder::ResolvedSchema;
use crate::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use heck::ToSnakeCase;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use kiln_db_schema::Schema;
use std::io::Write;

/// A migration written by a [`MigrationHelper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationArtifact {
    /// `YYYY_MM_DD_HHMMSS`, UTC.
    pub version: String,
    pub path: Utf8PathBuf,
    /// Hex blake3 hash of the migration body.
    pub checksum: String,
    pub statements: Vec<String>,
}

/// Turns pending schema changes into a migration.
pub trait MigrationHelper {
    fn create_migration(&self, schema: &ResolvedSchema, live: &Schema) -> Result<MigrationArtifact>;
}

/// Writes migrations as SQL files into a directory.
#[derive(Debug, Clone)]
pub struct SqlMigrationWriter {
    dir: Utf8PathBuf,
    name: String,
}

impl SqlMigrationWriter {
    /// `name` ends up in the file name, snake_cased.
    pub fn new(dir: impl Into<Utf8PathBuf>, name: &str) -> Self {
        Self {
            dir: dir.into(),
            name: name.to_snake_case(),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Like [`MigrationHelper::create_migration`], stamped with `now`.
    pub fn create_migration_at(
        &self,
        schema: &ResolvedSchema,
        live: &Schema,
        now: Timestamp,
    ) -> Result<MigrationArtifact> {
        let plan = schema.plan(live)?;
        if plan.is_empty() {
            return Err(Error::Migration("no changes to migrate".to_string()));
        }

        let version = now
            .to_zoned(TimeZone::UTC)
            .strftime("%Y_%m_%d_%H%M%S")
            .to_string();
        let body = plan.to_sql().trim_end().to_string() + "\n";
        let checksum = blake3::hash(body.as_bytes()).to_hex().to_string();

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("m_{}_{}.sql", version, self.name));

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Migration(format!("{} already exists", path)));
            }
            Err(e) => return Err(e.into()),
        };

        write!(
            file,
            "-- kiln migration {}\n-- checksum: blake3:{}\n\n{}",
            version, checksum, body
        )?;

        tracing::info!(%path, steps = plan.steps.len(), "wrote migration");

        Ok(MigrationArtifact {
            version,
            path,
            checksum,
            statements: plan.statements(),
        })
    }
}

impl MigrationHelper for SqlMigrationWriter {
    fn create_migration(&self, schema: &ResolvedSchema, live: &Schema) -> Result<MigrationArtifact> {
        self.create_migration_at(schema, live, Timestamp::now())
    }
}

/// Check a migration file against the checksum in its header.
pub fn verify_checksum(contents: &str) -> bool {
    let mut lines = contents.splitn(3, '\n');
    let (Some(_version), Some(checksum), Some(rest)) = (lines.next(), lines.next(), lines.next())
    else {
        return false;
    };
    let Some(expected) = checksum.strip_prefix("-- checksum: blake3:") else {
        return false;
    };
    let body = rest.strip_prefix('\n').unwrap_or(rest);
    blake3::hash(body.as_bytes()).to_hex().as_str() == expected
}
