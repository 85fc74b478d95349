//! Configuration file handling.
//!
//! Looks for `.config/kiln.styx` in the current directory or any parent
//! directory. A project without one runs on defaults, rooted at the current
//! directory.

pub use kiln_config::Config;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = ".config/kiln.styx";

/// A loaded configuration and the directory it applies to.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: Config,
    /// Directory holding `.config/`.
    pub root: Utf8PathBuf,
    /// The file the config was read from, if any.
    pub path: Option<Utf8PathBuf>,
}

impl Project {
    /// Migrations directory, resolved against the project root.
    pub fn migrations_dir(&self) -> Utf8PathBuf {
        self.root.join(self.config.migrations_dir())
    }
}

/// Load configuration, searching up from the current directory.
pub fn load() -> Result<Project, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| ConfigError::Io(format!("{} is not valid UTF-8", p.display())))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<Project, ConfigError> {
    let Some(path) = find_config_file(start) else {
        tracing::debug!(%start, "no .config/kiln.styx, using defaults");
        return Ok(Project {
            config: Config::default(),
            root: start.to_path_buf(),
            path: None,
        });
    };

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let config: Config =
        facet_styx::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // .config/kiln.styx -> project root
    let root = path
        .parent()
        .and_then(Utf8Path::parent)
        .unwrap_or(start)
        .to_path_buf();

    tracing::debug!(%path, "loaded configuration");
    Ok(Project {
        config,
        root,
        path: Some(path),
    })
}

fn find_config_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read .config/kiln.styx: {0}")]
    Io(String),

    #[error("failed to parse .config/kiln.styx: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_project() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn finds_config_in_a_parent_directory() {
        let (_guard, root) = temp_project();
        std::fs::create_dir_all(root.join(".config")).unwrap();
        std::fs::write(
            root.join(CONFIG_FILE),
            r#"{migrations "db/migrations", cycles defer}"#,
        )
        .unwrap();
        let nested = root.join("src/models");
        std::fs::create_dir_all(&nested).unwrap();

        let project = load_from(&nested).unwrap();
        assert_eq!(project.root, root);
        assert_eq!(project.path, Some(root.join(CONFIG_FILE)));
        assert_eq!(project.migrations_dir(), root.join("db/migrations"));
        assert_eq!(project.config.cycles.as_deref(), Some("defer"));
    }

    #[test]
    fn missing_config_uses_defaults() {
        let (_guard, root) = temp_project();

        let project = load_from(&root).unwrap();
        assert_eq!(project.path, None);
        assert_eq!(project.migrations_dir(), root.join("migrations"));
    }
}
