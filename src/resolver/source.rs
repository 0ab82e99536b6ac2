//! Where migrations come from: directories on disk, scripts embedded by the
//! caller, and Rust code registered explicitly.

use crate::db::Database;
use crate::error::{KeelError, Result};
use crate::version::MigrationVersion;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A script found by a source, before its name is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// File name used for naming conventions
    pub name: String,
    /// Where the script lives, for messages
    pub location: String,
    pub content: String,
}

pub trait MigrationSource: Send + Sync {
    fn describe(&self) -> String;

    fn scripts(&self) -> Result<Vec<ScriptFile>>;
}

/// Scripts under a directory, searched recursively.
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MigrationSource for FilesystemSource {
    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }

    fn scripts(&self) -> Result<Vec<ScriptFile>> {
        if !self.root.exists() {
            warn!(
                "Migration location {} does not exist, skipping",
                self.root.display()
            );
            return Ok(Vec::new());
        }

        let pattern = self.root.join("**").join("*");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| KeelError::Config(format!("Invalid location {}: {}", pattern, e)))?;

        let mut scripts = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| KeelError::Io {
                path: e.path().to_path_buf(),
                source: std::io::Error::new(e.error().kind(), e.error().to_string()),
            })?;
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let content = read_script(&path)?;
            scripts.push(ScriptFile {
                name: name.to_string(),
                location: path.display().to_string(),
                content,
            });
        }
        scripts.sort_by(|a, b| a.location.cmp(&b.location));
        debug!("Found {} files in {}", scripts.len(), self.root.display());
        Ok(scripts)
    }
}

fn read_script(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|source| KeelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|e| KeelError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

/// Scripts supplied in memory, e.g. compiled into a binary with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    label: String,
    scripts: Vec<ScriptFile>,
}

impl StaticSource {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            scripts: Vec::new(),
        }
    }

    pub fn with_script(mut self, name: &str, content: &str) -> Self {
        self.scripts.push(ScriptFile {
            name: name.to_string(),
            location: format!("{}:{}", self.label, name),
            content: content.to_string(),
        });
        self
    }
}

impl MigrationSource for StaticSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn scripts(&self) -> Result<Vec<ScriptFile>> {
        Ok(self.scripts.clone())
    }
}

/// A migration written in Rust.
#[async_trait]
pub trait CodeMigration: Send + Sync {
    /// `None` makes the migration repeatable
    fn version(&self) -> Option<MigrationVersion>;

    fn description(&self) -> String;

    /// Name recorded as the script in the history table
    fn script_name(&self) -> String;

    /// Bump to make a repeatable code migration run again
    fn checksum(&self) -> Option<i32> {
        None
    }

    async fn migrate(&self, db: &dyn Database) -> anyhow::Result<()>;
}

/// Every place migrations are resolved from.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn MigrationSource>>,
    code: Vec<Arc<dyn CodeMigration>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with one filesystem source per location, relative
    /// locations resolved against `base_dir`.
    pub fn from_locations(locations: &[String], base_dir: &Path) -> Self {
        let mut registry = Self::new();
        for location in locations {
            let location = location.strip_prefix("filesystem:").unwrap_or(location);
            let path = Path::new(location);
            let root = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            };
            registry.add_source(FilesystemSource::new(root));
        }
        registry
    }

    pub fn add_source(&mut self, source: impl MigrationSource + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn register_code(&mut self, migration: impl CodeMigration + 'static) -> &mut Self {
        self.code.push(Arc::new(migration));
        self
    }

    pub fn sources(&self) -> &[Box<dyn MigrationSource>] {
        &self.sources
    }

    pub fn code_migrations(&self) -> &[Arc<dyn CodeMigration>] {
        &self.code
    }
}
