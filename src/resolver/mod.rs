//! Discovers migrations from every registered source and turns them into a
//! sorted, conflict-free set.

pub mod checksum;
pub mod naming;
pub mod source;

pub use source::{CodeMigration, FilesystemSource, MigrationSource, SourceRegistry, StaticSource};

use crate::config::{Naming, Placeholders};
use crate::error::{KeelError, Result};
use crate::history::MigrationType;
use crate::parser::{Dialect, PlaceholderReplacer, SqlStatement, parse_statements};
use crate::version::MigrationVersion;
use naming::{ParsedName, parse_migration_name};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a resolved migration runs.
#[derive(Clone)]
pub enum MigrationExecutor {
    /// Script text as found, before placeholder replacement
    Sql { content: String },
    Code(Arc<dyn CodeMigration>),
}

impl fmt::Debug for MigrationExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationExecutor::Sql { content } => f
                .debug_struct("Sql")
                .field("bytes", &content.len())
                .finish(),
            MigrationExecutor::Code(code) => f.debug_tuple("Code").field(&code.script_name()).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedMigration {
    /// `None` for repeatable migrations
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub script: String,
    pub checksum: Option<i32>,
    pub migration_type: MigrationType,
    /// Physical location, for messages
    pub location: String,
    pub executor: MigrationExecutor,
}

impl ResolvedMigration {
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }
}

/// Versioned migrations by version, then repeatables by description.
pub fn compare_resolved(a: &ResolvedMigration, b: &ResolvedMigration) -> Ordering {
    match (&a.version, &b.version) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.description.cmp(&b.description),
    }
}

/// A SQL migration ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedScript {
    /// Script text after placeholder replacement
    pub content: String,
    pub statements: Vec<SqlStatement>,
}

impl PreparedScript {
    pub fn all_transactional(&self) -> bool {
        self.statements.iter().all(|s| s.can_execute_in_transaction)
    }

    pub fn none_transactional(&self) -> bool {
        !self.statements.is_empty() && self.statements.iter().all(|s| !s.can_execute_in_transaction)
    }
}

pub struct MigrationResolver<'a> {
    naming: &'a Naming,
    dialect: &'static Dialect,
}

impl<'a> MigrationResolver<'a> {
    pub fn new(naming: &'a Naming, dialect: &'static Dialect) -> Self {
        Self { naming, dialect }
    }

    pub fn resolve(&self, registry: &SourceRegistry) -> Result<Vec<ResolvedMigration>> {
        let mut resolved = Vec::new();
        let mut problems = Vec::new();

        for source in registry.sources() {
            for script in source.scripts()? {
                match parse_migration_name(&script.name, self.naming) {
                    Ok(Some(name)) => resolved.push(self.sql_migration(name, script)),
                    Ok(None) => debug!("Ignoring {} (not a migration file)", script.location),
                    Err(reason) => {
                        let problem = format!("{}: {}", script.location, reason);
                        if self.naming.validate_migration_naming {
                            problems.push(problem);
                        } else {
                            warn!("Skipping {}", problem);
                        }
                    }
                }
            }
        }

        if !problems.is_empty() {
            return Err(KeelError::InvalidMigrationNames { problems });
        }

        for code in registry.code_migrations() {
            resolved.push(ResolvedMigration {
                version: code.version(),
                description: code.description(),
                script: code.script_name(),
                checksum: code.checksum(),
                migration_type: MigrationType::Code,
                location: format!("code:{}", code.script_name()),
                executor: MigrationExecutor::Code(code.clone()),
            });
        }

        check_conflicts(&resolved)?;
        resolved.sort_by(compare_resolved);
        debug!("Resolved {} migrations", resolved.len());
        Ok(resolved)
    }

    fn sql_migration(&self, name: ParsedName, script: source::ScriptFile) -> ResolvedMigration {
        let (version, description) = match name {
            ParsedName::Versioned {
                version,
                description,
            } => (Some(version), description),
            ParsedName::Repeatable { description } => (None, description),
        };
        ResolvedMigration {
            version,
            description,
            checksum: Some(checksum::checksum(&script.content)),
            script: script.name,
            migration_type: MigrationType::Sql,
            location: script.location,
            executor: MigrationExecutor::Sql {
                content: script.content,
            },
        }
    }

    /// Replace placeholders and split the script into statements.
    pub fn prepare(
        &self,
        migration: &ResolvedMigration,
        content: &str,
        placeholders: &PlaceholderContext,
    ) -> Result<PreparedScript> {
        let content = match placeholders.replacer(&migration.script) {
            Some(replacer) => replacer.replace(content).map_err(|e| KeelError::Placeholder {
                script: migration.script.clone(),
                message: e.to_string(),
            })?,
            None => content.to_string(),
        };
        let statements =
            parse_statements(&content, self.dialect).map_err(|e| KeelError::Parse {
                script: migration.script.clone(),
                line: e.line,
                message: e.message,
            })?;
        Ok(PreparedScript {
            content,
            statements,
        })
    }
}

/// Placeholder values for one run, including the built-ins.
#[derive(Debug, Clone)]
pub struct PlaceholderContext {
    enabled: bool,
    prefix: String,
    suffix: String,
    values: BTreeMap<String, String>,
}

impl PlaceholderContext {
    pub fn new(config: &Placeholders, default_schema: &str, user: &str, table: &str) -> Self {
        let mut values = config.values.clone();
        values.insert("keel:defaultSchema".to_string(), default_schema.to_string());
        values.insert("keel:user".to_string(), user.to_string());
        values.insert("keel:table".to_string(), table.to_string());
        Self {
            enabled: config.enabled,
            prefix: config.prefix.clone(),
            suffix: config.suffix.clone(),
            values,
        }
    }

    /// Placeholder replacement switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            prefix: String::new(),
            suffix: String::new(),
            values: BTreeMap::new(),
        }
    }

    fn replacer(&self, script: &str) -> Option<PlaceholderReplacer> {
        self.enabled.then(|| {
            PlaceholderReplacer::new(self.values.clone(), &self.prefix, &self.suffix)
                .with_value("keel:filename", script)
        })
    }
}

fn check_conflicts(migrations: &[ResolvedMigration]) -> Result<()> {
    let mut versions: HashMap<&MigrationVersion, &ResolvedMigration> = HashMap::new();
    let mut repeatables: HashMap<&str, &ResolvedMigration> = HashMap::new();

    for migration in migrations {
        match &migration.version {
            Some(version) => {
                if let Some(first) = versions.insert(version, migration) {
                    return Err(KeelError::VersionConflict {
                        version: version.to_string(),
                        first: first.location.clone(),
                        second: migration.location.clone(),
                    });
                }
            }
            None => {
                if let Some(first) = repeatables.insert(&migration.description, migration) {
                    return Err(KeelError::RepeatableConflict {
                        description: migration.description.clone(),
                        first: first.location.clone(),
                        second: migration.location.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
