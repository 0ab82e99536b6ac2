use super::info::{self, MigrationState, diff};
use super::validate;
use super::{CommandEngine, EngineState};
use crate::constants::{SCHEMA_MARKER_DESCRIPTION, SCHEMA_MARKER_VERSION};
use crate::db::{DbError, SchemaObject};
use crate::db::error_context::SqlErrorContext;
use crate::error::{KeelError, Result};
use crate::history::{HistoryEntry, MigrationType};
use crate::parser::SqlStatement;
use crate::resolver::{
    CodeMigration, MigrationExecutor, PlaceholderContext, PreparedScript, ResolvedMigration,
};
use crate::version::MigrationVersion;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One migration run by migrate.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub version: Option<String>,
    pub description: String,
    pub script: String,
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    pub execution_time_ms: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrateResult {
    pub initial_version: Option<String>,
    pub target_version: Option<String>,
    pub migrations: Vec<MigrationSummary>,
    pub schemas_created: Vec<String>,
    /// Set when baseline_on_migrate wrote a baseline first
    pub baseline: Option<String>,
    pub warnings: Vec<String>,
}

impl MigrateResult {
    pub fn migrations_executed(&self) -> usize {
        self.migrations.len()
    }
}

/// What was set up before the lock was taken.
#[derive(Debug, Default)]
struct Preflight {
    created_schemas: Vec<String>,
    needs_baseline: bool,
}

/// How a pending migration will run.
enum ExecutionPlan {
    /// All statements and the history row in one transaction
    Transactional(PreparedScript),
    /// Statement by statement with autocommit
    Statements(PreparedScript),
    Code(Arc<dyn CodeMigration>),
}

impl CommandEngine {
    /// Apply every pending migration in order.
    pub async fn migrate(&self) -> Result<MigrateResult> {
        self.run_command(async {
            let preflight = self.preflight().await?;
            self.transition(EngineState::Locking)?;
            self.lock.with_lock(self.migrate_locked(preflight)).await
        })
        .await
    }

    /// Create missing schemas and the history table. Both are idempotent,
    /// and the lock row needs the table to exist.
    async fn preflight(&self) -> Result<Preflight> {
        if self.history.exists().await? {
            return Ok(Preflight::default());
        }

        // a concurrent run may create the history table between the checks
        let table = self.history.table();
        let is_history_table = |object: &SchemaObject| {
            object
                .id
                .schema
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(&table.schema))
                && object.id.name.eq_ignore_ascii_case(&table.table)
        };
        let mut non_empty = Vec::new();
        for schema in &self.config.schemas.names {
            if self.db.schema_exists(schema).await?
                && self
                    .db
                    .list_schema_objects(schema)
                    .await?
                    .iter()
                    .any(|o| !is_history_table(o))
            {
                non_empty.push(schema.clone());
            }
        }
        let needs_baseline = !non_empty.is_empty();
        if needs_baseline && !self.config.behavior.baseline_on_migrate {
            return Err(KeelError::NonEmptySchema { schemas: non_empty });
        }

        let created_schemas = self.ensure_history_table().await?;
        Ok(Preflight {
            created_schemas,
            needs_baseline,
        })
    }

    /// Create the managed schemas that are missing, then the history table.
    /// Returns the managed schemas this call created.
    pub(super) async fn ensure_history_table(&self) -> Result<Vec<String>> {
        let mut created = Vec::new();
        let history_schema = &self.config.history.schema;
        let mut wanted: Vec<&String> = self.config.schemas.names.iter().collect();
        if !wanted.contains(&history_schema) {
            wanted.push(history_schema);
        }

        for schema in wanted {
            if self.db.schema_exists(schema).await? {
                continue;
            }
            if !self.config.schemas.create {
                if schema == history_schema {
                    return Err(KeelError::Config(format!(
                        "Schema {} does not exist and schema creation is disabled",
                        schema
                    )));
                }
                warn!("Schema {} does not exist and will not be created", schema);
                continue;
            }
            info!("Creating schema {}", schema);
            if let Err(e) = self.db.create_schema(schema).await {
                // another process may have created it first
                if !self.db.schema_exists(schema).await? {
                    return Err(e.into());
                }
                continue;
            }
            if self.config.schemas.names.contains(schema) {
                created.push(schema.clone());
            }
        }

        if !self.history.exists().await? {
            info!("Creating schema history table {}", self.history.table());
            self.history.create(None).await?;
        }
        Ok(created)
    }

    async fn migrate_locked(&self, preflight: Preflight) -> Result<MigrateResult> {
        let mut result = MigrateResult {
            schemas_created: preflight.created_schemas.clone(),
            ..Default::default()
        };

        self.transition(EngineState::LoadingHistory)?;
        let mut applied = self.load_history().await?;
        // a concurrent run may have set the table up while we waited
        if applied.is_empty() {
            if !preflight.created_schemas.is_empty() {
                self.history
                    .append(schema_marker(&preflight.created_schemas)?)
                    .await?;
            }
            if preflight.needs_baseline {
                let baseline = self.lock.with_lock(self.write_baseline()).await?;
                result.baseline = Some(baseline.version);
            }
            applied = self.load_history().await?;
        }

        self.transition(EngineState::Resolving)?;
        let resolved = self.resolve()?;

        self.transition(EngineState::Diffing)?;
        let behavior = &self.config.behavior;
        let infos = diff(&resolved, &applied, behavior);
        result.initial_version = info::current_version(&infos).map(|v| v.to_string());

        if let Some(failed) = infos.iter().find(|i| i.state.is_failed()) {
            return Err(KeelError::FailedMigrationPresent {
                version: failed
                    .version()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "<repeatable>".to_string()),
                script: failed.script().to_string(),
            });
        }
        if behavior.validate_on_migrate {
            let mut rules = behavior.clone();
            rules.ignore_pending = true;
            let report = validate::check(&infos, &rules);
            if !report.is_valid() {
                return Err(KeelError::Validation(report));
            }
        }
        for info in &infos {
            match info.state {
                MigrationState::FutureSuccess => self.warn(
                    &mut result.warnings,
                    format!(
                        "Schema is at version {}, newer than the latest available migration",
                        info.version().map(ToString::to_string).unwrap_or_default()
                    ),
                ),
                MigrationState::Ignored => self.warn(
                    &mut result.warnings,
                    format!(
                        "Ignoring {}: older than the latest applied version",
                        info.script()
                    ),
                ),
                _ => {}
            }
        }

        let pending: Vec<ResolvedMigration> =
            info::pending(&infos).into_iter().cloned().collect();
        if pending.is_empty() {
            info!(
                "Schema {} is up to date. No migration necessary.",
                self.config.schemas.default_schema()
            );
            result.target_version = result.initial_version.clone();
            self.transition(EngineState::Unlocking)?;
            return Ok(result);
        }

        // parse and placeholder errors surface before anything runs
        let placeholders = self.placeholder_context().await?;
        let plans = pending
            .iter()
            .map(|m| self.plan(m, &placeholders))
            .collect::<Result<Vec<_>>>()?;

        let total = pending.len();
        for (index, (migration, plan)) in pending.iter().zip(plans).enumerate() {
            self.transition(EngineState::Executing)?;
            self.listener.migration_started(migration, index + 1, total);
            info!("Migrating {} - {}", label(migration), migration.description);

            let started = Instant::now();
            match self.apply(migration, plan).await {
                Ok(execution_time_ms) => {
                    self.listener
                        .migration_succeeded(migration, started.elapsed());
                    result.migrations.push(MigrationSummary {
                        version: migration.version.as_ref().map(ToString::to_string),
                        description: migration.description.clone(),
                        script: migration.script.clone(),
                        migration_type: migration.migration_type,
                        execution_time_ms,
                    });
                }
                Err(e) => {
                    self.listener.migration_failed(migration, &e);
                    return Err(e);
                }
            }
            self.lock.refresh().await?;
        }

        result.target_version = pending
            .iter()
            .filter_map(|m| m.version.as_ref())
            .max()
            .map(ToString::to_string)
            .or(result.initial_version.clone());
        info!(
            "Successfully applied {} migration(s){}",
            result.migrations.len(),
            result
                .target_version
                .as_ref()
                .map(|v| format!(", now at version {}", v))
                .unwrap_or_default()
        );
        self.transition(EngineState::Unlocking)?;
        Ok(result)
    }

    fn plan(
        &self,
        migration: &ResolvedMigration,
        placeholders: &PlaceholderContext,
    ) -> Result<ExecutionPlan> {
        let content = match &migration.executor {
            MigrationExecutor::Code(code) => return Ok(ExecutionPlan::Code(code.clone())),
            MigrationExecutor::Sql { content } => content,
        };
        let prepared = self.resolver().prepare(migration, content, placeholders)?;

        if !self.db.supports_ddl_transactions() || prepared.none_transactional() {
            Ok(ExecutionPlan::Statements(prepared))
        } else if prepared.all_transactional() {
            Ok(ExecutionPlan::Transactional(prepared))
        } else if self.config.behavior.mixed {
            debug!(
                "{} mixes transactional and non-transactional statements, running without a transaction",
                migration.script
            );
            Ok(ExecutionPlan::Statements(prepared))
        } else {
            Err(KeelError::MixedTransactional {
                script: migration.script.clone(),
            })
        }
    }

    /// Run one migration and record it. Returns the execution time in ms.
    async fn apply(&self, migration: &ResolvedMigration, plan: ExecutionPlan) -> Result<i32> {
        match plan {
            ExecutionPlan::Transactional(script) => self.apply_in_transaction(migration, &script).await,
            ExecutionPlan::Statements(script) => self.apply_statements(migration, &script).await,
            ExecutionPlan::Code(code) => self.apply_code(migration, code.as_ref()).await,
        }
    }

    async fn apply_in_transaction(
        &self,
        migration: &ResolvedMigration,
        script: &PreparedScript,
    ) -> Result<i32> {
        let started = Instant::now();
        // computed up front: the backend may have only one connection
        let mut row = self.history.next_row(entry(migration, 0, true)).await?;

        let mut tx = self.db.begin().await?;
        for statement in &script.statements {
            if let Err(error) = tx.execute(&statement.text).await {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("Rollback of {} failed: {}", migration.script, rollback_error);
                }
                let failure = sql_error(migration, script, statement, &error, true);
                if self.config.behavior.record_failed_on_rollback {
                    self.transition(EngineState::AppendingHistory)?;
                    self.history
                        .append(entry(migration, elapsed_ms(started), false))
                        .await?;
                }
                return Err(failure);
            }
        }

        self.transition(EngineState::AppendingHistory)?;
        row.execution_time = elapsed_ms(started);
        if let Err(e) = self.history.append_in(tx.as_mut(), &row).await {
            if let Err(rollback_error) = tx.rollback().await {
                warn!("Rollback of {} failed: {}", migration.script, rollback_error);
            }
            return Err(e);
        }
        tx.commit().await?;
        Ok(row.execution_time)
    }

    async fn apply_statements(
        &self,
        migration: &ResolvedMigration,
        script: &PreparedScript,
    ) -> Result<i32> {
        let started = Instant::now();
        for statement in &script.statements {
            if let Err(error) = self.db.execute(&statement.text).await {
                let failure = sql_error(migration, script, statement, &error, false);
                self.transition(EngineState::AppendingHistory)?;
                self.history
                    .append(entry(migration, elapsed_ms(started), false))
                    .await?;
                return Err(failure);
            }
        }
        self.transition(EngineState::AppendingHistory)?;
        let execution_time = elapsed_ms(started);
        self.history
            .append(entry(migration, execution_time, true))
            .await?;
        Ok(execution_time)
    }

    async fn apply_code(&self, migration: &ResolvedMigration, code: &dyn CodeMigration) -> Result<i32> {
        let started = Instant::now();
        let outcome = code.migrate(self.db.as_ref()).await;
        let execution_time = elapsed_ms(started);
        self.transition(EngineState::AppendingHistory)?;
        match outcome {
            Ok(()) => {
                self.history
                    .append(entry(migration, execution_time, true))
                    .await?;
                Ok(execution_time)
            }
            Err(e) => {
                self.history
                    .append(entry(migration, execution_time, false))
                    .await?;
                Err(KeelError::CodeMigration {
                    script: migration.script.clone(),
                    message: format!("{:#}", e),
                })
            }
        }
    }
}

fn label(migration: &ResolvedMigration) -> String {
    match &migration.version {
        Some(version) => format!("to version {}", version),
        None => "with repeatable migration".to_string(),
    }
}

fn entry(migration: &ResolvedMigration, execution_time_ms: i32, success: bool) -> HistoryEntry {
    HistoryEntry {
        version: migration.version.clone(),
        description: migration.description.clone(),
        migration_type: migration.migration_type,
        script: migration.script.clone(),
        checksum: migration.checksum,
        execution_time_ms,
        success,
    }
}

/// History entry listing the schemas created for this history table.
fn schema_marker(schemas: &[String]) -> Result<HistoryEntry> {
    let version = MigrationVersion::parse(SCHEMA_MARKER_VERSION)
        .map_err(|e| KeelError::Config(e.to_string()))?;
    Ok(HistoryEntry {
        version: Some(version),
        description: SCHEMA_MARKER_DESCRIPTION.to_string(),
        migration_type: MigrationType::Schema,
        script: schemas.join(","),
        checksum: None,
        execution_time_ms: 0,
        success: true,
    })
}

fn sql_error(
    migration: &ResolvedMigration,
    script: &PreparedScript,
    statement: &SqlStatement,
    error: &DbError,
    rolled_back: bool,
) -> KeelError {
    let context = SqlErrorContext::from_db_error(error, statement.line);
    KeelError::SqlExecution {
        script: migration.script.clone(),
        line: context.line_number,
        statement: statement.text.clone(),
        message: context.message.clone(),
        excerpt: context.excerpt(&script.content),
        rolled_back,
    }
}

fn elapsed_ms(started: Instant) -> i32 {
    started.elapsed().as_millis().min(i32::MAX as u128) as i32
}
