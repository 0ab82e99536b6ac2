//! The command engine: migrate, validate, info, repair, baseline and clean
//! expressed as one state machine over history, resolver and lock.

pub mod baseline;
pub mod clean;
pub mod info;
pub mod migrate;
pub mod repair;
pub mod validate;

use crate::config::Config;
use crate::db::Database;
use crate::error::{KeelError, Result};
use crate::history::{AppliedMigration, SchemaHistory, TableRef};
use crate::lock::{LockCoordinator, LockStatus};
use crate::parser::Dialect;
use crate::resolver::{MigrationResolver, PlaceholderContext, ResolvedMigration, SourceRegistry};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

pub use baseline::BaselineResult;
pub use clean::CleanResult;
pub use info::{InfoResult, MigrationInfo, MigrationState};
pub use migrate::MigrateResult;
pub use repair::RepairResult;
pub use validate::{ValidationIssue, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Locking,
    LoadingHistory,
    Resolving,
    Diffing,
    Executing,
    AppendingHistory,
    Unlocking,
    Done,
    Failed,
}

impl EngineState {
    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        match (self, next) {
            // repair finishes straight away when there is no history
            (Idle, Locking | LoadingHistory | Done) => true,
            (Locking, LoadingHistory) => true,
            // baseline writes straight after loading, clean drops straight away
            (LoadingHistory, Resolving | AppendingHistory | Executing) => true,
            (Resolving, Diffing) => true,
            // read-only commands finish after diffing
            (Diffing, Executing | AppendingHistory | Unlocking | Done) => true,
            (Executing, AppendingHistory | Unlocking) => true,
            (AppendingHistory, Executing | Unlocking) => true,
            (Unlocking, Done) => true,
            (Done | Failed, Idle) => true,
            (Idle | Done | Failed, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

/// Receives progress while a command runs. Every method has a no-op default.
pub trait ProgressListener: Send + Sync {
    fn state_changed(&self, _state: EngineState) {}

    fn migration_started(&self, _migration: &ResolvedMigration, _index: usize, _total: usize) {}

    fn migration_succeeded(&self, _migration: &ResolvedMigration, _elapsed: Duration) {}

    fn migration_failed(&self, _migration: &ResolvedMigration, _error: &KeelError) {}

    fn warning(&self, _message: &str) {}
}

struct SilentListener;

impl ProgressListener for SilentListener {}

pub struct CommandEngine {
    db: Arc<dyn Database>,
    config: Config,
    sources: SourceRegistry,
    dialect: &'static Dialect,
    history: SchemaHistory,
    lock: LockCoordinator,
    state: Mutex<EngineState>,
    listener: Arc<dyn ProgressListener>,
}

impl CommandEngine {
    pub fn new(db: Arc<dyn Database>, config: Config, sources: SourceRegistry) -> Result<Self> {
        let dialect = match config.database.dialect.as_deref() {
            Some(name) => Dialect::by_name(name)
                .ok_or_else(|| KeelError::Config(format!("Unknown SQL dialect '{}'", name)))?,
            None => db.dialect(),
        };
        let table = TableRef::new(&config.history.schema, &config.history.table);
        let history = SchemaHistory::new(
            db.clone(),
            table.clone(),
            config.behavior.installed_by.clone(),
        );
        let lock = LockCoordinator::new(db.clone(), table, config.lock.clone());
        Ok(Self {
            db,
            config,
            sources,
            dialect,
            history,
            lock,
            state: Mutex::new(EngineState::Idle),
            listener: Arc::new(SilentListener),
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn history(&self) -> &SchemaHistory {
        &self.history
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    pub async fn lock_status(&self) -> LockStatus {
        self.lock.status().await
    }

    fn transition(&self, next: EngineState) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.can_transition_to(next) {
                return Err(KeelError::InvalidState {
                    from: *state,
                    to: next,
                });
            }
            debug!("Engine state {:?} -> {:?}", *state, next);
            *state = next;
        }
        self.listener.state_changed(next);
        Ok(())
    }

    /// Run one command from Idle, ending in Done or Failed.
    async fn run_command<T, Fut>(&self, command: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*state, EngineState::Done | EngineState::Failed) {
                *state = EngineState::Idle;
            }
        }
        match command.await {
            Ok(value) => {
                if self.state() != EngineState::Done {
                    self.transition(EngineState::Done)?;
                }
                Ok(value)
            }
            Err(e) => {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                debug!("Engine state {:?} -> Failed", *state);
                *state = EngineState::Failed;
                drop(state);
                self.listener.state_changed(EngineState::Failed);
                Err(e)
            }
        }
    }

    /// History rows, or none when the table does not exist yet.
    async fn load_history(&self) -> Result<Vec<AppliedMigration>> {
        self.history.clear_cache().await;
        if !self.history.exists().await? {
            return Ok(Vec::new());
        }
        self.history.load().await
    }

    fn resolver(&self) -> MigrationResolver<'_> {
        MigrationResolver::new(&self.config.naming, self.dialect)
    }

    fn resolve(&self) -> Result<Vec<ResolvedMigration>> {
        self.resolver().resolve(&self.sources)
    }

    async fn placeholder_context(&self) -> Result<PlaceholderContext> {
        if !self.config.placeholders.enabled {
            return Ok(PlaceholderContext::disabled());
        }
        let user = self.history.installed_by().await?;
        Ok(PlaceholderContext::new(
            &self.config.placeholders,
            self.config.schemas.default_schema(),
            &user,
            &self.config.history.table,
        ))
    }

    fn warn(&self, warnings: &mut Vec<String>, message: String) {
        tracing::warn!("{}", message);
        self.listener.warning(&message);
        warnings.push(message);
    }
}
