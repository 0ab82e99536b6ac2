//! The schema history ledger: one row per migration attempt, ordered by a
//! gap-free installed rank assigned while the lock is held.

use crate::constants::{DESCRIPTION_MAX_LEN, SCRIPT_MAX_LEN, VERSION_MAX_LEN};
use crate::db::{Database, DbError, DbTransaction};
use crate::error::{KeelError, Result};
use crate::version::MigrationVersion;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Identity of the history table, which is also the lock's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationType {
    Sql,
    Code,
    Baseline,
    /// Records the schemas keel created
    Schema,
}

impl MigrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationType::Sql => "SQL",
            MigrationType::Code => "CODE",
            MigrationType::Baseline => "BASELINE",
            MigrationType::Schema => "SCHEMA",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "SQL" => Some(MigrationType::Sql),
            "CODE" => Some(MigrationType::Code),
            "BASELINE" => Some(MigrationType::Baseline),
            "SCHEMA" => Some(MigrationType::Schema),
            _ => None,
        }
    }

    /// Rows written by keel itself rather than by running a migration
    pub fn is_synthetic(&self) -> bool {
        matches!(self, MigrationType::Baseline | MigrationType::Schema)
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A history row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub installed_rank: i32,
    pub version: Option<String>,
    pub description: String,
    pub migration_type: String,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub installed_on: NaiveDateTime,
    pub execution_time: i32,
    pub success: bool,
}

/// A row about to be inserted; `installed_on` is assigned by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryRow {
    pub installed_rank: i32,
    pub version: Option<String>,
    pub description: String,
    pub migration_type: String,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub execution_time: i32,
    pub success: bool,
}

/// A parsed history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub installed_rank: i32,
    pub version: Option<MigrationVersion>,
    pub description: String,
    #[serde(rename = "type")]
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub installed_on: NaiveDateTime,
    pub execution_time: i32,
    pub success: bool,
}

impl AppliedMigration {
    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    fn from_row(row: HistoryRow) -> Result<Self> {
        let version = row
            .version
            .as_deref()
            .map(MigrationVersion::parse)
            .transpose()
            .map_err(|e| {
                DbError::Internal(format!(
                    "history row {} has an unreadable version: {}",
                    row.installed_rank, e
                ))
            })?;
        let migration_type = MigrationType::parse(&row.migration_type).ok_or_else(|| {
            DbError::Internal(format!(
                "history row {} has unknown type '{}'",
                row.installed_rank, row.migration_type
            ))
        })?;
        Ok(Self {
            installed_rank: row.installed_rank,
            version,
            description: row.description,
            migration_type,
            script: row.script,
            checksum: row.checksum,
            installed_by: row.installed_by,
            installed_on: row.installed_on,
            execution_time: row.execution_time,
            success: row.success,
        })
    }
}

/// What to record for one migration attempt.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i32>,
    pub execution_time_ms: i32,
    pub success: bool,
}

pub struct SchemaHistory {
    db: Arc<dyn Database>,
    table: TableRef,
    installed_by: Option<String>,
    cache: Mutex<Option<Vec<AppliedMigration>>>,
}

impl SchemaHistory {
    pub fn new(db: Arc<dyn Database>, table: TableRef, installed_by: Option<String>) -> Self {
        Self {
            db,
            table,
            installed_by,
            cache: Mutex::new(None),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.db.table_exists(&self.table).await?)
    }

    /// Create the table, optionally seeded with a baseline entry at rank 1.
    pub async fn create(&self, baseline: Option<HistoryEntry>) -> Result<()> {
        let row = match baseline {
            Some(entry) => Some(self.row_for(entry, 1).await?),
            None => None,
        };
        debug!("Creating schema history table {}", self.table);
        self.db
            .create_history_table(&self.table, row.as_ref())
            .await?;
        self.clear_cache().await;
        Ok(())
    }

    /// Applied migrations ordered by rank. Cached until [`clear_cache`](Self::clear_cache).
    pub async fn load(&self) -> Result<Vec<AppliedMigration>> {
        let mut cache = self.cache.lock().await;
        if let Some(rows) = cache.as_ref() {
            return Ok(rows.clone());
        }
        let rows = self.read_fresh().await?;
        *cache = Some(rows.clone());
        Ok(rows)
    }

    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }

    /// The highest successfully applied version.
    pub async fn latest_applied(&self) -> Result<Option<AppliedMigration>> {
        let rows = self.load().await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.success && row.version.is_some())
            .max_by(|a, b| a.version.cmp(&b.version)))
    }

    pub async fn has_failed(&self) -> Result<bool> {
        Ok(self.load().await?.iter().any(|row| !row.success))
    }

    /// Record an attempt. The rank is computed from the table itself, so the
    /// caller must hold the lock.
    pub async fn append(&self, entry: HistoryEntry) -> Result<AppliedMigration> {
        let rank = self.next_rank().await?;
        let row = self.row_for(entry, rank).await?;
        self.db.insert_history_row(&self.table, &row).await?;
        self.clear_cache().await;
        self.find(rank).await
    }

    /// The row [`append`](Self::append) would insert next. Built before a
    /// transaction is opened, since the backend may have a single connection.
    pub async fn next_row(&self, entry: HistoryEntry) -> Result<NewHistoryRow> {
        let rank = self.next_rank().await?;
        self.row_for(entry, rank).await
    }

    /// Insert `row` inside `tx`, so it commits with the migration's statements.
    pub async fn append_in(&self, tx: &mut dyn DbTransaction, row: &NewHistoryRow) -> Result<()> {
        tx.insert_history_row(&self.table, row).await?;
        self.clear_cache().await;
        Ok(())
    }

    pub async fn mark_failed(&self, rank: i32) -> Result<()> {
        self.db
            .set_history_success(&self.table, rank, false)
            .await?;
        self.clear_cache().await;
        Ok(())
    }

    /// Realign a row with its resolved migration.
    pub async fn update(
        &self,
        rank: i32,
        description: &str,
        migration_type: MigrationType,
        checksum: Option<i32>,
    ) -> Result<()> {
        self.db
            .update_history_row(
                &self.table,
                rank,
                truncate(description, DESCRIPTION_MAX_LEN),
                migration_type.as_str(),
                checksum,
            )
            .await?;
        self.clear_cache().await;
        Ok(())
    }

    /// Remove every failed row, returning what was removed.
    pub async fn delete_failed(&self) -> Result<Vec<AppliedMigration>> {
        let failed: Vec<AppliedMigration> = self
            .read_fresh()
            .await?
            .into_iter()
            .filter(|row| !row.success)
            .collect();
        for row in &failed {
            self.db
                .delete_history_row(&self.table, row.installed_rank)
                .await?;
        }
        self.clear_cache().await;
        Ok(failed)
    }

    async fn read_fresh(&self) -> Result<Vec<AppliedMigration>> {
        let mut rows = self
            .db
            .read_history(&self.table)
            .await?
            .into_iter()
            // negative ranks are lock rows
            .filter(|row| row.installed_rank >= 0)
            .map(AppliedMigration::from_row)
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by_key(|row| row.installed_rank);
        Ok(rows)
    }

    async fn next_rank(&self) -> Result<i32> {
        let max = self
            .read_fresh()
            .await?
            .last()
            .map(|row| row.installed_rank)
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn find(&self, rank: i32) -> Result<AppliedMigration> {
        self.load()
            .await?
            .into_iter()
            .find(|row| row.installed_rank == rank)
            .ok_or_else(|| {
                KeelError::Database(DbError::Internal(format!(
                    "history row {} disappeared after insert",
                    rank
                )))
            })
    }

    pub async fn installed_by(&self) -> Result<String> {
        match &self.installed_by {
            Some(user) => Ok(user.clone()),
            None => Ok(self.db.current_user().await?),
        }
    }

    async fn row_for(&self, entry: HistoryEntry, rank: i32) -> Result<NewHistoryRow> {
        let version = entry.version.map(|v| v.to_string());
        if let Some(v) = &version
            && v.len() > VERSION_MAX_LEN
        {
            return Err(KeelError::Config(format!(
                "version {} is longer than {} characters",
                v, VERSION_MAX_LEN
            )));
        }
        Ok(NewHistoryRow {
            installed_rank: rank,
            version,
            description: truncate(&entry.description, DESCRIPTION_MAX_LEN).to_string(),
            migration_type: entry.migration_type.as_str().to_string(),
            script: truncate(&entry.script, SCRIPT_MAX_LEN).to_string(),
            checksum: entry.checksum,
            installed_by: self.installed_by().await?,
            execution_time: entry.execution_time_ms,
            success: entry.success,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
