//! Database capability interface used by the migration engine.
//!
//! The engine never issues dialect-specific SQL of its own beyond the history
//! table DDL; everything else goes through [`Database`].

pub mod connection;
pub mod error_context;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod postgres;

use crate::history::{HistoryRow, NewHistoryRow, TableRef};
use crate::parser::Dialect;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("{message}")]
    Execution {
        message: String,
        /// 1-based line within the statement text, when the server reports a position
        line: Option<usize>,
        detail: Option<String>,
        hint: Option<String>,
    },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("{operation} is not supported by {backend}")]
    Unsupported { backend: String, operation: String },

    #[error("{0}")]
    Internal(String),
}

impl DbError {
    pub fn execution(message: impl Into<String>) -> Self {
        DbError::Execution {
            message: message.into(),
            line: None,
            detail: None,
            hint: None,
        }
    }
}

/// How the backend can provide mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPrimitive {
    /// Session-scoped advisory lock keyed by an integer
    Advisory,
    /// No native primitive; lock by inserting a sentinel history row
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    EventTrigger,
    View,
    MaterializedView,
    Table,
    Sequence,
    Routine,
    Domain,
    Type,
}

impl ObjectKind {
    /// Drop precedence used when dependencies form a cycle
    pub fn drop_priority(&self) -> u8 {
        match self {
            ObjectKind::EventTrigger => 0,
            ObjectKind::View => 1,
            ObjectKind::MaterializedView => 2,
            ObjectKind::Table => 3,
            ObjectKind::Sequence => 4,
            ObjectKind::Routine => 5,
            ObjectKind::Domain => 6,
            ObjectKind::Type => 7,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::EventTrigger => "event trigger",
            ObjectKind::View => "view",
            ObjectKind::MaterializedView => "materialized view",
            ObjectKind::Table => "table",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Routine => "routine",
            ObjectKind::Domain => "domain",
            ObjectKind::Type => "type",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub schema: Option<String>,
    pub name: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An object found in the database by clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub id: ObjectRef,
    /// Argument list for routines, needed to address overloads
    pub signature: Option<String>,
    /// Objects this one depends on; they must be dropped after it
    pub depends_on: Vec<ObjectRef>,
}

/// An open transaction on the target database.
#[async_trait]
pub trait DbTransaction: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError>;
    async fn insert_history_row(
        &mut self,
        table: &TableRef,
        row: &NewHistoryRow,
    ) -> Result<(), DbError>;
    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

#[async_trait]
pub trait Database: Send + Sync {
    /// Backend name used in messages
    fn name(&self) -> &str;

    fn dialect(&self) -> &'static Dialect;

    fn quote(&self, identifier: &str) -> String;

    fn supports_ddl_transactions(&self) -> bool {
        self.dialect().supports_ddl_transactions
    }

    fn qualified(&self, table: &TableRef) -> String {
        format!("{}.{}", self.quote(&table.schema), self.quote(&table.table))
    }

    async fn current_user(&self) -> Result<String, DbError>;

    async fn schema_exists(&self, schema: &str) -> Result<bool, DbError>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool, DbError>;

    async fn create_schema(&self, schema: &str) -> Result<(), DbError> {
        self.execute(&format!("CREATE SCHEMA {}", self.quote(schema)))
            .await
    }

    async fn drop_schema(&self, schema: &str) -> Result<(), DbError> {
        self.execute(&format!("DROP SCHEMA {} CASCADE", self.quote(schema)))
            .await
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError>;

    async fn begin(&self) -> Result<Box<dyn DbTransaction>, DbError>;

    /// DDL creating the history table, optionally seeded with a baseline row.
    fn create_history_table_ddl(
        &self,
        table: &TableRef,
        baseline: Option<&NewHistoryRow>,
    ) -> Vec<String> {
        let qualified = self.qualified(table);
        let mut ddl = vec![format!(
            "CREATE TABLE IF NOT EXISTS {qualified} (\n    \
             installed_rank INT NOT NULL,\n    \
             version VARCHAR(50),\n    \
             description VARCHAR(200) NOT NULL,\n    \
             type VARCHAR(20) NOT NULL,\n    \
             script VARCHAR(1000) NOT NULL,\n    \
             checksum INT,\n    \
             installed_by VARCHAR(100) NOT NULL,\n    \
             installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
             execution_time INT NOT NULL,\n    \
             success BOOLEAN NOT NULL,\n    \
             CONSTRAINT {pk} PRIMARY KEY (installed_rank)\n)",
            pk = self.quote(&format!("{}_pk", table.table)),
        )];
        ddl.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {qualified} (success)",
            self.quote(&format!("{}_s_idx", table.table)),
        ));
        if let Some(row) = baseline {
            ddl.push(format!(
                "INSERT INTO {qualified} (installed_rank, version, description, type, script, \
                 checksum, installed_by, execution_time, success) \
                 VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {})",
                row.installed_rank,
                sql_string_or_null(row.version.as_deref()),
                sql_string(&row.description),
                sql_string(&row.migration_type),
                sql_string(&row.script),
                row.checksum
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "NULL".to_string()),
                sql_string(&row.installed_by),
                row.execution_time,
                self.dialect().boolean_literal(row.success),
            ));
        }
        ddl
    }

    async fn create_history_table(
        &self,
        table: &TableRef,
        baseline: Option<&NewHistoryRow>,
    ) -> Result<(), DbError> {
        for statement in self.create_history_table_ddl(table, baseline) {
            self.execute(&statement).await?;
        }
        Ok(())
    }

    /// All rows of the history table ordered by rank, lock rows included.
    async fn read_history(&self, table: &TableRef) -> Result<Vec<HistoryRow>, DbError>;

    async fn insert_history_row(&self, table: &TableRef, row: &NewHistoryRow)
    -> Result<(), DbError>;

    async fn update_history_row(
        &self,
        table: &TableRef,
        rank: i32,
        description: &str,
        migration_type: &str,
        checksum: Option<i32>,
    ) -> Result<(), DbError>;

    async fn set_history_success(
        &self,
        table: &TableRef,
        rank: i32,
        success: bool,
    ) -> Result<(), DbError>;

    async fn delete_history_row(&self, table: &TableRef, rank: i32) -> Result<(), DbError>;

    fn lock_primitive(&self) -> LockPrimitive;

    async fn try_advisory_lock(&self, key: i64) -> Result<bool, DbError> {
        let _ = key;
        Err(DbError::Unsupported {
            backend: self.name().to_string(),
            operation: "advisory locking".to_string(),
        })
    }

    async fn advisory_unlock(&self, key: i64) -> Result<(), DbError> {
        let _ = key;
        Err(DbError::Unsupported {
            backend: self.name().to_string(),
            operation: "advisory locking".to_string(),
        })
    }

    /// Insert the lock row; fails with [`DbError::UniqueViolation`] when held.
    async fn insert_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError>;

    async fn refresh_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError>;

    async fn delete_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError>;

    /// Remove lock rows not refreshed within `expiry`. Returns the number removed.
    async fn delete_expired_lock_rows(
        &self,
        table: &TableRef,
        expiry: Duration,
    ) -> Result<u64, DbError>;

    async fn list_schema_objects(&self, schema: &str) -> Result<Vec<SchemaObject>, DbError>;

    /// Objects not scoped to a schema that belong to the managed schemas.
    async fn list_global_objects(&self, schemas: &[String]) -> Result<Vec<SchemaObject>, DbError>;

    fn drop_object_sql(&self, object: &SchemaObject) -> String;
}

pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sql_string_or_null(value: Option<&str>) -> String {
    value.map(sql_string).unwrap_or_else(|| "NULL".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_string_escapes_quotes() {
        assert_eq!(sql_string("it's"), "'it''s'");
        assert_eq!(sql_string_or_null(None), "NULL");
    }

    #[test]
    fn test_object_ref_display() {
        let qualified = ObjectRef {
            schema: Some("app".to_string()),
            name: "users".to_string(),
        };
        assert_eq!(qualified.to_string(), "app.users");
        let global = ObjectRef {
            schema: None,
            name: "audit_trigger".to_string(),
        };
        assert_eq!(global.to_string(), "audit_trigger");
    }

    #[test]
    fn test_drop_priority_puts_views_before_tables() {
        assert!(ObjectKind::View.drop_priority() < ObjectKind::Table.drop_priority());
        assert!(ObjectKind::Table.drop_priority() < ObjectKind::Type.drop_priority());
    }
}
