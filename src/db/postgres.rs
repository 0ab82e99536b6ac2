//! PostgreSQL backend over a single-connection sqlx pool.
//!
//! Advisory locks are session scoped, so the pool never holds more than one
//! connection and never recycles it while a command runs.

use crate::constants::{LOCK_ROW_DESCRIPTION, LOCK_ROW_RANK};
use crate::db::error_context::position_to_line;
use crate::db::{
    Database, DbError, DbTransaction, LockPrimitive, ObjectKind, ObjectRef, SchemaObject,
};
use crate::history::{HistoryRow, NewHistoryRow, TableRef};
use crate::parser::Dialect;
use crate::parser::dialect::POSTGRESQL;
use async_trait::async_trait;
use sqlx::postgres::{PgDatabaseError, PgErrorPosition};
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use std::time::Duration;

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a sqlx error, resolving the server's error position against `sql`.
pub fn map_sqlx_error(error: sqlx::Error, sql: &str) -> DbError {
    if let Some(db_error) = error.as_database_error() {
        if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return DbError::UniqueViolation(db_error.message().to_string());
        }
        if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
            let line = pg_error.position().map(|pos| match pos {
                PgErrorPosition::Original(p) => position_to_line(sql, p),
                PgErrorPosition::Internal { .. } => 1,
            });
            return DbError::Execution {
                message: pg_error.message().to_string(),
                line,
                detail: pg_error.detail().map(str::to_string),
                hint: pg_error.hint().map(str::to_string),
            };
        }
    }
    match error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            DbError::Connection(error.to_string())
        }
        other => DbError::execution(other.to_string()),
    }
}

fn kind_from_code(code: &str) -> Option<ObjectKind> {
    match code {
        "v" => Some(ObjectKind::View),
        "m" => Some(ObjectKind::MaterializedView),
        "r" | "p" | "f" => Some(ObjectKind::Table),
        "S" => Some(ObjectKind::Sequence),
        _ => None,
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DbTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        conn.execute(sqlx::raw_sql(sql))
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn insert_history_row(
        &mut self,
        table: &TableRef,
        row: &NewHistoryRow,
    ) -> Result<(), DbError> {
        let sql = insert_sql(table);
        bind_row(sqlx::query(&sql), row)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error(e, "COMMIT"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error(e, "ROLLBACK"))
    }
}

fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.table))
}

fn insert_sql(table: &TableRef) -> String {
    format!(
        "INSERT INTO {} (installed_rank, version, description, type, script, checksum, \
         installed_by, execution_time, success) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        qualified(table)
    )
}

fn bind_row<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    row: &'q NewHistoryRow,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(row.installed_rank)
        .bind(row.version.as_deref())
        .bind(row.description.as_str())
        .bind(row.migration_type.as_str())
        .bind(row.script.as_str())
        .bind(row.checksum)
        .bind(row.installed_by.as_str())
        .bind(row.execution_time)
        .bind(row.success)
}

#[async_trait]
impl Database for PostgresDatabase {
    fn name(&self) -> &str {
        "PostgreSQL"
    }

    fn dialect(&self) -> &'static Dialect {
        &POSTGRESQL
    }

    fn quote(&self, identifier: &str) -> String {
        quote_ident(identifier)
    }

    async fn current_user(&self) -> Result<String, DbError> {
        sqlx::query_scalar::<_, String>("SELECT current_user::text")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "SELECT current_user"))
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool, DbError> {
        let sql = "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)";
        sqlx::query_scalar::<_, bool>(sql)
            .bind(schema)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, DbError> {
        let sql = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                   WHERE table_schema = $1 AND table_name = $2)";
        sqlx::query_scalar::<_, bool>(sql)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn begin(&self) -> Result<Box<dyn DbTransaction>, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, "BEGIN"))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn read_history(&self, table: &TableRef) -> Result<Vec<HistoryRow>, DbError> {
        let sql = format!(
            "SELECT installed_rank, version, description, type, script, checksum, installed_by, \
             installed_on, execution_time, success FROM {} ORDER BY installed_rank",
            qualified(table)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &sql))?;

        rows.iter()
            .map(|row| -> Result<HistoryRow, sqlx::Error> {
                Ok(HistoryRow {
                    installed_rank: row.try_get("installed_rank")?,
                    version: row.try_get("version")?,
                    description: row.try_get("description")?,
                    migration_type: row.try_get("type")?,
                    script: row.try_get("script")?,
                    checksum: row.try_get("checksum")?,
                    installed_by: row.try_get("installed_by")?,
                    installed_on: row.try_get("installed_on")?,
                    execution_time: row.try_get("execution_time")?,
                    success: row.try_get("success")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn insert_history_row(
        &self,
        table: &TableRef,
        row: &NewHistoryRow,
    ) -> Result<(), DbError> {
        let sql = insert_sql(table);
        bind_row(sqlx::query(&sql), row)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn update_history_row(
        &self,
        table: &TableRef,
        rank: i32,
        description: &str,
        migration_type: &str,
        checksum: Option<i32>,
    ) -> Result<(), DbError> {
        let sql = format!(
            "UPDATE {} SET description = $1, type = $2, checksum = $3 WHERE installed_rank = $4",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(description)
            .bind(migration_type)
            .bind(checksum)
            .bind(rank)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn set_history_success(
        &self,
        table: &TableRef,
        rank: i32,
        success: bool,
    ) -> Result<(), DbError> {
        let sql = format!(
            "UPDATE {} SET success = $1 WHERE installed_rank = $2",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(success)
            .bind(rank)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn delete_history_row(&self, table: &TableRef, rank: i32) -> Result<(), DbError> {
        let sql = format!("DELETE FROM {} WHERE installed_rank = $1", qualified(table));
        sqlx::query(&sql)
            .bind(rank)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    fn lock_primitive(&self) -> LockPrimitive {
        LockPrimitive::Advisory
    }

    async fn try_advisory_lock(&self, key: i64) -> Result<bool, DbError> {
        let sql = "SELECT pg_try_advisory_lock($1)";
        sqlx::query_scalar::<_, bool>(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn advisory_unlock(&self, key: i64) -> Result<(), DbError> {
        let sql = "SELECT pg_advisory_unlock($1)";
        sqlx::query_scalar::<_, bool>(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, sql))
    }

    async fn insert_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        let sql = format!(
            "INSERT INTO {} (installed_rank, version, description, type, script, checksum, \
             installed_by, execution_time, success) \
             VALUES ($1, NULL, $2, 'LOCK', $3, NULL, current_user, 0, TRUE)",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(LOCK_ROW_RANK)
            .bind(LOCK_ROW_DESCRIPTION)
            .bind(token)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn refresh_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        let sql = format!(
            "UPDATE {} SET installed_on = CURRENT_TIMESTAMP \
             WHERE installed_rank = $1 AND script = $2",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(LOCK_ROW_RANK)
            .bind(token)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn delete_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        let sql = format!(
            "DELETE FROM {} WHERE installed_rank = $1 AND script = $2",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(LOCK_ROW_RANK)
            .bind(token)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn delete_expired_lock_rows(
        &self,
        table: &TableRef,
        expiry: Duration,
    ) -> Result<u64, DbError> {
        let sql = format!(
            "DELETE FROM {} WHERE installed_rank = $1 \
             AND installed_on < CURRENT_TIMESTAMP - make_interval(secs => $2)",
            qualified(table)
        );
        sqlx::query(&sql)
            .bind(LOCK_ROW_RANK)
            .bind(expiry.as_secs_f64())
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| map_sqlx_error(e, &sql))
    }

    async fn list_schema_objects(&self, schema: &str) -> Result<Vec<SchemaObject>, DbError> {
        let mut objects = Vec::new();

        // Relations, skipping sequences owned by a column and extension members
        let sql = r#"
            SELECT c.relname, c.relkind::text
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN ('r', 'p', 'f', 'v', 'm', 'S')
              AND NOT c.relispartition
              AND NOT EXISTS (
                  SELECT 1 FROM pg_depend d
                  WHERE d.objid = c.oid AND d.deptype IN ('e', 'a', 'i')
              )
        "#;
        let rows = sqlx::query(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))?;
        for row in rows {
            let name: String = row.try_get(0).map_err(|e| map_sqlx_error(e, sql))?;
            let code: String = row.try_get(1).map_err(|e| map_sqlx_error(e, sql))?;
            if let Some(kind) = kind_from_code(&code) {
                objects.push(SchemaObject {
                    kind,
                    id: ObjectRef {
                        schema: Some(schema.to_string()),
                        name,
                    },
                    signature: None,
                    depends_on: Vec::new(),
                });
            }
        }

        // View and foreign-key dependencies of this schema's relations, on
        // relations in any schema
        let sql = r#"
            SELECT DISTINCT dependent.relname, rn.nspname, referenced.relname
            FROM pg_depend d
            JOIN pg_rewrite r ON r.oid = d.objid
            JOIN pg_class dependent ON dependent.oid = r.ev_class
            JOIN pg_namespace dn ON dn.oid = dependent.relnamespace
            JOIN pg_class referenced ON referenced.oid = d.refobjid
            JOIN pg_namespace rn ON rn.oid = referenced.relnamespace
            WHERE dn.nspname = $1 AND dependent.oid <> referenced.oid
            UNION
            SELECT DISTINCT src.relname, dn.nspname, dst.relname
            FROM pg_constraint con
            JOIN pg_class src ON src.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = src.relnamespace
            JOIN pg_class dst ON dst.oid = con.confrelid
            JOIN pg_namespace dn ON dn.oid = dst.relnamespace
            WHERE con.contype = 'f' AND n.nspname = $1 AND src.oid <> dst.oid
        "#;
        let rows = sqlx::query(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))?;
        for row in rows {
            let dependent: String = row.try_get(0).map_err(|e| map_sqlx_error(e, sql))?;
            let referenced_schema: String = row.try_get(1).map_err(|e| map_sqlx_error(e, sql))?;
            let referenced: String = row.try_get(2).map_err(|e| map_sqlx_error(e, sql))?;
            let relation = objects.iter_mut().find(|o| {
                o.signature.is_none()
                    && o.id.schema.as_deref() == Some(schema)
                    && o.id.name == dependent
            });
            if let Some(object) = relation {
                object.depends_on.push(ObjectRef {
                    schema: Some(referenced_schema),
                    name: referenced,
                });
            }
        }

        // Functions and procedures
        let sql = r#"
            SELECT p.proname, pg_get_function_identity_arguments(p.oid)
            FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = $1
              AND p.prokind IN ('f', 'p')
              AND NOT EXISTS (
                  SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e'
              )
        "#;
        let rows = sqlx::query(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))?;
        for row in rows {
            let name: String = row.try_get(0).map_err(|e| map_sqlx_error(e, sql))?;
            let args: String = row.try_get(1).map_err(|e| map_sqlx_error(e, sql))?;
            objects.push(SchemaObject {
                kind: ObjectKind::Routine,
                id: ObjectRef {
                    schema: Some(schema.to_string()),
                    name,
                },
                signature: Some(args),
                depends_on: Vec::new(),
            });
        }

        // Domains, enums, composite and range types
        let sql = r#"
            SELECT t.typname, t.typtype::text
            FROM pg_type t
            JOIN pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1
              AND t.typtype IN ('d', 'e', 'r', 'c')
              AND (t.typtype <> 'c' OR EXISTS (
                  SELECT 1 FROM pg_class c WHERE c.oid = t.typrelid AND c.relkind = 'c'
              ))
              AND NOT EXISTS (
                  SELECT 1 FROM pg_depend d WHERE d.objid = t.oid AND d.deptype = 'e'
              )
        "#;
        let rows = sqlx::query(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))?;
        for row in rows {
            let name: String = row.try_get(0).map_err(|e| map_sqlx_error(e, sql))?;
            let code: String = row.try_get(1).map_err(|e| map_sqlx_error(e, sql))?;
            objects.push(SchemaObject {
                kind: if code == "d" {
                    ObjectKind::Domain
                } else {
                    ObjectKind::Type
                },
                id: ObjectRef {
                    schema: Some(schema.to_string()),
                    name,
                },
                signature: None,
                depends_on: Vec::new(),
            });
        }

        Ok(objects)
    }

    async fn list_global_objects(&self, schemas: &[String]) -> Result<Vec<SchemaObject>, DbError> {
        // Event triggers whose function lives in a managed schema
        let sql = r#"
            SELECT e.evtname
            FROM pg_event_trigger e
            JOIN pg_proc p ON p.oid = e.evtfoid
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = ANY($1)
        "#;
        let names: Vec<String> = sqlx::query_scalar(sql)
            .bind(schemas)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, sql))?;
        Ok(names
            .into_iter()
            .map(|name| SchemaObject {
                kind: ObjectKind::EventTrigger,
                id: ObjectRef { schema: None, name },
                signature: None,
                depends_on: Vec::new(),
            })
            .collect())
    }

    fn drop_object_sql(&self, object: &SchemaObject) -> String {
        let name = match &object.id.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&object.id.name)),
            None => quote_ident(&object.id.name),
        };
        match object.kind {
            ObjectKind::EventTrigger => format!("DROP EVENT TRIGGER IF EXISTS {}", name),
            ObjectKind::View => format!("DROP VIEW IF EXISTS {} CASCADE", name),
            ObjectKind::MaterializedView => {
                format!("DROP MATERIALIZED VIEW IF EXISTS {} CASCADE", name)
            }
            ObjectKind::Table => format!("DROP TABLE IF EXISTS {} CASCADE", name),
            ObjectKind::Sequence => format!("DROP SEQUENCE IF EXISTS {} CASCADE", name),
            ObjectKind::Routine => format!(
                "DROP ROUTINE IF EXISTS {}({}) CASCADE",
                name,
                object.signature.as_deref().unwrap_or("")
            ),
            ObjectKind::Domain => format!("DROP DOMAIN IF EXISTS {} CASCADE", name),
            ObjectKind::Type => format!("DROP TYPE IF EXISTS {} CASCADE", name),
        }
    }
}
