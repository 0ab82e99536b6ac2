//! In-memory database used by tests.
//!
//! Understands enough DDL to track schemas, tables, views and routines with
//! their dependencies. Handles created with [`MemoryDatabase::session`] share
//! state but hold their own advisory locks, like separate connections.

use crate::constants::{DEFAULT_SCHEMA, LOCK_ROW_DESCRIPTION, LOCK_ROW_RANK};
use crate::db::{
    Database, DbError, DbTransaction, LockPrimitive, ObjectKind, ObjectRef, SchemaObject,
};
use crate::history::{HistoryRow, NewHistoryRow, TableRef};
use crate::parser::dialect::POSTGRESQL;
use crate::parser::{Dialect, TokenKind, tokenize};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemObject {
    kind: ObjectKind,
    depends_on: Vec<ObjectRef>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    schemas: BTreeSet<String>,
    objects: BTreeMap<ObjectRef, MemObject>,
    history: HashMap<TableRef, Vec<HistoryRow>>,
}

#[derive(Debug)]
struct State {
    data: Snapshot,
    advisory: HashMap<i64, (u64, u32)>,
    executed: Vec<String>,
    next_session: u64,
    ddl_transactions: bool,
    row_locking: bool,
    fail_when: Vec<String>,
    user: String,
}

#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    session: u64,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// An empty database with a `public` schema, DDL transactions and advisory locks.
    pub fn new() -> Self {
        let mut data = Snapshot::default();
        data.schemas.insert(DEFAULT_SCHEMA.to_string());
        Self {
            state: Arc::new(Mutex::new(State {
                data,
                advisory: HashMap::new(),
                executed: Vec::new(),
                next_session: 1,
                ddl_transactions: true,
                row_locking: false,
                fail_when: Vec::new(),
                user: "keel".to_string(),
            })),
            session: 0,
        }
    }

    /// Behave like a database whose DDL commits implicitly.
    pub fn without_ddl_transactions(self) -> Self {
        self.state().ddl_transactions = false;
        self
    }

    /// Report no advisory lock, forcing the lock-row strategy.
    pub fn with_row_locking(self) -> Self {
        self.state().row_locking = true;
        self
    }

    /// Fail every statement containing `needle` (case-insensitive).
    pub fn fail_when(&self, needle: &str) {
        self.state().fail_when.push(needle.to_ascii_uppercase());
    }

    pub fn clear_failures(&self) {
        self.state().fail_when.clear();
    }

    /// Another connection to the same database.
    pub fn session(&self) -> Self {
        let mut state = self.state();
        let session = state.next_session;
        state.next_session += 1;
        Self {
            state: self.state.clone(),
            session,
        }
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.state().data.schemas.contains(&schema.to_lowercase())
    }

    pub fn has_object(&self, schema: &str, name: &str) -> bool {
        self.state().data.objects.contains_key(&key(Some(schema), name))
    }

    pub fn object_names(&self, schema: &str) -> Vec<String> {
        let schema = schema.to_lowercase();
        self.state()
            .data
            .objects
            .keys()
            .filter(|id| id.schema.as_deref() == Some(schema.as_str()))
            .map(|id| id.name.clone())
            .collect()
    }

    /// Raw history rows, lock rows included.
    pub fn history_rows(&self, table: &TableRef) -> Vec<HistoryRow> {
        self.state()
            .data
            .history
            .get(&normalize(table))
            .cloned()
            .unwrap_or_default()
    }

    /// Plant a lock row that was last refreshed `age` ago.
    pub fn insert_stale_lock(&self, table: &TableRef, token: &str, age: Duration) {
        let installed_on = now() - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        let mut state = self.state();
        let user = state.user.clone();
        if let Some(rows) = state.data.history.get_mut(&normalize(table)) {
            rows.push(lock_row(token, &user, installed_on));
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, sql: &str) -> Result<(), DbError> {
        let mut state = self.state();
        state.executed.push(sql.to_string());
        let upper = sql.to_ascii_uppercase();
        if let Some(needle) = state.fail_when.iter().find(|n| upper.contains(n.as_str())) {
            return Err(DbError::execution(format!(
                "simulated failure (statement contains '{}')",
                needle
            )));
        }
        let words = words(sql)?;
        interpret(&mut state.data, &words)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn key(schema: Option<&str>, name: &str) -> ObjectRef {
    ObjectRef {
        schema: schema.map(str::to_lowercase),
        name: name.to_lowercase(),
    }
}

fn normalize(table: &TableRef) -> TableRef {
    TableRef::new(&table.schema.to_lowercase(), &table.table.to_lowercase())
}

fn lock_row(token: &str, user: &str, installed_on: NaiveDateTime) -> HistoryRow {
    HistoryRow {
        installed_rank: LOCK_ROW_RANK,
        version: None,
        description: LOCK_ROW_DESCRIPTION.to_string(),
        migration_type: "LOCK".to_string(),
        script: token.to_string(),
        checksum: None,
        installed_by: user.to_string(),
        installed_on,
        execution_time: 0,
        success: true,
    }
}

/// Code tokens of a statement with quotes stripped from identifiers.
fn words(sql: &str) -> Result<Vec<String>, DbError> {
    let tokens = tokenize(sql, &POSTGRESQL).map_err(|e| DbError::execution(e.to_string()))?;
    Ok(tokens
        .into_iter()
        .filter(|t| t.is_code() && t.kind != TokenKind::Delimiter)
        .map(|t| match t.kind {
            TokenKind::Identifier => t.text.trim_matches('"').to_string(),
            _ => t.text,
        })
        .collect())
}

struct Cursor<'a> {
    words: &'a [String],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek_is(&self, keyword: &str) -> bool {
        self.words
            .get(self.pos)
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    fn eat(&mut self, keyword: &str) -> bool {
        if self.peek_is(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_all(&mut self, keywords: &[&str]) -> bool {
        let matches = keywords.iter().enumerate().all(|(i, k)| {
            self.words
                .get(self.pos + i)
                .is_some_and(|w| w.eq_ignore_ascii_case(k))
        });
        if matches {
            self.pos += keywords.len();
        }
        matches
    }

    /// `name` or `schema.name`, resolved against the default schema.
    fn name(&mut self) -> Result<ObjectRef, DbError> {
        let first = self
            .words
            .get(self.pos)
            .ok_or_else(|| DbError::execution("syntax error: expected a name"))?
            .clone();
        self.pos += 1;
        if self.words.get(self.pos).is_some_and(|w| w == ".")
            && let Some(second) = self.words.get(self.pos + 1)
        {
            let second = second.clone();
            self.pos += 2;
            return Ok(key(Some(&first), &second));
        }
        Ok(key(Some(DEFAULT_SCHEMA), &first))
    }

    fn rest_contains(&self, keyword: &str) -> bool {
        self.words[self.pos..]
            .iter()
            .any(|w| w.eq_ignore_ascii_case(keyword))
    }

    /// Names following any of `keywords` in the remaining words.
    fn names_after(&mut self, keywords: &[&str]) -> Vec<ObjectRef> {
        let mut found = Vec::new();
        while self.pos < self.words.len() {
            let is_marker = keywords
                .iter()
                .any(|k| self.words[self.pos].eq_ignore_ascii_case(k));
            self.pos += 1;
            if is_marker
                && self.words.get(self.pos).is_some_and(|w| w != "(")
                && let Ok(name) = self.name()
            {
                found.push(name);
            }
        }
        found
    }
}

fn interpret(data: &mut Snapshot, words: &[String]) -> Result<(), DbError> {
    let mut c = Cursor { words, pos: 0 };

    if c.eat("CREATE") {
        c.eat_all(&["OR", "REPLACE"]);
        let or_replace = c.pos > 1;
        if c.eat("SCHEMA") {
            let if_not_exists = c.eat_all(&["IF", "NOT", "EXISTS"]);
            let name = c.name()?.name;
            if !data.schemas.insert(name.clone()) && !if_not_exists {
                return Err(DbError::execution(format!(
                    "schema \"{}\" already exists",
                    name
                )));
            }
            return Ok(());
        }
        if c.eat_all(&["EVENT", "TRIGGER"]) {
            let name = c.name()?.name;
            data.objects.insert(
                key(None, &name),
                MemObject {
                    kind: ObjectKind::EventTrigger,
                    depends_on: Vec::new(),
                },
            );
            return Ok(());
        }
        let kind = if c.eat("TABLE") {
            ObjectKind::Table
        } else if c.eat("VIEW") {
            ObjectKind::View
        } else if c.eat_all(&["MATERIALIZED", "VIEW"]) {
            ObjectKind::MaterializedView
        } else if c.eat("SEQUENCE") {
            ObjectKind::Sequence
        } else if c.eat("FUNCTION") || c.eat("PROCEDURE") {
            ObjectKind::Routine
        } else if c.eat("TYPE") {
            ObjectKind::Type
        } else if c.eat("DOMAIN") {
            ObjectKind::Domain
        } else {
            // indexes, triggers and the like are not tracked
            return Ok(());
        };
        let if_not_exists = c.eat_all(&["IF", "NOT", "EXISTS"]);
        let id = c.name()?;
        ensure_schema(data, &id)?;
        let depends_on = match kind {
            ObjectKind::View | ObjectKind::MaterializedView => c.names_after(&["FROM", "JOIN"]),
            ObjectKind::Table => c.names_after(&["REFERENCES"]),
            _ => Vec::new(),
        };
        for dependency in &depends_on {
            if !data.objects.contains_key(dependency) {
                return Err(DbError::execution(format!(
                    "relation \"{}\" does not exist",
                    dependency
                )));
            }
        }
        if data.objects.contains_key(&id) && !or_replace {
            if if_not_exists {
                return Ok(());
            }
            return Err(DbError::execution(format!(
                "relation \"{}\" already exists",
                id
            )));
        }
        data.objects.insert(id, MemObject { kind, depends_on });
        return Ok(());
    }

    if c.eat("DROP") {
        if c.eat("SCHEMA") {
            let if_exists = c.eat_all(&["IF", "EXISTS"]);
            let name = c.name()?.name;
            let cascade = c.rest_contains("CASCADE");
            return drop_schema(data, &name, if_exists, cascade);
        }
        let global = c.eat_all(&["EVENT", "TRIGGER"]);
        let known = global
            || c.eat("TABLE")
            || c.eat("VIEW")
            || c.eat_all(&["MATERIALIZED", "VIEW"])
            || c.eat("SEQUENCE")
            || c.eat("FUNCTION")
            || c.eat("PROCEDURE")
            || c.eat("ROUTINE")
            || c.eat("TYPE")
            || c.eat("DOMAIN");
        if !known {
            return Ok(());
        }
        let if_exists = c.eat_all(&["IF", "EXISTS"]);
        let id = if global {
            key(None, &c.name()?.name)
        } else {
            c.name()?
        };
        let cascade = c.rest_contains("CASCADE");
        return drop_object(data, &id, if_exists, cascade);
    }

    if c.eat_all(&["INSERT", "INTO"]) {
        let id = c.name()?;
        if !data.objects.contains_key(&id) {
            return Err(DbError::execution(format!(
                "relation \"{}\" does not exist",
                id
            )));
        }
        return Ok(());
    }

    Ok(())
}

fn ensure_schema(data: &Snapshot, id: &ObjectRef) -> Result<(), DbError> {
    match &id.schema {
        Some(schema) if !data.schemas.contains(schema) => Err(DbError::execution(format!(
            "schema \"{}\" does not exist",
            schema
        ))),
        _ => Ok(()),
    }
}

fn dependents(data: &Snapshot, id: &ObjectRef) -> Vec<ObjectRef> {
    data.objects
        .iter()
        .filter(|(_, obj)| obj.depends_on.contains(id))
        .map(|(other, _)| other.clone())
        .collect()
}

fn remove_object(data: &mut Snapshot, id: &ObjectRef) {
    data.objects.remove(id);
    if let Some(schema) = &id.schema {
        data.history.remove(&TableRef::new(schema, &id.name));
    }
}

fn drop_object(
    data: &mut Snapshot,
    id: &ObjectRef,
    if_exists: bool,
    cascade: bool,
) -> Result<(), DbError> {
    if !data.objects.contains_key(id) {
        if if_exists {
            return Ok(());
        }
        return Err(DbError::execution(format!("\"{}\" does not exist", id)));
    }
    let dependents = dependents(data, id);
    if !dependents.is_empty() {
        if !cascade {
            return Err(DbError::Execution {
                message: format!(
                    "cannot drop \"{}\" because other objects depend on it",
                    id
                ),
                line: None,
                detail: Some(format!(
                    "{} depends on {}",
                    dependents.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                    id
                )),
                hint: Some("Use DROP ... CASCADE to drop the dependent objects too.".to_string()),
            });
        }
        for dependent in dependents {
            drop_object(data, &dependent, true, true)?;
        }
    }
    remove_object(data, id);
    Ok(())
}

fn drop_schema(
    data: &mut Snapshot,
    schema: &str,
    if_exists: bool,
    cascade: bool,
) -> Result<(), DbError> {
    if !data.schemas.contains(schema) {
        if if_exists {
            return Ok(());
        }
        return Err(DbError::execution(format!(
            "schema \"{}\" does not exist",
            schema
        )));
    }
    let contained: Vec<ObjectRef> = data
        .objects
        .keys()
        .filter(|id| id.schema.as_deref() == Some(schema))
        .cloned()
        .collect();
    if !contained.is_empty() && !cascade {
        return Err(DbError::execution(format!(
            "cannot drop schema \"{}\" because other objects depend on it",
            schema
        )));
    }
    for id in contained {
        remove_object(data, &id);
    }
    data.schemas.remove(schema);
    Ok(())
}

pub struct MemoryTransaction {
    db: MemoryDatabase,
    snapshot: Option<Snapshot>,
}

#[async_trait]
impl DbTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.db.run(sql)
    }

    async fn insert_history_row(
        &mut self,
        table: &TableRef,
        row: &NewHistoryRow,
    ) -> Result<(), DbError> {
        self.db.insert_row(table, row)
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        let MemoryTransaction { db, snapshot } = *self;
        let Some(mut snapshot) = snapshot else {
            return Ok(());
        };
        let mut state = db.state();
        // lock rows are not part of the transaction
        for (table, rows) in snapshot.history.iter_mut() {
            rows.retain(|r| r.installed_rank >= 0);
            if let Some(current) = state.data.history.get(table) {
                rows.extend(current.iter().filter(|r| r.installed_rank < 0).cloned());
            }
        }
        state.data = snapshot;
        Ok(())
    }
}

impl MemoryDatabase {
    fn insert_row(&self, table: &TableRef, row: &NewHistoryRow) -> Result<(), DbError> {
        let mut state = self.state();
        let rows = state
            .data
            .history
            .get_mut(&normalize(table))
            .ok_or_else(|| DbError::execution(format!("relation \"{}\" does not exist", table)))?;
        if rows.iter().any(|r| r.installed_rank == row.installed_rank) {
            return Err(DbError::UniqueViolation(format!(
                "duplicate key value violates unique constraint \"{}_pk\"",
                table.table
            )));
        }
        rows.push(HistoryRow {
            installed_rank: row.installed_rank,
            version: row.version.clone(),
            description: row.description.clone(),
            migration_type: row.migration_type.clone(),
            script: row.script.clone(),
            checksum: row.checksum,
            installed_by: row.installed_by.clone(),
            installed_on: now(),
            execution_time: row.execution_time,
            success: row.success,
        });
        Ok(())
    }

    fn with_rows<T>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&mut Vec<HistoryRow>) -> T,
    ) -> Result<T, DbError> {
        let mut state = self.state();
        let rows = state
            .data
            .history
            .get_mut(&normalize(table))
            .ok_or_else(|| DbError::execution(format!("relation \"{}\" does not exist", table)))?;
        Ok(f(rows))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        "memory"
    }

    fn dialect(&self) -> &'static Dialect {
        &POSTGRESQL
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn supports_ddl_transactions(&self) -> bool {
        self.state().ddl_transactions
    }

    async fn current_user(&self) -> Result<String, DbError> {
        Ok(self.state().user.clone())
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool, DbError> {
        tokio::task::yield_now().await;
        Ok(self.has_schema(schema))
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, DbError> {
        tokio::task::yield_now().await;
        Ok(self
            .state()
            .data
            .objects
            .get(&key(Some(&table.schema), &table.table))
            .is_some_and(|o| o.kind == ObjectKind::Table))
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.run(sql)
    }

    async fn begin(&self) -> Result<Box<dyn DbTransaction>, DbError> {
        tokio::task::yield_now().await;
        let snapshot = {
            let state = self.state();
            state.ddl_transactions.then(|| state.data.clone())
        };
        Ok(Box::new(MemoryTransaction {
            db: self.clone(),
            snapshot,
        }))
    }

    async fn create_history_table(
        &self,
        table: &TableRef,
        baseline: Option<&NewHistoryRow>,
    ) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        {
            let mut state = self.state();
            let table = normalize(table);
            let id = key(Some(&table.schema), &table.table);
            ensure_schema(&state.data, &id)?;
            if state.data.objects.contains_key(&id) {
                return Ok(());
            }
            state.data.objects.insert(
                id,
                MemObject {
                    kind: ObjectKind::Table,
                    depends_on: Vec::new(),
                },
            );
            state.data.history.insert(table, Vec::new());
        }
        if let Some(row) = baseline {
            self.insert_row(table, row)?;
        }
        Ok(())
    }

    async fn read_history(&self, table: &TableRef) -> Result<Vec<HistoryRow>, DbError> {
        tokio::task::yield_now().await;
        let mut rows = self.with_rows(table, |rows| rows.clone())?;
        rows.sort_by_key(|r| r.installed_rank);
        Ok(rows)
    }

    async fn insert_history_row(
        &self,
        table: &TableRef,
        row: &NewHistoryRow,
    ) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.insert_row(table, row)
    }

    async fn update_history_row(
        &self,
        table: &TableRef,
        rank: i32,
        description: &str,
        migration_type: &str,
        checksum: Option<i32>,
    ) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.with_rows(table, |rows| {
            for row in rows.iter_mut().filter(|r| r.installed_rank == rank) {
                row.description = description.to_string();
                row.migration_type = migration_type.to_string();
                row.checksum = checksum;
            }
        })
    }

    async fn set_history_success(
        &self,
        table: &TableRef,
        rank: i32,
        success: bool,
    ) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.with_rows(table, |rows| {
            for row in rows.iter_mut().filter(|r| r.installed_rank == rank) {
                row.success = success;
            }
        })
    }

    async fn delete_history_row(&self, table: &TableRef, rank: i32) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.with_rows(table, |rows| rows.retain(|r| r.installed_rank != rank))
    }

    fn lock_primitive(&self) -> LockPrimitive {
        if self.state().row_locking {
            LockPrimitive::None
        } else {
            LockPrimitive::Advisory
        }
    }

    async fn try_advisory_lock(&self, key: i64) -> Result<bool, DbError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        match state.advisory.get_mut(&key) {
            Some((owner, count)) if *owner == self.session => {
                *count += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                state.advisory.insert(key, (self.session, 1));
                Ok(true)
            }
        }
    }

    async fn advisory_unlock(&self, key: i64) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if let Some((owner, count)) = state.advisory.get_mut(&key)
            && *owner == self.session
        {
            *count -= 1;
            if *count == 0 {
                state.advisory.remove(&key);
            }
        }
        Ok(())
    }

    async fn insert_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        let user = self.state().user.clone();
        self.with_rows(table, |rows| {
            if rows.iter().any(|r| r.installed_rank == LOCK_ROW_RANK) {
                return Err(DbError::UniqueViolation(format!(
                    "lock row already present in {}",
                    table
                )));
            }
            rows.push(lock_row(token, &user, now()));
            Ok(())
        })?
    }

    async fn refresh_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.with_rows(table, |rows| {
            for row in rows
                .iter_mut()
                .filter(|r| r.installed_rank == LOCK_ROW_RANK && r.script == token)
            {
                row.installed_on = now();
            }
        })
    }

    async fn delete_lock_row(&self, table: &TableRef, token: &str) -> Result<(), DbError> {
        tokio::task::yield_now().await;
        self.with_rows(table, |rows| {
            rows.retain(|r| !(r.installed_rank == LOCK_ROW_RANK && r.script == token))
        })
    }

    async fn delete_expired_lock_rows(
        &self,
        table: &TableRef,
        expiry: Duration,
    ) -> Result<u64, DbError> {
        tokio::task::yield_now().await;
        let cutoff = now() - chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::zero());
        self.with_rows(table, |rows| {
            let before = rows.len();
            rows.retain(|r| !(r.installed_rank == LOCK_ROW_RANK && r.installed_on < cutoff));
            (before - rows.len()) as u64
        })
    }

    async fn list_schema_objects(&self, schema: &str) -> Result<Vec<SchemaObject>, DbError> {
        tokio::task::yield_now().await;
        let schema = schema.to_lowercase();
        Ok(self
            .state()
            .data
            .objects
            .iter()
            .filter(|(id, _)| id.schema.as_deref() == Some(schema.as_str()))
            .map(|(id, obj)| SchemaObject {
                kind: obj.kind,
                id: id.clone(),
                signature: None,
                depends_on: obj.depends_on.clone(),
            })
            .collect())
    }

    async fn list_global_objects(&self, _schemas: &[String]) -> Result<Vec<SchemaObject>, DbError> {
        tokio::task::yield_now().await;
        Ok(self
            .state()
            .data
            .objects
            .iter()
            .filter(|(id, _)| id.schema.is_none())
            .map(|(id, obj)| SchemaObject {
                kind: obj.kind,
                id: id.clone(),
                signature: None,
                depends_on: Vec::new(),
            })
            .collect())
    }

    fn drop_object_sql(&self, object: &SchemaObject) -> String {
        let name = match &object.id.schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(&object.id.name)),
            None => self.quote(&object.id.name),
        };
        let kind = match object.kind {
            ObjectKind::EventTrigger => "EVENT TRIGGER",
            ObjectKind::View => "VIEW",
            ObjectKind::MaterializedView => "MATERIALIZED VIEW",
            ObjectKind::Table => "TABLE",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::Routine => "ROUTINE",
            ObjectKind::Domain => "DOMAIN",
            ObjectKind::Type => "TYPE",
        };
        format!("DROP {} {}", kind, name)
    }
}
