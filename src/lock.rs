//! Mutual exclusion between keel processes targeting one database.
//!
//! The lock is named by the history table. It is taken either with the
//! backend's advisory lock or by inserting a sentinel row into the history
//! table, whose primary key turns a concurrent insert into a conflict.

use crate::config::{BackoffStrategy, LockSettings, LockStrategy};
use crate::constants::MAX_BACKOFF_MULTIPLIER;
use crate::db::{Database, DbError, LockPrimitive};
use crate::error::{KeelError, Result};
use crate::history::TableRef;
use crate::resolver::checksum::crc32;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// "KEEL" in the high half keeps keys apart from other advisory lock users
const ADVISORY_NAMESPACE: i64 = 0x4B45_454C;

/// Delay between attempts to take a busy lock.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub interval: Duration,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn from_settings(settings: &LockSettings) -> Self {
        Self {
            retry_count: settings.retry_count,
            interval: settings.retry_interval,
            backoff: settings.backoff,
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::None => self.interval,
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(31);
                let multiplier = 2u32.pow(exponent).min(MAX_BACKOFF_MULTIPLIER);
                self.interval * multiplier
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeldBy {
    Advisory,
    Row,
}

/// Externally observable state of the lock in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub name: String,
    pub held: bool,
    /// Nesting depth of `with_lock` calls
    pub depth: u32,
    pub held_by: Option<HeldBy>,
    /// Token identifying this process's lock row
    pub owner: Option<String>,
}

#[derive(Debug, Clone)]
enum Held {
    Advisory(i64),
    Row(String),
}

#[derive(Debug, Default)]
struct LockState {
    depth: u32,
    held: Option<Held>,
}

struct Inner {
    db: Arc<dyn Database>,
    table: TableRef,
    settings: LockSettings,
    state: Mutex<LockState>,
}

#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<Inner>,
}

impl LockCoordinator {
    pub fn new(db: Arc<dyn Database>, table: TableRef, settings: LockSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                table,
                settings,
                state: Mutex::new(LockState::default()),
            }),
        }
    }

    /// Run `op` while holding the lock. The lock is released whether or not
    /// `op` succeeds; nested calls only adjust the depth.
    pub async fn with_lock<T, Fut>(&self, op: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.acquire().await?;
        let result = op.await;
        let released = self.release().await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!("Failed to release lock after error: {}", release_error);
                Err(e)
            }
        }
    }

    pub async fn acquire(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.depth > 0 {
            state.depth += 1;
            debug!("Re-entered lock on {} (depth {})", self.inner.table, state.depth);
            return Ok(());
        }

        let held = match self.strategy()? {
            HeldBy::Advisory => self.acquire_advisory().await?,
            HeldBy::Row => self.acquire_row().await?,
        };
        state.held = Some(held);
        state.depth = 1;
        Ok(())
    }

    pub async fn release(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        match state.depth {
            0 => return Ok(()),
            1 => {}
            _ => {
                state.depth -= 1;
                return Ok(());
            }
        }
        state.depth = 0;
        let db = &self.inner.db;
        match state.held.take() {
            Some(Held::Advisory(key)) => db.advisory_unlock(key).await?,
            // clean may have dropped the table together with the lock row
            Some(Held::Row(token)) => {
                if db.table_exists(&self.inner.table).await? {
                    db.delete_lock_row(&self.inner.table, &token).await?;
                }
            }
            None => {}
        }
        debug!("Released lock on {}", self.inner.table);
        Ok(())
    }

    /// Keep a held lock row from expiring.
    pub async fn refresh(&self) -> Result<()> {
        let state = self.inner.state.lock().await;
        if let Some(Held::Row(token)) = &state.held {
            self.inner
                .db
                .refresh_lock_row(&self.inner.table, token)
                .await?;
        }
        Ok(())
    }

    pub async fn status(&self) -> LockStatus {
        let state = self.inner.state.lock().await;
        LockStatus {
            name: self.inner.table.to_string(),
            held: state.held.is_some(),
            depth: state.depth,
            held_by: state.held.as_ref().map(|h| match h {
                Held::Advisory(_) => HeldBy::Advisory,
                Held::Row(_) => HeldBy::Row,
            }),
            owner: match &state.held {
                Some(Held::Row(token)) => Some(token.clone()),
                _ => None,
            },
        }
    }

    fn strategy(&self) -> Result<HeldBy> {
        let primitive = self.inner.db.lock_primitive();
        match (self.inner.settings.strategy, primitive) {
            (LockStrategy::Row, _) | (LockStrategy::Auto, LockPrimitive::None) => Ok(HeldBy::Row),
            (_, LockPrimitive::Advisory) => Ok(HeldBy::Advisory),
            (LockStrategy::Advisory, LockPrimitive::None) => {
                Err(KeelError::Database(DbError::Unsupported {
                    backend: self.inner.db.name().to_string(),
                    operation: "advisory locking".to_string(),
                }))
            }
        }
    }

    async fn acquire_advisory(&self) -> Result<Held> {
        let key = advisory_key(&self.inner.table);
        let policy = RetryPolicy::from_settings(&self.inner.settings);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.inner.db.try_advisory_lock(key).await? {
                debug!("Acquired advisory lock {} on {}", key, self.inner.table);
                return Ok(Held::Advisory(key));
            }
            self.wait_or_give_up(&policy, attempt).await?;
        }
    }

    async fn acquire_row(&self) -> Result<Held> {
        let token = uuid::Uuid::new_v4().to_string();
        let policy = RetryPolicy::from_settings(&self.inner.settings);
        let db = &self.inner.db;
        let table = &self.inner.table;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let expired = db
                .delete_expired_lock_rows(table, self.inner.settings.expiry)
                .await?;
            if expired > 0 {
                warn!("Removed {} expired lock row(s) from {}", expired, table);
            }
            match db.insert_lock_row(table, &token).await {
                Ok(()) => {
                    debug!("Acquired lock row {} on {}", token, table);
                    return Ok(Held::Row(token));
                }
                Err(DbError::UniqueViolation(_)) => {
                    self.wait_or_give_up(&policy, attempt).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn wait_or_give_up(&self, policy: &RetryPolicy, attempt: u32) -> Result<()> {
        if attempt > policy.retry_count {
            return Err(KeelError::LockTimeout {
                table: self.inner.table.to_string(),
                attempts: attempt,
            });
        }
        if attempt == 1 {
            info!(
                "Waiting for lock on {}; another migration may be running",
                self.inner.table
            );
        }
        tokio::time::sleep(policy.delay(attempt)).await;
        Ok(())
    }
}

/// Advisory lock key derived from the history table identity.
pub fn advisory_key(table: &TableRef) -> i64 {
    let name = format!("{}.{}", table.schema, table.table);
    (ADVISORY_NAMESPACE << 32) | crc32(name.as_bytes()) as i64
}
