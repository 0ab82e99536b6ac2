use crate::helpers::harness::{engine, history, test_config, versions};
use anyhow::Result;
use keel::KeelError;
use keel::db::memory::MemoryDatabase;
use keel::history::TableRef;
use std::collections::HashSet;
use std::time::Duration;

const SCRIPTS: [(&str, &str); 3] = [
    ("V1__users.sql", "CREATE TABLE users (id INT);"),
    ("V2__orders.sql", "CREATE TABLE orders (id INT, user_id INT REFERENCES users (id));"),
    ("V3__audit.sql", "CREATE TABLE audit (id INT);"),
];

fn assert_applied_once(db: &MemoryDatabase, config: &keel::config::Config) {
    let rows = history(db, config);
    assert_eq!(
        rows.iter().map(|r| r.installed_rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    let unique: HashSet<_> = versions(&rows).into_iter().collect();
    assert_eq!(unique.len(), 3);
    assert!(rows.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_concurrent_migrate_applies_each_migration_once() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let first = engine(&db, config.clone(), &SCRIPTS);
    let second = engine(&db.session(), config.clone(), &SCRIPTS);

    let (a, b) = tokio::join!(first.migrate(), second.migrate());
    let (a, b) = (a?, b?);

    assert_eq!(a.migrations_executed() + b.migrations_executed(), 3);
    assert_applied_once(&db, &config);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_migrate_with_lock_rows() -> Result<()> {
    let db = MemoryDatabase::new().with_row_locking();
    let config = test_config();
    let first = engine(&db, config.clone(), &SCRIPTS);
    let second = engine(&db.session(), config.clone(), &SCRIPTS);

    let (a, b) = tokio::join!(first.migrate(), second.migrate());
    let (a, b) = (a?, b?);

    assert_eq!(a.migrations_executed() + b.migrations_executed(), 3);
    assert_applied_once(&db, &config);
    let table = TableRef::new(&config.history.schema, &config.history.table);
    assert!(db.history_rows(&table).iter().all(|r| r.installed_rank >= 0));
    Ok(())
}

#[tokio::test]
async fn test_lock_timeout_names_the_table() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let holder = engine(&db, config.clone(), &SCRIPTS);
    holder.lock().acquire().await?;

    let mut impatient = config.clone();
    impatient.lock.retry_count = 2;
    let err = engine(&db.session(), impatient, &SCRIPTS)
        .migrate()
        .await
        .unwrap_err();

    match &err {
        KeelError::LockTimeout { table, attempts } => {
            assert_eq!(table, "public.keel_schema_history");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected a lock timeout, got {other}"),
    }
    assert!(history(&db, &config).is_empty());

    holder.lock().release().await?;
    Ok(())
}

#[tokio::test]
async fn test_stale_lock_row_is_taken_over() -> Result<()> {
    let db = MemoryDatabase::new().with_row_locking();
    let config = test_config();
    engine(&db, config.clone(), &SCRIPTS[..1]).migrate().await?;

    let table = TableRef::new(&config.history.schema, &config.history.table);
    db.insert_stale_lock(&table, "crashed-run", Duration::from_secs(20 * 60));

    let result = engine(&db, config.clone(), &SCRIPTS).migrate().await?;

    assert_eq!(result.migrations_executed(), 2);
    assert!(db.history_rows(&table).iter().all(|r| r.installed_rank >= 0));
    Ok(())
}

#[tokio::test]
async fn test_lock_released_after_migrate() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let engine = engine(&db, config, &SCRIPTS);

    engine.migrate().await?;

    let status = engine.lock_status().await;
    assert!(!status.held);
    assert_eq!(status.depth, 0);
    Ok(())
}
