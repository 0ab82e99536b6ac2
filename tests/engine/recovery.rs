use crate::helpers::harness::{engine, history, test_config};
use anyhow::Result;
use keel::KeelError;
use keel::db::memory::MemoryDatabase;
use keel::engine::EngineState;

const FAILING: &str = "CREATE TABLE IF NOT EXISTS accounts (id INT);\nCREATE TABLE boom (id INT);";

#[tokio::test]
async fn test_failed_migration_rolls_back_with_ddl_transactions() -> Result<()> {
    let db = MemoryDatabase::new();
    db.fail_when("boom");
    let config = test_config();
    let engine = engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("V2__accounts.sql", FAILING),
        ],
    );

    let err = engine.migrate().await.unwrap_err();

    match &err {
        KeelError::SqlExecution {
            script,
            line,
            rolled_back,
            ..
        } => {
            assert_eq!(script, "V2__accounts.sql");
            assert_eq!(*line, 2);
            assert!(*rolled_back);
        }
        other => panic!("expected a SQL error, got {other}"),
    }
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(db.has_object("public", "users"));
    assert!(!db.has_object("public", "accounts"));

    let rows = history(&db, &config);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].success);
    Ok(())
}

#[tokio::test]
async fn test_failed_rollback_can_be_recorded() -> Result<()> {
    let db = MemoryDatabase::new();
    db.fail_when("boom");
    let mut config = test_config();
    config.behavior.record_failed_on_rollback = true;

    engine(&db, config.clone(), &[("V1__accounts.sql", FAILING)])
        .migrate()
        .await
        .unwrap_err();

    let rows = history(&db, &config);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    Ok(())
}

#[tokio::test]
async fn test_failure_without_ddl_transactions_needs_repair() -> Result<()> {
    let db = MemoryDatabase::new().without_ddl_transactions();
    db.fail_when("boom");
    let config = test_config();
    let scripts = [
        ("V1__users.sql", "CREATE TABLE users (id INT);"),
        ("V2__accounts.sql", FAILING),
    ];

    let err = engine(&db, config.clone(), &scripts)
        .migrate()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeelError::SqlExecution {
            rolled_back: false,
            ..
        }
    ));
    // the first statement committed on its own
    assert!(db.has_object("public", "accounts"));
    let rows = history(&db, &config);
    assert_eq!(rows.len(), 2);
    assert!(!rows[1].success);

    db.clear_failures();
    let err = engine(&db, config.clone(), &scripts)
        .migrate()
        .await
        .unwrap_err();
    match &err {
        KeelError::FailedMigrationPresent { version, script } => {
            assert_eq!(version, "2");
            assert_eq!(script, "V2__accounts.sql");
        }
        other => panic!("expected a failed migration error, got {other}"),
    }

    let repaired = engine(&db, config.clone(), &scripts).repair().await?;
    assert_eq!(repaired.removed.len(), 1);
    assert_eq!(repaired.removed[0].script, "V2__accounts.sql");
    assert_eq!(history(&db, &config).len(), 1);

    let result = engine(&db, config.clone(), &scripts).migrate().await?;
    assert_eq!(result.migrations_executed(), 1);
    let rows = history(&db, &config);
    assert_eq!(
        rows.iter().map(|r| r.installed_rank).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(rows.iter().all(|r| r.success));
    assert!(db.has_object("public", "boom"));
    Ok(())
}

#[tokio::test]
async fn test_repair_realigns_checksums() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(
        &db,
        config.clone(),
        &[("V1__users.sql", "CREATE TABLE users (id INT);")],
    )
    .migrate()
    .await?;

    let edited = [("V1__users.sql", "-- reformatted\nCREATE TABLE users (id INT);")];
    assert!(matches!(
        engine(&db, config.clone(), &edited).validate().await,
        Err(KeelError::Validation(_))
    ));

    let repaired = engine(&db, config.clone(), &edited).repair().await?;
    assert_eq!(repaired.realigned.len(), 1);
    assert!(repaired.removed.is_empty());

    let report = engine(&db, config.clone(), &edited).validate().await?;
    assert!(report.is_valid());
    // nothing is re-executed
    assert_eq!(history(&db, &config).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_repair_without_history_only_warns() -> Result<()> {
    let db = MemoryDatabase::new();
    let result = engine(&db, test_config(), &[]).repair().await?;
    assert!(!result.changed());
    assert_eq!(result.warnings.len(), 1);
    Ok(())
}
