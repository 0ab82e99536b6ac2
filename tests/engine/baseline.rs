use crate::helpers::harness::{engine, history, test_config};
use anyhow::Result;
use keel::KeelError;
use keel::db::Database;
use keel::db::memory::MemoryDatabase;
use keel::engine::MigrationState;
use keel::version::MigrationVersion;

const SCRIPTS: [(&str, &str); 3] = [
    ("V1__legacy.sql", "CREATE TABLE legacy (id INT);"),
    ("V2__legacy_more.sql", "CREATE TABLE legacy_more (id INT);"),
    ("V3__fresh.sql", "CREATE TABLE fresh (id INT);"),
];

async fn existing_database() -> Result<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.execute("CREATE TABLE legacy (id INT)").await?;
    db.execute("CREATE TABLE legacy_more (id INT)").await?;
    Ok(db)
}

#[tokio::test]
async fn test_migrate_refuses_non_empty_schema() -> Result<()> {
    let db = existing_database().await?;
    let config = test_config();

    let err = engine(&db, config.clone(), &SCRIPTS)
        .migrate()
        .await
        .unwrap_err();

    match &err {
        KeelError::NonEmptySchema { schemas } => assert_eq!(schemas, &vec!["public".to_string()]),
        other => panic!("expected a non-empty schema error, got {other}"),
    }
    assert!(!db.has_object("public", "keel_schema_history"));
    Ok(())
}

#[tokio::test]
async fn test_baseline_then_migrate() -> Result<()> {
    let db = existing_database().await?;
    let mut config = test_config();
    config.behavior.baseline_version = MigrationVersion::parse("2")?;

    let result = engine(&db, config.clone(), &SCRIPTS).baseline().await?;
    assert_eq!(result.version, "2");
    assert!(!result.already_baselined);

    let engine = engine(&db, config.clone(), &SCRIPTS);
    let info = engine.info().await?;
    // the baseline row stands in for V2 itself
    let states: Vec<_> = info
        .migrations
        .iter()
        .map(|i| (i.script().to_string(), i.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("<< Baseline >>".to_string(), MigrationState::Baseline),
            ("V1__legacy.sql".to_string(), MigrationState::BelowBaseline),
            ("V3__fresh.sql".to_string(), MigrationState::Pending),
        ]
    );

    let migrated = engine.migrate().await?;
    assert_eq!(migrated.migrations_executed(), 1);
    assert_eq!(migrated.migrations[0].script, "V3__fresh.sql");

    let rows = history(&db, &config);
    assert_eq!(rows[0].migration_type, "BASELINE");
    assert_eq!(rows[0].version.as_deref(), Some("2"));
    assert_eq!(rows[1].version.as_deref(), Some("3"));
    Ok(())
}

#[tokio::test]
async fn test_baseline_is_idempotent_but_not_changeable() -> Result<()> {
    let db = existing_database().await?;
    let config = test_config();

    engine(&db, config.clone(), &SCRIPTS).baseline().await?;
    let again = engine(&db, config.clone(), &SCRIPTS).baseline().await?;
    assert!(again.already_baselined);
    assert_eq!(history(&db, &config).len(), 1);

    let mut other = config.clone();
    other.behavior.baseline_version = MigrationVersion::parse("3")?;
    let err = engine(&db, other, &SCRIPTS).baseline().await.unwrap_err();
    assert!(matches!(err, KeelError::Baseline(_)));
    Ok(())
}

#[tokio::test]
async fn test_baseline_refused_after_migrations() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(&db, config.clone(), &SCRIPTS[..1]).migrate().await?;

    let err = engine(&db, config, &SCRIPTS).baseline().await.unwrap_err();

    assert!(matches!(err, KeelError::Baseline(_)));
    assert!(err.to_string().contains("already contains migrations"));
    Ok(())
}

#[tokio::test]
async fn test_baseline_on_migrate() -> Result<()> {
    let db = existing_database().await?;
    let mut config = test_config();
    config.behavior.baseline_on_migrate = true;
    config.behavior.baseline_version = MigrationVersion::parse("2")?;

    let result = engine(&db, config.clone(), &SCRIPTS).migrate().await?;

    assert_eq!(result.baseline.as_deref(), Some("2"));
    assert_eq!(result.migrations_executed(), 1);
    assert!(db.has_object("public", "fresh"));
    assert_eq!(history(&db, &config).len(), 2);
    Ok(())
}
