use crate::helpers::harness::{engine, test_config};
use anyhow::Result;
use keel::KeelError;
use keel::db::memory::MemoryDatabase;
use keel::engine::{MigrationInfo, MigrationState, ValidationIssue};
use keel::output::{OutputFormat, render_info};

fn state_of(infos: &[MigrationInfo], script: &str) -> Vec<MigrationState> {
    infos
        .iter()
        .filter(|i| i.script() == script)
        .map(|i| i.state)
        .collect()
}

#[tokio::test]
async fn test_info_before_anything_is_applied() -> Result<()> {
    let db = MemoryDatabase::new();
    let engine = engine(
        &db,
        test_config(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("R__refresh.sql", "SELECT 1;"),
        ],
    );

    let info = engine.info().await?;

    assert!(!info.history_exists);
    assert_eq!(info.current_version, None);
    assert_eq!(info.pending_count(), 2);
    // info never creates the history table
    assert!(!db.has_object("public", "keel_schema_history"));
    Ok(())
}

#[tokio::test]
async fn test_info_reports_every_state() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("V2__orders.sql", "CREATE TABLE orders (id INT);"),
            ("R__refresh.sql", "SELECT 1;"),
        ],
    )
    .migrate()
    .await?;

    let engine = engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("R__refresh.sql", "SELECT 2;"),
            ("V3__audit.sql", "CREATE TABLE audit (id INT);"),
        ],
    );
    let info = engine.info().await?;

    assert!(info.history_exists);
    assert_eq!(info.current_version.as_ref().map(|v| v.to_string()).as_deref(), Some("2"));
    assert_eq!(state_of(&info.migrations, "V1__users.sql"), vec![MigrationState::Success]);
    assert_eq!(
        state_of(&info.migrations, "V2__orders.sql"),
        vec![MigrationState::MissingSuccess]
    );
    assert_eq!(
        state_of(&info.migrations, "R__refresh.sql"),
        vec![MigrationState::Outdated, MigrationState::Pending]
    );
    assert_eq!(state_of(&info.migrations, "V3__audit.sql"), vec![MigrationState::Pending]);

    let table = render_info(&info, OutputFormat::Human)?;
    assert!(table.contains("Schema version: 2"));
    assert!(table.contains("Outdated"));

    let json: serde_json::Value = serde_json::from_str(&render_info(&info, OutputFormat::Json)?)?;
    assert_eq!(json["pending"], 2);
    assert_eq!(json["migrations"][0]["state"], "success");
    Ok(())
}

#[tokio::test]
async fn test_validate_collects_every_problem() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("V2__orders.sql", "CREATE TABLE orders (id INT);"),
        ],
    )
    .migrate()
    .await?;

    let mut strict = config.clone();
    strict.behavior.ignore_pending = false;
    let err = engine(
        &db,
        strict,
        &[
            ("V1__users.sql", "CREATE TABLE users (id BIGINT);"),
            ("V3__audit.sql", "CREATE TABLE audit (id INT);"),
        ],
    )
    .validate()
    .await
    .unwrap_err();

    let report = match err {
        KeelError::Validation(report) => report,
        other => panic!("expected a validation error, got {other}"),
    };
    assert_eq!(report.issues.len(), 3);
    assert!(matches!(report.issues[0], ValidationIssue::ChecksumMismatch { .. }));
    assert!(matches!(report.issues[1], ValidationIssue::Missing { .. }));
    assert!(matches!(report.issues[2], ValidationIssue::Pending { .. }));
    Ok(())
}

#[tokio::test]
async fn test_validate_reports_unparseable_pending_script() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let scripts = [
        ("V1__users.sql", "CREATE TABLE users (id INT);"),
        ("V2__notes.sql", "INSERT INTO users VALUES (1);\nSELECT 'unterminated;"),
    ];

    let err = engine(&db, config.clone(), &scripts)
        .validate()
        .await
        .unwrap_err();

    let report = match err {
        KeelError::Validation(report) => report,
        other => panic!("expected a validation error, got {other}"),
    };
    assert_eq!(report.issues.len(), 1);
    match &report.issues[0] {
        ValidationIssue::Unparseable { script, line, .. } => {
            assert_eq!(script, "V2__notes.sql");
            assert_eq!(*line, 2);
        }
        other => panic!("expected an unparseable script, got {other}"),
    }

    // nothing ran, so migrate refuses before touching the schema
    assert!(matches!(
        engine(&db, config, &scripts).migrate().await,
        Err(KeelError::Parse { .. })
    ));
    assert!(!db.has_object("public", "users"));
    Ok(())
}

#[tokio::test]
async fn test_ignore_missing_accepts_deleted_scripts() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id INT);"),
            ("V2__orders.sql", "CREATE TABLE orders (id INT);"),
        ],
    )
    .migrate()
    .await?;

    let mut lenient = config.clone();
    lenient.behavior.ignore_missing = true;
    let report = engine(
        &db,
        lenient,
        &[("V1__users.sql", "CREATE TABLE users (id INT);")],
    )
    .validate()
    .await?;

    assert!(report.is_valid());
    assert_eq!(report.validated, 1);
    Ok(())
}
