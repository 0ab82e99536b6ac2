use crate::helpers::harness::{engine, engine_with, history, registry, test_config, versions};
use anyhow::Result;
use async_trait::async_trait;
use keel::KeelError;
use keel::db::Database;
use keel::db::memory::MemoryDatabase;
use keel::engine::EngineState;
use keel::resolver::CodeMigration;
use keel::version::MigrationVersion;

const USERS: &str = "CREATE TABLE users (id INT PRIMARY KEY, name TEXT);";
const ORDERS: &str = "CREATE TABLE orders (id INT, user_id INT REFERENCES users (id));";

#[tokio::test]
async fn test_migrate_empty_database() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let engine = engine(
        &db,
        config.clone(),
        &[("V1__users.sql", USERS), ("V2__orders.sql", ORDERS)],
    );

    let result = engine.migrate().await?;

    assert_eq!(result.migrations_executed(), 2);
    assert_eq!(result.initial_version, None);
    assert_eq!(result.target_version.as_deref(), Some("2"));
    assert!(db.has_object("public", "users"));
    assert!(db.has_object("public", "orders"));
    assert_eq!(engine.state(), EngineState::Done);

    let rows = history(&db, &config);
    assert_eq!(
        rows.iter().map(|r| r.installed_rank).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(rows.iter().all(|r| r.success && r.migration_type == "SQL"));
    assert_eq!(rows[0].installed_by, "keel");
    assert_eq!(rows[0].description, "users");
    Ok(())
}

#[tokio::test]
async fn test_second_migrate_is_a_no_op() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let scripts = [("V1__users.sql", USERS)];

    engine(&db, config.clone(), &scripts).migrate().await?;
    let result = engine(&db, config.clone(), &scripts).migrate().await?;

    assert_eq!(result.migrations_executed(), 0);
    assert_eq!(result.initial_version.as_deref(), Some("1"));
    assert_eq!(result.target_version.as_deref(), Some("1"));
    assert_eq!(history(&db, &config).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_only_new_migrations_run() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();

    engine(&db, config.clone(), &[("V1__users.sql", USERS)])
        .migrate()
        .await?;
    let result = engine(
        &db,
        config.clone(),
        &[("V1__users.sql", USERS), ("V2__orders.sql", ORDERS)],
    )
    .migrate()
    .await?;

    assert_eq!(result.migrations_executed(), 1);
    assert_eq!(result.migrations[0].script, "V2__orders.sql");
    assert_eq!(
        versions(&history(&db, &config)),
        vec![Some("1".to_string()), Some("2".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_versions_run_in_numeric_order() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let engine = engine(
        &db,
        config.clone(),
        &[
            ("V10__ten.sql", "CREATE TABLE ten (id INT);"),
            ("V2__two.sql", "CREATE TABLE two (id INT);"),
            ("V1.1__one_one.sql", "CREATE TABLE one_one (id INT);"),
        ],
    );

    engine.migrate().await?;

    assert_eq!(
        versions(&history(&db, &config)),
        vec![
            Some("1.1".to_string()),
            Some("2".to_string()),
            Some("10".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_target_stops_early() -> Result<()> {
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config.behavior.target = MigrationVersion::parse("2")?;
    let scripts = [
        ("V1__a.sql", "CREATE TABLE a (id INT);"),
        ("V2__b.sql", "CREATE TABLE b (id INT);"),
        ("V3__c.sql", "CREATE TABLE c (id INT);"),
    ];

    let result = engine(&db, config.clone(), &scripts).migrate().await?;

    assert_eq!(result.migrations_executed(), 2);
    assert!(!db.has_object("public", "c"));
    Ok(())
}

#[tokio::test]
async fn test_repeatables_run_after_versioned_and_rerun_on_change() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let view = "CREATE OR REPLACE VIEW user_names AS SELECT name FROM users;";

    let first = engine(
        &db,
        config.clone(),
        &[("R__user_names.sql", view), ("V1__users.sql", USERS)],
    )
    .migrate()
    .await?;
    assert_eq!(
        first
            .migrations
            .iter()
            .map(|m| m.script.as_str())
            .collect::<Vec<_>>(),
        vec!["V1__users.sql", "R__user_names.sql"]
    );

    // unchanged: nothing to do
    let again = engine(
        &db,
        config.clone(),
        &[("R__user_names.sql", view), ("V1__users.sql", USERS)],
    )
    .migrate()
    .await?;
    assert_eq!(again.migrations_executed(), 0);

    let changed = "CREATE OR REPLACE VIEW user_names AS SELECT id, name FROM users;";
    let rerun = engine(
        &db,
        config.clone(),
        &[("R__user_names.sql", changed), ("V1__users.sql", USERS)],
    )
    .migrate()
    .await?;
    assert_eq!(rerun.migrations_executed(), 1);

    let rows = history(&db, &config);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].version, None);
    assert_ne!(rows[1].checksum, rows[2].checksum);
    Ok(())
}

#[tokio::test]
async fn test_placeholders_are_replaced() -> Result<()> {
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config
        .placeholders
        .values
        .insert("table_name".to_string(), "widgets".to_string());

    engine(
        &db,
        config.clone(),
        &[(
            "V1__widgets.sql",
            "CREATE TABLE ${table_name} (id INT);\nCREATE TABLE ${keel:defaultSchema}.gadgets (id INT);",
        )],
    )
    .migrate()
    .await?;

    assert!(db.has_object("public", "widgets"));
    assert!(db.has_object("public", "gadgets"));
    Ok(())
}

#[tokio::test]
async fn test_missing_placeholder_fails_before_anything_runs() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();

    let err = engine(
        &db,
        config.clone(),
        &[
            ("V1__a.sql", "CREATE TABLE a (id INT);"),
            ("V2__b.sql", "CREATE TABLE ${missing} (id INT);"),
        ],
    )
    .migrate()
    .await
    .unwrap_err();

    assert!(matches!(err, KeelError::Placeholder { .. }));
    assert!(err.to_string().contains("V2__b.sql"));
    assert!(!db.has_object("public", "a"));
    assert!(history(&db, &config).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_mixed_statements_need_mixed_mode() -> Result<()> {
    let script = "CREATE TABLE t (id INT);\nCREATE INDEX CONCURRENTLY t_idx ON t (id);";

    let db = MemoryDatabase::new();
    let config = test_config();
    let err = engine(&db, config.clone(), &[("V1__t.sql", script)])
        .migrate()
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::MixedTransactional { .. }));
    assert!(!db.has_object("public", "t"));

    let mut mixed = config.clone();
    mixed.behavior.mixed = true;
    let result = engine(&db, mixed, &[("V1__t.sql", script)]).migrate().await?;
    assert_eq!(result.migrations_executed(), 1);
    assert!(db.has_object("public", "t"));
    Ok(())
}

#[tokio::test]
async fn test_creates_missing_schemas_and_records_them() -> Result<()> {
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config.schemas.names = vec!["app".to_string()];
    config.history.schema = "app".to_string();

    let result = engine(
        &db,
        config.clone(),
        &[("V1__items.sql", "CREATE TABLE app.items (id INT);")],
    )
    .migrate()
    .await?;

    assert_eq!(result.schemas_created, vec!["app".to_string()]);
    assert!(db.has_schema("app"));
    let rows = history(&db, &config);
    assert_eq!(rows[0].migration_type, "SCHEMA");
    assert_eq!(rows[0].script, "app");
    assert_eq!(rows[1].version.as_deref(), Some("1"));
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_migration_needs_opt_in() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let a = ("V1__a.sql", "CREATE TABLE a (id INT);");
    let b = ("V2__b.sql", "CREATE TABLE b (id INT);");
    let c = ("V3__c.sql", "CREATE TABLE c (id INT);");

    engine(&db, config.clone(), &[a, c]).migrate().await?;

    let err = engine(&db, config.clone(), &[a, b, c])
        .migrate()
        .await
        .unwrap_err();
    assert!(matches!(err, KeelError::Validation(_)));
    assert!(!db.has_object("public", "b"));

    let mut out_of_order = config.clone();
    out_of_order.behavior.out_of_order = true;
    let result = engine(&db, out_of_order, &[a, b, c]).migrate().await?;
    assert_eq!(result.migrations_executed(), 1);
    assert!(db.has_object("public", "b"));
    assert_eq!(
        versions(&history(&db, &config)),
        vec![
            Some("1".to_string()),
            Some("3".to_string()),
            Some("2".to_string())
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_checksum_change_blocks_migrate() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(&db, config.clone(), &[("V1__users.sql", USERS)])
        .migrate()
        .await?;

    let err = engine(
        &db,
        config.clone(),
        &[
            ("V1__users.sql", "CREATE TABLE users (id BIGINT);"),
            ("V2__orders.sql", ORDERS),
        ],
    )
    .migrate()
    .await
    .unwrap_err();

    let report = match err {
        KeelError::Validation(report) => report,
        other => panic!("expected a validation error, got {other}"),
    };
    assert_eq!(report.issues.len(), 1);
    assert!(!db.has_object("public", "orders"));
    Ok(())
}

struct SeedUsers;

#[async_trait]
impl CodeMigration for SeedUsers {
    fn version(&self) -> Option<MigrationVersion> {
        MigrationVersion::parse("2").ok()
    }

    fn description(&self) -> String {
        "seed users".to_string()
    }

    fn script_name(&self) -> String {
        "seed_users".to_string()
    }

    async fn migrate(&self, db: &dyn Database) -> anyhow::Result<()> {
        db.execute("CREATE TABLE seeded (id INT)").await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_code_migrations_run_in_version_order() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    let mut sources = registry(&[
        ("V1__users.sql", USERS),
        ("V3__orders.sql", ORDERS),
    ]);
    sources.register_code(SeedUsers);

    let result = engine_with(&db, config.clone(), sources).migrate().await?;

    assert_eq!(result.migrations_executed(), 3);
    assert!(db.has_object("public", "seeded"));
    let rows = history(&db, &config);
    assert_eq!(rows[1].script, "seed_users");
    assert_eq!(rows[1].migration_type, "CODE");
    Ok(())
}
