use crate::helpers::harness::{engine, history, test_config};
use anyhow::Result;
use keel::KeelError;
use keel::db::memory::MemoryDatabase;

const SCRIPTS: [(&str, &str); 3] = [
    ("V1__users.sql", "CREATE TABLE users (id INT PRIMARY KEY);"),
    ("V2__orders.sql", "CREATE TABLE orders (id INT, user_id INT REFERENCES users (id));"),
    (
        "V3__report.sql",
        "CREATE VIEW order_report AS SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id;",
    ),
];

#[tokio::test]
async fn test_clean_disabled_by_default() -> Result<()> {
    let db = MemoryDatabase::new();
    let config = test_config();
    engine(&db, config.clone(), &SCRIPTS).migrate().await?;

    let err = engine(&db, config, &SCRIPTS).clean().await.unwrap_err();

    assert!(matches!(err, KeelError::CleanDisabled));
    assert!(db.has_object("public", "users"));
    Ok(())
}

#[tokio::test]
async fn test_clean_drops_dependents_first() -> Result<()> {
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config.behavior.clean_disabled = false;
    engine(&db, config.clone(), &SCRIPTS).migrate().await?;

    let result = engine(&db, config.clone(), &SCRIPTS).clean().await?;

    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.schemas_cleaned, vec!["public".to_string()]);
    assert!(result.schemas_dropped.is_empty());
    assert!(db.object_names("public").is_empty());
    assert!(db.has_schema("public"));

    // migrate starts from scratch afterwards
    let again = engine(&db, config.clone(), &SCRIPTS).migrate().await?;
    assert_eq!(again.migrations_executed(), 3);
    assert_eq!(history(&db, &config).len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_clean_drops_schemas_keel_created() -> Result<()> {
    let db = MemoryDatabase::new();
    let mut config = test_config();
    config.behavior.clean_disabled = false;
    config.schemas.names = vec!["app".to_string()];
    config.history.schema = "app".to_string();
    let scripts = [("V1__items.sql", "CREATE TABLE app.items (id INT);")];

    engine(&db, config.clone(), &scripts).migrate().await?;
    assert!(db.has_schema("app"));

    let result = engine(&db, config.clone(), &scripts).clean().await?;

    assert_eq!(result.schemas_dropped, vec!["app".to_string()]);
    assert!(!db.has_schema("app"));
    Ok(())
}
