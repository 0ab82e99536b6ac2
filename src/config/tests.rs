use super::*;
use crate::config::merge::Merge;
use crate::config::types::*;
use crate::version::MigrationVersion;
use std::collections::BTreeMap;
use std::time::Duration;

#[test]
fn test_config_input_merge() {
    let file_config = ConfigInput {
        database: Some(DatabaseInput {
            url: Some("postgres://localhost/app".to_string()),
            connect_retries: Some(3),
            connect_retry_delay_ms: None,
            dialect: None,
        }),
        locations: Some(vec!["db/migrations".to_string()]),
        behavior: Some(BehaviorInput {
            out_of_order: Some(true),
            target: Some("5".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let cli_config = ConfigInput {
        database: Some(DatabaseInput {
            url: Some("postgres://localhost/override".to_string()),
            ..Default::default()
        }),
        behavior: Some(BehaviorInput {
            target: Some("7".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let merged = file_config.merge(cli_config);

    let database = merged.database.as_ref().unwrap();
    // CLI should override file config
    assert_eq!(
        database.url.as_deref(),
        Some("postgres://localhost/override")
    );
    // File config should be preserved where CLI doesn't override
    assert_eq!(database.connect_retries, Some(3));
    assert_eq!(merged.locations, Some(vec!["db/migrations".to_string()]));

    let behavior = merged.behavior.as_ref().unwrap();
    assert_eq!(behavior.out_of_order, Some(true));
    assert_eq!(behavior.target.as_deref(), Some("7"));
}

#[test]
fn test_placeholder_values_merge_by_key() {
    let mut file_values = BTreeMap::new();
    file_values.insert("owner".to_string(), "app".to_string());
    file_values.insert("region".to_string(), "eu".to_string());
    let mut cli_values = BTreeMap::new();
    cli_values.insert("owner".to_string(), "admin".to_string());

    let merged = PlaceholdersInput {
        values: Some(file_values),
        ..Default::default()
    }
    .merge_with(PlaceholdersInput {
        values: Some(cli_values),
        ..Default::default()
    });

    let values = merged.values.unwrap();
    assert_eq!(values["owner"], "admin");
    assert_eq!(values["region"], "eu");
}

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.history.table, "keel_schema_history");
    assert_eq!(config.schemas.names, vec!["public".to_string()]);
    assert_eq!(config.naming.versioned_prefix, "V");
    assert_eq!(config.naming.suffixes, vec![".sql".to_string()]);
    assert!(config.behavior.clean_disabled);
    assert!(config.behavior.validate_on_migrate);
    assert!(config.behavior.target.is_latest());
    assert_eq!(config.lock.strategy, LockStrategy::Auto);
    assert_eq!(config.lock.backoff, BackoffStrategy::None);
    assert!(config.placeholders.enabled);
}

#[test]
fn test_builder_resolves_defaults_and_overrides() {
    let file_input = ConfigInput {
        database: Some(DatabaseInput {
            url: Some("postgres://localhost/app".to_string()),
            ..Default::default()
        }),
        schemas: Some(SchemasInput {
            names: Some(vec!["app".to_string(), "audit".to_string()]),
            create: None,
        }),
        lock: Some(LockInput {
            retry_interval_ms: Some(50),
            backoff: Some(BackoffStrategy::Exponential),
            ..Default::default()
        }),
        ..Default::default()
    };
    let cli_input = ConfigInput {
        behavior: Some(BehaviorInput {
            baseline_version: Some("3.1".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let config = ConfigBuilder::new()
        .with_file(file_input)
        .with_cli_args(cli_input)
        .resolve()
        .unwrap();

    assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/app"));
    // History table defaults into the first managed schema
    assert_eq!(config.history.schema, "app");
    assert_eq!(config.locations, vec!["migrations".to_string()]);
    assert_eq!(config.lock.retry_interval, Duration::from_millis(50));
    assert_eq!(config.lock.backoff, BackoffStrategy::Exponential);
    assert_eq!(
        config.behavior.baseline_version,
        MigrationVersion::parse("3.1").unwrap()
    );
}

#[test]
fn test_builder_rejects_invalid_identifiers() {
    let input = ConfigInput {
        history: Some(HistoryInput {
            schema: None,
            table: Some("history; DROP TABLE x".to_string()),
        }),
        ..Default::default()
    };

    let err = ConfigBuilder::new().with_file(input).resolve().unwrap_err();
    assert!(err.to_string().contains("Invalid history table"));
}

#[test]
fn test_builder_rejects_bad_versions() {
    let input = ConfigInput {
        behavior: Some(BehaviorInput {
            target: Some("1..2".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let err = ConfigBuilder::new().with_file(input).resolve().unwrap_err();
    assert!(err.to_string().contains("Invalid target version"));

    let input = ConfigInput {
        behavior: Some(BehaviorInput {
            baseline_version: Some("latest".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(ConfigBuilder::new().with_file(input).resolve().is_err());
}

#[test]
fn test_builder_rejects_empty_schema_list() {
    let input = ConfigInput {
        schemas: Some(SchemasInput {
            names: Some(vec![]),
            create: None,
        }),
        ..Default::default()
    };
    assert!(ConfigBuilder::new().with_file(input).resolve().is_err());
}

#[test]
fn test_yaml_config_parsing() {
    let yaml = r#"
database:
  url: postgres://localhost/app
  connect_retries: 2
locations:
  - db/migrations
  - db/seed
schemas:
  names: [app]
behavior:
  out_of_order: true
  clean_disabled: false
lock:
  strategy: row
  backoff: exponential
placeholders:
  values:
    owner: app_owner
"#;

    let input: ConfigInput = serde_yaml::from_str(yaml).unwrap();
    let config = ConfigBuilder::new().with_file(input).resolve().unwrap();

    assert_eq!(config.database.connect_retries, 2);
    assert_eq!(config.locations.len(), 2);
    assert!(config.behavior.out_of_order);
    assert!(!config.behavior.clean_disabled);
    assert_eq!(config.lock.strategy, LockStrategy::Row);
    assert_eq!(config.placeholders.values["owner"], "app_owner");
}

#[test]
fn test_placeholder_args() {
    let input = placeholder_args(&["owner=app".to_string(), "expr=a=b".to_string()])
        .unwrap()
        .unwrap();
    let values = input.values.unwrap();
    assert_eq!(values["owner"], "app");
    assert_eq!(values["expr"], "a=b");

    assert!(placeholder_args(&["novalue".to_string()]).is_err());
    assert!(placeholder_args(&[]).unwrap().is_none());
}

#[test]
fn test_validate_identifier() {
    assert!(builder::validate_identifier("keel_schema_history").is_ok());
    assert!(builder::validate_identifier("_private").is_ok());
    assert!(builder::validate_identifier("").is_err());
    assert!(builder::validate_identifier("1table").is_err());
    assert!(builder::validate_identifier("my-table").is_err());
}

#[test]
fn test_load_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keel.yaml");
    let (input, config_dir) = load_config(path.to_str().unwrap()).unwrap();
    assert!(input.database.is_none());
    assert_eq!(config_dir, dir.path());
}
