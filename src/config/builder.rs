use crate::config::{merge::Merge, types::*};
use crate::version::MigrationVersion;
use anyhow::{Context, Result, anyhow, bail};
use std::time::Duration;

pub struct ConfigBuilder {
    config_input: ConfigInput,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let defaults = Config::default();

        let schemas = self.resolve_schemas(&defaults.schemas)?;
        let config = Config {
            database: self.resolve_database(&defaults.database),
            locations: self
                .config_input
                .locations
                .clone()
                .unwrap_or_else(|| vec![crate::constants::DEFAULT_MIGRATIONS_DIR.to_string()]),
            naming: self.resolve_naming(&defaults.naming)?,
            history: self.resolve_history(&defaults.history, &schemas)?,
            schemas,
            behavior: self.resolve_behavior(&defaults.behavior)?,
            lock: self.resolve_lock(&defaults.lock),
            placeholders: self.resolve_placeholders(&defaults.placeholders),
        };

        if config.locations.is_empty() {
            bail!("At least one migration location must be configured");
        }

        Ok(config)
    }

    fn resolve_database(&self, defaults: &Database) -> Database {
        let db_input = self.config_input.database.as_ref();

        let url = db_input
            .and_then(|d| d.url.as_ref())
            .cloned()
            .or_else(|| std::env::var("KEEL_DATABASE_URL").ok())
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .or_else(|| defaults.url.clone());

        Database {
            url,
            connect_retries: db_input
                .and_then(|d| d.connect_retries)
                .unwrap_or(defaults.connect_retries),
            connect_retry_delay: db_input
                .and_then(|d| d.connect_retry_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_retry_delay),
            dialect: db_input
                .and_then(|d| d.dialect.as_ref())
                .cloned()
                .or_else(|| defaults.dialect.clone()),
        }
    }

    fn resolve_naming(&self, defaults: &Naming) -> Result<Naming> {
        let naming_input = self.config_input.naming.as_ref();

        let naming = Naming {
            versioned_prefix: naming_input
                .and_then(|n| n.versioned_prefix.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.versioned_prefix.clone()),
            repeatable_prefix: naming_input
                .and_then(|n| n.repeatable_prefix.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.repeatable_prefix.clone()),
            separator: naming_input
                .and_then(|n| n.separator.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.separator.clone()),
            suffixes: naming_input
                .and_then(|n| n.suffixes.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.suffixes.clone()),
            validate_migration_naming: naming_input
                .and_then(|n| n.validate_migration_naming)
                .unwrap_or(defaults.validate_migration_naming),
        };

        if naming.separator.is_empty() {
            bail!("naming.separator must not be empty");
        }
        if naming.suffixes.is_empty() {
            bail!("naming.suffixes must list at least one suffix");
        }
        Ok(naming)
    }

    fn resolve_schemas(&self, defaults: &Schemas) -> Result<Schemas> {
        let schemas_input = self.config_input.schemas.as_ref();

        let names = schemas_input
            .and_then(|s| s.names.as_ref())
            .cloned()
            .unwrap_or_else(|| defaults.names.clone());
        if names.is_empty() {
            bail!("At least one schema must be configured");
        }
        for name in &names {
            validate_identifier(name).with_context(|| format!("Invalid schema name '{}'", name))?;
        }

        Ok(Schemas {
            names,
            create: schemas_input
                .and_then(|s| s.create)
                .unwrap_or(defaults.create),
        })
    }

    fn resolve_history(&self, defaults: &HistoryTable, schemas: &Schemas) -> Result<HistoryTable> {
        let history_input = self.config_input.history.as_ref();

        // The history table lives in the first managed schema unless told otherwise
        let schema = history_input
            .and_then(|h| h.schema.as_ref())
            .cloned()
            .unwrap_or_else(|| schemas.default_schema().to_string());
        let table = history_input
            .and_then(|h| h.table.as_ref())
            .cloned()
            .unwrap_or_else(|| defaults.table.clone());

        validate_identifier(&schema)
            .with_context(|| format!("Invalid history schema '{}'", schema))?;
        validate_identifier(&table).with_context(|| format!("Invalid history table '{}'", table))?;

        Ok(HistoryTable { schema, table })
    }

    fn resolve_behavior(&self, defaults: &Behavior) -> Result<Behavior> {
        let b = self.config_input.behavior.as_ref();

        let baseline_version = match b.and_then(|b| b.baseline_version.as_deref()) {
            Some(raw) => MigrationVersion::parse(raw)
                .with_context(|| format!("Invalid baseline version '{}'", raw))?,
            None => defaults.baseline_version.clone(),
        };
        if baseline_version.is_latest() || baseline_version.is_empty_sentinel() {
            return Err(anyhow!(
                "Baseline version must be a concrete version, got '{}'",
                baseline_version
            ));
        }

        let target = match b.and_then(|b| b.target.as_deref()) {
            Some(raw) => MigrationVersion::parse(raw)
                .with_context(|| format!("Invalid target version '{}'", raw))?,
            None => defaults.target.clone(),
        };

        Ok(Behavior {
            out_of_order: b.and_then(|b| b.out_of_order).unwrap_or(defaults.out_of_order),
            ignore_missing: b
                .and_then(|b| b.ignore_missing)
                .unwrap_or(defaults.ignore_missing),
            ignore_future: b.and_then(|b| b.ignore_future).unwrap_or(defaults.ignore_future),
            ignore_pending: b
                .and_then(|b| b.ignore_pending)
                .unwrap_or(defaults.ignore_pending),
            validate_on_migrate: b
                .and_then(|b| b.validate_on_migrate)
                .unwrap_or(defaults.validate_on_migrate),
            baseline_on_migrate: b
                .and_then(|b| b.baseline_on_migrate)
                .unwrap_or(defaults.baseline_on_migrate),
            baseline_version,
            baseline_description: b
                .and_then(|b| b.baseline_description.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.baseline_description.clone()),
            target,
            mixed: b.and_then(|b| b.mixed).unwrap_or(defaults.mixed),
            clean_disabled: b
                .and_then(|b| b.clean_disabled)
                .unwrap_or(defaults.clean_disabled),
            record_failed_on_rollback: b
                .and_then(|b| b.record_failed_on_rollback)
                .unwrap_or(defaults.record_failed_on_rollback),
            installed_by: b
                .and_then(|b| b.installed_by.as_ref())
                .cloned()
                .or_else(|| defaults.installed_by.clone()),
        })
    }

    fn resolve_lock(&self, defaults: &LockSettings) -> LockSettings {
        let lock_input = self.config_input.lock.as_ref();

        LockSettings {
            strategy: lock_input
                .and_then(|l| l.strategy)
                .unwrap_or(defaults.strategy),
            retry_count: lock_input
                .and_then(|l| l.retry_count)
                .unwrap_or(defaults.retry_count),
            retry_interval: lock_input
                .and_then(|l| l.retry_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_interval),
            backoff: lock_input.and_then(|l| l.backoff).unwrap_or(defaults.backoff),
            expiry: lock_input
                .and_then(|l| l.expiry_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiry),
        }
    }

    fn resolve_placeholders(&self, defaults: &Placeholders) -> Placeholders {
        let p = self.config_input.placeholders.as_ref();

        Placeholders {
            enabled: p.and_then(|p| p.enabled).unwrap_or(defaults.enabled),
            prefix: p
                .and_then(|p| p.prefix.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.prefix.clone()),
            suffix: p
                .and_then(|p| p.suffix.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.suffix.clone()),
            values: p
                .and_then(|p| p.values.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.values.clone()),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema and table names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("identifier is empty");
    }
    if name.len() > 63 {
        bail!("identifier is longer than 63 characters");
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("identifier must start with a letter or underscore and contain only letters, digits and underscores");
    }
    Ok(())
}
