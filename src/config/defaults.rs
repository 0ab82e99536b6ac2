use crate::config::types::*;
use crate::constants::*;
use crate::version::MigrationVersion;
use std::collections::BTreeMap;

// Config derives Default from these

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            connect_retries: CONNECT_RETRIES,
            connect_retry_delay: CONNECT_RETRY_DELAY,
            dialect: None,
        }
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            versioned_prefix: VERSIONED_PREFIX.to_string(),
            repeatable_prefix: REPEATABLE_PREFIX.to_string(),
            separator: NAME_SEPARATOR.to_string(),
            suffixes: vec![SQL_SUFFIX.to_string()],
            validate_migration_naming: false,
        }
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }
}

impl Default for Schemas {
    fn default() -> Self {
        Self {
            names: vec![DEFAULT_SCHEMA.to_string()],
            create: true,
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            out_of_order: false,
            ignore_missing: false,
            ignore_future: true,
            ignore_pending: true,
            validate_on_migrate: true,
            baseline_on_migrate: false,
            baseline_version: MigrationVersion::parse("1").unwrap_or(MigrationVersion::EMPTY),
            baseline_description: BASELINE_DESCRIPTION.to_string(),
            target: MigrationVersion::LATEST,
            mixed: false,
            clean_disabled: true,
            record_failed_on_rollback: false,
            installed_by: None,
        }
    }
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            strategy: LockStrategy::Auto,
            retry_count: LOCK_RETRY_COUNT,
            retry_interval: LOCK_RETRY_INTERVAL,
            backoff: BackoffStrategy::None,
            expiry: LOCK_EXPIRY,
        }
    }
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: PLACEHOLDER_PREFIX.to_string(),
            suffix: PLACEHOLDER_SUFFIX.to_string(),
            values: BTreeMap::new(),
        }
    }
}
