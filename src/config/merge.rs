use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

/// Merge two optional sections field by field
fn merge_section<T>(base: Option<T>, other: Option<T>, f: impl FnOnce(T, T) -> T) -> Option<T> {
    match (base, other) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(f(a, b)),
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            database: merge_section(self.database, other.database, DatabaseInput::merge_with),
            locations: self.locations.merge(other.locations),
            naming: merge_section(self.naming, other.naming, NamingInput::merge_with),
            history: merge_section(self.history, other.history, HistoryInput::merge_with),
            schemas: merge_section(self.schemas, other.schemas, SchemasInput::merge_with),
            behavior: merge_section(self.behavior, other.behavior, BehaviorInput::merge_with),
            lock: merge_section(self.lock, other.lock, LockInput::merge_with),
            placeholders: merge_section(
                self.placeholders,
                other.placeholders,
                PlaceholdersInput::merge_with,
            ),
        }
    }
}

// Custom merge implementations for complex types
impl DatabaseInput {
    pub fn merge_with(self, other: DatabaseInput) -> DatabaseInput {
        DatabaseInput {
            url: other.url.or(self.url),
            connect_retries: other.connect_retries.or(self.connect_retries),
            connect_retry_delay_ms: other.connect_retry_delay_ms.or(self.connect_retry_delay_ms),
            dialect: other.dialect.or(self.dialect),
        }
    }
}

impl NamingInput {
    pub fn merge_with(self, other: NamingInput) -> NamingInput {
        NamingInput {
            versioned_prefix: other.versioned_prefix.or(self.versioned_prefix),
            repeatable_prefix: other.repeatable_prefix.or(self.repeatable_prefix),
            separator: other.separator.or(self.separator),
            suffixes: other.suffixes.or(self.suffixes),
            validate_migration_naming: other
                .validate_migration_naming
                .or(self.validate_migration_naming),
        }
    }
}

impl HistoryInput {
    pub fn merge_with(self, other: HistoryInput) -> HistoryInput {
        HistoryInput {
            schema: other.schema.or(self.schema),
            table: other.table.or(self.table),
        }
    }
}

impl SchemasInput {
    pub fn merge_with(self, other: SchemasInput) -> SchemasInput {
        SchemasInput {
            names: other.names.or(self.names),
            create: other.create.or(self.create),
        }
    }
}

impl BehaviorInput {
    pub fn merge_with(self, other: BehaviorInput) -> BehaviorInput {
        BehaviorInput {
            out_of_order: other.out_of_order.or(self.out_of_order),
            ignore_missing: other.ignore_missing.or(self.ignore_missing),
            ignore_future: other.ignore_future.or(self.ignore_future),
            ignore_pending: other.ignore_pending.or(self.ignore_pending),
            validate_on_migrate: other.validate_on_migrate.or(self.validate_on_migrate),
            baseline_on_migrate: other.baseline_on_migrate.or(self.baseline_on_migrate),
            baseline_version: other.baseline_version.or(self.baseline_version),
            baseline_description: other.baseline_description.or(self.baseline_description),
            target: other.target.or(self.target),
            mixed: other.mixed.or(self.mixed),
            clean_disabled: other.clean_disabled.or(self.clean_disabled),
            record_failed_on_rollback: other
                .record_failed_on_rollback
                .or(self.record_failed_on_rollback),
            installed_by: other.installed_by.or(self.installed_by),
        }
    }
}

impl LockInput {
    pub fn merge_with(self, other: LockInput) -> LockInput {
        LockInput {
            strategy: other.strategy.or(self.strategy),
            retry_count: other.retry_count.or(self.retry_count),
            retry_interval_ms: other.retry_interval_ms.or(self.retry_interval_ms),
            backoff: other.backoff.or(self.backoff),
            expiry_secs: other.expiry_secs.or(self.expiry_secs),
        }
    }
}

impl PlaceholdersInput {
    /// Placeholder values are combined key by key; later values win.
    pub fn merge_with(self, other: PlaceholdersInput) -> PlaceholdersInput {
        let values = match (self.values, other.values) {
            (Some(mut base), Some(overrides)) => {
                base.extend(overrides);
                Some(base)
            }
            (base, overrides) => overrides.or(base),
        };
        PlaceholdersInput {
            enabled: other.enabled.or(self.enabled),
            prefix: other.prefix.or(self.prefix),
            suffix: other.suffix.or(self.suffix),
            values,
        }
    }
}
