use crate::version::MigrationVersion;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub database: Option<DatabaseInput>,
    pub locations: Option<Vec<String>>,
    pub naming: Option<NamingInput>,
    pub history: Option<HistoryInput>,
    pub schemas: Option<SchemasInput>,
    pub behavior: Option<BehaviorInput>,
    pub lock: Option<LockInput>,
    pub placeholders: Option<PlaceholdersInput>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: Database,
    pub locations: Vec<String>,
    pub naming: Naming,
    pub history: HistoryTable,
    pub schemas: Schemas,
    pub behavior: Behavior,
    pub lock: LockSettings,
    pub placeholders: Placeholders,
}

// Database connection
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseInput {
    pub url: Option<String>,
    pub connect_retries: Option<u32>,
    pub connect_retry_delay_ms: Option<u64>,
    /// Parser dialect override (defaults to the dialect of the URL scheme)
    pub dialect: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: Option<String>,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
    pub dialect: Option<String>,
}

// Migration file naming
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NamingInput {
    pub versioned_prefix: Option<String>,
    pub repeatable_prefix: Option<String>,
    pub separator: Option<String>,
    pub suffixes: Option<Vec<String>>,
    pub validate_migration_naming: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Naming {
    pub versioned_prefix: String,
    pub repeatable_prefix: String,
    pub separator: String,
    pub suffixes: Vec<String>,
    pub validate_migration_naming: bool,
}

// Schema history table
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryInput {
    pub schema: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HistoryTable {
    pub schema: String,
    pub table: String,
}

// Managed schemas
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemasInput {
    pub names: Option<Vec<String>>,
    pub create: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Schemas {
    pub names: Vec<String>,
    pub create: bool,
}

impl Schemas {
    /// The schema unqualified objects and the history table default to
    pub fn default_schema(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or(crate::constants::DEFAULT_SCHEMA)
    }
}

// Command behavior
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BehaviorInput {
    pub out_of_order: Option<bool>,
    pub ignore_missing: Option<bool>,
    pub ignore_future: Option<bool>,
    pub ignore_pending: Option<bool>,
    pub validate_on_migrate: Option<bool>,
    pub baseline_on_migrate: Option<bool>,
    pub baseline_version: Option<String>,
    pub baseline_description: Option<String>,
    pub target: Option<String>,
    pub mixed: Option<bool>,
    pub clean_disabled: Option<bool>,
    pub record_failed_on_rollback: Option<bool>,
    pub installed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Behavior {
    pub out_of_order: bool,
    pub ignore_missing: bool,
    pub ignore_future: bool,
    pub ignore_pending: bool,
    pub validate_on_migrate: bool,
    pub baseline_on_migrate: bool,
    pub baseline_version: MigrationVersion,
    pub baseline_description: String,
    pub target: MigrationVersion,
    pub mixed: bool,
    pub clean_disabled: bool,
    pub record_failed_on_rollback: bool,
    pub installed_by: Option<String>,
}

// Locking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Native advisory lock when the database has one, lock row otherwise
    #[default]
    Auto,
    Advisory,
    /// Insert a sentinel row into the history table
    Row,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Use constant delay between retries
    #[default]
    None,
    /// Exponential backoff: delay * 2^(attempt - 1)
    Exponential,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LockInput {
    pub strategy: Option<LockStrategy>,
    pub retry_count: Option<u32>,
    pub retry_interval_ms: Option<u64>,
    pub backoff: Option<BackoffStrategy>,
    pub expiry_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub strategy: LockStrategy,
    pub retry_count: u32,
    pub retry_interval: Duration,
    pub backoff: BackoffStrategy,
    pub expiry: Duration,
}

// Placeholders
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlaceholdersInput {
    pub enabled: Option<bool>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub values: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct Placeholders {
    pub enabled: bool,
    pub prefix: String,
    pub suffix: String,
    pub values: BTreeMap<String, String>,
}

// CLI argument groups for command-specific options
#[derive(Debug, Clone, Default, Args)]
pub struct DatabaseArgs {
    #[arg(long, help = "Database URL (overrides KEEL_DATABASE_URL and the config file)")]
    pub url: Option<String>,

    #[arg(long, help = "SQL dialect used to split scripts (postgresql, mysql, sqlserver, generic)")]
    pub dialect: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct LocationArgs {
    #[arg(long, value_delimiter = ',', help = "Migration directories, comma separated")]
    pub locations: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',', help = "Managed schemas, comma separated")]
    pub schemas: Option<Vec<String>>,

    #[arg(long, help = "Schema history table name")]
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct MigrateArgs {
    #[arg(long, help = "Migrate up to and including this version")]
    pub target: Option<String>,

    #[arg(long, help = "Apply pending migrations older than the latest applied one")]
    pub out_of_order: bool,

    #[arg(long, help = "Baseline a non-empty schema without history before migrating")]
    pub baseline_on_migrate: bool,

    #[arg(long, help = "Allow transactional and non-transactional statements in one migration")]
    pub mixed: bool,

    #[arg(long, help = "Skip validation before migrating")]
    pub skip_validation: bool,

    #[arg(
        long = "placeholder",
        value_name = "KEY=VALUE",
        help = "Placeholder value, may be repeated"
    )]
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ValidateArgs {
    #[arg(long, help = "Ignore applied migrations that are missing locally")]
    pub ignore_missing: bool,

    #[arg(long, help = "Report pending migrations as validation errors")]
    pub fail_on_pending: bool,

    #[arg(long, help = "Accept unapplied migrations older than the latest applied one")]
    pub out_of_order: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct BaselineArgs {
    #[arg(long, help = "Version to baseline at")]
    pub baseline_version: Option<String>,

    #[arg(long, help = "Description of the baseline entry")]
    pub baseline_description: Option<String>,
}

// Conversion functions from CLI args to config input
impl From<DatabaseArgs> for DatabaseInput {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            url: args.url,
            connect_retries: None,
            connect_retry_delay_ms: None,
            dialect: args.dialect,
        }
    }
}

impl LocationArgs {
    pub fn apply_to(self, input: &mut ConfigInput) {
        input.locations = self.locations;
        if self.schemas.is_some() {
            input.schemas = Some(SchemasInput {
                names: self.schemas,
                create: None,
            });
        }
        if self.table.is_some() {
            input.history = Some(HistoryInput {
                schema: None,
                table: self.table,
            });
        }
    }
}

impl From<MigrateArgs> for BehaviorInput {
    fn from(args: MigrateArgs) -> Self {
        Self {
            target: args.target,
            out_of_order: args.out_of_order.then_some(true),
            baseline_on_migrate: args.baseline_on_migrate.then_some(true),
            mixed: args.mixed.then_some(true),
            validate_on_migrate: args.skip_validation.then_some(false),
            ..Default::default()
        }
    }
}

impl From<ValidateArgs> for BehaviorInput {
    fn from(args: ValidateArgs) -> Self {
        Self {
            ignore_missing: args.ignore_missing.then_some(true),
            ignore_pending: args.fail_on_pending.then_some(false),
            out_of_order: args.out_of_order.then_some(true),
            ..Default::default()
        }
    }
}

impl From<BaselineArgs> for BehaviorInput {
    fn from(args: BaselineArgs) -> Self {
        Self {
            baseline_version: args.baseline_version,
            baseline_description: args.baseline_description,
            ..Default::default()
        }
    }
}

/// Parse repeated `KEY=VALUE` arguments into placeholder input.
pub fn placeholder_args(pairs: &[String]) -> anyhow::Result<Option<PlaceholdersInput>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut values = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid placeholder '{}': expected KEY=VALUE", pair))?;
        values.insert(key.trim().to_string(), value.to_string());
    }
    Ok(Some(PlaceholdersInput {
        values: Some(values),
        ..Default::default()
    }))
}
