use std::time::Duration;

// Configuration file name
pub const CONFIG_FILENAME: &str = "keel.yaml";

// Migration file naming conventions
pub const VERSIONED_PREFIX: &str = "V";
pub const REPEATABLE_PREFIX: &str = "R";
pub const NAME_SEPARATOR: &str = "__";
pub const SQL_SUFFIX: &str = ".sql";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

// Schema history defaults
pub const DEFAULT_HISTORY_TABLE: &str = "keel_schema_history";
pub const DEFAULT_SCHEMA: &str = "public";
pub const BASELINE_DESCRIPTION: &str = "<< Baseline >>";
pub const SCHEMA_MARKER_DESCRIPTION: &str = "<< Keel Schema Creation >>";
pub const SCHEMA_MARKER_VERSION: &str = "0";

// History table column sizes
pub const VERSION_MAX_LEN: usize = 50;
pub const DESCRIPTION_MAX_LEN: usize = 200;
pub const SCRIPT_MAX_LEN: usize = 1000;

// Row-insert locking
pub const LOCK_ROW_RANK: i32 = -100;
pub const LOCK_ROW_DESCRIPTION: &str = "keel-lock";
pub const LOCK_RETRY_COUNT: u32 = 50;
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const LOCK_EXPIRY: Duration = Duration::from_secs(600);
pub const MAX_BACKOFF_MULTIPLIER: u32 = 32;

// Database connection
pub const CONNECT_RETRIES: u32 = 5;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

// Placeholders
pub const PLACEHOLDER_PREFIX: &str = "${";
pub const PLACEHOLDER_SUFFIX: &str = "}";
