//! Error types for the migration engine

use crate::db::DbError;
use crate::engine::validate::ValidationReport;
use crate::engine::EngineState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeelError {
    #[error("Unable to parse migration {script} at line {line}: {message}")]
    Parse {
        script: String,
        line: usize,
        message: String,
    },

    #[error(
        "Found more than one migration with version {version}\n  Offenders:\n    -> {first}\n    -> {second}"
    )]
    VersionConflict {
        version: String,
        first: String,
        second: String,
    },

    #[error(
        "Found more than one repeatable migration with description '{description}'\n  Offenders:\n    -> {first}\n    -> {second}"
    )]
    RepeatableConflict {
        description: String,
        first: String,
        second: String,
    },

    #[error("Invalid migration file names:\n{}", .problems.join("\n"))]
    InvalidMigrationNames { problems: Vec<String> },

    #[error("Unable to replace placeholders in {script}: {message}")]
    Placeholder { script: String, message: String },

    #[error(
        "Migration {script} failed at line {line}{}:\n  {message}\n\n  Statement:\n    {statement}\n\n{excerpt}",
        rollback_note(.rolled_back)
    )]
    SqlExecution {
        script: String,
        line: usize,
        statement: String,
        message: String,
        excerpt: String,
        rolled_back: bool,
    },

    #[error("Code migration {script} failed: {message}")]
    CodeMigration { script: String, message: String },

    #[error(
        "Could not obtain lock on {table} after {attempts} attempts. Another instance may be running; wait for it to finish or check for a stale lock."
    )]
    LockTimeout { table: String, attempts: u32 },

    #[error("Validate failed: {0}")]
    Validation(ValidationReport),

    #[error(
        "Schema history contains a failed migration to version {version} ({script}). Run repair to remove the failed entry before migrating."
    )]
    FailedMigrationPresent { version: String, script: String },

    #[error(
        "Found non-empty schema(s) {} without a schema history table. Use baseline or enable baseline_on_migrate.",
        .schemas.join(", ")
    )]
    NonEmptySchema { schemas: Vec<String> },

    #[error(
        "Migration {script} mixes transactional and non-transactional statements. Split it or enable mixed mode."
    )]
    MixedTransactional { script: String },

    #[error("Clean is disabled. Set behavior.clean_disabled to false to allow dropping all objects.")]
    CleanDisabled,

    #[error("Unable to baseline: {0}")]
    Baseline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Invalid engine state transition from {from:?} to {to:?}")]
    InvalidState { from: EngineState, to: EngineState },
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        " (changes rolled back)"
    } else {
        ""
    }
}

/// Result type alias for KeelError
pub type Result<T> = std::result::Result<T, KeelError>;
