//! Comparing what is resolved locally with what the history says ran.

use super::info::{self, MigrationInfo, MigrationState, diff};
use super::{CommandEngine, EngineState};
use crate::config::Behavior;
use crate::error::{KeelError, Result};
use crate::history::MigrationType;
use crate::resolver::MigrationExecutor;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    ChecksumMismatch {
        version: Option<String>,
        script: String,
        applied: Option<i32>,
        resolved: Option<i32>,
    },
    DescriptionMismatch {
        version: Option<String>,
        applied: String,
        resolved: String,
    },
    TypeMismatch {
        version: Option<String>,
        script: String,
        applied: MigrationType,
        resolved: MigrationType,
    },
    /// Applied but no longer resolved
    Missing {
        version: Option<String>,
        script: String,
    },
    /// Applied and newer than anything resolved
    Future { version: Option<String>, script: String },
    Failed {
        version: Option<String>,
        script: String,
    },
    /// Resolved, older than the latest applied version and never applied
    OutOfOrder { version: Option<String>, script: String },
    Pending {
        version: Option<String>,
        script: String,
    },
    /// Not yet applied and cannot be split into statements
    Unparseable {
        version: Option<String>,
        script: String,
        line: usize,
        message: String,
    },
}

fn label(version: &Option<String>, script: &str) -> String {
    match version {
        Some(v) => format!("version {} ({})", v, script),
        None => format!("repeatable {}", script),
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::ChecksumMismatch {
                version,
                script,
                applied,
                resolved,
            } => write!(
                f,
                "Checksum mismatch for {}: applied {}, resolved locally {}",
                label(version, script),
                display_checksum(*applied),
                display_checksum(*resolved)
            ),
            ValidationIssue::DescriptionMismatch {
                version,
                applied,
                resolved,
            } => write!(
                f,
                "Description mismatch for version {}: applied '{}', resolved locally '{}'",
                version.as_deref().unwrap_or("-"),
                applied,
                resolved
            ),
            ValidationIssue::TypeMismatch {
                version,
                script,
                applied,
                resolved,
            } => write!(
                f,
                "Type mismatch for {}: applied {}, resolved locally {}",
                label(version, script),
                applied,
                resolved
            ),
            ValidationIssue::Missing { version, script } => write!(
                f,
                "Detected applied migration not resolved locally: {}",
                label(version, script)
            ),
            ValidationIssue::Future { version, script } => write!(
                f,
                "Detected applied migration newer than any local migration: {}",
                label(version, script)
            ),
            ValidationIssue::Failed { version, script } => write!(
                f,
                "Detected failed migration: {}. Run repair before migrating again",
                label(version, script)
            ),
            ValidationIssue::OutOfOrder { version, script } => write!(
                f,
                "Detected resolved migration not applied to database: {}. It is older than the latest applied version; enable out_of_order to apply it",
                label(version, script)
            ),
            ValidationIssue::Pending { version, script } => write!(
                f,
                "Detected resolved migration not applied to database: {}",
                label(version, script)
            ),
            ValidationIssue::Unparseable {
                version,
                script,
                line,
                message,
            } => write!(
                f,
                "Unable to parse {} at line {}: {}",
                label(version, script),
                line,
                message
            ),
        }
    }
}

fn display_checksum(checksum: Option<i32>) -> String {
    checksum
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Every problem found, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Number of migrations compared
    pub validated: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "{} migrations validated", self.validated);
        }
        write!(f, "{} problem(s) found", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Check `infos` against the validation rules of `behavior`.
pub fn check(infos: &[MigrationInfo], behavior: &Behavior) -> ValidationReport {
    let mut issues = Vec::new();
    let mut validated = 0;

    for info in infos {
        let version = info.version().map(|v| v.to_string());
        let script = info.script().to_string();
        match info.state {
            MigrationState::Success | MigrationState::OutOfOrder => {
                validated += 1;
                if info.is_repeatable() {
                    continue;
                }
                let (Some(applied), Some(resolved)) = (&info.applied, &info.resolved) else {
                    continue;
                };
                if applied.migration_type != resolved.migration_type {
                    issues.push(ValidationIssue::TypeMismatch {
                        version: version.clone(),
                        script: script.clone(),
                        applied: applied.migration_type,
                        resolved: resolved.migration_type,
                    });
                }
                if applied.checksum != resolved.checksum {
                    issues.push(ValidationIssue::ChecksumMismatch {
                        version: version.clone(),
                        script: resolved.script.clone(),
                        applied: applied.checksum,
                        resolved: resolved.checksum,
                    });
                }
                if applied.description != resolved.description {
                    issues.push(ValidationIssue::DescriptionMismatch {
                        version,
                        applied: applied.description.clone(),
                        resolved: resolved.description.clone(),
                    });
                }
            }
            MigrationState::Failed
            | MigrationState::FutureFailed
            | MigrationState::MissingFailed => {
                issues.push(ValidationIssue::Failed { version, script });
            }
            MigrationState::MissingSuccess if !behavior.ignore_missing => {
                issues.push(ValidationIssue::Missing { version, script });
            }
            MigrationState::FutureSuccess if !behavior.ignore_future => {
                issues.push(ValidationIssue::Future { version, script });
            }
            MigrationState::Ignored => {
                issues.push(ValidationIssue::OutOfOrder { version, script });
            }
            MigrationState::Pending if !behavior.ignore_pending => {
                issues.push(ValidationIssue::Pending { version, script });
            }
            _ => {}
        }
    }

    ValidationReport { validated, issues }
}

impl CommandEngine {
    /// Compare resolved migrations with the history. Read-only, so no lock
    /// is taken. An invalid report is returned as [`KeelError::Validation`].
    pub async fn validate(&self) -> Result<ValidationReport> {
        self.run_command(async {
            self.transition(EngineState::LoadingHistory)?;
            let applied = self.load_history().await?;
            self.transition(EngineState::Resolving)?;
            let resolved = self.resolve()?;
            self.transition(EngineState::Diffing)?;
            let infos = diff(&resolved, &applied, &self.config.behavior);
            let mut report = check(&infos, &self.config.behavior);
            report.issues.extend(self.parse_pending(&infos).await?);
            if !report.is_valid() {
                return Err(KeelError::Validation(report));
            }
            Ok(report)
        })
        .await
    }

    /// Split every pending SQL migration so broken scripts are reported
    /// before migrate gets to them.
    async fn parse_pending(&self, infos: &[MigrationInfo]) -> Result<Vec<ValidationIssue>> {
        let pending = info::pending(infos);
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = self.placeholder_context().await?;
        let resolver = self.resolver();
        let mut issues = Vec::new();
        for migration in pending {
            let MigrationExecutor::Sql { content } = &migration.executor else {
                continue;
            };
            match resolver.prepare(migration, content, &placeholders) {
                Ok(_) => {}
                Err(KeelError::Parse { line, message, .. }) => {
                    issues.push(ValidationIssue::Unparseable {
                        version: migration.version.as_ref().map(ToString::to_string),
                        script: migration.script.clone(),
                        line,
                        message,
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(issues)
    }
}
