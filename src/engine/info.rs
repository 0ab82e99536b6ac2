//! Merging resolved migrations with the history into one status per migration.

use super::{CommandEngine, EngineState};
use crate::config::Behavior;
use crate::error::Result;
use crate::history::{AppliedMigration, MigrationType};
use crate::resolver::{ResolvedMigration, compare_resolved};
use crate::version::MigrationVersion;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    /// Newer than the configured target
    AboveTarget,
    /// Older than the latest applied version while out-of-order is off
    Ignored,
    BelowBaseline,
    Baseline,
    Success,
    Failed,
    /// Applied after a higher version
    OutOfOrder,
    /// Applied, newer than anything resolved
    FutureSuccess,
    FutureFailed,
    /// Applied, but no longer resolved
    MissingSuccess,
    MissingFailed,
    /// A repeatable whose script changed since it was applied
    Outdated,
    /// An earlier application of a repeatable
    Superseded,
    /// Records the schemas created by keel
    Schema,
}

impl MigrationState {
    pub fn is_applied(&self) -> bool {
        !matches!(
            self,
            MigrationState::Pending
                | MigrationState::AboveTarget
                | MigrationState::Ignored
                | MigrationState::BelowBaseline
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            MigrationState::Failed | MigrationState::FutureFailed | MigrationState::MissingFailed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            MigrationState::Pending => "Pending",
            MigrationState::AboveTarget => "Above Target",
            MigrationState::Ignored => "Ignored",
            MigrationState::BelowBaseline => "Below Baseline",
            MigrationState::Baseline => "Baseline",
            MigrationState::Success => "Success",
            MigrationState::Failed => "Failed",
            MigrationState::OutOfOrder => "Out of Order",
            MigrationState::FutureSuccess => "Future",
            MigrationState::FutureFailed => "Failed (Future)",
            MigrationState::MissingSuccess => "Missing",
            MigrationState::MissingFailed => "Failed (Missing)",
            MigrationState::Outdated => "Outdated",
            MigrationState::Superseded => "Superseded",
            MigrationState::Schema => "Success",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One migration as known locally, in the history, or both.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub resolved: Option<ResolvedMigration>,
    pub applied: Option<AppliedMigration>,
    pub state: MigrationState,
}

impl MigrationInfo {
    pub fn version(&self) -> Option<&MigrationVersion> {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => applied.version.as_ref(),
            (None, Some(resolved)) => resolved.version.as_ref(),
            (None, None) => None,
        }
    }

    pub fn description(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.description,
            (None, Some(resolved)) => &resolved.description,
            (None, None) => "",
        }
    }

    pub fn script(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.script,
            (None, Some(resolved)) => &resolved.script,
            (None, None) => "",
        }
    }

    pub fn migration_type(&self) -> Option<MigrationType> {
        self.applied
            .as_ref()
            .map(|a| a.migration_type)
            .or_else(|| self.resolved.as_ref().map(|r| r.migration_type))
    }

    pub fn is_repeatable(&self) -> bool {
        self.version().is_none()
    }
}

/// Every migration in display order: history by rank, then what is not applied.
pub fn diff(
    resolved: &[ResolvedMigration],
    applied: &[AppliedMigration],
    behavior: &Behavior,
) -> Vec<MigrationInfo> {
    let by_version: HashMap<&MigrationVersion, &ResolvedMigration> = resolved
        .iter()
        .filter_map(|r| r.version.as_ref().map(|v| (v, r)))
        .collect();
    let repeatables: HashMap<&str, &ResolvedMigration> = resolved
        .iter()
        .filter(|r| r.is_repeatable())
        .map(|r| (r.description.as_str(), r))
        .collect();
    let max_resolved = resolved.iter().filter_map(|r| r.version.as_ref()).max();

    let baseline = applied
        .iter()
        .filter(|a| a.migration_type == MigrationType::Baseline)
        .filter_map(|a| a.version.as_ref())
        .max();
    let latest_applied = applied
        .iter()
        .filter(|a| a.migration_type != MigrationType::Schema)
        .filter_map(|a| a.version.as_ref())
        .max();
    // the most recent application of each repeatable
    let mut latest_repeatable: HashMap<&str, i32> = HashMap::new();
    for row in applied.iter().filter(|a| a.is_repeatable()) {
        latest_repeatable.insert(row.description.as_str(), row.installed_rank);
    }

    let mut infos = Vec::new();
    let mut consumed_versions: HashSet<&MigrationVersion> = HashSet::new();
    let mut current_repeatables: HashSet<&str> = HashSet::new();
    let mut highest_so_far: Option<&MigrationVersion> = None;

    for row in applied {
        let state = match (&row.version, row.migration_type) {
            (_, MigrationType::Schema) => MigrationState::Schema,
            (_, MigrationType::Baseline) => MigrationState::Baseline,
            (Some(version), _) => {
                let out_of_order = highest_so_far.is_some_and(|h| version < h);
                match (by_version.get(version), row.success) {
                    (Some(_), true) if out_of_order => MigrationState::OutOfOrder,
                    (Some(_), true) => MigrationState::Success,
                    (Some(_), false) => MigrationState::Failed,
                    (None, success) if max_resolved.is_none_or(|m| version > m) => {
                        if success {
                            MigrationState::FutureSuccess
                        } else {
                            MigrationState::FutureFailed
                        }
                    }
                    (None, true) => MigrationState::MissingSuccess,
                    (None, false) => MigrationState::MissingFailed,
                }
            }
            (None, _) => {
                let latest = latest_repeatable.get(row.description.as_str()) == Some(&row.installed_rank);
                match repeatables.get(row.description.as_str()) {
                    _ if !latest => MigrationState::Superseded,
                    None if row.success => MigrationState::MissingSuccess,
                    None => MigrationState::MissingFailed,
                    Some(_) if !row.success => MigrationState::Failed,
                    Some(r) if r.checksum == row.checksum => MigrationState::Success,
                    Some(_) => MigrationState::Outdated,
                }
            }
        };

        if let Some(version) = &row.version
            && row.migration_type != MigrationType::Schema
        {
            if row.success {
                consumed_versions.insert(version);
            }
            if highest_so_far.is_none_or(|h| version > h) {
                highest_so_far = Some(version);
            }
        }
        if state == MigrationState::Success && row.version.is_none() {
            current_repeatables.insert(row.description.as_str());
        }

        let resolved = match &row.version {
            Some(version) => by_version.get(version).map(|r| (*r).clone()),
            None => repeatables.get(row.description.as_str()).map(|r| (*r).clone()),
        };
        infos.push(MigrationInfo {
            resolved: resolved.filter(|_| !row.migration_type.is_synthetic()),
            applied: Some(row.clone()),
            state,
        });
    }

    let mut unapplied: Vec<&ResolvedMigration> = resolved
        .iter()
        .filter(|r| match &r.version {
            Some(version) => !consumed_versions.contains(version),
            None => !current_repeatables.contains(r.description.as_str()),
        })
        .collect();
    unapplied.sort_by(|a, b| compare_resolved(a, b));

    for migration in unapplied {
        let state = match &migration.version {
            Some(version) if baseline.is_some_and(|b| version <= b) => {
                MigrationState::BelowBaseline
            }
            Some(version) if *version > behavior.target => MigrationState::AboveTarget,
            Some(version) if latest_applied.is_some_and(|l| version < l) => {
                if behavior.out_of_order {
                    MigrationState::Pending
                } else {
                    MigrationState::Ignored
                }
            }
            _ => MigrationState::Pending,
        };
        infos.push(MigrationInfo {
            resolved: Some(migration.clone()),
            applied: None,
            state,
        });
    }

    infos
}

/// The migrations migrate would run, in execution order.
pub fn pending(infos: &[MigrationInfo]) -> Vec<&ResolvedMigration> {
    infos
        .iter()
        .filter(|i| i.state == MigrationState::Pending)
        .filter_map(|i| i.resolved.as_ref())
        .collect()
}

/// Highest successfully applied version, baseline included.
pub fn current_version(infos: &[MigrationInfo]) -> Option<MigrationVersion> {
    infos
        .iter()
        .filter(|i| i.state != MigrationState::Schema)
        .filter_map(|i| i.applied.as_ref())
        .filter(|a| a.success)
        .filter_map(|a| a.version.clone())
        .max()
}

#[derive(Debug, Clone)]
pub struct InfoResult {
    pub current_version: Option<MigrationVersion>,
    pub migrations: Vec<MigrationInfo>,
    pub history_exists: bool,
}

impl InfoResult {
    pub fn pending_count(&self) -> usize {
        self.migrations
            .iter()
            .filter(|m| m.state == MigrationState::Pending)
            .count()
    }
}

impl CommandEngine {
    /// Status of every migration. Read-only, so no lock is taken.
    pub async fn info(&self) -> Result<InfoResult> {
        self.run_command(async {
            self.transition(EngineState::LoadingHistory)?;
            let history_exists = self.history.exists().await?;
            let applied = self.load_history().await?;
            self.transition(EngineState::Resolving)?;
            let resolved = self.resolve()?;
            self.transition(EngineState::Diffing)?;
            let migrations = diff(&resolved, &applied, &self.config.behavior);
            Ok(InfoResult {
                current_version: current_version(&migrations),
                migrations,
                history_exists,
            })
        })
        .await
    }
}
