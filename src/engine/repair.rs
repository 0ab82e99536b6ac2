use super::info::{MigrationState, diff};
use super::{CommandEngine, EngineState};
use crate::error::Result;
use crate::history::MigrationType;
use serde::Serialize;
use tracing::info;

/// A history row touched by repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairedRow {
    pub installed_rank: i32,
    pub version: Option<String>,
    pub script: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairResult {
    /// Failed rows deleted
    pub removed: Vec<RepairedRow>,
    /// Rows whose checksum, description or type now match the local migration
    pub realigned: Vec<RepairedRow>,
    pub warnings: Vec<String>,
}

impl RepairResult {
    pub fn changed(&self) -> bool {
        !self.removed.is_empty() || !self.realigned.is_empty()
    }
}

impl CommandEngine {
    /// Remove failed history rows and realign applied rows with the
    /// migrations resolved now.
    pub async fn repair(&self) -> Result<RepairResult> {
        self.run_command(async {
            if !self.history.exists().await? {
                let mut result = RepairResult::default();
                self.warn(
                    &mut result.warnings,
                    format!(
                        "Schema history table {} does not exist, nothing to repair",
                        self.history.table()
                    ),
                );
                return Ok(result);
            }
            self.transition(EngineState::Locking)?;
            self.lock.with_lock(self.repair_locked()).await
        })
        .await
    }

    async fn repair_locked(&self) -> Result<RepairResult> {
        let mut result = RepairResult::default();

        self.transition(EngineState::LoadingHistory)?;
        let removed = self.history.delete_failed().await?;
        for row in removed {
            info!("Removed failed migration {} from schema history", row.script);
            result.removed.push(RepairedRow {
                installed_rank: row.installed_rank,
                version: row.version.as_ref().map(ToString::to_string),
                script: row.script,
            });
        }
        let applied = self.load_history().await?;

        self.transition(EngineState::Resolving)?;
        let resolved = self.resolve()?;

        self.transition(EngineState::Diffing)?;
        let infos = diff(&resolved, &applied, &self.config.behavior);

        self.transition(EngineState::AppendingHistory)?;
        for info in &infos {
            if !matches!(info.state, MigrationState::Success | MigrationState::OutOfOrder)
                || info.is_repeatable()
            {
                continue;
            }
            let (Some(applied), Some(resolved)) = (&info.applied, &info.resolved) else {
                continue;
            };
            let aligned = applied.checksum == resolved.checksum
                && applied.description == resolved.description
                && applied.migration_type == resolved.migration_type;
            if aligned || applied.migration_type == MigrationType::Baseline {
                continue;
            }
            self.history
                .update(
                    applied.installed_rank,
                    &resolved.description,
                    resolved.migration_type,
                    resolved.checksum,
                )
                .await?;
            info!("Realigned {} with {}", applied.script, resolved.location);
            result.realigned.push(RepairedRow {
                installed_rank: applied.installed_rank,
                version: applied.version.as_ref().map(ToString::to_string),
                script: resolved.script.clone(),
            });
        }

        self.transition(EngineState::Unlocking)?;
        Ok(result)
    }
}
