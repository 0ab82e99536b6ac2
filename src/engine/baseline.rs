use super::{CommandEngine, EngineState};
use crate::error::{KeelError, Result};
use crate::history::{HistoryEntry, MigrationType};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct BaselineResult {
    pub version: String,
    pub description: String,
    /// The same baseline was already recorded; nothing was written
    pub already_baselined: bool,
}

impl CommandEngine {
    /// Mark `behavior.baseline_version` and everything below it as applied
    /// without running anything.
    pub async fn baseline(&self) -> Result<BaselineResult> {
        self.run_command(async {
            self.ensure_history_table().await?;
            self.transition(EngineState::Locking)?;
            self.lock
                .with_lock(async {
                    self.transition(EngineState::LoadingHistory)?;
                    self.history.clear_cache().await;
                    self.transition(EngineState::AppendingHistory)?;
                    let result = self.write_baseline().await?;
                    self.transition(EngineState::Unlocking)?;
                    Ok(result)
                })
                .await
        })
        .await
    }

    /// Append the baseline row. The caller holds the lock.
    pub(super) async fn write_baseline(&self) -> Result<BaselineResult> {
        let behavior = &self.config.behavior;
        let version = behavior.baseline_version.clone();
        let description = behavior.baseline_description.clone();
        self.history.clear_cache().await;
        let applied = self.history.load().await?;

        if let Some(existing) = applied
            .iter()
            .find(|row| row.migration_type == MigrationType::Baseline)
        {
            if existing.version.as_ref() == Some(&version) && existing.description == description {
                info!("Schema history already baselined at version {}", version);
                return Ok(BaselineResult {
                    version: version.to_string(),
                    description,
                    already_baselined: true,
                });
            }
            return Err(KeelError::Baseline(format!(
                "already baselined at version {} ('{}')",
                existing
                    .version
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                existing.description
            )));
        }
        if applied.iter().any(|row| !row.migration_type.is_synthetic()) {
            return Err(KeelError::Baseline(format!(
                "schema history table {} already contains migrations",
                self.history.table()
            )));
        }

        self.history
            .append(HistoryEntry {
                version: Some(version.clone()),
                description: description.clone(),
                migration_type: MigrationType::Baseline,
                script: description.clone(),
                checksum: None,
                execution_time_ms: 0,
                success: true,
            })
            .await?;
        info!("Baselined schema history at version {}", version);
        Ok(BaselineResult {
            version: version.to_string(),
            description,
            already_baselined: false,
        })
    }
}
