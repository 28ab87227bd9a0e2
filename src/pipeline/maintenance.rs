//! Model cleanup

use chrono::{Duration, Utc};
use std::collections::HashSet;

use super::{Pipeline, RunSummary};
use crate::error::{BotError, Result};
use crate::types::ModelRegistryEntry;

impl Pipeline {
    /// Delete deprecated models retired before the retention window whose
    /// version no prediction inside the window used. Active models are
    /// never touched.
    pub async fn cleanup_models(&self, dry_run: bool) -> Result<RunSummary> {
        let retention = Duration::days(self.config.retrain.retention_days);
        let candidates = self.db.deprecated_models_before(Utc::now() - retention).await?;
        let in_use: HashSet<String> = self
            .db
            .versions_used_since(self.today() - retention)
            .await?
            .into_iter()
            .collect();

        let mut summary = RunSummary::new(if dry_run {
            "cleanup-models (dry run)"
        } else {
            "cleanup-models"
        });
        let mut deleted = 0;
        for entry in &candidates {
            let label = format!("{} {}", entry.station, entry.version);
            if in_use.contains(&entry.version) {
                summary.succeeded(label, "kept, used by a recent prediction");
                continue;
            }
            if dry_run {
                summary.succeeded(label, format!("would delete {}", entry.file_path));
                continue;
            }
            match self.remove_model(entry).await {
                Ok(detail) => {
                    deleted += 1;
                    summary.succeeded(label, detail);
                }
                Err(e) => summary.record_error(label, &e),
            }
        }
        summary.counter("candidates", candidates.len());
        summary.counter("deleted", deleted);
        Ok(self.finish(summary).await)
    }

    /// Drops the registry row before the file, so a model reactivated
    /// since it was listed keeps its artifact
    pub(super) async fn remove_model(&self, entry: &ModelRegistryEntry) -> Result<String> {
        let id = entry
            .id
            .ok_or_else(|| BotError::Integrity(format!("registry entry {} has no id", entry.version)))?;
        if !self.db.delete_model(id).await? {
            return Err(BotError::Integrity(format!(
                "{} is no longer deprecated",
                entry.version
            )));
        }
        let had_file = self.artifacts.delete(&entry.file_path).await?;
        tracing::info!("🗑️ Deleted model {} ({})", entry.version, entry.file_path);
        Ok(if had_file {
            format!("deleted {}", entry.file_path)
        } else {
            "deleted (file already gone)".to_string()
        })
    }
}
