//! Training and retrain checks

use chrono::Utc;
use std::fmt;

use super::{Pipeline, RunSummary};
use crate::error::Result;
use crate::ml::{model_version, ModelArtifact};
use crate::types::{ModelRegistryEntry, ModelStatus, Station, WeekdayScope};

/// Why a station/scope should be retrained
#[derive(Debug, Clone, PartialEq)]
pub enum RetrainReason {
    NoModel,
    NewData { new_periods: i64, train_periods: i64 },
    PerformanceDrop { recent: f64, trained: f64 },
}

impl fmt::Display for RetrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrainReason::NoModel => f.write_str("no active model"),
            RetrainReason::NewData {
                new_periods,
                train_periods,
            } => write!(f, "📦 {} new periods (trained on {})", new_periods, train_periods),
            RetrainReason::PerformanceDrop { recent, trained } => write!(
                f,
                "📉 hit-rate {:.1}% vs {:.1}% at training",
                recent * 100.0,
                trained * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrainCheck {
    pub station: Station,
    pub scope: WeekdayScope,
    pub reason: Option<RetrainReason>,
}

fn target_label(station: &Station, scope: WeekdayScope) -> String {
    format!("{} [{}]", station, scope.as_key())
}

impl Pipeline {
    /// Station/scope pairs to train.
    ///
    /// A station without a scope expands to its default scopes; no station
    /// means every scheduled station.
    pub fn training_targets(
        &self,
        station: Option<&Station>,
        scope: Option<WeekdayScope>,
    ) -> Vec<(Station, WeekdayScope)> {
        let stations = match station {
            Some(s) => vec![s.clone()],
            None => self.schedule.all_stations(),
        };
        let mut targets = Vec::new();
        for station in stations {
            match scope {
                Some(scope) => targets.push((station, scope)),
                None => {
                    for scope in self.schedule.default_scopes(&station) {
                        targets.push((station.clone(), scope));
                    }
                }
            }
        }
        targets
    }

    pub async fn train(&self, targets: &[(Station, WeekdayScope)], force: bool) -> Result<RunSummary> {
        let mut summary = RunSummary::new(if force { "train (forced)" } else { "train" });
        for (station, scope) in targets {
            let label = target_label(station, *scope);
            match self.train_station(station, *scope, force).await {
                Ok(entry) => summary.succeeded(
                    label,
                    format!(
                        "{} auc={:.3} hit@{}={:.1}%",
                        entry.version,
                        entry.metric_auc,
                        self.config.training.top_k,
                        entry.metric_hit_rate * 100.0
                    ),
                ),
                Err(e) => summary.record_error(label, &e),
            }
        }
        Ok(self.finish(summary).await)
    }

    /// Train, write the artifact, then activate it in the registry
    pub async fn train_station(
        &self,
        station: &Station,
        scope: WeekdayScope,
        force: bool,
    ) -> Result<ModelRegistryEntry> {
        let rows = self.db.labeled_feature_rows(station, scope).await?;
        let outcome = self.trainer.train(station, &rows, force)?;

        let backend = outcome.model.backend_name();
        let existing = self.db.model_versions(station, scope).await?;
        let version = model_version(backend, self.today(), scope, &existing);
        let artifact = ModelArtifact::new(station.clone(), scope, version.clone(), outcome.model);
        let stored = self.artifacts.save(&artifact).await?;

        let mut entry = ModelRegistryEntry {
            id: None,
            station: station.clone(),
            scope,
            version,
            status: ModelStatus::Active,
            file_path: stored.file_path,
            digest: stored.digest,
            backend: backend.to_string(),
            train_start: outcome.train_start,
            train_end: outcome.train_end,
            train_periods: outcome.periods as i64,
            row_count: outcome.row_count as i64,
            metric_auc: outcome.metrics.auc,
            metric_hit_rate: outcome.metrics.hit_rate,
            trained_at: Utc::now(),
        };
        entry.id = Some(self.db.activate_model(&entry).await?);
        Ok(entry)
    }

    /// Evaluate the retrain triggers of one station/scope
    pub async fn retrain_reason(
        &self,
        station: &Station,
        scope: WeekdayScope,
    ) -> Result<Option<RetrainReason>> {
        let Some(active) = self.db.active_model(station, scope).await? else {
            return Ok(Some(RetrainReason::NoModel));
        };
        let thresholds = &self.config.retrain;

        let new_periods = self
            .db
            .labeled_dates_after(station, scope, active.train_end)
            .await?;
        if new_periods >= thresholds.min_new_periods
            && new_periods as f64 >= thresholds.min_new_ratio * active.train_periods as f64
        {
            return Ok(Some(RetrainReason::NewData {
                new_periods,
                train_periods: active.train_periods,
            }));
        }

        // Only settlements the scope would have served count
        let fetch = match scope {
            WeekdayScope::All => thresholds.recent_window,
            WeekdayScope::Weekday(_) => thresholds.recent_window * 7,
        };
        let recent: Vec<bool> = self
            .db
            .recent_settlements(station, fetch)
            .await?
            .into_iter()
            .filter(|s| scope.matches(s.prediction_date))
            .take(thresholds.recent_window)
            .map(|s| s.hit)
            .collect();
        if recent.is_empty() {
            return Ok(None);
        }
        let hit_rate = recent.iter().filter(|h| **h).count() as f64 / recent.len() as f64;
        if hit_rate <= active.metric_hit_rate - thresholds.perf_delta {
            return Ok(Some(RetrainReason::PerformanceDrop {
                recent: hit_rate,
                trained: active.metric_hit_rate,
            }));
        }
        Ok(None)
    }

    pub async fn retrain_checks(&self) -> Result<Vec<RetrainCheck>> {
        let mut checks = Vec::new();
        for (station, scope) in self.training_targets(None, None) {
            let reason = self.retrain_reason(&station, scope).await?;
            checks.push(RetrainCheck {
                station,
                scope,
                reason,
            });
        }
        Ok(checks)
    }

    /// Report which station/scopes need training, and train them when
    /// `train` is set
    pub async fn check_training(&self, train: bool, force: bool) -> Result<RunSummary> {
        let mut summary = RunSummary::new(if train {
            "check-training --train"
        } else {
            "check-training"
        });
        let mut flagged = 0;
        for (station, scope) in self.training_targets(None, None) {
            let label = target_label(&station, scope);
            let reason = match self.retrain_reason(&station, scope).await {
                Ok(Some(reason)) => reason,
                Ok(None) => {
                    summary.succeeded(label, "up to date");
                    continue;
                }
                Err(e) => {
                    summary.record_error(label, &e);
                    continue;
                }
            };
            flagged += 1;
            tracing::info!("🔔 {} needs training: {}", label, reason);

            if !train {
                summary.succeeded(label, format!("needs training: {}", reason));
                continue;
            }
            match self.train_station(&station, scope, force).await {
                Ok(entry) => summary.succeeded(label, format!("{} → {}", reason, entry.version)),
                Err(e) => summary.record_error(label, &e),
            }
        }
        summary.counter("flagged", flagged);
        Ok(self.finish(summary).await)
    }
}
