//! Feature building step

use chrono::NaiveDate;

use super::{Pipeline, RunSummary};
use crate::error::{BotError, Result};
use crate::ml::TailHistory;
use crate::types::Station;

/// Which target dates `build_features` covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureTarget {
    /// Every station drawing on that date
    Date(NaiveDate),
    /// Every date with tail observations, for every station holding any
    Backfill,
}

#[derive(Debug, Default)]
struct BackfillCounts {
    built: usize,
    stored: usize,
    too_early: usize,
}

impl Pipeline {
    pub async fn build_features(&self, target: FeatureTarget) -> Result<RunSummary> {
        let summary = match target {
            FeatureTarget::Date(date) => {
                let mut summary = RunSummary::new(format!("build-features {}", date));
                let mut labeled = 0;
                for station in self.schedule.stations_on(date) {
                    match self.build_station_features(&station, date).await {
                        Ok(true) => {
                            labeled += 1;
                            summary.succeeded(station.to_string(), "100 rows, labeled");
                        }
                        Ok(false) => summary.succeeded(station.to_string(), "100 rows"),
                        Err(e) => summary.record_error(station.to_string(), &e),
                    }
                }
                summary.counter("labeled", labeled);
                summary
            }
            FeatureTarget::Backfill => {
                let mut summary = RunSummary::new("build-features backfill");
                let mut built = 0;
                for station in self.db.stations_with_tails().await? {
                    match self.backfill_station_features(&station).await {
                        Ok(counts) => {
                            built += counts.built;
                            summary.succeeded(
                                station.to_string(),
                                format!(
                                    "{} built, {} already stored, {} too early",
                                    counts.built, counts.stored, counts.too_early
                                ),
                            );
                        }
                        Err(e) => summary.record_error(station.to_string(), &e),
                    }
                }
                summary.counter("tables", built);
                summary
            }
        };
        Ok(self.finish(summary).await)
    }

    pub(super) fn check_history(&self, station: &Station, date: NaiveDate, history: &TailHistory) -> Result<()> {
        let periods = history.before(date, self.features.history_periods()).len();
        let floor = self.config.features.min_history_periods;
        if periods < floor {
            return Err(BotError::InsufficientData(format!(
                "{} {}: {} periods of history, need {}",
                station, date, periods, floor
            )));
        }
        Ok(())
    }

    /// Build and store one table; `true` when it carries labels
    pub async fn build_station_features(&self, station: &Station, date: NaiveDate) -> Result<bool> {
        let history = self.db.tail_history(station).await?;
        self.check_history(station, date, &history)?;
        let rows = self.features.build_from_history(station, date, &history)?;
        let labeled = rows.iter().all(|r| r.label.is_some());
        self.db.save_feature_set(&rows).await?;
        Ok(labeled)
    }

    /// Recompute every table the history supports. A stored table is
    /// rewritten only when it differs, so a late draw refreshes the tables
    /// of every later date.
    async fn backfill_station_features(&self, station: &Station) -> Result<BackfillCounts> {
        let history = self.db.tail_history(station).await?;

        let mut counts = BackfillCounts::default();
        let dates: Vec<NaiveDate> = history.dates().collect();
        for date in dates {
            if self.check_history(station, date, &history).is_err() {
                counts.too_early += 1;
                continue;
            }
            let rows = self.features.build_from_history(station, date, &history)?;
            let stored = self.db.feature_rows(station, date).await?;
            if stored == rows {
                counts.stored += 1;
                continue;
            }
            if !stored.is_empty() {
                tracing::debug!("♻️ {} {}: stored feature table is stale", station, date);
            }
            self.db.save_feature_set(&rows).await?;
            counts.built += 1;
        }

        tracing::info!(
            "🧮 {}: {} feature tables built, {} already stored",
            station,
            counts.built,
            counts.stored
        );
        Ok(counts)
    }
}
