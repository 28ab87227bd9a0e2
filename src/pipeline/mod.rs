//! Batch pipeline
//!
//! One [`Pipeline`] owns the store, the artifact directory, the station
//! schedule and the notifier. Each entry point is idempotent and returns a
//! [`RunSummary`]; stations are processed one after another and a failing
//! station never aborts the batch. The summary is sent to the notifier
//! only after every write of the run has committed.
//!
//! Steps, in dependency order:
//! `import` → `build_tails` → `build_features` → `train` / `predict` → `verify`

mod daily;
mod features;
mod maintenance;
mod summary;
mod training;

#[cfg(test)]
mod tests;

pub use features::FeatureTarget;
pub use summary::{RunSummary, StationOutcome, Status};
pub use training::{RetrainCheck, RetrainReason};

use chrono::NaiveDate;

use crate::config::Config;
use crate::error::{BotError, Result};
use crate::ingester::{extract_tails, DrawSource};
use crate::ml::{FeatureBuilder, Predictor, Trainer};
use crate::notify::Notifier;
use crate::schedule::StationSchedule;
use crate::storage::{ArtifactStore, Database};
use crate::types::{day_of_week, weekday_name, DrawRecord};

pub struct Pipeline {
    config: Config,
    db: Database,
    artifacts: ArtifactStore,
    schedule: StationSchedule,
    notifier: Notifier,
    features: FeatureBuilder,
    trainer: Trainer,
    predictor: Predictor,
}

impl Pipeline {
    pub fn new(config: Config, db: Database, notifier: Notifier) -> Self {
        Self {
            artifacts: ArtifactStore::new(&config.artifacts.dir),
            schedule: StationSchedule::vietnam(),
            features: FeatureBuilder::new(config.features.history_periods),
            trainer: Trainer::new(config.training.clone()),
            predictor: Predictor::new(config.training.top_k),
            config,
            db,
            notifier,
        }
    }

    /// Connect the store and notifier described by `config`
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::connect(&config.database.path).await?;
        let notifier = Notifier::from_config(config.telegram.as_ref());
        Ok(Self::new(config, db, notifier))
    }

    pub fn with_schedule(mut self, schedule: StationSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn schedule(&self) -> &StationSchedule {
        &self.schedule
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Today in the draw timezone
    pub fn today(&self) -> NaiveDate {
        self.config.pipeline.today()
    }

    /// Log the summary and send it; a failed send is only logged
    async fn finish(&self, summary: RunSummary) -> RunSummary {
        if summary.has_failures() {
            tracing::warn!("⚠️ {}", summary);
        } else {
            tracing::info!("🏁 {}", summary);
        }
        self.notifier.send_best_effort(&summary.to_html()).await;
        summary
    }

    /// Upsert the records of a draw source and derive their tail observations
    pub async fn import(&self, source: &dyn DrawSource, date: Option<NaiveDate>) -> Result<RunSummary> {
        let records = source.fetch(date).await?;
        tracing::info!("📥 Importing {} draw records from {}", records.len(), source.name());

        let mut summary = RunSummary::new("import");
        let mut tails = 0;
        for draw in &records {
            let label = draw.label();
            match self.import_draw(draw).await {
                Ok(n) => {
                    tails += n;
                    summary.succeeded(label, format!("{} tails", n));
                }
                Err(e) => summary.record_error(label, &e),
            }
        }
        summary.counter("records", records.len());
        summary.counter("tails", tails);
        Ok(self.finish(summary).await)
    }

    async fn import_draw(&self, draw: &DrawRecord) -> Result<usize> {
        let station = draw.station()?;
        if !self.schedule.draws_on(&station, draw.draw_date) {
            return Err(BotError::InvalidInput(format!(
                "{} does not draw on {} ({})",
                station,
                draw.draw_date,
                weekday_name(day_of_week(draw.draw_date))
            )));
        }
        let id = self.db.upsert_draw(draw).await?;
        let stored = DrawRecord {
            id: Some(id),
            ..draw.clone()
        };
        self.derive_tails(&stored).await
    }

    /// Derive tail observations for one date, or for every draw still
    /// lacking them when `date` is `None`
    pub async fn build_tails(&self, date: Option<NaiveDate>) -> Result<RunSummary> {
        let draws = match date {
            Some(d) => self.db.draws_on(d).await?,
            None => self.db.draws_without_tails().await?,
        };

        let mut summary = RunSummary::new(match date {
            Some(d) => format!("build-tails {}", d),
            None => "build-tails backfill".to_string(),
        });
        let mut inserted = 0;
        for draw in &draws {
            let label = draw.label();
            match self.derive_tails(draw).await {
                Ok(0) => summary.succeeded(label, "already derived"),
                Ok(n) => {
                    inserted += n;
                    summary.succeeded(label, format!("{} tails", n));
                }
                Err(e) => summary.record_error(label, &e),
            }
        }
        summary.counter("draws", draws.len());
        summary.counter("tails", inserted);
        Ok(self.finish(summary).await)
    }

    async fn derive_tails(&self, draw: &DrawRecord) -> Result<usize> {
        let draw_id = draw
            .id
            .ok_or_else(|| BotError::InvalidInput(format!("draw {} has no id", draw.draw_date)))?;
        let observations = extract_tails(draw)?;
        self.db.insert_tails(draw_id, &observations).await
    }
}
