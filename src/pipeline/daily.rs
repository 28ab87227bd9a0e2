//! Daily steps: predict, verify, report

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{Pipeline, RunSummary};
use crate::error::{BotError, Result};
use crate::ml::FeatureRow;
use crate::settlement::{settle, ProfitReport};
use crate::types::{Prediction, SettlementRecord, Station, PAIR_COUNT};

fn format_pairs(pairs: &[u8]) -> String {
    pairs
        .iter()
        .map(|p| format!("{:02}", p))
        .collect::<Vec<_>>()
        .join(" · ")
}

impl Pipeline {
    /// Predict every station drawing on `date` (default today)
    pub async fn predict(&self, date: Option<NaiveDate>) -> Result<RunSummary> {
        let date = date.unwrap_or_else(|| self.today());
        let mut summary = RunSummary::new(format!("predict {}", date));
        for station in self.schedule.stations_on(date) {
            let label = self.schedule.display_name(&station);
            match self.predict_station(&station, date).await {
                Ok(prediction) => summary.succeeded(
                    label,
                    format!(
                        "{} ({})",
                        format_pairs(&prediction.pairs()),
                        prediction.model_version
                    ),
                ),
                Err(e) => summary.record_error(label, &e),
            }
        }
        Ok(self.finish(summary).await)
    }

    pub async fn predict_station(&self, station: &Station, date: NaiveDate) -> Result<Prediction> {
        let entry = self
            .db
            .resolve_active_model(station, date)
            .await?
            .ok_or_else(|| BotError::NoActiveModel(format!("{} on {}", station, date)))?;
        let artifact = self.artifacts.load(&entry).await?;
        let rows = self.prediction_features(station, date).await?;

        let prediction = self.predictor.predict(&artifact.model, &entry.version, &rows)?;
        self.db.save_prediction(&prediction).await?;
        Ok(prediction)
    }

    /// The stored table for `date`, or one built on the fly (not stored)
    /// when nothing is stored yet
    async fn prediction_features(&self, station: &Station, date: NaiveDate) -> Result<Vec<FeatureRow>> {
        match self.db.feature_row_count(station, date).await? {
            0 => {
                let history = self.db.tail_history(station).await?;
                self.check_history(station, date, &history)?;
                let past = history.before(date, self.features.history_periods());
                self.features.build(station, date, past, None)
            }
            n if n == PAIR_COUNT as i64 => self.db.feature_rows(station, date).await,
            n => Err(BotError::Integrity(format!(
                "{} {}: {} stored feature rows",
                station, date, n
            ))),
        }
    }

    /// Settle the predictions of `date`, or every unsettled prediction up
    /// to today. Predictions still waiting on results are reported pending.
    pub async fn verify(&self, date: Option<NaiveDate>) -> Result<RunSummary> {
        let predictions = match date {
            Some(d) => self.db.predictions_on(d).await?,
            None => self.db.unsettled_predictions(self.today()).await?,
        };

        let mut summary = RunSummary::new(match date {
            Some(d) => format!("verify {}", d),
            None => "verify".to_string(),
        });
        let (mut settled, mut hits) = (0u32, 0u32);
        let mut profit = Decimal::ZERO;
        for prediction in &predictions {
            let label = format!(
                "{} {}",
                self.schedule.display_name(&prediction.station),
                prediction.prediction_date
            );
            match self.settle_prediction(prediction).await {
                Ok(record) => {
                    settled += 1;
                    let mut detail = if record.hit {
                        hits += 1;
                        format!("🎯 {}", format_pairs(&record.matched_pairs))
                    } else {
                        format!("miss {}", format_pairs(&record.predicted))
                    };
                    if let Some(fin) = &record.financials {
                        profit += fin.profit;
                        detail.push_str(&format!(" | {:+}", fin.profit));
                    }
                    summary.succeeded(label, detail);
                }
                Err(e) => summary.record_error(label, &e),
            }
        }

        summary.counter("settled", settled);
        summary.counter("hits", hits);
        if settled > 0 {
            summary.counter(
                "hit-rate",
                format!("{:.1}%", hits as f64 / settled as f64 * 100.0),
            );
        }
        summary.counter("profit", format!("{:+}", profit));
        Ok(self.finish(summary).await)
    }

    pub async fn settle_prediction(&self, prediction: &Prediction) -> Result<SettlementRecord> {
        let tail_set = self
            .db
            .tail_set(&prediction.station, prediction.prediction_date)
            .await?;
        let record = settle(
            prediction,
            tail_set.as_ref(),
            self.config.settlement.for_region(prediction.station.region),
        )?;
        self.db.save_settlement(&record).await?;
        Ok(record)
    }

    /// Profit report over settled predictions, sent to the notifier
    pub async fn report(&self, from: NaiveDate, to: NaiveDate) -> Result<ProfitReport> {
        if from > to {
            return Err(BotError::InvalidInput(format!(
                "report range {} → {} is reversed",
                from, to
            )));
        }
        let records = self.db.settlements_between(from, to).await?;
        let report = ProfitReport::from_settlements(from, to, &records);
        tracing::info!(
            "📊 Report {} → {}: {} settled, profit {}",
            from,
            to,
            report.total.settled,
            report.total.profit
        );
        self.notifier.send_best_effort(&report.to_html()).await;
        Ok(report)
    }
}
