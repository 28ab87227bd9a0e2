//! Model training
//!
//! Splits labeled rows chronologically by date, fits the configured
//! backend on the earlier dates and evaluates it on the later ones:
//! - ROC AUC over all validation rows
//! - hit-rate@k, one 100-row block per validation date
//!
//! Rows are never shuffled. A date is wholly in train or wholly in
//! validation, so nothing from a later date informs an earlier one.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use super::classifier::{Classifier, TrainedModel};
use super::features::{FeatureRow, FeatureVector};
use super::metrics::{hit_rate_at_k, roc_auc, ScoredRow};
use crate::config::TrainingConfig;
use crate::error::{BotError, Result};
use crate::types::{Station, WeekdayScope};

/// AUC reported when validation has a single class
const UNDEFINED_AUC: f64 = 0.5;

/// Chronological train/validation partition
#[derive(Debug)]
pub struct DateSplit<'a> {
    pub train: Vec<&'a FeatureRow>,
    pub validation: Vec<&'a FeatureRow>,
    /// First date of the validation set
    pub boundary: NaiveDate,
}

/// Put the earliest `1 - validation_ratio` share of distinct dates in
/// train and the rest in validation. Needs at least two dates.
pub fn split_by_date(rows: &[FeatureRow], validation_ratio: f64) -> Result<DateSplit<'_>> {
    let dates: Vec<NaiveDate> = rows
        .iter()
        .map(|r| r.target_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if dates.len() < 2 {
        return Err(BotError::InsufficientData(format!(
            "need at least 2 dates to split, got {}",
            dates.len()
        )));
    }

    let split_idx =
        ((dates.len() as f64 * (1.0 - validation_ratio)) as usize).clamp(1, dates.len() - 1);
    let boundary = dates[split_idx];
    let (train, validation) = rows.iter().partition(|r| r.target_date < boundary);

    Ok(DateSplit {
        train,
        validation,
        boundary,
    })
}

/// Evaluation of a fitted model on its validation split
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMetrics {
    pub auc: f64,
    pub hit_rate: f64,
    pub k: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub validation_dates: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome<M = TrainedModel> {
    pub model: M,
    pub metrics: TrainingMetrics,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    /// Distinct dates across train and validation
    pub periods: usize,
    pub row_count: usize,
}

/// Score validation rows and compute AUC and hit-rate@k
pub fn evaluate(
    model: &dyn Classifier,
    validation: &[&FeatureRow],
    k: usize,
) -> Result<(f64, f64)> {
    let x: Vec<FeatureVector> = validation.iter().map(|r| r.to_vector()).collect();
    let probs = model.predict_probability(&x)?;
    if probs.len() != validation.len() {
        return Err(BotError::Classifier(format!(
            "{} probabilities for {} rows",
            probs.len(),
            validation.len()
        )));
    }

    let mut scored = Vec::with_capacity(validation.len());
    let mut labels = Vec::with_capacity(validation.len());
    for (row, p) in validation.iter().zip(&probs) {
        let label = row.label.unwrap_or(false);
        labels.push(label);
        scored.push(ScoredRow {
            date: row.target_date,
            pair: row.pair,
            probability: *p,
            label,
        });
    }

    let auc = roc_auc(&probs, &labels).unwrap_or(UNDEFINED_AUC);
    let hit_rate = hit_rate_at_k(&scored, k)?.rate;
    Ok((auc, hit_rate))
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn min_rows(&self, force: bool) -> usize {
        if force {
            self.config.min_rows_forced
        } else {
            self.config.min_rows
        }
    }

    /// Fit a fresh backend on `rows`. Unlabeled rows are ignored.
    pub fn train(
        &self,
        station: &Station,
        rows: &[FeatureRow],
        force: bool,
    ) -> Result<TrainingOutcome> {
        self.train_with(station, rows, force, TrainedModel::new(&self.config))
    }

    /// Same as [`Trainer::train`] with a caller-supplied backend
    pub fn train_with<M: Classifier>(
        &self,
        station: &Station,
        rows: &[FeatureRow],
        force: bool,
        mut model: M,
    ) -> Result<TrainingOutcome<M>> {
        let labeled: Vec<FeatureRow> = rows.iter().filter(|r| r.label.is_some()).cloned().collect();
        let floor = self.min_rows(force);
        if labeled.len() < floor {
            return Err(BotError::InsufficientData(format!(
                "{}: {} labeled rows, need {}",
                station,
                labeled.len(),
                floor
            )));
        }

        let split = split_by_date(&labeled, self.config.validation_ratio)?;
        let x: Vec<FeatureVector> = split.train.iter().map(|r| r.to_vector()).collect();
        let y: Vec<bool> = split.train.iter().map(|r| r.label == Some(true)).collect();

        tracing::info!(
            "🧠 Training {} on {} rows, validating on {} rows from {}",
            station,
            x.len(),
            split.validation.len(),
            split.boundary
        );
        model.fit(&x, &y)?;

        let (auc, hit_rate) = evaluate(&model, &split.validation, self.config.top_k)?;
        let dates: BTreeSet<NaiveDate> = labeled.iter().map(|r| r.target_date).collect();
        let validation_dates = dates.range(split.boundary..).count();
        let (train_start, train_end) = match (dates.first(), dates.last()) {
            (Some(s), Some(e)) => (*s, *e),
            _ => return Err(BotError::InsufficientData(format!("{}: no dates", station))),
        };

        Ok(TrainingOutcome {
            metrics: TrainingMetrics {
                auc,
                hit_rate,
                k: self.config.top_k,
                train_rows: split.train.len(),
                validation_rows: split.validation.len(),
                validation_dates,
            },
            model,
            train_start,
            train_end,
            periods: dates.len(),
            row_count: labeled.len(),
        })
    }
}

/// Registry version for a model trained on `trained_on`.
///
/// `{backend}_{YYYYMMDD}`, plus `_wd{N}` for a weekday scope. When that
/// name is taken, `_r2`, `_r3`, ... are tried in order.
pub fn model_version(
    backend: &str,
    trained_on: NaiveDate,
    scope: WeekdayScope,
    existing: &[String],
) -> String {
    let mut base = format!("{}_{}", backend, trained_on.format("%Y%m%d"));
    if let Some(d) = scope.weekday() {
        base.push_str(&format!("_wd{}", d));
    }
    if !existing.iter().any(|v| *v == base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_r{}", base, n);
        if !existing.iter().any(|v| *v == candidate) {
            return candidate;
        }
        n += 1;
    }
}
