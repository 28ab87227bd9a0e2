//! Classifier capability and the serialized model artifact
//!
//! The trainer and predictor only see [`Classifier`]. Backend
//! hyperparameters stay inside each backend; the artifact carries
//! whichever backend was trained as a tagged [`TrainedModel`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::features::{FeatureRow, FeatureVector};
use super::gbdt::GradientBoostedStumps;
use super::logistic::LogisticRegression;
use crate::config::{BackendKind, TrainingConfig};
use crate::error::{BotError, Result};
use crate::types::{Station, WeekdayScope};

/// Binary classifier over feature vectors
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: &[FeatureVector], y: &[bool]) -> Result<()>;

    /// Probability of the positive class per row
    fn predict_probability(&self, x: &[FeatureVector]) -> Result<Vec<f64>>;

    fn predict(&self, x: &[FeatureVector]) -> Result<Vec<bool>> {
        Ok(self
            .predict_probability(x)?
            .into_iter()
            .map(|p| p >= 0.5)
            .collect())
    }
}

/// Shared input check for backends
pub(crate) fn check_training_input(x: &[FeatureVector], y: &[bool]) -> Result<()> {
    if x.is_empty() {
        return Err(BotError::Classifier("no training rows".into()));
    }
    if x.len() != y.len() {
        return Err(BotError::Classifier(format!(
            "{} rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if x.iter().flatten().any(|v| !v.is_finite()) {
        return Err(BotError::Classifier("non-finite feature value".into()));
    }
    Ok(())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// A trained (or ready to train) backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TrainedModel {
    Gbdt(GradientBoostedStumps),
    Logistic(LogisticRegression),
}

impl TrainedModel {
    /// Untrained backend selected by config
    pub fn new(config: &TrainingConfig) -> Self {
        match config.backend {
            BackendKind::Gbdt => TrainedModel::Gbdt(GradientBoostedStumps::new(&config.gbdt)),
            BackendKind::Logistic => {
                TrainedModel::Logistic(LogisticRegression::new(&config.logistic))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            TrainedModel::Gbdt(_) => BackendKind::Gbdt.as_str(),
            TrainedModel::Logistic(_) => BackendKind::Logistic.as_str(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Gbdt(m) => m,
            TrainedModel::Logistic(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn fit(&mut self, x: &[FeatureVector], y: &[bool]) -> Result<()> {
        match self {
            TrainedModel::Gbdt(m) => m.fit(x, y),
            TrainedModel::Logistic(m) => m.fit(x, y),
        }
    }

    fn predict_probability(&self, x: &[FeatureVector]) -> Result<Vec<f64>> {
        self.inner().predict_probability(x)
    }
}

/// Contents of one model file on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub station: Station,
    pub scope: WeekdayScope,
    pub version: String,
    /// Input order the model was trained with
    pub feature_names: Vec<String>,
    pub model: TrainedModel,
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(station: Station, scope: WeekdayScope, version: String, model: TrainedModel) -> Self {
        Self {
            station,
            scope,
            version,
            feature_names: FeatureRow::feature_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            model,
            created_at: Utc::now(),
        }
    }

    /// Reject artifacts trained on a different feature layout
    pub fn check_features(&self) -> Result<()> {
        let expected = FeatureRow::feature_names();
        if self.feature_names.len() != expected.len()
            || self.feature_names.iter().zip(expected).any(|(a, b)| a != b)
        {
            return Err(BotError::Integrity(format!(
                "model {} was trained on features {:?}",
                self.version, self.feature_names
            )));
        }
        Ok(())
    }
}
