//! Top-k pair prediction
//!
//! Scores a complete 100-row feature table with a trained classifier and
//! keeps the k most probable pairs. Ranking is deterministic: probability
//! descending, then pair ascending.
//!
//! Usage:
//! ```ignore
//! let predictor = Predictor::new(3);
//! let prediction = predictor.predict(&artifact.model, &artifact.version, &rows)?;
//! ```

use super::classifier::Classifier;
use super::features::{validate_feature_set, FeatureRow, FeatureVector};
use super::metrics::rank_top_k;
use crate::error::{BotError, Result};
use crate::types::{Prediction, RankedPair};

#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    top_k: usize,
}

impl Predictor {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank all pairs of one feature table and keep the top k
    pub fn rank(&self, model: &dyn Classifier, rows: &[FeatureRow]) -> Result<Vec<RankedPair>> {
        validate_feature_set(rows)?;

        let x: Vec<FeatureVector> = rows.iter().map(|r| r.to_vector()).collect();
        let probs = model.predict_probability(&x)?;
        if probs.len() != rows.len() {
            return Err(BotError::Classifier(format!(
                "{} probabilities for {} rows",
                probs.len(),
                rows.len()
            )));
        }

        Ok(rank_top_k(
            rows.iter().zip(probs).map(|(r, p)| (r.pair, p)),
            self.top_k,
        ))
    }

    pub fn predict(
        &self,
        model: &dyn Classifier,
        model_version: &str,
        rows: &[FeatureRow],
    ) -> Result<Prediction> {
        let ranked = self.rank(model, rows)?;
        // rank() has validated the table is non-empty
        let first = &rows[0];

        tracing::debug!(
            "{} {}: top {:?}",
            first.station,
            first.target_date,
            ranked.iter().map(|r| r.pair).collect::<Vec<_>>()
        );

        Ok(Prediction {
            prediction_date: first.target_date,
            station: first.station.clone(),
            ranked,
            model_version: model_version.to_string(),
        })
    }
}
