//! Gradient-boosted decision stumps
//!
//! Logistic-loss boosting with one split per round. Candidate thresholds
//! are quantiles of each feature, so a round is a histogram pass over the
//! sampled rows. Row subsampling uses a seeded RNG and the fitted model is
//! reproducible for a given seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::classifier::{check_training_input, sigmoid, Classifier};
use super::features::{FeatureVector, FEATURE_COUNT};
use crate::config::GbdtParams;
use crate::error::{BotError, Result};

/// L2 penalty on leaf values
const LEAF_LAMBDA: f64 = 1.0;

/// Clamp of the base rate before taking its log-odds
const BASE_RATE_CLAMP: f64 = 1e-6;

/// One split: `value < threshold` goes left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn apply(&self, x: &FeatureVector) -> f64 {
        if x[self.feature] < self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedStumps {
    n_estimators: usize,
    learning_rate: f64,
    subsample: f64,
    bins: usize,
    seed: u64,
    base_score: f64,
    stumps: Vec<Stump>,
}

impl GradientBoostedStumps {
    pub fn new(params: &GbdtParams) -> Self {
        Self {
            n_estimators: params.n_estimators,
            learning_rate: params.learning_rate,
            subsample: params.subsample.clamp(0.0, 1.0),
            bins: params.bins.max(1),
            seed: params.seed,
            base_score: 0.0,
            stumps: Vec::new(),
        }
    }

    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }

    fn raw_score(&self, x: &FeatureVector) -> f64 {
        self.base_score + self.stumps.iter().map(|s| s.apply(x)).sum::<f64>()
    }

    /// Sorted, distinct quantile thresholds of one feature column
    fn thresholds(&self, column: &mut Vec<f64>) -> Vec<f64> {
        column.sort_by(f64::total_cmp);
        column.dedup();
        if column.len() < 2 {
            return Vec::new();
        }
        // splitting below the minimum is a no-op
        let candidates = &column[1..];
        if candidates.len() <= self.bins {
            return candidates.to_vec();
        }
        let mut out: Vec<f64> = (1..=self.bins)
            .map(|q| candidates[q * candidates.len() / (self.bins + 1)])
            .collect();
        out.dedup();
        out
    }
}

impl Classifier for GradientBoostedStumps {
    fn fit(&mut self, x: &[FeatureVector], y: &[bool]) -> Result<()> {
        check_training_input(x, y)?;
        let n = x.len();

        let positives = y.iter().filter(|l| **l).count() as f64;
        let rate = (positives / n as f64).clamp(BASE_RATE_CLAMP, 1.0 - BASE_RATE_CLAMP);
        self.base_score = (rate / (1.0 - rate)).ln();
        self.stumps.clear();

        // Per feature: thresholds, and each row's bin (count of thresholds <= value)
        let mut thresholds: Vec<Vec<f64>> = Vec::with_capacity(FEATURE_COUNT);
        let mut bins: Vec<Vec<usize>> = Vec::with_capacity(FEATURE_COUNT);
        for f in 0..FEATURE_COUNT {
            let mut column: Vec<f64> = x.iter().map(|row| row[f]).collect();
            let t = self.thresholds(&mut column);
            bins.push(
                x.iter()
                    .map(|row| t.partition_point(|th| *th <= row[f]))
                    .collect(),
            );
            thresholds.push(t);
        }

        let mut scores = vec![self.base_score; n];
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut sampled = vec![false; n];

        for _ in 0..self.n_estimators {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = if y[i] { 1.0 - p } else { -p };
                hess[i] = p * (1.0 - p);
                sampled[i] = rng.random::<f64>() < self.subsample;
            }

            let mut best: Option<(f64, Stump)> = None;
            for f in 0..FEATURE_COUNT {
                let t = &thresholds[f];
                if t.is_empty() {
                    continue;
                }
                let mut hist_g = vec![0.0; t.len() + 1];
                let mut hist_h = vec![0.0; t.len() + 1];
                for i in (0..n).filter(|i| sampled[*i]) {
                    hist_g[bins[f][i]] += grad[i];
                    hist_h[bins[f][i]] += hess[i];
                }
                let total_g: f64 = hist_g.iter().sum();
                let total_h: f64 = hist_h.iter().sum();

                let (mut left_g, mut left_h) = (0.0, 0.0);
                for (j, threshold) in t.iter().enumerate() {
                    left_g += hist_g[j];
                    left_h += hist_h[j];
                    let right_g = total_g - left_g;
                    let right_h = total_h - left_h;
                    let gain = left_g * left_g / (left_h + LEAF_LAMBDA)
                        + right_g * right_g / (right_h + LEAF_LAMBDA);
                    if best.as_ref().map_or(true, |(g, _)| gain > *g) {
                        best = Some((
                            gain,
                            Stump {
                                feature: f,
                                threshold: *threshold,
                                left: self.learning_rate * left_g / (left_h + LEAF_LAMBDA),
                                right: self.learning_rate * right_g / (right_h + LEAF_LAMBDA),
                            },
                        ));
                    }
                }
            }

            // every feature constant: nothing left to split on
            let Some((_, stump)) = best else {
                break;
            };
            for (score, row) in scores.iter_mut().zip(x) {
                *score += stump.apply(row);
            }
            self.stumps.push(stump);
        }

        tracing::debug!(
            "Fitted {} stumps on {} rows (base rate {:.4})",
            self.stumps.len(),
            n,
            rate
        );
        Ok(())
    }

    fn predict_probability(&self, x: &[FeatureVector]) -> Result<Vec<f64>> {
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(BotError::Classifier("non-finite feature value".into()));
        }
        Ok(x.iter().map(|row| sigmoid(self.raw_score(row))).collect())
    }
}
