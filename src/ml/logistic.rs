//! Logistic regression baseline
//!
//! Full-batch gradient descent on standardized inputs with an L2 penalty.
//! Deterministic: no sampling, zero-initialised weights.

use serde::{Deserialize, Serialize};

use super::classifier::{check_training_input, sigmoid, Classifier};
use super::features::{FeatureVector, FEATURE_COUNT};
use crate::config::LogisticParams;
use crate::error::{BotError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    epochs: usize,
    learning_rate: f64,
    l2: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn new(params: &LogisticParams) -> Self {
        Self {
            epochs: params.epochs,
            learning_rate: params.learning_rate,
            l2: params.l2,
            means: vec![0.0; FEATURE_COUNT],
            scales: vec![1.0; FEATURE_COUNT],
            weights: vec![0.0; FEATURE_COUNT],
            bias: 0.0,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn standardize(&self, row: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for f in 0..FEATURE_COUNT {
            out[f] = (row[f] - self.means[f]) / self.scales[f];
        }
        out
    }

    fn linear(&self, z: &[f64; FEATURE_COUNT]) -> f64 {
        self.bias + z.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>()
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &[FeatureVector], y: &[bool]) -> Result<()> {
        check_training_input(x, y)?;
        let n = x.len() as f64;

        for f in 0..FEATURE_COUNT {
            let mean = x.iter().map(|r| r[f]).sum::<f64>() / n;
            let var = x.iter().map(|r| (r[f] - mean).powi(2)).sum::<f64>() / n;
            self.means[f] = mean;
            // constant columns pass through unscaled
            self.scales[f] = if var > 0.0 { var.sqrt() } else { 1.0 };
        }

        let z: Vec<[f64; FEATURE_COUNT]> = x.iter().map(|r| self.standardize(r)).collect();
        self.weights = vec![0.0; FEATURE_COUNT];
        self.bias = 0.0;

        for _ in 0..self.epochs {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;
            for (row, label) in z.iter().zip(y) {
                let err = sigmoid(self.linear(row)) - if *label { 1.0 } else { 0.0 };
                for f in 0..FEATURE_COUNT {
                    grad_w[f] += err * row[f];
                }
                grad_b += err;
            }
            for f in 0..FEATURE_COUNT {
                let g = grad_w[f] / n + self.l2 * self.weights[f];
                self.weights[f] -= self.learning_rate * g;
            }
            self.bias -= self.learning_rate * grad_b / n;
        }

        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err(BotError::Classifier("logistic regression diverged".into()));
        }
        Ok(())
    }

    fn predict_probability(&self, x: &[FeatureVector]) -> Result<Vec<f64>> {
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(BotError::Classifier("non-finite feature value".into()));
        }
        Ok(x
            .iter()
            .map(|row| sigmoid(self.linear(&self.standardize(row))))
            .collect())
    }
}
