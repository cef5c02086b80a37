use serde::{Deserialize, Serialize};

use crate::error::{ChurnError, Result};

/// Seam for the estimator behind the pipeline: anything that can learn from
/// a standardized matrix and emit a positive-class probability per row.
pub trait BinaryClassifier {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8]) -> Result<()>;
    fn predict_proba(&self, row: &[f64]) -> f64;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub epochs: u32,
    pub l2: f64,
    /// Gradient multiplier for positive samples; set to neg/pos to
    /// counter class imbalance.
    pub scale_pos_weight: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            epochs: 400,
            l2: 1e-4,
            scale_pos_weight: 1.0,
        }
    }
}

/// Logistic regression fitted by full-batch gradient descent. Deterministic:
/// weights start at zero and no randomness enters the loop, so refitting the
/// same matrix reproduces the same parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogisticModel {
    pub config: LogisticConfig,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            intercept: 0.0,
        }
    }

    pub fn with_scale_pos_weight(scale_pos_weight: f64) -> Self {
        Self::new(LogisticConfig {
            scale_pos_weight,
            ..LogisticConfig::default()
        })
    }
}

impl BinaryClassifier for LogisticModel {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[u8]) -> Result<()> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ChurnError::EmptyInput(
                "training matrix and labels are empty or misaligned",
            ));
        }
        let width = rows[0].len();
        let spw = if self.config.scale_pos_weight.is_finite() && self.config.scale_pos_weight > 0.0
        {
            self.config.scale_pos_weight
        } else {
            1.0
        };

        let mut weights = vec![0.0; width];
        let mut intercept = 0.0;
        let total_weight: f64 = labels
            .iter()
            .map(|&y| if y == 1 { spw } else { 1.0 })
            .sum();

        let mut grad = vec![0.0; width];
        for _ in 0..self.config.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_intercept = 0.0;

            for (row, &y) in rows.iter().zip(labels) {
                let p = sigmoid(intercept + dot(&weights, row));
                let sample_weight = if y == 1 { spw } else { 1.0 };
                let err = sample_weight * (p - f64::from(y));
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_intercept += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= self.config.learning_rate * (g / total_weight + self.config.l2 * *w);
            }
            intercept -= self.config.learning_rate * grad_intercept / total_weight;
        }

        self.weights = weights;
        self.intercept = intercept;
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.intercept + dot(&self.weights, row))
    }
}

fn dot(weights: &[f64], row: &[f64]) -> f64 {
    weights.iter().zip(row).map(|(w, x)| w * x).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
