use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cashguard_core::TrainingConfig;

use crate::error::{RiskError, RiskResult};

/// L2-regularised logistic regression over standardised features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub run_id: Uuid,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticRegression {
    /// Full-batch gradient descent from a zero start.
    ///
    /// No randomness anywhere: the same rows and config always produce the
    /// same coefficients.
    pub fn fit(
        run_id: Uuid,
        rows: &[Vec<f64>],
        labels: &[bool],
        config: &TrainingConfig,
    ) -> RiskResult<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(RiskError::validation(format!(
                "classifier needs matching rows and labels, got {} and {}",
                rows.len(),
                labels.len()
            )));
        }
        let width = rows[0].len();
        let n = rows.len() as f64;
        let mut weights = vec![0.0; width];
        let mut bias = 0.0;

        let mut grad = vec![0.0; width];
        for _ in 0..config.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;
            for (row, label) in rows.iter().zip(labels) {
                let err = sigmoid(dot(&weights, row) + bias) - if *label { 1.0 } else { 0.0 };
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_bias += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= config.learning_rate * (g / n + config.l2_penalty * *w);
            }
            bias -= config.learning_rate * grad_bias / n;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(RiskError::validation("gradient descent diverged"));
        }
        Ok(Self {
            run_id,
            weights,
            bias,
        })
    }

    pub fn width(&self) -> usize {
        self.weights.len()
    }

    /// Probability of late payment for one standardised row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(dot(&self.weights, row) + self.bias)
    }

    /// |coefficient| normalised to sum to 1 (all zeros stay zero).
    pub fn importances(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().map(|w| w.abs()).sum();
        self.weights
            .iter()
            .map(|w| if total > 0.0 { w.abs() / total } else { 0.0 })
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
