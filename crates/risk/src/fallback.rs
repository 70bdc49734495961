use cashguard_core::FallbackWeights;

use crate::features::{FeatureRow, FeatureTable};

/// Training-free weighted rule.
///
/// Each component is normalised to [0, 1] before weighting:
/// days overdue over the horizon, amount over the batch quantile, days overdue
/// over the customer's terms, and credit utilization.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackScorer {
    weights: FallbackWeights,
}

impl FallbackScorer {
    pub fn new(weights: FallbackWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &FallbackWeights {
        &self.weights
    }

    /// Scores in row order, whole points in [0, 100].
    pub fn score_table(&self, table: &FeatureTable) -> Vec<f64> {
        let amounts: Vec<f64> = table.rows.iter().map(|r| r.amount_cents as f64).collect();
        let reference = quantile(&amounts, self.weights.amount_quantile);
        table
            .rows
            .iter()
            .map(|row| self.score_row(row, reference))
            .collect()
    }

    /// Score one row against a reference amount (in cents).
    pub fn score_row(&self, row: &FeatureRow, reference_amount_cents: f64) -> f64 {
        let w = &self.weights;
        let overdue = unit(row.days_overdue() / w.overdue_horizon_days);
        let amount = if reference_amount_cents > 0.0 {
            unit(row.amount_cents as f64 / reference_amount_cents)
        } else {
            0.0
        };
        let terms = unit(row.days_overdue() / row.customer_terms_days().max(1.0));
        let utilization = unit(row.credit_utilization());

        let score = 100.0
            * (w.overdue * overdue
                + w.amount * amount
                + w.terms_deviation * terms
                + w.utilization * utilization);
        if score.is_finite() {
            score.round().clamp(0.0, 100.0)
        } else {
            100.0
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Linear-interpolated quantile; 0.0 for an empty batch.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
