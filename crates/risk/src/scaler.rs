use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RiskError, RiskResult};

/// Per-column standardisation fitted on a training partition.
///
/// Carries the run id of the training run that fitted it so a scaler can never
/// be paired with a classifier from another run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub run_id: Uuid,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    ///
    /// Constant columns get a scale of 1.0 so they transform to zero.
    pub fn fit<R: AsRef<[f64]>>(run_id: Uuid, rows: &[R]) -> RiskResult<Self> {
        let Some(first) = rows.first() else {
            return Err(RiskError::validation("cannot fit scaler on zero rows"));
        };
        let width = first.as_ref().len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(RiskError::validation("ragged feature matrix"));
            }
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row.as_ref()).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scale {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self {
            run_id,
            mean,
            scale,
        })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform_all<R: AsRef<[f64]>>(&self, rows: &[R]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardises_columns_and_tolerates_constants() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(Uuid::nil(), &rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let rows: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(
            StandardScaler::fit(Uuid::nil(), &rows),
            Err(RiskError::Validation(_))
        ));
    }
}
