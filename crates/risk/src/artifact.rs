//! The persisted model bundle.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::LogisticRegression;
use crate::error::{RiskError, RiskResult};
use crate::features::{FEATURE_COLUMNS, FEATURE_COUNT, FeatureRow};
use crate::scaler::StandardScaler;

/// Mean and population std of one metric across CV folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: var.sqrt(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Share of late-paid rows in the training partition.
    pub train_late_rate: f64,
    pub cv_folds: usize,
    pub cv_accuracy: Option<MetricSummary>,
    /// Folds holding a single class are left out of the AUC summary.
    pub cv_roc_auc: Option<MetricSummary>,
    pub test_accuracy: f64,
    pub test_roc_auc: Option<f64>,
}

/// Output of one training run. Read-only once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub scaler: StandardScaler,
    pub classifier: LogisticRegression,
    pub feature_importances: Vec<(String, f64)>,
    pub report: TrainingReport,
}

impl ModelArtifact {
    /// Check that every component belongs to this run and matches the current
    /// feature layout.
    pub fn validate(&self) -> RiskResult<()> {
        if self.scaler.run_id != self.run_id {
            return Err(RiskError::unavailable(format!(
                "scaler was fitted by run {}, artifact is run {}",
                self.scaler.run_id, self.run_id
            )));
        }
        if self.classifier.run_id != self.run_id {
            return Err(RiskError::unavailable(format!(
                "classifier was fitted by run {}, artifact is run {}",
                self.classifier.run_id, self.run_id
            )));
        }
        if self.feature_columns.len() != FEATURE_COUNT
            || self
                .feature_columns
                .iter()
                .zip(FEATURE_COLUMNS)
                .any(|(stored, current)| stored != current)
        {
            return Err(RiskError::unavailable(
                "feature columns differ from the current feature layout",
            ));
        }
        if self.scaler.width() != FEATURE_COUNT
            || self.scaler.scale.len() != FEATURE_COUNT
            || self.classifier.width() != FEATURE_COUNT
        {
            return Err(RiskError::unavailable(format!(
                "component dimensions (scaler {}, classifier {}) do not match {FEATURE_COUNT} columns",
                self.scaler.width(),
                self.classifier.width()
            )));
        }
        let finite = self
            .scaler
            .mean
            .iter()
            .chain(&self.scaler.scale)
            .chain(&self.classifier.weights)
            .all(|v| v.is_finite())
            && self.classifier.bias.is_finite()
            && self.scaler.scale.iter().all(|s| *s > 0.0);
        if !finite {
            return Err(RiskError::unavailable("artifact holds non-finite parameters"));
        }
        Ok(())
    }

    /// Late-payment probability scaled to whole points in [0, 100].
    pub fn score_row(&self, row: &FeatureRow) -> f64 {
        let scaled = self.scaler.transform(&row.values);
        (self.classifier.predict_proba(&scaled) * 100.0)
            .round()
            .clamp(0.0, 100.0)
    }

    /// Write as JSON to a run-specific temp file next to `path`, flush it to
    /// disk and rename into place.
    pub fn save(&self, path: impl AsRef<Path>) -> RiskResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RiskError::io(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.tmp", self.run_id));
        let tmp = PathBuf::from(tmp);

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(RiskError::io(&tmp, e));
        }
        fs::rename(&tmp, path).map_err(|e| RiskError::io(path, e))?;
        tracing::info!(run_id = %self.run_id, path = %path.display(), "model artifact saved");
        Ok(())
    }

    /// Read and validate. Any binding failure surfaces as `ModelUnavailable`.
    pub fn load(path: impl AsRef<Path>) -> RiskResult<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|e| RiskError::io(path, e))?;
        let artifact: Self = serde_json::from_slice(&raw)?;
        artifact.validate()?;
        Ok(artifact)
    }
}
