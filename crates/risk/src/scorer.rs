//! One scoring contract over the trained model and the fallback rule.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cashguard_core::{CustomerId, FallbackWeights, InvoiceId, ItemError, RiskCategory, RiskTiers};

use crate::artifact::ModelArtifact;
use crate::category::categorize;
use crate::error::RiskResult;
use crate::fallback::FallbackScorer;
use crate::features::FeatureTable;

/// Which path produced a batch of scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreSource {
    Model { run_id: Uuid },
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    /// Whole points in [0, 100].
    pub score: f64,
    pub category: RiskCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBatch {
    pub scores: Vec<RiskScore>,
    /// Rows the feature engineer could not build.
    pub errors: Vec<ItemError>,
    pub source: ScoreSource,
}

#[derive(Debug, Clone)]
pub enum Scorer {
    Trained {
        artifact: ModelArtifact,
        fallback: FallbackScorer,
    },
    Fallback(FallbackScorer),
}

impl Scorer {
    /// Use the trained artifact if it validates, otherwise the fallback rule.
    pub fn new(artifact: Option<ModelArtifact>, weights: FallbackWeights) -> Self {
        let fallback = FallbackScorer::new(weights);
        match artifact {
            Some(artifact) => match artifact.validate() {
                Ok(()) => Self::Trained { artifact, fallback },
                Err(err) => {
                    tracing::warn!(error = %err, "rejecting model artifact, using fallback scorer");
                    Self::Fallback(fallback)
                }
            },
            None => Self::Fallback(fallback),
        }
    }

    /// Load the artifact at `path`; a missing or invalid file selects the
    /// fallback rule.
    pub fn from_artifact_path(path: impl AsRef<Path>, weights: FallbackWeights) -> Self {
        let path = path.as_ref();
        match ModelArtifact::load(path) {
            Ok(artifact) => {
                tracing::info!(run_id = %artifact.run_id, path = %path.display(), "loaded model artifact");
                Self::new(Some(artifact), weights)
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "no usable model artifact, using fallback scorer");
                Self::new(None, weights)
            }
        }
    }

    pub fn fallback(weights: FallbackWeights) -> Self {
        Self::Fallback(FallbackScorer::new(weights))
    }

    pub fn source(&self) -> ScoreSource {
        match self {
            Self::Trained { artifact, .. } => ScoreSource::Model {
                run_id: artifact.run_id,
            },
            Self::Fallback(_) => ScoreSource::Fallback,
        }
    }

    /// Score and categorise every row of `table`, in row order.
    pub fn score(&self, table: &FeatureTable, tiers: &RiskTiers) -> ScoreBatch {
        let raw = match self.score_raw(table) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "model scoring failed, using fallback scorer");
                return self.fallback_batch(table, tiers);
            }
        };
        let scores = table
            .rows
            .iter()
            .zip(raw)
            .map(|(row, score)| RiskScore {
                invoice_id: row.invoice_id.clone(),
                customer_id: row.customer_id.clone(),
                score,
                category: categorize(score, tiers),
            })
            .collect();
        tracing::debug!(rows = table.rows.len(), source = ?self.source(), "scored feature table");
        ScoreBatch {
            scores,
            errors: table.errors.clone(),
            source: self.source(),
        }
    }

    fn score_raw(&self, table: &FeatureTable) -> RiskResult<Vec<f64>> {
        match self {
            Self::Trained { artifact, .. } => {
                artifact.validate()?;
                Ok(table.rows.iter().map(|row| artifact.score_row(row)).collect())
            }
            Self::Fallback(fallback) => Ok(fallback.score_table(table)),
        }
    }

    fn fallback_batch(&self, table: &FeatureTable, tiers: &RiskTiers) -> ScoreBatch {
        let fallback = match self {
            Self::Trained { fallback, .. } | Self::Fallback(fallback) => fallback,
        };
        Scorer::Fallback(fallback.clone()).score(table, tiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FEATURE_COUNT, FeatureRow};
    use crate::training::train;
    use cashguard_core::TrainingConfig;
    use chrono::{Duration, NaiveDate};

    fn table(rows: usize) -> (FeatureTable, Vec<bool>) {
        let base = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let mut table = FeatureTable::default();
        let mut labels = Vec::new();
        for i in 0..rows {
            let late = i % 2 == 0;
            let mut values = [0.0; FEATURE_COUNT];
            values[2] = if late { 40.0 } else { 0.0 };
            values[4] = 30.0;
            values[15] = if late { 0.9 } else { 0.2 };
            let issue = base + Duration::days(i as i64);
            table.rows.push(FeatureRow {
                invoice_id: format!("INV-{i:03}").as_str().into(),
                customer_id: "C-1".into(),
                issue_date: issue,
                due_date: issue + Duration::days(30),
                amount_cents: 50_000 + i as u64,
                outstanding_cents: 50_000 + i as u64,
                values,
            });
            labels.push(late);
        }
        (table, labels)
    }

    #[test]
    fn missing_artifact_selects_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = Scorer::from_artifact_path(dir.path().join("model.json"), FallbackWeights::default());
        assert_eq!(scorer.source(), ScoreSource::Fallback);

        let (rows, _) = table(4);
        let batch = scorer.score(&rows, &RiskTiers::default());
        assert_eq!(batch.scores.len(), 4);
        assert!(batch.scores.iter().all(|s| (0.0..=100.0).contains(&s.score)));
    }

    #[test]
    fn saved_artifact_round_trips_through_disk() {
        let (rows, labels) = table(60);
        let artifact = train(&rows, &labels, &TrainingConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("risk.json");
        artifact.save(&path).unwrap();

        let scorer = Scorer::from_artifact_path(&path, FallbackWeights::default());
        assert_eq!(scorer.source(), ScoreSource::Model { run_id: artifact.run_id });
        let batch = scorer.score(&rows, &RiskTiers::default());
        assert!(batch.scores[0].score > batch.scores[1].score);
    }

    #[test]
    fn swapped_scaler_is_rejected() {
        let (rows, labels) = table(60);
        let mut first = train(&rows, &labels, &TrainingConfig::default()).unwrap();
        let second = train(&rows, &labels, &TrainingConfig::default()).unwrap();
        first.scaler = second.scaler;

        assert!(matches!(first.validate(), Err(crate::RiskError::ModelUnavailable(_))));
        let scorer = Scorer::new(Some(first), FallbackWeights::default());
        assert_eq!(scorer.source(), ScoreSource::Fallback);
    }

    #[test]
    fn tampered_file_falls_back() {
        let (rows, labels) = table(60);
        let mut artifact = train(&rows, &labels, &TrainingConfig::default()).unwrap();
        artifact.feature_columns.pop();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.json");
        artifact.save(&path).unwrap();

        let scorer = Scorer::from_artifact_path(&path, FallbackWeights::default());
        assert_eq!(scorer.source(), ScoreSource::Fallback);
    }
}
