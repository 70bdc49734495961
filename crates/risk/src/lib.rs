//! Late-payment risk scoring.
//!
//! Feature engineering over a [`cashguard_receivables::ReceivablesDataset`],
//! a trainable logistic model persisted as a [`ModelArtifact`], a
//! deterministic fallback rule, and the score → tier mapping.
//!
//! Scoring never fails as a whole: a missing or invalid artifact selects the
//! fallback rule, and rows that cannot be built are reported per invoice.

pub mod artifact;
pub mod category;
pub mod classifier;
pub mod error;
pub mod fallback;
pub mod features;
pub mod scaler;
pub mod scorer;
pub mod training;

pub use artifact::{MetricSummary, ModelArtifact, TrainingReport};
pub use category::categorize;
pub use classifier::LogisticRegression;
pub use error::{RiskError, RiskResult};
pub use fallback::FallbackScorer;
pub use features::{
    CustomerHistory, Exposure, FEATURE_COLUMNS, FEATURE_COUNT, FeatureRow, FeatureTable,
    build_row, customer_history, engineer_features, training_features,
};
pub use scaler::StandardScaler;
pub use scorer::{RiskScore, ScoreBatch, ScoreSource, Scorer};
pub use training::train;
