use std::path::PathBuf;

use thiserror::Error;

use cashguard_core::DomainError;

pub type RiskResult<T> = Result<T, RiskError>;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Training refused: not enough labelled rows.
    #[error("insufficient training data: {available} available, {required} required")]
    InsufficientData { available: usize, required: usize },

    /// The training partition holds one class only.
    #[error("training partition has a single class: {late} late, {on_time} on time")]
    SingleClass { late: usize, on_time: usize },

    /// The trained model cannot be used. Callers switch to the fallback scorer.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RiskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<DomainError> for RiskError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}
