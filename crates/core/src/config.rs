//! Immutable configuration passed into each component at construction.
//!
//! Every section has defaults matching the stock collections policy, so an
//! empty TOML document is a valid configuration. Files are validated on load;
//! components never read ambient process state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::RiskCategory;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CashGuardConfig {
    pub risk_tiers: RiskTiers,
    pub fallback: FallbackWeights,
    pub training: TrainingConfig,
    pub cadence: CadenceConfig,
    pub escalation: EscalationPolicy,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

impl CashGuardConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: CashGuardConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_tiers.validate()?;
        self.fallback.validate()?;
        self.training.validate()?;
        self.cadence.validate()?;
        self.escalation.validate()?;
        if self.ledger.attribution_lookback_days == 0 {
            return Err(ConfigError::invalid(
                "ledger.attribution_lookback_days",
                "must be at least 1 day",
            ));
        }
        Ok(())
    }
}

/// Upper (inclusive) score bound of each tier; `very_high` takes the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskTiers {
    pub low_max: f64,
    pub medium_max: f64,
    pub high_max: f64,
}

impl Default for RiskTiers {
    fn default() -> Self {
        Self {
            low_max: 30.0,
            medium_max: 60.0,
            high_max: 85.0,
        }
    }
}

impl RiskTiers {
    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0.0 <= self.low_max
            && self.low_max < self.medium_max
            && self.medium_max < self.high_max
            && self.high_max < 100.0;
        if !ordered {
            return Err(ConfigError::invalid(
                "risk_tiers",
                format!(
                    "boundaries must satisfy 0 <= low < medium < high < 100, got {}/{}/{}",
                    self.low_max, self.medium_max, self.high_max
                ),
            ));
        }
        Ok(())
    }
}

/// Weight tuple and normalisation horizons of the fallback scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackWeights {
    pub overdue: f64,
    pub amount: f64,
    pub terms_deviation: f64,
    pub utilization: f64,
    /// Days overdue at which the overdue component saturates.
    pub overdue_horizon_days: f64,
    /// Quantile of the batch's amounts that maps to a full amount component.
    pub amount_quantile: f64,
}

impl Default for FallbackWeights {
    fn default() -> Self {
        Self {
            overdue: 0.40,
            amount: 0.20,
            terms_deviation: 0.20,
            utilization: 0.20,
            overdue_horizon_days: 90.0,
            amount_quantile: 0.95,
        }
    }
}

impl FallbackWeights {
    pub fn sum(&self) -> f64 {
        self.overdue + self.amount + self.terms_deviation + self.utilization
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.overdue, self.amount, self.terms_deviation, self.utilization];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "fallback",
                "weights must be finite and non-negative",
            ));
        }
        if (self.sum() - 1.0).abs() > 1e-9 {
            return Err(ConfigError::invalid(
                "fallback",
                format!("weights must sum to 1.0, got {}", self.sum()),
            ));
        }
        if !(self.overdue_horizon_days.is_finite() && self.overdue_horizon_days > 0.0) {
            return Err(ConfigError::invalid(
                "fallback.overdue_horizon_days",
                "must be a positive number of days",
            ));
        }
        if !(self.amount_quantile > 0.0 && self.amount_quantile <= 1.0) {
            return Err(ConfigError::invalid(
                "fallback.amount_quantile",
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Training, split and cross-validation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub cv_folds: usize,
    /// Share of the newest invoices held out for testing.
    pub test_ratio: f64,
    pub min_training_rows: usize,
    /// Days past due after which a settled invoice counts as "paid late".
    pub late_threshold_days: i64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            test_ratio: 0.25,
            min_training_rows: 50,
            late_threshold_days: 7,
            learning_rate: 0.1,
            epochs: 500,
            l2_penalty: 0.01,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cv_folds < 2 {
            return Err(ConfigError::invalid("training.cv_folds", "must be at least 2"));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(ConfigError::invalid(
                "training.test_ratio",
                format!("must be in (0, 1), got {}", self.test_ratio),
            ));
        }
        if self.late_threshold_days < 0 {
            return Err(ConfigError::invalid(
                "training.late_threshold_days",
                "must not be negative",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) || self.epochs == 0 {
            return Err(ConfigError::invalid(
                "training",
                "learning_rate must be positive and epochs non-zero",
            ));
        }
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(ConfigError::invalid("training.l2_penalty", "must be >= 0"));
        }
        Ok(())
    }
}

/// Date every cadence offset is counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CadenceAnchor {
    IssueDate,
    #[default]
    DueDate,
}

/// Day offsets of the follow-up attempts per risk tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub anchor: CadenceAnchor,
    pub low: Vec<u32>,
    pub medium: Vec<u32>,
    pub high: Vec<u32>,
    pub very_high: Vec<u32>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            anchor: CadenceAnchor::DueDate,
            low: vec![7, 14, 21, 30],
            medium: vec![5, 10, 15, 22, 30],
            high: vec![3, 7, 10, 14, 17, 21],
            very_high: vec![1, 3, 5, 7, 9, 12, 15],
        }
    }
}

impl CadenceConfig {
    pub fn offsets_for(&self, category: RiskCategory) -> &[u32] {
        match category {
            RiskCategory::Low => &self.low,
            RiskCategory::Medium => &self.medium,
            RiskCategory::High => &self.high,
            RiskCategory::VeryHigh => &self.very_high,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for category in RiskCategory::ALL {
            let offsets = self.offsets_for(category);
            if offsets.is_empty() {
                return Err(ConfigError::invalid(
                    &format!("cadence.{category}"),
                    "must contain at least one offset",
                ));
            }
            if offsets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ConfigError::invalid(
                    &format!("cadence.{category}"),
                    "offsets must be strictly increasing",
                ));
            }
        }
        Ok(())
    }
}

/// Escalation ladder thresholds.
///
/// This is the single source for both the prioritizer's recommended action and
/// the action label of each cadence attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    pub friendly_reminder_max_overdue: i64,
    pub second_notice_max_overdue: i64,
    pub call_request_max_overdue: i64,
    /// Beyond this many days overdue the account is escalated.
    pub payment_plan_max_overdue: i64,
    /// Prior unsuccessful attempts after which the account is escalated.
    pub escalate_after_attempts: usize,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            friendly_reminder_max_overdue: 7,
            second_notice_max_overdue: 15,
            call_request_max_overdue: 30,
            payment_plan_max_overdue: 60,
            escalate_after_attempts: 3,
        }
    }
}

impl EscalationPolicy {
    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.friendly_reminder_max_overdue >= 0
            && self.friendly_reminder_max_overdue < self.second_notice_max_overdue
            && self.second_notice_max_overdue < self.call_request_max_overdue
            && self.call_request_max_overdue < self.payment_plan_max_overdue;
        if !ordered {
            return Err(ConfigError::invalid(
                "escalation",
                "overdue thresholds must be non-negative and strictly increasing",
            ));
        }
        if self.escalate_after_attempts == 0 {
            return Err(ConfigError::invalid(
                "escalation.escalate_after_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How far back an outcome looks for the action it is attributed to.
    pub attribution_lookback_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            attribution_lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CashGuardConfig::from_toml_str("").unwrap();
        assert_eq!(config, CashGuardConfig::default());
        assert_eq!(config.cadence.offsets_for(RiskCategory::High), &[3, 7, 10, 14, 17, 21]);
        assert_eq!(config.training.cv_folds, 5);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = CashGuardConfig::from_toml_str(
            r#"
            [training]
            cv_folds = 3

            [cadence]
            anchor = "issue_date"
            low = [10, 20]

            [logging]
            format = "pretty"
            "#,
        )
        .unwrap();
        assert_eq!(config.training.cv_folds, 3);
        assert_eq!(config.training.test_ratio, 0.25);
        assert_eq!(config.cadence.anchor, CadenceAnchor::IssueDate);
        assert_eq!(config.cadence.low, vec![10, 20]);
        assert_eq!(config.cadence.medium, vec![5, 10, 15, 22, 30]);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn fallback_weights_must_sum_to_one() {
        let err = CashGuardConfig::from_toml_str(
            r#"
            [fallback]
            overdue = 0.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "fallback"));
    }

    #[test]
    fn tier_boundaries_must_increase() {
        let err = CashGuardConfig::from_toml_str(
            r#"
            [risk_tiers]
            low_max = 70.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "risk_tiers"));
    }

    #[test]
    fn cadence_offsets_must_be_strictly_increasing() {
        let err = CashGuardConfig::from_toml_str(
            r#"
            [cadence]
            high = [3, 3, 10]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "cadence.high"));
    }

    #[test]
    fn single_fold_is_rejected() {
        let mut config = CashGuardConfig::default();
        config.training.cv_folds = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CashGuardConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { path, .. } if path.contains("not/here")));
    }
}
