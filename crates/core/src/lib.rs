//! `cashguard-core`: shared building blocks for the receivables workspace.
//!
//! This crate contains **pure domain** primitives (no storage, no model code):
//! identifiers, the error taxonomy, risk tiers, the business calendar and the
//! immutable configuration object.

pub mod calendar;
pub mod category;
pub mod config;
pub mod error;
pub mod id;

pub use calendar::BusinessCalendar;
pub use category::RiskCategory;
pub use config::{
    CadenceAnchor, CadenceConfig, CashGuardConfig, ConfigError, EscalationPolicy,
    FallbackWeights, LedgerConfig, LogFormat, LoggingConfig, RiskTiers, TrainingConfig,
};
pub use error::{DomainError, DomainResult, ItemError};
pub use id::{CustomerId, InvoiceId, PaymentId};
