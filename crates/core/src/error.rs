//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// missing references, illegal state transitions). Storage and model concerns
/// wrap this type in their own crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input was malformed or missing required data. Fatal for the operation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. empty).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced invoice, attempt or action does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A transition was attempted on a record that is no longer in a state
    /// that allows it (e.g. completing an attempt twice).
    #[error("state conflict: {0}")]
    StateConflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StateConflict(_))
    }
}

/// One failed item inside a batch operation.
///
/// Batch operations (scoring, schedule generation) never abort on a single bad
/// invoice; they return successes alongside a list of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// Identifier of the item that failed (usually an invoice id).
    pub item_id: String,
    pub error: DomainError,
}

impl ItemError {
    pub fn new(item_id: impl Into<String>, error: DomainError) -> Self {
        Self {
            item_id: item_id.into(),
            error,
        }
    }
}

impl core::fmt::Display for ItemError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.item_id, self.error)
    }
}
