//! Collections action ledger.
//!
//! Append-only log of outreach actions, customer responses and invoice
//! outcomes. Outcomes are credited to the action that preceded them, which
//! gives the success and response metrics used to judge the cadence.

pub mod audit;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod record;
pub mod sqlite;
pub mod store;

pub use audit::{AuditLog, HistoryEntry};
pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryActionLedger;
pub use metrics::{ActionEffectiveness, SuccessMetrics};
pub use record::{
    ActionId, ActionRecord, ActionType, Channel, NewAction, NewOutcome, NewResponse, OutcomeId,
    OutcomeRecord, OutcomeType, ResponseId, ResponseRecord, ResponseType,
};
pub use sqlite::SqliteActionLedger;
pub use store::{ActionLedger, LedgerSnapshot, attribute};
