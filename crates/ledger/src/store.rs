//! Ledger abstraction and the read model every backend shares.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use cashguard_core::{CustomerId, InvoiceId};

use crate::audit::{self, HistoryEntry};
use crate::error::LedgerResult;
use crate::metrics::{self, ActionEffectiveness, SuccessMetrics};
use crate::record::{
    ActionId, ActionRecord, ActionType, NewAction, NewOutcome, NewResponse, OutcomeId,
    OutcomeRecord, OutcomeType, ResponseId, ResponseRecord,
};

/// Append-only record of collections actions, responses and outcomes.
///
/// Backends implement the three writes and [`ActionLedger::snapshot`]; every
/// report is computed from one snapshot so it never mixes two states.
pub trait ActionLedger: Send + Sync {
    fn log_action(&self, action: NewAction) -> LedgerResult<ActionId>;

    /// Fails with `NotFound` when `action_id` was never logged.
    fn log_response(&self, action_id: ActionId, response: NewResponse) -> LedgerResult<ResponseId>;

    /// Attributes the outcome to an earlier action before storing it.
    fn log_outcome(&self, outcome: NewOutcome) -> LedgerResult<OutcomeId>;

    /// Consistent copy of every record, ordered by id.
    fn snapshot(&self) -> LedgerResult<LedgerSnapshot>;

    fn calculate_success_metrics(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        action_type: Option<ActionType>,
    ) -> LedgerResult<SuccessMetrics> {
        Ok(metrics::success_metrics(&self.snapshot()?, start, end, action_type))
    }

    fn get_invoice_history(&self, invoice_id: &InvoiceId) -> LedgerResult<Vec<HistoryEntry>> {
        Ok(audit::invoice_history(&self.snapshot()?, invoice_id))
    }

    fn get_customer_history(&self, customer_id: &CustomerId) -> LedgerResult<Vec<HistoryEntry>> {
        Ok(audit::customer_history(&self.snapshot()?, customer_id))
    }

    fn action_effectiveness(&self) -> LedgerResult<Vec<ActionEffectiveness>> {
        Ok(metrics::action_effectiveness(&self.snapshot()?))
    }

    /// Write every record dated within `[start, end]` to `path` as JSON.
    /// Returns the number of records written.
    fn export_audit_log(&self, path: &Path, start: NaiveDate, end: NaiveDate) -> LedgerResult<usize> {
        audit::export(&self.snapshot()?, path, start, end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub actions: Vec<ActionRecord>,
    pub responses: Vec<ResponseRecord>,
    pub outcomes: Vec<OutcomeRecord>,
}

impl LedgerSnapshot {
    pub fn action(&self, action_id: ActionId) -> Option<&ActionRecord> {
        self.actions.iter().find(|a| a.action_id == action_id)
    }

    pub fn actions_for(&self, invoice_id: &InvoiceId) -> impl Iterator<Item = &ActionRecord> {
        self.actions.iter().filter(move |a| &a.invoice_id == invoice_id)
    }

    pub fn outcomes_for(&self, invoice_id: &InvoiceId) -> impl Iterator<Item = &OutcomeRecord> {
        self.outcomes.iter().filter(move |o| &o.invoice_id == invoice_id)
    }

    /// Invoices with at least one `paid` outcome.
    pub fn paid_invoices(&self) -> BTreeSet<InvoiceId> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome_type == OutcomeType::Paid)
            .map(|o| o.invoice_id.clone())
            .collect()
    }
}

/// The most recent action on `invoice_id` logged at or before `at` and no
/// more than `lookback_days` earlier. Equal timestamps go to the higher id.
pub fn attribute<'a>(
    actions: impl IntoIterator<Item = &'a ActionRecord>,
    invoice_id: &InvoiceId,
    at: DateTime<Utc>,
    lookback_days: i64,
) -> Option<ActionId> {
    let earliest = at - Duration::days(lookback_days);
    actions
        .into_iter()
        .filter(|a| &a.invoice_id == invoice_id && a.logged_at <= at && a.logged_at >= earliest)
        .max_by_key(|a| (a.logged_at, a.action_id))
        .map(|a| a.action_id)
}
