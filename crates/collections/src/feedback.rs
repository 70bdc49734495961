use serde::{Deserialize, Serialize};

use cashguard_ledger::{ActionLedger, NewOutcome, OutcomeId};

use crate::error::ScheduleResult;
use crate::store::ScheduleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub outcome_id: OutcomeId,
    /// Pending attempts cancelled because the outcome closed the invoice.
    pub cancelled_attempts: usize,
}

/// Log an outcome and, when it closes the invoice (`paid`, `written_off`),
/// cancel the invoice's pending cadence attempts.
///
/// The outcome is written first. If the cancel then fails the outcome stays
/// recorded and the cancel can be retried; it is idempotent.
pub fn record_outcome(
    ledger: &dyn ActionLedger,
    schedules: &dyn ScheduleStore,
    outcome: NewOutcome,
) -> ScheduleResult<FeedbackReport> {
    let invoice_id = outcome.invoice_id.clone();
    let outcome_type = outcome.outcome_type;
    let outcome_id = ledger.log_outcome(outcome)?;

    let cancelled_attempts = if outcome_type.closes_invoice() {
        schedules.cancel_future_actions(&invoice_id, &format!("outcome {outcome_type}"))?
    } else {
        0
    };
    tracing::info!(
        %invoice_id,
        %outcome_type,
        cancelled_attempts,
        "outcome recorded"
    );
    Ok(FeedbackReport {
        outcome_id,
        cancelled_attempts,
    })
}
