//! Schedule persistence.
//!
//! Every transition is applied to a copy of the invoice's schedule, checked,
//! and only then made visible. A failed transition leaves the stored schedule
//! untouched.

mod memory;
mod sqlite;

pub use memory::InMemoryScheduleStore;
pub use sqlite::SqliteScheduleStore;

use chrono::NaiveDate;

use cashguard_core::InvoiceId;

use crate::cadence::{CadenceSchedule, ScheduledAction};
use crate::error::{ScheduleError, ScheduleResult};
use crate::scheduler;

pub trait ScheduleStore: Send + Sync {
    /// Store a freshly generated schedule, replacing a closed one.
    ///
    /// Fails with `StateConflict` while the invoice still has pending attempts.
    fn insert_schedule(&self, schedule: CadenceSchedule) -> ScheduleResult<()>;

    fn schedule(&self, invoice_id: &InvoiceId) -> ScheduleResult<Option<CadenceSchedule>>;

    /// Consistent copy of every schedule, ordered by invoice id.
    fn schedules(&self) -> ScheduleResult<Vec<CadenceSchedule>>;

    /// Replace the pending entry of `attempt` with one dated `new_date`.
    /// Returns the new entry.
    fn reschedule_action(
        &self,
        invoice_id: &InvoiceId,
        attempt: u32,
        new_date: NaiveDate,
        reason: &str,
    ) -> ScheduleResult<ScheduledAction>;

    /// Cancel all pending attempts of the invoice. Unknown invoices and
    /// schedules with nothing pending are a no-op. Returns how many changed.
    fn cancel_future_actions(&self, invoice_id: &InvoiceId, reason: &str) -> ScheduleResult<usize>;

    fn mark_completed(
        &self,
        invoice_id: &InvoiceId,
        attempt: u32,
        notes: Option<&str>,
    ) -> ScheduleResult<ScheduledAction>;

    fn get_due_actions(&self, as_of: NaiveDate) -> ScheduleResult<Vec<ScheduledAction>> {
        Ok(scheduler::get_due_actions(&self.schedules()?, as_of))
    }

    /// Insert every schedule that is accepted; return the rejected ones.
    fn insert_batch(&self, schedules: Vec<CadenceSchedule>) -> Vec<(InvoiceId, ScheduleError)> {
        let mut rejected = Vec::new();
        for schedule in schedules {
            let invoice_id = schedule.invoice_id.clone();
            if let Err(err) = self.insert_schedule(schedule) {
                rejected.push((invoice_id, err));
            }
        }
        rejected
    }
}
