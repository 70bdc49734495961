use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use cashguard_core::{DomainError, DomainResult, InvoiceId};

use crate::cadence::{CadenceSchedule, ScheduledAction};
use crate::error::{ScheduleError, ScheduleResult};
use crate::store::ScheduleStore;

/// Schedules held in process memory. One write guard spans each transition.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    schedules: RwLock<BTreeMap<InvoiceId, CadenceSchedule>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn mutate<T>(
        &self,
        invoice_id: &InvoiceId,
        f: impl FnOnce(&mut CadenceSchedule) -> DomainResult<T>,
    ) -> ScheduleResult<T> {
        let mut schedules = self.schedules.write().map_err(poisoned)?;
        let current = schedules
            .get(invoice_id)
            .ok_or_else(|| DomainError::not_found(format!("schedule for invoice {invoice_id}")))?;
        let mut next = current.clone();
        let out = f(&mut next)?;
        next.check_invariants()?;
        schedules.insert(invoice_id.clone(), next);
        Ok(out)
    }
}

fn poisoned<T>(_: T) -> ScheduleError {
    ScheduleError::storage("schedule lock poisoned")
}

impl ScheduleStore for InMemoryScheduleStore {
    fn insert_schedule(&self, schedule: CadenceSchedule) -> ScheduleResult<()> {
        schedule.check_invariants()?;
        let mut schedules = self.schedules.write().map_err(poisoned)?;
        if schedules
            .get(&schedule.invoice_id)
            .is_some_and(CadenceSchedule::has_pending)
        {
            return Err(DomainError::conflict(format!(
                "invoice {} still has pending attempts",
                schedule.invoice_id
            ))
            .into());
        }
        schedules.insert(schedule.invoice_id.clone(), schedule);
        Ok(())
    }

    fn schedule(&self, invoice_id: &InvoiceId) -> ScheduleResult<Option<CadenceSchedule>> {
        Ok(self.schedules.read().map_err(poisoned)?.get(invoice_id).cloned())
    }

    fn schedules(&self) -> ScheduleResult<Vec<CadenceSchedule>> {
        Ok(self.schedules.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn reschedule_action(
        &self,
        invoice_id: &InvoiceId,
        attempt: u32,
        new_date: NaiveDate,
        reason: &str,
    ) -> ScheduleResult<ScheduledAction> {
        let action = self.mutate(invoice_id, |s| s.reschedule(attempt, new_date, reason).cloned())?;
        tracing::info!(%invoice_id, attempt, %new_date, reason, "attempt rescheduled");
        Ok(action)
    }

    fn cancel_future_actions(&self, invoice_id: &InvoiceId, reason: &str) -> ScheduleResult<usize> {
        let mut schedules = self.schedules.write().map_err(poisoned)?;
        let Some(schedule) = schedules.get_mut(invoice_id) else {
            return Ok(0);
        };
        let cancelled = schedule.cancel_pending(reason);
        if cancelled > 0 {
            tracing::info!(%invoice_id, cancelled, reason, "pending attempts cancelled");
        }
        Ok(cancelled)
    }

    fn mark_completed(
        &self,
        invoice_id: &InvoiceId,
        attempt: u32,
        notes: Option<&str>,
    ) -> ScheduleResult<ScheduledAction> {
        self.mutate(invoice_id, |s| s.complete(attempt, notes).cloned())
    }
}
