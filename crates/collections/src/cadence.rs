//! Cadence schedule state machine.
//!
//! A schedule is the ordered list of follow-up attempts for one invoice. Each
//! entry moves `pending → {completed | cancelled | rescheduled}` exactly once;
//! rescheduling appends a fresh `pending` entry for the same attempt number.

use core::fmt;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, DomainError, DomainResult, InvoiceId, RiskCategory};
use cashguard_ledger::ActionType;

/// Status of one scheduled attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for its date
    Pending,
    /// Carried out
    Completed,
    /// Withdrawn (invoice paid, written off, or closed by the caller)
    Cancelled,
    /// Replaced by a newer entry with the same attempt number
    Rescheduled,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Completed => "completed",
            ActionStatus::Cancelled => "cancelled",
            ActionStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "completed" => Ok(ActionStatus::Completed),
            "cancelled" => Ok(ActionStatus::Cancelled),
            "rescheduled" => Ok(ActionStatus::Rescheduled),
            other => Err(DomainError::validation(format!("unknown action status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    /// 1-based; shared by an entry and its reschedule replacements.
    pub attempt_number: u32,
    pub scheduled_date: NaiveDate,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub risk_category: RiskCategory,
    pub amount_cents: u64,
    /// Reason or notes recorded with the last transition.
    pub note: Option<String>,
}

impl ScheduledAction {
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }
}

/// All entries for one invoice, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceSchedule {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub risk_category: RiskCategory,
    pub amount_cents: u64,
    pub actions: Vec<ScheduledAction>,
}

impl CadenceSchedule {
    pub fn has_pending(&self) -> bool {
        self.actions.iter().any(ScheduledAction::is_pending)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledAction> {
        self.actions.iter().filter(|a| a.is_pending())
    }

    /// Highest attempt number in the schedule.
    pub fn attempts(&self) -> u32 {
        self.actions.iter().map(|a| a.attempt_number).max().unwrap_or(0)
    }

    /// Index of the pending entry for `attempt`.
    ///
    /// `NotFound` if the attempt was never scheduled, `StateConflict` if it
    /// was but has already left `pending`.
    fn pending_slot(&self, attempt: u32) -> DomainResult<usize> {
        let mut seen = false;
        for (idx, action) in self.actions.iter().enumerate() {
            if action.attempt_number != attempt {
                continue;
            }
            if action.is_pending() {
                return Ok(idx);
            }
            seen = true;
        }
        if seen {
            Err(DomainError::conflict(format!(
                "attempt {attempt} of invoice {} has no pending entry",
                self.invoice_id
            )))
        } else {
            Err(DomainError::not_found(format!(
                "attempt {attempt} of invoice {}",
                self.invoice_id
            )))
        }
    }

    /// Mark the pending entry `rescheduled` and append its replacement.
    pub fn reschedule(&mut self, attempt: u32, new_date: NaiveDate, reason: &str) -> DomainResult<&ScheduledAction> {
        let idx = self.pending_slot(attempt)?;
        let old = &mut self.actions[idx];
        let old_date = old.scheduled_date;
        old.status = ActionStatus::Rescheduled;
        old.note = Some(format!("rescheduled to {new_date}: {reason}"));

        let mut replacement = old.clone();
        replacement.status = ActionStatus::Pending;
        replacement.scheduled_date = new_date;
        replacement.note = Some(format!("rescheduled from {old_date}: {reason}"));
        self.actions.push(replacement);
        Ok(&self.actions[self.actions.len() - 1])
    }

    /// Cancel every pending entry. Returns how many changed.
    pub fn cancel_pending(&mut self, reason: &str) -> usize {
        let mut cancelled = 0;
        for action in self.actions.iter_mut().filter(|a| a.is_pending()) {
            action.status = ActionStatus::Cancelled;
            action.note = Some(format!("cancelled: {reason}"));
            cancelled += 1;
        }
        cancelled
    }

    pub fn complete(&mut self, attempt: u32, notes: Option<&str>) -> DomainResult<&ScheduledAction> {
        let idx = self.pending_slot(attempt)?;
        let action = &mut self.actions[idx];
        action.status = ActionStatus::Completed;
        if let Some(notes) = notes {
            action.note = Some(notes.to_string());
        }
        Ok(&self.actions[idx])
    }

    /// Attempt numbers are contiguous from 1 and each has at most one pending
    /// entry.
    pub fn check_invariants(&self) -> DomainResult<()> {
        for action in &self.actions {
            if action.attempt_number == 0 || action.invoice_id != self.invoice_id {
                return Err(DomainError::invariant(format!(
                    "schedule of invoice {} holds a foreign or zero attempt",
                    self.invoice_id
                )));
            }
            // Contiguous numbering never exceeds the entry count.
            if action.attempt_number as usize > self.actions.len() {
                return Err(DomainError::invariant(format!(
                    "attempt {} of invoice {} is past its {} entries",
                    action.attempt_number,
                    self.invoice_id,
                    self.actions.len()
                )));
            }
        }
        let slots = self.attempts() as usize + 1;
        let mut pending = vec![0u32; slots];
        let mut present = vec![false; slots];
        for action in &self.actions {
            let slot = action.attempt_number as usize;
            present[slot] = true;
            if action.is_pending() {
                pending[slot] += 1;
            }
        }
        if present.iter().skip(1).any(|p| !p) {
            return Err(DomainError::invariant(format!(
                "attempt numbers of invoice {} are not contiguous",
                self.invoice_id
            )));
        }
        if let Some(slot) = pending.iter().position(|n| *n > 1) {
            return Err(DomainError::invariant(format!(
                "attempt {slot} of invoice {} has {} pending entries",
                self.invoice_id, pending[slot]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn schedule() -> CadenceSchedule {
        let action = |attempt, day| ScheduledAction {
            invoice_id: "INV-1".into(),
            customer_id: "C-1".into(),
            attempt_number: attempt,
            scheduled_date: date(2, day),
            action_type: ActionType::FriendlyReminder,
            status: ActionStatus::Pending,
            risk_category: RiskCategory::Low,
            amount_cents: 1_000,
            note: None,
        };
        CadenceSchedule {
            invoice_id: "INV-1".into(),
            customer_id: "C-1".into(),
            risk_category: RiskCategory::Low,
            amount_cents: 1_000,
            actions: vec![action(1, 7), action(2, 14)],
        }
    }

    #[test]
    fn out_of_range_attempt_numbers_are_rejected() {
        let mut s = schedule();
        s.actions[1].attempt_number = u32::MAX;
        assert!(s.check_invariants().is_err());

        let mut gap = schedule();
        gap.actions[1].attempt_number = 3;
        assert!(gap.check_invariants().is_err());

        let mut zero = schedule();
        zero.actions[0].attempt_number = 0;
        assert!(zero.check_invariants().is_err());
    }

    #[test]
    fn reschedule_replaces_the_pending_entry() {
        let mut s = schedule();
        let replacement = s.reschedule(1, date(2, 9), "customer asked").unwrap().clone();
        assert_eq!(replacement.attempt_number, 1);
        assert_eq!(replacement.scheduled_date, date(2, 9));
        assert_eq!(s.actions[0].status, ActionStatus::Rescheduled);
        assert_eq!(s.pending().count(), 2);
        s.check_invariants().unwrap();
    }

    #[test]
    fn transitions_on_closed_attempts_conflict() {
        let mut s = schedule();
        s.complete(1, Some("called")).unwrap();
        assert!(s.complete(1, None).unwrap_err().is_conflict());
        assert!(s.reschedule(1, date(3, 1), "late").unwrap_err().is_conflict());
        assert!(s.complete(9, None).unwrap_err().is_not_found());
    }

    #[test]
    fn cancel_is_idempotent_and_spares_completed() {
        let mut s = schedule();
        s.complete(1, None).unwrap();
        assert_eq!(s.cancel_pending("paid"), 1);
        assert_eq!(s.cancel_pending("paid"), 0);
        assert_eq!(s.actions[0].status, ActionStatus::Completed);
        assert_eq!(s.actions[1].status, ActionStatus::Cancelled);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ActionStatus::Pending,
            ActionStatus::Completed,
            ActionStatus::Cancelled,
            ActionStatus::Rescheduled,
        ] {
            assert_eq!(status.as_str().parse::<ActionStatus>().unwrap(), status);
        }
    }
}
