//! Ranked action list over scored open invoices.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, EscalationPolicy, InvoiceId, RiskCategory};
use cashguard_ledger::{ActionType, LedgerSnapshot};

use crate::cadence::ScheduledAction;
use crate::recommend::recommend_action;

/// An open invoice joined with its risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredInvoice {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub score: f64,
    pub category: RiskCategory,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub amount_cents: u64,
    pub outstanding_cents: u64,
}

impl ScoredInvoice {
    /// Risk score weighted by the invoice amount, in currency units.
    pub fn priority(&self) -> f64 {
        self.score * (self.amount_cents as f64 / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prioritized {
    pub invoice: ScoredInvoice,
    pub priority: f64,
    pub recommended_action: ActionType,
    /// Actions already logged for the invoice, oldest first.
    pub prior_actions: Vec<ActionType>,
}

/// Rank scored invoices and attach the next recommended action.
///
/// Invoices with a `paid` outcome in the ledger are left out. Order is
/// priority descending, then earliest due date, then invoice id. At most
/// `top_n` entries are returned.
pub fn prioritize(
    scored: &[ScoredInvoice],
    ledger: &LedgerSnapshot,
    policy: &EscalationPolicy,
    top_n: usize,
) -> Vec<Prioritized> {
    let paid = ledger.paid_invoices();
    let mut ranked: Vec<Prioritized> = scored
        .iter()
        .filter(|s| !paid.contains(&s.invoice_id))
        .map(|s| {
            let mut history: Vec<_> = ledger.actions_for(&s.invoice_id).collect();
            history.sort_by_key(|a| (a.logged_at, a.action_id));
            let prior_actions: Vec<ActionType> = history.iter().map(|a| a.action_type).collect();
            Prioritized {
                priority: s.priority(),
                recommended_action: recommend_action(policy, s.category, s.days_overdue, &prior_actions),
                prior_actions,
                invoice: s.clone(),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.invoice.due_date.cmp(&b.invoice.due_date))
            .then_with(|| a.invoice.invoice_id.cmp(&b.invoice.invoice_id))
    });
    ranked.truncate(top_n);

    tracing::debug!(
        candidates = scored.len(),
        skipped_paid = scored.len() - scored.iter().filter(|s| !paid.contains(&s.invoice_id)).count(),
        returned = ranked.len(),
        "prioritized invoices"
    );
    ranked
}

/// What the message renderer needs to produce one outreach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachRequest {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub action_type: ActionType,
    pub risk_category: RiskCategory,
    /// Set when the request comes from a cadence attempt.
    pub attempt_number: Option<u32>,
}

pub fn to_outreach(ranked: &[Prioritized]) -> Vec<OutreachRequest> {
    ranked.iter().map(OutreachRequest::from).collect()
}

impl From<&Prioritized> for OutreachRequest {
    fn from(p: &Prioritized) -> Self {
        Self {
            invoice_id: p.invoice.invoice_id.clone(),
            customer_id: p.invoice.customer_id.clone(),
            action_type: p.recommended_action,
            risk_category: p.invoice.category,
            attempt_number: None,
        }
    }
}

impl From<&ScheduledAction> for OutreachRequest {
    fn from(a: &ScheduledAction) -> Self {
        Self {
            invoice_id: a.invoice_id.clone(),
            customer_id: a.customer_id.clone(),
            action_type: a.action_type,
            risk_category: a.risk_category,
            attempt_number: Some(a.attempt_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashguard_ledger::{ActionLedger, Channel, InMemoryActionLedger, NewAction, NewOutcome};
    use chrono::{TimeZone, Utc};

    fn scored(id: &str, score: f64, amount: u64, due_day: u32, overdue: i64) -> ScoredInvoice {
        ScoredInvoice {
            invoice_id: id.into(),
            customer_id: "C-1".into(),
            score,
            category: RiskCategory::Medium,
            due_date: NaiveDate::from_ymd_opt(2024, 1, due_day).unwrap(),
            days_overdue: overdue,
            amount_cents: amount,
            outstanding_cents: amount,
        }
    }

    fn ids(ranked: &[Prioritized]) -> Vec<&str> {
        ranked.iter().map(|p| p.invoice.invoice_id.as_str()).collect()
    }

    #[test]
    fn priority_uses_invoice_amount_not_remaining_balance() {
        let mostly_paid = ScoredInvoice {
            outstanding_cents: 10_000,
            ..scored("INV-A", 50.0, 100_000, 10, 5)
        };
        let unpaid = scored("INV-B", 50.0, 50_000, 10, 5);
        assert_eq!(mostly_paid.priority(), 50_000.0);

        let ranked = prioritize(
            &[unpaid, mostly_paid],
            &LedgerSnapshot::default(),
            &EscalationPolicy::default(),
            10,
        );
        assert_eq!(ids(&ranked), vec!["INV-A", "INV-B"]);
    }

    #[test]
    fn ranks_by_score_times_amount() {
        let input = vec![
            scored("INV-1", 50.0, 10_000, 10, 5),
            scored("INV-2", 90.0, 10_000, 10, 5),
            scored("INV-3", 20.0, 100_000, 10, 5),
        ];
        let ranked = prioritize(&input, &LedgerSnapshot::default(), &EscalationPolicy::default(), 10);
        assert_eq!(ids(&ranked), vec!["INV-3", "INV-2", "INV-1"]);
        assert_eq!(ranked[0].priority, 20_000.0);
    }

    #[test]
    fn ties_break_on_due_date_then_id() {
        let input = vec![
            scored("INV-9", 50.0, 10_000, 20, 5),
            scored("INV-5", 50.0, 10_000, 12, 5),
            scored("INV-4", 50.0, 10_000, 20, 5),
        ];
        let ranked = prioritize(&input, &LedgerSnapshot::default(), &EscalationPolicy::default(), 2);
        assert_eq!(ids(&ranked), vec!["INV-5", "INV-4"]);
    }

    #[test]
    fn skips_paid_and_follows_history() {
        let ledger = InMemoryActionLedger::default();
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
        ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::FriendlyReminder, Channel::Email, at))
            .unwrap();
        ledger
            .log_action(NewAction::new("INV-2", "C-1", ActionType::FriendlyReminder, Channel::Email, at))
            .unwrap();
        ledger
            .log_outcome(NewOutcome::paid("INV-2", "C-1", at, 10_000, 3))
            .unwrap();

        let input = vec![scored("INV-1", 40.0, 10_000, 10, 10), scored("INV-2", 90.0, 10_000, 10, 10)];
        let ranked = prioritize(&input, &ledger.snapshot().unwrap(), &EscalationPolicy::default(), 10);
        assert_eq!(ids(&ranked), vec!["INV-1"]);
        assert_eq!(ranked[0].prior_actions, vec![ActionType::FriendlyReminder]);
        assert_eq!(ranked[0].recommended_action, ActionType::SecondNotice);

        let requests = to_outreach(&ranked);
        assert_eq!(requests[0].action_type, ActionType::SecondNotice);
        assert_eq!(requests[0].attempt_number, None);
    }
}
