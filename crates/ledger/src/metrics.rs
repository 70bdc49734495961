//! Outcome-based effectiveness metrics.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{ActionId, ActionType, OutcomeType};
use crate::store::LedgerSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetrics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub action_type: Option<ActionType>,
    pub total_actions: usize,
    pub responded_actions: usize,
    pub successful_actions: usize,
    /// Actions credited with a `paid` outcome over actions sent (0 when none).
    pub success_rate: f64,
    pub response_rate: f64,
    /// Mean over credited `paid` outcomes that report days to payment.
    pub avg_days_to_payment: Option<f64>,
    /// Sum over credited `paid` and `partial` outcomes.
    pub total_amount_collected_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEffectiveness {
    pub action_type: ActionType,
    pub total_sent: usize,
    pub responses: usize,
    pub payments: usize,
    pub response_rate: f64,
    pub payment_rate: f64,
    pub avg_days_to_payment: Option<f64>,
}

/// Tallies for one set of actions.
#[derive(Debug, Default)]
struct Tally {
    sent: usize,
    responded: usize,
    paid: usize,
    days: Vec<i64>,
    collected_cents: u64,
}

impl Tally {
    fn over<'a>(snapshot: &LedgerSnapshot, actions: impl IntoIterator<Item = &'a ActionId>) -> Self {
        let ids: BTreeSet<ActionId> = actions.into_iter().copied().collect();
        let replied: BTreeSet<ActionId> = snapshot
            .responses
            .iter()
            .filter(|r| r.response_type.is_reply() && ids.contains(&r.action_id))
            .map(|r| r.action_id)
            .collect();

        let mut paid = BTreeSet::new();
        let mut days = Vec::new();
        let mut collected_cents: u64 = 0;
        for outcome in &snapshot.outcomes {
            let Some(action_id) = outcome.attributed_action.filter(|id| ids.contains(id)) else {
                continue;
            };
            if outcome.outcome_type.collects_money() {
                collected_cents = collected_cents.saturating_add(outcome.amount_collected_cents);
            }
            if outcome.outcome_type == OutcomeType::Paid {
                paid.insert(action_id);
                if let Some(d) = outcome.days_to_payment {
                    days.push(d);
                }
            }
        }

        Self {
            sent: ids.len(),
            responded: replied.len(),
            paid: paid.len(),
            days,
            collected_cents,
        }
    }

    fn rate(&self, count: usize) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            count as f64 / self.sent as f64
        }
    }

    fn avg_days(&self) -> Option<f64> {
        if self.days.is_empty() {
            None
        } else {
            Some(self.days.iter().sum::<i64>() as f64 / self.days.len() as f64)
        }
    }
}

/// Metrics over actions logged on a date within `[start, end]`.
pub fn success_metrics(
    snapshot: &LedgerSnapshot,
    start: NaiveDate,
    end: NaiveDate,
    action_type: Option<ActionType>,
) -> SuccessMetrics {
    let in_window: Vec<ActionId> = snapshot
        .actions
        .iter()
        .filter(|a| {
            let day = a.logged_at.date_naive();
            day >= start && day <= end && action_type.is_none_or(|t| t == a.action_type)
        })
        .map(|a| a.action_id)
        .collect();
    let tally = Tally::over(snapshot, &in_window);

    SuccessMetrics {
        start,
        end,
        action_type,
        total_actions: tally.sent,
        responded_actions: tally.responded,
        successful_actions: tally.paid,
        success_rate: tally.rate(tally.paid),
        response_rate: tally.rate(tally.responded),
        avg_days_to_payment: tally.avg_days(),
        total_amount_collected_cents: tally.collected_cents,
    }
}

/// One row per action type that has been used, in escalation order.
pub fn action_effectiveness(snapshot: &LedgerSnapshot) -> Vec<ActionEffectiveness> {
    let mut by_type: BTreeMap<ActionType, Vec<ActionId>> = BTreeMap::new();
    for action in &snapshot.actions {
        by_type.entry(action.action_type).or_default().push(action.action_id);
    }
    by_type
        .into_iter()
        .map(|(action_type, ids)| {
            let tally = Tally::over(snapshot, &ids);
            ActionEffectiveness {
                action_type,
                total_sent: tally.sent,
                responses: tally.responded,
                payments: tally.paid,
                response_rate: tally.rate(tally.responded),
                payment_rate: tally.rate(tally.paid),
                avg_days_to_payment: tally.avg_days(),
            }
        })
        .collect()
}
