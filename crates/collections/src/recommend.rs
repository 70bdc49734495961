//! Static escalation table shared by the prioritizer and cadence labels.

use cashguard_core::{EscalationPolicy, RiskCategory};
use cashguard_ledger::ActionType;

/// Rung implied by days overdue alone.
pub fn rung_by_overdue(policy: &EscalationPolicy, days_overdue: i64) -> ActionType {
    if days_overdue <= policy.friendly_reminder_max_overdue {
        ActionType::FriendlyReminder
    } else if days_overdue <= policy.second_notice_max_overdue {
        ActionType::SecondNotice
    } else if days_overdue <= policy.call_request_max_overdue {
        ActionType::CallRequest
    } else if days_overdue <= policy.payment_plan_max_overdue {
        ActionType::PaymentPlan
    } else {
        ActionType::Escalate
    }
}

/// Next action for an invoice given how overdue it is and what was already
/// tried.
///
/// The result is the higher of the overdue rung and the rung after the most
/// severe prior action. For `very_high` accounts already contacted the
/// overdue rung moves up one. Escalation happens only once
/// `escalate_after_attempts` attempts were made or the invoice is overdue past
/// the payment-plan threshold; below that the ladder tops out at
/// `payment_plan`.
pub fn recommend_action(
    policy: &EscalationPolicy,
    category: RiskCategory,
    days_overdue: i64,
    prior: &[ActionType],
) -> ActionType {
    if prior.len() >= policy.escalate_after_attempts
        || days_overdue > policy.payment_plan_max_overdue
    {
        return ActionType::Escalate;
    }
    let bump = usize::from(category == RiskCategory::VeryHigh && !prior.is_empty());
    let by_overdue = rung_by_overdue(policy, days_overdue).rung() + bump;
    let by_history = prior.iter().max().map_or(0, |a| a.rung() + 1);
    let rung = by_overdue
        .max(by_history)
        .min(ActionType::PaymentPlan.rung());
    ActionType::from_rung(rung)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EscalationPolicy {
        EscalationPolicy::default()
    }

    #[test]
    fn fresh_account_follows_overdue_thresholds() {
        let p = policy();
        let rec = |days| recommend_action(&p, RiskCategory::Medium, days, &[]);
        assert_eq!(rec(-5), ActionType::FriendlyReminder);
        assert_eq!(rec(7), ActionType::FriendlyReminder);
        assert_eq!(rec(8), ActionType::SecondNotice);
        assert_eq!(rec(15), ActionType::SecondNotice);
        assert_eq!(rec(30), ActionType::CallRequest);
        assert_eq!(rec(60), ActionType::PaymentPlan);
        assert_eq!(rec(61), ActionType::Escalate);
    }

    #[test]
    fn prior_reminder_moves_to_second_notice() {
        let rec = recommend_action(&policy(), RiskCategory::Low, 10, &[ActionType::FriendlyReminder]);
        assert_eq!(rec, ActionType::SecondNotice);
    }

    #[test]
    fn very_high_with_history_moves_the_overdue_rung_up() {
        let p = policy();
        let prior = [ActionType::FriendlyReminder];
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 3, &prior), ActionType::SecondNotice);
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 10, &prior), ActionType::CallRequest);
        assert_eq!(recommend_action(&p, RiskCategory::High, 10, &prior), ActionType::SecondNotice);
    }

    #[test]
    fn very_high_does_not_escalate_below_the_thresholds() {
        let p = policy();
        let prior = [ActionType::FriendlyReminder, ActionType::PaymentPlan];
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 45, &prior), ActionType::PaymentPlan);
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 60, &prior), ActionType::PaymentPlan);
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 61, &prior), ActionType::Escalate);
        let third = [ActionType::FriendlyReminder, ActionType::SecondNotice, ActionType::CallRequest];
        assert_eq!(recommend_action(&p, RiskCategory::VeryHigh, 5, &third), ActionType::Escalate);
    }

    #[test]
    fn three_prior_attempts_escalate() {
        let prior = [ActionType::FriendlyReminder; 3];
        assert_eq!(recommend_action(&policy(), RiskCategory::Low, 0, &prior), ActionType::Escalate);
    }
}
