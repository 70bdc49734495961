use std::cmp::Reverse;
use std::collections::BTreeMap;

use cashguard_core::{
    BusinessCalendar, CadenceAnchor, CadenceConfig, CashGuardConfig, DomainError, DomainResult,
    EscalationPolicy, ItemError, RiskCategory,
};
use cashguard_ledger::{ActionType, LedgerSnapshot};
use cashguard_receivables::Invoice;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cadence::{ActionStatus, CadenceSchedule, ScheduledAction};
use crate::recommend::recommend_action;

/// Builds cadence schedules from the configured offset table.
#[derive(Debug, Clone)]
pub struct CadenceScheduler {
    cadence: CadenceConfig,
    escalation: EscalationPolicy,
    calendar: BusinessCalendar,
}

impl CadenceScheduler {
    pub fn new(cadence: CadenceConfig, escalation: EscalationPolicy, calendar: BusinessCalendar) -> Self {
        Self {
            cadence,
            escalation,
            calendar,
        }
    }

    pub fn from_config(config: &CashGuardConfig, calendar: BusinessCalendar) -> Self {
        Self::new(config.cadence.clone(), config.escalation, calendar)
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// One pending attempt per tier offset, counted from the configured anchor
    /// and moved onto business days.
    ///
    /// Action labels come from the escalation table: each attempt sees the
    /// labels of the attempts before it as its history.
    pub fn generate_schedule(&self, invoice: &Invoice, category: RiskCategory) -> DomainResult<CadenceSchedule> {
        if !invoice.is_open() {
            return Err(DomainError::validation(format!(
                "invoice {} is {}, only open invoices are scheduled",
                invoice.invoice_id,
                invoice.status.as_str()
            )));
        }
        let anchor = match self.cadence.anchor {
            CadenceAnchor::IssueDate => invoice.issue_date,
            CadenceAnchor::DueDate => invoice.due_date,
        };

        let mut labels: Vec<ActionType> = Vec::new();
        let mut actions = Vec::new();
        for (idx, offset) in self.cadence.offsets_for(category).iter().enumerate() {
            let nominal = anchor + chrono::Duration::days(i64::from(*offset));
            let estimated_overdue = (nominal - invoice.due_date).num_days().max(0);
            let action_type = recommend_action(&self.escalation, category, estimated_overdue, &labels);
            labels.push(action_type);

            actions.push(ScheduledAction {
                invoice_id: invoice.invoice_id.clone(),
                customer_id: invoice.customer_id.clone(),
                attempt_number: idx as u32 + 1,
                scheduled_date: self.calendar.offset_business_day(anchor, *offset),
                action_type,
                status: ActionStatus::Pending,
                risk_category: category,
                amount_cents: invoice.amount_cents,
                note: None,
            });
        }

        tracing::debug!(
            invoice_id = %invoice.invoice_id,
            risk_category = %category,
            attempts = actions.len(),
            "generated cadence schedule"
        );
        Ok(CadenceSchedule {
            invoice_id: invoice.invoice_id.clone(),
            customer_id: invoice.customer_id.clone(),
            risk_category: category,
            amount_cents: invoice.amount_cents,
            actions,
        })
    }

    /// Generate for every pair; failures are collected per invoice.
    pub fn generate_batch<'a>(
        &self,
        items: impl IntoIterator<Item = (&'a Invoice, RiskCategory)>,
    ) -> (Vec<CadenceSchedule>, Vec<ItemError>) {
        let mut schedules = Vec::new();
        let mut errors = Vec::new();
        for (invoice, category) in items {
            match self.generate_schedule(invoice, category) {
                Ok(schedule) => schedules.push(schedule),
                Err(err) => errors.push(ItemError::new(invoice.invoice_id.as_str(), err)),
            }
        }
        if !errors.is_empty() {
            tracing::warn!(failed = errors.len(), generated = schedules.len(), "some schedules were not generated");
        }
        (schedules, errors)
    }
}

/// Pending attempts dated on or before `as_of`, across all schedules.
///
/// Ordered by date, then riskier tier, then larger amount, then invoice id and
/// attempt number.
pub fn get_due_actions(schedules: &[CadenceSchedule], as_of: NaiveDate) -> Vec<ScheduledAction> {
    let mut due: Vec<ScheduledAction> = schedules
        .iter()
        .flat_map(|s| s.pending())
        .filter(|a| a.scheduled_date <= as_of)
        .cloned()
        .collect();
    due.sort_by(|a, b| {
        a.scheduled_date
            .cmp(&b.scheduled_date)
            .then_with(|| Reverse(a.risk_category.rank()).cmp(&Reverse(b.risk_category.rank())))
            .then_with(|| b.amount_cents.cmp(&a.amount_cents))
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
            .then_with(|| a.attempt_number.cmp(&b.attempt_number))
    });
    due
}

/// How a set of cadence schedules played out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEffectiveness {
    pub total_actions: usize,
    pub completed_actions: usize,
    pub cancelled_actions: usize,
    pub pending_actions: usize,
    pub rescheduled_actions: usize,
    /// `completed / total`, 0 for no actions.
    pub completion_rate: f64,
    /// Completed attempts per action type.
    pub action_type_distribution: BTreeMap<ActionType, usize>,
    /// Scheduled invoices the ledger shows as paid.
    pub paid_invoices: usize,
    /// Mean over paid invoices of the highest completed attempt number;
    /// `None` when no scheduled invoice was paid.
    pub avg_attempts_to_payment: Option<f64>,
}

/// Summarise attempt statuses across `schedules` and join them with the
/// ledger's `paid` outcomes.
pub fn schedule_effectiveness(schedules: &[CadenceSchedule], ledger: &LedgerSnapshot) -> ScheduleEffectiveness {
    let mut report = ScheduleEffectiveness::default();
    for action in schedules.iter().flat_map(|s| &s.actions) {
        report.total_actions += 1;
        match action.status {
            ActionStatus::Pending => report.pending_actions += 1,
            ActionStatus::Completed => {
                report.completed_actions += 1;
                *report.action_type_distribution.entry(action.action_type).or_default() += 1;
            }
            ActionStatus::Cancelled => report.cancelled_actions += 1,
            ActionStatus::Rescheduled => report.rescheduled_actions += 1,
        }
    }
    if report.total_actions > 0 {
        report.completion_rate = report.completed_actions as f64 / report.total_actions as f64;
    }

    let paid = ledger.paid_invoices();
    let attempts: Vec<u32> = schedules
        .iter()
        .filter(|s| paid.contains(&s.invoice_id))
        .map(|s| {
            s.actions
                .iter()
                .filter(|a| a.status == ActionStatus::Completed)
                .map(|a| a.attempt_number)
                .max()
                .unwrap_or(0)
        })
        .collect();
    report.paid_invoices = attempts.len();
    if !attempts.is_empty() {
        let sum: u32 = attempts.iter().sum();
        report.avg_attempts_to_payment = Some(f64::from(sum) / attempts.len() as f64);
    }

    tracing::debug!(
        total = report.total_actions,
        completed = report.completed_actions,
        paid = report.paid_invoices,
        "schedule effectiveness"
    );
    report
}
