use std::sync::{Arc, RwLock};

use cashguard_core::{DomainError, LedgerConfig};

use crate::error::{LedgerError, LedgerResult};
use crate::record::{
    ActionId, ActionRecord, NewAction, NewOutcome, NewResponse, OutcomeId, OutcomeRecord,
    ResponseId, ResponseRecord,
};
use crate::store::{ActionLedger, LedgerSnapshot, attribute};

/// Ledger held in process memory, for tests and one-shot runs.
#[derive(Debug)]
pub struct InMemoryActionLedger {
    config: LedgerConfig,
    state: RwLock<LedgerSnapshot>,
}

impl InMemoryActionLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(LedgerSnapshot::default()),
        }
    }

    pub fn arc(config: LedgerConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }
}

impl Default for InMemoryActionLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::storage("ledger lock poisoned")
}

impl ActionLedger for InMemoryActionLedger {
    fn log_action(&self, action: NewAction) -> LedgerResult<ActionId> {
        action.validate()?;
        let mut state = self.state.write().map_err(poisoned)?;
        let id = ActionId(state.actions.len() as i64 + 1);
        tracing::debug!(action_id = %id, invoice_id = %action.invoice_id, action_type = %action.action_type, "action logged");
        state.actions.push(ActionRecord::from_new(id, action));
        Ok(id)
    }

    fn log_response(&self, action_id: ActionId, response: NewResponse) -> LedgerResult<ResponseId> {
        let mut state = self.state.write().map_err(poisoned)?;
        let action = state
            .action(action_id)
            .ok_or_else(|| DomainError::not_found(format!("action {action_id}")))?;
        if response.at < action.logged_at {
            return Err(DomainError::validation(format!(
                "response at {} precedes action {action_id} logged at {}",
                response.at, action.logged_at
            ))
            .into());
        }
        let id = ResponseId(state.responses.len() as i64 + 1);
        let record = ResponseRecord::from_new(id, action, response);
        state.responses.push(record);
        Ok(id)
    }

    fn log_outcome(&self, outcome: NewOutcome) -> LedgerResult<OutcomeId> {
        outcome.validate()?;
        let mut state = self.state.write().map_err(poisoned)?;
        let attributed = attribute(
            &state.actions,
            &outcome.invoice_id,
            outcome.at,
            self.config.attribution_lookback_days,
        );
        let id = OutcomeId(state.outcomes.len() as i64 + 1);
        tracing::debug!(
            outcome_id = id.0,
            invoice_id = %outcome.invoice_id,
            outcome_type = %outcome.outcome_type,
            attributed_action = ?attributed.map(|a| a.0),
            "outcome logged"
        );
        state.outcomes.push(OutcomeRecord::from_new(id, attributed, outcome));
        Ok(id)
    }

    fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        Ok(self.state.read().map_err(poisoned)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ActionType, Channel, OutcomeType, ResponseType};
    use crate::audit::HistoryEntry;
    use cashguard_core::InvoiceId;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn ten_actions_four_responses_three_payments() {
        let ledger = InMemoryActionLedger::default();
        let mut ids = Vec::new();
        for n in 0..10u32 {
            let id = ledger
                .log_action(NewAction::new(
                    format!("INV-{n}").as_str(),
                    "C-1",
                    ActionType::FriendlyReminder,
                    Channel::Email,
                    at(1 + n, 9),
                ))
                .unwrap();
            ids.push(id);
        }
        for id in &ids[..4] {
            ledger
                .log_response(*id, NewResponse::new(ResponseType::Email, at(20, 10)))
                .unwrap();
        }
        for (n, days) in [(0u32, 4i64), (1, 6), (2, 8)] {
            ledger
                .log_outcome(NewOutcome::paid(
                    format!("INV-{n}").as_str(),
                    "C-1",
                    at(21, 12),
                    100_000,
                    days,
                ))
                .unwrap();
        }

        let m = ledger.calculate_success_metrics(date(1), date(31), None).unwrap();
        assert_eq!(m.total_actions, 10);
        assert_eq!(m.responded_actions, 4);
        assert_eq!(m.successful_actions, 3);
        assert!((m.success_rate - 0.3).abs() < 1e-12);
        assert!((m.response_rate - 0.4).abs() < 1e-12);
        assert_eq!(m.avg_days_to_payment, Some(6.0));
        assert_eq!(m.total_amount_collected_cents, 300_000);
    }

    #[test]
    fn empty_window_has_zero_rates() {
        let ledger = InMemoryActionLedger::default();
        let m = ledger
            .calculate_success_metrics(date(1), date(31), Some(ActionType::Escalate))
            .unwrap();
        assert_eq!(m.total_actions, 0);
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.response_rate, 0.0);
        assert_eq!(m.avg_days_to_payment, None);
    }

    #[test]
    fn response_to_unknown_action_is_not_found() {
        let ledger = InMemoryActionLedger::default();
        let err = ledger
            .log_response(ActionId(42), NewResponse::new(ResponseType::Call, at(2, 9)))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn outcome_without_prior_action_is_unattributed() {
        let ledger = InMemoryActionLedger::default();
        ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::SecondNotice, Channel::Sms, at(10, 9)))
            .unwrap();
        ledger
            .log_outcome(NewOutcome::paid("INV-1", "C-1", at(9, 9), 500, 1))
            .unwrap();
        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.outcomes[0].attributed_action, None);
    }

    #[test]
    fn invoice_history_orders_ties_action_response_outcome() {
        let ledger = InMemoryActionLedger::default();
        let id = ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::CallRequest, Channel::Phone, at(5, 9)))
            .unwrap();
        ledger
            .log_outcome(NewOutcome::new("INV-1", "C-1", OutcomeType::Disputed, at(5, 9)))
            .unwrap();
        ledger
            .log_response(id, NewResponse::new(ResponseType::Call, at(5, 9)).promising_payment())
            .unwrap();
        ledger
            .log_action(NewAction::new("INV-2", "C-1", ActionType::CallRequest, Channel::Phone, at(5, 8)))
            .unwrap();

        let history = ledger.get_invoice_history(&InvoiceId::new("INV-1")).unwrap();
        let kinds: Vec<&str> = history
            .iter()
            .map(|e| match e {
                HistoryEntry::Action(_) => "action",
                HistoryEntry::Response(_) => "response",
                HistoryEntry::Outcome(_) => "outcome",
            })
            .collect();
        assert_eq!(kinds, vec!["action", "response", "outcome"]);

        let customer = ledger.get_customer_history(&"C-1".into()).unwrap();
        assert_eq!(customer.len(), 4);
        assert!(matches!(&customer[0], HistoryEntry::Action(a) if a.invoice_id.as_str() == "INV-2"));
    }

    #[test]
    fn effectiveness_groups_by_action_type() {
        let ledger = InMemoryActionLedger::default();
        ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::SecondNotice, Channel::Email, at(1, 9)))
            .unwrap();
        let call = ledger
            .log_action(NewAction::new("INV-2", "C-2", ActionType::CallRequest, Channel::Phone, at(1, 9)))
            .unwrap();
        ledger
            .log_response(call, NewResponse::new(ResponseType::Call, at(1, 10)))
            .unwrap();
        ledger
            .log_outcome(NewOutcome::paid("INV-2", "C-2", at(3, 9), 9_000, 2))
            .unwrap();

        let report = ledger.action_effectiveness().unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].action_type, ActionType::SecondNotice);
        assert_eq!(report[0].payments, 0);
        assert_eq!(report[1].action_type, ActionType::CallRequest);
        assert_eq!(report[1].payment_rate, 1.0);
        assert_eq!(report[1].response_rate, 1.0);
    }

    #[test]
    fn export_writes_records_in_window() {
        let ledger = InMemoryActionLedger::default();
        ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::FriendlyReminder, Channel::Letter, at(1, 9)))
            .unwrap();
        ledger
            .log_action(NewAction::new("INV-2", "C-1", ActionType::FriendlyReminder, Channel::Letter, at(15, 9)))
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");

        let written = ledger.export_audit_log(&path, date(10), date(31)).unwrap();
        assert_eq!(written, 1);
        let log: crate::audit::AuditLog =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(log.entries.len(), 1);
        assert_eq!(ledger.snapshot().unwrap().actions.len(), 2);
    }
}
