//! End-to-end flows across scoring, scheduling and the ledger.

use chrono::{NaiveDate, TimeZone, Utc};

use cashguard_collections::{
    ActionStatus, CadenceScheduler, InMemoryScheduleStore, ScheduleStore, SqliteScheduleStore,
    plan_collections, record_outcome, score_open_invoices,
};
use cashguard_core::{BusinessCalendar, CashGuardConfig, FallbackWeights, InvoiceId, RiskCategory};
use cashguard_ledger::{
    ActionLedger, ActionType, Channel, InMemoryActionLedger, LedgerSnapshot, NewAction, NewOutcome,
    NewResponse, ResponseType, SqliteActionLedger,
};
use cashguard_receivables::{Customer, Invoice, ReceivablesDataset};
use cashguard_risk::{ScoreSource, Scorer};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn scheduler() -> CadenceScheduler {
    cashguard_observability::init(&CashGuardConfig::default().logging).unwrap();
    CadenceScheduler::from_config(&CashGuardConfig::default(), BusinessCalendar::weekends_only())
}

#[test]
fn high_risk_invoice_gets_weekday_cadence() {
    let invoice = Invoice::new("INV-A", "C-1", 250_000, date(2024, 1, 1), date(2024, 1, 31));
    let schedule = scheduler().generate_schedule(&invoice, RiskCategory::High).unwrap();

    let offsets = [3, 7, 10, 14, 17, 21];
    assert_eq!(schedule.actions.len(), offsets.len());
    for (action, offset) in schedule.actions.iter().zip(offsets) {
        let nominal = date(2024, 1, 31) + chrono::Duration::days(offset);
        assert!(action.scheduled_date >= nominal);
        assert!(BusinessCalendar::weekends_only().is_business_day(action.scheduled_date));
    }
}

#[test]
fn cold_start_scores_overdue_invoice_very_high() {
    let dataset = ReceivablesDataset::new(
        vec![Customer::new("C-1", "Initech", 30, 10_000_000)],
        vec![Invoice::new("INV-B", "C-1", 5_000_000, date(2024, 1, 1), date(2024, 1, 31))],
        vec![],
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let scorer = Scorer::from_artifact_path(dir.path().join("model.json"), FallbackWeights::default());

    let batch = score_open_invoices(&dataset, &scorer, &CashGuardConfig::default().risk_tiers, date(2024, 4, 30));
    assert_eq!(batch.source, ScoreSource::Fallback);
    assert_eq!(batch.scored.len(), 1);
    assert_eq!(batch.scored[0].days_overdue, 90);
    assert_eq!(batch.scored[0].score, 90.0);
    assert_eq!(batch.scored[0].category, RiskCategory::VeryHigh);
}

#[test]
fn paid_outcome_cancels_pending_but_keeps_completed() {
    let ledger = InMemoryActionLedger::default();
    let store = InMemoryScheduleStore::new();
    let invoice = Invoice::new("INV-C", "C-1", 80_000, date(2024, 1, 1), date(2024, 1, 31));
    store
        .insert_schedule(scheduler().generate_schedule(&invoice, RiskCategory::Medium).unwrap())
        .unwrap();
    let id = InvoiceId::new("INV-C");
    let first = store.mark_completed(&id, 1, Some("reminder sent")).unwrap();

    let sent = Utc.with_ymd_and_hms(2024, 2, 5, 9, 0, 0).unwrap();
    let action_id = ledger
        .log_action(
            NewAction::new("INV-C", "C-1", first.action_type, Channel::Email, sent)
                .for_attempt(1, first.scheduled_date),
        )
        .unwrap();
    let paid_at = Utc.with_ymd_and_hms(2024, 2, 9, 15, 0, 0).unwrap();
    let report = record_outcome(&ledger, &store, NewOutcome::paid("INV-C", "C-1", paid_at, 80_000, 9)).unwrap();

    assert_eq!(report.cancelled_attempts, 4);
    let schedule = store.schedule(&id).unwrap().unwrap();
    assert_eq!(schedule.actions[0].status, ActionStatus::Completed);
    assert!(schedule.actions[1..].iter().all(|a| a.status == ActionStatus::Cancelled));
    assert_eq!(store.cancel_future_actions(&id, "paid").unwrap(), 0);

    let snapshot = ledger.snapshot().unwrap();
    assert_eq!(snapshot.outcomes[0].attributed_action, Some(action_id));
}

#[test]
fn reminder_campaign_metrics() {
    let ledger = InMemoryActionLedger::default();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let mut actions = Vec::new();
    for n in 0..10 {
        let invoice = format!("INV-{n:02}");
        actions.push(
            ledger
                .log_action(NewAction::new(
                    invoice.as_str(),
                    "C-1",
                    ActionType::FriendlyReminder,
                    Channel::Email,
                    base + chrono::Duration::hours(n),
                ))
                .unwrap(),
        );
    }
    for action_id in &actions[..4] {
        ledger
            .log_response(*action_id, NewResponse::new(ResponseType::Email, base + chrono::Duration::days(1)))
            .unwrap();
    }
    for n in 0..3 {
        ledger
            .log_outcome(NewOutcome::paid(
                format!("INV-{n:02}").as_str(),
                "C-1",
                base + chrono::Duration::days(5),
                100_000,
                5,
            ))
            .unwrap();
    }

    let metrics = ledger
        .calculate_success_metrics(date(2024, 3, 1), date(2024, 3, 31), Some(ActionType::FriendlyReminder))
        .unwrap();
    assert_eq!(metrics.total_actions, 10);
    assert_eq!(metrics.success_rate, 0.3);
    assert_eq!(metrics.response_rate, 0.4);
}

#[test]
fn plan_skips_invoices_the_ledger_marks_paid() {
    let dataset = ReceivablesDataset::new(
        vec![Customer::new("C-1", "Initech", 30, 10_000_000)],
        vec![
            Invoice::new("INV-1", "C-1", 500_000, date(2024, 1, 1), date(2024, 1, 31)),
            Invoice::new("INV-2", "C-1", 900_000, date(2024, 1, 5), date(2024, 2, 4)),
        ],
        vec![],
    )
    .unwrap();
    let ledger = InMemoryActionLedger::default();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    ledger.log_outcome(NewOutcome::paid("INV-2", "C-1", at, 900_000, 26)).unwrap();

    let plan = plan_collections(
        &dataset,
        &Scorer::fallback(FallbackWeights::default()),
        &CashGuardConfig::default(),
        &ledger.snapshot().unwrap(),
        date(2024, 3, 2),
        5,
    );
    let ids: Vec<_> = plan.outreach.iter().map(|r| r.invoice_id.as_str()).collect();
    assert_eq!(ids, vec!["INV-1"]);

    let unfiltered = plan_collections(
        &dataset,
        &Scorer::fallback(FallbackWeights::default()),
        &CashGuardConfig::default(),
        &LedgerSnapshot::default(),
        date(2024, 3, 2),
        5,
    );
    assert_eq!(unfiltered.outreach.len(), 2);
}

#[test]
fn sqlite_stores_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.db");
    let schedule_path = dir.path().join("schedules.db");
    let id = InvoiceId::new("INV-D");
    let at = Utc.with_ymd_and_hms(2024, 2, 6, 11, 30, 0).unwrap();

    let (ledger_before, schedules_before) = {
        let ledger = SqliteActionLedger::open(&ledger_path, Default::default()).unwrap();
        let store = SqliteScheduleStore::open(&schedule_path).unwrap();
        let invoice = Invoice::new("INV-D", "C-4", 120_000, date(2024, 1, 1), date(2024, 1, 31));
        store
            .insert_schedule(scheduler().generate_schedule(&invoice, RiskCategory::High).unwrap())
            .unwrap();
        store.mark_completed(&id, 1, None).unwrap();
        ledger
            .log_action(NewAction::new("INV-D", "C-4", ActionType::SecondNotice, Channel::Phone, at))
            .unwrap();
        record_outcome(&ledger, &store, NewOutcome::paid("INV-D", "C-4", at, 120_000, 6)).unwrap();
        (ledger.snapshot().unwrap(), store.schedules().unwrap())
    };

    let ledger = SqliteActionLedger::open(&ledger_path, Default::default()).unwrap();
    let store = SqliteScheduleStore::open(&schedule_path).unwrap();
    assert_eq!(ledger.snapshot().unwrap(), ledger_before);
    assert_eq!(store.schedules().unwrap(), schedules_before);
    assert!(store.get_due_actions(date(2024, 12, 31)).unwrap().is_empty());
    assert_eq!(ledger.get_invoice_history(&id).unwrap().len(), 2);
}
