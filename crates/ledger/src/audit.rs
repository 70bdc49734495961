//! Chronological histories and the JSON audit export.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, InvoiceId};

use crate::error::{LedgerError, LedgerResult};
use crate::record::{ActionRecord, OutcomeRecord, ResponseRecord};
use crate::store::LedgerSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum HistoryEntry {
    Action(ActionRecord),
    Response(ResponseRecord),
    Outcome(OutcomeRecord),
}

impl HistoryEntry {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            HistoryEntry::Action(a) => a.logged_at,
            HistoryEntry::Response(r) => r.responded_at,
            HistoryEntry::Outcome(o) => o.recorded_at,
        }
    }

    /// (timestamp, record kind, id): actions sort before responses before
    /// outcomes at the same instant.
    fn sort_key(&self) -> (DateTime<Utc>, u8, i64) {
        match self {
            HistoryEntry::Action(a) => (a.logged_at, 0, a.action_id.0),
            HistoryEntry::Response(r) => (r.responded_at, 1, r.response_id.0),
            HistoryEntry::Outcome(o) => (o.recorded_at, 2, o.outcome_id.0),
        }
    }
}

fn chronological(
    snapshot: &LedgerSnapshot,
    action: impl Fn(&ActionRecord) -> bool,
    response: impl Fn(&ResponseRecord) -> bool,
    outcome: impl Fn(&OutcomeRecord) -> bool,
) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = snapshot
        .actions
        .iter()
        .filter(|a| action(a))
        .cloned()
        .map(HistoryEntry::Action)
        .chain(
            snapshot
                .responses
                .iter()
                .filter(|r| response(r))
                .cloned()
                .map(HistoryEntry::Response),
        )
        .chain(
            snapshot
                .outcomes
                .iter()
                .filter(|o| outcome(o))
                .cloned()
                .map(HistoryEntry::Outcome),
        )
        .collect();
    entries.sort_by_key(HistoryEntry::sort_key);
    entries
}

pub fn invoice_history(snapshot: &LedgerSnapshot, invoice_id: &InvoiceId) -> Vec<HistoryEntry> {
    chronological(
        snapshot,
        |a| &a.invoice_id == invoice_id,
        |r| &r.invoice_id == invoice_id,
        |o| &o.invoice_id == invoice_id,
    )
}

pub fn customer_history(snapshot: &LedgerSnapshot, customer_id: &CustomerId) -> Vec<HistoryEntry> {
    chronological(
        snapshot,
        |a| &a.customer_id == customer_id,
        |r| &r.customer_id == customer_id,
        |o| &o.customer_id == customer_id,
    )
}

/// Document written by [`export`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub entries: Vec<HistoryEntry>,
}

pub fn audit_log(snapshot: &LedgerSnapshot, start: NaiveDate, end: NaiveDate) -> AuditLog {
    let within = |at: DateTime<Utc>| {
        let day = at.date_naive();
        day >= start && day <= end
    };
    AuditLog {
        start,
        end,
        entries: chronological(
            snapshot,
            |a| within(a.logged_at),
            |r| within(r.responded_at),
            |o| within(o.recorded_at),
        ),
    }
}

pub(crate) fn export(
    snapshot: &LedgerSnapshot,
    path: &Path,
    start: NaiveDate,
    end: NaiveDate,
) -> LedgerResult<usize> {
    let log = audit_log(snapshot, start, end);
    let body = serde_json::to_vec_pretty(&log)?;
    fs::write(path, body).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        records = log.entries.len(),
        %start,
        %end,
        "exported collections audit log"
    );
    Ok(log.entries.len())
}
