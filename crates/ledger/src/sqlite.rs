//! Durable ledger on SQLite.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use cashguard_core::{CustomerId, DomainError, InvoiceId, LedgerConfig};

use crate::error::{LedgerError, LedgerResult};
use crate::record::{
    ActionId, ActionRecord, NewAction, NewOutcome, NewResponse, OutcomeId, OutcomeRecord,
    ResponseId, ResponseRecord,
};
use crate::store::{ActionLedger, LedgerSnapshot, attribute};

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_ledger",
    "CREATE TABLE actions (
        action_id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        channel TEXT NOT NULL,
        logged_at TEXT NOT NULL,
        scheduled_date TEXT,
        attempt_number INTEGER,
        content_ref TEXT,
        sent_by TEXT,
        notes TEXT
    );
    CREATE TABLE responses (
        response_id INTEGER PRIMARY KEY AUTOINCREMENT,
        action_id INTEGER NOT NULL REFERENCES actions (action_id),
        response_type TEXT NOT NULL,
        responded_at TEXT NOT NULL,
        response_text TEXT,
        payment_promised INTEGER NOT NULL,
        payment_plan_accepted INTEGER NOT NULL,
        notes TEXT
    );
    CREATE TABLE outcomes (
        outcome_id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        outcome_type TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        amount_collected_cents INTEGER NOT NULL,
        days_to_payment INTEGER,
        attributed_action_id INTEGER REFERENCES actions (action_id),
        payment_method TEXT,
        notes TEXT
    );
    CREATE INDEX idx_actions_invoice ON actions (invoice_id);
    CREATE INDEX idx_actions_customer ON actions (customer_id);
    CREATE INDEX idx_outcomes_invoice ON outcomes (invoice_id);",
)];

pub struct SqliteActionLedger {
    config: LedgerConfig,
    conn: Mutex<Connection>,
}

impl SqliteActionLedger {
    pub fn open(path: impl AsRef<Path>, config: LedgerConfig) -> LedgerResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn, config)
    }

    pub fn open_in_memory(config: LedgerConfig) -> LedgerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(mut conn: Connection, config: LedgerConfig) -> LedgerResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&mut conn)?;
        Ok(Self {
            config,
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> LedgerResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::storage("ledger connection lock poisoned"))
    }
}

fn run_migrations(conn: &mut Connection) -> LedgerResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;
    for (name, sql) in MIGRATIONS {
        let applied: Option<String> = conn
            .query_row(
                "SELECT name FROM schema_migrations WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if applied.is_none() {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                params![name],
            )?;
            tx.commit()?;
            tracing::info!(migration = name, "applied ledger migration");
        }
    }
    Ok(())
}

/// Parse a stored enum column, reporting bad values as storage corruption.
fn parse_column<T: std::str::FromStr<Err = DomainError>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: DomainError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const ACTION_COLUMNS: &str = "action_id, invoice_id, customer_id, action_type, channel, logged_at,
     scheduled_date, attempt_number, content_ref, sent_by, notes";

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<ActionRecord> {
    Ok(ActionRecord {
        action_id: ActionId(row.get(0)?),
        invoice_id: InvoiceId::new(row.get::<_, String>(1)?),
        customer_id: CustomerId::new(row.get::<_, String>(2)?),
        action_type: parse_column(row, 3)?,
        channel: parse_column(row, 4)?,
        logged_at: row.get::<_, DateTime<Utc>>(5)?,
        scheduled_date: row.get::<_, Option<NaiveDate>>(6)?,
        attempt_number: row.get(7)?,
        content_ref: row.get(8)?,
        sent_by: row.get(9)?,
        notes: row.get(10)?,
    })
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<ResponseRecord> {
    Ok(ResponseRecord {
        response_id: ResponseId(row.get(0)?),
        action_id: ActionId(row.get(1)?),
        invoice_id: InvoiceId::new(row.get::<_, String>(2)?),
        customer_id: CustomerId::new(row.get::<_, String>(3)?),
        response_type: parse_column(row, 4)?,
        responded_at: row.get(5)?,
        response_text: row.get(6)?,
        payment_promised: row.get(7)?,
        payment_plan_accepted: row.get(8)?,
        notes: row.get(9)?,
    })
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<OutcomeRecord> {
    let amount: i64 = row.get(5)?;
    Ok(OutcomeRecord {
        outcome_id: OutcomeId(row.get(0)?),
        invoice_id: InvoiceId::new(row.get::<_, String>(1)?),
        customer_id: CustomerId::new(row.get::<_, String>(2)?),
        outcome_type: parse_column(row, 3)?,
        recorded_at: row.get(4)?,
        amount_collected_cents: amount.max(0) as u64,
        days_to_payment: row.get(6)?,
        attributed_action: row.get::<_, Option<i64>>(7)?.map(ActionId),
        payment_method: row.get(8)?,
        notes: row.get(9)?,
    })
}

fn cents_to_sql(cents: u64) -> LedgerResult<i64> {
    i64::try_from(cents).map_err(|_| DomainError::validation(format!("amount {cents} out of range")).into())
}

impl ActionLedger for SqliteActionLedger {
    fn log_action(&self, action: NewAction) -> LedgerResult<ActionId> {
        action.validate()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO actions (invoice_id, customer_id, action_type, channel, logged_at,
                scheduled_date, attempt_number, content_ref, sent_by, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                action.invoice_id.as_str(),
                action.customer_id.as_str(),
                action.action_type.as_str(),
                action.channel.as_str(),
                action.at,
                action.scheduled_date,
                action.attempt_number,
                action.content_ref,
                action.sent_by,
                action.notes,
            ],
        )?;
        let id = ActionId(tx.last_insert_rowid());
        tx.commit()?;
        tracing::debug!(action_id = %id, invoice_id = %action.invoice_id, action_type = %action.action_type, "action logged");
        Ok(id)
    }

    fn log_response(&self, action_id: ActionId, response: NewResponse) -> LedgerResult<ResponseId> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let logged_at: Option<DateTime<Utc>> = tx
            .query_row(
                "SELECT logged_at FROM actions WHERE action_id = ?1",
                params![action_id.0],
                |row| row.get(0),
            )
            .optional()?;
        let Some(logged_at) = logged_at else {
            return Err(DomainError::not_found(format!("action {action_id}")).into());
        };
        if response.at < logged_at {
            return Err(DomainError::validation(format!(
                "response at {} precedes action {action_id} logged at {logged_at}",
                response.at
            ))
            .into());
        }
        tx.execute(
            "INSERT INTO responses (action_id, response_type, responded_at, response_text,
                payment_promised, payment_plan_accepted, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                action_id.0,
                response.response_type.as_str(),
                response.at,
                response.response_text,
                response.payment_promised,
                response.payment_plan_accepted,
                response.notes,
            ],
        )?;
        let id = ResponseId(tx.last_insert_rowid());
        tx.commit()?;
        Ok(id)
    }

    fn log_outcome(&self, outcome: NewOutcome) -> LedgerResult<OutcomeId> {
        outcome.validate()?;
        let amount = cents_to_sql(outcome.amount_collected_cents)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions WHERE invoice_id = ?1"
            ))?;
            let rows = stmt.query_map(params![outcome.invoice_id.as_str()], action_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let attributed = attribute(
            &candidates,
            &outcome.invoice_id,
            outcome.at,
            self.config.attribution_lookback_days,
        );

        tx.execute(
            "INSERT INTO outcomes (invoice_id, customer_id, outcome_type, recorded_at,
                amount_collected_cents, days_to_payment, attributed_action_id, payment_method, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                outcome.invoice_id.as_str(),
                outcome.customer_id.as_str(),
                outcome.outcome_type.as_str(),
                outcome.at,
                amount,
                outcome.days_to_payment,
                attributed.map(|a| a.0),
                outcome.payment_method,
                outcome.notes,
            ],
        )?;
        let id = OutcomeId(tx.last_insert_rowid());
        tx.commit()?;
        tracing::debug!(
            outcome_id = id.0,
            invoice_id = %outcome.invoice_id,
            outcome_type = %outcome.outcome_type,
            attributed_action = ?attributed.map(|a| a.0),
            "outcome logged"
        );
        Ok(id)
    }

    fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let snapshot = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions ORDER BY action_id"
            ))?;
            let actions = stmt
                .query_map([], action_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = tx.prepare(
                "SELECT r.response_id, r.action_id, a.invoice_id, a.customer_id, r.response_type,
                        r.responded_at, r.response_text, r.payment_promised,
                        r.payment_plan_accepted, r.notes
                 FROM responses r JOIN actions a ON a.action_id = r.action_id
                 ORDER BY r.response_id",
            )?;
            let responses = stmt
                .query_map([], response_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = tx.prepare(
                "SELECT outcome_id, invoice_id, customer_id, outcome_type, recorded_at,
                        amount_collected_cents, days_to_payment, attributed_action_id,
                        payment_method, notes
                 FROM outcomes ORDER BY outcome_id",
            )?;
            let outcomes = stmt
                .query_map([], outcome_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            LedgerSnapshot {
                actions,
                responses,
                outcomes,
            }
        };
        tx.commit()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ActionType, Channel, ResponseType};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap() + chrono::Duration::nanoseconds(i64::from(nanos))
    }

    fn populate(ledger: &dyn ActionLedger) {
        let first = ledger
            .log_action(
                NewAction::new("INV-1", "C-1", ActionType::FriendlyReminder, Channel::Email, at(2, 9, 0))
                    .for_attempt(1, NaiveDate::from_ymd_opt(2024, 4, 2).unwrap())
                    .with_content_ref("tpl/friendly_reminder")
                    .sent_by("ar-clerk"),
            )
            .unwrap();
        ledger
            .log_action(NewAction::new("INV-1", "C-1", ActionType::SecondNotice, Channel::Email, at(9, 9, 123_456)))
            .unwrap();
        ledger
            .log_response(
                first,
                NewResponse::new(ResponseType::Email, at(3, 14, 0)).with_text("will pay friday"),
            )
            .unwrap();
        ledger
            .log_outcome(NewOutcome::paid("INV-1", "C-1", at(12, 16, 0), 250_000, 11).with_payment_method("ach"))
            .unwrap();
    }

    #[test]
    fn reopened_database_returns_identical_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let before = {
            let ledger = SqliteActionLedger::open(&path, LedgerConfig::default()).unwrap();
            populate(&ledger);
            ledger.snapshot().unwrap()
        };
        let reopened = SqliteActionLedger::open(&path, LedgerConfig::default()).unwrap();
        let after = reopened.snapshot().unwrap();

        assert_eq!(before, after);
        assert_eq!(after.outcomes[0].attributed_action, Some(ActionId(2)));
        assert_eq!(after.responses[0].invoice_id.as_str(), "INV-1");
    }

    #[test]
    fn matches_in_memory_backend() {
        let sqlite = SqliteActionLedger::open_in_memory(LedgerConfig::default()).unwrap();
        let memory = crate::InMemoryActionLedger::default();
        populate(&sqlite);
        populate(&memory);
        assert_eq!(sqlite.snapshot().unwrap(), memory.snapshot().unwrap());
    }

    #[test]
    fn unknown_action_response_is_not_found() {
        let ledger = SqliteActionLedger::open_in_memory(LedgerConfig::default()).unwrap();
        let err = ledger
            .log_response(ActionId(7), NewResponse::new(ResponseType::Call, at(1, 9, 0)))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
