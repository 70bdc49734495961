use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use cashguard_core::{CustomerId, DomainError, DomainResult, InvoiceId};

use crate::cadence::{CadenceSchedule, ScheduledAction};
use crate::error::{ScheduleError, ScheduleResult};
use crate::store::ScheduleStore;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_scheduled_actions",
    "CREATE TABLE scheduled_actions (
        invoice_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        customer_id TEXT NOT NULL,
        attempt_number INTEGER NOT NULL,
        scheduled_date TEXT NOT NULL,
        action_type TEXT NOT NULL,
        status TEXT NOT NULL,
        risk_category TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        note TEXT,
        PRIMARY KEY (invoice_id, seq)
    );
    CREATE UNIQUE INDEX ux_scheduled_actions_pending_slot
        ON scheduled_actions (invoice_id, attempt_number)
        WHERE status = 'pending';
    CREATE INDEX idx_scheduled_actions_due
        ON scheduled_actions (status, scheduled_date);",
)];

const COLUMNS: &str = "invoice_id, seq, customer_id, attempt_number, scheduled_date, action_type,
     status, risk_category, amount_cents, note";

/// Durable schedules. Every mutation runs in one `BEGIN IMMEDIATE`
/// transaction, and a partial unique index rejects a second pending entry for
/// the same (invoice, attempt).
pub struct SqliteScheduleStore {
    conn: Mutex<Connection>,
}

impl SqliteScheduleStore {
    pub fn open(path: impl AsRef<Path>) -> ScheduleResult<Self> {
        Self::with_connection(Connection::open(path.as_ref())?)
    }

    pub fn open_in_memory() -> ScheduleResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> ScheduleResult<Self> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> ScheduleResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScheduleError::storage("schedule connection lock poisoned"))
    }

    /// Load, transform, check and write back one schedule inside a single
    /// immediate transaction.
    fn mutate<T>(
        &self,
        invoice_id: &InvoiceId,
        f: impl FnOnce(&mut CadenceSchedule) -> DomainResult<T>,
    ) -> ScheduleResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = load(&tx, invoice_id)?
            .ok_or_else(|| DomainError::not_found(format!("schedule for invoice {invoice_id}")))?;
        let mut next = current.clone();
        let out = f(&mut next)?;
        next.check_invariants()?;
        write_changes(&tx, &current, &next)?;
        tx.commit()?;
        Ok(out)
    }
}

fn run_migrations(conn: &mut Connection) -> ScheduleResult<()> {
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
            tracing::info!(migration = name, "applied schedule migration");
        }
    }
    Ok(())
}

fn parse_column<T: std::str::FromStr<Err = DomainError>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: DomainError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledAction> {
    let amount: i64 = row.get(8)?;
    Ok(ScheduledAction {
        invoice_id: InvoiceId::new(row.get::<_, String>(0)?),
        customer_id: CustomerId::new(row.get::<_, String>(2)?),
        attempt_number: row.get(3)?,
        scheduled_date: row.get(4)?,
        action_type: parse_column(row, 5)?,
        status: parse_column(row, 6)?,
        risk_category: parse_column(row, 7)?,
        amount_cents: amount.max(0) as u64,
        note: row.get(9)?,
    })
}

fn assemble(actions: Vec<ScheduledAction>) -> Option<CadenceSchedule> {
    let first = actions.first()?;
    Some(CadenceSchedule {
        invoice_id: first.invoice_id.clone(),
        customer_id: first.customer_id.clone(),
        risk_category: first.risk_category,
        amount_cents: first.amount_cents,
        actions,
    })
}

fn load(tx: &Transaction<'_>, invoice_id: &InvoiceId) -> ScheduleResult<Option<CadenceSchedule>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {COLUMNS} FROM scheduled_actions WHERE invoice_id = ?1 ORDER BY seq"
    ))?;
    let actions = stmt
        .query_map(params![invoice_id.as_str()], action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(assemble(actions))
}

fn insert_row(tx: &Transaction<'_>, seq: usize, action: &ScheduledAction) -> ScheduleResult<()> {
    let amount = i64::try_from(action.amount_cents)
        .map_err(|_| DomainError::validation(format!("amount of invoice {} out of range", action.invoice_id)))?;
    tx.execute(
        "INSERT INTO scheduled_actions (invoice_id, seq, customer_id, attempt_number, scheduled_date,
            action_type, status, risk_category, amount_cents, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            action.invoice_id.as_str(),
            seq as i64,
            action.customer_id.as_str(),
            action.attempt_number,
            action.scheduled_date,
            action.action_type.as_str(),
            action.status.as_str(),
            action.risk_category.as_str(),
            amount,
            action.note,
        ],
    )?;
    Ok(())
}

/// Persist the difference between two versions of a schedule. Status changes
/// are written before new rows so a reschedule never holds two pending rows.
fn write_changes(tx: &Transaction<'_>, before: &CadenceSchedule, after: &CadenceSchedule) -> ScheduleResult<()> {
    for (seq, (old, new)) in before.actions.iter().zip(&after.actions).enumerate() {
        if old != new {
            tx.execute(
                "UPDATE scheduled_actions SET status = ?1, note = ?2, scheduled_date = ?3
                 WHERE invoice_id = ?4 AND seq = ?5",
                params![
                    new.status.as_str(),
                    new.note,
                    new.scheduled_date,
                    new.invoice_id.as_str(),
                    seq as i64
                ],
            )?;
        }
    }
    for (seq, action) in after.actions.iter().enumerate().skip(before.actions.len()) {
        insert_row(tx, seq, action)?;
    }
    Ok(())
}

impl ScheduleStore for SqliteScheduleStore {
    fn insert_schedule(&self, schedule: CadenceSchedule) -> ScheduleResult<()> {
        schedule.check_invariants()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pending: i64 = tx.query_row(
            "SELECT COUNT(*) FROM scheduled_actions WHERE invoice_id = ?1 AND status = 'pending'",
            params![schedule.invoice_id.as_str()],
            |row| row.get(0),
        )?;
        if pending > 0 {
            return Err(DomainError::conflict(format!(
                "invoice {} still has pending attempts",
                schedule.invoice_id
            ))
            .into());
        }
        tx.execute(
            "DELETE FROM scheduled_actions WHERE invoice_id = ?1",
            params![schedule.invoice_id.as_str()],
        )?;
        for (seq, action) in schedule.actions.iter().enumerate() {
            insert_row(&tx, seq, action)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn schedule(&self, invoice_id: &InvoiceId) -> ScheduleResult<Option<CadenceSchedule>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let schedule = load(&tx, invoice_id)?;
        tx.commit()?;
        Ok(schedule)
    }

    fn schedules(&self) -> ScheduleResult<Vec<CadenceSchedule>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {COLUMNS} FROM scheduled_actions ORDER BY invoice_id, seq"
            ))?;
            stmt.query_map([], action_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;

        let mut schedules = Vec::new();
        let mut group: Vec<ScheduledAction> = Vec::new();
        for action in rows {
            if group.first().is_some_and(|a| a.invoice_id != action.invoice_id) {
                schedules.extend(assemble(std::mem::take(&mut group)));
            }
            group.push(action);
        }
        schedules.extend(assemble(group));
        Ok(schedules)
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
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let cancelled = tx.execute(
            "UPDATE scheduled_actions SET status = 'cancelled', note = ?1
             WHERE invoice_id = ?2 AND status = 'pending'",
            params![format!("cancelled: {reason}"), invoice_id.as_str()],
        )?;
        tx.commit()?;
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
