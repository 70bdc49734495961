use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, DomainError, InvoiceId};

/// Invoice status lifecycle.
///
/// Only `Open` invoices take part in scoring and collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
    WrittenOff,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::WrittenOff => "written_off",
        }
    }
}

/// Invoice as delivered by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    /// Amount in smallest currency unit (e.g., cents).
    pub amount_cents: u64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn new(
        invoice_id: impl Into<InvoiceId>,
        customer_id: impl Into<CustomerId>,
        amount_cents: u64,
        issue_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            customer_id: customer_id.into(),
            amount_cents,
            issue_date,
            due_date,
            status: InvoiceStatus::Open,
        }
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == InvoiceStatus::Open
    }

    /// Amount in major currency units.
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }

    /// Agreed term of this invoice (due date minus issue date).
    pub fn payment_term_days(&self) -> i64 {
        (self.due_date - self.issue_date).num_days()
    }

    /// Negative once the invoice is past due.
    pub fn days_until_due(&self, as_of: NaiveDate) -> i64 {
        (self.due_date - as_of).num_days()
    }

    /// Zero until the due date has passed.
    pub fn days_overdue(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.due_date).num_days().max(0)
    }

    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        if self.amount_cents == 0 {
            return Err(DomainError::validation(format!(
                "invoice {} amount must be positive",
                self.invoice_id
            )));
        }
        if self.due_date < self.issue_date {
            return Err(DomainError::validation(format!(
                "invoice {} due date {} precedes issue date {}",
                self.invoice_id, self.due_date, self.issue_date
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn overdue_and_until_due_are_complementary() {
        let invoice = Invoice::new("INV-1", "C-1", 10_000, date(2024, 1, 1), date(2024, 1, 31));
        assert_eq!(invoice.payment_term_days(), 30);
        assert_eq!(invoice.days_until_due(date(2024, 1, 21)), 10);
        assert_eq!(invoice.days_overdue(date(2024, 1, 21)), 0);
        assert_eq!(invoice.days_until_due(date(2024, 2, 10)), -10);
        assert_eq!(invoice.days_overdue(date(2024, 2, 10)), 10);
    }

    #[test]
    fn zero_amount_and_inverted_dates_are_rejected() {
        let zero = Invoice::new("INV-1", "C-1", 0, date(2024, 1, 1), date(2024, 1, 31));
        assert!(matches!(zero.validate(), Err(DomainError::Validation(_))));

        let inverted = Invoice::new("INV-2", "C-1", 100, date(2024, 2, 1), date(2024, 1, 1));
        assert!(matches!(inverted.validate(), Err(DomainError::Validation(msg)) if msg.contains("precedes")));
    }
}
