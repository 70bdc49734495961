use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashguard_core::{InvoiceId, PaymentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Pending,
    Failed,
    Reversed,
}

/// A payment against one invoice.
///
/// Used only to derive historical late-payment behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub payment_date: NaiveDate,
    /// Amount in smallest currency unit.
    pub amount_cents: u64,
    pub status: PaymentStatus,
}

impl Payment {
    pub fn completed(
        payment_id: impl Into<PaymentId>,
        invoice_id: impl Into<InvoiceId>,
        payment_date: NaiveDate,
        amount_cents: u64,
    ) -> Self {
        Self {
            payment_id: payment_id.into(),
            invoice_id: invoice_id.into(),
            payment_date,
            amount_cents,
            status: PaymentStatus::Completed,
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }

    /// Only completed payments move money.
    pub fn counts(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}
