use serde::{Deserialize, Serialize};

use cashguard_core::CustomerId;

/// Customer master data relevant to credit risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub name: String,
    /// Standard payment terms granted to the customer.
    pub payment_terms_days: u32,
    /// Credit limit in smallest currency unit. Zero means "no credit granted".
    pub credit_limit_cents: u64,
}

impl Customer {
    pub fn new(
        customer_id: impl Into<CustomerId>,
        name: impl Into<String>,
        payment_terms_days: u32,
        credit_limit_cents: u64,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            name: name.into(),
            payment_terms_days,
            credit_limit_cents,
        }
    }

    pub fn credit_limit(&self) -> f64 {
        self.credit_limit_cents as f64 / 100.0
    }
}
