//! The validated receivables snapshot every downstream component reads from.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use cashguard_core::{CustomerId, DomainError, DomainResult, InvoiceId};

use crate::customer::Customer;
use crate::invoice::Invoice;
use crate::payment::Payment;

/// Customers, invoices and payments after referential checks.
///
/// Rows are re-keyed into ordered maps on construction, so iteration order is
/// id-ascending no matter how the loader ordered its tables. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivablesDataset {
    customers: BTreeMap<CustomerId, Customer>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    /// Payments per invoice, sorted by (payment_date, payment_id).
    payments: BTreeMap<InvoiceId, Vec<Payment>>,
}

impl ReceivablesDataset {
    /// Validate and index the three tables.
    ///
    /// Fails on duplicate identifiers, dangling foreign keys, zero amounts and
    /// invoices due before they were issued. Nothing is partially accepted.
    pub fn new(
        customers: Vec<Customer>,
        invoices: Vec<Invoice>,
        payments: Vec<Payment>,
    ) -> DomainResult<Self> {
        let mut customer_map = BTreeMap::new();
        for customer in customers {
            let id = customer.customer_id.clone();
            if customer_map.insert(id.clone(), customer).is_some() {
                return Err(DomainError::validation(format!("duplicate customer id {id}")));
            }
        }

        let mut invoice_map = BTreeMap::new();
        for invoice in invoices {
            invoice.validate()?;
            if !customer_map.contains_key(&invoice.customer_id) {
                return Err(DomainError::validation(format!(
                    "invoice {} references unknown customer {}",
                    invoice.invoice_id, invoice.customer_id
                )));
            }
            let id = invoice.invoice_id.clone();
            if invoice_map.insert(id.clone(), invoice).is_some() {
                return Err(DomainError::validation(format!("duplicate invoice id {id}")));
            }
        }

        let mut seen_payments = std::collections::BTreeSet::new();
        let mut payment_map: BTreeMap<InvoiceId, Vec<Payment>> = BTreeMap::new();
        for payment in payments {
            if !seen_payments.insert(payment.payment_id.clone()) {
                return Err(DomainError::validation(format!(
                    "duplicate payment id {}",
                    payment.payment_id
                )));
            }
            if !invoice_map.contains_key(&payment.invoice_id) {
                return Err(DomainError::validation(format!(
                    "payment {} references unknown invoice {}",
                    payment.payment_id, payment.invoice_id
                )));
            }
            if payment.amount_cents == 0 {
                return Err(DomainError::validation(format!(
                    "payment {} amount must be positive",
                    payment.payment_id
                )));
            }
            payment_map
                .entry(payment.invoice_id.clone())
                .or_default()
                .push(payment);
        }
        for rows in payment_map.values_mut() {
            rows.sort_by(|a, b| {
                a.payment_date
                    .cmp(&b.payment_date)
                    .then_with(|| a.payment_id.cmp(&b.payment_id))
            });
        }

        tracing::debug!(
            customers = customer_map.len(),
            invoices = invoice_map.len(),
            payments = seen_payments.len(),
            "receivables dataset validated"
        );

        Ok(Self {
            customers: customer_map,
            invoices: invoice_map,
            payments: payment_map,
        })
    }

    pub fn customer(&self, id: &CustomerId) -> Option<&Customer> {
        self.customers.get(id)
    }

    pub fn invoice(&self, id: &InvoiceId) -> Option<&Invoice> {
        self.invoices.get(id)
    }

    /// All customers, id-ascending.
    pub fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.values()
    }

    /// All invoices, id-ascending.
    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    /// Open invoices, id-ascending.
    pub fn open_invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values().filter(|i| i.is_open())
    }

    /// Payments of one invoice, oldest first.
    pub fn payments_for(&self, invoice_id: &InvoiceId) -> &[Payment] {
        self.payments
            .get(invoice_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Completed payments received on or before `as_of`.
    pub fn paid_as_of(&self, invoice_id: &InvoiceId, as_of: NaiveDate) -> u64 {
        self.payments_for(invoice_id)
            .iter()
            .filter(|p| p.counts() && p.payment_date <= as_of)
            .map(|p| p.amount_cents)
            .sum()
    }

    /// Amount still owed on `as_of` (never negative).
    pub fn outstanding_as_of(&self, invoice: &Invoice, as_of: NaiveDate) -> u64 {
        invoice
            .amount_cents
            .saturating_sub(self.paid_as_of(&invoice.invoice_id, as_of))
    }

    /// Date on which completed payments first covered the full amount.
    pub fn settlement_date(&self, invoice: &Invoice) -> Option<NaiveDate> {
        let mut paid: u64 = 0;
        for payment in self.payments_for(&invoice.invoice_id) {
            if !payment.counts() {
                continue;
            }
            paid = paid.saturating_add(payment.amount_cents);
            if paid >= invoice.amount_cents {
                return Some(payment.payment_date);
            }
        }
        None
    }

    /// Invoices of one customer, id-ascending.
    pub fn invoices_of<'a>(&'a self, customer_id: &'a CustomerId) -> impl Iterator<Item = &'a Invoice> + 'a {
        self.invoices
            .values()
            .filter(move |i| &i.customer_id == customer_id)
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.len()
    }
}
