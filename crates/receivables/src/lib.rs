//! Receivables data model.
//!
//! Customers, invoices and payments as they arrive from the loader, plus the
//! validated [`ReceivablesDataset`] that the risk and collections crates read.
//! Deterministic domain logic only (no IO, no storage).

pub mod customer;
pub mod dataset;
pub mod invoice;
pub mod payment;

pub use customer::Customer;
pub use dataset::ReceivablesDataset;
pub use invoice::{Invoice, InvoiceStatus};
pub use payment::{Payment, PaymentStatus};
