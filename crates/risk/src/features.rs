//! Feature engineering for late-payment risk.
//!
//! One row builder ([`build_row`]) serves both inference ([`engineer_features`])
//! and training ([`training_features`]). The only thing that differs between
//! the two is the date the row is computed "as of".

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, DomainError, DomainResult, InvoiceId, ItemError};
use cashguard_receivables::{Invoice, InvoiceStatus, ReceivablesDataset};

pub const FEATURE_COUNT: usize = 25;

/// Column order of every [`FeatureRow`]. Persisted with the model artifact and
/// compared on load.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "days_until_due",
    "days_since_issue",
    "days_overdue",
    "payment_term_days",
    "customer_terms_days",
    "terms_deviation_days",
    "issue_month",
    "issue_quarter",
    "issue_day_of_week",
    "issue_is_weekend",
    "due_day_of_week",
    "due_is_weekend",
    "invoice_amount_log",
    "invoice_amount_sqrt",
    "credit_limit_log",
    "credit_utilization",
    "customer_invoice_count",
    "customer_avg_days_late",
    "customer_late_rate",
    "customer_avg_payment_log",
    "customer_ar_concentration",
    "outstanding_ratio",
    "amount_x_days_until_due",
    "amount_x_late_rate",
    "utilization_x_late_rate",
];

/// Upper clip for credit utilization (200%).
const MAX_UTILIZATION: f64 = 2.0;

/// Feature vector of one invoice plus the identifying fields scorers need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount_cents: u64,
    pub outstanding_cents: u64,
    pub values: [f64; FEATURE_COUNT],
}

impl FeatureRow {
    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<f64> {
        FEATURE_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.values[idx])
    }

    pub fn days_overdue(&self) -> f64 {
        self.values[col::DAYS_OVERDUE]
    }

    pub fn customer_terms_days(&self) -> f64 {
        self.values[col::CUSTOMER_TERMS_DAYS]
    }

    pub fn credit_utilization(&self) -> f64 {
        self.values[col::CREDIT_UTILIZATION]
    }
}

/// Column indices used by code that reads individual features.
pub(crate) mod col {
    pub const DAYS_OVERDUE: usize = 2;
    pub const CUSTOMER_TERMS_DAYS: usize = 4;
    pub const CREDIT_UTILIZATION: usize = 15;
}

/// Rows that built cleanly plus one error per invoice that did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    pub errors: Vec<ItemError>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Settled payment behaviour of one customer before a cutoff date.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CustomerHistory {
    pub invoice_count: usize,
    pub late_count: usize,
    pub total_days_late: i64,
    pub total_paid_cents: u64,
}

impl CustomerHistory {
    pub fn late_rate(&self) -> f64 {
        ratio(self.late_count as f64, self.invoice_count as f64)
    }

    pub fn avg_days_late(&self) -> f64 {
        ratio(self.total_days_late as f64, self.invoice_count as f64)
    }

    /// Average settled invoice amount in major units.
    pub fn avg_payment(&self) -> f64 {
        ratio(self.total_paid_cents as f64 / 100.0, self.invoice_count as f64)
    }
}

/// Invoices issued before `cutoff` whose settling payment also landed before it.
pub fn customer_history(
    dataset: &ReceivablesDataset,
    customer_id: &CustomerId,
    cutoff: NaiveDate,
) -> CustomerHistory {
    let mut history = CustomerHistory::default();
    for invoice in dataset.invoices_of(customer_id) {
        if invoice.issue_date >= cutoff || invoice.status == InvoiceStatus::Void {
            continue;
        }
        let Some(settled) = dataset.settlement_date(invoice) else {
            continue;
        };
        if settled >= cutoff {
            continue;
        }
        let days_late = (settled - invoice.due_date).num_days().max(0);
        history.invoice_count += 1;
        history.total_paid_cents += invoice.amount_cents;
        history.total_days_late += days_late;
        if days_late > 0 {
            history.late_count += 1;
        }
    }
    history
}

/// Receivable exposure per customer on one date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exposure {
    per_customer: BTreeMap<CustomerId, u64>,
    total: u64,
}

impl Exposure {
    /// Outstanding amounts of every invoice issued on or before `as_of`.
    pub fn as_of(dataset: &ReceivablesDataset, as_of: NaiveDate) -> Self {
        let mut exposure = Self::default();
        for invoice in dataset.invoices() {
            if invoice.issue_date > as_of || invoice.status == InvoiceStatus::Void {
                continue;
            }
            // A paid invoice without a recorded settlement is treated as settled.
            if invoice.status == InvoiceStatus::Paid && dataset.settlement_date(invoice).is_none() {
                continue;
            }
            let outstanding = dataset.outstanding_as_of(invoice, as_of);
            if outstanding == 0 {
                continue;
            }
            *exposure
                .per_customer
                .entry(invoice.customer_id.clone())
                .or_default() += outstanding;
            exposure.total += outstanding;
        }
        exposure
    }

    pub fn customer(&self, customer_id: &CustomerId) -> u64 {
        self.per_customer.get(customer_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Build the feature row of `invoice` as seen on `as_of`.
pub fn build_row(
    dataset: &ReceivablesDataset,
    invoice: &Invoice,
    as_of: NaiveDate,
    exposure: &Exposure,
) -> DomainResult<FeatureRow> {
    let customer = dataset.customer(&invoice.customer_id).ok_or_else(|| {
        DomainError::not_found(format!("customer {} of invoice {}", invoice.customer_id, invoice.invoice_id))
    })?;
    let history = customer_history(dataset, &invoice.customer_id, as_of);

    let outstanding_cents = dataset.outstanding_as_of(invoice, as_of);
    let amount = invoice.amount();
    let credit_limit = customer.credit_limit();
    let customer_outstanding = exposure.customer(&invoice.customer_id) as f64 / 100.0;

    let days_until_due = invoice.days_until_due(as_of) as f64;
    let payment_term_days = invoice.payment_term_days() as f64;
    let customer_terms_days = f64::from(customer.payment_terms_days);

    let credit_utilization = if credit_limit > 0.0 {
        (customer_outstanding / credit_limit).clamp(0.0, MAX_UTILIZATION)
    } else if customer_outstanding > 0.0 {
        MAX_UTILIZATION
    } else {
        0.0
    };
    let late_rate = history.late_rate();
    let amount_log = amount.ln_1p();

    let values = [
        days_until_due,
        (as_of - invoice.issue_date).num_days() as f64,
        invoice.days_overdue(as_of) as f64,
        payment_term_days,
        customer_terms_days,
        payment_term_days - customer_terms_days,
        f64::from(invoice.issue_date.month()),
        f64::from((invoice.issue_date.month() - 1) / 3 + 1),
        f64::from(invoice.issue_date.weekday().num_days_from_monday()),
        flag(is_weekend(invoice.issue_date)),
        f64::from(invoice.due_date.weekday().num_days_from_monday()),
        flag(is_weekend(invoice.due_date)),
        amount_log,
        amount.sqrt(),
        credit_limit.ln_1p(),
        credit_utilization,
        history.invoice_count as f64,
        history.avg_days_late(),
        late_rate,
        history.avg_payment().ln_1p(),
        ratio(exposure.customer(&invoice.customer_id) as f64, exposure.total() as f64) * 100.0,
        ratio(outstanding_cents as f64, invoice.amount_cents as f64),
        amount_log * days_until_due,
        amount_log * late_rate,
        credit_utilization * late_rate,
    ];

    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(DomainError::validation(format!(
            "feature {} is not finite for invoice {}",
            FEATURE_COLUMNS[idx], invoice.invoice_id
        )));
    }

    Ok(FeatureRow {
        invoice_id: invoice.invoice_id.clone(),
        customer_id: invoice.customer_id.clone(),
        issue_date: invoice.issue_date,
        due_date: invoice.due_date,
        amount_cents: invoice.amount_cents,
        outstanding_cents,
        values,
    })
}

/// Feature rows for every open invoice on `as_of`, ordered by invoice id.
pub fn engineer_features(dataset: &ReceivablesDataset, as_of: NaiveDate) -> FeatureTable {
    let exposure = Exposure::as_of(dataset, as_of);
    let mut table = FeatureTable::default();
    for invoice in dataset.open_invoices() {
        match build_row(dataset, invoice, as_of, &exposure) {
            Ok(row) => table.rows.push(row),
            Err(err) => table.errors.push(ItemError::new(invoice.invoice_id.as_str(), err)),
        }
    }
    tracing::debug!(
        rows = table.rows.len(),
        errors = table.errors.len(),
        %as_of,
        "engineered inference features"
    );
    table
}

/// Labelled rows for every settled invoice, each built as of its own issue
/// date. A row is labelled late when it settled more than
/// `late_threshold_days` after its due date.
pub fn training_features(
    dataset: &ReceivablesDataset,
    late_threshold_days: i64,
) -> (FeatureTable, Vec<bool>) {
    let mut exposures: BTreeMap<NaiveDate, Exposure> = BTreeMap::new();
    let mut table = FeatureTable::default();
    let mut labels = Vec::new();

    for invoice in dataset.invoices() {
        if invoice.status == InvoiceStatus::Void {
            continue;
        }
        let Some(settled) = dataset.settlement_date(invoice) else {
            continue;
        };
        let exposure = exposures
            .entry(invoice.issue_date)
            .or_insert_with(|| Exposure::as_of(dataset, invoice.issue_date));
        match build_row(dataset, invoice, invoice.issue_date, exposure) {
            Ok(row) => {
                table.rows.push(row);
                labels.push((settled - invoice.due_date).num_days() > late_threshold_days);
            }
            Err(err) => table.errors.push(ItemError::new(invoice.invoice_id.as_str(), err)),
        }
    }

    tracing::debug!(
        rows = table.rows.len(),
        late = labels.iter().filter(|l| **l).count(),
        errors = table.errors.len(),
        "engineered training features"
    );
    (table, labels)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
