//! Feature engineering, scoring, categorisation and prioritisation in one
//! pass over a dataset snapshot.
//!
//! Nothing here writes state. Running the same inputs twice gives the same
//! plan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cashguard_core::{CashGuardConfig, DomainError, ItemError, RiskTiers};
use cashguard_ledger::LedgerSnapshot;
use cashguard_receivables::ReceivablesDataset;
use cashguard_risk::{ScoreSource, Scorer, engineer_features};

use crate::cadence::CadenceSchedule;
use crate::prioritizer::{OutreachRequest, Prioritized, ScoredInvoice, prioritize, to_outreach};
use crate::scheduler::CadenceScheduler;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringBatch {
    /// One entry per open invoice that could be scored, ordered by invoice id.
    pub scored: Vec<ScoredInvoice>,
    #[serde(skip)]
    pub errors: Vec<ItemError>,
    pub source: ScoreSource,
}

/// Score every open invoice of `dataset` as of `as_of`.
pub fn score_open_invoices(
    dataset: &ReceivablesDataset,
    scorer: &Scorer,
    tiers: &RiskTiers,
    as_of: NaiveDate,
) -> ScoringBatch {
    let table = engineer_features(dataset, as_of);
    let batch = scorer.score(&table, tiers);
    let scored = table
        .rows
        .iter()
        .zip(&batch.scores)
        .map(|(row, score)| ScoredInvoice {
            invoice_id: row.invoice_id.clone(),
            customer_id: row.customer_id.clone(),
            score: score.score,
            category: score.category,
            due_date: row.due_date,
            days_overdue: row.days_overdue() as i64,
            amount_cents: row.amount_cents,
            outstanding_cents: row.outstanding_cents,
        })
        .collect::<Vec<_>>();

    tracing::info!(
        %as_of,
        scored = scored.len(),
        errors = batch.errors.len(),
        source = ?batch.source,
        "scored open invoices"
    );
    ScoringBatch {
        scored,
        errors: batch.errors,
        source: batch.source,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionsPlan {
    pub as_of: NaiveDate,
    pub source: ScoreSource,
    pub ranked: Vec<Prioritized>,
    pub outreach: Vec<OutreachRequest>,
    #[serde(skip)]
    pub errors: Vec<ItemError>,
}

/// Score, skip what the ledger already shows as paid, rank, and return the
/// top `top_n` outreach requests.
pub fn plan_collections(
    dataset: &ReceivablesDataset,
    scorer: &Scorer,
    config: &CashGuardConfig,
    ledger: &LedgerSnapshot,
    as_of: NaiveDate,
    top_n: usize,
) -> CollectionsPlan {
    let batch = score_open_invoices(dataset, scorer, &config.risk_tiers, as_of);
    let ranked = prioritize(&batch.scored, ledger, &config.escalation, top_n);
    let outreach = to_outreach(&ranked);
    CollectionsPlan {
        as_of,
        source: batch.source,
        ranked,
        outreach,
        errors: batch.errors,
    }
}

/// Cadence schedules for scored invoices, each at its scored tier.
pub fn schedule_scored(
    scheduler: &CadenceScheduler,
    dataset: &ReceivablesDataset,
    scored: &[ScoredInvoice],
) -> (Vec<CadenceSchedule>, Vec<ItemError>) {
    let mut missing = Vec::new();
    let items: Vec<_> = scored
        .iter()
        .filter_map(|s| match dataset.invoice(&s.invoice_id) {
            Some(invoice) => Some((invoice, s.category)),
            None => {
                missing.push(ItemError::new(
                    s.invoice_id.as_str(),
                    DomainError::not_found(format!("invoice {}", s.invoice_id)),
                ));
                None
            }
        })
        .collect();
    let (schedules, mut errors) = scheduler.generate_batch(items);
    errors.extend(missing);
    (schedules, errors)
}
