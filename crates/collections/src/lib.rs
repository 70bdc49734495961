//! Collections workflow on top of risk scores.
//!
//! Ranks scored invoices into an outreach list, keeps a per-invoice cadence
//! of follow-up attempts, and feeds ledger outcomes back into the cadence.

pub mod cadence;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod prioritizer;
pub mod recommend;
pub mod scheduler;
pub mod store;

pub use cadence::{ActionStatus, CadenceSchedule, ScheduledAction};
pub use error::{ScheduleError, ScheduleResult};
pub use feedback::{FeedbackReport, record_outcome};
pub use pipeline::{CollectionsPlan, ScoringBatch, plan_collections, schedule_scored, score_open_invoices};
pub use prioritizer::{OutreachRequest, Prioritized, ScoredInvoice, prioritize, to_outreach};
pub use recommend::{recommend_action, rung_by_overdue};
pub use scheduler::{CadenceScheduler, ScheduleEffectiveness, get_due_actions, schedule_effectiveness};
pub use store::{InMemoryScheduleStore, ScheduleStore, SqliteScheduleStore};
