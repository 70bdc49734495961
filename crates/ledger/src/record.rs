//! Ledger record types.
//!
//! `New*` structs are what callers submit; `*Record` structs are what the
//! ledger stores and returns, with their assigned ids.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cashguard_core::{CustomerId, DomainError, InvoiceId};

/// Enum stored as a snake_case string (SQLite column, JSON, logs).
macro_rules! stored_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DomainError::validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

stored_enum!(
    /// Collections action, in escalation order.
    ActionType {
        FriendlyReminder => "friendly_reminder",
        SecondNotice => "second_notice",
        CallRequest => "call_request",
        PaymentPlan => "payment_plan",
        Escalate => "escalate",
    }
);

impl ActionType {
    /// Position on the escalation ladder (0 = gentlest).
    pub fn rung(&self) -> usize {
        *self as usize
    }

    /// Action at a ladder position; positions past the top stay at `Escalate`.
    pub fn from_rung(rung: usize) -> Self {
        Self::ALL
            .get(rung)
            .copied()
            .unwrap_or(ActionType::Escalate)
    }
}

stored_enum!(Channel {
    Email => "email",
    Sms => "sms",
    Phone => "phone",
    Letter => "letter",
});

stored_enum!(ResponseType {
    Email => "email",
    Call => "call",
    NoResponse => "no_response",
});

stored_enum!(OutcomeType {
    Paid => "paid",
    Partial => "partial",
    WrittenOff => "written_off",
    Disputed => "disputed",
});

impl ResponseType {
    /// `NoResponse` entries document silence and do not count as a reply.
    pub fn is_reply(&self) -> bool {
        !matches!(self, ResponseType::NoResponse)
    }
}

impl OutcomeType {
    pub fn collects_money(&self) -> bool {
        matches!(self, OutcomeType::Paid | OutcomeType::Partial)
    }

    /// Outcomes after which no further follow-up makes sense.
    pub fn closes_invoice(&self) -> bool {
        matches!(self, OutcomeType::Paid | OutcomeType::WrittenOff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeId(pub i64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outreach that was sent (or a call that was made).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub action_type: ActionType,
    pub channel: Channel,
    pub at: DateTime<Utc>,
    pub scheduled_date: Option<NaiveDate>,
    pub attempt_number: Option<u32>,
    /// Reference to the rendered message (template id, document path).
    pub content_ref: Option<String>,
    pub sent_by: Option<String>,
    pub notes: Option<String>,
}

impl NewAction {
    pub fn new(
        invoice_id: impl Into<InvoiceId>,
        customer_id: impl Into<CustomerId>,
        action_type: ActionType,
        channel: Channel,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            customer_id: customer_id.into(),
            action_type,
            channel,
            at,
            scheduled_date: None,
            attempt_number: None,
            content_ref: None,
            sent_by: None,
            notes: None,
        }
    }

    /// Link the action to the cadence slot it fulfils.
    pub fn for_attempt(mut self, attempt_number: u32, scheduled_date: NaiveDate) -> Self {
        self.attempt_number = Some(attempt_number);
        self.scheduled_date = Some(scheduled_date);
        self
    }

    pub fn with_content_ref(mut self, content_ref: impl Into<String>) -> Self {
        self.content_ref = Some(content_ref.into());
        self
    }

    pub fn sent_by(mut self, who: impl Into<String>) -> Self {
        self.sent_by = Some(who.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        if self.attempt_number == Some(0) {
            return Err(DomainError::validation("attempt numbers start at 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: ActionId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub action_type: ActionType,
    pub channel: Channel,
    pub logged_at: DateTime<Utc>,
    pub scheduled_date: Option<NaiveDate>,
    pub attempt_number: Option<u32>,
    pub content_ref: Option<String>,
    pub sent_by: Option<String>,
    pub notes: Option<String>,
}

impl ActionRecord {
    pub(crate) fn from_new(action_id: ActionId, new: NewAction) -> Self {
        Self {
            action_id,
            invoice_id: new.invoice_id,
            customer_id: new.customer_id,
            action_type: new.action_type,
            channel: new.channel,
            logged_at: new.at,
            scheduled_date: new.scheduled_date,
            attempt_number: new.attempt_number,
            content_ref: new.content_ref,
            sent_by: new.sent_by,
            notes: new.notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResponse {
    pub response_type: ResponseType,
    pub at: DateTime<Utc>,
    pub response_text: Option<String>,
    pub payment_promised: bool,
    pub payment_plan_accepted: bool,
    pub notes: Option<String>,
}

impl NewResponse {
    pub fn new(response_type: ResponseType, at: DateTime<Utc>) -> Self {
        Self {
            response_type,
            at,
            response_text: None,
            payment_promised: false,
            payment_plan_accepted: false,
            notes: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.response_text = Some(text.into());
        self
    }

    pub fn promising_payment(mut self) -> Self {
        self.payment_promised = true;
        self
    }

    pub fn accepting_plan(mut self) -> Self {
        self.payment_plan_accepted = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub response_id: ResponseId,
    pub action_id: ActionId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub response_type: ResponseType,
    pub responded_at: DateTime<Utc>,
    pub response_text: Option<String>,
    pub payment_promised: bool,
    pub payment_plan_accepted: bool,
    pub notes: Option<String>,
}

impl ResponseRecord {
    pub(crate) fn from_new(response_id: ResponseId, action: &ActionRecord, new: NewResponse) -> Self {
        Self {
            response_id,
            action_id: action.action_id,
            invoice_id: action.invoice_id.clone(),
            customer_id: action.customer_id.clone(),
            response_type: new.response_type,
            responded_at: new.at,
            response_text: new.response_text,
            payment_promised: new.payment_promised,
            payment_plan_accepted: new.payment_plan_accepted,
            notes: new.notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutcome {
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub outcome_type: OutcomeType,
    pub at: DateTime<Utc>,
    pub amount_collected_cents: u64,
    /// Days from due date (or first contact) to payment, as reported.
    pub days_to_payment: Option<i64>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl NewOutcome {
    pub fn new(
        invoice_id: impl Into<InvoiceId>,
        customer_id: impl Into<CustomerId>,
        outcome_type: OutcomeType,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            customer_id: customer_id.into(),
            outcome_type,
            at,
            amount_collected_cents: 0,
            days_to_payment: None,
            payment_method: None,
            notes: None,
        }
    }

    pub fn paid(
        invoice_id: impl Into<InvoiceId>,
        customer_id: impl Into<CustomerId>,
        at: DateTime<Utc>,
        amount_collected_cents: u64,
        days_to_payment: i64,
    ) -> Self {
        Self::new(invoice_id, customer_id, OutcomeType::Paid, at)
            .with_amount(amount_collected_cents)
            .with_days_to_payment(days_to_payment)
    }

    pub fn with_amount(mut self, cents: u64) -> Self {
        self.amount_collected_cents = cents;
        self
    }

    pub fn with_days_to_payment(mut self, days: i64) -> Self {
        self.days_to_payment = Some(days);
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DomainError> {
        if self.days_to_payment.is_some_and(|d| d < 0) {
            return Err(DomainError::validation(format!(
                "outcome for invoice {}: days_to_payment must not be negative",
                self.invoice_id
            )));
        }
        if self.outcome_type == OutcomeType::Partial && self.amount_collected_cents == 0 {
            return Err(DomainError::validation(format!(
                "partial outcome for invoice {} must collect a positive amount",
                self.invoice_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub outcome_id: OutcomeId,
    pub invoice_id: InvoiceId,
    pub customer_id: CustomerId,
    pub outcome_type: OutcomeType,
    pub recorded_at: DateTime<Utc>,
    pub amount_collected_cents: u64,
    pub days_to_payment: Option<i64>,
    /// Action credited with this outcome, fixed when the outcome was logged.
    pub attributed_action: Option<ActionId>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl OutcomeRecord {
    pub(crate) fn from_new(
        outcome_id: OutcomeId,
        attributed_action: Option<ActionId>,
        new: NewOutcome,
    ) -> Self {
        Self {
            outcome_id,
            invoice_id: new.invoice_id,
            customer_id: new.customer_id,
            outcome_type: new.outcome_type,
            recorded_at: new.at,
            amount_collected_cents: new.amount_collected_cents,
            days_to_payment: new.days_to_payment,
            attributed_action,
            payment_method: new.payment_method,
            notes: new.notes,
        }
    }
}
