use chrono::{DateTime, NaiveDate, Utc};

use crate::amount::Amount;

/// One-directional lifecycle per `spec.md` §3: `Unsubmitted` may revisit
/// `TransientFailure` any number of times, but `Success` and
/// `PermanentFailure` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SubmissionState {
    Unsubmitted,
    TransientFailure,
    Success,
    PermanentFailure,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionState::Success | SubmissionState::PermanentFailure)
    }
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub id: i64,
    pub amount: Amount,
    pub credit_payto_uri: String,
    pub subject: String,
    pub request_uid: String,
    pub created_at: DateTime<Utc>,
    pub submitted: SubmissionState,
    pub failure_message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub end_to_end_id: String,
}

impl InitiatedPayment {
    /// The bank-visible end-to-end id is derived deterministically from the
    /// row id so C8's reconciliation pass can recompute it from an
    /// `Outgoing` echo without a lookup table.
    pub fn derive_end_to_end_id(id: i64) -> String {
        format!("nexus-e2e-{id}")
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingPayment {
    pub row_id: i64,
    pub message_id: String,
    pub amount: Amount,
    pub subject: Option<String>,
    pub executed_at: NaiveDate,
    pub credit_payto: Option<String>,
    pub reconciled_initiated_id: Option<i64>,
    pub reversed: bool,
    pub is_talerable: bool,
}

#[derive(Debug, Clone)]
pub struct IncomingPayment {
    pub row_id: i64,
    pub bank_id: String,
    pub amount: Amount,
    pub subject: Option<String>,
    pub executed_at: NaiveDate,
    pub debit_payto: Option<String>,
    pub bounced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingKind {
    Normal,
    Exchange,
}

#[derive(Debug, Clone)]
pub struct Reversal {
    pub msg_id_of_original: String,
    pub reason_code: Option<String>,
    pub reason_text: Option<String>,
    pub executed_at: NaiveDate,
}

/// Outcome of [`super::queries::insert_initiated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertInitiatedOutcome {
    Success(i64),
    UniqueViolation(i64),
}

/// Outcome of [`super::queries::insert_outgoing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutgoingOutcome {
    Success(i64),
    Reconciled(i64),
    InitiatedNotFound(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_id_is_deterministic_and_distinct() {
        assert_eq!(InitiatedPayment::derive_end_to_end_id(42), InitiatedPayment::derive_end_to_end_id(42));
        assert_ne!(InitiatedPayment::derive_end_to_end_id(1), InitiatedPayment::derive_end_to_end_id(2));
    }

    #[test]
    fn terminal_states() {
        assert!(SubmissionState::Success.is_terminal());
        assert!(SubmissionState::PermanentFailure.is_terminal());
        assert!(!SubmissionState::Unsubmitted.is_terminal());
        assert!(!SubmissionState::TransientFailure.is_terminal());
    }
}
