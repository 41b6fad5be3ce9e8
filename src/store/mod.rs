//! Payment store (C6): the SQL-backed state machine for initiated,
//! outgoing, and incoming payments, with dedup, reconciliation, and
//! notify-driven long-poll wake-up.

pub mod error;
pub mod models;
pub mod notify;
pub mod queries;

use std::time::Duration;

use chrono::NaiveDate;
use sqlx::PgPool;

pub use error::StoreError;
pub use models::{
    IncomingKind, IncomingPayment, InitiatedPayment, InsertInitiatedOutcome, InsertOutgoingOutcome,
    OutgoingPayment, Reversal, SubmissionState,
};

use crate::amount::Amount;

/// Number of times a `Serialization` conflict is retried before surfacing
/// `StoreError::Serialization` to the caller (spec.md §7).
const SERIALIZATION_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Store {
        Store { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_initiated(
        &self,
        amount: &Amount,
        credit_payto_uri: &str,
        subject: &str,
        request_uid: &str,
    ) -> Result<InsertInitiatedOutcome, StoreError> {
        with_serialization_retry(|| {
            queries::insert_initiated(&self.pool, amount, credit_payto_uri, subject, request_uid)
        })
        .await
    }

    pub async fn take_unsubmitted(&self, limit: i64) -> Result<Vec<InitiatedPayment>, StoreError> {
        queries::take_unsubmitted(&self.pool, limit).await
    }

    pub async fn get_initiated(&self, id: i64) -> Result<Option<InitiatedPayment>, StoreError> {
        queries::get_initiated(&self.pool, id).await
    }

    pub async fn incoming_exists(&self, bank_id: &str) -> Result<bool, StoreError> {
        queries::incoming_exists(&self.pool, bank_id).await
    }

    pub async fn mark_submission(
        &self,
        id: i64,
        state: SubmissionState,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        queries::mark_submission(&self.pool, id, state, message).await
    }

    pub async fn insert_incoming(
        &self,
        bank_id: &str,
        amount: &Amount,
        subject: Option<&str>,
        executed_at: NaiveDate,
        debit_payto: Option<&str>,
        kind: IncomingKind,
    ) -> Result<IncomingPayment, StoreError> {
        with_serialization_retry(|| {
            queries::insert_incoming(&self.pool, bank_id, amount, subject, executed_at, debit_payto, kind)
        })
        .await
    }

    pub async fn insert_outgoing(
        &self,
        message_id: &str,
        amount: &Amount,
        subject: Option<&str>,
        executed_at: NaiveDate,
        credit_payto: Option<&str>,
        end_to_end_id: Option<&str>,
    ) -> Result<InsertOutgoingOutcome, StoreError> {
        with_serialization_retry(|| {
            queries::insert_outgoing(&self.pool, message_id, amount, subject, executed_at, credit_payto, end_to_end_id)
        })
        .await
    }

    pub async fn insert_reversal(
        &self,
        msg_id_of_original: &str,
        reason_code: Option<&str>,
        reason_text: Option<&str>,
        executed_at: NaiveDate,
    ) -> Result<(), StoreError> {
        queries::insert_reversal(&self.pool, msg_id_of_original, reason_code, reason_text, executed_at).await
    }

    pub async fn bounce_incoming(&self, incoming_id: i64, bounce_uid: &str) -> Result<i64, StoreError> {
        with_serialization_retry(|| queries::bounce_incoming(&self.pool, incoming_id, bounce_uid)).await
    }

    pub async fn get_high_water_mark(&self, default_date: NaiveDate) -> Result<NaiveDate, StoreError> {
        queries::get_high_water_mark(&self.pool, default_date).await
    }

    pub async fn advance_high_water_mark(&self, new_mark: NaiveDate) -> Result<(), StoreError> {
        queries::advance_high_water_mark(&self.pool, new_mark).await
    }

    /// Implements the long-poll contract of `spec.md` §4.6/P9: if rows are
    /// already available, return them immediately; otherwise subscribe and
    /// wait up to `long_poll_ms`, then re-query once regardless of whether
    /// a notification arrived (a notification is only a hint to look again).
    pub async fn history_incoming(
        &self,
        cursor: i64,
        limit: i64,
        long_poll_ms: u64,
        talerable_only: bool,
    ) -> Result<Vec<IncomingPayment>, StoreError> {
        let rows = queries::history_incoming(&self.pool, cursor, limit, talerable_only).await?;
        if !rows.is_empty() || long_poll_ms == 0 {
            return Ok(rows);
        }

        let mut sub = notify::NotifySubscription::subscribe(&self.pool, notify::INCOMING_CHANNEL).await?;
        let _ = sub.wait(Duration::from_millis(long_poll_ms)).await?;
        queries::history_incoming(&self.pool, cursor, limit, talerable_only).await
    }

    pub async fn history_outgoing(
        &self,
        cursor: i64,
        limit: i64,
        long_poll_ms: u64,
        talerable_only: bool,
    ) -> Result<Vec<OutgoingPayment>, StoreError> {
        let rows = queries::history_outgoing(&self.pool, cursor, limit, talerable_only).await?;
        if !rows.is_empty() || long_poll_ms == 0 {
            return Ok(rows);
        }

        let mut sub = notify::NotifySubscription::subscribe(&self.pool, notify::OUTGOING_CHANNEL).await?;
        let _ = sub.wait(Duration::from_millis(long_poll_ms)).await?;
        queries::history_outgoing(&self.pool, cursor, limit, talerable_only).await
    }
}

async fn with_serialization_retry<F, Fut, T>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < SERIALIZATION_RETRIES => {
                attempt += 1;
                continue;
            }
            Err(e) if e.is_retryable() => return Err(StoreError::Serialization),
            other => return other,
        }
    }
}
