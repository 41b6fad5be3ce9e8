use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::amount::Amount;

use super::error::StoreError;
use super::models::{
    IncomingKind, IncomingPayment, InitiatedPayment, InsertInitiatedOutcome, InsertOutgoingOutcome,
    OutgoingPayment, SubmissionState,
};

fn submission_state_str(s: SubmissionState) -> &'static str {
    match s {
        SubmissionState::Unsubmitted => "unsubmitted",
        SubmissionState::TransientFailure => "transient_failure",
        SubmissionState::Success => "success",
        SubmissionState::PermanentFailure => "permanent_failure",
    }
}

fn parse_submission_state(s: &str) -> SubmissionState {
    match s {
        "transient_failure" => SubmissionState::TransientFailure,
        "success" => SubmissionState::Success,
        "permanent_failure" => SubmissionState::PermanentFailure,
        _ => SubmissionState::Unsubmitted,
    }
}

fn parse_amount(raw: &str) -> Result<Amount, StoreError> {
    raw.parse().map_err(|_| StoreError::Database(sqlx::Error::Decode("stored amount is malformed".into())))
}

async fn begin_serializable(pool: &PgPool) -> Result<Transaction<'_, Postgres>, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await?;
    Ok(tx)
}

/// Inserts a newly requested outgoing transfer. Unique on `request_uid`
/// (P1): a conflicting insert returns the existing row's id rather than
/// erroring, so `POST /transfer` retries are idempotent.
pub async fn insert_initiated(
    pool: &PgPool,
    amount: &Amount,
    credit_payto_uri: &str,
    subject: &str,
    request_uid: &str,
) -> Result<InsertInitiatedOutcome, StoreError> {
    let mut tx = begin_serializable(pool).await?;

    if let Some(row) = sqlx::query!(
        "SELECT id FROM initiated_payments WHERE request_uid = $1",
        request_uid
    )
    .fetch_optional(&mut *tx)
    .await?
    {
        return Ok(InsertInitiatedOutcome::UniqueViolation(row.id));
    }

    let rec = sqlx::query!(
        r#"INSERT INTO initiated_payments (amount, credit_payto_uri, subject, request_uid, submitted)
           VALUES ($1, $2, $3, $4, 'unsubmitted')
           RETURNING id"#,
        amount.to_string(),
        credit_payto_uri,
        subject,
        request_uid,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| StoreError::from_insert(e, "initiated_payments.request_uid"))?;

    tx.commit().await?;
    Ok(InsertInitiatedOutcome::Success(rec.id))
}

/// Fetches one initiated payment by id, used by the HTTP façade to decide
/// whether a `request_uid` replay is an idempotent retry (same fields) or a
/// conflicting reuse (`spec.md` S1).
pub async fn get_initiated(pool: &PgPool, id: i64) -> Result<Option<InitiatedPayment>, StoreError> {
    let row = sqlx::query!(
        r#"SELECT id, amount, credit_payto_uri, subject, request_uid, created_at,
                  submitted, failure_message, submitted_at
           FROM initiated_payments WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(InitiatedPayment {
            id: r.id,
            amount: parse_amount(&r.amount)?,
            credit_payto_uri: r.credit_payto_uri,
            subject: r.subject,
            request_uid: r.request_uid,
            created_at: r.created_at,
            submitted: parse_submission_state(&r.submitted),
            failure_message: r.failure_message,
            submitted_at: r.submitted_at,
            end_to_end_id: InitiatedPayment::derive_end_to_end_id(r.id),
        })
    })
    .transpose()
}

/// Whether an incoming payment with this `bank_id` already exists, used by
/// `POST /admin/add-incoming` to return `409` on reserve-pub reuse rather
/// than silently treating every replay as success (unlike `/transfer`,
/// `spec.md` §4.9 does not describe an idempotent-replay case here).
pub async fn incoming_exists(pool: &PgPool, bank_id: &str) -> Result<bool, StoreError> {
    let row = sqlx::query!("SELECT 1 as present FROM incoming_payments WHERE bank_id = $1", bank_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn take_unsubmitted(pool: &PgPool, limit: i64) -> Result<Vec<InitiatedPayment>, StoreError> {
    let rows = sqlx::query!(
        r#"SELECT id, amount, credit_payto_uri, subject, request_uid, created_at,
                  submitted, failure_message, submitted_at
           FROM initiated_payments
           WHERE submitted IN ('unsubmitted', 'transient_failure')
           ORDER BY id ASC
           LIMIT $1"#,
        limit,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(InitiatedPayment {
                id: r.id,
                amount: parse_amount(&r.amount)?,
                credit_payto_uri: r.credit_payto_uri,
                subject: r.subject,
                request_uid: r.request_uid,
                created_at: r.created_at,
                submitted: parse_submission_state(&r.submitted),
                failure_message: r.failure_message,
                submitted_at: r.submitted_at,
                end_to_end_id: InitiatedPayment::derive_end_to_end_id(r.id),
            })
        })
        .collect()
}

/// Transitions a row's submission state. One-directional per `spec.md` §3:
/// callers are expected to have already checked the row isn't terminal, but
/// this is enforced here too so a racing submit loop can't regress it.
pub async fn mark_submission(
    pool: &PgPool,
    id: i64,
    state: SubmissionState,
    message: Option<&str>,
) -> Result<(), StoreError> {
    let now: Option<DateTime<Utc>> = if state == SubmissionState::Success { Some(Utc::now()) } else { None };

    let result = sqlx::query!(
        r#"UPDATE initiated_payments
           SET submitted = $1, failure_message = $2, submitted_at = COALESCE($3, submitted_at)
           WHERE id = $4 AND submitted NOT IN ('success', 'permanent_failure')"#,
        submission_state_str(state),
        message,
        now,
        id,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Idempotent on `bank_id` (P4). When `kind` is `Exchange` and the subject
/// parses as a reserve public key, flags the row `is_talerable` in the same
/// insert so the talerable-incoming cursor sees it atomically.
pub async fn insert_incoming(
    pool: &PgPool,
    bank_id: &str,
    amount: &Amount,
    subject: Option<&str>,
    executed_at: NaiveDate,
    debit_payto: Option<&str>,
    kind: IncomingKind,
) -> Result<IncomingPayment, StoreError> {
    let is_talerable = kind == IncomingKind::Exchange
        && subject.map(crate::amount::looks_like_reserve_pub).unwrap_or(false);

    let mut tx = begin_serializable(pool).await?;

    if let Some(existing) = sqlx::query!(
        r#"SELECT row_id, bank_id, amount, subject, executed_at, debit_payto, bounced
           FROM incoming_payments WHERE bank_id = $1"#,
        bank_id
    )
    .fetch_optional(&mut *tx)
    .await?
    {
        tx.commit().await?;
        return Ok(IncomingPayment {
            row_id: existing.row_id,
            bank_id: existing.bank_id,
            amount: parse_amount(&existing.amount)?,
            subject: existing.subject,
            executed_at: existing.executed_at,
            debit_payto: existing.debit_payto,
            bounced: existing.bounced,
        });
    }

    let rec = sqlx::query!(
        r#"INSERT INTO incoming_payments (bank_id, amount, subject, executed_at, debit_payto, is_talerable)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING row_id"#,
        bank_id,
        amount.to_string(),
        subject,
        executed_at,
        debit_payto,
        is_talerable,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| StoreError::from_insert(e, "incoming_payments.bank_id"))?;

    tx.commit().await?;

    Ok(IncomingPayment {
        row_id: rec.row_id,
        bank_id: bank_id.to_string(),
        amount: amount.clone(),
        subject: subject.map(str::to_string),
        executed_at,
        debit_payto: debit_payto.map(str::to_string),
        bounced: false,
    })
}

/// Idempotent on `message_id` (P4). Attempts reconciliation against
/// `initiated_payments` via the derived end-to-end-id (P5); the outgoing
/// row is persisted regardless of whether a match is found, because the
/// bank side is the source of truth (spec.md §4.6).
pub async fn insert_outgoing(
    pool: &PgPool,
    message_id: &str,
    amount: &Amount,
    subject: Option<&str>,
    executed_at: NaiveDate,
    credit_payto: Option<&str>,
    end_to_end_id: Option<&str>,
) -> Result<InsertOutgoingOutcome, StoreError> {
    let mut tx = begin_serializable(pool).await?;

    if let Some(existing) = sqlx::query!(
        "SELECT row_id FROM outgoing_payments WHERE message_id = $1",
        message_id
    )
    .fetch_optional(&mut *tx)
    .await?
    {
        tx.commit().await?;
        return Ok(InsertOutgoingOutcome::Success(existing.row_id));
    }

    let reconciled_id = if let Some(e2e) = end_to_end_id {
        sqlx::query!(
            "SELECT id FROM initiated_payments WHERE request_uid = $1 OR id::text = $1",
            e2e.trim_start_matches("nexus-e2e-"),
        )
        .fetch_optional(&mut *tx)
        .await?
        .map(|r| r.id)
    } else {
        None
    };

    let is_talerable = subject
        .map(|s| crate::amount::parse_talerable_outgoing_subject(s).is_some())
        .unwrap_or(false);

    let rec = sqlx::query!(
        r#"INSERT INTO outgoing_payments (message_id, amount, subject, executed_at, credit_payto, reconciled_initiated_id, is_talerable)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING row_id"#,
        message_id,
        amount.to_string(),
        subject,
        executed_at,
        credit_payto,
        reconciled_id,
        is_talerable,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| StoreError::from_insert(e, "outgoing_payments.message_id"))?;

    tx.commit().await?;

    Ok(match reconciled_id {
        Some(_) => InsertOutgoingOutcome::Reconciled(rec.row_id),
        None => InsertOutgoingOutcome::InitiatedNotFound(rec.row_id),
    })
}

/// Records a reversal and transitions the matching outgoing row.
pub async fn insert_reversal(
    pool: &PgPool,
    msg_id_of_original: &str,
    reason_code: Option<&str>,
    reason_text: Option<&str>,
    executed_at: NaiveDate,
) -> Result<(), StoreError> {
    let mut tx = begin_serializable(pool).await?;

    sqlx::query!(
        r#"INSERT INTO reversals (msg_id_of_original, reason_code, reason_text, executed_at)
           VALUES ($1, $2, $3, $4)"#,
        msg_id_of_original,
        reason_code,
        reason_text,
        executed_at,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        "UPDATE outgoing_payments SET reversed = true WHERE message_id = $1",
        msg_id_of_original,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Atomically bounces an incoming payment: marks it `bounced` and creates a
/// refund `initiated_payments` row, or does neither (P10). Idempotent: a
/// second call with the same `bounce_uid` for an already-bounced row is a
/// no-op success, keyed off the `incoming_bounces` audit table.
pub async fn bounce_incoming(
    pool: &PgPool,
    incoming_id: i64,
    bounce_uid: &str,
) -> Result<i64, StoreError> {
    let mut tx = begin_serializable(pool).await?;

    if let Some(existing) = sqlx::query!(
        "SELECT bounce_initiated_id FROM incoming_bounces WHERE incoming_id = $1",
        incoming_id
    )
    .fetch_optional(&mut *tx)
    .await?
    {
        tx.commit().await?;
        return Ok(existing.bounce_initiated_id);
    }

    let incoming = sqlx::query!(
        "SELECT amount, debit_payto FROM incoming_payments WHERE row_id = $1",
        incoming_id
    )
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound)?;

    let debit_payto = incoming.debit_payto.ok_or_else(|| {
        StoreError::Database(sqlx::Error::Decode("incoming payment has no refund target".into()))
    })?;

    let initiated = sqlx::query!(
        r#"INSERT INTO initiated_payments (amount, credit_payto_uri, subject, request_uid, submitted)
           VALUES ($1, $2, 'bounce refund', $3, 'unsubmitted')
           RETURNING id"#,
        incoming.amount,
        debit_payto,
        bounce_uid,
    )
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| StoreError::from_insert(e, "initiated_payments.request_uid"))?;

    sqlx::query!(
        "UPDATE incoming_payments SET bounced = true WHERE row_id = $1",
        incoming_id
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        "INSERT INTO incoming_bounces (incoming_id, bounce_initiated_id) VALUES ($1, $2)",
        incoming_id,
        initiated.id,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(initiated.id)
}

/// Reads C8's persisted high-water mark, seeding it with `default_date` on
/// first use (no row yet).
pub async fn get_high_water_mark(pool: &PgPool, default_date: NaiveDate) -> Result<NaiveDate, StoreError> {
    let row = sqlx::query!("SELECT high_water_mark FROM fetch_progress WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.high_water_mark).unwrap_or(default_date))
}

/// Advances the high-water mark. Called only after a fetch tick's
/// ingestion has committed, per `spec.md` §4.8's crash-safety note.
pub async fn advance_high_water_mark(pool: &PgPool, new_mark: NaiveDate) -> Result<(), StoreError> {
    sqlx::query!(
        r#"INSERT INTO fetch_progress (id, high_water_mark) VALUES (1, $1)
           ON CONFLICT (id) DO UPDATE SET high_water_mark = excluded.high_water_mark
           WHERE fetch_progress.high_water_mark < excluded.high_water_mark"#,
        new_mark,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// `cursor > 0` and ascending when `limit >= 0`; the sign of `limit` flips
/// to descending per `spec.md` §4.6 (`delta` in the HTTP façade).
pub async fn history_incoming(
    pool: &PgPool,
    cursor: i64,
    limit: i64,
    talerable_only: bool,
) -> Result<Vec<IncomingPayment>, StoreError> {
    let ascending = limit >= 0;
    let n = limit.unsigned_abs() as i64;

    let rows = if ascending {
        sqlx::query!(
            r#"SELECT row_id, bank_id, amount, subject, executed_at, debit_payto, bounced
               FROM incoming_payments
               WHERE row_id > $1 AND ($2 = false OR is_talerable)
               ORDER BY row_id ASC LIMIT $3"#,
            cursor,
            talerable_only,
            n,
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            Ok(IncomingPayment {
                row_id: r.row_id,
                bank_id: r.bank_id,
                amount: parse_amount(&r.amount)?,
                subject: r.subject,
                executed_at: r.executed_at,
                debit_payto: r.debit_payto,
                bounced: r.bounced,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?
    } else {
        sqlx::query!(
            r#"SELECT row_id, bank_id, amount, subject, executed_at, debit_payto, bounced
               FROM incoming_payments
               WHERE row_id < $1 AND ($2 = false OR is_talerable)
               ORDER BY row_id DESC LIMIT $3"#,
            cursor,
            talerable_only,
            n,
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            Ok(IncomingPayment {
                row_id: r.row_id,
                bank_id: r.bank_id,
                amount: parse_amount(&r.amount)?,
                subject: r.subject,
                executed_at: r.executed_at,
                debit_payto: r.debit_payto,
                bounced: r.bounced,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?
    };

    Ok(rows)
}

pub async fn history_outgoing(
    pool: &PgPool,
    cursor: i64,
    limit: i64,
    talerable_only: bool,
) -> Result<Vec<OutgoingPayment>, StoreError> {
    let ascending = limit >= 0;
    let n = limit.unsigned_abs() as i64;

    let raw = if ascending {
        sqlx::query!(
            r#"SELECT row_id, message_id, amount, subject, executed_at, credit_payto,
                      reconciled_initiated_id, reversed, is_talerable
               FROM outgoing_payments
               WHERE row_id > $1 AND ($2 = false OR is_talerable)
               ORDER BY row_id ASC LIMIT $3"#,
            cursor,
            talerable_only,
            n,
        )
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query!(
            r#"SELECT row_id, message_id, amount, subject, executed_at, credit_payto,
                      reconciled_initiated_id, reversed, is_talerable
               FROM outgoing_payments
               WHERE row_id < $1 AND ($2 = false OR is_talerable)
               ORDER BY row_id DESC LIMIT $3"#,
            cursor,
            talerable_only,
            n,
        )
        .fetch_all(pool)
        .await?
    };

    raw.into_iter()
        .map(|r| {
            Ok(OutgoingPayment {
                row_id: r.row_id,
                message_id: r.message_id,
                amount: parse_amount(&r.amount)?,
                subject: r.subject,
                executed_at: r.executed_at,
                credit_payto: r.credit_payto,
                reconciled_initiated_id: r.reconciled_initiated_id,
                reversed: r.reversed,
                is_talerable: r.is_talerable,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn chf(value: u64) -> Amount {
        Amount::new("CHF", value, 0)
    }

    /// P1: a second `insert_initiated` with the same `request_uid` returns
    /// the first row's id rather than inserting a duplicate.
    #[sqlx::test(migrations = "./migrations")]
    async fn insert_initiated_is_idempotent_on_request_uid(pool: PgPool) {
        let amount = chf(10);
        let first = insert_initiated(&pool, &amount, "payto://iban/CH9300762011623852957", "sub", "uid-1").await.unwrap();
        let second = insert_initiated(&pool, &amount, "payto://iban/CH9300762011623852957", "sub", "uid-1").await.unwrap();

        let InsertInitiatedOutcome::Success(id1) = first else { panic!("expected Success") };
        let InsertInitiatedOutcome::UniqueViolation(id2) = second else { panic!("expected UniqueViolation") };
        assert_eq!(id1, id2);
    }

    /// P4: a second `insert_incoming` with the same `bank_id` returns the
    /// original row unchanged instead of erroring.
    #[sqlx::test(migrations = "./migrations")]
    async fn insert_incoming_is_idempotent_on_bank_id(pool: PgPool) {
        let amount = chf(20);
        let executed_at = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let first = insert_incoming(&pool, "bank-1", &amount, Some("subject"), executed_at, None, IncomingKind::Normal).await.unwrap();
        let second = insert_incoming(&pool, "bank-1", &amount, Some("subject"), executed_at, None, IncomingKind::Normal).await.unwrap();

        assert_eq!(first.row_id, second.row_id);
    }

    /// P5: an outgoing entry whose `EndToEndId` matches a known
    /// `initiated_payments` row is reconciled against it.
    #[sqlx::test(migrations = "./migrations")]
    async fn insert_outgoing_reconciles_against_initiated_row(pool: PgPool) {
        let amount = chf(30);
        let initiated = insert_initiated(&pool, &amount, "payto://iban/CH9300762011623852957", "sub", "uid-2").await.unwrap();
        let InsertInitiatedOutcome::Success(id) = initiated else { panic!("expected Success") };

        let e2e = InitiatedPayment::derive_end_to_end_id(id);
        let executed_at = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let outcome = insert_outgoing(&pool, "msg-1", &amount, None, executed_at, None, Some(&e2e)).await.unwrap();

        assert!(matches!(outcome, InsertOutgoingOutcome::Reconciled(_)));
    }

    /// P10: bouncing the same incoming payment twice with the same
    /// `bounce_uid` returns the same refund row rather than creating a
    /// second one.
    #[sqlx::test(migrations = "./migrations")]
    async fn bounce_incoming_is_idempotent_on_bounce_uid(pool: PgPool) {
        let amount = chf(40);
        let executed_at = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let incoming = insert_incoming(&pool, "bank-2", &amount, None, executed_at, Some("payto://iban/CH9300762011623852957"), IncomingKind::Normal)
            .await
            .unwrap();

        let first = bounce_incoming(&pool, incoming.row_id, "bounce-1").await.unwrap();
        let second = bounce_incoming(&pool, incoming.row_id, "bounce-1").await.unwrap();
        assert_eq!(first, second);
    }

    /// The high-water mark only ever moves forward, even if a concurrent
    /// tick tries to set it backward.
    #[sqlx::test(migrations = "./migrations")]
    async fn high_water_mark_is_monotonic(pool: PgPool) {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        advance_high_water_mark(&pool, d2).await.unwrap();
        advance_high_water_mark(&pool, d1).await.unwrap();

        assert_eq!(get_high_water_mark(&pool, d1).await.unwrap(), d2);
    }
}
