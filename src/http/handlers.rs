//! Taler Wire Gateway / Revenue HTTP façade (C9) handlers (`spec.md` §4.9).

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::amount::{parse_talerable_outgoing_subject, Amount, PaytoUri};
use crate::store::models::{IncomingKind, InsertInitiatedOutcome};

use super::auth;
use super::error::{ApiError, TalerErrorCode};
use super::AppState;

const WIRE_GATEWAY_IMPLEMENTATION: &str = "urn:net:taler:specs:wire-gateway:http:v0";
const REVENUE_IMPLEMENTATION: &str = "urn:net:taler:specs:revenue:http:v0";
const VERSION: &str = "0:0:0";

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    name: &'static str,
    version: &'static str,
    currency: String,
    implementation: &'static str,
}

pub async fn wire_gateway_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse { name: "taler-wire-gateway", version: VERSION, currency: state.currency.clone(), implementation: WIRE_GATEWAY_IMPLEMENTATION })
}

pub async fn revenue_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse { name: "taler-revenue", version: VERSION, currency: state.currency.clone(), implementation: REVENUE_IMPLEMENTATION })
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    request_uid: String,
    amount: String,
    exchange_base_url: String,
    wtid: String,
    credit_account: String,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    timestamp: TalerTimestamp,
    row_id: i64,
}

/// Taler's `{t_s: seconds}` wire format for timestamps.
#[derive(Debug, Serialize)]
struct TalerTimestamp {
    t_s: i64,
}

fn now_timestamp() -> TalerTimestamp {
    TalerTimestamp { t_s: Utc::now().timestamp() }
}

/// `POST /taler-wire-gateway/transfer` (`spec.md` §4.9, S1). Idempotent on
/// `request_uid`: a replay with identical fields returns the original
/// `row_id`; a replay with different fields is `409`.
pub async fn transfer(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<TransferRequest>) -> Result<Json<TransferResponse>, ApiError> {
    auth::check(&headers, &state.auth)?;

    let amount: Amount = req
        .amount
        .parse()
        .map_err(|e: crate::amount::AmountError| ApiError::new(TalerErrorCode::GenericJsonInvalid).with_hint(e.to_string()))?;

    if amount.currency != state.currency {
        return Err(ApiError::new(TalerErrorCode::GenericCurrencyMismatch)
            .with_hint(format!("expected {}, got {}", state.currency, amount.currency)));
    }

    let credit_payto = PaytoUri::parse(&req.credit_account)
        .map_err(|e| ApiError::new(TalerErrorCode::BankUnallowedTargetType).with_hint(e.to_string()))?;

    let subject = format!("{} {}", req.wtid, req.exchange_base_url);

    let outcome = state.store.insert_initiated(&amount, &credit_payto.to_uri_string(), &subject, &req.request_uid).await?;

    state.metrics.store_operations_total.with_label_values(&["insert_initiated", "ok"]).inc();

    let row_id = match outcome {
        InsertInitiatedOutcome::Success(id) => id,
        InsertInitiatedOutcome::UniqueViolation(id) => {
            let existing = state.store.get_initiated(id).await?.ok_or_else(|| {
                ApiError::new(TalerErrorCode::GenericInternalInvariant).with_hint("request_uid index points at a row that no longer exists")
            })?;

            let same_request = existing.amount == amount && existing.subject == subject && existing.credit_payto_uri == credit_payto.to_uri_string();
            if !same_request {
                return Err(ApiError::new(TalerErrorCode::BankTransferRequestUidReused)
                    .with_hint("request_uid was already used with different transfer details"));
            }
            id
        }
    };

    Ok(Json(TransferResponse { timestamp: now_timestamp(), row_id }))
}

#[derive(Debug, Deserialize)]
pub struct AddIncomingRequest {
    amount: String,
    reserve_pub: String,
    debit_account: String,
}

#[derive(Debug, Serialize)]
pub struct AddIncomingResponse {
    timestamp: TalerTimestamp,
    row_id: i64,
}

/// `POST /taler-wire-gateway/admin/add-incoming` (`spec.md` §4.9): inserts
/// a talerable-incoming row keyed on `reserve_pub`; reuse of the same
/// `reserve_pub` is `409`, unconditionally (no idempotent-replay case is
/// described for this endpoint, unlike `/transfer`).
pub async fn add_incoming(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<AddIncomingRequest>) -> Result<Json<AddIncomingResponse>, ApiError> {
    auth::check(&headers, &state.auth)?;

    let amount: Amount = req
        .amount
        .parse()
        .map_err(|e: crate::amount::AmountError| ApiError::new(TalerErrorCode::GenericJsonInvalid).with_hint(e.to_string()))?;

    if amount.currency != state.currency {
        return Err(ApiError::new(TalerErrorCode::GenericCurrencyMismatch)
            .with_hint(format!("expected {}, got {}", state.currency, amount.currency)));
    }

    let debit_payto = PaytoUri::parse(&req.debit_account)
        .map_err(|e| ApiError::new(TalerErrorCode::BankUnallowedTargetType).with_hint(e.to_string()))?;

    let bank_id = format!("nexus-admin-{}", req.reserve_pub.trim());

    if state.store.incoming_exists(&bank_id).await? {
        return Err(ApiError::new(TalerErrorCode::BankDuplicateReservePub).with_hint("reserve_pub was already used for an incoming transfer"));
    }

    let executed_at = Utc::now().date_naive();
    let row = state
        .store
        .insert_incoming(&bank_id, &amount, Some(req.reserve_pub.trim()), executed_at, Some(&debit_payto.to_uri_string()), IncomingKind::Exchange)
        .await?;

    Ok(Json(AddIncomingResponse { timestamp: now_timestamp(), row_id: row.row_id }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    delta: i64,
    #[serde(default)]
    start: i64,
    #[serde(default)]
    long_poll_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct IncomingTransaction {
    row_id: i64,
    date: TalerTimestamp,
    amount: String,
    debit_account: String,
    reserve_pub: String,
}

#[derive(Debug, Serialize)]
pub struct IncomingHistoryResponse {
    credit_account: String,
    incoming_transactions: Vec<IncomingTransaction>,
}

fn day_timestamp(date: chrono::NaiveDate) -> TalerTimestamp {
    TalerTimestamp { t_s: date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp() }
}

/// `GET /taler-wire-gateway/history/incoming` (`spec.md` §4.9): only
/// talerable-incoming rows (subject parses as a reserve public key) are
/// surfaced here, per the wire gateway's contract.
pub async fn history_incoming(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<HistoryQuery>) -> Result<Json<IncomingHistoryResponse>, ApiError> {
    auth::check(&headers, &state.auth)?;

    let rows = state.store.history_incoming(q.start, q.delta, q.long_poll_ms, true).await?;
    let incoming_transactions = rows
        .into_iter()
        .map(|r| IncomingTransaction {
            row_id: r.row_id,
            date: day_timestamp(r.executed_at),
            amount: r.amount.to_taler_string(),
            debit_account: r.debit_payto.unwrap_or_default(),
            reserve_pub: r.subject.unwrap_or_default(),
        })
        .collect();

    Ok(Json(IncomingHistoryResponse { credit_account: state.credit_account_payto(), incoming_transactions }))
}

#[derive(Debug, Serialize)]
pub struct OutgoingTransaction {
    row_id: i64,
    date: TalerTimestamp,
    amount: String,
    credit_account: String,
    wtid: String,
    exchange_base_url: String,
}

#[derive(Debug, Serialize)]
pub struct OutgoingHistoryResponse {
    debit_account: String,
    outgoing_transactions: Vec<OutgoingTransaction>,
}

/// `GET /taler-wire-gateway/history/outgoing` (`spec.md` §4.9): symmetric
/// to `history_incoming`; the `wtid`/`exchange_base_url` pair is recovered
/// from the subject per `spec.md` §9's "any whitespace run" rule.
pub async fn history_outgoing(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<HistoryQuery>) -> Result<Json<OutgoingHistoryResponse>, ApiError> {
    auth::check(&headers, &state.auth)?;

    let rows = state.store.history_outgoing(q.start, q.delta, q.long_poll_ms, true).await?;
    let outgoing_transactions = rows
        .into_iter()
        .filter_map(|r| {
            let subject = r.subject.as_deref().unwrap_or_default();
            let (wtid, exchange_base_url) = parse_talerable_outgoing_subject(subject)?;
            Some(OutgoingTransaction {
                row_id: r.row_id,
                date: day_timestamp(r.executed_at),
                amount: r.amount.to_taler_string(),
                credit_account: r.credit_payto.unwrap_or_default(),
                wtid,
                exchange_base_url,
            })
        })
        .collect();

    Ok(Json(OutgoingHistoryResponse { debit_account: state.credit_account_payto(), outgoing_transactions }))
}

/// `GET /taler-revenue/history` (`spec.md` §4.9 "analogous, read-only"):
/// spec.md doesn't separate Revenue's underlying dataset from the wire
/// gateway's — a single-account instance has exactly one incoming ledger —
/// so this reuses `history_incoming` verbatim. Recorded in `DESIGN.md`.
pub async fn revenue_history(state: State<AppState>, headers: HeaderMap, query: Query<HistoryQuery>) -> Result<Json<IncomingHistoryResponse>, ApiError> {
    history_incoming(state, headers, query).await
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    db_connected: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = sqlx::query("SELECT 1").fetch_optional(state.store.pool()).await.is_ok();
    Json(HealthResponse { status: if db_connected { "healthy" } else { "degraded" }, service: "libeufin-nexus", version: env!("CARGO_PKG_VERSION"), db_connected })
}

pub async fn metrics() -> Result<String, ApiError> {
    crate::metrics::METRICS.export().map_err(|e| ApiError::new(TalerErrorCode::GenericInternalInvariant).with_detail(e.to_string()))
}
