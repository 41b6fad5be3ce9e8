//! Submit loop (C7): periodically drains unsubmitted initiated payments,
//! batches them into one pain.001 document, uploads it via the EBICS
//! client, and updates each row's submission state (`spec.md` §4.7).
//!
//! Divergence from the pseudocode's per-row try/catch: this implementation
//! batches every row taken off the queue in one tick into a single pain.001
//! upload (one bank dialog, not one per row), matching
//! [`crate::iso20022::pain001::build_cct_document`]'s "one document per
//! submit tick" design. A rejection or transport failure therefore applies
//! uniformly to the whole batch for that tick; this is recorded as an Open
//! Question resolution in `DESIGN.md`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::ebics::{ClientError, EbicsClient};
use crate::iso20022::{build_cct_document, DebtorAccount};
use crate::scheduler::ShutdownToken;
use crate::store::models::SubmissionState;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct SubmitLoopConfig {
    pub currency: String,
    pub debtor: DebtorAccount,
    pub batch_size: i64,
    pub frequency: Duration,
}

/// Runs the cooperative loop until `shutdown` fires. Never returns
/// otherwise: runtime errors within one tick are logged and the loop
/// continues (`spec.md` §7 — retry discipline is state-driven, a row is
/// parked, never lost).
pub async fn run(store: Store, ebics: Arc<EbicsClient>, cfg: SubmitLoopConfig, shutdown: ShutdownToken) {
    loop {
        if shutdown.is_shutdown() {
            return;
        }

        match run_once(&store, &ebics, &cfg).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(submitted_rows = n, "submit loop tick processed rows"),
            Err(e) => tracing::error!(error = %e, "submit loop tick failed"),
        }

        if shutdown.sleep_or_shutdown(cfg.frequency).await {
            return;
        }
    }
}

/// One tick: take a batch of unsubmitted rows, build and upload a pain.001,
/// and transition every row in the batch according to the outcome. Returns
/// the number of rows processed (0 when the queue was empty).
pub async fn run_once(store: &Store, ebics: &EbicsClient, cfg: &SubmitLoopConfig) -> Result<usize, StoreError> {
    let rows = store.take_unsubmitted(cfg.batch_size).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let msg_id = format!("nexus-submit-{}", Uuid::new_v4());
    let pain = build_cct_document(&rows, &cfg.debtor, &msg_id, Utc::now(), &cfg.currency);

    let pain_bytes = match pain {
        Ok(doc) => doc,
        Err(e) => {
            // A malformed row (bad payto, currency mismatch) never reaches
            // the bank; batching means we can't isolate which row caused it,
            // so the whole tick is parked as a permanent failure for an
            // operator to inspect.
            tracing::error!(error = %e, rows = rows.len(), "failed to build pain.001 for this tick");
            for row in &rows {
                store.mark_submission(row.id, SubmissionState::PermanentFailure, Some(&e.to_string())).await?;
            }
            return Ok(rows.len());
        }
    };

    match ebics.upload_cct(pain_bytes.as_bytes()).await {
        Ok(order_id) => {
            tracing::info!(order_id = %order_id, rows = rows.len(), "uploaded CCT batch");
            for row in &rows {
                store.mark_submission(row.id, SubmissionState::Success, None).await?;
            }
        }
        Err(ClientError::BankKeysNotAccepted) => {
            // Operational gate, not a payment rejection: leave every row
            // unsubmitted so the next tick retries once an operator accepts
            // the bank's keys (spec.md S5).
            tracing::warn!(rows = rows.len(), "bank keys not yet accepted; leaving batch unsubmitted");
        }
        Err(ClientError::Ebics(e)) => {
            let state = if e.is_fatal() { SubmissionState::PermanentFailure } else { SubmissionState::TransientFailure };
            tracing::warn!(error = %e, fatal = e.is_fatal(), rows = rows.len(), "CCT upload failed");
            for row in &rows {
                store.mark_submission(row.id, state, Some(&e.to_string())).await?;
            }
        }
        Err(e @ ClientError::KeyStore(_)) => {
            // A malformed or locked key file is retried rather than parked
            // permanently: it's an operator-fixable local condition, not a
            // verdict from the bank about the payment itself.
            tracing::error!(error = %e, rows = rows.len(), "local key store error during CCT upload");
            for row in &rows {
                store.mark_submission(row.id, SubmissionState::TransientFailure, Some(&e.to_string())).await?;
            }
        }
    }

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_clone() {
        let cfg = SubmitLoopConfig {
            currency: "CHF".to_string(),
            debtor: DebtorAccount { iban: "CH9300762011623852957".to_string(), bic: "POFICHBEXXX".to_string(), name: "Example Exchange".to_string() },
            batch_size: 50,
            frequency: Duration::from_secs(60),
        };
        let cloned = cfg.clone();
        assert_eq!(cloned.currency, "CHF");
    }
}
