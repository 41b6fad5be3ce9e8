//! Fetch loop (C8): periodically downloads camt documents for each
//! configured level over `[high_water_mark, now]`, feeds them through the
//! ISO 20022 extractor (C5), and ingests the resulting notifications into
//! the payment store (C6) (`spec.md` §4.8).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::ebics::{ClientError, EbicsClient};
use crate::iso20022::{camt052, camt053, camt054, Dialect, TxNotification};
use crate::scheduler::ShutdownToken;
use crate::store::models::IncomingKind;
use crate::store::{Store, StoreError};
use crate::xml::XmlError;

/// The three download "levels" `spec.md` §3/§4.8 lets an operator configure,
/// each backed by a distinct EBICS order type and camt document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLevel {
    /// camt.054 debit/credit notification — near-real-time.
    Notification,
    /// camt.052 intraday account report.
    Report,
    /// camt.053 end-of-day account statement — source of truth for reversals.
    Statement,
}

impl FetchLevel {
    pub fn order_type(self) -> &'static str {
        match self {
            FetchLevel::Notification => "C54",
            FetchLevel::Report => "C52",
            FetchLevel::Statement => "C53",
        }
    }

    fn parse(self, bytes: &[u8], currency: &str, dialect: Dialect) -> Result<Vec<TxNotification>, XmlError> {
        match self {
            FetchLevel::Notification => camt054::parse(bytes, currency, dialect),
            FetchLevel::Report => camt052::parse(bytes, currency, dialect),
            FetchLevel::Statement => camt053::parse(bytes, currency, dialect),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised fetch level '{0}', expected one of: notification, report, statement")]
pub struct UnknownFetchLevel(String);

impl FromStr for FetchLevel {
    type Err = UnknownFetchLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notification" => Ok(FetchLevel::Notification),
            "report" => Ok(FetchLevel::Report),
            "statement" => Ok(FetchLevel::Statement),
            other => Err(UnknownFetchLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchLoopConfig {
    pub currency: String,
    pub dialect: Dialect,
    pub levels: Vec<FetchLevel>,
    pub frequency: Duration,
    /// Seeds the high-water mark on first run, when nothing has been
    /// persisted yet (`spec.md` §3 `nexus-fetch.ignore_transactions_before`).
    pub ignore_transactions_before: NaiveDate,
}

/// Runs the cooperative loop until `shutdown` fires.
pub async fn run(store: Store, ebics: Arc<EbicsClient>, cfg: FetchLoopConfig, shutdown: ShutdownToken) {
    loop {
        if shutdown.is_shutdown() {
            return;
        }

        match run_once(&store, &ebics, &cfg).await {
            Ok(n) if n > 0 => tracing::info!(notifications = n, "fetch loop tick ingested notifications"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "fetch loop tick failed"),
        }

        if shutdown.sleep_or_shutdown(cfg.frequency).await {
            return;
        }
    }
}

/// One tick across every configured level. Advances the persisted
/// high-water mark only after every level's documents for this tick have
/// been ingested and committed, so a crash mid-tick simply re-runs the same
/// (idempotent) range next time (`spec.md` §4.8).
pub async fn run_once(store: &Store, ebics: &EbicsClient, cfg: &FetchLoopConfig) -> Result<usize, FetchError> {
    let from = store.get_high_water_mark(cfg.ignore_transactions_before).await?;
    let to = Utc::now().date_naive();

    if from > to {
        return Ok(0);
    }

    let mut total = 0;
    for level in &cfg.levels {
        let document = match ebics.fetch(level.order_type(), from, to).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(ClientError::Ebics(e)) if !e.is_fatal() => {
                tracing::warn!(level = ?level, error = %e, "recoverable EBICS error fetching level, will retry next tick");
                continue;
            }
            Err(e) => return Err(FetchError::Client(e)),
        };

        // A malformed document is logged and skipped without advancing the
        // high-water mark, so the next tick retries after an operator fix
        // (`spec.md` §7 XmlError handling) — but other levels in this tick
        // still proceed.
        let notifications = match level.parse(&document, &cfg.currency, cfg.dialect) {
            Ok(ns) => ns,
            Err(e) => {
                tracing::error!(level = ?level, error = %e, "failed to parse camt document, leaving high-water mark unchanged");
                return Ok(total);
            }
        };

        for notification in notifications {
            ingest(store, notification).await?;
            total += 1;
        }
    }

    store.advance_high_water_mark(to).await?;
    Ok(total)
}

async fn ingest(store: &Store, notification: TxNotification) -> Result<(), StoreError> {
    match notification {
        TxNotification::Incoming { bank_id, amount, subject, executed_at, debit_payto } => {
            store
                .insert_incoming(&bank_id, &amount, subject.as_deref(), executed_at, debit_payto.as_deref(), IncomingKind::Exchange)
                .await?;
        }
        TxNotification::Outgoing { message_id, amount, subject, executed_at, credit_payto } => {
            store
                .insert_outgoing(&message_id, &amount, subject.as_deref(), executed_at, credit_payto.as_deref(), Some(&message_id))
                .await?;
        }
        TxNotification::Reversal { msg_id, reason, executed_at } => {
            store.insert_reversal(&msg_id, None, reason.as_deref(), executed_at).await?;
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_types_match_spec() {
        assert_eq!(FetchLevel::Notification.order_type(), "C54");
        assert_eq!(FetchLevel::Report.order_type(), "C52");
        assert_eq!(FetchLevel::Statement.order_type(), "C53");
    }

    #[test]
    fn parses_level_names_case_insensitively() {
        assert_eq!("Notification".parse::<FetchLevel>().unwrap(), FetchLevel::Notification);
        assert_eq!("STATEMENT".parse::<FetchLevel>().unwrap(), FetchLevel::Statement);
        assert!("bogus".parse::<FetchLevel>().is_err());
    }
}
