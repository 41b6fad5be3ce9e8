//! Long-poll wake-up plumbing (part of C6/C10): a thin wrapper over
//! Postgres `LISTEN/NOTIFY`. `spec.md` §9 asks for this to be abstracted
//! behind `subscribe(channel) -> stream<Notification>`; the migration's
//! triggers emit `pg_notify` inside the same transaction as the insert, so
//! a notification always implies the row is already visible to a fresh
//! `SELECT` (spec.md §4.6).

use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::time::timeout;

use super::error::StoreError;

pub const INCOMING_CHANNEL: &str = "nexus_incoming";
pub const OUTGOING_CHANNEL: &str = "nexus_outgoing";

pub struct NotifySubscription {
    listener: PgListener,
}

impl NotifySubscription {
    pub async fn subscribe(pool: &PgPool, channel: &str) -> Result<NotifySubscription, StoreError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        Ok(NotifySubscription { listener })
    }

    /// Waits for the next notification, or returns `Ok(None)` once `deadline`
    /// elapses. `spec.md` P9: callers are expected to re-check the store
    /// after this returns, since a `long_poll_ms=0` wait is also valid and
    /// simply means "check once, don't wait".
    pub async fn wait(&mut self, deadline: Duration) -> Result<Option<String>, StoreError> {
        match timeout(deadline, self.listener.recv()).await {
            Ok(Ok(notification)) => Ok(Some(notification.payload().to_string())),
            Ok(Err(e)) => Err(StoreError::Database(e)),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_are_fixed() {
        assert_eq!(INCOMING_CHANNEL, "nexus_incoming");
        assert_eq!(OUTGOING_CHANNEL, "nexus_outgoing");
    }
}
