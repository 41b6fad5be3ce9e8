//! Scheduler kernel (C10): supervises the submit loop (C7) and fetch loop
//! (C8) as two independent cooperative tasks, restarting either on panic,
//! and flips a single shutdown flag both loops observe between ticks
//! (`spec.md` §5). The long-poll "control API" `spec.md` §4.10 describes
//! is realised directly by [`crate::store::Store::history_incoming`] /
//! `history_outgoing`, which already wrap the same `LISTEN/NOTIFY` channel
//! this module's supervised tasks write into by committing rows — there is
//! no separate subscribe/close surface to maintain here.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cooperative shutdown signal shared by every supervised loop and every
/// sleep between ticks (`spec.md` §5).
#[derive(Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> ShutdownToken {
        ShutdownToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless shutdown fires first, in which case it
    /// returns early. Returns `true` if shutdown was observed.
    pub async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }
        let flag = self.0.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => flag.load(Ordering::SeqCst),
            _ = wait_for_flag(flag.clone()) => true,
        }
    }
}

/// Polls the shutdown flag at a short interval. Cheaper mechanisms (a
/// `tokio::sync::Notify`) exist, but a plain poll keeps this module free of
/// another synchronisation primitive for what is, in practice, a signal
/// that fires at most once per process lifetime.
async fn wait_for_flag(flag: Arc<AtomicBool>) {
    loop {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Supervises a named cooperative task: runs `make_task()` to completion,
/// and if it panics, logs the panic and waits `restart_backoff` before
/// running it again. Returns once the task future itself returns (the
/// loops in this crate only return when `shutdown` has been observed).
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    restart_backoff: Duration,
    shutdown: ShutdownToken,
    mut make_task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let handle = tokio::spawn(make_task());
            match handle.await {
                Ok(()) => {
                    tracing::info!(task = name, "supervised task exited cleanly");
                    return;
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(task = name, "supervised task panicked, restarting after backoff");
                }
                Err(join_err) => {
                    tracing::warn!(task = name, error = %join_err, "supervised task was cancelled");
                    return;
                }
            }

            if shutdown.is_shutdown() {
                return;
            }
            if shutdown.sleep_or_shutdown(restart_backoff).await {
                return;
            }
        }
    })
}

/// Holds the two supervised loop handles for `nexus serve` (`spec.md` C10);
/// `shutdown()` flips the shared flag and waits for both to return within
/// roughly one frequency-tick each.
pub struct SchedulerKernel {
    shutdown: ShutdownToken,
    submit: JoinHandle<()>,
    fetch: JoinHandle<()>,
}

impl SchedulerKernel {
    pub fn new(shutdown: ShutdownToken, submit: JoinHandle<()>, fetch: JoinHandle<()>) -> SchedulerKernel {
        SchedulerKernel { shutdown, submit, fetch }
    }

    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        let _ = tokio::join!(self.submit, self.fetch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn sleep_or_shutdown_returns_immediately_when_already_shut_down() {
        let token = ShutdownToken::new();
        token.shutdown();
        let start = std::time::Instant::now();
        let shut = token.sleep_or_shutdown(Duration::from_secs(5)).await;
        assert!(shut);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn sleep_or_shutdown_waits_out_the_full_duration_when_not_signalled() {
        let token = ShutdownToken::new();
        let shut = token.sleep_or_shutdown(Duration::from_millis(20)).await;
        assert!(!shut);
    }

    #[tokio::test]
    async fn supervised_task_restarts_after_panic() {
        let token = ShutdownToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let token_clone = token.clone();

        let handle = spawn_supervised("test", Duration::from_millis(10), token.clone(), move || {
            let attempts = attempts_clone.clone();
            let token = token_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("first attempt always panics");
                }
                token.shutdown();
            }
        });

        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }
}
