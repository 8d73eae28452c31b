use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Upper bound on how long a paused transfer sleeps between flag checks.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Live state of one transfer, shared between the engine and its controller.
///
/// The controller only ever flips the pause and cancel requests; the byte
/// counters are written by the engine and are read-only from outside.
/// Share it with `Arc<TransferState>`.
#[derive(Debug, Default)]
pub struct TransferState {
    downloaded_bytes: AtomicU64,
    total_bytes: AtomicU64,
    cancel_requested: AtomicBool,
    pause_requested: AtomicBool,
    changed: Notify,
}

impl TransferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh state that starts out paused, used when a batch moves on while paused.
    pub fn paused() -> Self {
        let state = Self::default();
        state.pause_requested.store(true, Ordering::SeqCst);
        state
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn request_resume(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    /// Zero while unknown.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn set_downloaded(&self, bytes: u64) {
        self.downloaded_bytes.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn set_total(&self, bytes: u64) {
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Blocks while paused. Returns early on cancel.
    pub(crate) async fn wait_while_paused(&self) {
        loop {
            // Registered before the check so a resume in between is not lost.
            let notified = self.changed.notified();
            if !self.is_paused() || self.is_cancelled() {
                return;
            }
            let _ = tokio::time::timeout(PAUSE_POLL_INTERVAL, notified).await;
        }
    }

    /// Resolves once a cancel has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.changed.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_not_paused() {
        let state = TransferState::new();
        tokio::time::timeout(Duration::from_millis(50), state.wait_while_paused())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn resume_releases_a_paused_waiter_promptly() {
        let state = Arc::new(TransferState::paused());
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_while_paused().await })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!waiter.is_finished(), "waiter must stay blocked while paused");

        let resumed_at = Instant::now();
        state.request_resume();
        waiter.await.expect("waiter task panicked");
        assert!(resumed_at.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn cancel_releases_a_paused_waiter() {
        let state = Arc::new(TransferState::paused());
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_while_paused().await })
        };

        state.request_cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter task panicked");
        assert!(state.is_paused());
        assert!(state.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_completes_after_request() {
        let state = Arc::new(TransferState::new());
        let watcher = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.cancelled().await })
        };
        tokio::task::yield_now().await;
        state.request_cancel();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .expect("cancelled() should resolve")
            .expect("watcher task panicked");
    }
}
