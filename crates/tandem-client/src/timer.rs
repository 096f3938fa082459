use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use tandem_core::media;

/// A cancellable one-shot timer that fires at a media message's expiry.
///
/// Purely a UI convenience: the server enforces expiry on its own clock,
/// so a timer that never fires (host suspended, task aborted) changes
/// nothing about what a download attempt will answer.
pub struct Countdown {
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    /// Schedule `on_expire` to run when `expires_at` passes. An instant
    /// already in the past fires on the next tick of the runtime.
    pub fn start<F>(expires_at: DateTime<Utc>, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = media::remaining(Utc::now(), expires_at);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire();
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the timer. Idempotent; a timer that already fired is a no-op.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_deadline() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _timer = Countdown::start(Utc::now() + chrono::Duration::seconds(60), move || {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let mut timer = Countdown::start(Utc::now() + chrono::Duration::seconds(10), move || {
            flag.store(true, Ordering::SeqCst);
        });

        timer.cancel();
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
