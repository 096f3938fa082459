use tokio::sync::broadcast;
use tracing::debug;

use tandem_types::events::GatewayEvent;

/// A live subscription to one session's event stream.
///
/// Wraps a broadcast receiver and filters to the bound session code.
/// Closing drops the receiver, which discards anything still buffered;
/// closing twice is a no-op.
pub struct Subscription {
    session_code: String,
    rx: Option<broadcast::Receiver<GatewayEvent>>,
}

impl Subscription {
    pub fn new(session_code: String, rx: broadcast::Receiver<GatewayEvent>) -> Self {
        Self {
            session_code,
            rx: Some(rx),
        }
    }

    pub fn session_code(&self) -> &str {
        &self.session_code
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// Next event for this session. `None` once the subscription is closed
    /// or the sender side is gone.
    ///
    /// A lagged receiver skips ahead rather than erroring: every snapshot
    /// is authoritative, so missed intermediates are harmless.
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(event) => {
                    match event.session_code() {
                        Some(code) if code == self.session_code => return Some(event),
                        // Connection-level events pass through unfiltered.
                        None => return Some(event),
                        Some(_) => continue,
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("subscription lagged by {} events, resuming", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Drop the stream and everything buffered in it. Idempotent.
    pub fn close(&mut self) {
        self.rx = None;
    }
}
