use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use tandem_types::events::GatewayEvent;

/// Fans committed events out to every connected client and carries
/// targeted pushes (snapshot-on-subscribe) to a single user.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — connections filter by the
    /// session code they subscribed to.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    /// A newer connection for the same user displaces the older entry.
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user channel, but only if conn_id still matches —
    /// a slow disconnect must never tear down a newer connection. Safe to
    /// call any number of times.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Dropped silently if the
    /// user has no live connection; the next subscribe resyncs them.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::session::test_support::two_player_session;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        let session = two_player_session(2);
        dispatcher.broadcast(GatewayEvent::SessionUpdate {
            session: session.clone(),
        });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                GatewayEvent::SessionUpdate { session: got } => {
                    assert_eq!(got.code, session.code);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn session_scoping_survives_serialization() {
        let session = two_player_session(1);
        let event = GatewayEvent::SessionUpdate {
            session: session.clone(),
        };
        assert_eq!(event.session_code(), Some(session.code.as_str()));

        let json = serde_json::to_string(&event).unwrap();
        let back: GatewayEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_code(), Some(session.code.as_str()));
    }

    #[tokio::test]
    async fn stale_conn_id_cannot_unregister_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(user).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        // The old connection's cleanup runs late; the new channel survives.
        dispatcher.unregister_user_channel(user, old_conn).await;

        dispatcher
            .send_to_user(
                user,
                GatewayEvent::Ready {
                    user_id: user,
                    username: "u".into(),
                },
            )
            .await;
        assert!(matches!(
            new_rx.recv().await,
            Some(GatewayEvent::Ready { .. })
        ));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (conn, _rx) = dispatcher.register_user_channel(user).await;

        dispatcher.unregister_user_channel(user, conn).await;
        dispatcher.unregister_user_channel(user, conn).await;

        // Targeted sends to an unregistered user are silently dropped.
        dispatcher
            .send_to_user(
                user,
                GatewayEvent::Ready {
                    user_id: user,
                    username: "u".into(),
                },
            )
            .await;
    }
}
