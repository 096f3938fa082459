use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use tandem_types::events::{GatewayCommand, GatewayEvent};

use crate::SnapshotSource;
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, then the
/// subscribe/push loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    snapshots: Arc<dyn SnapshotSource>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Register the targeted channel used for snapshot pushes.
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    // The session this connection is subscribed to, shared between the
    // send task (filtering) and the recv task (Subscribe/Unsubscribe).
    let subscribed: Arc<std::sync::RwLock<Option<String>>> =
        Arc::new(std::sync::RwLock::new(None));
    let send_subscription = subscribed.clone();

    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_recv = dispatcher.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted pushes to the client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            // Snapshots are self-contained; the next one
                            // supersedes whatever was missed.
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(code) = event.session_code() {
                        let subs = send_subscription
                            .read()
                            .expect("subscription lock poisoned");
                        if subs.as_deref() != Some(code) {
                            continue;
                        }
                    }

                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let recv_subscription = subscribed.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &dispatcher_recv,
                            &snapshots,
                            user_id,
                            &username_recv,
                            cmd,
                            &recv_subscription,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use tandem_types::api::Claims;

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    snapshots: &Arc<dyn SnapshotSource>,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
    subscription: &Arc<std::sync::RwLock<Option<String>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { session_code } => {
            info!("{} ({}) subscribing to {}", username, user_id, session_code);
            {
                let mut sub = subscription.write().expect("subscription lock poisoned");
                *sub = Some(session_code.clone());
            }

            // Push the latest snapshot immediately so a reconnect converges
            // without replaying anything it missed.
            let source = snapshots.clone();
            let code = session_code.clone();
            let loaded =
                tokio::task::spawn_blocking(move || source.latest(&code)).await;
            match loaded {
                Ok(Ok(Some(session))) => {
                    dispatcher
                        .send_to_user(user_id, GatewayEvent::SessionUpdate { session })
                        .await;
                }
                Ok(Ok(None)) => {
                    warn!(
                        "{} ({}) subscribed to unknown session {}",
                        username, user_id, session_code
                    );
                }
                Ok(Err(e)) => warn!("Snapshot load failed for {}: {}", session_code, e),
                Err(e) => warn!("spawn_blocking join error: {}", e),
            }
        }

        GatewayCommand::Unsubscribe => {
            // Idempotent: clearing an empty subscription is a no-op.
            let mut sub = subscription.write().expect("subscription lock poisoned");
            *sub = None;
        }
    }
}
