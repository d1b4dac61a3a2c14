use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use signage_types::events::{DeviceEvent, GatewayCommand, GatewayEvent, Table};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Table filter shared between the send and receive halves.
/// `None` forwards every table.
type Subscriptions = Arc<std::sync::RwLock<Option<HashSet<Table>>>>;

fn to_text<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode gateway message: {}", e);
            None
        }
    }
}

async fn send_json<T: Serialize>(sender: &mut SplitSink<WebSocket, Message>, value: &T) -> bool {
    match to_text(value) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => true,
    }
}

/// Handle a dashboard WebSocket connection: Identify handshake, Ready,
/// then forward the user's table changes until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    // Subscribe before Ready so nothing committed after Ready is missed.
    let mut broadcast_rx = dispatcher.subscribe();

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if !send_json(&mut sender, &ready).await {
        return;
    }

    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(None));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let msg = match result {
                        Ok(msg) => msg,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if msg.owner_id != user_id || !wants(&send_subscriptions, msg.event.table()) {
                        continue;
                    }

                    if !send_json(&mut sender, &msg.event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if !beat(&pong_flag_send, &mut missed_heartbeats) {
                        break;
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(user_id, &username_recv, cmd, &subscriptions),
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

/// Handle an authenticated display's WebSocket: Hello, then forward pushed
/// device events until either side goes away.
///
/// `on_written` gets the id of every command once its frame has been written
/// to the socket. Commands still queued when the connection dies are not reported.
pub async fn handle_device_connection<F>(socket: WebSocket, dispatcher: Dispatcher, display_id: Uuid, on_written: F)
where
    F: Fn(Uuid) + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut device_rx) = dispatcher.register_device(display_id).await;
    info!("Display {} connected to device gateway", display_id);

    if !send_json(&mut sender, &DeviceEvent::Hello { display_id }).await {
        dispatcher.unregister_device(display_id, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = device_rx.recv() => {
                    // A newer connection replaced this one.
                    let Some(event) = event else { break };
                    let Some(msg) = to_text(&event) else { continue };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                    if let DeviceEvent::Command { id, .. } = &event {
                        on_written(*id);
                    }
                }
                _ = heartbeat.tick() => {
                    if !beat(&pong_flag_send, &mut missed_heartbeats) {
                        break;
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!("Display {} sent unexpected text frame ({} bytes)", display_id, text.len());
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_device(display_id, conn_id).await;
    info!("Display {} disconnected from device gateway", display_id);
}

/// Returns `false` once two consecutive pongs have been missed.
fn beat(pong_received: &AtomicBool, missed: &mut u8) -> bool {
    if pong_received.swap(false, Ordering::Acquire) {
        *missed = 0;
    } else {
        *missed += 1;
        if *missed >= 2 {
            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed);
            return false;
        }
    }
    true
}

fn wants(subscriptions: &Subscriptions, table: Option<Table>) -> bool {
    let Some(table) = table else { return true };
    match subscriptions.read() {
        Ok(subs) => subs.as_ref().is_none_or(|tables| tables.contains(&table)),
        Err(_) => false,
    }
}

async fn wait_for_identify(receiver: &mut SplitStream<WebSocket>, jwt_secret: &str) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use signage_types::api::Claims;

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
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

fn handle_command(user_id: Uuid, username: &str, cmd: GatewayCommand, subscriptions: &Subscriptions) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { tables } => {
            info!("{} ({}) subscribing to {} tables", username, user_id, tables.len());
            if let Ok(mut subs) = subscriptions.write() {
                *subs = Some(tables.into_iter().collect());
            }
        }
    }
}
