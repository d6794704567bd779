use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Time a client has to send `Identify` after connecting.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the event loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        name: name.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    // Let the newcomer know who is already here, then announce them.
    for uid in dispatcher.online_users().await {
        let event = GatewayEvent::PresenceUpdate { user_id: uid, online: true };
        if !send_event(&mut sender, &event).await {
            return;
        }
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id, name).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    name: String,
) {
    // Subscribe before going online so our own presence event is not missed
    let mut broadcast_rx = dispatcher.subscribe();
    dispatcher.user_online(user_id).await;

    // Chat channels joined by this connection (shared between send and recv tasks)
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let lag_dispatcher = dispatcher.clone();
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
                            warn!("Broadcast receiver for {} lagged by {} events", user_id, n);
                            lag_dispatcher.record_lag(n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !msg.should_deliver(user_id, &*send_subscriptions.read().await) {
                        continue;
                    }

                    if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                        break;
                    }

                    // Membership changes take effect once the update is out.
                    if msg.members.is_some() {
                        let mut subs = send_subscriptions.write().await;
                        if msg.sync_subscriptions(user_id, &mut subs) {
                            debug!("{} membership of {:?} changed, {} chats joined", user_id, msg.chat_id, subs.len());
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_dispatcher = dispatcher.clone();
    let recv_name = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_dispatcher, &db, user_id, &recv_name, cmd, &subscriptions).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_name,
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) = serde_json::from_str::<GatewayCommand>(&text) {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify).await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    name: &str,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { chat_ids } => {
            let requested = chat_ids.len();
            let allowed = match member_chats(db, user_id).await {
                Some(allowed) => allowed,
                None => return,
            };

            let joined: HashSet<Uuid> = chat_ids.into_iter().filter(|id| allowed.contains(id)).collect();
            if joined.len() < requested {
                warn!(
                    "{} ({}) asked for {} chats but belongs to only {} of them",
                    name,
                    user_id,
                    requested,
                    joined.len()
                );
            }
            info!("{} ({}) joined {} chat channels", name, user_id, joined.len());
            *subscriptions.write().await = joined;
        }

        GatewayCommand::StartTyping { chat_id } => {
            if subscriptions.read().await.contains(&chat_id) {
                debug!("{} ({}) typing in {}", name, user_id, chat_id);
                dispatcher.broadcast(GatewayEvent::TypingStart { chat_id, user_id });
            }
        }

        GatewayCommand::StopTyping { chat_id } => {
            if subscriptions.read().await.contains(&chat_id) {
                dispatcher.broadcast(GatewayEvent::TypingStop { chat_id, user_id });
            }
        }
    }
}

/// Chats the user currently belongs to, read off the async runtime.
async fn member_chats(db: &Arc<Database>, user_id: Uuid) -> Option<HashSet<Uuid>> {
    let db = db.clone();
    let uid = user_id.to_string();
    let ids = match tokio::task::spawn_blocking(move || db.get_chat_ids_for_user(&uid)).await {
        Ok(Ok(ids)) => ids,
        Ok(Err(e)) => {
            error!("Failed to load chats for {}: {}", user_id, e);
            return None;
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return None;
        }
    };

    Some(ids.iter().filter_map(|id| id.parse().ok()).collect())
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            return false;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
