use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::error;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Events buffered per receiver before a slow client starts lagging.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A gateway event serialized once for every receiver.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Chat channel the event belongs to. `None` means global.
    pub chat_id: Option<Uuid>,
    /// User that must not get the event back.
    pub exclude: Option<Uuid>,
    /// Current members of `chat_id`, set on membership-bearing events.
    pub members: Option<Arc<[Uuid]>>,
    pub json: Arc<str>,
}

impl Outbound {
    /// Whether a connection for `user_id`, joined to `subscriptions`,
    /// should receive this event.
    pub fn should_deliver(&self, user_id: Uuid, subscriptions: &HashSet<Uuid>) -> bool {
        if self.exclude == Some(user_id) {
            return false;
        }
        match self.chat_id {
            Some(chat_id) => subscriptions.contains(&chat_id) || self.lists_member(user_id),
            None => true,
        }
    }

    /// Bring a connection's subscriptions in line with the membership this
    /// event carries. Members join the chat channel, everyone else leaves
    /// it. Returns whether the set changed.
    pub fn sync_subscriptions(&self, user_id: Uuid, subscriptions: &mut HashSet<Uuid>) -> bool {
        let (Some(chat_id), Some(_)) = (self.chat_id, &self.members) else {
            return false;
        };
        if self.lists_member(user_id) {
            subscriptions.insert(chat_id)
        } else {
            subscriptions.remove(&chat_id)
        }
    }

    fn lists_member(&self, user_id: Uuid) -> bool {
        self.members.as_ref().is_some_and(|m| m.contains(&user_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events_sent: u64,
    /// Events skipped by receivers that fell behind the buffer.
    pub events_lagged: u64,
    pub online_users: usize,
}

/// Manages all connected clients and fans events out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Outbound>,

    /// Online users: user_id -> number of open connections
    online_users: RwLock<HashMap<Uuid, usize>>,

    events_sent: AtomicU64,
    events_lagged: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                events_sent: AtomicU64::new(0),
                events_lagged: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to every connection. Fire-and-forget: returns the
    /// number of live receivers, zero when nobody is connected.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode gateway event: {}", e);
                return 0;
            }
        };

        let outbound = Outbound {
            chat_id: event.chat_id(),
            exclude: event.excluded_recipient(),
            members: event.members().map(Into::into),
            json: json.into(),
        };

        self.inner.events_sent.fetch_add(1, Ordering::Relaxed);
        self.inner.broadcast_tx.send(outbound).unwrap_or(0)
    }

    pub fn record_lag(&self, skipped: u64) {
        self.inner.events_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    /// Register a connection for a user. The first connection announces
    /// the user as online.
    pub async fn user_online(&self, user_id: Uuid) {
        let first = {
            let mut online = self.inner.online_users.write().await;
            let count = online.entry(user_id).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            self.broadcast(GatewayEvent::PresenceUpdate { user_id, online: true });
        }
    }

    /// Drop a connection for a user. The last one announces offline.
    pub async fn user_offline(&self, user_id: Uuid) {
        let last = {
            let mut online = self.inner.online_users.write().await;
            match online.get_mut(&user_id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    online.remove(&user_id);
                    true
                }
                None => false,
            }
        };

        if last {
            self.broadcast(GatewayEvent::PresenceUpdate { user_id, online: false });
        }
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.online_users.read().await.keys().copied().collect()
    }

    pub async fn stats(&self) -> DispatchStats {
        DispatchStats {
            events_sent: self.inner.events_sent.load(Ordering::Relaxed),
            events_lagged: self.inner.events_lagged.load(Ordering::Relaxed),
            online_users: self.inner.online_users.read().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::models::{ChatView, Participant};
    use tokio::sync::broadcast::error::RecvError;

    fn typing(chat_id: Uuid, user_id: Uuid) -> GatewayEvent {
        GatewayEvent::TypingStart { chat_id, user_id }
    }

    #[tokio::test]
    async fn chat_events_reach_only_subscribers() {
        let dispatcher = Dispatcher::default();
        let mut rx = dispatcher.subscribe();
        let chat = Uuid::new_v4();
        let typist = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert_eq!(dispatcher.broadcast(typing(chat, typist)), 1);
        let out = rx.recv().await.unwrap();
        assert_eq!(out.chat_id, Some(chat));

        let joined: HashSet<Uuid> = [chat].into_iter().collect();
        assert!(out.should_deliver(other, &joined));
        assert!(!out.should_deliver(other, &HashSet::new()));
        // Typing is never echoed to its author.
        assert!(!out.should_deliver(typist, &joined));
    }

    fn group(members: &[Uuid]) -> ChatView {
        let now = Utc::now();
        ChatView {
            id: Uuid::new_v4(),
            chat_name: Some("Weekend".into()),
            is_group_chat: true,
            users: members
                .iter()
                .map(|id| Participant {
                    id: *id,
                    name: "member".into(),
                    profile_pic: String::new(),
                    email: format!("{id}@example.com"),
                })
                .collect(),
            group_admin: members.first().copied(),
            latest_message: None,
            pinned_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn chat_updates_move_connections_in_and_out_of_the_channel() {
        let dispatcher = Dispatcher::default();
        let mut rx = dispatcher.subscribe();
        let admin = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let removed = Uuid::new_v4();
        let chat = group(&[admin, kept]);
        let chat_id = chat.id;

        dispatcher.broadcast(GatewayEvent::ChatUpdate(chat));
        let out = rx.recv().await.unwrap();

        // The removed user still hears about the change, then leaves.
        let mut removed_subs: HashSet<Uuid> = [chat_id].into_iter().collect();
        assert!(out.should_deliver(removed, &removed_subs));
        assert!(out.sync_subscriptions(removed, &mut removed_subs));
        assert!(removed_subs.is_empty());

        // A member who never joined is told and joined.
        let mut kept_subs = HashSet::new();
        assert!(out.should_deliver(kept, &kept_subs));
        assert!(out.sync_subscriptions(kept, &mut kept_subs));
        assert!(kept_subs.contains(&chat_id));

        // Strangers neither receive it nor change.
        let mut stranger_subs = HashSet::new();
        assert!(!out.should_deliver(Uuid::new_v4(), &stranger_subs));
        assert!(!out.sync_subscriptions(Uuid::new_v4(), &mut stranger_subs));

        // Later chat traffic no longer reaches the removed user.
        dispatcher.broadcast(typing(chat_id, admin));
        let typing_out = rx.recv().await.unwrap();
        assert!(!typing_out.should_deliver(removed, &removed_subs));
        assert!(typing_out.should_deliver(kept, &kept_subs));
        assert!(!typing_out.sync_subscriptions(removed, &mut removed_subs));
    }

    #[tokio::test]
    async fn broadcast_without_receivers_is_not_an_error() {
        let dispatcher = Dispatcher::default();
        assert_eq!(dispatcher.broadcast(typing(Uuid::new_v4(), Uuid::new_v4())), 0);
        assert_eq!(dispatcher.stats().await.events_sent, 1);
    }

    #[tokio::test]
    async fn presence_follows_connection_count() {
        let dispatcher = Dispatcher::default();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();

        dispatcher.user_online(user).await;
        dispatcher.user_online(user).await;
        dispatcher.user_offline(user).await;
        assert_eq!(dispatcher.online_users().await, vec![user]);
        dispatcher.user_offline(user).await;
        assert!(dispatcher.online_users().await.is_empty());

        // Only the first connect and the last disconnect are announced.
        let first = rx.recv().await.unwrap();
        assert!(first.json.contains("\"online\":true"));
        let second = rx.recv().await.unwrap();
        assert!(second.json.contains("\"online\":false"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_receiver_lags_instead_of_blocking() {
        let dispatcher = Dispatcher::new(2);
        let mut rx = dispatcher.subscribe();
        let chat = Uuid::new_v4();

        for _ in 0..5 {
            dispatcher.broadcast(typing(chat, Uuid::new_v4()));
        }

        match rx.recv().await {
            Err(RecvError::Lagged(n)) => {
                assert_eq!(n, 3);
                dispatcher.record_lag(n);
            }
            other => panic!("expected lag, got {:?}", other),
        }
        assert!(rx.recv().await.is_ok());
        assert_eq!(dispatcher.stats().await.events_lagged, 3);
    }
}
