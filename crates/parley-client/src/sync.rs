//! Client synchronizer: local mirror of the chat list, the open chat's
//! messages, unread counts, typing and presence, kept current by applying
//! gateway events.
//!
//! Every apply is idempotent per message id and a chat's preview only ever
//! moves forward in time, so the broadcast echo of the client's own
//! mutation and the REST response for it can arrive in either order, with
//! other traffic in between, without duplicating or regressing anything.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use parley_types::api::StarResponse;
use parley_types::events::GatewayEvent;
use parley_types::models::{ChatView, MessagePreview, MessageView};

/// What applying an event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    /// Local state changed; redraw.
    Changed,
    /// A message arrived in a chat that is not open.
    Notify { chat_id: Uuid },
    /// Already applied or not relevant.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ChatSync {
    user_id: Uuid,
    /// Most recently active first.
    chats: Vec<ChatView>,
    active_chat: Option<Uuid>,
    messages: Vec<MessageView>,
    unread: HashMap<Uuid, usize>,
    typing: HashMap<Uuid, HashSet<Uuid>>,
    online: HashSet<Uuid>,
}

impl ChatSync {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            chats: Vec::new(),
            active_chat: None,
            messages: Vec::new(),
            unread: HashMap::new(),
            typing: HashMap::new(),
            online: HashSet::new(),
        }
    }

    // -- Read side --

    pub fn chats(&self) -> &[ChatView] {
        &self.chats
    }

    pub fn chat(&self, chat_id: Uuid) -> Option<&ChatView> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub fn chat_ids(&self) -> Vec<Uuid> {
        self.chats.iter().map(|c| c.id).collect()
    }

    pub fn active_chat(&self) -> Option<Uuid> {
        self.active_chat
    }

    /// Messages of the open chat, oldest first.
    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    pub fn unread(&self, chat_id: Uuid) -> usize {
        self.unread.get(&chat_id).copied().unwrap_or(0)
    }

    /// Other users currently typing in `chat_id`.
    pub fn typing_in(&self, chat_id: Uuid) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self
            .typing
            .get(&chat_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains(&user_id)
    }

    // -- Loading --

    /// Replace the chat list with a fresh fetch.
    pub fn load_chats(&mut self, chats: Vec<ChatView>) {
        self.unread.retain(|id, _| chats.iter().any(|c| c.id == *id));
        self.chats = chats;
        if let Some(active) = self.active_chat {
            if self.chat(active).is_none() {
                self.close_chat();
            }
        }
    }

    /// Open a chat with its fetched history. Clears its unread count.
    pub fn open_chat(&mut self, chat_id: Uuid, messages: Vec<MessageView>) {
        self.active_chat = Some(chat_id);
        self.messages = messages;
        self.unread.remove(&chat_id);
    }

    pub fn close_chat(&mut self) {
        self.active_chat = None;
        self.messages.clear();
    }

    // -- Events --

    pub fn apply(&mut self, event: &GatewayEvent) -> SyncEffect {
        match event {
            GatewayEvent::Ready { .. } => SyncEffect::Unchanged,
            GatewayEvent::MessageCreate(message) => self.message_created(message),
            GatewayEvent::MessageUpdate(message) => self.message_updated(message),
            GatewayEvent::MessageDelete {
                id,
                chat_id,
                latest_message,
            } => self.message_deleted(*id, *chat_id, latest_message.clone()),
            GatewayEvent::ChatUpdate(chat) => self.chat_updated(chat),
            GatewayEvent::TypingStart { chat_id, user_id } => {
                if *user_id == self.user_id {
                    return SyncEffect::Unchanged;
                }
                changed(self.typing.entry(*chat_id).or_default().insert(*user_id))
            }
            GatewayEvent::TypingStop { chat_id, user_id } => {
                let removed = self
                    .typing
                    .get_mut(chat_id)
                    .is_some_and(|set| set.remove(user_id));
                changed(removed)
            }
            GatewayEvent::PresenceUpdate { user_id, online } => {
                if *online {
                    changed(self.online.insert(*user_id))
                } else {
                    changed(self.online.remove(user_id))
                }
            }
        }
    }

    // -- Reconciliation of the client's own REST results --

    pub fn record_sent(&mut self, message: &MessageView) -> SyncEffect {
        self.message_created(message)
    }

    pub fn record_edit(&mut self, message: &MessageView) -> SyncEffect {
        self.message_updated(message)
    }

    /// The REST delete response does not carry the new preview, so the
    /// chat keeps its current one unless the deleted message was it.
    pub fn record_delete(&mut self, message_id: Uuid, chat_id: Uuid) -> SyncEffect {
        let latest = self
            .chat(chat_id)
            .and_then(|c| c.latest_message.clone())
            .filter(|m| m.id != message_id)
            .or_else(|| self.newest_loaded(chat_id, message_id));
        self.message_deleted(message_id, chat_id, latest)
    }

    pub fn record_star(&mut self, response: &StarResponse) -> SyncEffect {
        self.message_updated(&response.message)
    }

    pub fn record_pin(&mut self, chat: &ChatView) -> SyncEffect {
        self.chat_updated(chat)
    }

    // -- Internals --

    fn message_created(&mut self, message: &MessageView) -> SyncEffect {
        let chat_id = message.chat.id;

        if self.active_chat == Some(chat_id) {
            // A typing burst ends with the message.
            if let Some(set) = self.typing.get_mut(&chat_id) {
                set.remove(&message.sender.id);
            }
            if self.replace_message(message) {
                return SyncEffect::Unchanged;
            }
            let at = self
                .messages
                .iter()
                .position(|m| m.created_at > message.created_at)
                .unwrap_or(self.messages.len());
            self.messages.insert(at, message.clone());
            self.bump_chat(message);
            return SyncEffect::Changed;
        }

        let seen = self
            .chat(chat_id)
            .and_then(|c| c.latest_message.as_ref())
            .is_some_and(|m| m.id == message.id || m.created_at > message.created_at);
        if seen {
            return SyncEffect::Unchanged;
        }

        if let Some(set) = self.typing.get_mut(&chat_id) {
            set.remove(&message.sender.id);
        }
        self.bump_chat(message);

        if message.sender.id == self.user_id {
            return SyncEffect::Changed;
        }
        *self.unread.entry(chat_id).or_insert(0) += 1;
        SyncEffect::Notify { chat_id }
    }

    fn message_updated(&mut self, message: &MessageView) -> SyncEffect {
        let mut dirty = false;

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            if existing != message {
                *existing = message.clone();
                dirty = true;
            }
        }

        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat.id) {
            if let Some(latest) = chat.latest_message.as_mut().filter(|m| m.id == message.id) {
                let preview = message.preview();
                if *latest != preview {
                    *latest = preview;
                    dirty = true;
                }
            }
        }

        changed(dirty)
    }

    fn message_deleted(&mut self, message_id: Uuid, chat_id: Uuid, latest: Option<MessagePreview>) -> SyncEffect {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        let mut dirty = self.messages.len() != before;

        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            let pinned = chat.pinned_messages.len();
            chat.pinned_messages.retain(|m| m.id != message_id);
            if chat.latest_message != latest {
                chat.latest_message = latest;
                dirty = true;
            }
            dirty |= chat.pinned_messages.len() != pinned;
        }

        changed(dirty)
    }

    fn chat_updated(&mut self, chat: &ChatView) -> SyncEffect {
        let position = self.chats.iter().position(|c| c.id == chat.id);

        if !chat.has_member(self.user_id) {
            let Some(index) = position else {
                return SyncEffect::Unchanged;
            };
            self.chats.remove(index);
            self.unread.remove(&chat.id);
            self.typing.remove(&chat.id);
            if self.active_chat == Some(chat.id) {
                self.close_chat();
            }
            return SyncEffect::Changed;
        }

        match position {
            Some(index) if self.chats[index] == *chat => SyncEffect::Unchanged,
            Some(index) => {
                self.chats[index] = chat.clone();
                for message in self.messages.iter_mut().filter(|m| m.chat.id == chat.id) {
                    message.chat = chat.clone();
                }
                SyncEffect::Changed
            }
            None => {
                self.chats.insert(0, chat.clone());
                SyncEffect::Changed
            }
        }
    }

    /// Replace an already listed message of the open chat. Returns whether
    /// one was found.
    fn replace_message(&mut self, message: &MessageView) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message.clone();
                true
            }
            None => false,
        }
    }

    /// Set the chat's preview to `message` and move it to the top, unless
    /// the preview already is that message or something newer. Returns
    /// whether anything changed.
    fn bump_chat(&mut self, message: &MessageView) -> bool {
        let preview = message.preview();
        match self.chats.iter().position(|c| c.id == message.chat.id) {
            Some(index) => {
                let current = self.chats[index]
                    .latest_message
                    .as_ref()
                    .is_some_and(|m| m.id == preview.id || m.created_at > preview.created_at);
                if current {
                    return false;
                }
                let mut chat = self.chats.remove(index);
                chat.latest_message = Some(preview);
                self.chats.insert(0, chat);
                true
            }
            None => {
                let mut chat = message.chat.clone();
                chat.latest_message = Some(preview);
                self.chats.insert(0, chat);
                true
            }
        }
    }

    /// Newest loaded message of the open chat other than `excluding`.
    fn newest_loaded(&self, chat_id: Uuid, excluding: Uuid) -> Option<MessagePreview> {
        if self.active_chat != Some(chat_id) {
            return None;
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.id != excluding)
            .map(MessageView::preview)
    }
}

fn changed(dirty: bool) -> SyncEffect {
    if dirty { SyncEffect::Changed } else { SyncEffect::Unchanged }
}
