use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatView, MessagePreview, MessageView};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// A new message was posted ("message received")
    MessageCreate(MessageView),

    /// A message was edited, reacted to or starred ("message updated")
    MessageUpdate(MessageView),

    /// A message was deleted. Carries the chat's preview after the delete.
    MessageDelete {
        id: Uuid,
        chat_id: Uuid,
        latest_message: Option<MessagePreview>,
    },

    /// Pinned messages, name or participants of a chat changed
    ChatUpdate(ChatView),

    /// A user started typing
    TypingStart { chat_id: Uuid, user_id: Uuid },

    /// A user stopped typing
    TypingStop { chat_id: Uuid, user_id: Uuid },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },
}

impl GatewayEvent {
    /// Returns the chat id if this event is scoped to a chat channel.
    /// Events that return `None` are global and delivered to all clients.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate(m) | Self::MessageUpdate(m) => Some(m.chat.id),
            Self::MessageDelete { chat_id, .. } => Some(*chat_id),
            Self::ChatUpdate(chat) => Some(chat.id),
            Self::TypingStart { chat_id, .. } | Self::TypingStop { chat_id, .. } => Some(*chat_id),
            Self::Ready { .. } | Self::PresenceUpdate { .. } => None,
        }
    }

    /// The user that must not receive this event back (typing echoes).
    pub fn excluded_recipient(&self) -> Option<Uuid> {
        match self {
            Self::TypingStart { user_id, .. } | Self::TypingStop { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    /// The chat's full member list when the event carries one.
    /// Connections use it to leave the channels of chats they lost.
    pub fn members(&self) -> Option<Vec<Uuid>> {
        match self {
            Self::ChatUpdate(chat) => Some(chat.users.iter().map(|u| u.id).collect()),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join the channels of these chats ("join chat").
    /// Replaces the previous subscription set.
    Subscribe { chat_ids: Vec<Uuid> },

    /// Indicate typing in a chat
    StartTyping { chat_id: Uuid },

    /// Typing burst ended
    StopTyping { chat_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_events_exclude_their_author() {
        let chat_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let event = GatewayEvent::TypingStart { chat_id, user_id };
        assert_eq!(event.chat_id(), Some(chat_id));
        assert_eq!(event.excluded_recipient(), Some(user_id));

        let presence = GatewayEvent::PresenceUpdate { user_id, online: true };
        assert_eq!(presence.chat_id(), None);
        assert_eq!(presence.excluded_recipient(), None);
        assert_eq!(presence.members(), None);
    }

    #[test]
    fn commands_use_adjacent_tagging() {
        let chat_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"StopTyping","data":{{"chat_id":"{chat_id}"}}}}"#);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::StopTyping { chat_id: parsed } => assert_eq!(parsed, chat_id),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
