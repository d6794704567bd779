use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message sender as rendered next to its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub profile_pic: String,
}

/// A chat participant. The only projection that exposes an email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub profile_pic: String,
    pub email: String,
}

/// Profile returned by the identity endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_pic: String,
}

/// One user's reaction. A message carries at most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
}

/// Shallow view of the message being replied to.
/// Reply chains are never expanded past this level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub content: String,
    pub sender_name: String,
}

/// Short form of a message embedded in a chat (latest message, pins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub id: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatView {
    pub id: Uuid,
    pub is_group_chat: bool,
    pub chat_name: Option<String>,
    pub group_admin: Option<Uuid>,
    pub users: Vec<Participant>,
    pub latest_message: Option<MessagePreview>,
    pub pinned_messages: Vec<MessagePreview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatView {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.users.iter().any(|u| u.id == user_id)
    }

    pub fn is_pinned(&self, message_id: Uuid) -> bool {
        self.pinned_messages.iter().any(|m| m.id == message_id)
    }
}

/// Fully projected message: sender, owning chat with its participants,
/// and the reply target if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub chat: ChatView,
    pub reply_to: Option<ReplyPreview>,
    pub reactions: Vec<Reaction>,
    pub starred_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageView {
    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            id: self.id,
            sender: self.sender.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }

    pub fn reaction_by(&self, user_id: Uuid) -> Option<&str> {
        self.reactions
            .iter()
            .find(|r| r.user_id == user_id)
            .map(|r| r.emoji.as_str())
    }

    pub fn is_starred_by(&self, user_id: Uuid) -> bool {
        self.starred_by.contains(&user_id)
    }
}
