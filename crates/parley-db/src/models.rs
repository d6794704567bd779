/// Database row types. These map directly to SQLite rows and stay
/// independent of the projected views in parley-types.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub profile_pic: String,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub is_group_chat: bool,
    pub chat_name: Option<String>,
    pub group_admin_id: Option<String>,
    pub latest_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A chat participant joined with its user record.
pub struct MemberRow {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub profile_pic: String,
}

/// A message joined with its sender's public fields.
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_pic: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

pub struct StarRow {
    pub message_id: String,
    pub user_id: String,
}

/// Outcome of toggling a user's reaction on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionToggle {
    /// No previous reaction by this user; one was appended.
    Added,
    /// Same emoji as before; the reaction was removed.
    Removed,
    /// Different emoji; replaced in place.
    Switched,
}

/// Result of a hard delete: which chat the message was in and what that
/// chat's latest message is now.
pub struct DeletedMessage {
    pub chat_id: String,
    pub latest_message_id: Option<String>,
}
