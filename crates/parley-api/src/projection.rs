//! Projection builder: turns raw store rows into the response-shaped views
//! used by every REST response and gateway event.
//!
//! One typed path serves all operations, so send, list, edit, react, star
//! and pin all return the same shapes.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::{ChatRow, MemberRow, MessageRow};
use parley_types::models::{
    ChatView, MessagePreview, MessageView, Participant, Reaction, ReplyPreview, UserSummary,
};

/// Project a chat by id. `None` if the chat does not exist.
pub fn load_chat(db: &Database, chat_id: &str) -> Result<Option<ChatView>> {
    match db.get_chat(chat_id)? {
        Some(row) => chat_view(db, row).map(Some),
        None => Ok(None),
    }
}

/// Project a chat: participants, latest message preview and pins.
pub fn chat_view(db: &Database, row: ChatRow) -> Result<ChatView> {
    let users = db.get_chat_members(&row.id)?.into_iter().map(participant).collect();

    let latest_message = match &row.latest_message_id {
        Some(id) => db.get_message(id)?.as_ref().map(preview),
        None => None,
    };

    let pinned_messages = db.get_pinned_messages(&row.id)?.iter().map(preview).collect();

    Ok(ChatView {
        id: parse_uuid(&row.id, "chat id"),
        is_group_chat: row.is_group_chat,
        chat_name: row.chat_name,
        group_admin: row.group_admin_id.as_deref().map(|id| parse_uuid(id, "group admin")),
        users,
        latest_message,
        pinned_messages,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

/// Project a message by id. `None` if the message does not exist.
pub fn load_message(db: &Database, message_id: &str) -> Result<Option<MessageView>> {
    match db.get_message(message_id)? {
        Some(row) => message_views(db, vec![row]).map(|mut views| views.pop()),
        None => Ok(None),
    }
}

/// Project a batch of messages, keeping their order. Reactions and stars
/// are fetched in one query each; chats and reply targets once per id.
pub fn message_views(db: &Database, rows: Vec<MessageRow>) -> Result<Vec<MessageView>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut reactions: HashMap<String, Vec<Reaction>> = HashMap::new();
    for r in db.get_reactions_for_messages(&ids)? {
        reactions.entry(r.message_id).or_default().push(Reaction {
            user_id: parse_uuid(&r.user_id, "reaction user"),
            emoji: r.emoji,
        });
    }

    let mut stars: HashMap<String, Vec<Uuid>> = HashMap::new();
    for s in db.get_stars_for_messages(&ids)? {
        stars
            .entry(s.message_id)
            .or_default()
            .push(parse_uuid(&s.user_id, "starring user"));
    }

    let mut chats: HashMap<String, ChatView> = HashMap::new();
    let mut replies: HashMap<String, Option<ReplyPreview>> = HashMap::new();
    let mut views = Vec::with_capacity(rows.len());

    for row in rows {
        if !chats.contains_key(&row.chat_id) {
            let chat = load_chat(db, &row.chat_id)?
                .ok_or_else(|| anyhow!("chat {} of message {} is missing", row.chat_id, row.id))?;
            chats.insert(row.chat_id.clone(), chat);
        }

        let reply_to = match &row.reply_to_id {
            Some(reply_id) => {
                if !replies.contains_key(reply_id) {
                    let target = db.get_message(reply_id)?.map(|m| ReplyPreview {
                        id: parse_uuid(&m.id, "reply id"),
                        content: m.content,
                        sender_name: m.sender_name,
                    });
                    replies.insert(reply_id.clone(), target);
                }
                replies.get(reply_id).cloned().flatten()
            }
            None => None,
        };

        views.push(MessageView {
            id: parse_uuid(&row.id, "message id"),
            sender: sender(&row),
            chat: chats[&row.chat_id].clone(),
            reply_to,
            reactions: reactions.remove(&row.id).unwrap_or_default(),
            starred_by: stars.remove(&row.id).unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            content: row.content,
        });
    }

    Ok(views)
}

pub fn preview(row: &MessageRow) -> MessagePreview {
    MessagePreview {
        id: parse_uuid(&row.id, "message id"),
        sender: sender(row),
        content: row.content.clone(),
        created_at: parse_timestamp(&row.created_at),
    }
}

fn sender(row: &MessageRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&row.sender_id, "sender id"),
        name: row.sender_name.clone(),
        profile_pic: row.sender_pic.clone(),
    }
}

fn participant(row: MemberRow) -> Participant {
    Participant {
        id: parse_uuid(&row.user_id, "participant id"),
        name: row.name,
        profile_pic: row.profile_pic,
        email: row.email,
    }
}

/// Ids are written by this crate, so a parse failure means a corrupt row.
/// Logged and replaced with the nil id rather than failing the whole view.
fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by SQLite's datetime() carry no timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_timestamps() {
        let ts = parse_timestamp("2026-03-01T10:20:30.456Z");
        assert_eq!(ts.timestamp_millis() % 1000, 456);

        let legacy = parse_timestamp("2026-03-01 10:20:30");
        assert_eq!(legacy.timestamp(), ts.timestamp());

        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }

    #[test]
    fn corrupt_ids_become_nil() {
        assert_eq!(parse_uuid("not-a-uuid", "test"), Uuid::nil());
    }
}
