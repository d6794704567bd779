//! Message engine: validates and applies send, edit, delete, react and star.
//!
//! Operations are synchronous against the store and never touch the
//! realtime channel; the HTTP layer broadcasts once an operation succeeds.
//! Authorization is always checked before any store mutation.

use tracing::{debug, info};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::ReactionToggle;
use parley_types::api::{SendMessageRequest, StarStatus};
use parley_types::models::{MessagePreview, MessageView};

use crate::error::ApiError;
use crate::projection;

/// Result of a hard delete, enough for clients to refresh their previews.
#[derive(Debug, Clone)]
pub struct DeletedMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub latest_message: Option<MessagePreview>,
}

pub fn send_message(db: &Database, sender_id: Uuid, req: SendMessageRequest) -> Result<MessageView, ApiError> {
    let content = req
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation("Message content is required"))?
        .to_string();
    let chat_id = req
        .chat_id
        .ok_or_else(|| ApiError::validation("chat_id is required"))?;

    let cid = chat_id.to_string();
    let sid = sender_id.to_string();

    if db.get_chat(&cid)?.is_none() {
        return Err(ApiError::NotFound("Chat"));
    }
    if !db.is_chat_member(&cid, &sid)? {
        return Err(ApiError::Forbidden("post in this chat"));
    }

    let reply_to = match req.reply_to_id {
        Some(reply_id) => {
            let rid = reply_id.to_string();
            match db.get_message(&rid)? {
                Some(target) if target.chat_id == cid => Some(rid),
                _ => return Err(ApiError::validation("Reply target must be a message in the same chat")),
            }
        }
        None => None,
    };

    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    db.insert_message(&mid, &cid, &sid, &content, reply_to.as_deref())?;
    debug!("{} sent message {} to chat {}", sender_id, message_id, chat_id);

    projected(db, &mid)
}

/// All messages of a chat, oldest first, fully projected.
pub fn list_messages(db: &Database, chat_id: Uuid, requester_id: Uuid) -> Result<Vec<MessageView>, ApiError> {
    let cid = chat_id.to_string();

    if db.get_chat(&cid)?.is_none() {
        return Err(ApiError::NotFound("Chat"));
    }
    if !db.is_chat_member(&cid, &requester_id.to_string())? {
        return Err(ApiError::Forbidden("read this chat"));
    }

    let rows = db.get_messages(&cid)?;
    Ok(projection::message_views(db, rows)?)
}

pub fn edit_message(
    db: &Database,
    message_id: Uuid,
    requester_id: Uuid,
    content: &str,
) -> Result<MessageView, ApiError> {
    let mid = message_id.to_string();
    let message = db.get_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;

    if message.sender_id != requester_id.to_string() {
        return Err(ApiError::Forbidden("edit this message"));
    }

    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Message content is required"));
    }

    if !db.update_message_content(&mid, content)? {
        return Err(ApiError::NotFound("Message"));
    }

    projected(db, &mid)
}

pub fn delete_message(db: &Database, message_id: Uuid, requester_id: Uuid) -> Result<DeletedMessage, ApiError> {
    let mid = message_id.to_string();
    let message = db.get_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;

    if message.sender_id != requester_id.to_string() {
        return Err(ApiError::Forbidden("delete this message"));
    }

    let deleted = db.delete_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;

    let latest_message = match &deleted.latest_message_id {
        Some(id) => db.get_message(id)?.as_ref().map(projection::preview),
        None => None,
    };

    info!("{} deleted message {}", requester_id, message_id);

    Ok(DeletedMessage {
        id: message_id,
        chat_id: message.chat_id.parse().map_err(anyhow::Error::from)?,
        latest_message,
    })
}

/// Toggle the requester's reaction: none appends, the same emoji removes,
/// a different emoji replaces in place.
pub fn react_to_message(
    db: &Database,
    message_id: Uuid,
    requester_id: Uuid,
    emoji: &str,
) -> Result<(ReactionToggle, MessageView), ApiError> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(ApiError::validation("Emoji is required"));
    }

    let mid = message_id.to_string();
    let uid = requester_id.to_string();
    require_message_access(db, &mid, &uid, "react to this message")?;

    let outcome = db
        .toggle_reaction(&mid, &uid, emoji)?
        .ok_or(ApiError::NotFound("Message"))?;
    debug!("{} reaction on {}: {:?}", requester_id, message_id, outcome);

    Ok((outcome, projected(db, &mid)?))
}

/// Toggle the requester in the message's starred set.
pub fn star_message(
    db: &Database,
    message_id: Uuid,
    requester_id: Uuid,
) -> Result<(StarStatus, MessageView), ApiError> {
    let mid = message_id.to_string();
    let uid = requester_id.to_string();
    require_message_access(db, &mid, &uid, "star this message")?;

    let starred = db.toggle_star(&mid, &uid)?.ok_or(ApiError::NotFound("Message"))?;
    let status = if starred { StarStatus::Starred } else { StarStatus::Unstarred };

    Ok((status, projected(db, &mid)?))
}

/// The message must exist and the requester must be in its chat.
fn require_message_access(db: &Database, mid: &str, uid: &str, action: &'static str) -> Result<(), ApiError> {
    let message = db.get_message(mid)?.ok_or(ApiError::NotFound("Message"))?;
    if !db.is_chat_member(&message.chat_id, uid)? {
        return Err(ApiError::Forbidden(action));
    }
    Ok(())
}

fn projected(db: &Database, mid: &str) -> Result<MessageView, ApiError> {
    projection::load_message(db, mid)?.ok_or(ApiError::NotFound("Message"))
}
