use tracing::debug;
use uuid::Uuid;

use parley_db::Database;
use parley_types::models::ChatView;

use crate::error::ApiError;
use crate::projection;

/// Toggle a message in the chat's pinned list: removed if present,
/// appended if not. Only participants may pin, and only messages of the
/// chat itself. Returns whether the message is now pinned along with the
/// updated chat snapshot.
pub fn toggle_pin(
    db: &Database,
    chat_id: Uuid,
    message_id: Uuid,
    requester_id: Uuid,
) -> Result<(bool, ChatView), ApiError> {
    let cid = chat_id.to_string();
    let mid = message_id.to_string();

    if db.get_chat(&cid)?.is_none() {
        return Err(ApiError::NotFound("Chat"));
    }
    if !db.is_chat_member(&cid, &requester_id.to_string())? {
        return Err(ApiError::Forbidden("pin messages in this chat"));
    }

    let message = db.get_message(&mid)?.ok_or(ApiError::NotFound("Message"))?;
    if message.chat_id != cid {
        return Err(ApiError::validation("Message does not belong to this chat"));
    }

    let pinned = db.toggle_pin(&cid, &mid)?.ok_or(ApiError::NotFound("Message"))?;
    debug!("{} {} message {} in {}", requester_id, if pinned { "pinned" } else { "unpinned" }, message_id, chat_id);

    let chat = projection::load_chat(db, &cid)?.ok_or(ApiError::NotFound("Chat"))?;
    Ok((pinned, chat))
}
