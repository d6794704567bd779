use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::ChatRow;
use parley_types::api::{AccessChatRequest, AddMemberRequest, Claims, CreateGroupRequest, RenameGroupRequest, TogglePinRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::ChatView;

use crate::error::ApiError;
use crate::pins;
use crate::projection;
use crate::state::AppState;

/// A group needs the admin plus at least this many other users.
const MIN_GROUP_OTHERS: usize = 2;

// -- Operations --

/// The one-to-one chat between the requester and `other_id`, created on
/// first access.
pub fn access_chat(db: &Database, requester_id: Uuid, other_id: Uuid) -> Result<ChatView, ApiError> {
    if requester_id == other_id {
        return Err(ApiError::validation("Cannot start a chat with yourself"));
    }

    let me = requester_id.to_string();
    let other = other_id.to_string();
    if db.get_user_by_id(&other)?.is_none() {
        return Err(ApiError::NotFound("User"));
    }

    let chat_id = match db.find_direct_chat(&me, &other)? {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            db.create_chat(&id, false, None, None, &[me, other])?;
            info!("Created direct chat {}", id);
            id
        }
    };

    loaded_chat(db, &chat_id)
}

/// Every chat the requester belongs to, most recent activity first.
pub fn fetch_chats(db: &Database, requester_id: Uuid) -> Result<Vec<ChatView>, ApiError> {
    db.get_chats_for_user(&requester_id.to_string())?
        .into_iter()
        .map(|row| projection::chat_view(db, row).map_err(ApiError::from))
        .collect()
}

pub fn create_group_chat(
    db: &Database,
    requester_id: Uuid,
    name: &str,
    user_ids: &[Uuid],
) -> Result<ChatView, ApiError> {
    let name = valid_group_name(name)?;

    let mut others: Vec<Uuid> = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        if *id != requester_id && !others.contains(id) {
            others.push(*id);
        }
    }
    if others.len() < MIN_GROUP_OTHERS {
        return Err(ApiError::validation("A group chat needs at least 2 other users"));
    }

    let mut members: Vec<String> = vec![requester_id.to_string()];
    members.extend(others.iter().map(Uuid::to_string));
    if db.count_users(&members)? != members.len() {
        return Err(ApiError::NotFound("User"));
    }

    let chat_id = Uuid::new_v4().to_string();
    db.create_chat(&chat_id, true, Some(name), Some(members[0].as_str()), &members)?;
    info!("{} created group {} ({} members)", requester_id, chat_id, members.len());

    loaded_chat(db, &chat_id)
}

pub fn rename_group(db: &Database, chat_id: Uuid, requester_id: Uuid, name: &str) -> Result<ChatView, ApiError> {
    let name = valid_group_name(name)?;
    let group = load_group(db, chat_id)?;
    require_admin(&group, requester_id, "rename this group")?;

    db.rename_chat(&group.id, name)?;
    loaded_chat(db, &group.id)
}

pub fn add_to_group(db: &Database, chat_id: Uuid, requester_id: Uuid, user_id: Uuid) -> Result<ChatView, ApiError> {
    let group = load_group(db, chat_id)?;
    require_admin(&group, requester_id, "add members to this group")?;

    let uid = user_id.to_string();
    if db.get_user_by_id(&uid)?.is_none() {
        return Err(ApiError::NotFound("User"));
    }

    db.add_chat_member(&group.id, &uid)?;
    loaded_chat(db, &group.id)
}

/// Admins may remove anyone; any member may remove themselves.
pub fn remove_from_group(
    db: &Database,
    chat_id: Uuid,
    requester_id: Uuid,
    user_id: Uuid,
) -> Result<ChatView, ApiError> {
    let group = load_group(db, chat_id)?;
    if requester_id != user_id {
        require_admin(&group, requester_id, "remove members from this group")?;
    }

    if !db.remove_chat_member(&group.id, &user_id.to_string())? {
        return Err(ApiError::NotFound("Member"));
    }
    loaded_chat(db, &group.id)
}

fn load_group(db: &Database, chat_id: Uuid) -> Result<ChatRow, ApiError> {
    let chat = db.get_chat(&chat_id.to_string())?.ok_or(ApiError::NotFound("Chat"))?;
    if !chat.is_group_chat {
        return Err(ApiError::validation("Only group chats can be changed"));
    }
    Ok(chat)
}

fn require_admin(group: &ChatRow, requester_id: Uuid, action: &'static str) -> Result<(), ApiError> {
    if group.group_admin_id.as_deref() != Some(requester_id.to_string().as_str()) {
        return Err(ApiError::Forbidden(action));
    }
    Ok(())
}

fn valid_group_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("Group name is required"));
    }
    Ok(name)
}

fn loaded_chat(db: &Database, chat_id: &str) -> Result<ChatView, ApiError> {
    projection::load_chat(db, chat_id)?.ok_or(ApiError::NotFound("Chat"))
}

// -- Handlers --

pub async fn get_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = state.blocking(move |db| fetch_chats(db, claims.sub)).await?;
    Ok(Json(chats))
}

pub async fn open_direct_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AccessChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.blocking(move |db| access_chat(db, claims.sub, req.user_id)).await?;
    Ok(Json(chat))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state
        .blocking(move |db| create_group_chat(db, claims.sub, &req.name, &req.user_ids))
        .await?;
    state.dispatcher.broadcast(GatewayEvent::ChatUpdate(chat.clone()));
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn rename(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state
        .blocking(move |db| rename_group(db, chat_id, claims.sub, &req.name))
        .await?;
    state.dispatcher.broadcast(GatewayEvent::ChatUpdate(chat.clone()));
    Ok(Json(chat))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state
        .blocking(move |db| add_to_group(db, chat_id, claims.sub, req.user_id))
        .await?;
    state.dispatcher.broadcast(GatewayEvent::ChatUpdate(chat.clone()));
    Ok(Json(chat))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state
        .blocking(move |db| remove_from_group(db, chat_id, claims.sub, user_id))
        .await?;
    state.dispatcher.broadcast(GatewayEvent::ChatUpdate(chat.clone()));
    Ok(Json(chat))
}

pub async fn toggle_pin(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TogglePinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, chat) = state
        .blocking(move |db| pins::toggle_pin(db, chat_id, req.message_id, claims.sub))
        .await?;
    state.dispatcher.broadcast(GatewayEvent::ChatUpdate(chat.clone()));
    Ok(Json(chat))
}
