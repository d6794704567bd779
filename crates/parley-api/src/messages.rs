use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, DeleteMessageResponse, EditMessageRequest, SendMessageRequest};
use parley_types::events::GatewayEvent;

use crate::engine;
use crate::error::ApiError;
use crate::state::AppState;

/// Persist a message and fan it out to the chat's subscribers. The
/// broadcast happens here, after the write, so clients never relay.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .blocking(move |db| engine::send_message(db, claims.sub, req))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageCreate(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .blocking(move |db| engine::list_messages(db, chat_id, claims.sub))
        .await?;
    Ok(Json(messages))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .blocking(move |db| engine::edit_message(db, message_id, claims.sub, &req.content))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate(message.clone()));

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .blocking(move |db| engine::delete_message(db, message_id, claims.sub))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageDelete {
        id: deleted.id,
        chat_id: deleted.chat_id,
        latest_message: deleted.latest_message,
    });

    Ok(Json(DeleteMessageResponse {
        id: deleted.id,
        message: "Message deleted".to_string(),
    }))
}
