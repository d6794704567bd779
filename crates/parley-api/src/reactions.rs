use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, ReactRequest, StarResponse};
use parley_types::events::GatewayEvent;

use crate::engine;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, message) = state
        .blocking(move |db| engine::react_to_message(db, message_id, claims.sub, &req.emoji))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate(message.clone()));

    Ok(Json(message))
}

pub async fn toggle_star(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (status, message) = state
        .blocking(move |db| engine::star_message(db, message_id, claims.sub))
        .await?;

    state.dispatcher.broadcast(GatewayEvent::MessageUpdate(message.clone()));

    Ok(Json(StarResponse { status, message }))
}
