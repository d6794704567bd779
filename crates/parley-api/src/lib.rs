//! REST surface of the chat server: auth, chat management, the message
//! engine and pin coordinator, plus the `/gateway` WebSocket upgrade.

pub mod auth;
pub mod chats;
pub mod engine;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pins;
pub mod projection;
pub mod reactions;
pub mod state;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_gateway::connection;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/chats", get(chats::get_chats).post(chats::open_direct_chat))
        .route("/chats/group", post(chats::create_group))
        .route("/chats/{chat_id}/name", put(chats::rename))
        .route("/chats/{chat_id}/users", post(chats::add_member))
        .route("/chats/{chat_id}/users/{user_id}", delete(chats::remove_member))
        .route("/chats/{chat_id}/pins", put(chats::toggle_pin))
        .route("/chats/{chat_id}/messages", get(messages::get_messages))
        .route("/messages", post(messages::send_message))
        .route(
            "/messages/{message_id}",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/messages/{message_id}/reactions", put(reactions::toggle_reaction))
        .route("/messages/{message_id}/star", put(reactions::toggle_star))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.dispatcher.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
        )
    })
}
