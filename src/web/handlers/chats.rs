//! Chat list and per-peer history handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::chats;
use crate::web::auth::Actor;
use crate::web::state::SharedState;
use crate::web::utils::core_error;

pub async fn get_chats_handler(State(state): State<SharedState>, actor: Actor) -> Response {
    let st = state.lock().await;
    match chats::get_chats(&st.storage, &actor.0) {
        Ok(list) => (StatusCode::OK, axum::Json(list)).into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn get_chat_history_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(peer_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match chats::get_chat_history(&st.storage, &actor.0, &peer_id) {
        Ok(list) => (StatusCode::OK, axum::Json(list)).into_response(),
        Err(e) => core_error(e),
    }
}
