//! Message handlers: send, edit, delete, mark seen.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::messages;
use crate::web::auth::Actor;
use crate::web::state::SharedState;
use crate::web::utils::core_error;
use crate::{delivery, plog};

#[derive(Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    content: String,
    #[serde(default)]
    attachment: Option<String>,
}

pub async fn send_message_handler(
    State(state): State<SharedState>,
    actor: Actor,
    axum::Json(req): axum::Json<SendMessagePayload>,
) -> Response {
    let st = state.lock().await;
    let message = match messages::send_message(
        &st.storage,
        &actor.0,
        req.recipient_id.as_deref(),
        req.group_id.as_deref(),
        &req.content,
        req.attachment.as_deref(),
    ) {
        Ok(m) => m,
        Err(e) => return core_error(e),
    };

    plog!(
        "message {} sent by {}",
        crate::logging::msg_id(&message.message_id),
        crate::logging::user_id(&actor.0)
    );

    delivery::deliver_message(&st.registry, &st.storage, &message);

    (StatusCode::CREATED, axum::Json(message)).into_response()
}

#[derive(Deserialize)]
pub struct EditMessagePayload {
    content: String,
}

pub async fn edit_message_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(message_id): Path<String>,
    axum::Json(req): axum::Json<EditMessagePayload>,
) -> Response {
    let st = state.lock().await;
    match messages::edit_message(&st.storage, &message_id, &req.content, &actor.0) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "edited", "message_id": message_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn delete_message_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match messages::delete_message(&st.storage, &message_id, &actor.0) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "deleted", "message_id": message_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn mark_seen_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(message_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match messages::mark_message_seen(&st.storage, &message_id, &actor.0) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "seen", "message_id": message_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}
