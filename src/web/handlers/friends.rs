//! Friend graph handlers: request lifecycle, friend list, blocking.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::delivery::DeliveryEvent;
use crate::relationships;
use crate::web::auth::Actor;
use crate::web::state::SharedState;
use crate::web::utils::core_error;

pub async fn list_friends_handler(State(state): State<SharedState>, actor: Actor) -> Response {
    let st = state.lock().await;
    match relationships::list_friends(&st.storage, &actor.0) {
        Ok(friends) => (StatusCode::OK, axum::Json(friends)).into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn list_requests_handler(State(state): State<SharedState>, actor: Actor) -> Response {
    let st = state.lock().await;
    match relationships::list_friend_requests(&st.storage, &actor.0) {
        Ok(requests) => (StatusCode::OK, axum::Json(requests)).into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn list_sent_requests_handler(
    State(state): State<SharedState>,
    actor: Actor,
) -> Response {
    let st = state.lock().await;
    match relationships::list_sent_requests(&st.storage, &actor.0) {
        Ok(requests) => (StatusCode::OK, axum::Json(requests)).into_response(),
        Err(e) => core_error(e),
    }
}

#[derive(Deserialize)]
pub struct SendRequestPayload {
    target_id: String,
}

pub async fn send_request_handler(
    State(state): State<SharedState>,
    actor: Actor,
    axum::Json(req): axum::Json<SendRequestPayload>,
) -> Response {
    let st = state.lock().await;
    if let Err(e) = relationships::send_friend_request(&st.storage, &actor.0, &req.target_id) {
        return core_error(e);
    }

    let from_name = st
        .storage
        .get_user(&actor.0)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_default();
    st.registry.push_to_user(
        &req.target_id,
        &DeliveryEvent::FriendRequestReceived {
            from_user_id: actor.0.clone(),
            from_name,
        },
    );

    (
        StatusCode::CREATED,
        axum::Json(serde_json::json!({ "status": "pending", "target_id": req.target_id })),
    )
        .into_response()
}

pub async fn accept_request_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    if let Err(e) = relationships::accept_friend_request(&st.storage, &actor.0, &user_id) {
        return core_error(e);
    }

    let by_name = st
        .storage
        .get_user(&actor.0)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_default();
    st.registry.push_to_user(
        &user_id,
        &DeliveryEvent::FriendRequestAccepted {
            by_user_id: actor.0.clone(),
            by_name,
        },
    );

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "accepted", "user_id": user_id })),
    )
        .into_response()
}

pub async fn reject_request_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match relationships::reject_friend_request(&st.storage, &actor.0, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "rejected", "user_id": user_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn cancel_request_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match relationships::cancel_friend_request(&st.storage, &actor.0, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "cancelled", "user_id": user_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn unfriend_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match relationships::unfriend_user(&st.storage, &actor.0, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "unfriended", "user_id": user_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn block_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match relationships::block_user(&st.storage, &actor.0, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "blocked", "user_id": user_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn unblock_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match relationships::unblock_user(&st.storage, &actor.0, &user_id) {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "unblocked", "user_id": user_id })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}
