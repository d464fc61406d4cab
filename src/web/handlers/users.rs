//! Profile and friend-discovery handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::relationships;
use crate::web::auth::Actor;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, core_error, profile_to_json};

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search_users_handler(
    State(state): State<SharedState>,
    actor: Actor,
    Query(query): Query<SearchQuery>,
) -> Response {
    let st = state.lock().await;
    match relationships::search_new_friends(&st.storage, &actor.0, query.q.as_deref()) {
        Ok(candidates) => (StatusCode::OK, axum::Json(candidates)).into_response(),
        Err(e) => core_error(e),
    }
}

pub async fn get_user_handler(
    State(state): State<SharedState>,
    _actor: Actor,
    Path(user_id): Path<String>,
) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(&user_id) {
        Ok(Some(user)) => (StatusCode::OK, axum::Json(profile_to_json(&user))).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_own_profile_handler(State(state): State<SharedState>, actor: Actor) -> Response {
    let st = state.lock().await;
    match st.storage.get_user(&actor.0) {
        Ok(Some(user)) => (StatusCode::OK, axum::Json(profile_to_json(&user))).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Omitted (or null) avatar/bio fields keep their stored values; clearing a
/// field is not supported through this endpoint.
#[derive(Deserialize)]
pub struct UpdateProfilePayload {
    name: String,
    avatar: Option<String>,
    bio: Option<String>,
}

pub async fn update_profile_handler(
    State(state): State<SharedState>,
    actor: Actor,
    axum::Json(req): axum::Json<UpdateProfilePayload>,
) -> Response {
    if req.name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name cannot be empty");
    }

    let st = state.lock().await;
    match st.storage.update_profile(
        &actor.0,
        req.name.trim(),
        req.avatar.as_deref(),
        req.bio.as_deref(),
    ) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    match st.storage.get_user(&actor.0) {
        Ok(Some(user)) => (StatusCode::OK, axum::Json(profile_to_json(&user))).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "user not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
