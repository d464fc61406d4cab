//! Registration and login shim.
//!
//! Identity creation belongs to the identity store; everything token-shaped
//! is out of scope, so a successful login simply returns the user id the
//! client then presents in `x-user-id`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::storage::{new_object_id, now_secs, StorageError, UserRow};
use crate::web::auth::{digest_password, verify_password};
use crate::web::state::SharedState;
use crate::web::utils::{api_error, profile_to_json};

#[derive(Deserialize)]
pub struct RegisterPayload {
    name: String,
    email: String,
    password: String,
}

pub async fn register_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<RegisterPayload>,
) -> Response {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "name, email, password required");
    }

    let now = now_secs();
    let row = UserRow {
        user_id: new_object_id(),
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_digest: digest_password(&req.password),
        avatar: None,
        bio: None,
        friends: Vec::new(),
        friend_requests: Vec::new(),
        sent_friend_requests: Vec::new(),
        blocked_users: Vec::new(),
        online: false,
        last_seen: now,
        created_at: now,
    };

    let st = state.lock().await;
    match st.storage.insert_user(&row) {
        Ok(()) => (StatusCode::CREATED, axum::Json(profile_to_json(&row))).into_response(),
        Err(StorageError::AlreadyExists(_)) => {
            api_error(StatusCode::CONFLICT, "email already registered")
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct LoginPayload {
    email: String,
    password: String,
}

pub async fn login_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<LoginPayload>,
) -> Response {
    let st = state.lock().await;
    let user = match st.storage.find_user_by_email(&req.email.trim().to_lowercase()) {
        Ok(Some(u)) => u,
        Ok(None) => return api_error(StatusCode::UNAUTHORIZED, "invalid credentials"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    if !verify_password(&user.password_digest, &req.password) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid credentials");
    }
    (StatusCode::OK, axum::Json(profile_to_json(&user))).into_response()
}
