//! Shared utility functions for the web layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::CoreError;
use crate::storage::UserRow;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a typed core error to its HTTP response. `Inconsistent` has already
/// raised its integrity alarm by the time it reaches here.
pub fn core_error(e: CoreError) -> Response {
    let status = match &e {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Unauthorized(_) => StatusCode::FORBIDDEN,
        CoreError::Inconsistent(_) | CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Public profile JSON: never exposes credentials or relationship lists.
pub fn profile_to_json(user: &UserRow) -> serde_json::Value {
    serde_json::json!({
        "user_id": user.user_id,
        "name": user.name,
        "email": user.email,
        "avatar": user.avatar,
        "bio": user.bio,
        "friends": user.friends.len(),
        "online": user.online,
        "last_seen": user.last_seen,
    })
}
