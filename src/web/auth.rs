//! Actor extraction and the credential shim.
//!
//! Token issuance/refresh lives outside this system; what the core needs is
//! an authenticated actor id per request, which this extractor supplies from
//! the `x-user-id` header after checking the user exists. Credential
//! material on the user row is an opaque salted digest the core never
//! inspects beyond the register/login shim.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::web::state::SharedState;
use crate::web::utils::api_error;

/// The authenticated user id of the current request.
pub struct Actor(pub String);

#[async_trait]
impl FromRequestParts<SharedState> for Actor {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing x-user-id header"))?
            .to_string();

        let st = state.lock().await;
        match st.storage.user_exists(&user_id) {
            Ok(true) => Ok(Actor(user_id)),
            Ok(false) => Err(api_error(StatusCode::UNAUTHORIZED, "unknown user")),
            Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        }
    }
}

/// Produce the stored `salt$digest` form of a password.
pub fn digest_password(password: &str) -> String {
    let mut salt_bytes = [0u8; 8];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    format!("{salt}${}", salt_digest(&salt, password))
}

/// Check a password attempt against a stored `salt$digest` string.
pub fn verify_password(stored: &str, attempt: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => salt_digest(salt, attempt) == digest,
        None => false,
    }
}

fn salt_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
