use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "ok",
            "sessions": st.registry.session_count(),
        })),
    )
        .into_response()
}
