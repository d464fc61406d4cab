//! Axum router construction.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Accounts API
        .route(
            "/api/auth/register",
            post(handlers::accounts::register_handler),
        )
        .route("/api/auth/login", post(handlers::accounts::login_handler))
        // Users API
        .route(
            "/api/users/search",
            get(handlers::users::search_users_handler),
        )
        .route("/api/users/:user_id", get(handlers::users::get_user_handler))
        .route(
            "/api/users/:user_id/block",
            post(handlers::friends::block_handler),
        )
        .route(
            "/api/users/:user_id/unblock",
            post(handlers::friends::unblock_handler),
        )
        // Profile API
        .route(
            "/api/profile",
            get(handlers::users::get_own_profile_handler)
                .put(handlers::users::update_profile_handler),
        )
        // Friends API
        .route("/api/friends", get(handlers::friends::list_friends_handler))
        .route(
            "/api/friends/:user_id",
            delete(handlers::friends::unfriend_handler),
        )
        // Friend Requests API
        .route(
            "/api/friend-requests",
            get(handlers::friends::list_requests_handler)
                .post(handlers::friends::send_request_handler),
        )
        .route(
            "/api/friend-requests/sent",
            get(handlers::friends::list_sent_requests_handler),
        )
        .route(
            "/api/friend-requests/:user_id/accept",
            post(handlers::friends::accept_request_handler),
        )
        .route(
            "/api/friend-requests/:user_id/reject",
            post(handlers::friends::reject_request_handler),
        )
        .route(
            "/api/friend-requests/:user_id/cancel",
            post(handlers::friends::cancel_request_handler),
        )
        // Messages API
        .route(
            "/api/messages",
            post(handlers::messages::send_message_handler),
        )
        .route(
            "/api/messages/:message_id",
            put(handlers::messages::edit_message_handler)
                .delete(handlers::messages::delete_message_handler),
        )
        .route(
            "/api/messages/:message_id/seen",
            post(handlers::messages::mark_seen_handler),
        )
        // Chats API
        .route("/api/chats", get(handlers::chats::get_chats_handler))
        .route(
            "/api/chats/:peer_id",
            get(handlers::chats::get_chat_history_handler),
        )
        // Groups API
        .route("/api/groups", post(handlers::groups::create_group_handler))
        .route(
            "/api/groups/:group_id",
            get(handlers::groups::get_group_handler),
        )
        .route(
            "/api/groups/:group_id/members",
            post(handlers::groups::add_member_handler),
        )
        .route(
            "/api/groups/:group_id/members/:user_id",
            delete(handlers::groups::remove_member_handler),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
