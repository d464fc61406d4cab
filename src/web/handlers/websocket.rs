//! WebSocket upgrade and per-session connection handling.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::delivery::{self, DeliveryEvent};
use crate::plog;
use crate::web::auth::Actor;
use crate::web::config::MAX_WS_SESSIONS;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

/// Frames a client may send over the socket. Anything else is ignored.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Typing {
        #[serde(default)]
        recipient_id: Option<String>,
        #[serde(default)]
        group_id: Option<String>,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    actor: Actor,
) -> Response {
    // Check the session limit before upgrading
    {
        let st = state.lock().await;
        if st.registry.session_count() >= MAX_WS_SESSIONS {
            return api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                &format!("too many WebSocket sessions (max {MAX_WS_SESSIONS})"),
            );
        }
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, actor.0))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, user_id: String) {
    // Register the session, re-checking the cap atomically with the insert:
    // concurrent upgrades can all pass the pre-upgrade check. On a first
    // connect, flip presence to online.
    let session = {
        let st = state.lock().await;
        let session = st.registry.try_connect(&user_id, MAX_WS_SESSIONS);
        if let Some(session) = &session {
            if session.first_for_user {
                delivery::mark_connected(&st.registry, &st.storage, &user_id);
            }
        }
        session
    };
    let Some(mut session) = session else {
        plog!(
            "ws upgrade refused for {}: session cap reached",
            crate::logging::user_id(&user_id)
        );
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    };

    plog!(
        "ws session {} opened for {}",
        session.session_id,
        crate::logging::user_id(&user_id)
    );

    loop {
        tokio::select! {
            // Forward delivery events to the client
            event = session.receiver.recv() => {
                match event {
                    Some(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    None => break, // session was pruned
                }
            }
            // Handle frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                            handle_client_frame(&state, &user_id, frame).await;
                        }
                    }
                    Some(Err(_)) => break,
                    _ => {} // ignore binary frames
                }
            }
        }
    }

    // Unregister and, on a last disconnect, flip presence to offline.
    {
        let st = state.lock().await;
        let last = st.registry.disconnect(&user_id, session.session_id);
        if last {
            delivery::mark_disconnected(&st.registry, &st.storage, &user_id);
        }
    }

    plog!(
        "ws session {} closed for {}",
        session.session_id,
        crate::logging::user_id(&user_id)
    );
}

/// Fan a typing indicator out to its audience. Never persisted, never an
/// error: a bad target simply delivers to nobody.
async fn handle_client_frame(state: &SharedState, user_id: &str, frame: ClientFrame) {
    let ClientFrame::Typing {
        recipient_id,
        group_id,
    } = frame;

    let st = state.lock().await;
    let event = DeliveryEvent::Typing {
        from_user_id: user_id.to_string(),
        recipient_id: recipient_id.clone(),
        group_id: group_id.clone(),
    };

    match (recipient_id, group_id) {
        (Some(recipient), _) => {
            st.registry.push_to_user(&recipient, &event);
        }
        (_, Some(group)) => {
            let members = match st.storage.list_group_members(&group) {
                Ok(members) => members,
                Err(e) => {
                    plog!("typing fan-out failed for group lookup: {e}");
                    return;
                }
            };
            st.registry.push_to_users(
                members
                    .iter()
                    .map(|m| m.user_id.as_str())
                    .filter(|id| *id != user_id),
                &event,
            );
        }
        _ => {}
    }
}
