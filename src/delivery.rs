//! Real-time delivery channel: per-user session registry and push events.
//!
//! The registry maps a user id to that user's active sessions, each holding
//! the sending half of an unbounded channel drained by the WebSocket task.
//! Add and remove are atomic under the map lock, so concurrent connects and
//! disconnects of the same user cannot leak a stale handle. Fan-out is
//! best-effort: a closed receiver is pruned on the next push, and a failed
//! push never propagates as an error to the operation that triggered it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::logging;
use crate::plog;
use crate::storage::{now_secs, MessageRow, Storage};

/// Events pushed to connected sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    NewMessage {
        message: MessageRow,
    },
    /// Companion event to `NewMessage`, suitable for a badge or toast.
    Notification {
        from_user_id: String,
        from_name: String,
        group_id: Option<String>,
        preview: String,
    },
    /// Ephemeral; routed like a message but never persisted.
    Typing {
        from_user_id: String,
        recipient_id: Option<String>,
        group_id: Option<String>,
    },
    PresenceChanged {
        user_id: String,
        online: bool,
        last_seen: u64,
    },
    FriendRequestReceived {
        from_user_id: String,
        from_name: String,
    },
    FriendRequestAccepted {
        by_user_id: String,
        by_name: String,
    },
}

struct SessionHandle {
    session_id: u64,
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

/// Result of registering a new session.
pub struct ConnectedSession {
    pub session_id: u64,
    /// True when this is the user's only session, i.e. they just came online.
    pub first_for_user: bool,
    pub receiver: mpsc::UnboundedReceiver<DeliveryEvent>,
}

#[derive(Default)]
pub struct SessionRegistry {
    next_session_id: AtomicU64,
    sessions: Mutex<HashMap<String, Vec<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `user_id` and hand back its event receiver.
    pub fn connect(&self, user_id: &str) -> ConnectedSession {
        match self.try_connect(user_id, usize::MAX) {
            Some(session) => session,
            None => unreachable!("a usize::MAX session cap cannot be reached"),
        }
    }

    /// Register a session unless the total live-session count has reached
    /// `max`. Count check and insertion happen under one lock, so concurrent
    /// upgrades cannot overshoot the cap between them.
    pub fn try_connect(&self, user_id: &str, max: usize) -> Option<ConnectedSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let total: usize = sessions.values().map(Vec::len).sum();
        if total >= max {
            return None;
        }

        let (tx, receiver) = mpsc::unbounded_channel();
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let handles = sessions.entry(user_id.to_string()).or_default();
        let first_for_user = handles.is_empty();
        handles.push(SessionHandle { session_id, tx });

        Some(ConnectedSession {
            session_id,
            first_for_user,
            receiver,
        })
    }

    /// Remove one session. Returns true when it was the user's last, i.e.
    /// they just went offline.
    pub fn disconnect(&self, user_id: &str, session_id: u64) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(handles) = sessions.get_mut(user_id) else {
            return false;
        };
        handles.retain(|h| h.session_id != session_id);
        if handles.is_empty() {
            sessions.remove(user_id);
            true
        } else {
            false
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(user_id)
    }

    pub fn connected_users(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    /// Total number of live sessions across all users.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Push an event to every session of one user. Closed sessions are
    /// pruned. Returns how many sessions received the event.
    pub fn push_to_user(&self, user_id: &str, event: &DeliveryEvent) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(handles) = sessions.get_mut(user_id) else {
            return 0;
        };
        handles.retain(|h| h.tx.send(event.clone()).is_ok());
        let delivered = handles.len();
        if handles.is_empty() {
            sessions.remove(user_id);
        }
        delivered
    }

    /// Push an event to every session of each listed user.
    pub fn push_to_users<'a>(
        &self,
        user_ids: impl IntoIterator<Item = &'a str>,
        event: &DeliveryEvent,
    ) -> usize {
        user_ids
            .into_iter()
            .map(|id| self.push_to_user(id, event))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Fan-out composition
// ---------------------------------------------------------------------------

/// Push an accepted message (plus its companion notification) to its
/// audience: the recipient's sessions for a direct message, every member
/// except the sender for a group message. Lookup failures are logged and
/// swallowed; delivery is never allowed to fail the send that triggered it.
pub fn deliver_message(registry: &SessionRegistry, store: &Storage, message: &MessageRow) {
    let audience: Vec<String> = match (&message.recipient_id, &message.group_id) {
        (Some(recipient), _) => vec![recipient.clone()],
        (_, Some(group_id)) => match store.list_group_members(group_id) {
            Ok(members) => members
                .into_iter()
                .map(|m| m.user_id)
                .filter(|id| id != &message.sender_id)
                .collect(),
            Err(e) => {
                plog!(
                    "delivery: cannot resolve audience of {}: {e}",
                    logging::msg_id(&message.message_id)
                );
                return;
            }
        },
        _ => return,
    };

    let from_name = store
        .get_user(&message.sender_id)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_default();

    let new_message = DeliveryEvent::NewMessage {
        message: message.clone(),
    };
    let notification = DeliveryEvent::Notification {
        from_user_id: message.sender_id.clone(),
        from_name,
        group_id: message.group_id.clone(),
        preview: message.body.chars().take(80).collect(),
    };

    let mut delivered = 0;
    for user_id in &audience {
        delivered += registry.push_to_user(user_id, &new_message);
        registry.push_to_user(user_id, &notification);
    }
    plog!(
        "delivery: {} pushed to {delivered} session(s)",
        logging::msg_id(&message.message_id)
    );
}

/// Presence side effect of a first connect. A failed write is logged, never
/// propagated: presence must not block delivery. Friends with live sessions
/// get a `PresenceChanged` push.
pub fn mark_connected(registry: &SessionRegistry, store: &Storage, user_id: &str) {
    let now = now_secs();
    if let Err(e) = store.update_presence(user_id, true, now) {
        plog!(
            "presence: failed to mark {} online: {e}",
            logging::user_id(user_id)
        );
    }
    push_presence(registry, store, user_id, true, now);
}

/// Presence side effect of a last disconnect.
pub fn mark_disconnected(registry: &SessionRegistry, store: &Storage, user_id: &str) {
    let now = now_secs();
    if let Err(e) = store.update_presence(user_id, false, now) {
        plog!(
            "presence: failed to mark {} offline: {e}",
            logging::user_id(user_id)
        );
    }
    push_presence(registry, store, user_id, false, now);
}

fn push_presence(
    registry: &SessionRegistry,
    store: &Storage,
    user_id: &str,
    online: bool,
    last_seen: u64,
) {
    let friends = match store.get_user(user_id) {
        Ok(Some(user)) => user.friends,
        _ => return,
    };
    let event = DeliveryEvent::PresenceChanged {
        user_id: user_id.to_string(),
        online,
        last_seen,
    };
    registry.push_to_users(friends.iter().map(String::as_str), &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UserRow;

    #[test]
    fn connect_and_disconnect_track_session_lifecycle() {
        let registry = SessionRegistry::new();

        let s1 = registry.connect("alice");
        assert!(s1.first_for_user);
        let s2 = registry.connect("alice");
        assert!(!s2.first_for_user);
        assert!(registry.is_connected("alice"));

        // Dropping one of two sessions keeps the user online.
        assert!(!registry.disconnect("alice", s1.session_id));
        assert!(registry.is_connected("alice"));
        assert!(registry.disconnect("alice", s2.session_id));
        assert!(!registry.is_connected("alice"));

        // Unknown session / user is a no-op.
        assert!(!registry.disconnect("alice", 999));
    }

    #[test]
    fn push_reaches_every_session_of_a_user() {
        let registry = SessionRegistry::new();
        let mut s1 = registry.connect("alice");
        let mut s2 = registry.connect("alice");

        let event = DeliveryEvent::Typing {
            from_user_id: "bob".to_string(),
            recipient_id: Some("alice".to_string()),
            group_id: None,
        };
        assert_eq!(registry.push_to_user("alice", &event), 2);
        assert!(s1.receiver.try_recv().is_ok());
        assert!(s2.receiver.try_recv().is_ok());
        assert_eq!(registry.push_to_user("nobody", &event), 0);
    }

    #[test]
    fn closed_sessions_are_pruned_on_push() {
        let registry = SessionRegistry::new();
        let s1 = registry.connect("alice");
        drop(s1.receiver);

        let event = DeliveryEvent::PresenceChanged {
            user_id: "bob".to_string(),
            online: true,
            last_seen: 0,
        };
        assert_eq!(registry.push_to_user("alice", &event), 0);
        assert!(!registry.is_connected("alice"));
    }

    #[test]
    fn message_fan_out_skips_the_sender() {
        let store = Storage::open_in_memory().unwrap();
        let now = now_secs();
        for id in ["alice", "bob"] {
            store
                .insert_user(&UserRow {
                    user_id: id.to_string(),
                    name: format!("User {id}"),
                    email: format!("{id}@example.com"),
                    password_digest: "digest".to_string(),
                    avatar: None,
                    bio: None,
                    friends: Vec::new(),
                    friend_requests: Vec::new(),
                    sent_friend_requests: Vec::new(),
                    blocked_users: Vec::new(),
                    online: false,
                    last_seen: now,
                    created_at: now,
                })
                .unwrap();
        }
        let registry = SessionRegistry::new();
        let mut alice = registry.connect("alice");
        let mut bob = registry.connect("bob");

        let message = MessageRow {
            seq: 1,
            message_id: "m1".to_string(),
            sender_id: "alice".to_string(),
            recipient_id: Some("bob".to_string()),
            group_id: None,
            body: "hi".to_string(),
            attachment: None,
            seen: false,
            created_at: now,
        };
        deliver_message(&registry, &store, &message);

        // Recipient gets the message plus the companion notification.
        match bob.receiver.try_recv().unwrap() {
            DeliveryEvent::NewMessage { message } => assert_eq!(message.message_id, "m1"),
            other => panic!("expected NewMessage, got {other:?}"),
        }
        match bob.receiver.try_recv().unwrap() {
            DeliveryEvent::Notification { from_name, .. } => assert_eq!(from_name, "User alice"),
            other => panic!("expected Notification, got {other:?}"),
        }
        // The sender receives nothing.
        assert!(alice.receiver.try_recv().is_err());
    }

    #[test]
    fn presence_updates_survive_missing_user_rows() {
        let store = Storage::open_in_memory().unwrap();
        let registry = SessionRegistry::new();
        // No user row: the failed update is logged, never an error.
        mark_connected(&registry, &store, "ghost");
        mark_disconnected(&registry, &store, "ghost");
    }

    #[test]
    fn presence_transitions_flip_the_row_and_notify_friends() {
        let store = Storage::open_in_memory().unwrap();
        let now = now_secs();
        for (id, friend) in [("alice", "bob"), ("bob", "alice")] {
            store
                .insert_user(&UserRow {
                    user_id: id.to_string(),
                    name: format!("User {id}"),
                    email: format!("{id}@example.com"),
                    password_digest: "digest".to_string(),
                    avatar: None,
                    bio: None,
                    friends: vec![friend.to_string()],
                    friend_requests: Vec::new(),
                    sent_friend_requests: Vec::new(),
                    blocked_users: Vec::new(),
                    online: false,
                    last_seen: now,
                    created_at: now,
                })
                .unwrap();
        }
        let registry = SessionRegistry::new();
        let _alice = registry.connect("alice");
        let mut bob = registry.connect("bob");

        mark_connected(&registry, &store, "alice");
        let alice_row = store.get_user("alice").unwrap().unwrap();
        assert!(alice_row.online);
        match bob.receiver.try_recv().unwrap() {
            DeliveryEvent::PresenceChanged {
                user_id, online, ..
            } => {
                assert_eq!(user_id, "alice");
                assert!(online);
            }
            other => panic!("expected PresenceChanged, got {other:?}"),
        }

        mark_disconnected(&registry, &store, "alice");
        let alice_row = store.get_user("alice").unwrap().unwrap();
        assert!(!alice_row.online);
        match bob.receiver.try_recv().unwrap() {
            DeliveryEvent::PresenceChanged { online, .. } => assert!(!online),
            other => panic!("expected PresenceChanged, got {other:?}"),
        }
    }

    #[test]
    fn session_cap_is_checked_atomically_with_registration() {
        let registry = SessionRegistry::new();
        let _a = registry.try_connect("alice", 2).unwrap();
        let b = registry.try_connect("bob", 2).unwrap();
        assert!(registry.try_connect("carol", 2).is_none());

        // Freeing a slot admits the next session.
        registry.disconnect("bob", b.session_id);
        assert!(registry.try_connect("carol", 2).is_some());
    }
}
