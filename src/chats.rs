//! Chat aggregation: the per-viewer conversation list and history, derived
//! from the message log on every query.
//!
//! Nothing here is persisted or cached. Each call recomputes over the
//! viewer's visible messages, so there is no staleness to manage; the cost
//! is a full fold per read, which is the accepted trade-off at this scale.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::CoreError;
use crate::storage::{MessageRow, Storage};

/// The other side of a conversation: a peer user or a group.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerSummary {
    User {
        user_id: String,
        name: String,
        avatar: Option<String>,
        online: bool,
        last_seen: u64,
    },
    Group {
        group_id: String,
        name: String,
        member_count: usize,
    },
}

/// One derived conversation entry. Keyed by `(viewer, peer)` at query time,
/// never stored.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub peer: PeerSummary,
    pub last_message: MessageRow,
    pub unread_count: u32,
}

/// A history entry annotated with the viewer-relative direction, so the
/// caller never needs to compare sender IDs itself.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    #[serde(flatten)]
    pub message: MessageRow,
    pub is_sent: bool,
}

struct Bucket {
    is_group: bool,
    last_message: MessageRow,
    unread_count: u32,
}

/// Derive the viewer's chat list.
///
/// Every visible message is folded by conversation key: the group for
/// group-addressed messages, otherwise the other party. `last_message` is
/// the entry with the highest `created_at` (insertion order breaks ties);
/// `unread_count` counts every unseen message in the conversation,
/// regardless of direction. The result is ordered by last-message recency,
/// newest first, which is stable for a fixed log.
pub fn get_chats(store: &Storage, viewer_id: &str) -> Result<Vec<Chat>, CoreError> {
    if !store.user_exists(viewer_id)? {
        return Err(CoreError::not_found(format!("user {viewer_id}")));
    }

    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    for message in store.list_visible_messages(viewer_id)? {
        let (key, is_group) = match (&message.group_id, &message.recipient_id) {
            (Some(group_id), _) => (group_id.clone(), true),
            (None, Some(recipient)) => {
                let other = if message.sender_id == viewer_id {
                    recipient.clone()
                } else {
                    message.sender_id.clone()
                };
                (other, false)
            }
            // Unaddressed rows cannot be produced by the send path.
            (None, None) => continue,
        };

        let unread = u32::from(!message.seen);
        match buckets.get_mut(&key) {
            Some(bucket) => {
                bucket.unread_count += unread;
                // Messages arrive in (created_at, seq) order, so the latest
                // one wins without an explicit comparison.
                bucket.last_message = message;
            }
            None => {
                buckets.insert(
                    key,
                    Bucket {
                        is_group,
                        last_message: message,
                        unread_count: unread,
                    },
                );
            }
        }
    }

    let mut chats = Vec::with_capacity(buckets.len());
    for (key, bucket) in buckets {
        let peer = if bucket.is_group {
            match store.get_group(&key)? {
                Some(group) => PeerSummary::Group {
                    member_count: store.list_group_members(&key)?.len(),
                    group_id: group.group_id,
                    name: group.name,
                },
                None => continue,
            }
        } else {
            match store.get_user(&key)? {
                Some(user) => PeerSummary::User {
                    user_id: user.user_id,
                    name: user.name,
                    avatar: user.avatar,
                    online: user.online,
                    last_seen: user.last_seen,
                },
                None => continue,
            }
        };
        chats.push(Chat {
            peer,
            last_message: bucket.last_message,
            unread_count: bucket.unread_count,
        });
    }

    chats.sort_by(|a, b| {
        (b.last_message.created_at, b.last_message.seq)
            .cmp(&(a.last_message.created_at, a.last_message.seq))
    });
    Ok(chats)
}

/// Full history of one conversation, oldest first.
///
/// The peer is resolved against the group store first, then the identity
/// store; group history is member-only.
pub fn get_chat_history(
    store: &Storage,
    viewer_id: &str,
    peer_id: &str,
) -> Result<Vec<ChatMessage>, CoreError> {
    if !store.user_exists(viewer_id)? {
        return Err(CoreError::not_found(format!("user {viewer_id}")));
    }

    let messages = if store.get_group(peer_id)?.is_some() {
        if !store.is_group_member(peer_id, viewer_id)? {
            return Err(CoreError::unauthorized("viewer is not a group member"));
        }
        store.list_group_messages(peer_id)?
    } else if store.user_exists(peer_id)? {
        store.list_direct_messages(viewer_id, peer_id)?
    } else {
        return Err(CoreError::not_found(format!("peer {peer_id}")));
    };

    Ok(messages
        .into_iter()
        .map(|message| ChatMessage {
            is_sent: message.sender_id == viewer_id,
            message,
        })
        .collect())
}
