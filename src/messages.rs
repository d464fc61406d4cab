//! Message store rules: sending, editing, deleting, and marking seen.
//!
//! The authorization checks here (sender-only edit/delete, recipient-side
//! mark-seen, member-only group sends) are enforced in the core, not merely
//! at the web layer.

use crate::error::CoreError;
use crate::logging;
use crate::plog;
use crate::storage::{new_object_id, now_secs, MessageRow, Storage};

/// Append a new message to the log. Exactly one of `recipient` / `group`
/// must be given and must resolve to an existing target; group sends also
/// require the sender to be a member. The created row (`seen = false`) is
/// returned with its assigned sequence number.
pub fn send_message(
    store: &Storage,
    sender: &str,
    recipient: Option<&str>,
    group: Option<&str>,
    content: &str,
    attachment: Option<&str>,
) -> Result<MessageRow, CoreError> {
    let mut row = MessageRow {
        seq: 0,
        message_id: new_object_id(),
        sender_id: sender.to_string(),
        recipient_id: None,
        group_id: None,
        body: content.to_string(),
        attachment: attachment.map(str::to_string),
        seen: false,
        created_at: now_secs(),
    };

    match (recipient, group) {
        (Some(user_id), None) => {
            if !store.user_exists(user_id)? {
                return Err(CoreError::not_found(format!("recipient {user_id}")));
            }
            row.recipient_id = Some(user_id.to_string());
        }
        (None, Some(group_id)) => {
            if store.get_group(group_id)?.is_none() {
                return Err(CoreError::not_found(format!("group {group_id}")));
            }
            if !store.is_group_member(group_id, sender)? {
                return Err(CoreError::unauthorized("sender is not a group member"));
            }
            row.group_id = Some(group_id.to_string());
        }
        _ => {
            return Err(CoreError::conflict(
                "message must address exactly one of recipient or group",
            ));
        }
    }

    row.seq = store.insert_message(&row)?;
    plog!(
        "message: {} from {} to {}",
        logging::msg_id(&row.message_id),
        logging::user_id(sender),
        match (&row.recipient_id, &row.group_id) {
            (Some(r), _) => logging::user_id(r),
            (_, Some(g)) => logging::group_id(g),
            _ => unreachable!(),
        }
    );
    Ok(row)
}

fn load_message(store: &Storage, message_id: &str) -> Result<MessageRow, CoreError> {
    store
        .get_message(message_id)?
        .ok_or_else(|| CoreError::not_found(format!("message {message_id}")))
}

/// Replace a message's content. Only the sender may edit.
pub fn edit_message(
    store: &Storage,
    message_id: &str,
    new_content: &str,
    requester: &str,
) -> Result<(), CoreError> {
    let message = load_message(store, message_id)?;
    if message.sender_id != requester {
        return Err(CoreError::unauthorized("only the sender can edit a message"));
    }
    store.update_message_body(message_id, new_content)?;
    Ok(())
}

/// Remove a message. Only the sender may delete.
pub fn delete_message(store: &Storage, message_id: &str, requester: &str) -> Result<(), CoreError> {
    let message = load_message(store, message_id)?;
    if message.sender_id != requester {
        return Err(CoreError::unauthorized(
            "only the sender can delete a message",
        ));
    }
    store.delete_message(message_id)?;
    Ok(())
}

/// Mark a message seen. The requester must be on the receiving side: the
/// direct recipient, or a member of the addressed group other than the
/// sender.
pub fn mark_message_seen(
    store: &Storage,
    message_id: &str,
    requester: &str,
) -> Result<(), CoreError> {
    let message = load_message(store, message_id)?;
    let allowed = match (&message.recipient_id, &message.group_id) {
        (Some(recipient), _) => recipient == requester,
        (_, Some(group_id)) => {
            requester != message.sender_id && store.is_group_member(group_id, requester)?
        }
        _ => false,
    };
    if !allowed {
        return Err(CoreError::unauthorized(
            "only a recipient can mark a message seen",
        ));
    }
    store.mark_message_seen(message_id)?;
    Ok(())
}
