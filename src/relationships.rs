//! Relationship engine: friend-request lifecycle across a pair of user
//! records.
//!
//! Every transition that touches both sides of a pair is applied as two
//! independent single-row writes, because the identity store has no
//! cross-record transaction. The engine keeps one fixed write order for all
//! operations (target side first, then actor side) and re-validates the
//! actor-side precondition against freshly read state before committing the
//! second write. A second-step failure after the first write has committed
//! is surfaced as [`CoreError::Inconsistent`] and logged as a data-integrity
//! alarm; it is never retried, since a blind retry can duplicate list
//! entries. [`reconcile_pair`] is the offline repair path.

use crate::error::CoreError;
use crate::logging;
use crate::plog;
use crate::storage::{now_secs, PendingRequest, Storage, UserRow};

fn load_user(store: &Storage, user_id: &str, what: &str) -> Result<UserRow, CoreError> {
    store
        .get_user(user_id)?
        .ok_or_else(|| CoreError::not_found(format!("{what} {user_id}")))
}

/// Build the `Inconsistent` error for a dual-record update whose first write
/// committed but whose second step failed, and raise the integrity alarm.
fn integrity_alarm(op: &str, actor: &str, target: &str, detail: &str) -> CoreError {
    plog!(
        "integrity: {op} {} -> {}: second step failed after first write: {detail}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    CoreError::Inconsistent(format!(
        "{op} between {actor} and {target}: first write committed, second step failed: {detail}"
    ))
}

/// Commit the actor-side (second) write of a dual-record update. Any failure
/// here is fatal: the target side is already updated.
fn commit_second_write(
    store: &Storage,
    row: &UserRow,
    op: &str,
    actor: &str,
    target: &str,
) -> Result<(), CoreError> {
    match store.update_relationships(row) {
        Ok(true) => Ok(()),
        Ok(false) => Err(integrity_alarm(op, actor, target, "actor row vanished")),
        Err(e) => Err(integrity_alarm(op, actor, target, &e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Send a friend request from `actor` to `target`.
///
/// Pushes an incoming entry onto the target and an outgoing entry onto the
/// actor. Rejected with `Conflict` when a request is already pending in
/// either direction or the pair is already friends, so the pair never holds
/// a friendship and a pending request at the same time.
pub fn send_friend_request(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    if actor == target {
        return Err(CoreError::conflict("cannot send a friend request to yourself"));
    }

    let actor_row = load_user(store, actor, "user")?;
    if actor_row.has_sent_request_to(target) {
        return Err(CoreError::conflict("friend request already sent"));
    }
    if actor_row.is_friend_of(target) {
        return Err(CoreError::conflict("already friends"));
    }
    if actor_row.has_request_from(target) {
        return Err(CoreError::conflict(
            "this user already sent you a friend request",
        ));
    }

    let mut target_row = load_user(store, target, "recipient")?;
    let now = now_secs();

    // Target side first.
    if !target_row.has_request_from(actor) {
        target_row.friend_requests.push(PendingRequest {
            user: actor.to_string(),
            created_at: now,
        });
    }
    if !store.update_relationships(&target_row)? {
        return Err(CoreError::not_found(format!("recipient {target}")));
    }

    // Re-validate the actor side against current state before the second
    // write; a concurrent transition may have interleaved.
    let mut actor_row = match store.get_user(actor)? {
        Some(row) => row,
        None => return Err(integrity_alarm("send-request", actor, target, "actor row vanished")),
    };
    if actor_row.has_sent_request_to(target) || actor_row.is_friend_of(target) {
        return Err(integrity_alarm(
            "send-request",
            actor,
            target,
            "actor state changed between writes",
        ));
    }
    actor_row.sent_friend_requests.push(PendingRequest {
        user: target.to_string(),
        created_at: now,
    });
    commit_second_write(store, &actor_row, "send-request", actor, target)?;

    plog!(
        "friend-request: {} -> {}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    Ok(())
}

/// Accept the friend request that `target` sent to `actor`.
///
/// Removes the pending entries from both sides and adds each user to the
/// other's friend list.
pub fn accept_friend_request(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    if actor == target {
        return Err(CoreError::conflict("cannot accept a request from yourself"));
    }

    let mut target_row = load_user(store, target, "friend")?;
    // The sent-side entry is the canonical record of the pending request.
    if !target_row.has_sent_request_to(actor) {
        return Err(CoreError::not_found("friend request"));
    }

    // Target side first: drop the outgoing entry, record the friendship.
    target_row.sent_friend_requests.retain(|r| r.user != actor);
    if !target_row.is_friend_of(actor) {
        target_row.friends.push(actor.to_string());
    }
    if !store.update_relationships(&target_row)? {
        return Err(CoreError::not_found(format!("friend {target}")));
    }

    // Actor side, re-validated against fresh state.
    let mut actor_row = match store.get_user(actor)? {
        Some(row) => row,
        None => return Err(integrity_alarm("accept-request", actor, target, "actor row vanished")),
    };
    if !actor_row.has_request_from(target) {
        return Err(integrity_alarm(
            "accept-request",
            actor,
            target,
            "incoming entry missing on actor side",
        ));
    }
    actor_row.friend_requests.retain(|r| r.user != target);
    if !actor_row.is_friend_of(target) {
        actor_row.friends.push(target.to_string());
    }
    commit_second_write(store, &actor_row, "accept-request", actor, target)?;

    plog!(
        "friend-accept: {} <-> {}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    Ok(())
}

/// Reject the friend request that `target` sent to `actor`. Removes the
/// pending entries only; no friendship is created.
pub fn reject_friend_request(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    let mut target_row = load_user(store, target, "user")?;
    if !target_row.has_sent_request_to(actor) {
        return Err(CoreError::not_found("friend request"));
    }

    target_row.sent_friend_requests.retain(|r| r.user != actor);
    if !store.update_relationships(&target_row)? {
        return Err(CoreError::not_found(format!("user {target}")));
    }

    let mut actor_row = match store.get_user(actor)? {
        Some(row) => row,
        None => return Err(integrity_alarm("reject-request", actor, target, "actor row vanished")),
    };
    if !actor_row.has_request_from(target) {
        return Err(integrity_alarm(
            "reject-request",
            actor,
            target,
            "incoming entry missing on actor side",
        ));
    }
    actor_row.friend_requests.retain(|r| r.user != target);
    commit_second_write(store, &actor_row, "reject-request", actor, target)?;

    plog!(
        "friend-reject: {} rejected {}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    Ok(())
}

/// Cancel the friend request that `actor` previously sent to `target`.
pub fn cancel_friend_request(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    let actor_row = load_user(store, actor, "user")?;
    if !actor_row.has_sent_request_to(target) {
        return Err(CoreError::not_found("friend request"));
    }

    let mut target_row = load_user(store, target, "friend")?;
    target_row.friend_requests.retain(|r| r.user != actor);
    if !store.update_relationships(&target_row)? {
        return Err(CoreError::not_found(format!("friend {target}")));
    }

    let mut actor_row = match store.get_user(actor)? {
        Some(row) => row,
        None => return Err(integrity_alarm("cancel-request", actor, target, "actor row vanished")),
    };
    if !actor_row.has_sent_request_to(target) {
        return Err(integrity_alarm(
            "cancel-request",
            actor,
            target,
            "outgoing entry missing on actor side",
        ));
    }
    actor_row.sent_friend_requests.retain(|r| r.user != target);
    commit_second_write(store, &actor_row, "cancel-request", actor, target)?;

    plog!(
        "friend-cancel: {} withdrew request to {}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    Ok(())
}

/// Remove an existing mutual friendship between `actor` and `target`.
pub fn unfriend_user(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    let mut target_row = load_user(store, target, "friend")?;
    if !target_row.is_friend_of(actor) {
        return Err(CoreError::not_found("user is not a friend"));
    }

    target_row.friends.retain(|f| f != actor);
    if !store.update_relationships(&target_row)? {
        return Err(CoreError::not_found(format!("friend {target}")));
    }

    let mut actor_row = match store.get_user(actor)? {
        Some(row) => row,
        None => return Err(integrity_alarm("unfriend", actor, target, "actor row vanished")),
    };
    if !actor_row.is_friend_of(target) {
        return Err(integrity_alarm(
            "unfriend",
            actor,
            target,
            "friendship missing on actor side",
        ));
    }
    actor_row.friends.retain(|f| f != target);
    commit_second_write(store, &actor_row, "unfriend", actor, target)?;

    plog!(
        "unfriend: {} <-> {}",
        logging::user_id(actor),
        logging::user_id(target)
    );
    Ok(())
}

/// Block `target` for `actor`. Unilateral, single-record, and orthogonal to
/// the friend graph: it neither severs friendship nor cancels pending
/// requests. Re-blocking an already-blocked user is a no-op.
pub fn block_user(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    if !store.user_exists(target)? {
        return Err(CoreError::not_found(format!("user {target}")));
    }
    let mut actor_row = load_user(store, actor, "user")?;
    if !actor_row.blocked_users.iter().any(|b| b == target) {
        actor_row.blocked_users.push(target.to_string());
        store.update_relationships(&actor_row)?;
    }
    Ok(())
}

/// Unblock `target` for `actor`. Fails with `NotFound` when the target is
/// not currently blocked, rather than silently succeeding.
pub fn unblock_user(store: &Storage, actor: &str, target: &str) -> Result<(), CoreError> {
    if !store.user_exists(target)? {
        return Err(CoreError::not_found(format!("user {target}")));
    }
    let mut actor_row = load_user(store, actor, "user")?;
    if !actor_row.blocked_users.iter().any(|b| b == target) {
        return Err(CoreError::not_found("user is not blocked"));
    }
    actor_row.blocked_users.retain(|b| b != target);
    store.update_relationships(&actor_row)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Friend entry as surfaced to clients.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FriendSummary {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub online: bool,
    pub last_seen: u64,
}

/// Pending request entry (incoming or outgoing) with the peer's identity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestSummary {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: u64,
}

/// Discovery candidate: public profile fields only.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CandidateSummary {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

pub fn list_friends(store: &Storage, user_id: &str) -> Result<Vec<FriendSummary>, CoreError> {
    let user = load_user(store, user_id, "user")?;
    let mut result = Vec::with_capacity(user.friends.len());
    for friend_id in &user.friends {
        if let Some(friend) = store.get_user(friend_id)? {
            result.push(FriendSummary {
                user_id: friend.user_id,
                name: friend.name,
                avatar: friend.avatar,
                online: friend.online,
                last_seen: friend.last_seen,
            });
        }
    }
    Ok(result)
}

fn request_summaries(
    store: &Storage,
    entries: &[PendingRequest],
) -> Result<Vec<RequestSummary>, CoreError> {
    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(peer) = store.get_user(&entry.user)? {
            result.push(RequestSummary {
                user_id: peer.user_id,
                name: peer.name,
                avatar: peer.avatar,
                created_at: entry.created_at,
            });
        }
    }
    Ok(result)
}

/// Incoming pending requests, in arrival order.
pub fn list_friend_requests(
    store: &Storage,
    user_id: &str,
) -> Result<Vec<RequestSummary>, CoreError> {
    let user = load_user(store, user_id, "user")?;
    request_summaries(store, &user.friend_requests)
}

/// Outgoing pending requests, in send order.
pub fn list_sent_requests(
    store: &Storage,
    user_id: &str,
) -> Result<Vec<RequestSummary>, CoreError> {
    let user = load_user(store, user_id, "user")?;
    request_summaries(store, &user.sent_friend_requests)
}

/// Friend discovery: users matching the optional name query, excluding the
/// viewer, their current friends, and anyone they already sent a request to.
/// Users who sent the viewer a request remain listed, so the client can
/// steer toward accepting instead.
pub fn search_new_friends(
    store: &Storage,
    viewer_id: &str,
    query: Option<&str>,
) -> Result<Vec<CandidateSummary>, CoreError> {
    let viewer = load_user(store, viewer_id, "user")?;
    let candidates = store.search_users(query)?;
    Ok(candidates
        .into_iter()
        .filter(|u| {
            u.user_id != viewer.user_id
                && !viewer.is_friend_of(&u.user_id)
                && !viewer.has_sent_request_to(&u.user_id)
        })
        .map(|u| CandidateSummary {
            user_id: u.user_id,
            name: u.name,
            avatar: u.avatar,
            bio: u.bio,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Repair any asymmetry between the two user records of one pair.
///
/// Deterministic rules, applied in order:
/// 1. one-sided friendship: complete it (the friendship-creating write lands
///    on the target side first, so a lone entry means the second write was
///    lost, not that the friendship was revoked);
/// 2. once the pair is friends, no pending entries may remain between them;
/// 3. an outgoing entry without its matching incoming entry is re-inserted
///    on the receiver (the sent side is canonical);
/// 4. an incoming entry without its matching outgoing entry is removed.
///
/// `blocked_users` is intentionally untouched: blocking is unilateral and
/// has no symmetry to restore. Returns a description of every repair
/// applied. Not part of the online path.
pub fn reconcile_pair(store: &Storage, a: &str, b: &str) -> Result<Vec<String>, CoreError> {
    let mut a_row = load_user(store, a, "user")?;
    let mut b_row = load_user(store, b, "user")?;
    let mut repairs = Vec::new();

    // Rule 1: complete one-sided friendships.
    let a_lists_b = a_row.is_friend_of(b);
    let b_lists_a = b_row.is_friend_of(a);
    if a_lists_b && !b_lists_a {
        b_row.friends.push(a.to_string());
        repairs.push(format!("added {a} to {b}.friends"));
    } else if b_lists_a && !a_lists_b {
        a_row.friends.push(b.to_string());
        repairs.push(format!("added {b} to {a}.friends"));
    }

    let friends = a_lists_b || b_lists_a;

    if friends {
        // Rule 2: friends and pending never coexist.
        for (row, other) in [(&mut a_row, b), (&mut b_row, a)] {
            let before = row.friend_requests.len() + row.sent_friend_requests.len();
            row.friend_requests.retain(|r| r.user != other);
            row.sent_friend_requests.retain(|r| r.user != other);
            let dropped = before - row.friend_requests.len() - row.sent_friend_requests.len();
            if dropped > 0 {
                repairs.push(format!(
                    "dropped {dropped} stale pending entr(ies) on {}",
                    row.user_id
                ));
            }
        }
    } else {
        // Rules 3 and 4, checked for both directions of the pair.
        let sent_a_to_b = a_row
            .sent_friend_requests
            .iter()
            .find(|r| r.user == b)
            .cloned();
        let sent_b_to_a = b_row
            .sent_friend_requests
            .iter()
            .find(|r| r.user == a)
            .cloned();

        match sent_a_to_b {
            Some(entry) if !b_row.has_request_from(a) => {
                b_row.friend_requests.push(PendingRequest {
                    user: a.to_string(),
                    created_at: entry.created_at,
                });
                repairs.push(format!("re-inserted request from {a} on {b}"));
            }
            None if b_row.has_request_from(a) => {
                b_row.friend_requests.retain(|r| r.user != a);
                repairs.push(format!("removed orphan incoming request from {a} on {b}"));
            }
            _ => {}
        }
        match sent_b_to_a {
            Some(entry) if !a_row.has_request_from(b) => {
                a_row.friend_requests.push(PendingRequest {
                    user: b.to_string(),
                    created_at: entry.created_at,
                });
                repairs.push(format!("re-inserted request from {b} on {a}"));
            }
            None if a_row.has_request_from(b) => {
                a_row.friend_requests.retain(|r| r.user != b);
                repairs.push(format!("removed orphan incoming request from {b} on {a}"));
            }
            _ => {}
        }
    }

    if !repairs.is_empty() {
        store.update_relationships(&a_row)?;
        store.update_relationships(&b_row)?;
        plog!(
            "reconcile: {} <-> {}: {} repair(s): {}",
            logging::user_id(a),
            logging::user_id(b),
            repairs.len(),
            repairs.join("; ")
        );
    }
    Ok(repairs)
}

/// Sweep the whole identity store and reconcile every pair referenced by any
/// friendship or pending request. Returns the total number of repairs.
pub fn reconcile_all(store: &Storage) -> Result<u32, CoreError> {
    let mut pairs = std::collections::BTreeSet::new();
    for user_id in store.list_user_ids()? {
        let Some(user) = store.get_user(&user_id)? else {
            continue;
        };
        let referenced = user
            .friends
            .iter()
            .cloned()
            .chain(user.friend_requests.iter().map(|r| r.user.clone()))
            .chain(user.sent_friend_requests.iter().map(|r| r.user.clone()));
        for other in referenced {
            let pair = if user_id < other {
                (user_id.clone(), other)
            } else {
                (other, user_id.clone())
            };
            pairs.insert(pair);
        }
    }

    let mut total = 0u32;
    for (a, b) in pairs {
        match reconcile_pair(store, &a, &b) {
            Ok(repairs) => total += repairs.len() as u32,
            // A referenced user that no longer exists cannot be repaired
            // from here; report and keep sweeping.
            Err(CoreError::NotFound(what)) => {
                plog!("reconcile: skipping pair ({a}, {b}): {what} missing");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
