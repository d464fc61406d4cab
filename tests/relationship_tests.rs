//! End-to-end relationship lifecycle tests over an in-memory store.

use parley::error::CoreError;
use parley::relationships::{
    accept_friend_request, block_user, cancel_friend_request, list_friend_requests, list_friends,
    list_sent_requests, reconcile_all, reject_friend_request, search_new_friends,
    send_friend_request, unfriend_user,
};
use parley::storage::{now_secs, Storage, UserRow};

fn seed_user(store: &Storage, id: &str, name: &str) {
    let now = now_secs();
    store
        .insert_user(&UserRow {
            user_id: id.to_string(),
            name: name.to_string(),
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

fn fresh_store(ids: &[&str]) -> Storage {
    let store = Storage::open_in_memory().unwrap();
    for id in ids {
        seed_user(&store, id, &format!("User {id}"));
    }
    store
}

#[test]
fn full_request_lifecycle_send_accept_unfriend() {
    let store = fresh_store(&["alice", "bob"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    assert_eq!(list_sent_requests(&store, "alice").unwrap().len(), 1);
    assert_eq!(list_friend_requests(&store, "bob").unwrap().len(), 1);
    assert!(list_friends(&store, "alice").unwrap().is_empty());

    accept_friend_request(&store, "bob", "alice").unwrap();
    let alice_friends = list_friends(&store, "alice").unwrap();
    let bob_friends = list_friends(&store, "bob").unwrap();
    assert_eq!(alice_friends.len(), 1);
    assert_eq!(alice_friends[0].user_id, "bob");
    assert_eq!(bob_friends.len(), 1);
    assert_eq!(bob_friends[0].user_id, "alice");
    assert!(list_friend_requests(&store, "bob").unwrap().is_empty());
    assert!(list_sent_requests(&store, "alice").unwrap().is_empty());

    unfriend_user(&store, "bob", "alice").unwrap();
    assert!(list_friends(&store, "alice").unwrap().is_empty());
    assert!(list_friends(&store, "bob").unwrap().is_empty());
}

#[test]
fn rejected_request_leaves_no_trace_and_allows_resend() {
    let store = fresh_store(&["alice", "bob"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    reject_friend_request(&store, "bob", "alice").unwrap();
    assert!(list_friend_requests(&store, "bob").unwrap().is_empty());
    assert!(list_sent_requests(&store, "alice").unwrap().is_empty());

    // Nothing pending, so a fresh request goes through.
    send_friend_request(&store, "alice", "bob").unwrap();
    assert_eq!(list_friend_requests(&store, "bob").unwrap().len(), 1);
}

#[test]
fn cancelled_request_cannot_be_accepted() {
    let store = fresh_store(&["alice", "bob"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    cancel_friend_request(&store, "alice", "bob").unwrap();

    assert!(matches!(
        accept_friend_request(&store, "bob", "alice"),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn pending_and_friendship_never_coexist() {
    let store = fresh_store(&["alice", "bob"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    accept_friend_request(&store, "bob", "alice").unwrap();

    // Both directions of re-request are rejected once friends.
    assert!(matches!(
        send_friend_request(&store, "alice", "bob"),
        Err(CoreError::Conflict(_))
    ));
    assert!(matches!(
        send_friend_request(&store, "bob", "alice"),
        Err(CoreError::Conflict(_))
    ));
}

#[test]
fn blocking_does_not_disturb_the_friend_graph() {
    let store = fresh_store(&["alice", "bob", "carol"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    accept_friend_request(&store, "bob", "alice").unwrap();
    send_friend_request(&store, "alice", "carol").unwrap();

    block_user(&store, "alice", "bob").unwrap();
    block_user(&store, "alice", "carol").unwrap();

    // Friendship and the pending request both survive.
    assert_eq!(list_friends(&store, "alice").unwrap().len(), 1);
    assert_eq!(list_sent_requests(&store, "alice").unwrap().len(), 1);
    assert_eq!(list_friend_requests(&store, "carol").unwrap().len(), 1);
}

#[test]
fn discovery_reflects_graph_changes() {
    let store = fresh_store(&["alice", "bob", "carol"]);

    // Everyone but the viewer is discoverable at first.
    let ids: Vec<_> = search_new_friends(&store, "alice", None)
        .unwrap()
        .into_iter()
        .map(|c| c.user_id)
        .collect();
    assert_eq!(ids, vec!["bob", "carol"]);

    send_friend_request(&store, "alice", "bob").unwrap();
    let ids: Vec<_> = search_new_friends(&store, "alice", None)
        .unwrap()
        .into_iter()
        .map(|c| c.user_id)
        .collect();
    assert_eq!(ids, vec!["carol"]);

    // Cancellation restores discoverability.
    cancel_friend_request(&store, "alice", "bob").unwrap();
    assert_eq!(search_new_friends(&store, "alice", None).unwrap().len(), 2);
}

#[test]
fn startup_sweep_heals_a_broken_pair() {
    let store = fresh_store(&["alice", "bob"]);

    // Simulate a lost second write: only one side records the friendship.
    let mut alice = store.get_user("alice").unwrap().unwrap();
    alice.friends.push("bob".to_string());
    store.update_relationships(&alice).unwrap();

    assert_eq!(reconcile_all(&store).unwrap(), 1);

    let bob = store.get_user("bob").unwrap().unwrap();
    assert!(bob.is_friend_of("alice"));
    assert_eq!(reconcile_all(&store).unwrap(), 0);
}
