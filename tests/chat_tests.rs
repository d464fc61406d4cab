//! Cross-module flow tests: accounts, friendship, messaging, and the
//! derived chat list working together over one store.

use parley::chats::{get_chat_history, get_chats, PeerSummary};
use parley::error::CoreError;
use parley::messages::{mark_message_seen, send_message};
use parley::relationships::{accept_friend_request, send_friend_request};
use parley::storage::{now_secs, GroupMemberRow, GroupRow, Storage, UserRow};

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

fn seed_group(store: &Storage, group_id: &str, creator: &str, others: &[&str]) {
    let now = now_secs();
    let mut members = vec![GroupMemberRow {
        group_id: group_id.to_string(),
        user_id: creator.to_string(),
        is_admin: true,
        joined_at: now,
    }];
    for id in others {
        members.push(GroupMemberRow {
            group_id: group_id.to_string(),
            user_id: id.to_string(),
            is_admin: false,
            joined_at: now,
        });
    }
    store
        .insert_group_with_members(
            &GroupRow {
                group_id: group_id.to_string(),
                name: format!("group {group_id}"),
                created_by: creator.to_string(),
                created_at: now,
            },
            &members,
        )
        .unwrap();
}

#[test]
fn befriend_message_and_read_flow() {
    let store = Storage::open_in_memory().unwrap();
    seed_user(&store, "alice", "Alice");
    seed_user(&store, "bob", "Bob");

    send_friend_request(&store, "alice", "bob").unwrap();
    accept_friend_request(&store, "bob", "alice").unwrap();

    let msg = send_message(&store, "alice", Some("bob"), None, "hi", None).unwrap();

    // Bob's chat list has one entry with Alice on the other side.
    let chats = get_chats(&store, "bob").unwrap();
    assert_eq!(chats.len(), 1);
    match &chats[0].peer {
        PeerSummary::User { user_id, name, .. } => {
            assert_eq!(user_id, "alice");
            assert_eq!(name, "Alice");
        }
        other => panic!("expected user peer, got {other:?}"),
    }
    assert_eq!(chats[0].last_message.body, "hi");
    assert_eq!(chats[0].unread_count, 1);

    // Reading the message clears the unread count on the next derivation.
    mark_message_seen(&store, &msg.message_id, "bob").unwrap();
    let chats = get_chats(&store, "bob").unwrap();
    assert_eq!(chats[0].unread_count, 0);
}

#[test]
fn chat_list_interleaves_direct_and_group_conversations() {
    let store = Storage::open_in_memory().unwrap();
    for id in ["alice", "bob", "carol"] {
        seed_user(&store, id, &format!("User {id}"));
    }
    seed_group(&store, "g1", "alice", &["bob"]);

    send_message(&store, "carol", Some("alice"), None, "direct", None).unwrap();
    send_message(&store, "bob", None, Some("g1"), "to group", None).unwrap();

    let chats = get_chats(&store, "alice").unwrap();
    assert_eq!(chats.len(), 2);

    let kinds: Vec<bool> = chats
        .iter()
        .map(|c| matches!(c.peer, PeerSummary::Group { .. }))
        .collect();
    assert!(kinds.contains(&true));
    assert!(kinds.contains(&false));

    // Carol is not a member, so the group chat never reaches her list.
    let carol_chats = get_chats(&store, "carol").unwrap();
    assert_eq!(carol_chats.len(), 1);
    assert!(matches!(carol_chats[0].peer, PeerSummary::User { .. }));
}

#[test]
fn chat_list_orders_by_latest_activity() {
    let store = Storage::open_in_memory().unwrap();
    for id in ["alice", "bob", "carol"] {
        seed_user(&store, id, &format!("User {id}"));
    }

    send_message(&store, "bob", Some("alice"), None, "first", None).unwrap();
    send_message(&store, "carol", Some("alice"), None, "second", None).unwrap();
    // Same second is likely here; seq breaks the tie, so the most recent
    // insert leads the list.
    let chats = get_chats(&store, "alice").unwrap();
    assert_eq!(chats[0].last_message.body, "second");
    assert_eq!(chats[1].last_message.body, "first");

    // New traffic in the older conversation moves it to the front.
    send_message(&store, "alice", Some("bob"), None, "third", None).unwrap();
    let chats = get_chats(&store, "alice").unwrap();
    assert_eq!(chats[0].last_message.body, "third");
}

#[test]
fn history_covers_both_directions_and_marks_own_messages() {
    let store = Storage::open_in_memory().unwrap();
    seed_user(&store, "alice", "Alice");
    seed_user(&store, "bob", "Bob");

    send_message(&store, "alice", Some("bob"), None, "one", None).unwrap();
    send_message(&store, "bob", Some("alice"), None, "two", None).unwrap();
    send_message(&store, "alice", Some("bob"), None, "three", None).unwrap();

    let history = get_chat_history(&store, "alice", "bob").unwrap();
    let bodies: Vec<_> = history.iter().map(|m| m.message.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
    let sent: Vec<_> = history.iter().map(|m| m.is_sent).collect();
    assert_eq!(sent, vec![true, false, true]);

    // The same history from Bob's side flips the direction flags.
    let history = get_chat_history(&store, "bob", "alice").unwrap();
    let sent: Vec<_> = history.iter().map(|m| m.is_sent).collect();
    assert_eq!(sent, vec![false, true, false]);
}

#[test]
fn group_history_requires_membership() {
    let store = Storage::open_in_memory().unwrap();
    for id in ["alice", "bob", "carol"] {
        seed_user(&store, id, &format!("User {id}"));
    }
    seed_group(&store, "g1", "alice", &["bob"]);
    send_message(&store, "alice", None, Some("g1"), "hello", None).unwrap();

    let history = get_chat_history(&store, "bob", "g1").unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_sent);

    assert!(matches!(
        get_chat_history(&store, "carol", "g1"),
        Err(CoreError::Unauthorized(_))
    ));
}

#[test]
fn group_unread_counts_follow_per_message_seen_flags() {
    let store = Storage::open_in_memory().unwrap();
    for id in ["alice", "bob"] {
        seed_user(&store, id, &format!("User {id}"));
    }
    seed_group(&store, "g1", "alice", &["bob"]);

    let m1 = send_message(&store, "alice", None, Some("g1"), "one", None).unwrap();
    send_message(&store, "alice", None, Some("g1"), "two", None).unwrap();

    let chats = get_chats(&store, "bob").unwrap();
    assert_eq!(chats[0].unread_count, 2);

    mark_message_seen(&store, &m1.message_id, "bob").unwrap();
    let chats = get_chats(&store, "bob").unwrap();
    assert_eq!(chats[0].unread_count, 1);
}
