//! SQLite storage layer for parley.
//!
//! Holds the three stores the core operates on: the identity store (user
//! records with embedded relationship lists), the group store, and the
//! append-only message log. Handles schema creation and CRUD for all row
//! types.
//!
//! The relationship lists (`friends`, `friend_requests`,
//! `sent_friend_requests`, `blocked_users`) live as JSON TEXT columns on the
//! user row, and [`Storage::update_relationships`] rewrites them for exactly
//! one row per call. There is deliberately no API that updates two user rows
//! in one transaction: a logical relationship change is two independent
//! record updates, and the relationship engine owns the ordering and
//! consistency rules around that.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Serde(serde_json::Error),
    AlreadyExists(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Generate a fresh 24-hex-char identifier (12 random bytes), the shape the
/// validation layer expects for user, group, and message IDs.
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 12];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One entry in a pending friend-request list (incoming or outgoing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub user: String,
    pub created_at: u64,
}

/// User row stored in the database. The four relationship lists are JSON
/// columns; everything else is scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub name: String,
    pub email: String,
    /// Opaque credential material owned by the auth shim, never inspected
    /// by the core.
    pub password_digest: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub friends: Vec<String>,
    /// Incoming requests, in arrival order.
    pub friend_requests: Vec<PendingRequest>,
    /// Outgoing requests, in send order.
    pub sent_friend_requests: Vec<PendingRequest>,
    pub blocked_users: Vec<String>,
    pub online: bool,
    pub last_seen: u64,
    pub created_at: u64,
}

impl UserRow {
    pub fn has_sent_request_to(&self, user_id: &str) -> bool {
        self.sent_friend_requests.iter().any(|r| r.user == user_id)
    }

    pub fn has_request_from(&self, user_id: &str) -> bool {
        self.friend_requests.iter().any(|r| r.user == user_id)
    }

    pub fn is_friend_of(&self, user_id: &str) -> bool {
        self.friends.iter().any(|f| f == user_id)
    }
}

/// Group row stored in the database. Membership lives in `group_members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberRow {
    pub group_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: u64,
}

/// Message row. `seq` is the insertion-order sequence assigned by SQLite,
/// used as the tie-break when two messages share a `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub seq: i64,
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub group_id: Option<String>,
    pub body: String,
    /// Opaque attachment reference (upload handling is out of scope).
    pub attachment: Option<String>,
    pub seen: bool,
    pub created_at: u64,
}

const USER_COLUMNS: &str =
    "user_id, name, email, password_digest, avatar, bio, friends, friend_requests, \
     sent_friend_requests, blocked_users, online, last_seen, created_at";

const MESSAGE_COLUMNS: &str =
    "seq, message_id, sender_id, recipient_id, group_id, body, attachment, seen, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        message_id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        group_id: row.get(4)?,
        body: row.get(5)?,
        attachment: row.get(6)?,
        seen: row.get::<_, i32>(7)? != 0,
        created_at: row.get::<_, i64>(8)? as u64,
    })
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id              TEXT PRIMARY KEY,
                name                 TEXT NOT NULL,
                email                TEXT NOT NULL UNIQUE,
                password_digest      TEXT NOT NULL,
                avatar               TEXT,
                bio                  TEXT,
                friends              TEXT NOT NULL DEFAULT '[]',
                friend_requests      TEXT NOT NULL DEFAULT '[]',
                sent_friend_requests TEXT NOT NULL DEFAULT '[]',
                blocked_users        TEXT NOT NULL DEFAULT '[]',
                online               INTEGER NOT NULL DEFAULT 0,
                last_seen            INTEGER NOT NULL,
                created_at           INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS groups (
                group_id    TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_by  TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_members (
                group_id    TEXT NOT NULL REFERENCES groups(group_id),
                user_id     TEXT NOT NULL,
                is_admin    INTEGER NOT NULL DEFAULT 0,
                joined_at   INTEGER NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id      TEXT NOT NULL UNIQUE,
                sender_id       TEXT NOT NULL,
                recipient_id    TEXT,
                group_id        TEXT,
                body            TEXT NOT NULL,
                attachment      TEXT,
                seen            INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_recipient
                ON messages(recipient_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_group
                ON messages(group_id, created_at);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Identity store
    // -----------------------------------------------------------------------

    pub fn insert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        let result = self.conn.execute(
            "INSERT INTO users (user_id, name, email, password_digest, avatar, bio,
                                friends, friend_requests, sent_friend_requests, blocked_users,
                                online, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.user_id,
                row.name,
                row.email,
                row.password_digest,
                row.avatar,
                row.bio,
                serde_json::to_string(&row.friends)?,
                serde_json::to_string(&row.friend_requests)?,
                serde_json::to_string(&row.sent_friend_requests)?,
                serde_json::to_string(&row.blocked_users)?,
                row.online as i32,
                row.last_seen as i64,
                row.created_at as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyExists(format!(
                    "user {} / {}",
                    row.user_id, row.email
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");
        self.query_user(&sql, user_id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StorageError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        self.query_user(&sql, email)
    }

    fn query_user(&self, sql: &str, key: &str) -> Result<Option<UserRow>, StorageError> {
        let row: Option<(
            String,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
            String,
            String,
            i32,
            i64,
            i64,
        )> = self
            .conn
            .query_row(sql, params![key], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                    r.get(9)?,
                    r.get(10)?,
                    r.get(11)?,
                    r.get(12)?,
                ))
            })
            .optional()?;

        let Some(r) = row else { return Ok(None) };
        Ok(Some(UserRow {
            user_id: r.0,
            name: r.1,
            email: r.2,
            password_digest: r.3,
            avatar: r.4,
            bio: r.5,
            friends: serde_json::from_str(&r.6)?,
            friend_requests: serde_json::from_str(&r.7)?,
            sent_friend_requests: serde_json::from_str(&r.8)?,
            blocked_users: serde_json::from_str(&r.9)?,
            online: r.10 != 0,
            last_seen: r.11 as u64,
            created_at: r.12 as u64,
        }))
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_user_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM users ORDER BY created_at, user_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Case-insensitive name search across all users. Exclusion rules
    /// (self, friends, request targets) belong to the relationship engine.
    pub fn search_users(&self, name_query: Option<&str>) -> Result<Vec<UserRow>, StorageError> {
        let ids: Vec<String> = match name_query {
            Some(q) => {
                let pattern = format!("%{}%", q.to_lowercase());
                let mut stmt = self.conn.prepare(
                    "SELECT user_id FROM users WHERE LOWER(name) LIKE ?1
                     ORDER BY created_at, user_id",
                )?;
                let rows = stmt.query_map(params![pattern], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            }
            None => self.list_user_ids()?,
        };

        let mut result = Vec::new();
        for id in ids {
            if let Some(user) = self.get_user(&id)? {
                result.push(user);
            }
        }
        Ok(result)
    }

    /// Partial update of the profile fields only. `None` for avatar or bio
    /// means "leave unchanged"; there is no clear-to-null through this call.
    pub fn update_profile(
        &self,
        user_id: &str,
        name: &str,
        avatar: Option<&str>,
        bio: Option<&str>,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET name = ?2,
                              avatar = COALESCE(?3, avatar),
                              bio = COALESCE(?4, bio)
             WHERE user_id = ?1",
            params![user_id, name, avatar, bio],
        )?;
        Ok(affected > 0)
    }

    /// Partial update of the presence fields only. Kept separate from
    /// message delivery so a failed presence write never blocks a push.
    pub fn update_presence(
        &self,
        user_id: &str,
        online: bool,
        last_seen: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET online = ?2, last_seen = ?3 WHERE user_id = ?1",
            params![user_id, online as i32, last_seen as i64],
        )?;
        Ok(affected > 0)
    }

    /// Rewrite the four relationship lists of exactly one user row.
    ///
    /// This is the single-record write the relationship engine builds its
    /// dual-record updates from. It never touches a second row.
    pub fn update_relationships(&self, row: &UserRow) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET friends = ?2,
                              friend_requests = ?3,
                              sent_friend_requests = ?4,
                              blocked_users = ?5
             WHERE user_id = ?1",
            params![
                row.user_id,
                serde_json::to_string(&row.friends)?,
                serde_json::to_string(&row.friend_requests)?,
                serde_json::to_string(&row.sent_friend_requests)?,
                serde_json::to_string(&row.blocked_users)?,
            ],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Group store
    // -----------------------------------------------------------------------

    /// Insert a group and its initial membership. The membership rows are
    /// part of the same record here, so this one is transactional.
    pub fn insert_group_with_members(
        &self,
        group: &GroupRow,
        members: &[GroupMemberRow],
    ) -> Result<(), StorageError> {
        self.conn.execute_batch("BEGIN")?;
        let result = (|| -> Result<(), rusqlite::Error> {
            self.conn.execute(
                "INSERT INTO groups (group_id, name, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    group.group_id,
                    group.name,
                    group.created_by,
                    group.created_at as i64
                ],
            )?;
            for m in members {
                self.conn.execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![m.group_id, m.user_id, m.is_admin as i32, m.joined_at as i64],
                )?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e.into())
            }
        }
    }

    pub fn get_group(&self, group_id: &str) -> Result<Option<GroupRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT group_id, name, created_by, created_at FROM groups WHERE group_id = ?1",
                params![group_id],
                |r| {
                    Ok(GroupRow {
                        group_id: r.get(0)?,
                        name: r.get(1)?,
                        created_by: r.get(2)?,
                        created_at: r.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMemberRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, user_id, is_admin, joined_at FROM group_members
             WHERE group_id = ?1 ORDER BY joined_at, user_id",
        )?;
        let rows = stmt.query_map(params![group_id], |r| {
            Ok(GroupMemberRow {
                group_id: r.get(0)?,
                user_id: r.get(1)?,
                is_admin: r.get::<_, i32>(2)? != 0,
                joined_at: r.get::<_, i64>(3)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn add_group_member(&self, row: &GroupMemberRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.group_id,
                row.user_id,
                row.is_admin as i32,
                row.joined_at as i64
            ],
        )?;
        Ok(())
    }

    pub fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
        )?;
        Ok(affected > 0)
    }

    pub fn is_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn is_group_admin(&self, group_id: &str, user_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM group_members
             WHERE group_id = ?1 AND user_id = ?2 AND is_admin = 1",
            params![group_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // -----------------------------------------------------------------------
    // Message store
    // -----------------------------------------------------------------------

    /// Append a message to the log. The stored `seq` is assigned by SQLite
    /// and returned.
    pub fn insert_message(&self, row: &MessageRow) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT INTO messages (message_id, sender_id, recipient_id, group_id,
                                   body, attachment, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.message_id,
                row.sender_id,
                row.recipient_id,
                row.group_id,
                row.body,
                row.attachment,
                row.seen as i32,
                row.created_at as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<MessageRow>, StorageError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![message_id], message_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn update_message_body(&self, message_id: &str, body: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET body = ?2 WHERE message_id = ?1",
            params![message_id, body],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_message(&self, message_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM messages WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(affected > 0)
    }

    pub fn mark_message_seen(&self, message_id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET seen = 1 WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(affected > 0)
    }

    /// Every message the viewer can see: direct messages they sent or
    /// received, plus messages in groups they belong to. Insertion order
    /// (`created_at`, then `seq`) so the aggregator's fold is deterministic.
    pub fn list_visible_messages(&self, viewer_id: &str) -> Result<Vec<MessageRow>, StorageError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE (m.group_id IS NULL AND (m.sender_id = ?1 OR m.recipient_id = ?1))
                OR (m.group_id IS NOT NULL AND EXISTS (
                        SELECT 1 FROM group_members gm
                        WHERE gm.group_id = m.group_id AND gm.user_id = ?1))
             ORDER BY m.created_at ASC, m.seq ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![viewer_id], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// All direct messages between two users, ascending.
    pub fn list_direct_messages(
        &self,
        viewer_id: &str,
        peer_id: &str,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE group_id IS NULL
               AND ((sender_id = ?1 AND recipient_id = ?2)
                 OR (sender_id = ?2 AND recipient_id = ?1))
             ORDER BY created_at ASC, seq ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![viewer_id, peer_id], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// All messages addressed to a group, ascending.
    pub fn list_group_messages(&self, group_id: &str) -> Result<Vec<MessageRow>, StorageError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE group_id = ?1
             ORDER BY created_at ASC, seq ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![group_id], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str, name: &str) -> UserRow {
        let now = now_secs();
        UserRow {
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
        }
    }

    #[test]
    fn test_object_ids_are_24_hex_chars() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_object_id());
    }

    #[test]
    fn test_user_crud() {
        let storage = Storage::open_in_memory().unwrap();

        assert!(storage.get_user("alice").unwrap().is_none());
        storage.insert_user(&test_user("alice", "Alice")).unwrap();

        let loaded = storage.get_user("alice").unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert!(loaded.friends.is_empty());
        assert!(!loaded.online);

        assert!(storage.user_exists("alice").unwrap());
        assert!(!storage.user_exists("bob").unwrap());

        let by_email = storage
            .find_user_by_email("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.user_id, "alice");
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_user(&test_user("alice", "Alice")).unwrap();

        let mut dup = test_user("alice2", "Alice Again");
        dup.email = "alice@example.com".to_string();
        match storage.insert_user(&dup) {
            Err(StorageError::AlreadyExists(_)) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn test_relationship_lists_round_trip_one_row() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_user(&test_user("alice", "Alice")).unwrap();
        storage.insert_user(&test_user("bob", "Bob")).unwrap();

        let mut alice = storage.get_user("alice").unwrap().unwrap();
        alice.sent_friend_requests.push(PendingRequest {
            user: "bob".to_string(),
            created_at: 42,
        });
        assert!(storage.update_relationships(&alice).unwrap());

        let alice = storage.get_user("alice").unwrap().unwrap();
        assert!(alice.has_sent_request_to("bob"));
        // The other row is untouched: this API is strictly single-record.
        let bob = storage.get_user("bob").unwrap().unwrap();
        assert!(!bob.has_request_from("alice"));
    }

    #[test]
    fn test_presence_and_profile_updates() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_user(&test_user("alice", "Alice")).unwrap();

        assert!(storage.update_presence("alice", true, 100).unwrap());
        let alice = storage.get_user("alice").unwrap().unwrap();
        assert!(alice.online);
        assert_eq!(alice.last_seen, 100);

        assert!(storage
            .update_profile("alice", "Alice B", Some("pic.png"), None)
            .unwrap());
        let alice = storage.get_user("alice").unwrap().unwrap();
        assert_eq!(alice.name, "Alice B");
        assert_eq!(alice.avatar.as_deref(), Some("pic.png"));
        assert!(alice.bio.is_none());

        assert!(!storage.update_presence("nobody", true, 1).unwrap());
    }

    #[test]
    fn test_profile_update_keeps_omitted_fields() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_user(&test_user("alice", "Alice")).unwrap();
        assert!(storage
            .update_profile("alice", "Alice", Some("pic.png"), Some("hello"))
            .unwrap());

        // None leaves avatar and bio untouched rather than clearing them.
        assert!(storage.update_profile("alice", "Alice B", None, None).unwrap());
        let alice = storage.get_user("alice").unwrap().unwrap();
        assert_eq!(alice.name, "Alice B");
        assert_eq!(alice.avatar.as_deref(), Some("pic.png"));
        assert_eq!(alice.bio.as_deref(), Some("hello"));
    }

    #[test]
    fn test_search_users_by_name() {
        let storage = Storage::open_in_memory().unwrap();
        storage.insert_user(&test_user("alice", "Alice")).unwrap();
        storage.insert_user(&test_user("ally", "Allyson")).unwrap();
        storage.insert_user(&test_user("bob", "Bob")).unwrap();

        let hits = storage.search_users(Some("al")).unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Allyson"]);

        let all = storage.search_users(None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_group_membership() {
        let storage = Storage::open_in_memory().unwrap();
        let now = now_secs();
        let group = GroupRow {
            group_id: "g1".to_string(),
            name: "hiking".to_string(),
            created_by: "alice".to_string(),
            created_at: now,
        };
        let members = vec![
            GroupMemberRow {
                group_id: "g1".to_string(),
                user_id: "alice".to_string(),
                is_admin: true,
                joined_at: now,
            },
            GroupMemberRow {
                group_id: "g1".to_string(),
                user_id: "bob".to_string(),
                is_admin: false,
                joined_at: now,
            },
        ];
        storage.insert_group_with_members(&group, &members).unwrap();

        let loaded = storage.get_group("g1").unwrap().unwrap();
        assert_eq!(loaded.name, "hiking");
        assert_eq!(storage.list_group_members("g1").unwrap().len(), 2);
        assert!(storage.is_group_member("g1", "bob").unwrap());
        assert!(storage.is_group_admin("g1", "alice").unwrap());
        assert!(!storage.is_group_admin("g1", "bob").unwrap());

        assert!(storage.remove_group_member("g1", "bob").unwrap());
        assert!(!storage.is_group_member("g1", "bob").unwrap());
        assert!(!storage.remove_group_member("g1", "bob").unwrap());
    }

    #[test]
    fn test_message_crud_and_seq_ordering() {
        let storage = Storage::open_in_memory().unwrap();
        let mk = |id: &str, ts: u64| MessageRow {
            seq: 0,
            message_id: id.to_string(),
            sender_id: "alice".to_string(),
            recipient_id: Some("bob".to_string()),
            group_id: None,
            body: format!("body-{id}"),
            attachment: None,
            seen: false,
            created_at: ts,
        };

        let s1 = storage.insert_message(&mk("m1", 10)).unwrap();
        let s2 = storage.insert_message(&mk("m2", 10)).unwrap();
        assert!(s2 > s1);

        let loaded = storage.get_message("m1").unwrap().unwrap();
        assert_eq!(loaded.body, "body-m1");
        assert!(!loaded.seen);

        assert!(storage.update_message_body("m1", "edited").unwrap());
        assert!(storage.mark_message_seen("m1").unwrap());
        let loaded = storage.get_message("m1").unwrap().unwrap();
        assert_eq!(loaded.body, "edited");
        assert!(loaded.seen);

        // Same created_at: insertion order decides.
        let msgs = storage.list_direct_messages("alice", "bob").unwrap();
        assert_eq!(msgs[0].message_id, "m1");
        assert_eq!(msgs[1].message_id, "m2");

        assert!(storage.delete_message("m2").unwrap());
        assert!(storage.get_message("m2").unwrap().is_none());
        assert!(!storage.delete_message("m2").unwrap());
    }

    #[test]
    fn test_visible_messages_include_group_traffic_for_members_only() {
        let storage = Storage::open_in_memory().unwrap();
        let now = now_secs();
        let group = GroupRow {
            group_id: "g1".to_string(),
            name: "g".to_string(),
            created_by: "alice".to_string(),
            created_at: now,
        };
        let members = vec![GroupMemberRow {
            group_id: "g1".to_string(),
            user_id: "alice".to_string(),
            is_admin: true,
            joined_at: now,
        }];
        storage.insert_group_with_members(&group, &members).unwrap();

        storage
            .insert_message(&MessageRow {
                seq: 0,
                message_id: "gm1".to_string(),
                sender_id: "alice".to_string(),
                recipient_id: None,
                group_id: Some("g1".to_string()),
                body: "to group".to_string(),
                attachment: None,
                seen: false,
                created_at: 5,
            })
            .unwrap();
        storage
            .insert_message(&MessageRow {
                seq: 0,
                message_id: "dm1".to_string(),
                sender_id: "carol".to_string(),
                recipient_id: Some("alice".to_string()),
                group_id: None,
                body: "direct".to_string(),
                attachment: None,
                seen: false,
                created_at: 6,
            })
            .unwrap();

        let visible = storage.list_visible_messages("alice").unwrap();
        assert_eq!(visible.len(), 2);

        // Non-member sees neither the group message nor someone else's DM.
        let visible = storage.list_visible_messages("bob").unwrap();
        assert!(visible.is_empty());
    }
}
