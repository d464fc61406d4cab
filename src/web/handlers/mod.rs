//! Route handler modules for the parley REST API.

pub mod accounts;
pub mod chats;
pub mod friends;
pub mod groups;
pub mod health;
pub mod messages;
pub mod users;
pub mod websocket;
