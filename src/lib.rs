pub mod chats;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod messages;
pub mod relationships;
pub mod storage;
pub mod web;
