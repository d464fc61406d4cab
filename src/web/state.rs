//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::delivery::SessionRegistry;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    /// Shared outside the state lock so pushes never wait on storage.
    pub registry: Arc<SessionRegistry>,
}

pub type SharedState = Arc<Mutex<AppState>>;
