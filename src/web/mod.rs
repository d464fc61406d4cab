//! parley web server: REST API + WebSocket over the core stores.
//!
//! Request handling never embeds protocol detail into the core: handlers
//! translate HTTP to core operations and map typed core errors to statuses
//! in one place.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;

use crate::delivery::SessionRegistry;
use crate::plog;
use crate::relationships;
use crate::storage::Storage;

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    plog!("parley starting");
    plog!("  database: {}", config.db_path().display());

    let storage = Storage::open(&config.db_path()).expect("failed to open database");

    // Startup integrity sweep: repair any relationship asymmetry left behind
    // by an interrupted dual-record update.
    match relationships::reconcile_all(&storage) {
        Ok(0) => {}
        Ok(n) => plog!("  reconcile: applied {n} repair(s) at startup"),
        Err(e) => plog!("  WARNING: reconcile sweep failed: {e}"),
    }

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        registry: Arc::new(SessionRegistry::new()),
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    plog!("parley listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
