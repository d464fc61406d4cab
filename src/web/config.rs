//! Configuration types and constants for the parley server.

use std::path::PathBuf;

use clap::Parser;

/// Refuse new WebSocket upgrades past this many live sessions.
pub(crate) const MAX_WS_SESSIONS: usize = 256;

/// Social messaging server: friend graph, groups, chats, real-time delivery.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: PARLEY_BIND] [default: 127.0.0.1:4000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: PARLEY_DATA_DIR] [default: ~/.parley]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("PARLEY_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".parley"))
                    .unwrap_or_else(|_| PathBuf::from(".parley"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("PARLEY_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:4000".to_string());

        Self {
            bind_addr,
            data_dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("parley.db")
    }
}
