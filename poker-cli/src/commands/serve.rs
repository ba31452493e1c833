//! Poker serve command for running the room server
//!
//! The server runs in the foreground until Ctrl-C or a `stop` line on the
//! console, then closes every room connection and exits.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use poker_core::MemoryRoomStore;
use poker_server::PokerServer;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigLoader, PokerConfig};

/// Console line that stops the server
pub const STOP_COMMAND: &str = "stop";

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    pub host: Option<String>,
}

impl ServeArgs {
    fn apply(&self, config: &mut PokerConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    args.apply(&mut config);
    config.validate()?;

    if config.users.is_empty() {
        warn!("No users configured; nobody will be able to log in");
    }

    let store = Arc::new(MemoryRoomStore::new().with_users(config.users.clone()));
    let server = PokerServer::new(config.to_server_config(), store);
    info!(
        "Starting poker server on {}:{}",
        config.server.host, config.server.port
    );

    let token = server.shutdown_token();
    watch_console(token.clone());
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                token.cancel();
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    server.run().await.map_err(Into::into)
}

/// Cancel `token` when a `stop` line is read from stdin
///
/// Reads on a plain thread so a pending read never holds up runtime shutdown.
fn watch_console(token: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("poker-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if is_stop_command(&line) => {
                        info!("Stop requested from console, shutting down");
                        token.cancel();
                        return;
                    }
                    Ok(_) => continue,
                    Err(_) => return,
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Could not watch the console for stop: {}", e);
    }
}

fn is_stop_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(STOP_COMMAND)
}
