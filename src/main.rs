//! Tank Arena Server
//!
//! Loads configuration, starts the WebSocket server and runs until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use tank_arena::{logging, GameServer, ServerConfig, VERSION};

/// Command line arguments. Each flag overrides the environment.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:5678
    #[clap(short, long)]
    bind: Option<SocketAddr>,
    /// Logging tier: 0 none, 1 FPS and connects, 2 server status, 3 everything
    #[clap(short, long)]
    log_level: Option<u8>,
    /// Target simulation frames per second
    #[clap(long)]
    fps: Option<u32>,
    /// Snapshot broadcasts per second
    #[clap(long)]
    ups: Option<u32>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(fps) = self.fps {
            config.frames_per_second = fps;
        }
        if let Some(ups) = self.ups {
            config.updates_per_second = ups;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env().context("reading environment")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    logging::setup_logging(config.log_level)?;
    info!("Tank Arena Server v{}", VERSION);
    info!(
        "{} fps, {} updates/s, {} player slots",
        config.frames_per_second,
        config.updates_per_second,
        config.player_slots()
    );

    let server = Arc::new(GameServer::new(config));

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    let signal = {
        let server = server.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    server.shutdown();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        })
    };

    let result = serving.await.context("server task panicked")?;
    signal.abort();
    result?;

    info!("Server stopped");
    Ok(())
}
