//! WebSocket Game Server
//!
//! Binds the listener, admits connections, and drives the arena through the
//! tick scheduler until shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::game::arena::Arena;
use crate::network::admission::{Admission, AdmissionError};
use crate::network::fanout::Broadcaster;
use crate::network::route::Role;
use crate::network::session::SessionRegistry;
use crate::scheduler::pacer::InvalidRate;
use crate::scheduler::tick::TickScheduler;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Failed to bind or query the listener.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// The scheduler refused its rates.
    #[error("Invalid rate: {0}")]
    Rate(#[from] InvalidRate),

    /// The tick scheduler task died.
    #[error("Tick scheduler failed: {0}")]
    Scheduler(String),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Connected clients.
    registry: Arc<SessionRegistry>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
    /// Set once shutdown has been requested.
    stopping: AtomicBool,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            shutdown_tx,
            stopping: AtomicBool::new(false),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry of connected clients.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validate the configuration and bind the listener.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        self.config.validate()?;
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.config.validate()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("Game server listening on {}", listener.local_addr()?);

        let admission = Arc::new(Admission::new(
            self.registry.clone(),
            self.config.routes.clone(),
            self.config.player_slots(),
        ));

        let arena = Arena::new(
            Broadcaster::new(self.registry.clone()),
            self.config.tank_names.clone(),
            self.config.arena,
        );
        let scheduler = TickScheduler::new(arena, self.config.scheduler())?;
        let mut scheduler_handle = tokio::spawn(scheduler.run(self.shutdown_tx.subscribe()));

        if self.stopping.load(Ordering::SeqCst) {
            info!("Shutdown requested before serving");
            scheduler_handle.abort();
            self.registry.clear();
            return Ok(());
        }

        let outcome = loop {
            // The scheduler stops on the same signal; shutdown must win the race.
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    if let Err(e) = (&mut scheduler_handle).await {
                        warn!("Tick scheduler did not stop cleanly: {}", e);
                    }
                    break Ok(());
                }
                joined = &mut scheduler_handle => {
                    if self.stopping.load(Ordering::SeqCst) {
                        info!("Tick scheduler stopped for shutdown");
                        break Ok(());
                    }
                    let reason = match joined {
                        Ok(_) => "stopped unexpectedly".to_string(),
                        Err(e) => e.to_string(),
                    };
                    error!("Tick scheduler exited: {}", reason);
                    break Err(ServerError::Scheduler(reason));
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            Self::handle_connection(admission.clone(), stream, peer);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        };

        let removed = self.registry.clear();
        info!("Closed {} client sessions", removed);
        outcome
    }

    /// Admit a new connection on its own task.
    fn handle_connection(admission: Arc<Admission>, stream: TcpStream, peer: SocketAddr) {
        tokio::spawn(async move {
            match admission.accept(stream, peer).await {
                Ok(id) => debug!("Admitted {} as client {}", peer, id),
                Err(AdmissionError::Handshake(e)) => {
                    warn!("WebSocket handshake failed for {}: {}", peer, e);
                }
                Err(e) => debug!("Rejected {}: {}", peer, e),
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Get connected clients of one role.
    pub fn role_count(&self, role: Role) -> usize {
        self.registry.count_of_role(role)
    }
}
