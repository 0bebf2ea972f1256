//! Admission Handler
//!
//! Completes the WebSocket handshake, maps the request path to a role,
//! allocates an identity, registers the session and starts its pump.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::network::pump::{run_pump, IDLE_WAIT};
use crate::network::route::{ClientId, Role, RouteTable};
use crate::network::session::{RegistryError, Session, SessionRegistry};

/// Identities handed to viewers.
pub const VIEWER_ID_RANGE: RangeInclusive<ClientId> = 1000..=9999;

/// Candidate draws before admission gives up on finding a free identity.
pub const MAX_ID_ATTEMPTS: usize = 4096;

/// Sent to clients connecting on an unknown path.
pub const INVALID_ROUTE_MESSAGE: &str =
    "Invalid API path - Check that your client config is up to date";

/// Sent to clients when every identity of their role is taken.
pub const SERVER_FULL_MESSAGE: &str = "Server full - No free client slots for this client type";

/// Admission errors.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The request path matches no role.
    #[error("Invalid API path: {0}")]
    InvalidRoute(String),

    /// Every identity in the role's namespace is taken.
    #[error("No free {0} identity")]
    CapacityExhausted(Role),

    /// WebSocket handshake failed.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] WsError),
}

/// Accepts new clients into a registry.
#[derive(Debug, Clone)]
pub struct Admission {
    registry: Arc<SessionRegistry>,
    routes: RouteTable,
    /// Size of the player namespace (length of the tank name table).
    player_slots: u32,
    idle_wait: Duration,
}

impl Admission {
    /// Create an admission handler.
    pub fn new(registry: Arc<SessionRegistry>, routes: RouteTable, player_slots: u32) -> Self {
        Self {
            registry,
            routes,
            player_slots,
            idle_wait: IDLE_WAIT,
        }
    }

    /// Override the drain loop idle wait for sessions admitted from now on.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// The registry sessions are admitted into.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Identity namespace for a role, or `None` if the role has no slots.
    pub fn id_space(&self, role: Role) -> Option<RangeInclusive<ClientId>> {
        match role {
            Role::Player if self.player_slots == 0 => None,
            Role::Player => Some(0..=self.player_slots - 1),
            Role::Viewer => Some(VIEWER_ID_RANGE),
        }
    }

    /// Validate a path and register a new session for it.
    pub fn admit(&self, path: &str, peer: Option<SocketAddr>) -> Result<Arc<Session>, AdmissionError> {
        self.admit_with_rng(path, peer, &mut rand::thread_rng())
    }

    /// [`Admission::admit`] drawing identities from the given generator.
    pub fn admit_with_rng<R: Rng>(
        &self,
        path: &str,
        peer: Option<SocketAddr>,
        rng: &mut R,
    ) -> Result<Arc<Session>, AdmissionError> {
        let role = self
            .routes
            .resolve(path)
            .ok_or_else(|| AdmissionError::InvalidRoute(path.to_string()))?;

        let space = self.id_space(role).ok_or(AdmissionError::CapacityExhausted(role))?;
        let capacity = (*space.end() - *space.start()) as usize + 1;
        if self.registry.count_of_role(role) >= capacity {
            return Err(AdmissionError::CapacityExhausted(role));
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = rng.gen_range(space.clone());
            if self.registry.contains(id) {
                continue;
            }

            let session = Arc::new(Session::new(id, role, peer));
            match self.registry.register(session.clone()) {
                Ok(()) => {
                    info!("Client (clientID: {}, type: {}) connected at {}", id, role, path);
                    return Ok(session);
                }
                // Another admission took the identity between the check and the insert.
                Err(RegistryError::IdentityCollision(_)) => {
                    debug!("Identity {} claimed concurrently, drawing again", id);
                }
            }
        }

        warn!("Gave up allocating a {} identity after {} attempts", role, MAX_ID_ATTEMPTS);
        Err(AdmissionError::CapacityExhausted(role))
    }

    /// Handshake with a raw connection and start its pump.
    ///
    /// Rejected clients receive one explanatory text frame before the socket
    /// is closed.
    pub async fn accept<S>(&self, stream: S, peer: SocketAddr) -> Result<ClientId, AdmissionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut path = String::new();
        let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
            path = request.uri().path().to_string();
            Ok::<_, ErrorResponse>(response)
        })
        .await?;

        let (mut ws_sender, ws_receiver) = ws_stream.split();

        match self.admit(&path, Some(peer)) {
            Ok(session) => {
                let id = session.id();
                let registry = self.registry.clone();
                tokio::spawn(run_pump(session, registry, ws_sender, ws_receiver, self.idle_wait));
                Ok(id)
            }
            Err(e) => {
                let notice = match &e {
                    AdmissionError::InvalidRoute(_) => {
                        info!("A client tried to connect using an invalid API path - connection refused");
                        INVALID_ROUTE_MESSAGE
                    }
                    _ => {
                        info!("Refused client from {}: {}", peer, e);
                        SERVER_FULL_MESSAGE
                    }
                };
                let _ = ws_sender.send(Message::Text(notice.to_string())).await;
                let _ = ws_sender.close().await;
                Err(e)
            }
        }
    }
}
