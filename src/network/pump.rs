//! Transport Pump
//!
//! Moves messages between one client's socket and its mailbox. The drain
//! loop empties the outbound queue into the socket; the receive loop appends
//! arriving frames to the inbound queue. Each only ever suspends on its own
//! I/O or idle wait.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace};

use crate::network::session::{Session, SessionRegistry};

/// How long an idle drain loop sleeps before re-checking its session.
pub const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Upper bound on flushing a close frame to a client that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Reasons a pump loop stops.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote side closed the connection.
    #[error("Transport closed")]
    TransportClosed,

    /// The socket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Send queued outbound messages until the session leaves the registry.
///
/// A failed send deregisters the session. Exits at most one idle interval
/// after deregistration.
pub async fn drain_outbound<S>(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    mut sink: S,
    idle: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while registry.is_registered(&session) {
        match session.mailbox().pop_outbound() {
            Some(text) => {
                trace!("Sending to {}: {}", session.id(), text);
                if let Err(e) = sink.send(Message::Text(text)).await {
                    registry.remove_session(&session);
                    return Err(e.into());
                }
            }
            None => {
                tokio::select! {
                    _ = session.mailbox().wait_outbound(idle) => {}
                    _ = session.closed() => {}
                }
            }
        }
    }

    // Evicted clients get a close frame; for already-closed sockets this fails
    // and is ignored.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
    Ok(())
}

/// Append arriving frames to the inbound queue until the socket closes.
///
/// Closure or any transport fault removes the session. Returns `Ok` when the
/// session was removed by someone else first.
pub async fn receive_inbound<R>(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    mut stream: R,
) -> Result<(), TransportError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            msg = stream.next() => msg,
            _ = session.closed() => return Ok(()),
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                debug!("Got message from {}: {}", session.id(), text);
                session.mailbox().push_inbound(text);
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => {
                    debug!("Got message from {}: {}", session.id(), text);
                    session.mailbox().push_inbound(text);
                }
                Err(_) => debug!("Ignoring non-text binary frame from {}", session.id()),
            },
            Some(Ok(Message::Close(_))) | None => {
                registry.remove_session(&session);
                return Err(TransportError::TransportClosed);
            }
            Some(Ok(other)) => {
                trace!("Control frame from {}: {:?}", session.id(), other);
            }
            Some(Err(e)) => {
                registry.remove_session(&session);
                return Err(e.into());
            }
        }
    }
}

/// Run both pump loops for a registered session until it ends.
///
/// The drain loop runs as its own task so a stalled socket write never
/// delays reading, and vice versa.
pub async fn run_pump<S, R>(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    sink: S,
    stream: R,
    idle: Duration,
) where
    S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let id = session.id();

    let drain_task = {
        let session = session.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = drain_outbound(session, registry, sink, idle).await {
                debug!("Send task for {} stopped: {}", id, e);
            }
            info!("Send task for {} exited", id);
        })
    };

    match receive_inbound(session, registry, stream).await {
        Ok(()) | Err(TransportError::TransportClosed) => {}
        Err(e) => debug!("Receive task for {} stopped: {}", id, e),
    }
    info!("Receive task for {} exited", id);

    let _ = drain_task.await;
}
