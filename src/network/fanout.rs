//! Broadcast Fan-out
//!
//! Addressing layer over the registry. Appends to outbound mailboxes only,
//! so it is safe to call from inside a scheduler callback.

use std::sync::Arc;

use tracing::debug;

use crate::network::route::Recipient;
use crate::network::session::{Session, SessionRegistry};

/// Routes outbound messages to client mailboxes.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry messages are routed through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Queue a message for one client or every client of a role.
    ///
    /// Returns how many mailboxes received the message. A vanished client is
    /// not an error; the message is dropped.
    pub fn send(&self, recipient: impl Into<Recipient>, message: &str) -> usize {
        let recipient = recipient.into();
        let delivered = match recipient {
            Recipient::Client(id) => match self.registry.lookup(id) {
                Some(session) => {
                    Self::enqueue(&session, message);
                    1
                }
                None => {
                    debug!("Dropping message for vanished client {}", id);
                    0
                }
            },
            Recipient::Role(role) => {
                let sessions = self.registry.sessions_of_role(role);
                for session in &sessions {
                    Self::enqueue(session, message);
                }
                sessions.len()
            }
        };

        debug!("Message added to send queue for {}: {}", recipient, message);
        delivered
    }

    fn enqueue(session: &Session, message: &str) {
        if session.mailbox().push_outbound(message) {
            debug!("Send queue for {} is full, dropped its oldest message", session.id());
        }
    }
}
