//! Per-Client Mailbox
//!
//! Two independent FIFO queues of opaque text payloads. The outbound side is
//! fed by game logic and drained by the transport pump; the inbound side is
//! fed by the pump and drained by game logic.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

/// Outbound messages held for a client that is not reading. Past this the
/// oldest message is dropped.
pub const OUTBOUND_LIMIT: usize = 256;

/// Ordered inbound and outbound queues owned by one session.
#[derive(Debug)]
pub struct Mailbox {
    outbound: Mutex<VecDeque<String>>,
    inbound: Mutex<VecDeque<String>>,
    /// Wakes the drain loop when outbound mail arrives.
    outbound_ready: Notify,
    outbound_limit: usize,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::with_outbound_limit(OUTBOUND_LIMIT)
    }
}

// A panic while holding a queue lock cannot leave a VecDeque half-modified,
// so a poisoned lock is still safe to use.
fn lock(queue: &Mutex<VecDeque<String>>) -> MutexGuard<'_, VecDeque<String>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mailbox holding at most `limit` outbound messages.
    pub fn with_outbound_limit(limit: usize) -> Self {
        Self {
            outbound: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(VecDeque::new()),
            outbound_ready: Notify::new(),
            outbound_limit: limit.max(1),
        }
    }

    /// Append a message to the outbound queue. Never blocks on I/O.
    ///
    /// Returns `true` if the queue was full and its oldest message dropped.
    pub fn push_outbound(&self, message: impl Into<String>) -> bool {
        let dropped = {
            let mut queue = lock(&self.outbound);
            let dropped = queue.len() >= self.outbound_limit;
            if dropped {
                queue.pop_front();
            }
            queue.push_back(message.into());
            dropped
        };
        self.outbound_ready.notify_one();
        dropped
    }

    /// Take the oldest outbound message.
    pub fn pop_outbound(&self) -> Option<String> {
        lock(&self.outbound).pop_front()
    }

    /// Number of messages waiting to be sent.
    pub fn outbound_len(&self) -> usize {
        lock(&self.outbound).len()
    }

    /// Suspend until outbound mail is signalled or `idle` elapses.
    ///
    /// Returns early if a message was pushed since the last wait, so a push
    /// racing with the caller's emptiness check is never lost.
    pub async fn wait_outbound(&self, idle: Duration) {
        let _ = tokio::time::timeout(idle, self.outbound_ready.notified()).await;
    }

    /// Append a message received from the socket.
    pub fn push_inbound(&self, message: impl Into<String>) {
        lock(&self.inbound).push_back(message.into());
    }

    /// Take the oldest received message.
    pub fn pop_inbound(&self) -> Option<String> {
        lock(&self.inbound).pop_front()
    }

    /// Take every received message in arrival order.
    pub fn drain_inbound(&self) -> Vec<String> {
        lock(&self.inbound).drain(..).collect()
    }

    /// Number of received messages not yet consumed.
    pub fn inbound_len(&self) -> usize {
        lock(&self.inbound).len()
    }
}
