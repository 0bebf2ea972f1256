//! Client Sessions
//!
//! A session is the registered state of one connected client: identity,
//! role, transport handle and mailbox. The [`SessionRegistry`] owns the set
//! of live sessions and is shared by admission, the transport pumps and the
//! game collaborators.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::network::mailbox::Mailbox;
use crate::network::route::{ClientId, Role};

/// A connected client.
#[derive(Debug)]
pub struct Session {
    id: ClientId,
    role: Role,
    /// Remote address, when the transport has one.
    peer: Option<SocketAddr>,
    connected_at: Instant,
    mailbox: Mailbox,
    /// Flips to `true` once the session leaves the registry.
    closed: watch::Sender<bool>,
}

impl Session {
    /// Create a session that is not yet registered.
    pub fn new(id: ClientId, role: Role, peer: Option<SocketAddr>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            role,
            peer,
            connected_at: Instant::now(),
            mailbox: Mailbox::new(),
            closed,
        }
    }

    /// Client identifier.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Client role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Remote address.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// When the session was created.
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// The session's message queues.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Whether the session has been removed from the registry.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session has been removed from the registry.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Identity already held by a live session.
    #[error("Identity {0} is already registered")]
    IdentityCollision(ClientId),
}

/// The set of currently connected clients.
///
/// The lock is only held for the duration of a map operation. Iteration
/// returns a snapshot of shared handles so callers never hold it across an
/// await or a socket write.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<ClientId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Map operations cannot panic halfway through, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ClientId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ClientId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a session under its identity.
    pub fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.write();
        if sessions.contains_key(&session.id) {
            return Err(RegistryError::IdentityCollision(session.id));
        }
        sessions.insert(session.id, session);
        Ok(())
    }

    /// Get a session by identity.
    pub fn lookup(&self, id: ClientId) -> Option<Arc<Session>> {
        self.read().get(&id).cloned()
    }

    /// Check whether an identity is taken.
    pub fn contains(&self, id: ClientId) -> bool {
        self.read().contains_key(&id)
    }

    /// Check whether this exact session is still registered.
    ///
    /// An identity freed by a disconnect can be handed to a new client; a
    /// pump holding the old session must not mistake it for its own.
    pub fn is_registered(&self, session: &Arc<Session>) -> bool {
        self.read()
            .get(&session.id)
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Point-in-time list of every live session of a role.
    pub fn sessions_of_role(&self, role: Role) -> Vec<Arc<Session>> {
        self.read()
            .values()
            .filter(|s| s.role == role)
            .cloned()
            .collect()
    }

    /// Point-in-time list of every live identity of a role.
    pub fn ids_of_role(&self, role: Role) -> Vec<ClientId> {
        self.read()
            .values()
            .filter(|s| s.role == role)
            .map(|s| s.id)
            .collect()
    }

    /// Number of live sessions of a role.
    pub fn count_of_role(&self, role: Role) -> usize {
        self.read().values().filter(|s| s.role == role).count()
    }

    /// Deregister an identity. Removing an absent identity is a no-op.
    pub fn remove(&self, id: ClientId) -> Option<Arc<Session>> {
        let removed = self.write().remove(&id);
        if let Some(session) = &removed {
            session.close();
            debug!("Session {} ({}) removed", id, session.role);
        }
        removed
    }

    /// Deregister a session only if it still owns its identity.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.write();
            match sessions.get(&session.id) {
                Some(current) if Arc::ptr_eq(current, session) => sessions.remove(&session.id),
                _ => None,
            }
        };
        // Closing is idempotent; a session that lost its identity is closed too.
        session.close();
        removed.is_some()
    }

    /// Forcibly disconnect a client, e.g. for a protocol violation.
    pub fn evict(&self, id: ClientId, reason: &str) -> bool {
        match self.remove(id) {
            Some(session) => {
                info!("Client {} ({}) evicted: {}", id, session.role, reason);
                true
            }
            None => false,
        }
    }

    /// [`SessionRegistry::evict`] for this exact session. A newer session
    /// holding the same identity is left alone.
    pub fn evict_session(&self, session: &Arc<Session>, reason: &str) -> bool {
        let evicted = self.remove_session(session);
        if evicted {
            info!("Client {} ({}) evicted: {}", session.id, session.role, reason);
        }
        evicted
    }

    /// Remove every session, closing each.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.write());
        for session in drained.values() {
            session.close();
        }
        drained.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: ClientId, role: Role) -> Arc<Session> {
        Arc::new(Session::new(id, role, None))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        registry.register(session(3, Role::Player)).unwrap();

        let found = registry.lookup(3).unwrap();
        assert_eq!(found.id(), 3);
        assert_eq!(found.role(), Role::Player);
        assert!(registry.lookup(4).is_none());
    }

    #[test]
    fn test_register_collision() {
        let registry = SessionRegistry::new();
        registry.register(session(7, Role::Viewer)).unwrap();

        let result = registry.register(session(7, Role::Player));
        assert_eq!(result, Err(RegistryError::IdentityCollision(7)));
        assert_eq!(registry.lookup(7).unwrap().role(), Role::Viewer);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let s = session(1, Role::Player);
        registry.register(s.clone()).unwrap();

        assert!(registry.remove(1).is_some());
        assert!(s.is_closed());
        assert!(registry.remove(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sessions_of_role() {
        let registry = SessionRegistry::new();
        registry.register(session(0, Role::Player)).unwrap();
        registry.register(session(1, Role::Player)).unwrap();
        registry.register(session(1000, Role::Viewer)).unwrap();

        let mut players = registry.ids_of_role(Role::Player);
        players.sort_unstable();
        assert_eq!(players, vec![0, 1]);
        assert_eq!(registry.sessions_of_role(Role::Viewer).len(), 1);
        assert_eq!(registry.count_of_role(Role::Player), 2);
    }

    #[test]
    fn test_stale_session_does_not_remove_successor() {
        let registry = SessionRegistry::new();
        let old = session(2, Role::Player);
        registry.register(old.clone()).unwrap();
        registry.remove(2);

        let new = session(2, Role::Player);
        registry.register(new.clone()).unwrap();

        assert!(!registry.is_registered(&old));
        assert!(registry.is_registered(&new));
        assert!(!registry.remove_session(&old));
        assert!(registry.contains(2));
        assert!(!new.is_closed());
    }

    #[test]
    fn test_evict() {
        let registry = SessionRegistry::new();
        let s = session(5, Role::Player);
        registry.register(s.clone()).unwrap();

        assert!(registry.evict(5, "bad message"));
        assert!(s.is_closed());
        assert!(!registry.evict(5, "bad message"));
    }

    #[test]
    fn test_evict_session_spares_successor() {
        let registry = SessionRegistry::new();
        let old = session(4, Role::Player);
        registry.register(old.clone()).unwrap();
        registry.remove(4);
        let new = session(4, Role::Player);
        registry.register(new.clone()).unwrap();

        assert!(!registry.evict_session(&old, "bad message"));
        assert!(registry.is_registered(&new));
        assert!(!new.is_closed());

        assert!(registry.evict_session(&new, "bad message"));
        assert!(new.is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_closes_everything() {
        let registry = SessionRegistry::new();
        let a = session(1, Role::Player);
        let b = session(1001, Role::Viewer);
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        assert_eq!(registry.clear(), 2);
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_closed_resolves_after_remove() {
        let registry = Arc::new(SessionRegistry::new());
        let s = session(9, Role::Viewer);
        registry.register(s.clone()).unwrap();

        let waiter = {
            let s = s.clone();
            tokio::spawn(async move { s.closed().await })
        };
        registry.remove(9);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }
}
