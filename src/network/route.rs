//! Roles and Routing
//!
//! Connection paths map to one of two fixed client roles. Outbound messages
//! are addressed either to one client or to every client of a role.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client identifier.
///
/// Player identifiers double as an index into the tank name table.
pub type ClientId = u32;

/// Kind of remote participant, fixed for a session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Passive observer (the browser viewer).
    Viewer,
    /// Autonomous agent controlling a tank.
    Player,
}

impl Role {
    /// Lowercase name used in logs and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Player => "player",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed path-to-role table consulted during admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    /// Path viewer clients connect on.
    pub viewer: String,
    /// Path player clients connect on.
    pub player: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            viewer: "/pyTanksAPI/viewer".to_string(),
            player: "/pyTanksAPI/player".to_string(),
        }
    }
}

impl RouteTable {
    /// Resolve a request path to a role. Any other path is unroutable.
    pub fn resolve(&self, path: &str) -> Option<Role> {
        if path == self.viewer {
            Some(Role::Viewer)
        } else if path == self.player {
            Some(Role::Player)
        } else {
            None
        }
    }
}

/// Addressee of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// A single client.
    Client(ClientId),
    /// Every client currently registered under a role.
    Role(Role),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Client(id) => write!(f, "{}", id),
            Recipient::Role(role) => write!(f, "{}", role),
        }
    }
}

impl From<ClientId> for Recipient {
    fn from(id: ClientId) -> Self {
        Recipient::Client(id)
    }
}

impl From<Role> for Recipient {
    fn from(role: Role) -> Self {
        Recipient::Role(role)
    }
}
