//! Arena Entities
//!
//! Tanks, shells and walls as they cross the server boundary. Tank
//! snapshots never carry the reload timestamp; clean snapshots also drop
//! the score fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::network::route::ClientId;

/// Slack allowed on reload timing to absorb network jitter, in seconds.
pub const RELOAD_MARGIN_SECS: f64 = 0.2;

fn seconds(secs: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

// =============================================================================
// TANK
// =============================================================================

/// Whether a tank is in play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TankStatus {
    /// Driving and shooting.
    Alive,
    /// Out of the current round.
    Dead,
}

/// State of one player's tank.
#[derive(Clone, Debug)]
pub struct Tank {
    /// X position in pixels.
    pub x: f64,
    /// Y position in pixels (+y is down).
    pub y: f64,
    /// Heading in radians from the +x axis.
    pub heading: f64,
    /// Whether the tank drives forward each frame.
    pub moving: bool,
    /// Current status.
    pub status: TankStatus,
    /// Kills in the current round.
    pub kills: u32,
    /// Rounds won.
    pub wins: u32,
    /// Private; never leaves the server.
    last_shot: DateTime<Utc>,
}

impl Tank {
    /// Create a dead, stationary tank that is already reloaded.
    pub fn new(x: f64, y: f64, heading: f64, reload_secs: f64) -> Self {
        Self {
            x,
            y,
            heading,
            moving: false,
            status: TankStatus::Dead,
            kills: 0,
            wins: 0,
            last_shot: Utc::now() - seconds(reload_secs),
        }
    }

    /// Whether the tank is in play.
    pub fn is_alive(&self) -> bool {
        self.status == TankStatus::Alive
    }

    /// Whether enough time has passed since the last shot.
    pub fn can_shoot(&self, reload_secs: f64) -> bool {
        self.can_shoot_at(Utc::now(), reload_secs)
    }

    /// [`Tank::can_shoot`] evaluated at `now`.
    pub fn can_shoot_at(&self, now: DateTime<Utc>, reload_secs: f64) -> bool {
        seconds(reload_secs - RELOAD_MARGIN_SECS) <= now - self.last_shot
    }

    /// Record a shot fired now.
    pub fn did_shoot(&mut self) {
        self.did_shoot_at(Utc::now());
    }

    /// Record a shot fired at `when`.
    pub fn did_shoot_at(&mut self, when: DateTime<Utc>) {
        self.last_shot = when;
    }

    /// Move `distance` pixels along the current heading.
    pub fn advance(&mut self, distance: f64) {
        self.x += self.heading.cos() * distance;
        self.y += self.heading.sin() * distance;
    }

    /// Outward-facing view. `clean` withholds the score fields.
    pub fn snapshot(&self, clean: bool) -> TankSnapshot {
        TankSnapshot {
            x: self.x,
            y: self.y,
            heading: self.heading,
            moving: self.moving,
            status: self.status,
            kills: (!clean).then_some(self.kills),
            wins: (!clean).then_some(self.wins),
        }
    }
}

/// Serializable view of a tank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TankSnapshot {
    /// X position.
    pub x: f64,
    /// Y position.
    pub y: f64,
    /// Heading in radians.
    pub heading: f64,
    /// Driving forward.
    pub moving: bool,
    /// Alive or dead.
    pub status: TankStatus,
    /// Round kills; absent in clean snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<u32>,
    /// Rounds won; absent in clean snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wins: Option<u32>,
}

// =============================================================================
// SHELL
// =============================================================================

/// A shell in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    /// Client that fired it.
    pub shooter_id: ClientId,
    /// X position.
    pub x: f64,
    /// Y position.
    pub y: f64,
    /// Heading in radians.
    pub heading: f64,
}

impl Shell {
    /// Fire a shell from a tank's position.
    pub fn new(shooter_id: ClientId, tank: &Tank, heading: f64) -> Self {
        Self {
            shooter_id,
            x: tank.x,
            y: tank.y,
            heading,
        }
    }

    /// Move `distance` pixels along the heading.
    pub fn advance(&mut self, distance: f64) {
        self.x += self.heading.cos() * distance;
        self.y += self.heading.sin() * distance;
    }
}

// =============================================================================
// WALL
// =============================================================================

/// Axis-aligned block of cover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Wall {
    /// Create a wall.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether a point lies inside the wall.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}
