//! Arena State
//!
//! World entities plus the snapshot messages built from them. Viewers get
//! the full picture; players only ever see clean tank snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::entities::{Shell, Tank, TankSnapshot, Wall};
use crate::network::route::ClientId;

/// Every entity in the arena.
#[derive(Debug, Clone, Default)]
pub struct ArenaState {
    /// Tanks keyed by owning player.
    pub tanks: BTreeMap<ClientId, Tank>,
    /// Shells in flight.
    pub shells: Vec<Shell>,
    /// Static cover.
    pub walls: Vec<Wall>,
}

/// A tank with its owner, as shown to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankEntry {
    /// Owning player.
    pub id: ClientId,
    /// Display name from the tank name table.
    pub name: String,
    /// Tank state.
    #[serde(flatten)]
    pub tank: TankSnapshot,
}

/// Full world state, for viewers and internal use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateUpdate {
    /// All tanks, scores included.
    pub tanks: Vec<TankEntry>,
    /// Shells in flight.
    pub shells: Vec<Shell>,
    /// Cover.
    pub walls: Vec<Wall>,
}

/// World state as seen by one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateUpdate {
    /// The recipient's own tank.
    pub my_tank: Option<TankSnapshot>,
    /// Everyone else's tanks.
    pub tanks: Vec<TankSnapshot>,
    /// Shells in flight.
    pub shells: Vec<Shell>,
    /// Cover.
    pub walls: Vec<Wall>,
}

impl ArenaState {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full snapshot. Scores are included unless `clean`.
    pub fn snapshot(&self, names: &[String], clean: bool) -> GameStateUpdate {
        let tanks = self
            .tanks
            .iter()
            .map(|(id, tank)| TankEntry {
                id: *id,
                name: names.get(*id as usize).cloned().unwrap_or_default(),
                tank: tank.snapshot(clean),
            })
            .collect();

        GameStateUpdate {
            tanks,
            shells: self.shells.clone(),
            walls: self.walls.clone(),
        }
    }

    /// Snapshot addressed to one player: every tank is clean.
    pub fn player_view(&self, player: ClientId) -> PlayerStateUpdate {
        PlayerStateUpdate {
            my_tank: self.tanks.get(&player).map(|t| t.snapshot(true)),
            tanks: self
                .tanks
                .iter()
                .filter(|(id, _)| **id != player)
                .map(|(_, t)| t.snapshot(true))
                .collect(),
            shells: self.shells.clone(),
            walls: self.walls.clone(),
        }
    }
}
