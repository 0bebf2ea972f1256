//! Arena Game Loop
//!
//! A small simulation collaborator for the tick scheduler: reads player
//! commands from inbound mailboxes, drives tanks and shells, and publishes
//! snapshots through the broadcaster.

use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info};

use crate::game::command::PlayerCommand;
use crate::game::entities::{Shell, Tank, TankStatus};
use crate::game::state::ArenaState;
use crate::network::fanout::Broadcaster;
use crate::network::route::{ClientId, Role};
use crate::network::session::Session;
use crate::scheduler::tick::GameLoop;

/// Tunables for the arena simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaSettings {
    /// Map width in pixels.
    pub map_width: f64,
    /// Map height in pixels.
    pub map_height: f64,
    /// Tank speed in pixels per second.
    pub tank_speed: f64,
    /// Shell speed in pixels per second.
    pub shell_speed: f64,
    /// Minimum seconds between shots.
    pub reload_secs: f64,
    /// Hit radius around a tank's centre.
    pub tank_radius: f64,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            map_width: 500.0,
            map_height: 500.0,
            tank_speed: 25.0,
            shell_speed: 150.0,
            reload_secs: 1.0,
            tank_radius: 10.0,
        }
    }
}

/// The arena simulation.
pub struct Arena {
    broadcaster: Broadcaster,
    names: Vec<String>,
    settings: ArenaSettings,
    state: ArenaState,
    /// Player sessions that own a tank.
    roster: BTreeMap<ClientId, Arc<Session>>,
    rng: StdRng,
}

impl Arena {
    /// Create an arena publishing through `broadcaster`.
    pub fn new(broadcaster: Broadcaster, names: Vec<String>, settings: ArenaSettings) -> Self {
        Self::with_rng(broadcaster, names, settings, StdRng::from_entropy())
    }

    /// [`Arena::new`] with a fixed spawn generator.
    pub fn with_rng(
        broadcaster: Broadcaster,
        names: Vec<String>,
        settings: ArenaSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            broadcaster,
            names,
            settings,
            state: ArenaState::new(),
            roster: BTreeMap::new(),
            rng,
        }
    }

    /// Current world state.
    pub fn state(&self) -> &ArenaState {
        &self.state
    }

    /// Mutable world state, for seeding walls and tests.
    pub fn state_mut(&mut self) -> &mut ArenaState {
        &mut self.state
    }

    fn spawn_tank(&mut self) -> Tank {
        let r = self.settings.tank_radius;
        let x = self.rng.gen_range(r..=(self.settings.map_width - r).max(r));
        let y = self.rng.gen_range(r..=(self.settings.map_height - r).max(r));
        let heading = self.rng.gen_range(0.0..TAU);

        let mut tank = Tank::new(x, y, heading, self.settings.reload_secs);
        tank.status = TankStatus::Alive;
        tank
    }

    /// Match tanks to the players currently registered.
    fn sync_roster(&mut self) {
        let registry = self.broadcaster.registry().clone();
        let live = registry.sessions_of_role(Role::Player);

        // A reused identity belongs to a new session and gets a fresh tank.
        self.roster
            .retain(|_, known| live.iter().any(|s| Arc::ptr_eq(s, known)));
        let roster = &self.roster;
        self.state.tanks.retain(|id, _| roster.contains_key(id));

        for session in live {
            if !self.roster.contains_key(&session.id()) {
                let tank = self.spawn_tank();
                debug!("Spawned tank for player {} at ({:.1}, {:.1})", session.id(), tank.x, tank.y);
                self.state.tanks.insert(session.id(), tank);
                self.roster.insert(session.id(), session);
            }
        }

        // Viewers have nothing to say.
        for viewer in registry.sessions_of_role(Role::Viewer) {
            viewer.mailbox().drain_inbound();
        }
    }

    /// Apply queued player commands in arrival order.
    fn process_inbound(&mut self) {
        let sessions: Vec<_> = self.roster.values().cloned().collect();
        for session in sessions {
            let id = session.id();
            for text in session.mailbox().drain_inbound() {
                let outcome = PlayerCommand::from_json(&text)
                    .map_err(|_| "malformed command")
                    .and_then(|command| self.apply(id, command));

                if let Err(reason) = outcome {
                    self.broadcaster.registry().evict_session(&session, reason);
                    self.roster.remove(&id);
                    self.state.tanks.remove(&id);
                    break;
                }
            }
        }
    }

    fn apply(&mut self, id: ClientId, command: PlayerCommand) -> Result<(), &'static str> {
        let reload = self.settings.reload_secs;
        let Some(tank) = self.state.tanks.get_mut(&id) else {
            return Ok(());
        };
        if !tank.is_alive() {
            return Ok(());
        }

        match command {
            PlayerCommand::Go => tank.moving = true,
            PlayerCommand::Stop => tank.moving = false,
            PlayerCommand::Turn { heading } => {
                if !heading.is_finite() {
                    return Err("non-finite heading");
                }
                tank.heading = heading;
            }
            PlayerCommand::Fire { heading } => {
                if !heading.is_finite() {
                    return Err("non-finite heading");
                }
                if !tank.can_shoot(reload) {
                    return Err("fired before reloading");
                }
                tank.did_shoot();
                let shell = Shell::new(id, tank, heading);
                self.state.shells.push(shell);
            }
        }
        Ok(())
    }

    fn move_entities(&mut self, delta: f64) {
        let (w, h) = (self.settings.map_width, self.settings.map_height);

        let step = self.settings.tank_speed * delta;
        for tank in self.state.tanks.values_mut().filter(|t| t.is_alive() && t.moving) {
            tank.advance(step);
            tank.x = tank.x.clamp(0.0, w);
            tank.y = tank.y.clamp(0.0, h);
        }

        let step = self.settings.shell_speed * delta;
        for shell in &mut self.state.shells {
            shell.advance(step);
        }

        let walls = &self.state.walls;
        self.state.shells.retain(|s| {
            (0.0..=w).contains(&s.x)
                && (0.0..=h).contains(&s.y)
                && !walls.iter().any(|wall| wall.contains(s.x, s.y))
        });
    }

    fn resolve_hits(&mut self) {
        let radius = self.settings.tank_radius;
        let tanks = &self.state.tanks;
        let mut hits: Vec<(ClientId, ClientId)> = Vec::new();

        self.state.shells.retain(|shell| {
            let victim = tanks.iter().find(|(id, tank)| {
                **id != shell.shooter_id
                    && tank.is_alive()
                    && !hits.iter().any(|(_, v)| v == *id)
                    && (tank.x - shell.x).hypot(tank.y - shell.y) <= radius
            });
            match victim {
                Some((id, _)) => {
                    hits.push((shell.shooter_id, *id));
                    false
                }
                None => true,
            }
        });

        for (shooter, victim) in hits {
            if let Some(tank) = self.state.tanks.get_mut(&victim) {
                tank.status = TankStatus::Dead;
                tank.moving = false;
            }
            if let Some(tank) = self.state.tanks.get_mut(&shooter) {
                tank.kills += 1;
            }
            debug!("Player {} hit player {}", shooter, victim);
        }
    }

    /// With two or more tanks and at most one left alive, score the round
    /// and start the next one.
    fn check_round_end(&mut self) {
        if self.state.tanks.len() < 2 {
            return;
        }
        let mut alive = self.state.tanks.iter().filter(|(_, t)| t.is_alive());
        let survivor = alive.next().map(|(id, _)| *id);
        if alive.next().is_some() {
            return;
        }

        if let Some(winner) = survivor.and_then(|id| self.state.tanks.get_mut(&id)) {
            winner.wins += 1;
        }
        info!("Round over, winner: {:?}", survivor);

        self.state.shells.clear();
        let ids: Vec<ClientId> = self.state.tanks.keys().copied().collect();
        for id in ids {
            let fresh = self.spawn_tank();
            if let Some(tank) = self.state.tanks.get_mut(&id) {
                let wins = tank.wins;
                *tank = fresh;
                tank.wins = wins;
            }
        }
    }

    /// Send the full state to viewers and a clean view to each player.
    fn publish(&self) {
        let registry = self.broadcaster.registry();

        if registry.count_of_role(Role::Viewer) > 0 {
            match serde_json::to_string(&self.state.snapshot(&self.names, false)) {
                Ok(json) => {
                    self.broadcaster.send(Role::Viewer, &json);
                }
                Err(e) => error!("Failed to serialize viewer state: {}", e),
            }
        }

        for id in self.roster.keys() {
            match serde_json::to_string(&self.state.player_view(*id)) {
                Ok(json) => {
                    self.broadcaster.send(*id, &json);
                }
                Err(e) => error!("Failed to serialize state for player {}: {}", id, e),
            }
        }
    }
}

impl GameLoop for Arena {
    fn on_frame(&mut self, delta: f64) {
        self.sync_roster();
        self.process_inbound();
        self.move_entities(delta);
        self.resolve_hits();
        self.check_round_end();
    }

    fn on_update(&mut self) {
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Wall;
    use crate::network::session::SessionRegistry;

    fn setup() -> (Arc<SessionRegistry>, Arena) {
        let registry = Arc::new(SessionRegistry::new());
        let arena = Arena::with_rng(
            Broadcaster::new(registry.clone()),
            vec!["Alpha".into(), "Bravo".into(), "Charlie".into()],
            ArenaSettings::default(),
            StdRng::seed_from_u64(1),
        );
        (registry, arena)
    }

    fn join(registry: &SessionRegistry, id: ClientId, role: Role) -> Arc<Session> {
        let session = Arc::new(Session::new(id, role, None));
        registry.register(session.clone()).unwrap();
        session
    }

    #[test]
    fn test_tank_follows_registration() {
        let (registry, mut arena) = setup();
        join(&registry, 0, Role::Player);
        join(&registry, 1000, Role::Viewer);

        arena.on_frame(0.0);
        assert_eq!(arena.state().tanks.len(), 1);
        assert!(arena.state().tanks[&0].is_alive());

        registry.remove(0);
        arena.on_frame(0.0);
        assert!(arena.state().tanks.is_empty());
    }

    #[test]
    fn test_reused_identity_gets_new_tank() {
        let (registry, mut arena) = setup();
        join(&registry, 1, Role::Player);
        arena.on_frame(0.0);
        arena.state_mut().tanks.get_mut(&1).unwrap().kills = 4;

        registry.remove(1);
        join(&registry, 1, Role::Player);
        arena.on_frame(0.0);
        assert_eq!(arena.state().tanks[&1].kills, 0);
    }

    #[test]
    fn test_commands_drive_tank() {
        let (registry, mut arena) = setup();
        let player = join(&registry, 0, Role::Player);
        arena.on_frame(0.0);
        {
            let tank = arena.state_mut().tanks.get_mut(&0).unwrap();
            tank.x = 100.0;
            tank.y = 100.0;
        }

        player.mailbox().push_inbound(r#"{"action":"turn","heading":0.0}"#);
        player.mailbox().push_inbound(r#"{"action":"go"}"#);
        arena.on_frame(1.0);

        let tank = &arena.state().tanks[&0];
        assert!(tank.moving);
        assert!((tank.x - 125.0).abs() < 1e-9);
        assert!((tank.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_command_evicts() {
        let (registry, mut arena) = setup();
        let player = join(&registry, 2, Role::Player);
        arena.on_frame(0.0);

        player.mailbox().push_inbound("not json");
        arena.on_frame(0.0);

        assert!(!registry.contains(2));
        assert!(player.is_closed());
        assert!(arena.state().tanks.is_empty());
    }

    #[test]
    fn test_eviction_spares_reconnected_client() {
        let (registry, mut arena) = setup();
        let old = join(&registry, 3, Role::Player);
        arena.on_frame(0.0);

        // The old client leaves a bad message behind and its identity is
        // handed to someone else before the arena looks at it.
        old.mailbox().push_inbound("not json");
        registry.remove(3);
        let new = join(&registry, 3, Role::Player);
        arena.process_inbound();

        assert!(registry.is_registered(&new));
        assert!(!new.is_closed());
    }

    #[test]
    fn test_firing_too_fast_evicts() {
        let (registry, mut arena) = setup();
        let player = join(&registry, 0, Role::Player);
        arena.on_frame(0.0);

        player.mailbox().push_inbound(r#"{"action":"fire","heading":0.0}"#);
        arena.on_frame(0.0);
        assert!(registry.contains(0));
        assert_eq!(arena.state().shells.len(), 1);

        player.mailbox().push_inbound(r#"{"action":"fire","heading":0.0}"#);
        arena.on_frame(0.0);
        assert!(!registry.contains(0));
    }

    #[test]
    fn test_shell_hit_ends_round() {
        let (registry, mut arena) = setup();
        join(&registry, 0, Role::Player);
        join(&registry, 1, Role::Player);
        arena.on_frame(0.0);

        {
            let state = arena.state_mut();
            let shooter = state.tanks.get_mut(&0).unwrap();
            shooter.x = 100.0;
            shooter.y = 100.0;
            let victim = state.tanks.get_mut(&1).unwrap();
            victim.x = 130.0;
            victim.y = 100.0;
        }
        let shell = Shell::new(0, &arena.state().tanks[&0], 0.0);
        arena.state_mut().shells.push(shell);

        // 0.2s at 150px/s puts the shell on the victim.
        arena.on_frame(0.2);

        let state = arena.state();
        assert_eq!(state.tanks[&0].wins, 1);
        assert_eq!(state.tanks[&0].kills, 0, "kills reset for the new round");
        assert!(state.tanks.values().all(|t| t.is_alive()));
        assert!(state.shells.is_empty());
    }

    #[test]
    fn test_shells_stop_at_walls_and_edges() {
        let (_registry, mut arena) = setup();
        arena.state_mut().walls.push(Wall::new(200.0, 0.0, 10.0, 500.0));

        let tank = Tank::new(190.0, 50.0, 0.0, 1.0);
        arena.state_mut().shells.push(Shell::new(9, &tank, 0.0));
        let tank = Tank::new(5.0, 50.0, 0.0, 1.0);
        arena.state_mut().shells.push(Shell::new(9, &tank, std::f64::consts::PI));

        arena.on_frame(0.1);
        assert!(arena.state().shells.is_empty());
    }

    #[test]
    fn test_publish_full_to_viewers_clean_to_players() {
        let (registry, mut arena) = setup();
        let player = join(&registry, 0, Role::Player);
        let viewer = join(&registry, 1000, Role::Viewer);
        arena.on_frame(0.0);
        arena.state_mut().tanks.get_mut(&0).unwrap().wins = 3;

        arena.on_update();

        let to_viewer: serde_json::Value =
            serde_json::from_str(&viewer.mailbox().pop_outbound().unwrap()).unwrap();
        assert_eq!(to_viewer["tanks"][0]["wins"], 3);
        assert_eq!(to_viewer["tanks"][0]["name"], "Alpha");

        let to_player: serde_json::Value =
            serde_json::from_str(&player.mailbox().pop_outbound().unwrap()).unwrap();
        assert!(to_player["my_tank"].get("wins").is_none());
        assert!(to_player["my_tank"].get("kills").is_none());
    }
}
