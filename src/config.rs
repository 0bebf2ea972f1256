//! Server Configuration
//!
//! Defaults match the classic pyTanks setup. Environment variables overlay
//! the defaults; command-line flags in the binary overlay both.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::arena::ArenaSettings;
use crate::network::admission::VIEWER_ID_RANGE;
use crate::network::route::RouteTable;
use crate::scheduler::tick::SchedulerConfig;

/// Highest accepted verbosity tier.
pub const MAX_LOG_LEVEL: u8 = 3;

/// Default tank names. A player's identity indexes this table.
pub const DEFAULT_TANK_NAMES: &[&str] = &[
    "Abrams", "Badger", "Centurion", "Drake", "Excelsior", "Ferdinand", "Grizzly", "Hellcat",
    "Ironclad", "Jackal", "Kodiak", "Leopard", "Mammoth", "Nashorn", "Osprey", "Panther",
];

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// A frame or broadcast rate of zero.
    #[error("{0} must be greater than zero")]
    ZeroRate(&'static str),

    /// Verbosity above the highest tier.
    #[error("Log level {0} is out of range (0-3)")]
    LogLevel(u8),

    /// No tank names, so no player can ever be admitted.
    #[error("Tank name table is empty")]
    EmptyNameTable,

    /// Player identities would overlap the viewer range.
    #[error("At most {max} tank names are supported, got {got}")]
    TooManyNames {
        /// Limit.
        max: usize,
        /// Configured count.
        got: usize,
    },

    /// Viewer and player share a path.
    #[error("Viewer and player paths must differ (both {0:?})")]
    DuplicateRoute(String),

    /// A non-positive or non-finite arena value.
    #[error("{0} must be a positive number")]
    Arena(&'static str),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket server listens on.
    pub bind_addr: SocketAddr,
    /// Target simulation frame rate.
    pub frames_per_second: u32,
    /// Snapshot broadcasts per second.
    pub updates_per_second: u32,
    /// 0 silent, 1 FPS and connects, 2 server status, 3 everything.
    pub log_level: u8,
    /// Connection paths.
    pub routes: RouteTable,
    /// Tank names; its length is the number of player slots.
    pub tank_names: Vec<String>,
    /// Simulation tunables.
    pub arena: ArenaSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5678)),
            frames_per_second: 60,
            updates_per_second: 15,
            log_level: 1,
            routes: RouteTable::default(),
            tank_names: DEFAULT_TANK_NAMES.iter().map(|s| s.to_string()).collect(),
            arena: ArenaSettings::default(),
        }
    }
}

fn overlay<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}

impl ServerConfig {
    /// Defaults overlaid with `TANK_ARENA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        overlay(&lookup, "TANK_ARENA_BIND", &mut config.bind_addr)?;
        overlay(&lookup, "TANK_ARENA_FPS", &mut config.frames_per_second)?;
        overlay(&lookup, "TANK_ARENA_UPS", &mut config.updates_per_second)?;
        overlay(&lookup, "TANK_ARENA_LOG_LEVEL", &mut config.log_level)?;
        overlay(&lookup, "TANK_ARENA_VIEWER_PATH", &mut config.routes.viewer)?;
        overlay(&lookup, "TANK_ARENA_PLAYER_PATH", &mut config.routes.player)?;
        overlay(&lookup, "TANK_ARENA_MAP_WIDTH", &mut config.arena.map_width)?;
        overlay(&lookup, "TANK_ARENA_MAP_HEIGHT", &mut config.arena.map_height)?;
        overlay(&lookup, "TANK_ARENA_TANK_SPEED", &mut config.arena.tank_speed)?;
        overlay(&lookup, "TANK_ARENA_SHELL_SPEED", &mut config.arena.shell_speed)?;
        overlay(&lookup, "TANK_ARENA_RELOAD_SECS", &mut config.arena.reload_secs)?;

        if let Some(names) = lookup("TANK_ARENA_TANK_NAMES") {
            config.tank_names = names
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_per_second == 0 {
            return Err(ConfigError::ZeroRate("frames_per_second"));
        }
        if self.updates_per_second == 0 {
            return Err(ConfigError::ZeroRate("updates_per_second"));
        }
        if self.log_level > MAX_LOG_LEVEL {
            return Err(ConfigError::LogLevel(self.log_level));
        }

        let max = *VIEWER_ID_RANGE.start() as usize;
        if self.tank_names.is_empty() {
            return Err(ConfigError::EmptyNameTable);
        }
        if self.tank_names.len() > max {
            return Err(ConfigError::TooManyNames {
                max,
                got: self.tank_names.len(),
            });
        }

        if self.routes.viewer == self.routes.player {
            return Err(ConfigError::DuplicateRoute(self.routes.viewer.clone()));
        }

        let arena = &self.arena;
        let positive = [
            ("map_width", arena.map_width),
            ("map_height", arena.map_height),
            ("tank_speed", arena.tank_speed),
            ("shell_speed", arena.shell_speed),
            ("reload_secs", arena.reload_secs),
            ("tank_radius", arena.tank_radius),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(ConfigError::Arena(name));
        }

        Ok(())
    }

    /// Number of player identities.
    pub fn player_slots(&self) -> u32 {
        self.tank_names.len() as u32
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            frames_per_second: self.frames_per_second,
            updates_per_second: self.updates_per_second,
            log_rate: self.log_level >= 1,
        }
    }
}
