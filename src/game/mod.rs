//! Game Logic Module
//!
//! The arena collaborator driven by the tick scheduler.
//!
//! ## Module Structure
//!
//! - `entities`: Tanks, shells, walls and tank snapshots
//! - `state`: Arena state and the snapshot messages built from it
//! - `command`: Player command parsing
//! - `arena`: The `GameLoop` implementation

pub mod arena;
pub mod command;
pub mod entities;
pub mod state;

// Re-export key types
pub use arena::{Arena, ArenaSettings};
pub use command::PlayerCommand;
pub use entities::{Shell, Tank, TankSnapshot, TankStatus, Wall, RELOAD_MARGIN_SECS};
pub use state::{ArenaState, GameStateUpdate, PlayerStateUpdate, TankEntry};
