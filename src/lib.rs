//! # Tank Arena Server
//!
//! Real-time session and tick-scheduling server for a multiplayer tank
//! arena. Viewers and players connect over WebSocket; an adaptive clock
//! drives the simulation and broadcasts world snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TANK ARENA SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  network/        - Connections (one task pair per client)    │
//! │  ├── admission.rs- Handshake, path routing, identities       │
//! │  ├── session.rs  - Session registry                          │
//! │  ├── mailbox.rs  - Inbound/outbound FIFO queues              │
//! │  ├── pump.rs     - Socket <-> mailbox transfer loops         │
//! │  ├── fanout.rs   - Send to one client or a whole role        │
//! │  └── server.rs   - Listener, scheduler task, shutdown        │
//! │                                                              │
//! │  scheduler/      - Simulation clock                          │
//! │  ├── pacer.rs    - Self-correcting frame delay               │
//! │  └── tick.rs     - Frame and broadcast hooks                 │
//! │                                                              │
//! │  game/           - Arena collaborator                        │
//! │  ├── entities.rs - Tanks, shells, walls                      │
//! │  ├── state.rs    - World state and snapshots                 │
//! │  ├── command.rs  - Player commands                           │
//! │  └── arena.rs    - GameLoop implementation                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! The scheduler and the client pumps share one Tokio runtime. Scheduler
//! hooks only append to mailboxes and never await, and the scheduler sleeps
//! every iteration, so a slow socket can never stall the simulation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod game;
pub mod logging;
pub mod network;
pub mod scheduler;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use game::{Arena, ArenaSettings};
pub use network::{Broadcaster, ClientId, GameServer, Role, ServerError, SessionRegistry};
pub use scheduler::{GameLoop, SchedulerConfig, TickScheduler};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
