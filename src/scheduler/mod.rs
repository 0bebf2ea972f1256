//! Tick Scheduling
//!
//! The adaptive frame pacer and the scheduler loop that drives the game
//! collaborators.

pub mod pacer;
pub mod tick;

pub use pacer::{FramePacer, InvalidRate, RateMeter, UpdateTimer, MIN_DELAY_SECS, WINDOW_LEN};
pub use tick::{GameLoop, SchedulerConfig, StarvedLoop, TickScheduler};
