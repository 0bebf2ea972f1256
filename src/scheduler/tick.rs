//! Tick Scheduler
//!
//! The shared heartbeat. Every iteration measures the frame delta, lets the
//! pacer correct the delay, runs the per-frame hook, runs the broadcast hook
//! when its interval has accumulated, and then sleeps so the transport
//! pumps get to run.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::scheduler::pacer::{FramePacer, InvalidRate, RateMeter, UpdateTimer};

/// Game logic driven by the scheduler.
///
/// Both hooks run on the scheduler task and must not block.
pub trait GameLoop {
    /// Advance the simulation by `delta` seconds. Called every tick.
    fn on_frame(&mut self, delta: f64);

    /// Publish world state. Called at the broadcast rate.
    fn on_update(&mut self);
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Target simulation rate.
    pub frames_per_second: u32,
    /// Target broadcast rate.
    pub updates_per_second: u32,
    /// Log the measured frame rate every few seconds.
    pub log_rate: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 60,
            updates_per_second: 15,
            log_rate: true,
        }
    }
}

/// A collaborator hook that misbehaved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StarvedLoop {
    /// The hook panicked.
    #[error("{hook} panicked: {message}")]
    Panicked {
        /// Which hook.
        hook: &'static str,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The hook ran longer than one ideal frame.
    #[error("{hook} took {elapsed:?}, frame budget is {budget:?}")]
    Overran {
        /// Which hook.
        hook: &'static str,
        /// How long it ran.
        elapsed: Duration,
        /// Ideal frame duration.
        budget: Duration,
    },
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a hook, containing panics and flagging overruns. Returns whether the
/// hook faulted.
fn guard(budget: Duration, hook: &'static str, f: impl FnOnce()) -> bool {
    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(f));
    let elapsed = started.elapsed();

    let fault = match outcome {
        Err(payload) => StarvedLoop::Panicked {
            hook,
            message: panic_message(payload.as_ref()),
        },
        Ok(()) if elapsed > budget => StarvedLoop::Overran {
            hook,
            elapsed,
            budget,
        },
        Ok(()) => return false,
    };

    match fault {
        StarvedLoop::Panicked { .. } => error!("Starved loop: {}", fault),
        StarvedLoop::Overran { .. } => warn!("Starved loop: {}", fault),
    }
    true
}

/// Drives a [`GameLoop`] at an adaptively paced frame rate.
pub struct TickScheduler<G> {
    game: G,
    pacer: FramePacer,
    updates: UpdateTimer,
    rate: Option<RateMeter>,
    budget: Duration,
    last_frame: Instant,
    frames: u64,
    faults: u64,
}

impl<G: GameLoop> TickScheduler<G> {
    /// Create a scheduler. Fails on a zero rate.
    pub fn new(game: G, config: SchedulerConfig) -> Result<Self, InvalidRate> {
        let now = Instant::now();
        let pacer = FramePacer::new(f64::from(config.frames_per_second))?;
        let updates = UpdateTimer::new(f64::from(config.updates_per_second))?;
        Ok(Self {
            game,
            budget: Duration::from_secs_f64(pacer.base_delay()),
            pacer,
            updates,
            rate: config.log_rate.then(|| RateMeter::new(RateMeter::PERIOD, now)),
            last_frame: now,
            frames: 0,
            faults: 0,
        })
    }

    /// The driven game logic.
    pub fn game(&self) -> &G {
        &self.game
    }

    /// The frame pacer.
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Iterations run so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Hook faults caught so far.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Run one iteration using wall-clock time since the previous one.
    pub fn step(&mut self) -> Duration {
        let now = Instant::now();
        let frame_delta = now.duration_since(self.last_frame).as_secs_f64();
        self.last_frame = now;
        self.advance(frame_delta)
    }

    /// Run one iteration with an explicit frame delta. Returns the delay to
    /// sleep before the next iteration.
    pub fn advance(&mut self, frame_delta: f64) -> Duration {
        let delay = self.pacer.record(frame_delta);
        self.frames += 1;

        if let Some(rate) = self.rate.as_mut() {
            if let Some(fps) = rate.frame(Instant::now()) {
                info!("FPS: {}", fps);
            }
        }

        let game = &mut self.game;
        let mut faults = guard(self.budget, "on_frame", || game.on_frame(frame_delta)) as u64;

        if self.updates.advance(frame_delta) {
            let game = &mut self.game;
            faults += guard(self.budget, "on_update", || game.on_update()) as u64;
        }

        self.faults += faults;
        delay
    }

    /// Tick until `shutdown` fires, then hand the game logic back.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> G {
        self.last_frame = Instant::now();
        loop {
            let delay = self.step();

            // Sleeping is what lets the client pumps run.
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Tick scheduler stopping after {} frames", self.frames);
                    break;
                }
            }
        }
        self.game
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<f64>,
        updates: u32,
        panic_on_frame: bool,
    }

    impl GameLoop for Recorder {
        fn on_frame(&mut self, delta: f64) {
            if self.panic_on_frame {
                panic!("bad tick");
            }
            self.frames.push(delta);
        }

        fn on_update(&mut self) {
            self.updates += 1;
        }
    }

    fn config(fps: u32, ups: u32) -> SchedulerConfig {
        SchedulerConfig {
            frames_per_second: fps,
            updates_per_second: ups,
            log_rate: false,
        }
    }

    #[test]
    fn test_frame_hook_every_tick() {
        let mut scheduler = TickScheduler::new(Recorder::default(), config(64, 8)).unwrap();
        for _ in 0..10 {
            scheduler.advance(1.0 / 64.0);
        }
        assert_eq!(scheduler.game().frames.len(), 10);
        assert_eq!(scheduler.frames(), 10);
    }

    #[test]
    fn test_update_hook_at_broadcast_rate() {
        let mut scheduler = TickScheduler::new(Recorder::default(), config(64, 8)).unwrap();
        for _ in 0..65 {
            scheduler.advance(1.0 / 64.0);
        }
        // Immediate first update plus eight over the following second.
        assert_eq!(scheduler.game().updates, 9);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let recorder = Recorder {
            panic_on_frame: true,
            ..Default::default()
        };
        let mut scheduler = TickScheduler::new(recorder, config(60, 15)).unwrap();

        scheduler.advance(1.0 / 60.0);
        scheduler.advance(1.0 / 60.0);

        assert_eq!(scheduler.frames(), 2);
        assert!(scheduler.faults() >= 2);
        // The update hook still ran after the frame hook panicked.
        assert!(scheduler.game().updates >= 1);
    }

    #[test]
    fn test_steady_rate_keeps_delay() {
        let mut scheduler = TickScheduler::new(Recorder::default(), config(60, 15)).unwrap();
        let start = scheduler.pacer().delay();
        for _ in 0..50 {
            scheduler.advance(1.0 / 60.0);
        }
        assert_eq!(scheduler.pacer().delay(), start);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(TickScheduler::new(Recorder::default(), config(0, 15)).is_err());
        let err = TickScheduler::new(Recorder::default(), config(60, 0)).err().unwrap();
        assert_eq!(err.name, "updates_per_second");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[tokio::test]
    async fn test_run_yields_and_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler = TickScheduler::new(Recorder::default(), config(100, 10)).unwrap();

        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        // A sibling task makes progress while the scheduler runs.
        let sibling = tokio::spawn(async { tokio::time::sleep(Duration::from_millis(100)).await });
        sibling.await.unwrap();

        shutdown_tx.send(()).unwrap();
        let game = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!game.frames.is_empty());
        assert!(game.updates >= 1);
    }
}
