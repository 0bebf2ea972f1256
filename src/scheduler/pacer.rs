//! Frame Pacing
//!
//! Proportional controller that nudges the inter-frame delay until the
//! measured frame rate sits within 5% of the target, plus the two cadence
//! helpers the scheduler runs alongside it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of frame deltas averaged by the pacer.
pub const WINDOW_LEN: usize = 15;

/// Shortest delay ever slept between frames (250 notional fps).
pub const MIN_DELAY_SECS: f64 = 1.0 / 250.0;

/// Accepted deviation of the measured rate from the target.
pub const RATE_TOLERANCE: f64 = 0.05;

/// Fraction of the ideal frame time added or removed per correction.
pub const DELAY_STEP: f64 = 0.01;

/// A frame or broadcast rate that cannot drive the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("{name} must be a positive finite rate, got {value}")]
pub struct InvalidRate {
    /// Which rate.
    pub name: &'static str,
    /// The rejected value.
    pub value: f64,
}

fn check_rate(name: &'static str, value: f64) -> Result<f64, InvalidRate> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(InvalidRate { name, value })
    }
}

/// Adaptive inter-frame delay.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_fps: f64,
    /// Ideal frame duration in seconds.
    base_delay: f64,
    /// Current delay in seconds.
    delay: f64,
    deltas: VecDeque<f64>,
}

impl FramePacer {
    /// Create a pacer aiming at `target_fps` frames per second.
    pub fn new(target_fps: f64) -> Result<Self, InvalidRate> {
        let target_fps = check_rate("frames_per_second", target_fps)?;
        let base_delay = 1.0 / target_fps;
        Ok(Self {
            target_fps,
            base_delay,
            delay: base_delay.max(MIN_DELAY_SECS),
            deltas: VecDeque::with_capacity(WINDOW_LEN + 1),
        })
    }

    /// Record a measured frame delta and return the delay to sleep next.
    pub fn record(&mut self, frame_delta: f64) -> Duration {
        self.deltas.push_back(frame_delta);
        if self.deltas.len() > WINDOW_LEN {
            self.deltas.pop_front();
        }

        let ratio = self.average() * self.target_fps;
        if ratio < 1.0 - RATE_TOLERANCE {
            // Running fast.
            self.delay += self.base_delay * DELAY_STEP;
        } else if ratio > 1.0 + RATE_TOLERANCE {
            // Running slow.
            self.delay -= self.base_delay * DELAY_STEP;
        }

        if self.delay < MIN_DELAY_SECS {
            self.delay = MIN_DELAY_SECS;
        }

        self.delay_duration()
    }

    /// Mean of the recorded window, or zero before the first sample.
    pub fn average(&self) -> f64 {
        if self.deltas.is_empty() {
            return 0.0;
        }
        self.deltas.iter().sum::<f64>() / self.deltas.len() as f64
    }

    /// Current delay in seconds.
    pub fn delay(&self) -> f64 {
        self.delay
    }

    /// Current delay.
    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delay)
    }

    /// Ideal frame duration in seconds.
    pub fn base_delay(&self) -> f64 {
        self.base_delay
    }

    /// Number of samples currently in the window.
    pub fn samples(&self) -> usize {
        self.deltas.len()
    }
}

/// Accumulates frame time and fires once per broadcast interval.
#[derive(Debug, Clone)]
pub struct UpdateTimer {
    interval: f64,
    since_last: f64,
}

impl UpdateTimer {
    /// Fire `updates_per_second` times a second. The first call fires.
    pub fn new(updates_per_second: f64) -> Result<Self, InvalidRate> {
        let interval = 1.0 / check_rate("updates_per_second", updates_per_second)?;
        Ok(Self {
            interval,
            since_last: interval,
        })
    }

    /// Add elapsed time; returns `true` and resets when an update is due.
    pub fn advance(&mut self, frame_delta: f64) -> bool {
        self.since_last += frame_delta;
        if self.since_last >= self.interval {
            self.since_last = 0.0;
            true
        } else {
            false
        }
    }
}

/// Counts frames and reports the rate once per period.
#[derive(Debug, Clone)]
pub struct RateMeter {
    period: Duration,
    frames: u32,
    since: Instant,
}

impl RateMeter {
    /// Report period used by the server.
    pub const PERIOD: Duration = Duration::from_secs(5);

    /// Start measuring at `now`.
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            frames: 0,
            since: now,
        }
    }

    /// Count a frame. Returns frames per second when a period has elapsed.
    pub fn frame(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if now.duration_since(self.since) >= self.period {
            let fps = f64::from(self.frames) / self.period.as_secs_f64();
            self.frames = 0;
            self.since = now;
            Some(fps)
        } else {
            None
        }
    }
}
