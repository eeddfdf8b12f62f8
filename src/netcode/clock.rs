//! Command Frame Clock
//!
//! Fixed-step accumulator. Wall-clock time goes in, whole command frames come
//! out; the fraction left over is the render interpolation alpha.

use std::time::Duration;

use crate::config::SimulationConfig;

/// Accumulator that converts elapsed time into whole command frames.
#[derive(Debug, Clone)]
pub struct CommandFrameClock {
    frame_duration: Duration,
    max_timestep: Duration,
    accumulator: Duration,
    frame: u64,
}

impl CommandFrameClock {
    /// Clock ticking every `frame_duration`, never catching up more than
    /// `max_timestep` per advance.
    pub fn new(frame_duration: Duration, max_timestep: Duration) -> Self {
        Self {
            frame_duration: frame_duration.max(Duration::from_millis(1)),
            max_timestep,
            accumulator: Duration::ZERO,
            frame: 0,
        }
    }

    /// Clock from the configured frame duration and clamp.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.command_frame_duration(), config.max_timestep())
    }

    /// Add elapsed wall-clock time and return how many frames are due.
    ///
    /// Elapsed time beyond the max timestep is discarded, so a long stall
    /// does not turn into a burst of catch-up frames.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed.min(self.max_timestep);

        let mut due = 0;
        while self.accumulator >= self.frame_duration {
            self.accumulator -= self.frame_duration;
            self.frame += 1;
            due += 1;
        }
        due
    }

    /// Frames completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Fraction of the next frame already accumulated, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.frame_duration.as_secs_f32()
    }

    /// Duration of one command frame.
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}
