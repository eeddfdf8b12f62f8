//! Fixed-Step Loop Driver
//!
//! Runs a [`Simulation`] on a tokio interval. Elapsed time feeds a
//! [`CommandFrameClock`], which decides how many command frames are due, so
//! a late wake-up runs the missed frames (up to the max timestep) instead of
//! drifting. Shutdown is only observed between frames.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::netcode::clock::CommandFrameClock;

/// Whether the loop keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    /// Run the next frame
    Continue,
    /// Stop (disconnect, game over, frame limit)
    Stop,
}

/// Anything advanced one command frame at a time.
pub trait Simulation: Send {
    /// Run one command frame.
    fn step(&mut self) -> StepControl;

    /// Latest completed frame.
    fn frame(&self) -> u64;
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The simulation asked to stop
    Finished,
    /// The shutdown signal fired
    Shutdown,
}

/// Drive `simulation` at the clock's frame rate until it stops or
/// `shutdown` becomes `true`. Returns the exit reason and frames run.
pub async fn run_fixed_loop<S: Simulation + ?Sized>(
    simulation: &mut S,
    mut clock: CommandFrameClock,
    mut shutdown: watch::Receiver<bool>,
) -> (LoopExit, u64) {
    let mut ticker = interval(clock.frame_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut frames = 0;
    let mut last = Instant::now();
    let mut watching = true;

    // First frame runs immediately
    let mut due = 1;

    loop {
        if *shutdown.borrow() {
            info!(frames, "Loop shut down");
            return (LoopExit::Shutdown, frames);
        }

        for _ in 0..due {
            frames += 1;
            if simulation.step() == StepControl::Stop {
                debug!(frames, frame = simulation.frame(), "Simulation finished");
                return (LoopExit::Finished, frames);
            }
        }

        if watching {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        watching = false;
                    }
                }
            }
        } else {
            ticker.tick().await;
        }

        let now = Instant::now();
        due = clock.advance(now - last);
        last = now;
    }
}

/// Convenience for a fixed frame duration and max timestep.
pub fn clock_for(frame_duration: Duration, max_timestep: Duration) -> CommandFrameClock {
    CommandFrameClock::new(frame_duration, max_timestep)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        frames: u64,
        stop_at: u64,
    }

    impl Simulation for Counter {
        fn step(&mut self) -> StepControl {
            self.frames += 1;
            if self.stop_at > 0 && self.frames >= self.stop_at {
                StepControl::Stop
            } else {
                StepControl::Continue
            }
        }

        fn frame(&self) -> u64 {
            self.frames
        }
    }

    fn fast_clock() -> CommandFrameClock {
        clock_for(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_runs_until_finished() {
        let (_tx, rx) = watch::channel(false);
        let mut counter = Counter { frames: 0, stop_at: 5 };

        let (exit, frames) = run_fixed_loop(&mut counter, fast_clock(), rx).await;
        assert_eq!(exit, LoopExit::Finished);
        assert_eq!(frames, 5);
        assert_eq!(counter.frame(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut counter = Counter { frames: 0, stop_at: 0 };

        let (exit, frames) = run_fixed_loop(&mut counter, fast_clock(), rx).await;
        assert_eq!(exit, LoopExit::Shutdown);
        assert_eq!(frames, 0);
    }

    #[tokio::test]
    async fn test_shutdown_between_frames() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut counter = Counter { frames: 0, stop_at: 0 };
            let result = run_fixed_loop(&mut counter, fast_clock(), rx).await;
            (result, counter.frames)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let ((exit, frames), counted) = handle.await.unwrap();
        assert_eq!(exit, LoopExit::Shutdown);
        assert!(frames > 0);
        assert_eq!(frames, counted);
    }
}
