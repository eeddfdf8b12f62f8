//! Server Input Buffer
//!
//! Holds each player's inputs until a target global command frame, turning
//! bursty network delivery into one input per simulated frame.
//!
//! The first input from a player is scheduled `size` frames after the global
//! frame it arrived on. Every later input is scheduled relative to the
//! previous one by the gap between their player frames (at least one), so
//! the spacing the client produced is preserved regardless of jitter.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::game::entity::PlayerId;
use crate::game::input::FrameInput;

/// Reasons an input is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    /// Arrived after a later frame from the same player.
    #[error("Out-of-order input from {player}: frame {frame} after {last_accepted}")]
    OutOfOrder {
        /// Sending player.
        player: PlayerId,
        /// Player frame of the refused input.
        frame: u64,
        /// Newest player frame already accepted.
        last_accepted: u64,
    },

    /// The server already simulated this player frame or a later one.
    #[error("Stale input from {player}: frame {frame} already confirmed through {last_confirmed}")]
    AlreadyConfirmed {
        /// Sending player.
        player: PlayerId,
        /// Player frame of the refused input.
        frame: u64,
        /// Newest player frame the server has applied.
        last_confirmed: u64,
    },
}

/// An input waiting for its release frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedInput {
    /// Sending player.
    pub player_id: PlayerId,
    /// The player's local command frame for this input.
    pub player_frame: u64,
    /// Global frame at or after which the input is released.
    pub target_global_frame: u64,
    /// The input itself.
    pub input: FrameInput,
    /// Wall-clock arrival time.
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PlayerQueue {
    inputs: VecDeque<BufferedInput>,
    last_player_frame: u64,
    last_target: u64,
    started: bool,
}

/// Per-player jitter buffer.
#[derive(Debug)]
pub struct InputBuffer {
    size: u64,
    players: BTreeMap<PlayerId, PlayerQueue>,
}

impl InputBuffer {
    /// Buffer adding `size` frames of latency.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            players: BTreeMap::new(),
        }
    }

    /// Frames of latency added to a player's first input.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Queue an input and return its target global frame.
    ///
    /// `last_confirmed_local_frame` is the newest player frame the server has
    /// applied for this player (0 if none).
    pub fn push_input(
        &mut self,
        global_frame: u64,
        player_frame: u64,
        last_confirmed_local_frame: u64,
        player_id: PlayerId,
        received_at: DateTime<Utc>,
        input: FrameInput,
    ) -> Result<u64, InputBufferError> {
        if last_confirmed_local_frame > 0 && player_frame <= last_confirmed_local_frame {
            return Err(InputBufferError::AlreadyConfirmed {
                player: player_id,
                frame: player_frame,
                last_confirmed: last_confirmed_local_frame,
            });
        }

        let size = self.size;
        let queue = self.players.entry(player_id).or_default();

        let target = if !queue.started {
            global_frame + size
        } else {
            if player_frame < queue.last_player_frame {
                return Err(InputBufferError::OutOfOrder {
                    player: player_id,
                    frame: player_frame,
                    last_accepted: queue.last_player_frame,
                });
            }
            let delta = player_frame - queue.last_player_frame;
            if delta == 0 {
                warn!(
                    player = %player_id,
                    frame = player_frame,
                    "Multiple inputs for one player frame"
                );
            }
            queue.last_target + delta.max(1)
        };

        queue.started = true;
        queue.last_player_frame = player_frame;
        queue.last_target = target;
        queue.inputs.push_back(BufferedInput {
            player_id,
            player_frame,
            target_global_frame: target,
            input,
            received_at,
        });

        Ok(target)
    }

    /// Release the oldest input due at `global_frame`, if any.
    ///
    /// `None` means hold the last known input; it is not an error.
    pub fn pull_input(&mut self, global_frame: u64, player_id: PlayerId) -> Option<BufferedInput> {
        let queue = self.players.get_mut(&player_id)?;
        if queue.inputs.front()?.target_global_frame <= global_frame {
            queue.inputs.pop_front()
        } else {
            None
        }
    }

    /// Inputs waiting for a player.
    pub fn pending(&self, player_id: PlayerId) -> usize {
        self.players.get(&player_id).map_or(0, |q| q.inputs.len())
    }

    /// Forget a player entirely.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.players.remove(&player_id);
    }
}
