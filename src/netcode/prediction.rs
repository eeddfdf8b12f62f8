//! Client-Side Prediction and Reconciliation
//!
//! The client simulates its own player immediately and records every frame.
//! When an authoritative update arrives, the matching local frame is looked
//! up and compared against the server's snapshot:
//!
//! ```text
//! lookup = last_input_frame + (current_global - last_input_global)
//!
//!   not in history  -> nothing to correct
//!   matches         -> hit, confirmed frames pruned
//!   differs         -> snap to snapshot, replay later inputs, prune
//! ```
//!
//! Replay re-runs the same step functions with the recorded inputs, so a
//! correct snapshot reproduces the predicted present exactly.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collision::resolve::{resolve_collisions, CollisionScope, ResolutionReport};
use crate::config::SimulationConfig;
use crate::game::entity::EntityId;
use crate::game::input::FrameInput;
use crate::game::snapshot::EntitySnapshot;
use crate::game::step::simulate_player;
use crate::game::world::{World, WorldError};
use crate::netcode::history::{CommandFrameHistory, CommandFrameRecord};

/// Frame bookkeeping carried by every authoritative update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReference {
    /// Newest local frame of this client's input the server has applied
    pub last_input_command_frame: u64,
    /// Global frame on which that input was applied
    pub last_input_global_command_frame: u64,
    /// Global frame the snapshot was taken on
    pub current_global_command_frame: u64,
}

impl FrameReference {
    /// Local frame the snapshot corresponds to.
    ///
    /// The last input keeps acting on every server frame after it was
    /// applied, so the gap in global frames carries over to local frames.
    pub fn lookup_frame(&self) -> u64 {
        self.last_input_command_frame
            + self
                .current_global_command_frame
                .saturating_sub(self.last_input_global_command_frame)
    }
}

/// What reconciling one snapshot did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No history for the lookup window; nothing corrected.
    Unmatched {
        /// Frame that was looked up
        lookup_frame: u64,
    },
    /// Prediction agreed with the server.
    Hit {
        /// Confirmed local frame
        frame: u64,
    },
    /// Prediction diverged; state was rewound and replayed.
    Rollback {
        /// Local frame the snapshot was applied to
        frame: u64,
        /// Snapshot position minus predicted position
        correction: Vec3,
        /// Frames re-simulated after `frame`
        replayed: usize,
    },
}

impl Reconciliation {
    /// Whether a rollback happened.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Reconciliation::Rollback { .. })
    }
}

/// Simulate one predicted frame for the local player and record it.
///
/// Only collisions involving `entity` are resolved; remote entities are
/// driven by interpolation, not by local simulation.
pub fn predict_frame(
    world: &mut World,
    history: &mut CommandFrameHistory,
    entity: EntityId,
    frame: u64,
    input: FrameInput,
    config: &SimulationConfig,
) -> Result<ResolutionReport, WorldError> {
    simulate_player(world, entity, &input, config)?;
    let report = resolve_collisions(world, CollisionScope::Only(entity), config);
    history.record(CommandFrameRecord::capture(world, entity, frame, input)?);
    Ok(report)
}

/// Compare an authoritative snapshot of the local player against history and
/// correct the prediction if needed.
///
/// Frames `lookup - history_lookup_tolerance ..= lookup` are tried newest
/// first, which tolerates the server running slightly ahead.
pub fn reconcile(
    world: &mut World,
    history: &mut CommandFrameHistory,
    entity: EntityId,
    reference: FrameReference,
    snapshot: &EntitySnapshot,
    config: &SimulationConfig,
) -> Result<Reconciliation, WorldError> {
    let lookup_frame = reference.lookup_frame();

    // Server has not applied any of our inputs yet
    if reference.last_input_command_frame == 0 {
        return Ok(Reconciliation::Unmatched { lookup_frame });
    }

    let Some(frame) = find_frame(history, lookup_frame, config.history_lookup_tolerance) else {
        return Ok(Reconciliation::Unmatched { lookup_frame });
    };

    let (position, orientation) = match history.get(frame) {
        Some(record) => (record.position, record.orientation),
        None => return Ok(Reconciliation::Unmatched { lookup_frame }),
    };

    if snapshot.transform_matches(
        position,
        orientation,
        config.prediction_epsilon,
        config.prediction_orientation_epsilon,
    ) {
        history.clear_through(frame);
        return Ok(Reconciliation::Hit { frame });
    }

    let correction = snapshot.position - position;
    debug!(
        entity = %entity,
        frame,
        lookup_frame,
        dx = correction.x,
        dy = correction.y,
        dz = correction.z,
        "Misprediction, rolling back"
    );

    let replayed = replay_from(world, history, entity, frame, snapshot, config)?;
    history.clear_through(frame);

    Ok(Reconciliation::Rollback {
        frame,
        correction,
        replayed,
    })
}

/// Snap `entity` to `snapshot` as of `frame`, then re-simulate every
/// recorded frame after it, overwriting the records. Returns the number of
/// frames replayed.
pub fn replay_from(
    world: &mut World,
    history: &mut CommandFrameHistory,
    entity: EntityId,
    frame: u64,
    snapshot: &EntitySnapshot,
    config: &SimulationConfig,
) -> Result<usize, WorldError> {
    world.apply_snapshot(snapshot);

    let input = history.get(frame).map(|r| r.input).unwrap_or_default();
    history.record(CommandFrameRecord::capture(world, entity, frame, input)?);

    let pending = history.inputs_after(frame);
    for (replay_frame, input) in &pending {
        predict_frame(world, history, entity, *replay_frame, *input, config)?;
    }

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(entity = %entity, frame, replayed = pending.len(), "Replay complete");

    Ok(pending.len())
}

fn find_frame(history: &CommandFrameHistory, lookup_frame: u64, tolerance: u64) -> Option<u64> {
    (0..=tolerance)
        .filter_map(|back| lookup_frame.checked_sub(back))
        .find(|frame| history.get(*frame).is_some())
}
