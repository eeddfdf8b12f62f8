//! Command Frame History
//!
//! One record per locally simulated command frame: the input applied and the
//! local player's state after the frame. Reconciliation compares records
//! against authoritative snapshots and replays the inputs after a
//! misprediction.

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use tracing::warn;

use crate::game::components::{PhysicsComponent, ThirdPersonControllerComponent};
use crate::game::entity::EntityId;
use crate::game::input::FrameInput;
use crate::game::world::{World, WorldError};

/// Input and resulting state for one local command frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrameRecord {
    /// Local command frame
    pub frame: u64,
    /// Input applied on this frame
    pub input: FrameInput,
    /// Position after the frame
    pub position: Vec3,
    /// Orientation after the frame
    pub orientation: Quat,
    /// Controller state after the frame
    pub controller: ThirdPersonControllerComponent,
    /// Impulse state after the frame
    pub physics: Option<PhysicsComponent>,
}

impl CommandFrameRecord {
    /// Capture `entity`'s post-frame state from the world.
    pub fn capture(world: &World, entity: EntityId, frame: u64, input: FrameInput) -> Result<Self, WorldError> {
        let transform = world.transform(entity)?;
        let controller = *world.controller(entity)?;
        let physics = world.get(entity).and_then(|r| r.physics.clone());

        Ok(Self {
            frame,
            input,
            position: transform.position,
            orientation: transform.orientation,
            controller,
            physics,
        })
    }
}

/// Bounded, frame-ordered history of local command frames.
#[derive(Debug, Clone)]
pub struct CommandFrameHistory {
    records: VecDeque<CommandFrameRecord>,
    capacity: usize,
}

impl CommandFrameHistory {
    /// Empty history holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Store a record.
    ///
    /// A record for a frame already present overwrites it (replay). Records
    /// older than the newest frame that are not present are ignored. The
    /// oldest record is evicted once capacity is reached.
    pub fn record(&mut self, record: CommandFrameRecord) {
        if let Some(existing) = self.get_mut(record.frame) {
            *existing = record;
            return;
        }

        if let Some(latest) = self.latest_frame() {
            if record.frame < latest {
                warn!(frame = record.frame, latest, "Ignoring out-of-order history record");
                return;
            }
        }

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Record for `frame`, if held.
    pub fn get(&self, frame: u64) -> Option<&CommandFrameRecord> {
        let index = self.index_of(frame)?;
        self.records.get(index)
    }

    /// Mutable record for `frame`, if held.
    pub fn get_mut(&mut self, frame: u64) -> Option<&mut CommandFrameRecord> {
        let index = self.index_of(frame)?;
        self.records.get_mut(index)
    }

    fn index_of(&self, frame: u64) -> Option<usize> {
        self.records.binary_search_by_key(&frame, |r| r.frame).ok()
    }

    /// Drop every record up to and including `frame`.
    pub fn clear_through(&mut self, frame: u64) {
        while self.records.front().map_or(false, |r| r.frame <= frame) {
            self.records.pop_front();
        }
    }

    /// Frames and inputs recorded after `frame`, oldest first.
    pub fn inputs_after(&self, frame: u64) -> Vec<(u64, FrameInput)> {
        self.records
            .iter()
            .filter(|r| r.frame > frame)
            .map(|r| (r.frame, r.input))
            .collect()
    }

    /// Newest record.
    pub fn latest(&self) -> Option<&CommandFrameRecord> {
        self.records.back()
    }

    /// Newest recorded frame.
    pub fn latest_frame(&self) -> Option<u64> {
        self.latest().map(|r| r.frame)
    }

    /// Oldest recorded frame.
    pub fn oldest_frame(&self) -> Option<u64> {
        self.records.front().map(|r| r.frame)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frame: u64, x: f32) -> CommandFrameRecord {
        CommandFrameRecord {
            frame,
            input: FrameInput::new(),
            position: Vec3::new(x, 0.0, 0.0),
            orientation: Quat::IDENTITY,
            controller: ThirdPersonControllerComponent::default(),
            physics: None,
        }
    }

    fn history_of(frames: std::ops::RangeInclusive<u64>) -> CommandFrameHistory {
        let mut history = CommandFrameHistory::new(64);
        for frame in frames {
            history.record(record(frame, frame as f32));
        }
        history
    }

    #[test]
    fn test_lookup_by_frame() {
        let history = history_of(1..=5);
        assert_eq!(history.get(3).unwrap().position.x, 3.0);
        assert!(history.get(0).is_none());
        assert!(history.get(6).is_none());
        assert_eq!(history.latest_frame(), Some(5));
        assert_eq!(history.oldest_frame(), Some(1));
    }

    #[test]
    fn test_overwrite_existing_frame() {
        let mut history = history_of(1..=5);
        history.record(record(3, 30.0));
        assert_eq!(history.len(), 5);
        assert_eq!(history.get(3).unwrap().position.x, 30.0);
    }

    #[test]
    fn test_older_missing_frame_ignored() {
        let mut history = history_of(4..=6);
        history.record(record(2, 2.0));
        assert_eq!(history.oldest_frame(), Some(4));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_gaps_are_allowed() {
        let mut history = history_of(1..=2);
        history.record(record(5, 5.0));
        assert!(history.get(4).is_none());
        assert_eq!(history.get(5).unwrap().position.x, 5.0);
    }

    #[test]
    fn test_clear_through() {
        let mut history = history_of(1..=10);
        history.clear_through(4);
        assert_eq!(history.oldest_frame(), Some(5));
        assert_eq!(history.len(), 6);

        history.clear_through(100);
        assert!(history.is_empty());
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = CommandFrameHistory::new(3);
        for frame in 1..=5 {
            history.record(record(frame, 0.0));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.oldest_frame(), Some(3));
    }

    #[test]
    fn test_inputs_after() {
        let history = history_of(1..=5);
        let frames: Vec<u64> = history.inputs_after(3).into_iter().map(|(f, _)| f).collect();
        assert_eq!(frames, vec![4, 5]);
        assert!(history.inputs_after(5).is_empty());
    }
}
