//! Remote Entity State Buffer
//!
//! Authoritative updates arrive every few server frames and with jitter.
//! The state buffer schedules each update a fixed number of local frames in
//! the future and fills the frames between two updates with interpolated
//! snapshots, giving one entity bundle per local frame.
//!
//! Nothing is extrapolated. A frame with no entry means "hold the last
//! pose".

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::math::{lerp_vec3, slerp_quat};
use crate::game::entity::EntityId;
use crate::game::snapshot::EntitySnapshot;

/// Entity snapshots for one local frame.
pub type EntityBundle = BTreeMap<EntityId, EntitySnapshot>;

#[derive(Debug, Clone)]
struct Scheduled {
    target_frame: u64,
    global_frame: u64,
    entities: EntityBundle,
}

/// Frame-indexed timeline of remote entity state.
#[derive(Debug, Clone)]
pub struct StateBuffer {
    size: u64,
    timeline: BTreeMap<u64, EntityBundle>,
    last: Option<Scheduled>,
}

impl StateBuffer {
    /// Buffer adding `size` frames of interpolation latency.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            timeline: BTreeMap::new(),
            last: None,
        }
    }

    /// Schedule an authoritative update received on `local_frame`.
    ///
    /// Returns the local frame the update lands on, or `None` if it was
    /// dropped because it is not newer than the previous update.
    pub fn push_entity_update(&mut self, local_frame: u64, global_frame: u64, entities: EntityBundle) -> Option<u64> {
        let Some(previous) = self.last.take() else {
            return Some(self.schedule_fresh(local_frame, global_frame, entities));
        };

        if global_frame <= previous.global_frame {
            debug!(
                global_frame,
                previous = previous.global_frame,
                "Dropping stale state update"
            );
            self.last = Some(previous);
            return None;
        }

        let gap = global_frame - previous.global_frame;
        let target = previous.target_frame + gap;

        // Fell too far behind to interpolate into the future
        if target <= local_frame {
            debug!(target, local_frame, "State buffer underrun, rescheduling");
            return Some(self.schedule_fresh(local_frame, global_frame, entities));
        }

        for step in 1..=gap {
            let t = step as f32 / gap as f32;
            let frame = previous.target_frame + step;
            let bundle = if step == gap {
                entities.clone()
            } else {
                interpolate_bundle(&previous.entities, &entities, t)
            };
            self.timeline.insert(frame, bundle);
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(target, gap, "State update scheduled");

        self.last = Some(Scheduled {
            target_frame: target,
            global_frame,
            entities,
        });
        Some(target)
    }

    fn schedule_fresh(&mut self, local_frame: u64, global_frame: u64, entities: EntityBundle) -> u64 {
        let target = local_frame + self.size;
        self.timeline.insert(target, entities.clone());
        self.last = Some(Scheduled {
            target_frame: target,
            global_frame,
            entities,
        });
        target
    }

    /// Take the bundle for `frame`, discarding it and everything older.
    pub fn pull_entity_interpolations(&mut self, frame: u64) -> Option<EntityBundle> {
        let later = self.timeline.split_off(&(frame + 1));
        let mut due = std::mem::replace(&mut self.timeline, later);
        due.remove(&frame)
    }

    /// Frames currently scheduled.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// Nothing scheduled.
    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Forget an entity in every scheduled frame.
    pub fn remove_entity(&mut self, entity: EntityId) {
        for bundle in self.timeline.values_mut() {
            bundle.remove(&entity);
        }
        if let Some(last) = self.last.as_mut() {
            last.entities.remove(&entity);
        }
    }
}

/// Blend entities present in both bundles. Entities only in `to` appear once
/// their own update lands; entities only in `from` are gone.
fn interpolate_bundle(from: &EntityBundle, to: &EntityBundle, t: f32) -> EntityBundle {
    to.iter()
        .filter_map(|(id, next)| {
            let previous = from.get(id)?;
            Some((*id, interpolate_snapshot(previous, next, t)))
        })
        .collect()
}

/// Snapshot at fraction `t` between `from` and `to`.
pub fn interpolate_snapshot(from: &EntitySnapshot, to: &EntitySnapshot, t: f32) -> EntitySnapshot {
    let mut blended = to.clone();
    blended.position = lerp_vec3(from.position, to.position, t);
    blended.orientation = slerp_quat(from.orientation, to.orientation, t);
    blended.velocity = lerp_vec3(from.velocity, to.velocity, t);
    blended.animation = from.animation.clone();
    blended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityType, PlayerId};
    use glam::{Quat, Vec3};
    use std::f32::consts::FRAC_PI_2;

    fn snapshot(id: u32, position: Vec3, orientation: Quat) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: EntityId(id),
            entity_type: EntityType::Player,
            player_id: Some(PlayerId(id)),
            owner: None,
            position,
            orientation,
            velocity: Vec3::ZERO,
            impulses: BTreeMap::new(),
            animation: "run".to_string(),
            controller: None,
        }
    }

    fn bundle(snapshots: Vec<EntitySnapshot>) -> EntityBundle {
        snapshots.into_iter().map(|s| (s.entity_id, s)).collect()
    }

    #[test]
    fn test_first_update_scheduled_after_buffer() {
        let mut buffer = StateBuffer::new(10);
        let target = buffer.push_entity_update(5, 100, bundle(vec![snapshot(2, Vec3::ZERO, Quat::IDENTITY)]));
        assert_eq!(target, Some(15));
        assert!(buffer.pull_entity_interpolations(14).is_none());
        assert!(buffer.pull_entity_interpolations(15).is_some());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_gap_filled_with_interpolation() {
        let mut buffer = StateBuffer::new(10);
        let turned = Quat::from_rotation_y(FRAC_PI_2);
        buffer.push_entity_update(5, 100, bundle(vec![snapshot(2, Vec3::ZERO, Quat::IDENTITY)]));
        let target = buffer.push_entity_update(8, 110, bundle(vec![snapshot(2, Vec3::new(10.0, 0.0, 0.0), turned)]));
        assert_eq!(target, Some(25));
        assert_eq!(buffer.len(), 11);

        let mid = buffer.pull_entity_interpolations(20).unwrap();
        let entity = &mid[&EntityId(2)];
        assert!((entity.position.x - 5.0).abs() < 1e-5);
        let expected = Quat::IDENTITY.slerp(turned, 0.5);
        assert!(entity.orientation.abs_diff_eq(expected, 1e-5));

        // Older frames were discarded by the pull
        assert!(buffer.pull_entity_interpolations(16).is_none());

        let last = buffer.pull_entity_interpolations(25).unwrap();
        assert_eq!(last[&EntityId(2)].position, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(last[&EntityId(2)].orientation, turned);
    }

    #[test]
    fn test_identical_snapshots_interpolate_exactly() {
        let position = Vec3::new(1.1, -3.7, 12.9);
        let orientation = Quat::from_rotation_y(0.3).normalize();
        let a = snapshot(4, position, orientation);

        for step in 0..=20 {
            let t = step as f32 / 20.0;
            let blended = interpolate_snapshot(&a, &a, t);
            assert_eq!(blended.position, position);
            assert_eq!(blended.orientation, orientation);
        }
    }

    #[test]
    fn test_stale_update_dropped() {
        let mut buffer = StateBuffer::new(4);
        buffer.push_entity_update(0, 50, bundle(vec![]));
        assert_eq!(buffer.push_entity_update(1, 50, bundle(vec![])), None);
        assert_eq!(buffer.push_entity_update(1, 49, bundle(vec![])), None);
        assert_eq!(buffer.push_entity_update(1, 52, bundle(vec![])), Some(6));
    }

    #[test]
    fn test_new_entity_appears_on_its_update() {
        let mut buffer = StateBuffer::new(2);
        buffer.push_entity_update(0, 10, bundle(vec![snapshot(1, Vec3::ZERO, Quat::IDENTITY)]));
        buffer.push_entity_update(
            1,
            14,
            bundle(vec![
                snapshot(1, Vec3::X, Quat::IDENTITY),
                snapshot(3, Vec3::Y, Quat::IDENTITY),
            ]),
        );

        let between = buffer.pull_entity_interpolations(4).unwrap();
        assert!(between.contains_key(&EntityId(1)));
        assert!(!between.contains_key(&EntityId(3)));

        let landed = buffer.pull_entity_interpolations(6).unwrap();
        assert!(landed.contains_key(&EntityId(3)));
    }

    #[test]
    fn test_underrun_reschedules() {
        let mut buffer = StateBuffer::new(3);
        buffer.push_entity_update(0, 10, bundle(vec![]));
        // Client stalled long past the previous target
        assert_eq!(buffer.push_entity_update(40, 12, bundle(vec![])), Some(43));
    }

    #[test]
    fn test_remove_entity() {
        let mut buffer = StateBuffer::new(2);
        buffer.push_entity_update(0, 10, bundle(vec![snapshot(1, Vec3::ZERO, Quat::IDENTITY)]));
        buffer.remove_entity(EntityId(1));
        assert!(buffer.pull_entity_interpolations(2).unwrap().is_empty());
    }
}
