//! Entity Snapshots
//!
//! Immutable wire view of one replicated entity, produced by the server's
//! world and applied to the client's.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::math::{quat_approx_eq, vec3_approx_eq};
use crate::game::components::{Impulse, ThirdPersonControllerComponent};
use crate::game::entity::{EntityId, EntityType, PlayerId};

/// Controller state needed to resume a character exactly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    /// Walk/jump/gravity velocity.
    pub base_velocity: Vec3,
    /// Decaying zip velocity.
    pub zip_velocity: Vec3,
    /// Ramped ground speed.
    pub movement_speed: f32,
    /// Standing on walkable ground.
    pub grounded: bool,
}

impl From<&ThirdPersonControllerComponent> for ControllerSnapshot {
    fn from(controller: &ThirdPersonControllerComponent) -> Self {
        Self {
            base_velocity: controller.base_velocity,
            zip_velocity: controller.zip_velocity,
            movement_speed: controller.movement_speed,
            grounded: controller.grounded,
        }
    }
}

/// Authoritative state of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity this describes.
    pub entity_id: EntityId,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Owning player for player entities.
    pub player_id: Option<PlayerId>,
    /// Firing entity for projectiles.
    pub owner: Option<EntityId>,
    /// World-space position.
    pub position: Vec3,
    /// Facing.
    pub orientation: Quat,
    /// Physics velocity, zero without physics.
    pub velocity: Vec3,
    /// Active impulses by name.
    pub impulses: BTreeMap<String, Impulse>,
    /// Animation clip name.
    pub animation: String,
    /// Present for controller-driven entities.
    pub controller: Option<ControllerSnapshot>,
}

impl EntitySnapshot {
    /// Whether `position` is within `epsilon` units and `orientation` within
    /// `max_angle` radians of this snapshot.
    pub fn transform_matches(&self, position: Vec3, orientation: Quat, epsilon: f32, max_angle: f32) -> bool {
        vec3_approx_eq(self.position, position, epsilon) && quat_approx_eq(self.orientation, orientation, max_angle)
    }

    /// Hash of the snapshot contents, for log correlation.
    pub fn state_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_snapshot();
        hasher.update_u32(self.entity_id.0);
        hasher.update_u8(self.entity_type as u8);
        hasher.update_vec3(self.position);
        hasher.update_quat(self.orientation);
        hasher.update_vec3(self.velocity);
        for (name, impulse) in &self.impulses {
            hasher.update_str(name);
            hasher.update_vec3(impulse.velocity);
            hasher.update_u32(impulse.duration_frames);
            hasher.update_u32(impulse.elapsed_frames);
        }
        hasher.update_str(&self.animation);
        if let Some(controller) = &self.controller {
            hasher.update_vec3(controller.base_velocity);
            hasher.update_vec3(controller.zip_velocity);
            hasher.update_f32(controller.movement_speed);
            hasher.update_bool(controller.grounded);
        }
        hasher.finalize()
    }
}
