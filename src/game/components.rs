//! Components
//!
//! Plain data attached to entities. Systems in `controller`, `step` and the
//! collision resolver mutate these; nothing here reads the clock.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub use crate::collision::collider::ColliderComponent;
use crate::collision::shape::Placement;
use crate::game::entity::EntityId;

/// World position and orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformComponent {
    /// World-space position.
    pub position: Vec3,
    /// Facing.
    pub orientation: Quat,
}

impl TransformComponent {
    /// Transform at `position` facing -Z.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Placement used to move collider shapes into world space.
    #[inline]
    pub fn placement(&self) -> Placement {
        Placement {
            position: self.position,
            orientation: self.orientation,
        }
    }
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

/// Third-person character movement state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThirdPersonControllerComponent {
    /// Gravity and jump contributions.
    pub base_velocity: Vec3,
    /// Input-driven horizontal movement.
    pub controller_velocity: Vec3,
    /// Burst movement along the camera.
    pub zip_velocity: Vec3,
    /// Sum of the three contributions.
    pub velocity: Vec3,
    /// Ramped movement speed scalar.
    pub movement_speed: f32,
    /// Standing on a surface as of the last collision resolution.
    pub grounded: bool,
}

/// A timed velocity contribution that fades linearly to zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    /// Velocity at the first frame.
    pub velocity: Vec3,
    /// Total lifetime in frames.
    pub duration_frames: u32,
    /// Frames already applied.
    pub elapsed_frames: u32,
}

impl Impulse {
    /// New impulse lasting `duration_frames`.
    pub fn new(velocity: Vec3, duration_frames: u32) -> Self {
        Self {
            velocity,
            duration_frames,
            elapsed_frames: 0,
        }
    }

    /// Velocity contributed this frame.
    pub fn current(&self) -> Vec3 {
        if self.duration_frames == 0 || self.elapsed_frames >= self.duration_frames {
            return Vec3::ZERO;
        }
        let remaining = (self.duration_frames - self.elapsed_frames) as f32;
        self.velocity * (remaining / self.duration_frames as f32)
    }

    /// Whether the impulse has run its course.
    #[inline]
    pub fn expired(&self) -> bool {
        self.elapsed_frames >= self.duration_frames
    }
}

/// Free-body velocity plus named impulses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicsComponent {
    /// Free-body velocity (units/s).
    pub velocity: Vec3,
    /// Active impulses by name.
    pub impulses: BTreeMap<String, Impulse>,
}

impl PhysicsComponent {
    /// Add or replace a named impulse.
    pub fn apply_impulse(&mut self, name: impl Into<String>, impulse: Impulse) {
        self.impulses.insert(name.into(), impulse);
    }

    /// Advance one frame and return this frame's total velocity.
    ///
    /// Expired impulses are removed after being summed.
    pub fn step(&mut self) -> Vec3 {
        let mut total = self.velocity;
        for impulse in self.impulses.values_mut() {
            total += impulse.current();
            impulse.elapsed_frames += 1;
        }
        self.impulses.retain(|_, impulse| !impulse.expired());
        total
    }
}

/// Third-person camera attached to a player entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraComponent {
    /// Entity being followed.
    pub target: EntityId,
    /// Distance behind the target.
    pub follow_distance: f32,
    /// Height above the target's origin.
    pub follow_height: f32,
}

impl CameraComponent {
    /// Default rig behind `target`.
    pub fn following(target: EntityId) -> Self {
        Self {
            target,
            follow_distance: 40.0,
            follow_height: 15.0,
        }
    }
}

/// Current animation clip name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationComponent {
    /// Clip name, one of the constants below.
    pub name: String,
}

impl AnimationComponent {
    /// Standing still.
    pub const IDLE: &'static str = "idle";
    /// Moving on the ground.
    pub const RUN: &'static str = "run";
    /// Jumping or falling.
    pub const AIRBORNE: &'static str = "airborne";
}

impl Default for AnimationComponent {
    fn default() -> Self {
        Self {
            name: Self::IDLE.to_string(),
        }
    }
}

/// Projectile bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileComponent {
    /// Entity that fired it. Never hit by its own projectile.
    pub owner: EntityId,
    /// Frames until it despawns.
    pub remaining_frames: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_fades_linearly() {
        let impulse = Impulse::new(Vec3::new(10.0, 0.0, 0.0), 4);
        assert_eq!(impulse.current(), Vec3::new(10.0, 0.0, 0.0));

        let half = Impulse {
            elapsed_frames: 2,
            ..impulse
        };
        assert_eq!(half.current(), Vec3::new(5.0, 0.0, 0.0));
        assert!(!half.expired());

        let done = Impulse {
            elapsed_frames: 4,
            ..impulse
        };
        assert_eq!(done.current(), Vec3::ZERO);
        assert!(done.expired());
    }

    #[test]
    fn test_physics_step_removes_expired_impulses() {
        let mut physics = PhysicsComponent::default();
        physics.apply_impulse("knockback", Impulse::new(Vec3::X, 2));
        physics.apply_impulse("wind", Impulse::new(Vec3::Z, 1));

        let first = physics.step();
        assert_eq!(first, Vec3::new(1.0, 0.0, 1.0));
        // "wind" is spent after one frame
        assert_eq!(physics.impulses.len(), 1);

        let second = physics.step();
        assert_eq!(second, Vec3::new(0.5, 0.0, 0.0));
        assert!(physics.impulses.is_empty());

        assert_eq!(physics.step(), Vec3::ZERO);
    }

    #[test]
    fn test_transform_placement() {
        let transform = TransformComponent::at(Vec3::new(1.0, 2.0, 3.0));
        let placement = transform.placement();
        assert_eq!(placement.apply(Vec3::Y), Vec3::new(1.0, 3.0, 3.0));
    }
}
