//! Collider Component
//!
//! Local-space shapes, their world-space copies for the current frame, and
//! the set of entities currently touching this one.

use std::collections::BTreeSet;

use crate::collision::shape::{Capsule, Placement, TriMesh};
use crate::game::entity::EntityId;

/// Collision shapes attached to an entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColliderComponent {
    /// Local-space capsule.
    pub capsule: Option<Capsule>,
    /// Local-space triangle mesh.
    pub trimesh: Option<TriMesh>,
    /// World-space capsule for the current placement.
    pub transformed_capsule: Option<Capsule>,
    /// World-space mesh for the current placement.
    pub transformed_trimesh: Option<TriMesh>,
    /// Entity only wants contact notification, never push-out.
    pub skip_movement_resolution: bool,
    /// Entities touched during the last resolution.
    pub contacts: BTreeSet<EntityId>,
}

impl ColliderComponent {
    /// Collider with a capsule shape.
    pub fn capsule(capsule: Capsule) -> Self {
        Self {
            capsule: Some(capsule),
            ..Default::default()
        }
    }

    /// Collider with a triangle mesh shape.
    pub fn trimesh(mesh: TriMesh) -> Self {
        Self {
            trimesh: Some(mesh),
            ..Default::default()
        }
    }

    /// Mark this collider as notification-only.
    pub fn sensor(mut self) -> Self {
        self.skip_movement_resolution = true;
        self
    }

    /// Recompute world-space shapes for `placement`.
    pub fn update_transform(&mut self, placement: &Placement) {
        self.transformed_capsule = self.capsule.map(|c| c.transform(placement));
        self.transformed_trimesh = self.trimesh.as_ref().map(|m| m.transform(placement));
    }

    /// World-space capsule, if any.
    #[inline]
    pub fn world_capsule(&self) -> Option<&Capsule> {
        self.transformed_capsule.as_ref()
    }

    /// World-space mesh, if any.
    #[inline]
    pub fn world_trimesh(&self) -> Option<&TriMesh> {
        self.transformed_trimesh.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_update_transform_follows_placement() {
        let mut collider = ColliderComponent::capsule(Capsule::standing(0.5, 2.0));
        assert!(collider.world_capsule().is_none());

        collider.update_transform(&Placement::at(Vec3::new(1.0, 2.0, 3.0)));
        let world = collider.world_capsule().unwrap();
        assert_eq!(world.bottom, Vec3::new(1.0, 2.5, 3.0));
    }

    #[test]
    fn test_sensor_flag() {
        let collider = ColliderComponent::capsule(Capsule::standing(0.2, 0.4)).sensor();
        assert!(collider.skip_movement_resolution);
    }
}
