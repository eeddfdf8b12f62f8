//! Narrow-Phase Collision Detection
//!
//! Classifies collider pairs and produces contacts for capsule-vs-mesh and
//! capsule-vs-capsule. Mesh-vs-mesh is not supported and such pairs are
//! never generated.

use std::collections::BTreeSet;

use glam::Vec3;

use crate::collision::collider::ColliderComponent;
use crate::collision::geometry::{closest_points_between_segments, closest_points_segment_triangle};
use crate::collision::shape::{Capsule, TriMesh};
use crate::core::math::EPSILON;
use crate::game::entity::EntityId;

/// Penetrations at or below this depth are not reported.
pub const CONTACT_SLOP: f32 = 1e-4;

/// Which narrow-phase test produced a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    /// Subject capsule against one triangle of the source mesh.
    CapsuleTriMesh {
        /// Index into the source mesh's triangles.
        triangle: usize,
    },
    /// Subject capsule against source capsule.
    CapsuleCapsule,
}

/// One overlap between two colliders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Entity that gets pushed out.
    pub subject: EntityId,
    /// Entity it overlaps.
    pub source: EntityId,
    /// Contact point on the source surface.
    pub point: Vec3,
    /// Unit direction pushing the subject out of the source.
    pub normal: Vec3,
    /// Penetration depth.
    pub separating_distance: f32,
    /// `normal * separating_distance`.
    pub separating_vector: Vec3,
    /// Shape pairing that produced this contact.
    pub kind: ContactKind,
}

/// Shape pairing of a candidate pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairKind {
    /// Character against static geometry.
    CapsuleTriMesh,
    /// Character against character.
    CapsuleCapsule,
}

/// Candidate pair for narrow-phase testing.
///
/// The capsule side is always the subject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionPair {
    /// Entity that gets pushed out.
    pub subject: EntityId,
    /// Entity it overlaps.
    pub source: EntityId,
    /// Shape pairing.
    pub kind: PairKind,
    /// False when either side opted out of push-out.
    pub positional: bool,
}

impl CollisionPair {
    /// Order-independent key.
    pub fn key(&self) -> (EntityId, EntityId) {
        if self.subject <= self.source {
            (self.subject, self.source)
        } else {
            (self.source, self.subject)
        }
    }

    /// True if `entity` is either side of the pair.
    pub fn involves(&self, entity: EntityId) -> bool {
        self.subject == entity || self.source == entity
    }
}

/// Classify two colliders. Returns `None` for self-pairs and unsupported
/// shape combinations.
pub fn classify_pair(
    a_id: EntityId,
    a: &ColliderComponent,
    b_id: EntityId,
    b: &ColliderComponent,
) -> Option<CollisionPair> {
    if a_id == b_id {
        return None;
    }

    let positional = !(a.skip_movement_resolution || b.skip_movement_resolution);
    let pair = |subject, source, kind| CollisionPair {
        subject,
        source,
        kind,
        positional,
    };

    match (a.capsule.is_some(), b.capsule.is_some()) {
        (true, true) => Some(pair(a_id, b_id, PairKind::CapsuleCapsule)),
        (true, false) if b.trimesh.is_some() => Some(pair(a_id, b_id, PairKind::CapsuleTriMesh)),
        (false, true) if a.trimesh.is_some() => Some(pair(b_id, a_id, PairKind::CapsuleTriMesh)),
        _ => None,
    }
}

/// Every supported pair among `colliders`, each unordered pair once.
///
/// Output order follows input order, so callers passing entities in
/// ascending id order get a deterministic pair list.
pub fn candidate_pairs(colliders: &[(EntityId, &ColliderComponent)]) -> Vec<CollisionPair> {
    let mut seen: BTreeSet<(EntityId, EntityId)> = BTreeSet::new();
    let mut pairs = Vec::new();

    for (a_id, a) in colliders {
        for (b_id, b) in colliders {
            if a_id == b_id || seen.contains(&(*a_id, *b_id)) {
                continue;
            }
            seen.insert((*a_id, *b_id));
            seen.insert((*b_id, *a_id));

            if let Some(pair) = classify_pair(*a_id, a, *b_id, b) {
                pairs.push(pair);
            }
        }
    }

    pairs
}

/// Contacts between a capsule and every triangle of a mesh it penetrates.
pub fn capsule_trimesh_contacts(
    subject: EntityId,
    capsule: &Capsule,
    source: EntityId,
    mesh: &TriMesh,
) -> Vec<Contact> {
    let capsule_bounds = capsule.aabb();
    if !capsule_bounds.overlaps(mesh.bounds()) {
        return Vec::new();
    }

    let mut contacts = Vec::new();
    for (index, triangle) in mesh.triangles().iter().enumerate() {
        if triangle.normal == Vec3::ZERO || !capsule_bounds.overlaps(&triangle.aabb()) {
            continue;
        }

        let [a, b, c] = triangle.points;
        let closest = closest_points_segment_triangle(capsule.bottom, capsule.top, a, b, c);
        let separating_distance = capsule.radius - closest.distance;
        if separating_distance <= CONTACT_SLOP {
            continue;
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            subject = subject.0,
            source = source.0,
            triangle = index,
            depth = separating_distance,
            "capsule-mesh contact"
        );

        contacts.push(Contact {
            subject,
            source,
            point: closest.on_triangle,
            normal: triangle.normal,
            separating_distance,
            separating_vector: triangle.normal * separating_distance,
            kind: ContactKind::CapsuleTriMesh { triangle: index },
        });
    }

    contacts
}

/// Contact between two capsules, if they overlap.
///
/// The normal points from the source toward the subject. Coincident
/// segments fall back to +X.
pub fn capsule_capsule_contact(
    subject: EntityId,
    a: &Capsule,
    source: EntityId,
    b: &Capsule,
) -> Option<Contact> {
    let (on_a, on_b) = closest_points_between_segments(a.bottom, a.top, b.bottom, b.top);
    let offset = on_a - on_b;
    let distance = offset.length();
    let separating_distance = a.radius + b.radius - distance;
    if separating_distance <= CONTACT_SLOP {
        return None;
    }

    let normal = if distance > EPSILON { offset / distance } else { Vec3::X };

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        subject = subject.0,
        source = source.0,
        depth = separating_distance,
        "capsule-capsule contact"
    );

    Some(Contact {
        subject,
        source,
        point: on_b + normal * b.radius,
        normal,
        separating_distance,
        separating_vector: normal * separating_distance,
        kind: ContactKind::CapsuleCapsule,
    })
}

/// Run the narrow phase for one pair using world-space shapes.
pub fn detect_pair(
    pair: &CollisionPair,
    subject: &ColliderComponent,
    source: &ColliderComponent,
) -> Vec<Contact> {
    match pair.kind {
        PairKind::CapsuleTriMesh => match (subject.world_capsule(), source.world_trimesh()) {
            (Some(capsule), Some(mesh)) => {
                capsule_trimesh_contacts(pair.subject, capsule, pair.source, mesh)
            }
            _ => Vec::new(),
        },
        PairKind::CapsuleCapsule => match (subject.world_capsule(), source.world_capsule()) {
            (Some(a), Some(b)) => capsule_capsule_contact(pair.subject, a, pair.source, b)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::Placement;

    fn placed(mut collider: ColliderComponent, position: Vec3) -> ColliderComponent {
        collider.update_transform(&Placement::at(position));
        collider
    }

    #[test]
    fn test_classify_skips_self_and_mesh_pairs() {
        let capsule = ColliderComponent::capsule(Capsule::standing(0.5, 2.0));
        let mesh = ColliderComponent::trimesh(TriMesh::quad(Vec3::ZERO, 5.0));

        assert!(classify_pair(EntityId(1), &capsule, EntityId(1), &capsule).is_none());
        assert!(classify_pair(EntityId(1), &mesh, EntityId(2), &mesh).is_none());

        let pair = classify_pair(EntityId(1), &mesh, EntityId(2), &capsule).unwrap();
        assert_eq!(pair.subject, EntityId(2));
        assert_eq!(pair.source, EntityId(1));
        assert_eq!(pair.kind, PairKind::CapsuleTriMesh);
        assert!(pair.positional);
    }

    #[test]
    fn test_sensor_pairs_are_not_positional() {
        let capsule = ColliderComponent::capsule(Capsule::standing(0.5, 2.0));
        let projectile = ColliderComponent::capsule(Capsule::standing(0.2, 0.4)).sensor();
        let pair = classify_pair(EntityId(1), &capsule, EntityId(2), &projectile).unwrap();
        assert!(!pair.positional);
    }

    #[test]
    fn test_candidate_pairs_unique() {
        let c1 = ColliderComponent::capsule(Capsule::standing(0.5, 2.0));
        let c2 = ColliderComponent::capsule(Capsule::standing(0.5, 2.0));
        let m1 = ColliderComponent::trimesh(TriMesh::quad(Vec3::ZERO, 5.0));
        let m2 = ColliderComponent::trimesh(TriMesh::quad(Vec3::ZERO, 5.0));
        let colliders = vec![
            (EntityId(1), &c1),
            (EntityId(2), &c2),
            (EntityId(3), &m1),
            (EntityId(4), &m2),
        ];

        let pairs = candidate_pairs(&colliders);
        // c1-c2, c1-m1, c1-m2, c2-m1, c2-m2; m1-m2 skipped
        assert_eq!(pairs.len(), 5);
        let keys: BTreeSet<_> = pairs.iter().map(CollisionPair::key).collect();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_capsule_capsule_contact_along_x() {
        let a = Capsule::new(1.0, Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO);
        let b = Capsule::new(1.0, Vec3::new(1.5, 2.0, 0.0), Vec3::new(1.5, 0.0, 0.0));
        let contact = capsule_capsule_contact(EntityId(1), &a, EntityId(2), &b).unwrap();
        assert_eq!(contact.normal, Vec3::NEG_X);
        assert!((contact.separating_distance - 0.5).abs() < 1e-6);
        assert!(contact.separating_vector.abs_diff_eq(Vec3::new(-0.5, 0.0, 0.0), 1e-6));
        assert_eq!(contact.kind, ContactKind::CapsuleCapsule);
    }

    #[test]
    fn test_capsule_capsule_apart() {
        let a = Capsule::new(1.0, Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO);
        let b = Capsule::new(1.0, Vec3::new(3.0, 2.0, 0.0), Vec3::new(3.0, 0.0, 0.0));
        assert!(capsule_capsule_contact(EntityId(1), &a, EntityId(2), &b).is_none());
    }

    #[test]
    fn test_coincident_capsules_use_fallback_normal() {
        let a = Capsule::new(1.0, Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO);
        let contact = capsule_capsule_contact(EntityId(1), &a, EntityId(2), &a).unwrap();
        assert_eq!(contact.normal, Vec3::X);
        assert!((contact.separating_distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_capsule_sinking_into_floor() {
        let capsule = placed(
            ColliderComponent::capsule(Capsule::standing(1.0, 3.0)),
            Vec3::new(0.0, -0.5, 0.0),
        );
        let floor = placed(
            ColliderComponent::trimesh(TriMesh::quad(Vec3::ZERO, 10.0)),
            Vec3::ZERO,
        );
        let pair = classify_pair(EntityId(1), &capsule, EntityId(2), &floor).unwrap();
        let contacts = detect_pair(&pair, &capsule, &floor);

        assert!(!contacts.is_empty());
        for contact in &contacts {
            assert_eq!(contact.normal, Vec3::Y);
            assert!((contact.separating_distance - 0.5).abs() < 1e-5);
            assert!(matches!(contact.kind, ContactKind::CapsuleTriMesh { .. }));
        }
    }

    #[test]
    fn test_capsule_above_floor_has_no_contact() {
        let capsule = placed(
            ColliderComponent::capsule(Capsule::standing(1.0, 3.0)),
            Vec3::new(0.0, 0.1, 0.0),
        );
        let floor = placed(
            ColliderComponent::trimesh(TriMesh::quad(Vec3::ZERO, 10.0)),
            Vec3::ZERO,
        );
        let pair = classify_pair(EntityId(1), &capsule, EntityId(2), &floor).unwrap();
        assert!(detect_pair(&pair, &capsule, &floor).is_empty());
    }
}
