//! Collision Resolution
//!
//! Pushes overlapping colliders apart and maintains grounded state and
//! per-collider contact sets.
//!
//! Each pass collects every contact, sorts them by penetration (shallowest
//! first) and resolves greedily, at most once per subject entity per pass.
//! Passes repeat until nothing overlaps. An entity that has been resolved
//! `resolve_count_max` times stops being resolved for the rest of the call,
//! which bounds the loop when constraints fight each other.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use tracing::debug;

use crate::collision::detect::{candidate_pairs, detect_pair, CollisionPair, Contact, ContactKind};
use crate::config::SimulationConfig;
use crate::core::math::WORLD_UP;
use crate::game::components::ColliderComponent;
use crate::game::entity::{ComponentKind, ComponentSet, EntityId};
use crate::game::world::World;

/// Which entities a resolution call may move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollisionScope {
    /// Every collider in the world.
    All,
    /// Only pairs involving this entity. Other entities are treated as
    /// immovable, so this entity takes the full separation.
    Only(EntityId),
}

impl CollisionScope {
    /// Whether `entity` may be moved or have its state changed.
    #[inline]
    pub fn includes(&self, entity: EntityId) -> bool {
        match self {
            CollisionScope::All => true,
            CollisionScope::Only(id) => *id == entity,
        }
    }

    fn includes_pair(&self, pair: &CollisionPair) -> bool {
        match self {
            CollisionScope::All => true,
            CollisionScope::Only(id) => pair.involves(*id),
        }
    }
}

/// Outcome of one resolution call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Passes that resolved at least one contact.
    pub passes: u32,
    /// Contacts resolved across all passes.
    pub resolved: u32,
    /// Pairs found touching, positional or not.
    pub touching_pairs: usize,
    /// Entities that hit `resolve_count_max` with contacts still pending.
    pub exhausted: Vec<EntityId>,
}

impl ResolutionReport {
    /// True if some overlap was left unresolved.
    pub fn truncated(&self) -> bool {
        !self.exhausted.is_empty()
    }
}

/// Resolve overlaps among colliders in `scope`.
pub fn resolve_collisions(world: &mut World, scope: CollisionScope, config: &SimulationConfig) -> ResolutionReport {
    let ids = world.query(&ComponentSet::of(&[ComponentKind::Transform, ComponentKind::Collider]));

    for id in &ids {
        if let Some(record) = world.get_mut(*id) {
            record.refresh_collider();
            if scope.includes(*id) {
                if let Some(controller) = record.controller.as_mut() {
                    controller.grounded = false;
                }
            }
        }
    }

    let pairs: Vec<CollisionPair> = {
        let colliders: Vec<(EntityId, &ColliderComponent)> = ids
            .iter()
            .filter_map(|id| world.get(*id).and_then(|r| r.collider.as_ref()).map(|c| (*id, c)))
            .collect();
        candidate_pairs(&colliders)
            .into_iter()
            .filter(|pair| scope.includes_pair(pair))
            .collect()
    };

    clear_contacts(world, scope, &ids);

    let (positional, sensors): (Vec<CollisionPair>, Vec<CollisionPair>) =
        pairs.into_iter().partition(|pair| pair.positional);

    let mut touching: BTreeSet<(EntityId, EntityId)> = BTreeSet::new();
    for pair in &sensors {
        if !contacts_for_pair(world, pair).is_empty() {
            touching.insert(pair.key());
        }
    }

    let mut report = resolve_positional(world, &positional, scope, config, &mut touching);

    for (a, b) in &touching {
        add_contact(world, *a, *b);
        add_contact(world, *b, *a);
    }
    report.touching_pairs = touching.len();

    if report.truncated() {
        debug!(
            passes = report.passes,
            resolved = report.resolved,
            exhausted = ?report.exhausted,
            "Collision resolution truncated"
        );
    }

    report
}

fn resolve_positional(
    world: &mut World,
    pairs: &[CollisionPair],
    scope: CollisionScope,
    config: &SimulationConfig,
    touching: &mut BTreeSet<(EntityId, EntityId)>,
) -> ResolutionReport {
    let mut report = ResolutionReport::default();
    let mut counts: BTreeMap<EntityId, u32> = BTreeMap::new();
    let mut exhausted: BTreeSet<EntityId> = BTreeSet::new();

    loop {
        let mut contacts: Vec<Contact> = Vec::new();
        for pair in pairs {
            let found = contacts_for_pair(world, pair);
            if !found.is_empty() {
                touching.insert(pair.key());
            }
            contacts.extend(found);
        }

        contacts.retain(|contact| {
            let count = counts.get(&contact.subject).copied().unwrap_or(0);
            if count >= config.resolve_count_max {
                exhausted.insert(contact.subject);
                false
            } else {
                true
            }
        });

        if contacts.is_empty() {
            break;
        }

        // Stable: equal depths keep pair order
        contacts.sort_by(|a, b| a.separating_distance.total_cmp(&b.separating_distance));

        report.passes += 1;
        let mut resolved_this_pass: BTreeSet<EntityId> = BTreeSet::new();

        for contact in &contacts {
            if resolved_this_pass.contains(&contact.subject) {
                continue;
            }

            apply_contact(world, contact, scope, config);

            resolved_this_pass.insert(contact.subject);
            resolved_this_pass.insert(contact.source);
            *counts.entry(contact.subject).or_insert(0) += 1;
            if contact.kind == ContactKind::CapsuleCapsule {
                *counts.entry(contact.source).or_insert(0) += 1;
            }
            report.resolved += 1;
        }
    }

    report.exhausted = exhausted.into_iter().collect();
    report
}

fn contacts_for_pair(world: &World, pair: &CollisionPair) -> Vec<Contact> {
    let subject = world.get(pair.subject).and_then(|r| r.collider.as_ref());
    let source = world.get(pair.source).and_then(|r| r.collider.as_ref());
    match (subject, source) {
        (Some(subject), Some(source)) => detect_pair(pair, subject, source),
        _ => Vec::new(),
    }
}

/// Apply one contact's separating vector.
fn apply_contact(world: &mut World, contact: &Contact, scope: CollisionScope, config: &SimulationConfig) {
    let vector = contact.separating_vector;

    match contact.kind {
        ContactKind::CapsuleTriMesh { .. } => {
            if scope.includes(contact.subject) {
                push_entity(world, contact.subject, vector, config);
            }
        }
        ContactKind::CapsuleCapsule => {
            match (scope.includes(contact.subject), scope.includes(contact.source)) {
                (true, true) => {
                    let half = vector * 0.5;
                    push_entity(world, contact.subject, half, config);
                    push_entity(world, contact.source, -half, config);
                }
                (true, false) => push_entity(world, contact.subject, vector, config),
                (false, true) => push_entity(world, contact.source, -vector, config),
                (false, false) => {}
            }
        }
    }

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        subject = contact.subject.0,
        source = contact.source.0,
        depth = contact.separating_distance,
        "contact resolved"
    );
}

/// Move an entity by `offset` and update grounded state.
fn push_entity(world: &mut World, entity: EntityId, offset: Vec3, config: &SimulationConfig) {
    let Some(record) = world.get_mut(entity) else {
        return;
    };

    if let Some(transform) = record.transform.as_mut() {
        transform.position += offset;
    }
    record.refresh_collider();

    if offset.normalize_or_zero().dot(WORLD_UP) > config.grounded_strictness {
        if let Some(controller) = record.controller.as_mut() {
            controller.grounded = true;
            controller.base_velocity.y = 0.0;
            controller.zip_velocity.y = 0.0;
            controller.velocity.y = 0.0;
        }
        if let Some(physics) = record.physics.as_mut() {
            physics.velocity.y = 0.0;
        }
    }
}

fn clear_contacts(world: &mut World, scope: CollisionScope, ids: &[EntityId]) {
    for id in ids {
        let Some(collider) = world.get_mut(*id).and_then(|r| r.collider.as_mut()) else {
            continue;
        };
        match scope {
            CollisionScope::All => collider.contacts.clear(),
            CollisionScope::Only(target) if target == *id => collider.contacts.clear(),
            CollisionScope::Only(target) => {
                collider.contacts.remove(&target);
            }
        }
    }
}

fn add_contact(world: &mut World, entity: EntityId, other: EntityId) {
    if let Some(collider) = world.get_mut(entity).and_then(|r| r.collider.as_mut()) {
        collider.contacts.insert(other);
    }
}
