//! Entity Identity and Component Sets
//!
//! Entities are plain ids into the world's component table. Systems select
//! entities by the set of components they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity identifier, unique within one world.
///
/// Ordering is used for deterministic iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Player identifier, assigned by the server on join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// What an entity represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityType {
    /// Character driven by a player's input.
    Player = 0,
    /// Third-person camera following a player.
    Camera = 1,
    /// Server-simulated projectile.
    Projectile = 2,
    /// Static level geometry.
    Scenery = 3,
}

impl EntityType {
    /// Whether entities of this type ship in state updates.
    pub fn is_replicated(self) -> bool {
        matches!(self, EntityType::Player | EntityType::Projectile)
    }
}

/// Component slot kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ComponentKind {
    Transform = 0,
    Collider = 1,
    ThirdPersonController = 2,
    Physics = 3,
    Camera = 4,
    Animation = 5,
    Projectile = 6,
}

impl ComponentKind {
    /// Every kind, in declaration order.
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Transform,
        ComponentKind::Collider,
        ComponentKind::ThirdPersonController,
        ComponentKind::Physics,
        ComponentKind::Camera,
        ComponentKind::Animation,
        ComponentKind::Projectile,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of component kinds, used as a query mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComponentSet {
    bits: u8,
}

impl ComponentSet {
    /// Empty set.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Set containing exactly `kinds`.
    pub fn of(kinds: &[ComponentKind]) -> Self {
        kinds.iter().fold(Self::new(), |set, kind| set.with(*kind))
    }

    /// Builder-style insert.
    pub const fn with(self, kind: ComponentKind) -> Self {
        Self {
            bits: self.bits | kind.bit(),
        }
    }

    /// Add a kind.
    pub fn insert(&mut self, kind: ComponentKind) {
        self.bits |= kind.bit();
    }

    /// Remove a kind.
    pub fn remove(&mut self, kind: ComponentKind) {
        self.bits &= !kind.bit();
    }

    /// Check membership.
    #[inline]
    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.bits & kind.bit() != 0
    }

    /// Check that every kind in `other` is present.
    #[inline]
    pub fn contains_all(&self, other: &ComponentSet) -> bool {
        self.bits & other.bits == other.bits
    }

    /// True if no kinds are present.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Kinds present, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        ComponentKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_set_membership() {
        let set = ComponentSet::new()
            .with(ComponentKind::Transform)
            .with(ComponentKind::Collider);
        assert!(set.contains(ComponentKind::Transform));
        assert!(set.contains(ComponentKind::Collider));
        assert!(!set.contains(ComponentKind::Camera));
    }

    #[test]
    fn test_contains_all() {
        let player = ComponentSet::of(&[
            ComponentKind::Transform,
            ComponentKind::Collider,
            ComponentKind::ThirdPersonController,
        ]);
        let query = ComponentSet::of(&[ComponentKind::Transform, ComponentKind::Collider]);
        assert!(player.contains_all(&query));
        assert!(!query.contains_all(&player));
        assert!(player.contains_all(&ComponentSet::new()));
    }

    #[test]
    fn test_insert_remove_iter() {
        let mut set = ComponentSet::new();
        assert!(set.is_empty());
        set.insert(ComponentKind::Projectile);
        set.insert(ComponentKind::Transform);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![ComponentKind::Transform, ComponentKind::Projectile]
        );
        set.remove(ComponentKind::Transform);
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn test_id_ordering() {
        assert!(EntityId(1) < EntityId(2));
        assert_eq!(EntityId(7).to_string(), "e7");
        assert_eq!(PlayerId(3).to_string(), "p3");
    }

    #[test]
    fn test_replicated_types() {
        assert!(EntityType::Player.is_replicated());
        assert!(EntityType::Projectile.is_replicated());
        assert!(!EntityType::Camera.is_replicated());
        assert!(!EntityType::Scenery.is_replicated());
    }
}
