//! Game Events
//!
//! Events generated during server simulation. They accumulate between
//! broadcasts and ship inside each state update.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::entity::{EntityId, PlayerId};

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Hits resolve before anything they cause
    Hit = 0,
    /// Then removals
    Despawn = 1,
    /// Then new entities
    Spawn = 2,
    /// Lowest priority
    Other = 255,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Player joined and got a character
    PlayerJoined {
        player_id: PlayerId,
        entity_id: EntityId,
    },

    /// Projectile launched
    ProjectileFired {
        projectile_id: EntityId,
        owner_id: EntityId,
        origin: Vec3,
        direction: Vec3,
    },

    /// Projectile struck a character
    ProjectileHit {
        projectile_id: EntityId,
        target_id: EntityId,
        point: Vec3,
    },

    /// Entity removed from the world
    EntityDespawned {
        entity_id: EntityId,
    },
}

/// A game event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Command frame when the event occurred
    pub frame: u64,

    /// Processing priority
    pub priority: EventPriority,

    /// Entity involved (for tie-breaking)
    pub entity_id: EntityId,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(frame: u64, priority: EventPriority, data: GameEventData) -> Self {
        let entity_id = match &data {
            GameEventData::PlayerJoined { entity_id, .. } => *entity_id,
            GameEventData::ProjectileFired { projectile_id, .. } => *projectile_id,
            GameEventData::ProjectileHit { projectile_id, .. } => *projectile_id,
            GameEventData::EntityDespawned { entity_id } => *entity_id,
        };

        Self {
            frame,
            priority,
            entity_id,
            data,
        }
    }

    /// Create player joined event.
    pub fn player_joined(frame: u64, player_id: PlayerId, entity_id: EntityId) -> Self {
        Self::new(
            frame,
            EventPriority::Spawn,
            GameEventData::PlayerJoined { player_id, entity_id },
        )
    }

    /// Create projectile fired event.
    pub fn projectile_fired(
        frame: u64,
        projectile_id: EntityId,
        owner_id: EntityId,
        origin: Vec3,
        direction: Vec3,
    ) -> Self {
        Self::new(
            frame,
            EventPriority::Spawn,
            GameEventData::ProjectileFired {
                projectile_id,
                owner_id,
                origin,
                direction,
            },
        )
    }

    /// Create projectile hit event.
    pub fn projectile_hit(frame: u64, projectile_id: EntityId, target_id: EntityId, point: Vec3) -> Self {
        Self::new(
            frame,
            EventPriority::Hit,
            GameEventData::ProjectileHit {
                projectile_id,
                target_id,
                point,
            },
        )
    }

    /// Create entity despawned event.
    pub fn entity_despawned(frame: u64, entity_id: EntityId) -> Self {
        Self::new(frame, EventPriority::Despawn, GameEventData::EntityDespawned { entity_id })
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.frame == other.frame
            && self.priority == other.priority
            && self.entity_id == other.entity_id
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: frame, then priority, then entity
        self.frame
            .cmp(&other.frame)
            .then(self.priority.cmp(&other.priority))
            .then(self.entity_id.cmp(&other.entity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let hit = GameEvent::projectile_hit(10, EntityId(5), EntityId(2), Vec3::ZERO);
        let despawn = GameEvent::entity_despawned(10, EntityId(5));
        let despawn_other = GameEvent::entity_despawned(10, EntityId(7));
        let earlier = GameEvent::player_joined(9, PlayerId(1), EntityId(9));

        // Same frame, but hit < despawn
        assert!(hit < despawn);

        // Same frame and priority, lower entity first
        assert!(despawn < despawn_other);

        // Earlier frame wins regardless of priority
        assert!(earlier < hit);
    }

    #[test]
    fn test_sorting_events() {
        let mut events = vec![
            GameEvent::entity_despawned(3, EntityId(4)),
            GameEvent::projectile_fired(2, EntityId(4), EntityId(1), Vec3::ZERO, Vec3::NEG_Z),
            GameEvent::projectile_hit(3, EntityId(4), EntityId(2), Vec3::ZERO),
        ];
        events.sort();
        assert!(matches!(events[0].data, GameEventData::ProjectileFired { .. }));
        assert!(matches!(events[1].data, GameEventData::ProjectileHit { .. }));
        assert!(matches!(events[2].data, GameEventData::EntityDespawned { .. }));
    }
}
