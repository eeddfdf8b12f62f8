//! World
//!
//! The explicit simulation context: a component table keyed by entity id.
//! Every system takes `&mut World`; nothing is global.
//!
//! Iteration is always in ascending `EntityId` order (BTreeMap), which keeps
//! queries, collision pair generation and hashing deterministic.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use tracing::{debug, warn};

use crate::collision::shape::{Capsule, TriMesh};
use crate::core::hash::{StateHash, StateHasher};
use crate::game::components::{
    AnimationComponent, CameraComponent, ColliderComponent, PhysicsComponent, ProjectileComponent,
    ThirdPersonControllerComponent, TransformComponent,
};
use crate::game::entity::{ComponentKind, ComponentSet, EntityId, EntityType, PlayerId};
use crate::game::snapshot::{ControllerSnapshot, EntitySnapshot};

/// Player capsule radius.
pub const PLAYER_RADIUS: f32 = 4.0;
/// Player capsule full height.
pub const PLAYER_HEIGHT: f32 = 16.0;
/// Projectile capsule radius.
pub const PROJECTILE_RADIUS: f32 = 1.0;
/// Half the side length of the arena floor.
pub const ARENA_HALF_EXTENT: f32 = 200.0;
/// Height of the arena walls.
pub const ARENA_WALL_HEIGHT: f32 = 60.0;

/// World lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// No entity with this id.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// Entity exists but lacks a component.
    #[error("Entity {entity} has no {component:?} component")]
    MissingComponent {
        /// Entity that was looked up.
        entity: EntityId,
        /// Component it lacks.
        component: ComponentKind,
    },
}

/// One row of the component table.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    /// Stable id.
    pub id: EntityId,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Owning player, if any.
    pub player_id: Option<PlayerId>,
    /// Position and facing.
    pub transform: Option<TransformComponent>,
    /// Collision shape.
    pub collider: Option<ColliderComponent>,
    /// Character movement state.
    pub controller: Option<ThirdPersonControllerComponent>,
    /// Velocity and impulses.
    pub physics: Option<PhysicsComponent>,
    /// Follow camera.
    pub camera: Option<CameraComponent>,
    /// Animation clip.
    pub animation: Option<AnimationComponent>,
    /// Projectile lifetime and owner.
    pub projectile: Option<ProjectileComponent>,
}

impl EntityRecord {
    /// Record with no components.
    pub fn new(id: EntityId, entity_type: EntityType) -> Self {
        Self {
            id,
            entity_type,
            player_id: None,
            transform: None,
            collider: None,
            controller: None,
            physics: None,
            camera: None,
            animation: None,
            projectile: None,
        }
    }

    /// Component kinds present on this record.
    pub fn components(&self) -> ComponentSet {
        let mut set = ComponentSet::new();
        let slots = [
            (self.transform.is_some(), ComponentKind::Transform),
            (self.collider.is_some(), ComponentKind::Collider),
            (self.controller.is_some(), ComponentKind::ThirdPersonController),
            (self.physics.is_some(), ComponentKind::Physics),
            (self.camera.is_some(), ComponentKind::Camera),
            (self.animation.is_some(), ComponentKind::Animation),
            (self.projectile.is_some(), ComponentKind::Projectile),
        ];
        for (present, kind) in slots {
            if present {
                set.insert(kind);
            }
        }
        set
    }

    /// Recompute world-space collider shapes from the transform.
    pub fn refresh_collider(&mut self) {
        if let (Some(transform), Some(collider)) = (self.transform.as_ref(), self.collider.as_mut()) {
            collider.update_transform(&transform.placement());
        }
    }

    fn missing(&self, component: ComponentKind) -> WorldError {
        WorldError::MissingComponent {
            entity: self.id,
            component,
        }
    }
}

/// Entity/component table.
#[derive(Clone, Debug)]
pub struct World {
    entities: BTreeMap<EntityId, EntityRecord>,
    next_id: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Empty world. Ids start at 1.
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Reserve a fresh id.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert or replace a record. Later allocations skip past its id.
    pub fn insert(&mut self, mut record: EntityRecord) -> Option<EntityRecord> {
        self.next_id = self.next_id.max(record.id.0 + 1);
        record.refresh_collider();
        self.entities.insert(record.id, record)
    }

    // =========================================================================
    // SPAWNING
    // =========================================================================

    /// Spawn a controllable character standing at `position`.
    pub fn spawn_player(&mut self, id: EntityId, player_id: PlayerId, position: Vec3) -> EntityId {
        let mut record = EntityRecord::new(id, EntityType::Player);
        record.player_id = Some(player_id);
        record.transform = Some(TransformComponent::at(position));
        record.collider = Some(ColliderComponent::capsule(Capsule::standing(PLAYER_RADIUS, PLAYER_HEIGHT)));
        record.controller = Some(ThirdPersonControllerComponent::default());
        record.physics = Some(PhysicsComponent::default());
        record.animation = Some(AnimationComponent::default());
        self.insert(record);
        id
    }

    /// Spawn a camera following `target`.
    pub fn spawn_camera(&mut self, id: EntityId, target: EntityId, orientation: Quat) -> EntityId {
        let mut record = EntityRecord::new(id, EntityType::Camera);
        let camera = CameraComponent::following(target);
        let position = self
            .get(target)
            .and_then(|t| t.transform)
            .map(|t| t.position)
            .unwrap_or(Vec3::ZERO);
        record.transform = Some(TransformComponent {
            position,
            orientation,
        });
        record.camera = Some(camera);
        self.insert(record);
        id
    }

    /// Spawn a notification-only projectile.
    pub fn spawn_projectile(
        &mut self,
        id: EntityId,
        owner: EntityId,
        position: Vec3,
        velocity: Vec3,
        lifetime_frames: u32,
    ) -> EntityId {
        let mut record = EntityRecord::new(id, EntityType::Projectile);
        let capsule = Capsule::new(PROJECTILE_RADIUS, Vec3::ZERO, Vec3::ZERO);
        record.transform = Some(TransformComponent::at(position));
        record.collider = Some(ColliderComponent::capsule(capsule).sensor());
        record.physics = Some(PhysicsComponent {
            velocity,
            ..Default::default()
        });
        record.projectile = Some(ProjectileComponent {
            owner,
            remaining_frames: lifetime_frames,
        });
        self.insert(record);
        id
    }

    /// Spawn static geometry.
    pub fn spawn_scenery(&mut self, id: EntityId, mesh: TriMesh, position: Vec3) -> EntityId {
        let mut record = EntityRecord::new(id, EntityType::Scenery);
        record.transform = Some(TransformComponent::at(position));
        record.collider = Some(ColliderComponent::trimesh(mesh));
        self.insert(record);
        id
    }

    /// Spawn the walled arena floor. Both processes call this first on a
    /// fresh world so the arena gets the same id everywhere.
    pub fn spawn_arena(&mut self) -> EntityId {
        let id = self.allocate_id();
        self.spawn_scenery(id, TriMesh::arena(ARENA_HALF_EXTENT, ARENA_WALL_HEIGHT), Vec3::ZERO)
    }

    /// Remove an entity and scrub it from every contact set.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityRecord> {
        let removed = self.entities.remove(&id)?;
        for record in self.entities.values_mut() {
            if let Some(collider) = record.collider.as_mut() {
                collider.contacts.remove(&id);
            }
        }
        Some(removed)
    }

    // =========================================================================
    // ACCESS
    // =========================================================================

    /// Record for `id`.
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    /// Mutable record for `id`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.entities.get_mut(&id)
    }

    /// Whether `id` is alive.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// No entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    /// Ids of entities carrying every component in `required`, ascending.
    pub fn query(&self, required: &ComponentSet) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|record| record.components().contains_all(required))
            .map(|record| record.id)
            .collect()
    }

    /// Entity controlled by `player_id`.
    pub fn player_entity(&self, player_id: PlayerId) -> Option<EntityId> {
        self.entities
            .values()
            .find(|r| r.entity_type == EntityType::Player && r.player_id == Some(player_id))
            .map(|r| r.id)
    }

    /// Camera following `target`.
    pub fn camera_for(&self, target: EntityId) -> Option<EntityId> {
        self.entities
            .values()
            .find(|r| r.camera.map(|c| c.target) == Some(target))
            .map(|r| r.id)
    }

    fn record(&self, id: EntityId) -> Result<&EntityRecord, WorldError> {
        self.entities.get(&id).ok_or(WorldError::UnknownEntity(id))
    }

    fn record_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord, WorldError> {
        self.entities.get_mut(&id).ok_or(WorldError::UnknownEntity(id))
    }

    /// Transform of `id`, or an error naming what is missing.
    pub fn transform(&self, id: EntityId) -> Result<&TransformComponent, WorldError> {
        let record = self.record(id)?;
        record.transform.as_ref().ok_or_else(|| record.missing(ComponentKind::Transform))
    }

    /// Mutable transform of `id`.
    pub fn transform_mut(&mut self, id: EntityId) -> Result<&mut TransformComponent, WorldError> {
        let record = self.record_mut(id)?;
        let missing = record.missing(ComponentKind::Transform);
        record.transform.as_mut().ok_or(missing)
    }

    /// Controller of `id`.
    pub fn controller(&self, id: EntityId) -> Result<&ThirdPersonControllerComponent, WorldError> {
        let record = self.record(id)?;
        record
            .controller
            .as_ref()
            .ok_or_else(|| record.missing(ComponentKind::ThirdPersonController))
    }

    /// Mutable controller of `id`.
    pub fn controller_mut(&mut self, id: EntityId) -> Result<&mut ThirdPersonControllerComponent, WorldError> {
        let record = self.record_mut(id)?;
        let missing = record.missing(ComponentKind::ThirdPersonController);
        record.controller.as_mut().ok_or(missing)
    }

    /// Collider of `id`.
    pub fn collider(&self, id: EntityId) -> Result<&ColliderComponent, WorldError> {
        let record = self.record(id)?;
        record.collider.as_ref().ok_or_else(|| record.missing(ComponentKind::Collider))
    }

    /// Mutable physics of `id`.
    pub fn physics_mut(&mut self, id: EntityId) -> Result<&mut PhysicsComponent, WorldError> {
        let record = self.record_mut(id)?;
        let missing = record.missing(ComponentKind::Physics);
        record.physics.as_mut().ok_or(missing)
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Wire snapshot of a replicated entity.
    pub fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot> {
        let record = self.entities.get(&id)?;
        if !record.entity_type.is_replicated() {
            return None;
        }
        let transform = record.transform?;

        let velocity = match (&record.controller, &record.physics) {
            (Some(controller), _) => controller.velocity,
            (None, Some(physics)) => physics.velocity,
            (None, None) => Vec3::ZERO,
        };

        Some(EntitySnapshot {
            entity_id: id,
            entity_type: record.entity_type,
            player_id: record.player_id,
            owner: record.projectile.map(|p| p.owner),
            position: transform.position,
            orientation: transform.orientation,
            velocity,
            impulses: record.physics.as_ref().map(|p| p.impulses.clone()).unwrap_or_default(),
            animation: record
                .animation
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| AnimationComponent::IDLE.to_string()),
            controller: record.controller.as_ref().map(ControllerSnapshot::from),
        })
    }

    /// Snapshots of every replicated entity.
    pub fn snapshots(&self) -> BTreeMap<EntityId, EntitySnapshot> {
        self.entities
            .keys()
            .filter_map(|id| self.snapshot(*id).map(|s| (*id, s)))
            .collect()
    }

    /// Overwrite an entity's state from a snapshot, creating it if unknown.
    pub fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) {
        let id = snapshot.entity_id;

        if !self.contains(id) {
            match snapshot.entity_type {
                EntityType::Player => {
                    let player_id = snapshot.player_id.unwrap_or(PlayerId(0));
                    self.spawn_player(id, player_id, snapshot.position);
                }
                EntityType::Projectile => {
                    let owner = snapshot.owner.unwrap_or(id);
                    self.spawn_projectile(id, owner, snapshot.position, snapshot.velocity, 0);
                }
                EntityType::Camera | EntityType::Scenery => {
                    warn!(entity = %id, entity_type = ?snapshot.entity_type, "Snapshot for non-replicated entity type ignored");
                    return;
                }
            }
            debug!(entity = %id, entity_type = ?snapshot.entity_type, "Entity created from snapshot");
        }

        let Some(record) = self.entities.get_mut(&id) else {
            return;
        };

        record.transform = Some(TransformComponent {
            position: snapshot.position,
            orientation: snapshot.orientation,
        });

        if let Some(controller) = record.controller.as_mut() {
            if let Some(state) = snapshot.controller {
                controller.base_velocity = state.base_velocity;
                controller.zip_velocity = state.zip_velocity;
                controller.movement_speed = state.movement_speed;
                controller.grounded = state.grounded;
            }
            controller.velocity = snapshot.velocity;
            controller.controller_velocity = snapshot.velocity - controller.base_velocity - controller.zip_velocity;
        }

        if let Some(physics) = record.physics.as_mut() {
            physics.impulses = snapshot.impulses.clone();
            if record.controller.is_none() {
                physics.velocity = snapshot.velocity;
            }
        }

        if let Some(animation) = record.animation.as_mut() {
            animation.name = snapshot.animation.clone();
        }

        record.refresh_collider();
    }

    // =========================================================================
    // HASHING
    // =========================================================================

    /// SHA-256 over every entity's simulation state in id order.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_world_state();
        hasher.update_u32(self.entities.len() as u32);

        for record in self.entities.values() {
            hasher.update_u32(record.id.0);
            hasher.update_u8(record.entity_type as u8);

            if let Some(transform) = &record.transform {
                hasher.update_vec3(transform.position);
                hasher.update_quat(transform.orientation);
            }
            if let Some(controller) = &record.controller {
                hasher.update_vec3(controller.base_velocity);
                hasher.update_vec3(controller.controller_velocity);
                hasher.update_vec3(controller.zip_velocity);
                hasher.update_f32(controller.movement_speed);
                hasher.update_bool(controller.grounded);
            }
            if let Some(physics) = &record.physics {
                hasher.update_vec3(physics.velocity);
                hasher.update_u32(physics.impulses.len() as u32);
                for (name, impulse) in &physics.impulses {
                    hasher.update_str(name);
                    hasher.update_vec3(impulse.velocity);
                    hasher.update_u32(impulse.elapsed_frames);
                }
            }
            if let Some(animation) = &record.animation {
                hasher.update_str(&animation.name);
            }
            if let Some(projectile) = &record.projectile {
                hasher.update_u32(projectile.owner.0);
                hasher.update_u32(projectile.remaining_frames);
            }
        }

        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_player() -> (World, EntityId) {
        let mut world = World::new();
        let floor = world.allocate_id();
        world.spawn_scenery(floor, TriMesh::quad(Vec3::ZERO, 100.0), Vec3::ZERO);
        let player = world.allocate_id();
        world.spawn_player(player, PlayerId(1), Vec3::new(0.0, 5.0, 0.0));
        (world, player)
    }

    #[test]
    fn test_query_by_components() {
        let (world, player) = world_with_player();

        let colliders = world.query(&ComponentSet::of(&[ComponentKind::Transform, ComponentKind::Collider]));
        assert_eq!(colliders, vec![EntityId(1), player]);

        let controllers = world.query(&ComponentSet::new().with(ComponentKind::ThirdPersonController));
        assert_eq!(controllers, vec![player]);
    }

    #[test]
    fn test_spawn_refreshes_collider() {
        let (world, player) = world_with_player();
        let capsule = world.collider(player).unwrap().world_capsule().unwrap();
        assert_eq!(capsule.bottom, Vec3::new(0.0, 5.0 + PLAYER_RADIUS, 0.0));
    }

    #[test]
    fn test_allocate_skips_inserted_ids() {
        let mut world = World::new();
        world.spawn_player(EntityId(10), PlayerId(1), Vec3::ZERO);
        assert_eq!(world.allocate_id(), EntityId(11));
    }

    #[test]
    fn test_missing_component_errors() {
        let (world, _) = world_with_player();
        assert_eq!(
            world.controller(EntityId(1)),
            Err(WorldError::MissingComponent {
                entity: EntityId(1),
                component: ComponentKind::ThirdPersonController,
            })
        );
        assert_eq!(world.transform(EntityId(99)), Err(WorldError::UnknownEntity(EntityId(99))));
    }

    #[test]
    fn test_snapshots_skip_scenery_and_cameras() {
        let (mut world, player) = world_with_player();
        let camera = world.allocate_id();
        world.spawn_camera(camera, player, Quat::IDENTITY);

        let snapshots = world.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.contains_key(&player));
        assert!(snapshots[&player].controller.is_some());
    }

    #[test]
    fn test_apply_snapshot_creates_unknown_entity() {
        let (server, player) = world_with_player();
        let snapshot = server.snapshot(player).unwrap();

        let mut client = World::new();
        client.apply_snapshot(&snapshot);

        let record = client.get(player).unwrap();
        assert_eq!(record.entity_type, EntityType::Player);
        assert_eq!(record.player_id, Some(PlayerId(1)));
        assert_eq!(client.transform(player).unwrap().position, Vec3::new(0.0, 5.0, 0.0));
        assert!(record.collider.as_ref().unwrap().world_capsule().is_some());
    }

    #[test]
    fn test_apply_snapshot_restores_controller() {
        let (mut world, player) = world_with_player();
        {
            let controller = world.controller_mut(player).unwrap();
            controller.base_velocity = Vec3::new(0.0, -12.0, 0.0);
            controller.zip_velocity = Vec3::new(0.0, 0.0, -40.0);
            controller.movement_speed = 8.0;
            controller.velocity = Vec3::new(8.0, -12.0, -40.0);
            controller.controller_velocity = Vec3::new(8.0, 0.0, 0.0);
        }
        let snapshot = world.snapshot(player).unwrap();

        let (mut other, _) = world_with_player();
        other.apply_snapshot(&snapshot);
        assert_eq!(other.controller(player), world.controller(player));
        assert_eq!(other.compute_hash(), world.compute_hash());
    }

    #[test]
    fn test_despawn_scrubs_contacts() {
        let (mut world, player) = world_with_player();
        world
            .get_mut(EntityId(1))
            .unwrap()
            .collider
            .as_mut()
            .unwrap()
            .contacts
            .insert(player);
        world.despawn(player);
        assert!(world.collider(EntityId(1)).unwrap().contacts.is_empty());
        assert!(world.despawn(player).is_none());
    }

    #[test]
    fn test_hash_tracks_state() {
        let (mut world, player) = world_with_player();
        let before = world.compute_hash();
        assert_eq!(before, world.clone().compute_hash());

        world.transform_mut(player).unwrap().position.x += 0.001;
        assert_ne!(before, world.compute_hash());
    }
}
