//! Command Frame Step
//!
//! The deterministic systems run once per command frame. Given the same
//! world, input and config they produce bit-identical results, which is what
//! lets the client replay history after a misprediction.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::warn;

pub use crate::collision::resolve::{resolve_collisions, CollisionScope, ResolutionReport};
use crate::config::SimulationConfig;
use crate::core::math::{flat_direction, forward, WORLD_UP};
use crate::game::components::Impulse;
use crate::game::controller::{animation_for, update_controller};
use crate::game::entity::{ComponentKind, ComponentSet, EntityId, EntityType};
use crate::game::events::GameEvent;
use crate::game::input::FrameInput;
use crate::game::world::{World, WorldError, PLAYER_HEIGHT, PLAYER_RADIUS, PROJECTILE_RADIUS};

/// Name of the impulse applied by projectile hits.
pub const KNOCKBACK_IMPULSE: &str = "knockback";

/// Result of one server frame.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this frame, sorted
    pub events: Vec<GameEvent>,
    /// Collision resolution outcome
    pub resolution: ResolutionReport,
}

/// Run one player's character for one command frame.
///
/// Updates the camera orientation from the input, runs the controller,
/// integrates impulses, picks the animation and moves the camera behind the
/// character. Collision resolution is a separate step.
pub fn simulate_player(
    world: &mut World,
    entity: EntityId,
    input: &FrameInput,
    config: &SimulationConfig,
) -> Result<(), WorldError> {
    let delta = config.delta_seconds();
    let camera = world.camera_for(entity);

    let record = world.get_mut(entity).ok_or(WorldError::UnknownEntity(entity))?;
    for (present, component) in [
        (record.transform.is_some(), ComponentKind::Transform),
        (record.controller.is_some(), ComponentKind::ThirdPersonController),
    ] {
        if !present {
            return Err(WorldError::MissingComponent { entity, component });
        }
    }

    if let (Some(transform), Some(controller)) = (record.transform.as_mut(), record.controller.as_mut()) {
        update_controller(delta, controller, transform, input.camera_orientation, input, config);

        if let Some(physics) = record.physics.as_mut() {
            transform.position += physics.step() * delta;
        }

        if let Some(animation) = record.animation.as_mut() {
            let name = animation_for(controller);
            if animation.name != name {
                animation.name = name.to_string();
            }
        }
    }
    record.refresh_collider();

    if let Some(camera) = camera {
        follow_camera(world, camera, entity, input)?;
    }

    Ok(())
}

/// Place a camera behind and above its target, looking where the input looks.
fn follow_camera(world: &mut World, camera: EntityId, target: EntityId, input: &FrameInput) -> Result<(), WorldError> {
    let target_position = world.transform(target)?.position;
    let record = world.get_mut(camera).ok_or(WorldError::UnknownEntity(camera))?;
    let Some(settings) = record.camera else {
        return Ok(());
    };
    let Some(transform) = record.transform.as_mut() else {
        return Ok(());
    };

    transform.orientation = input.camera_orientation;
    transform.position = target_position + WORLD_UP * settings.follow_height
        - forward(input.camera_orientation) * settings.follow_distance;
    Ok(())
}

// =============================================================================
// SERVER FRAME
// =============================================================================

/// Run one authoritative frame: players, projectile launches, projectile
/// flight, collision resolution, then projectile hits and expiry.
///
/// `inputs` maps player entities to the input applied this frame.
/// `last_fired` records the frame each entity last launched a projectile.
pub fn tick_server_world(
    world: &mut World,
    frame: u64,
    inputs: &BTreeMap<EntityId, FrameInput>,
    last_fired: &mut BTreeMap<EntityId, u64>,
    config: &SimulationConfig,
) -> TickResult {
    let mut result = TickResult::default();

    // 1. Characters (BTreeMap iterates in id order - DETERMINISTIC)
    for (entity, input) in inputs {
        if let Err(e) = simulate_player(world, *entity, input, config) {
            warn!(entity = %entity, error = %e, "Skipping player simulation");
        }
    }

    // 2. Launches
    for (entity, input) in inputs {
        if !input.fire_pressed() {
            continue;
        }
        let ready = last_fired
            .get(entity)
            .map_or(true, |last| frame >= last + config.fire_cooldown_frames);
        if !ready {
            continue;
        }
        if let Some(event) = fire_projectile(world, *entity, input, frame, config) {
            last_fired.insert(*entity, frame);
            result.events.push(event);
        }
    }

    // 3. Flight and expiry
    let expired = advance_projectiles(world, config);

    // 4. Push-out and contact sets
    result.resolution = resolve_collisions(world, CollisionScope::All, config);

    // 5. Hits
    let mut despawn = expired;
    for (projectile, hit) in projectile_hits(world) {
        if let Some(target) = hit {
            apply_knockback(world, projectile, target, config);
            let point = world.transform(projectile).map(|t| t.position).unwrap_or(Vec3::ZERO);
            result.events.push(GameEvent::projectile_hit(frame, projectile, target, point));
        }
        despawn.push(projectile);
    }

    despawn.sort();
    despawn.dedup();
    for id in despawn {
        if world.despawn(id).is_some() {
            result.events.push(GameEvent::entity_despawned(frame, id));
        }
    }

    result.events.sort();
    result
}

/// Spawn a projectile in front of `shooter` along camera-forward.
fn fire_projectile(
    world: &mut World,
    shooter: EntityId,
    input: &FrameInput,
    frame: u64,
    config: &SimulationConfig,
) -> Option<GameEvent> {
    let origin = world.transform(shooter).ok()?.position;
    let direction = forward(input.camera_orientation).normalize_or_zero();
    if direction == Vec3::ZERO {
        return None;
    }

    let muzzle = origin
        + WORLD_UP * (PLAYER_HEIGHT * 0.5)
        + direction * (PLAYER_RADIUS + PROJECTILE_RADIUS + 1.0);
    let id = world.allocate_id();
    world.spawn_projectile(
        id,
        shooter,
        muzzle,
        direction * config.projectile_speed,
        config.projectile_lifetime_frames,
    );

    Some(GameEvent::projectile_fired(frame, id, shooter, muzzle, direction))
}

/// Move projectiles and count down their lifetimes. Returns the expired ones.
fn advance_projectiles(world: &mut World, config: &SimulationConfig) -> Vec<EntityId> {
    let delta = config.delta_seconds();
    let query = ComponentSet::of(&[ComponentKind::Transform, ComponentKind::Physics, ComponentKind::Projectile]);
    let mut expired = Vec::new();

    for id in world.query(&query) {
        let Some(record) = world.get_mut(id) else {
            continue;
        };
        let (Some(transform), Some(physics), Some(projectile)) = (
            record.transform.as_mut(),
            record.physics.as_mut(),
            record.projectile.as_mut(),
        ) else {
            continue;
        };

        transform.position += physics.step() * delta;
        projectile.remaining_frames = projectile.remaining_frames.saturating_sub(1);
        if projectile.remaining_frames == 0 {
            expired.push(id);
        }
        record.refresh_collider();
    }

    expired
}

/// Projectiles touching something other than their owner, with the player
/// they hit (if the first thing touched is a player).
fn projectile_hits(world: &World) -> Vec<(EntityId, Option<EntityId>)> {
    let query = ComponentSet::of(&[ComponentKind::Collider, ComponentKind::Projectile]);
    let mut hits = Vec::new();

    for id in world.query(&query) {
        let Some(record) = world.get(id) else {
            continue;
        };
        let (Some(collider), Some(projectile)) = (&record.collider, &record.projectile) else {
            continue;
        };

        // Contacts are ordered, so the lowest id wins ties
        let struck = collider.contacts.iter().copied().find(|other| {
            *other != projectile.owner
                && world
                    .get(*other)
                    .map_or(false, |r| r.entity_type != EntityType::Projectile)
        });

        if let Some(other) = struck {
            let is_player = world.get(other).map_or(false, |r| r.entity_type == EntityType::Player);
            hits.push((id, is_player.then_some(other)));
        }
    }

    hits
}

/// Push `target` away along the projectile's horizontal travel.
fn apply_knockback(world: &mut World, projectile: EntityId, target: EntityId, config: &SimulationConfig) {
    let travel = world
        .get(projectile)
        .and_then(|r| r.physics.as_ref())
        .map(|p| p.velocity)
        .unwrap_or(Vec3::ZERO);
    let direction = flat_direction(travel);

    if let Ok(physics) = world.physics_mut(target) {
        physics.apply_impulse(
            KNOCKBACK_IMPULSE,
            Impulse::new(direction * config.projectile_knockback, config.knockback_frames),
        );
    }
}
