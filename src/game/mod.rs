//! Game Logic Module
//!
//! All command-frame simulation code. Deterministic given the same world,
//! inputs and config.
//!
//! ## Module Structure
//!
//! - `entity`: Entity ids, types and component query sets
//! - `components`: Component data (transform, controller, physics, ...)
//! - `world`: The component table and snapshot application
//! - `snapshot`: Wire view of replicated entities
//! - `input`: Per-frame input flags
//! - `controller`: Third-person character controller
//! - `step`: Per-frame systems and the server frame
//! - `events`: Game events shipped with state updates

pub mod components;
pub mod controller;
pub mod entity;
pub mod events;
pub mod input;
pub mod snapshot;
pub mod step;
pub mod world;

// Re-export key types
pub use components::{
    AnimationComponent, CameraComponent, Impulse, PhysicsComponent, ProjectileComponent,
    ThirdPersonControllerComponent, TransformComponent,
};
pub use entity::{ComponentKind, ComponentSet, EntityId, EntityType, PlayerId};
pub use events::{GameEvent, GameEventData};
pub use input::FrameInput;
pub use snapshot::{ControllerSnapshot, EntitySnapshot};
pub use step::TickResult;
pub use world::{EntityRecord, World, WorldError};
