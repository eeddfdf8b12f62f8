//! Collision Detection and Resolution
//!
//! - `shape`: capsules, triangles, meshes and their world-space transforms
//! - `geometry`: closest-point queries
//! - `collider`: the collider component
//! - `detect`: pair classification and narrow-phase contacts
//! - `resolve`: bounded iterative push-out and grounded state

pub mod collider;
pub mod detect;
pub mod geometry;
pub mod resolve;
pub mod shape;

pub use collider::ColliderComponent;
pub use detect::{Contact, ContactKind, CollisionPair, PairKind};
pub use resolve::{resolve_collisions, CollisionScope, ResolutionReport};
pub use shape::{Aabb, Capsule, Placement, Triangle, TriMesh};
