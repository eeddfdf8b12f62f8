//! Core deterministic primitives.
//!
//! Math helpers and state hashing shared by the simulation, the collision
//! engine and the netcode buffers.

pub mod hash;
pub mod math;

// Re-export core types
pub use hash::{StateHash, StateHasher};
pub use math::{WORLD_UP, EPSILON};
