//! # Framesync Server
//!
//! Deterministic fixed-tick simulation core for a client/server game, with
//! client-side prediction, rollback and remote-entity interpolation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FRAMESYNC SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── math.rs     - Vector/quaternion helpers                 │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  collision/      - Character collision (deterministic)       │
//! │  ├── shape.rs    - Capsules, triangles, meshes               │
//! │  ├── geometry.rs - Closest-point queries                     │
//! │  ├── detect.rs   - Narrow-phase contacts                     │
//! │  └── resolve.rs  - Bounded iterative push-out                │
//! │                                                              │
//! │  game/           - Game logic (deterministic)                │
//! │  ├── world.rs    - Entity/component table                    │
//! │  ├── controller.rs - Third-person character controller       │
//! │  ├── step.rs     - Per-frame systems                         │
//! │  └── events.rs   - Game events                               │
//! │                                                              │
//! │  netcode/        - Buffers between network and simulation    │
//! │  ├── input_buffer.rs  - Server jitter buffer                 │
//! │  ├── history.rs       - Predicted command frames             │
//! │  ├── prediction.rs    - Reconciliation and replay            │
//! │  ├── interpolation.rs - Remote entity timeline               │
//! │  └── clock.rs         - Fixed-step accumulator               │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Message envelope and bodies               │
//! │  ├── dispatch.rs - Inbound queue and send capability         │
//! │  ├── server.rs   - Authoritative server                      │
//! │  ├── client.rs   - Predicting client                         │
//! │  └── driver.rs   - Fixed-step async loop                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `collision/` and `game/` modules are deterministic:
//! - Fixed delta per command frame, no system time
//! - No HashMap (uses BTreeMap/BTreeSet for sorted iteration)
//! - Stable sorts with a total order on floats
//!
//! Given the same world, inputs and config, a frame produces bit-identical
//! results, which is what makes rollback replay reproduce the prediction.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod collision;
pub mod config;
pub mod core;
pub mod game;
pub mod netcode;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, SimulationConfig};
pub use crate::core::hash::{StateHash, StateHasher};
pub use game::entity::{EntityId, EntityType, PlayerId};
pub use game::input::FrameInput;
pub use game::world::World;
pub use netcode::{CommandFrameClock, CommandFrameHistory, InputBuffer, StateBuffer};
pub use network::{GameClient, GameServer, Message};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
