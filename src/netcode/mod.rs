//! Netcode
//!
//! Buffers and bookkeeping that sit between the network and the
//! deterministic simulation.
//!
//! - `input_buffer`: server-side jitter buffer for player inputs
//! - `history`: client-side record of predicted command frames
//! - `prediction`: reconciliation against authoritative snapshots
//! - `interpolation`: client-side timeline of remote entity state
//! - `clock`: fixed-step accumulator

pub mod clock;
pub mod history;
pub mod input_buffer;
pub mod interpolation;
pub mod prediction;

pub use clock::CommandFrameClock;
pub use history::{CommandFrameHistory, CommandFrameRecord};
pub use input_buffer::{BufferedInput, InputBuffer, InputBufferError};
pub use interpolation::{EntityBundle, StateBuffer};
pub use prediction::{predict_frame, reconcile, FrameReference, Reconciliation};
