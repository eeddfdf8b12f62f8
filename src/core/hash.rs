//! State Hashing for Verification
//!
//! Provides deterministic hashing of world state for:
//! - Checking that a rollback replay reproduces the original frames
//! - Comparing server and client worlds in the demo harness
//! - Debug logging of periodic checkpoints

use glam::{Quat, Vec3};
use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for world state.
///
/// Wraps SHA-256 with helpers for simulation types.
/// Floats are hashed by their bit pattern, so `0.0` and `-0.0` differ.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world state.
    pub fn for_world_state() -> Self {
        Self::new(b"FRAMESYNC_WORLD_V1")
    }

    /// Create hasher for a single entity snapshot.
    pub fn for_snapshot() -> Self {
        Self::new(b"FRAMESYNC_SNAPSHOT_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an f32 bit pattern.
    #[inline]
    pub fn update_f32(&mut self, value: f32) {
        self.update_u32(value.to_bits());
    }

    /// Update with a Vec3.
    #[inline]
    pub fn update_vec3(&mut self, value: Vec3) {
        self.update_f32(value.x);
        self.update_f32(value.y);
        self.update_f32(value.z);
    }

    /// Update with a Quat.
    #[inline]
    pub fn update_quat(&mut self, value: Quat) {
        self.update_f32(value.x);
        self.update_f32(value.y);
        self.update_f32(value.z);
        self.update_f32(value.w);
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Short hex prefix of a hash for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_determinism() {
        let mut a = StateHasher::for_world_state();
        let mut b = StateHasher::for_world_state();
        for hasher in [&mut a, &mut b] {
            hasher.update_u32(7);
            hasher.update_vec3(Vec3::new(1.0, 2.0, 3.0));
            hasher.update_quat(Quat::IDENTITY);
            hasher.update_str("idle");
        }
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domain_separation() {
        let a = StateHasher::for_world_state().finalize();
        let b = StateHasher::for_snapshot().finalize();
        assert_ne!(a, b);
    }

    #[test]
    fn test_float_bits_matter() {
        let mut a = StateHasher::for_world_state();
        a.update_f32(0.1);
        let mut b = StateHasher::for_world_state();
        b.update_f32(0.1 + f32::EPSILON);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_short_hex_length() {
        let hash = StateHasher::for_world_state().finalize();
        assert_eq!(short_hex(&hash).len(), 12);
    }
}
