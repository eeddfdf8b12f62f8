//! Simulation Configuration
//!
//! Every tunable the simulation core reads. Both processes must run with the
//! same values or prediction will drift from the authoritative world.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("Invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Configuration for the command-frame simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Duration of one command frame in milliseconds.
    pub command_frame_ms: u64,
    /// Largest wall-clock step fed into the frame accumulator.
    pub max_timestep_ms: u64,
    /// Frames of artificial latency added by the server input buffer.
    pub input_buffer_size: u64,
    /// Frames of interpolation latency on the client state buffer.
    pub state_buffer_size: u64,
    /// Server broadcasts a full snapshot every this many frames.
    pub snapshot_interval_frames: u64,

    /// Minimum dot(separating direction, up) for a contact to ground a character.
    pub grounded_strictness: f32,
    /// Resolutions allowed per entity in one collision resolution call.
    pub resolve_count_max: u32,

    /// Downward acceleration (units/s^2).
    pub gravity: f32,
    /// Upward velocity added by a jump (units/s).
    pub jump_speed: f32,
    /// Magnitude the zip velocity grows toward (units/s).
    pub zip_speed: f32,
    /// Zip velocity growth per frame while held.
    pub zip_acceleration: f32,
    /// Zip velocity multiplier per frame once released.
    pub zip_decay: f32,
    /// Zip speed below which a decaying zip snaps to zero.
    pub zip_epsilon: f32,

    /// Movement speed gained per frame below `movement_soft_cap`.
    pub movement_ramp_fast: f32,
    /// Movement speed gained per frame between the soft cap and the max.
    pub movement_ramp_slow: f32,
    /// Speed at which the ramp switches from fast to slow.
    pub movement_soft_cap: f32,
    /// Movement speed never exceeds this.
    pub movement_max_speed: f32,

    /// Anything below this height has fallen through the world.
    pub world_floor_y: f32,
    /// Height a fallen entity is reset to.
    pub respawn_height: f32,

    /// Extra frames behind the lookup frame searched during reconciliation.
    pub history_lookup_tolerance: u64,
    /// Position tolerance for a prediction hit (world units).
    pub prediction_epsilon: f32,
    /// Orientation tolerance for a prediction hit (radians).
    pub prediction_orientation_epsilon: f32,
    /// Maximum command frame records kept by the client.
    pub history_capacity: usize,

    /// Client sends a ping every this many frames.
    pub ping_interval_frames: u64,

    /// Projectile launch speed (units/s).
    pub projectile_speed: f32,
    /// Frames a projectile lives before despawning.
    pub projectile_lifetime_frames: u32,
    /// Knockback impulse speed applied to a character hit by a projectile.
    pub projectile_knockback: f32,
    /// Duration of the knockback impulse in frames.
    pub knockback_frames: u32,
    /// Frames between projectile launches for one player.
    pub fire_cooldown_frames: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command_frame_ms: 16,
            max_timestep_ms: 250,
            input_buffer_size: 6,
            state_buffer_size: 10,
            snapshot_interval_frames: 10,
            grounded_strictness: 0.85,
            resolve_count_max: 10,
            gravity: 250.0,
            jump_speed: 150.0,
            zip_speed: 400.0,
            zip_acceleration: 40.0,
            zip_decay: 0.99,
            zip_epsilon: 1.0,
            movement_ramp_fast: 4.0,
            movement_ramp_slow: 1.0,
            movement_soft_cap: 60.0,
            movement_max_speed: 100.0,
            world_floor_y: -1000.0,
            respawn_height: 25.0,
            history_lookup_tolerance: 1,
            prediction_epsilon: 0.01,
            prediction_orientation_epsilon: 0.01,
            history_capacity: 600,
            ping_interval_frames: 60,
            projectile_speed: 300.0,
            projectile_lifetime_frames: 120,
            projectile_knockback: 80.0,
            knockback_frames: 12,
            fire_cooldown_frames: 30,
        }
    }
}

impl SimulationConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_frame_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "command_frame_ms",
                reason: "must be at least 1ms",
            });
        }
        if self.max_timestep_ms < self.command_frame_ms {
            return Err(ConfigError::Invalid {
                field: "max_timestep_ms",
                reason: "must be at least one command frame",
            });
        }
        if self.input_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "input_buffer_size",
                reason: "must be at least one frame",
            });
        }
        if self.state_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "state_buffer_size",
                reason: "must be at least one frame",
            });
        }
        if self.snapshot_interval_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "snapshot_interval_frames",
                reason: "must be at least one frame",
            });
        }
        if !(self.grounded_strictness > 0.0 && self.grounded_strictness <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "grounded_strictness",
                reason: "must be in (0, 1]",
            });
        }
        if self.resolve_count_max == 0 {
            return Err(ConfigError::Invalid {
                field: "resolve_count_max",
                reason: "must allow at least one resolution",
            });
        }
        if !(self.zip_decay > 0.0 && self.zip_decay < 1.0) {
            return Err(ConfigError::Invalid {
                field: "zip_decay",
                reason: "must be in (0, 1)",
            });
        }
        if !(self.prediction_epsilon >= 0.0 && self.prediction_orientation_epsilon >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "prediction_epsilon",
                reason: "tolerances must be non-negative",
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "history_capacity",
                reason: "must hold at least one record",
            });
        }
        Ok(())
    }

    /// Fixed simulation step in seconds.
    #[inline]
    pub fn delta_seconds(&self) -> f32 {
        self.command_frame_ms as f32 / 1000.0
    }

    /// Fixed simulation step as a Duration.
    #[inline]
    pub fn command_frame_duration(&self) -> Duration {
        Duration::from_millis(self.command_frame_ms)
    }

    /// Accumulator clamp as a Duration.
    #[inline]
    pub fn max_timestep(&self) -> Duration {
        Duration::from_millis(self.max_timestep_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grounded_strictness, 0.85);
        assert_eq!(config.resolve_count_max, 10);
        assert_eq!(config.snapshot_interval_frames, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulationConfig::from_json_str(r#"{ "input_buffer_size": 3, "gravity": 9.8 }"#).unwrap();
        assert_eq!(config.input_buffer_size, 3);
        assert_eq!(config.gravity, 9.8);
        assert_eq!(config.command_frame_ms, 16);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = SimulationConfig::from_json_str(r#"{ "resolve_count_max": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "resolve_count_max", .. })));

        let result = SimulationConfig::from_json_str(r#"{ "grounded_strictness": 1.5 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "grounded_strictness", .. })));

        let result = SimulationConfig::from_json_str(r#"{ "command_frame_ms": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "command_frame_ms", .. })));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let result = SimulationConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_delta_seconds() {
        let config = SimulationConfig {
            command_frame_ms: 20,
            ..Default::default()
        };
        assert!((config.delta_seconds() - 0.02).abs() < 1e-7);
        assert_eq!(config.command_frame_duration(), Duration::from_millis(20));
    }
}
