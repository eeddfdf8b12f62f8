//! Frame Input
//!
//! One command frame's worth of player intent: packed key flags plus the
//! camera orientation the player was looking through when they pressed them.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Input state for a single command frame.
///
/// This is the minimal input that affects game state.
/// NO frame number - the frame is carried by the message envelope.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    /// Key flags (packed bits):
    /// - Bit 0: Forward (W)
    /// - Bit 1: Back (S)
    /// - Bit 2: Left (A)
    /// - Bit 3: Right (D)
    /// - Bit 4: Jump (space)
    /// - Bit 5: Down (shift)
    /// - Bit 6: Zip held
    /// - Bit 7: Fire
    pub flags: u8,

    /// Camera orientation when the input was captured.
    pub camera_orientation: Quat,
}

impl FrameInput {
    /// Forward flag bit
    pub const FLAG_FORWARD: u8 = 0x01;
    /// Back flag bit
    pub const FLAG_BACK: u8 = 0x02;
    /// Left flag bit
    pub const FLAG_LEFT: u8 = 0x04;
    /// Right flag bit
    pub const FLAG_RIGHT: u8 = 0x08;
    /// Jump flag bit
    pub const FLAG_JUMP: u8 = 0x10;
    /// Down flag bit
    pub const FLAG_DOWN: u8 = 0x20;
    /// Zip flag bit
    pub const FLAG_ZIP: u8 = 0x40;
    /// Fire flag bit
    pub const FLAG_FIRE: u8 = 0x80;

    /// Flags that contribute to horizontal movement.
    const MOVEMENT_MASK: u8 = Self::FLAG_FORWARD | Self::FLAG_BACK | Self::FLAG_LEFT | Self::FLAG_RIGHT;

    /// Create an empty input looking down -Z.
    pub const fn new() -> Self {
        Self {
            flags: 0,
            camera_orientation: Quat::IDENTITY,
        }
    }

    /// Create input from flags and a camera orientation.
    pub const fn with_flags(flags: u8, camera_orientation: Quat) -> Self {
        Self {
            flags,
            camera_orientation,
        }
    }

    /// Check a flag.
    #[inline]
    pub fn pressed(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Set or clear a flag.
    #[inline]
    pub fn set(&mut self, flag: u8, pressed: bool) {
        if pressed {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Check if zip is held.
    #[inline]
    pub fn zip_held(&self) -> bool {
        self.pressed(Self::FLAG_ZIP)
    }

    /// Check if fire is held.
    #[inline]
    pub fn fire_pressed(&self) -> bool {
        self.pressed(Self::FLAG_FIRE)
    }

    /// Check if any movement key is held.
    #[inline]
    pub fn has_movement(&self) -> bool {
        self.flags & Self::MOVEMENT_MASK != 0
    }

    /// Control vector with each axis in {-1, 0, 1}.
    ///
    /// x = right - left, y = jump - down, z = forward - back.
    pub fn control_vector(&self) -> Vec3 {
        let axis = |positive: u8, negative: u8| -> f32 {
            (self.pressed(positive) as i8 - self.pressed(negative) as i8) as f32
        };
        Vec3::new(
            axis(Self::FLAG_RIGHT, Self::FLAG_LEFT),
            axis(Self::FLAG_JUMP, Self::FLAG_DOWN),
            axis(Self::FLAG_FORWARD, Self::FLAG_BACK),
        )
    }
}

impl Default for FrameInput {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
