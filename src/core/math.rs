//! Vector and Quaternion Helpers
//!
//! Small helpers over `glam` shared by the controller, the collision code and
//! the interpolator. Every helper is a pure function of its arguments so a
//! replayed command frame produces the same bits as the original run.

use glam::{Quat, Vec3};

/// World up axis (+Y).
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Lengths below this are treated as zero.
pub const EPSILON: f32 = 1e-6;

/// Forward direction of an orientation (-Z in local space).
#[inline]
pub fn forward(orientation: Quat) -> Vec3 {
    orientation * Vec3::NEG_Z
}

/// Right direction of an orientation (+X in local space).
#[inline]
pub fn right(orientation: Quat) -> Vec3 {
    orientation * Vec3::X
}

/// Drop the vertical component of a vector.
#[inline]
pub fn flatten_y(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Flatten onto the XZ plane and normalize.
/// Returns ZERO when the flattened vector has no length.
#[inline]
pub fn flat_direction(v: Vec3) -> Vec3 {
    let flat = flatten_y(v);
    if flat.length_squared() <= EPSILON * EPSILON {
        return Vec3::ZERO;
    }
    flat.normalize()
}

/// Yaw-only rotation whose forward (-Z) axis points along `direction`.
///
/// Returns `None` when the direction has no horizontal component.
pub fn look_rotation_y(direction: Vec3) -> Option<Quat> {
    let flat = flat_direction(direction);
    if flat == Vec3::ZERO {
        return None;
    }
    // rotation_y(a) maps -Z to (-sin a, 0, -cos a)
    let yaw = (-flat.x).atan2(-flat.z);
    Some(Quat::from_rotation_y(yaw))
}

/// Component-wise approximate equality.
#[inline]
pub fn vec3_approx_eq(a: Vec3, b: Vec3, epsilon: f32) -> bool {
    a.abs_diff_eq(b, epsilon)
}

/// Whether two rotations differ by at most `max_angle` radians.
///
/// `q` and `-q` describe the same rotation and compare equal.
#[inline]
pub fn quat_approx_eq(a: Quat, b: Quat, max_angle: f32) -> bool {
    a.angle_between(b) <= max_angle
}

/// Linear interpolation that returns `a` unchanged when both ends match.
#[inline]
pub fn lerp_vec3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    if a == b {
        return a;
    }
    a.lerp(b, t)
}

/// Spherical interpolation that returns `a` unchanged when both ends match.
///
/// `Quat::slerp` renormalizes near-parallel inputs, which can move the last
/// bit of an otherwise identical rotation.
#[inline]
pub fn slerp_quat(a: Quat, b: Quat, t: f32) -> Quat {
    if a == b {
        return a;
    }
    a.slerp(b, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_forward_and_right_identity() {
        assert_eq!(forward(Quat::IDENTITY), Vec3::NEG_Z);
        assert_eq!(right(Quat::IDENTITY), Vec3::X);
    }

    #[test]
    fn test_flat_direction_zero_guard() {
        assert_eq!(flat_direction(Vec3::new(0.0, 5.0, 0.0)), Vec3::ZERO);
        let dir = flat_direction(Vec3::new(3.0, 7.0, 4.0));
        assert!((dir.length() - 1.0).abs() < 1e-6);
        assert_eq!(dir.y, 0.0);
    }

    #[test]
    fn test_look_rotation_y_points_forward_along_direction() {
        for dir in [Vec3::X, Vec3::NEG_X, Vec3::Z, Vec3::NEG_Z, Vec3::new(1.0, 0.0, 1.0)] {
            let rotation = look_rotation_y(dir).unwrap();
            let expected = dir.normalize();
            assert!(vec3_approx_eq(forward(rotation), expected, 1e-5), "dir {:?}", dir);
        }
        assert!(look_rotation_y(Vec3::Y).is_none());
    }

    #[test]
    fn test_quat_approx_eq_ignores_sign() {
        let q = Quat::from_rotation_y(FRAC_PI_2);
        assert!(quat_approx_eq(q, -q, 1e-6));
        assert!(!quat_approx_eq(q, Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_quat_approx_eq_is_an_angle() {
        let yaw = Quat::from_rotation_y(3f32.to_radians());
        assert!(!quat_approx_eq(yaw, Quat::IDENTITY, 1f32.to_radians()));
        assert!(quat_approx_eq(yaw, Quat::IDENTITY, 4f32.to_radians()));
    }

    #[test]
    fn test_interpolation_of_identical_endpoints_is_exact() {
        let p = Vec3::new(1.234_567, -9.876_543, 0.000_123);
        let q = Quat::from_euler(glam::EulerRot::YXZ, 0.3, 0.2, 0.1);
        for i in 0..=10 {
            let t = i as f32 / 10.0;
            assert_eq!(lerp_vec3(p, p, t), p);
            assert_eq!(slerp_quat(q, q, t), q);
        }
    }
}
