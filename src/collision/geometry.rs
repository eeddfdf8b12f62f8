//! Closest-Point Geometry
//!
//! Segment, triangle and segment-pair queries used by the narrow phase.
//! Formulations follow Ericson, "Real-Time Collision Detection", ch. 5.

use glam::Vec3;

use crate::core::math::EPSILON;

/// Closest point on segment `a..b` to `p`, with its parameter in `[0, 1]`.
#[inline]
pub fn closest_point_on_segment(a: Vec3, b: Vec3, p: Vec3) -> (Vec3, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= EPSILON {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Closest points between segments `p1..q1` and `p2..q2`.
///
/// Returns `(on_first, on_second)`.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    // Both segments degenerate into points
    if a <= EPSILON && e <= EPSILON {
        return (p1, p2);
    }

    let (s, t) = if a <= EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;

            // Parallel segments: pick s = 0 and let t clamp
            let mut s = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;

            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}

/// Closest point on triangle `abc` to `p`.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;

    // Vertex region outside A
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    // Vertex region outside B
    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    // Edge region AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    // Vertex region outside C
    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    // Edge region AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    // Edge region BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    // Face region
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Point where segment `p..q` crosses triangle `abc`, if it does.
pub fn segment_triangle_intersection(p: Vec3, q: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<Vec3> {
    let dir = q - p;
    let e1 = b - a;
    let e2 = c - a;
    let h = dir.cross(e2);
    let det = e1.dot(h);
    if det.abs() <= EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = p - a;
    let u = inv_det * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qv = s.cross(e1);
    let v = inv_det * dir.dot(qv);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = inv_det * e2.dot(qv);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }

    Some(p + dir * t)
}

/// Closest pair between a segment and a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTriangleClosest {
    /// Point on the segment.
    pub on_segment: Vec3,
    /// Point on the triangle.
    pub on_triangle: Vec3,
    /// Distance between the two points.
    pub distance: f32,
}

/// Closest points between segment `p..q` and triangle `abc`.
///
/// If the segment pierces the triangle the distance is zero. Otherwise the
/// closest pair involves a segment endpoint against the triangle, or the
/// segment against one of the three edges. Ties keep the first candidate.
pub fn closest_points_segment_triangle(p: Vec3, q: Vec3, a: Vec3, b: Vec3, c: Vec3) -> SegmentTriangleClosest {
    if let Some(hit) = segment_triangle_intersection(p, q, a, b, c) {
        return SegmentTriangleClosest {
            on_segment: hit,
            on_triangle: hit,
            distance: 0.0,
        };
    }

    let mut best_segment = p;
    let mut best_triangle = closest_point_on_triangle(p, a, b, c);
    let mut best_dist_sq = best_segment.distance_squared(best_triangle);

    let mut consider = |on_segment: Vec3, on_triangle: Vec3| {
        let dist_sq = on_segment.distance_squared(on_triangle);
        if dist_sq < best_dist_sq {
            best_dist_sq = dist_sq;
            best_segment = on_segment;
            best_triangle = on_triangle;
        }
    };

    consider(q, closest_point_on_triangle(q, a, b, c));
    for (e0, e1) in [(a, b), (b, c), (c, a)] {
        let (on_segment, on_edge) = closest_points_between_segments(p, q, e0, e1);
        consider(on_segment, on_edge);
    }

    SegmentTriangleClosest {
        on_segment: best_segment,
        on_triangle: best_triangle,
        distance: best_dist_sq.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_triangle() -> (Vec3, Vec3, Vec3) {
        (
            Vec3::new(-5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
        )
    }

    #[test]
    fn test_closest_point_on_segment_clamps() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(closest_point_on_segment(a, b, Vec3::new(-3.0, 1.0, 0.0)).0, a);
        assert_eq!(closest_point_on_segment(a, b, Vec3::new(13.0, 1.0, 0.0)).0, b);
        let (mid, t) = closest_point_on_segment(a, b, Vec3::new(4.0, 2.0, 0.0));
        assert_eq!(mid, Vec3::new(4.0, 0.0, 0.0));
        assert!((t - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_vertical_segments() {
        let (c1, c2) = closest_points_between_segments(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(1.5, 0.0, 0.0),
            Vec3::new(1.5, 2.0, 0.0),
        );
        assert!((c1.distance(c2) - 1.5).abs() < 1e-6);
        assert_eq!(c1.y, c2.y);
    }

    #[test]
    fn test_crossing_segments() {
        let (c1, c2) = closest_points_between_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert!(c1.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!(c2.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let (a, b, c) = floor_triangle();
        // Above the face
        let face = closest_point_on_triangle(Vec3::new(-2.0, 3.0, 1.0), a, b, c);
        assert!(face.abs_diff_eq(Vec3::new(-2.0, 0.0, 1.0), 1e-6));
        // Beyond vertex A
        let vertex = closest_point_on_triangle(Vec3::new(-9.0, 1.0, -9.0), a, b, c);
        assert_eq!(vertex, a);
    }

    #[test]
    fn test_segment_piercing_triangle() {
        let (a, b, c) = floor_triangle();
        let hit = segment_triangle_intersection(
            Vec3::new(-2.0, 1.0, 1.0),
            Vec3::new(-2.0, -1.0, 1.0),
            a,
            b,
            c,
        );
        assert!(hit.unwrap().abs_diff_eq(Vec3::new(-2.0, 0.0, 1.0), 1e-6));

        let closest = closest_points_segment_triangle(
            Vec3::new(-2.0, 1.0, 1.0),
            Vec3::new(-2.0, -1.0, 1.0),
            a,
            b,
            c,
        );
        assert_eq!(closest.distance, 0.0);
    }

    #[test]
    fn test_segment_above_triangle() {
        let (a, b, c) = floor_triangle();
        let closest = closest_points_segment_triangle(
            Vec3::new(-2.0, 0.5, 1.0),
            Vec3::new(-2.0, 1.5, 1.0),
            a,
            b,
            c,
        );
        assert!((closest.distance - 0.5).abs() < 1e-6);
        assert!(closest.on_segment.abs_diff_eq(Vec3::new(-2.0, 0.5, 1.0), 1e-6));
        assert!(closest.on_triangle.abs_diff_eq(Vec3::new(-2.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn test_horizontal_segment_beside_triangle_edge() {
        let (a, b, c) = floor_triangle();
        // Runs parallel to edge AB at x = -6, one unit outside
        let closest = closest_points_segment_triangle(
            Vec3::new(-6.0, 0.0, -1.0),
            Vec3::new(-6.0, 0.0, 1.0),
            a,
            b,
            c,
        );
        assert!((closest.distance - 1.0).abs() < 1e-5);
    }
}
