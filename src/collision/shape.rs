//! Collider Shapes
//!
//! Capsules and triangle meshes in local space, plus the world-space copies
//! produced by applying an entity transform.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid placement applied to a local-space shape.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// World position of the shape origin.
    pub position: Vec3,
    /// World orientation of the shape.
    pub orientation: Quat,
}

impl Placement {
    /// Placement at `position` with identity orientation.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }

    /// Map a local point into world space.
    #[inline]
    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.position + self.orientation * point
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

// =============================================================================
// AABB
// =============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Box enclosing every point. An empty slice yields a box at the origin.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            };
        };
        points.iter().skip(1).fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| Self {
                min: acc.min.min(*p),
                max: acc.max.max(*p),
            },
        )
    }

    /// Smallest box enclosing both.
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow every face outward by `amount`.
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Check overlap (touching counts).
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }
}

// =============================================================================
// CAPSULE
// =============================================================================

/// Capsule: a line segment swept by a sphere.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    /// Sphere radius.
    pub radius: f32,
    /// Upper segment endpoint.
    pub top: Vec3,
    /// Lower segment endpoint.
    pub bottom: Vec3,
}

impl Capsule {
    /// Create a capsule from its segment and radius.
    pub fn new(radius: f32, top: Vec3, bottom: Vec3) -> Self {
        Self { radius, top, bottom }
    }

    /// Upright capsule whose lowest point sits at the local origin.
    ///
    /// `height` is the full extent including both caps.
    pub fn standing(radius: f32, height: f32) -> Self {
        let segment_top = (height - radius).max(radius);
        Self {
            radius,
            top: Vec3::new(0.0, segment_top, 0.0),
            bottom: Vec3::new(0.0, radius, 0.0),
        }
    }

    /// World-space copy under `placement`.
    pub fn transform(&self, placement: &Placement) -> Self {
        Self {
            radius: self.radius,
            top: placement.apply(self.top),
            bottom: placement.apply(self.bottom),
        }
    }

    /// Bounds of the swept sphere.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&[self.top, self.bottom]).expanded(self.radius)
    }
}

// =============================================================================
// TRIANGLE MESH
// =============================================================================

/// One triangle with its precomputed unit normal.
///
/// The normal follows the right-hand rule over `points` (counter-clockwise
/// winding when viewed from the front face).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    /// Vertices.
    pub points: [Vec3; 3],
    /// Front-face unit normal.
    pub normal: Vec3,
}

impl Triangle {
    /// Create a triangle and compute its normal.
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            points: [a, b, c],
            normal: (b - a).cross(c - a).normalize_or_zero(),
        }
    }

    /// World-space copy under `placement`.
    pub fn transform(&self, placement: &Placement) -> Self {
        Self {
            points: self.points.map(|p| placement.apply(p)),
            normal: (placement.orientation * self.normal).normalize_or_zero(),
        }
    }

    /// Bounds of the three vertices.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.points)
    }
}

/// Static triangle soup with a cached bounding box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriMesh {
    triangles: Vec<Triangle>,
    bounds: Aabb,
}

impl TriMesh {
    /// Build a mesh from triangles.
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let bounds = triangles
            .iter()
            .map(Triangle::aabb)
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or(Aabb {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            });
        Self { triangles, bounds }
    }

    /// Horizontal square facing +Y, centered at `center`.
    pub fn quad(center: Vec3, half_extent: f32) -> Self {
        let h = half_extent;
        let a = center + Vec3::new(-h, 0.0, -h);
        let b = center + Vec3::new(-h, 0.0, h);
        let c = center + Vec3::new(h, 0.0, h);
        let d = center + Vec3::new(h, 0.0, -h);
        Self::new(vec![Triangle::new(a, b, c), Triangle::new(a, c, d)])
    }

    /// Flat square floor at y = 0 with four inward-facing walls of `wall_height`.
    pub fn arena(half_extent: f32, wall_height: f32) -> Self {
        let h = half_extent;
        let mut triangles = Self::quad(Vec3::ZERO, h).triangles;

        // (corner a, corner b) ordered so the wall normal faces the origin
        let walls = [
            (Vec3::new(-h, 0.0, -h), Vec3::new(h, 0.0, -h)),
            (Vec3::new(h, 0.0, -h), Vec3::new(h, 0.0, h)),
            (Vec3::new(h, 0.0, h), Vec3::new(-h, 0.0, h)),
            (Vec3::new(-h, 0.0, h), Vec3::new(-h, 0.0, -h)),
        ];
        let up = Vec3::new(0.0, wall_height, 0.0);
        for (a, b) in walls {
            triangles.push(Triangle::new(a, b, b + up));
            triangles.push(Triangle::new(a, b + up, a + up));
        }

        Self::new(triangles)
    }

    /// Triangles in insertion order.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Cached bounds.
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// World-space copy under `placement`.
    pub fn transform(&self, placement: &Placement) -> Self {
        Self::new(self.triangles.iter().map(|t| t.transform(placement)).collect())
    }
}
