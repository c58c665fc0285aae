//! # Culling Primitives
//!
//! Host-side coarse tests used before spending atlas space on a light.

use umbra_shared::math::{Placement, Vec3};

/// A view cone: apex, axis, reach and half-angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cone {
    /// Apex.
    pub origin: Vec3,
    /// Unit axis.
    pub forward: Vec3,
    /// Reach along the axis.
    pub length: f64,
    /// Half-angle in radians.
    pub half_angle: f64,
}

impl Cone {
    /// Creates a cone from its parts. `forward` is normalized.
    #[must_use]
    pub fn new(origin: Vec3, forward: Vec3, length: f64, half_angle: f64) -> Self {
        Self {
            origin,
            forward: forward.normalize(),
            length,
            half_angle,
        }
    }

    /// Cone looking along a placement's forward axis.
    #[must_use]
    pub fn from_placement(placement: &Placement, length: f64, half_angle: f64) -> Self {
        Self::new(placement.position, placement.forward(), length, half_angle)
    }

    /// Whether `sphere` may intersect the cone.
    ///
    /// Conservative: rejects only spheres entirely outside the cone's angle,
    /// beyond its reach, or behind its apex.
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let v = sphere.center - self.origin;
        let along = v.dot(self.forward);
        let (sin, cos) = self.half_angle.sin_cos();
        let perpendicular = (v.length_squared() - along * along).max(0.0).sqrt();
        let closest = cos * perpendicular - along * sin;

        let angle_cull = closest > sphere.radius;
        let front_cull = along > sphere.radius + self.length;
        let back_cull = along < -sphere.radius;

        !(angle_cull || front_cull || back_cull)
    }
}

/// Bounding sphere.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sphere {
    /// Center.
    pub center: Vec3,
    /// Radius.
    pub radius: f64,
}

impl Sphere {
    /// Creates a sphere.
    #[must_use]
    pub const fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Axis-aligned box, grown point by point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub lo: Vec3,
    /// Maximum corner.
    pub hi: Vec3,
}

impl Aabb3 {
    /// Box between two corners.
    #[must_use]
    pub const fn new(lo: Vec3, hi: Vec3) -> Self {
        Self { lo, hi }
    }

    /// Degenerate box holding one point.
    #[must_use]
    pub const fn from_point(p: Vec3) -> Self {
        Self::new(p, p)
    }

    /// Grows the box to contain `p`.
    pub fn add(&mut self, p: Vec3) {
        self.lo = self.lo.min(p);
        self.hi = self.hi.max(p);
    }

    /// Whether the two boxes share any point. Touching counts.
    #[must_use]
    pub fn overlaps(&self, other: &Aabb3) -> bool {
        self.lo.x <= other.hi.x
            && self.hi.x >= other.lo.x
            && self.lo.y <= other.hi.y
            && self.hi.y >= other.lo.y
            && self.lo.z <= other.hi.z
            && self.hi.z >= other.lo.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Cone {
        Cone::new(Vec3::ZERO, Vec3::FORWARD, 100.0, 0.5)
    }

    #[test]
    fn test_sphere_ahead_visible() {
        assert!(camera().intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn test_sphere_behind_culled() {
        assert!(!camera().intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        // Straddling the apex is kept.
        assert!(camera().intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 0.5), 1.0)));
    }

    #[test]
    fn test_sphere_beyond_reach_culled() {
        assert!(!camera().intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -102.0), 1.0)));
        assert!(camera().intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -100.5), 1.0)));
    }

    #[test]
    fn test_sphere_outside_angle_culled() {
        // 45 degrees off axis, cone half-angle ~28.6 degrees.
        let off_axis = Sphere::new(Vec3::new(10.0, 0.0, -10.0), 1.0);
        assert!(!camera().intersects_sphere(&off_axis));

        let large = Sphere::new(Vec3::new(10.0, 0.0, -10.0), 5.0);
        assert!(camera().intersects_sphere(&large));
    }

    #[test]
    fn test_aabb_overlap() {
        let clip = Aabb3::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::splat(1.0));
        let mut inside = Aabb3::from_point(Vec3::new(0.5, 0.5, 0.5));
        inside.add(Vec3::new(3.0, 3.0, 3.0));
        assert!(clip.overlaps(&inside));

        let outside = Aabb3::new(Vec3::new(1.5, -0.5, 0.2), Vec3::new(2.0, 0.5, 0.8));
        assert!(!clip.overlaps(&outside));
    }
}
