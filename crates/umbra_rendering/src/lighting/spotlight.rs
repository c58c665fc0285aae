//! # Spotlight
//!
//! Host-side description of a shadow-casting spotlight. Point lights are
//! six spotlights.

use umbra_shared::constants::LIGHT_Z_NEAR;
use umbra_shared::math::{Mat4, Placement, Vec2, Vec3};

use crate::culling::Sphere;
use crate::records::{light_def, AtlasRect, LightDef};

/// A spotlight mounted on a placement.
///
/// The light's world transform is its placement composed with a mount
/// offset (an attachment point on the parent). The bounding sphere is kept
/// in sync with every setter that moves or resizes the light.
#[derive(Clone, Debug, PartialEq)]
pub struct Spotlight {
    placement: Placement,
    offset: Placement,
    depth: f64,
    /// Full field of view in radians.
    fov: f64,
    color: Vec3,
    /// Falloff inner/outer half angles in radians.
    cone_angles: Vec2,
    min_res_power: u32,
    max_res_power: u32,
    sphere: Sphere,
}

impl Spotlight {
    /// Default smallest tile power (tier 1).
    pub const DEFAULT_MIN_RES_POWER: u32 = 0;
    /// Default largest tile power (tier 16 before capping).
    pub const DEFAULT_MAX_RES_POWER: u32 = 4;

    /// Creates a spotlight with a full field of view of `fov_degrees` and
    /// no falloff (180 degree inner and outer angles).
    #[must_use]
    pub fn new(placement: Placement, depth: f64, fov_degrees: f64, color: Vec3) -> Self {
        let mut light = Self {
            placement,
            offset: Placement::IDENTITY,
            depth,
            fov: fov_degrees.to_radians(),
            color,
            cone_angles: Vec2::new(90f64.to_radians(), 90f64.to_radians()),
            min_res_power: Self::DEFAULT_MIN_RES_POWER,
            max_res_power: Self::DEFAULT_MAX_RES_POWER,
            sphere: Sphere::default(),
        };
        light.update_sphere();
        light
    }

    /// Sets the mount offset.
    #[must_use]
    pub fn with_offset(mut self, offset: Placement) -> Self {
        self.set_offset(offset);
        self
    }

    /// Sets the falloff cone from full inner and outer angles in degrees.
    #[must_use]
    pub fn with_falloff(mut self, inner_degrees: f64, outer_degrees: f64) -> Self {
        self.cone_angles = Vec2::new(
            (inner_degrees / 2.0).to_radians(),
            (outer_degrees / 2.0).to_radians(),
        );
        self
    }

    /// Bounds the shadow tile to `2^min..=2^max` blocks per side.
    #[must_use]
    pub fn with_resolution_powers(mut self, min: u32, max: u32) -> Self {
        self.min_res_power = min;
        self.max_res_power = max;
        self
    }

    fn update_sphere(&mut self) {
        self.sphere = Sphere::new(self.world_placement().position, self.depth);
    }

    /// Placement.
    #[must_use]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Moves the light.
    pub fn set_placement(&mut self, placement: Placement) {
        if self.placement == placement {
            return;
        }
        self.placement = placement;
        self.update_sphere();
    }

    /// Mount offset.
    #[must_use]
    pub fn offset(&self) -> &Placement {
        &self.offset
    }

    /// Changes the mount offset.
    pub fn set_offset(&mut self, offset: Placement) {
        self.offset = offset;
        self.update_sphere();
    }

    /// Reach along the light's axis.
    #[must_use]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Changes the light's reach.
    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
        self.update_sphere();
    }

    /// Full field of view in radians.
    #[must_use]
    pub fn fov(&self) -> f64 {
        self.fov
    }

    /// Color.
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Changes the color.
    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Falloff inner/outer half angles in radians.
    #[must_use]
    pub fn cone_angles(&self) -> Vec2 {
        self.cone_angles
    }

    /// Tile power bounds `(min, max)`.
    #[must_use]
    pub fn resolution_powers(&self) -> (u32, u32) {
        (self.min_res_power, self.max_res_power)
    }

    /// Influence bounds for coarse culling.
    #[must_use]
    pub fn bounding_sphere(&self) -> &Sphere {
        &self.sphere
    }

    /// World transform: placement composed with the mount offset.
    #[must_use]
    pub fn world_placement(&self) -> Placement {
        Placement::new(
            self.placement.position + self.offset.position,
            self.offset.rotation * self.placement.rotation,
        )
    }

    /// Light projection with near plane `z_near`, far plane at the light's depth.
    #[must_use]
    pub fn projection(&self, z_near: f64) -> Mat4 {
        Mat4::perspective(self.fov, 1.0, z_near, self.depth)
    }

    /// World to light clip space with the standard light near plane.
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.view_projection_with_near(LIGHT_Z_NEAR)
    }

    /// World to light clip space.
    #[must_use]
    pub fn view_projection_with_near(&self, z_near: f64) -> Mat4 {
        self.projection(z_near) * self.world_placement().to_view_matrix()
    }

    /// Device record for this light with its shadow tile at `rect`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_light_def(&self, rect: AtlasRect, z_near: f64) -> LightDef {
        let world = self.world_placement();
        let p = world.position.to_f32_array();
        light_def(
            self.view_projection_with_near(z_near).to_cols_f32(),
            [p[0], p[1], p[2], self.depth as f32],
            world.rotation.to_f32_array(),
            self.color.to_f32_array(),
            self.cone_angles.to_f32_array(),
            rect,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_shared::math::Quaternion;

    fn light() -> Spotlight {
        Spotlight::new(
            Placement::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::IDENTITY),
            10.0,
            90.0,
            Vec3::splat(1.0),
        )
    }

    #[test]
    fn test_sphere_follows_setters() {
        let mut l = light().with_offset(Placement::new(Vec3::new(0.0, 1.0, 0.0), Quaternion::IDENTITY));
        assert_eq!(l.bounding_sphere().center, Vec3::new(1.0, 3.0, 3.0));
        assert_eq!(l.bounding_sphere().radius, 10.0);

        l.set_placement(Placement::new(Vec3::ZERO, Quaternion::IDENTITY));
        assert_eq!(l.bounding_sphere().center, Vec3::new(0.0, 1.0, 0.0));

        l.set_depth(4.0);
        assert_eq!(l.bounding_sphere().radius, 4.0);
    }

    #[test]
    fn test_view_projection_depth_range() {
        let l = light();
        let vp = l.view_projection();
        let origin = l.world_placement().position;

        let near = vp.project_point(origin + Vec3::FORWARD * LIGHT_Z_NEAR);
        let far = vp.project_point(origin + Vec3::FORWARD * 10.0);
        assert!(near.z.abs() < 1e-9);
        assert!((far.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_light_def_fields() {
        let l = light().with_falloff(60.0, 90.0);
        let rect = AtlasRect { x: 4, y: 0, w: 2, h: 2 };
        let def = l.to_light_def(rect, LIGHT_Z_NEAR);

        assert_eq!(def.world_pos_depth, [1.0, 2.0, 3.0, 10.0]);
        assert_eq!(def.dir_quat, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(def.atlas_rect(), rect);
        assert!((f64::from(def.cone_angles[0]) - 30f64.to_radians()).abs() < 1e-6);
        assert!((f64::from(def.cone_angles[1]) - 45f64.to_radians()).abs() < 1e-6);
    }
}
