//! # Light Priority
//!
//! Scores a spotlight by the screen area its volume covers and derives the
//! shadow tile tier it deserves.
//!
//! 1. Coarse cull: bounding sphere vs viewer cone.
//! 2. Project the light origin and the four far corners of its volume into
//!    camera clip space; reject if the box misses the clip region.
//! 3. Priority is the covered fraction of the screen. The tier grows with
//!    the log of that area, in whole powers of two.

use umbra_shared::math::{Mat4, Vec3};

use super::{ShadowSettings, Spotlight};
use crate::culling::{Aabb3, Cone};

/// Result of scoring one light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightPriority {
    /// Covered screen fraction. Negative means culled.
    pub score: f64,
    /// Desired tile edge in atlas blocks. At least 1 unless culled.
    pub tier: u32,
}

impl LightPriority {
    /// A culled light.
    pub const CULLED: Self = Self {
        score: -1.0,
        tier: 0,
    };

    /// Whether the light should be dropped entirely.
    #[must_use]
    pub fn is_culled(&self) -> bool {
        self.score < 0.0
    }
}

/// Clip region in normalized device coordinates (`[0, 1]` depth).
const CLIP: Aabb3 = Aabb3::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 1.0));

fn clamp_world_z(p: Vec3, max_z: f64) -> Vec3 {
    Vec3::new(p.x, p.y, p.z.min(max_z))
}

/// Tier for a light covering `area` of the screen.
///
/// `power = ceil(log2(area * heuristic * max_tile_texels)) - log2(block_size)`,
/// clamped to `[min_power, max_power]`; the tier is `2^power`, at least 1 and
/// at most `max_tile_texels / block_size`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tier_for_area(area: f64, settings: &ShadowSettings, min_power: u32, max_power: u32) -> u32 {
    let raw = area * settings.resolution_heuristic * f64::from(settings.max_tile_texels);
    let power = raw.log2().ceil() - f64::from(settings.block_size).log2();
    let power = power.min(f64::from(max_power)).max(f64::from(min_power));

    let tier = 2f64.powf(power).floor().max(1.0) as u32;
    tier.min(settings.max_tier())
}

/// Scores `light` for a viewer looking through `viewer` with combined
/// camera matrix `view_proj`.
#[must_use]
pub fn evaluate(light: &Spotlight, viewer: &Cone, view_proj: &Mat4, settings: &ShadowSettings) -> LightPriority {
    if !viewer.intersects_sphere(light.bounding_sphere()) {
        return LightPriority::CULLED;
    }

    let world = light.world_placement();
    let max_z = settings.max_world_depth;
    let mut bounds = Aabb3::from_point(view_proj.project_point(clamp_world_z(world.position, max_z)));

    let forward = world.rotation.rotate(Vec3::FORWARD);
    let up = world.rotation.rotate(Vec3::X);
    let right = world.rotation.rotate(Vec3::Y);
    let depth = light.depth();
    let side = (light.fov() / 2.0).sin() * depth;

    for corner in 0..4 {
        let mx = if corner & 1 == 0 { -1.0 } else { 1.0 };
        let my = if corner & 2 == 0 { -1.0 } else { 1.0 };
        let offset = up * (mx * side) + right * (my * side) + forward * depth;
        bounds.add(view_proj.project_point(clamp_world_z(world.position + offset, max_z)));
    }

    if !CLIP.overlaps(&bounds) {
        return LightPriority::CULLED;
    }

    let to_screen = |v: Vec3| (v * 0.5 + Vec3::splat(0.5)).clamp(Vec3::ZERO, Vec3::splat(1.0));
    let span = to_screen(bounds.hi).xy() - to_screen(bounds.lo).xy();
    let area = span.x * span.y;

    let (min_power, max_power) = light.resolution_powers();
    LightPriority {
        score: area,
        tier: tier_for_area(area, settings, min_power, max_power),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_shared::math::{Placement, Quaternion};

    fn camera() -> (Cone, Mat4) {
        let eye = Placement::new(Vec3::new(0.0, 0.0, 10.0), Quaternion::IDENTITY);
        let proj = Mat4::perspective(60f64.to_radians(), 1.0, 0.1, 100.0);
        (
            Cone::from_placement(&eye, 100.0, 45f64.to_radians()),
            proj * eye.to_view_matrix(),
        )
    }

    fn light_at(position: Vec3, depth: f64) -> Spotlight {
        Spotlight::new(Placement::new(position, Quaternion::IDENTITY), depth, 90.0, Vec3::splat(1.0))
    }

    #[test]
    fn test_visible_light_scores() {
        let (cone, vp) = camera();
        let p = evaluate(&light_at(Vec3::new(0.0, 0.0, 0.0), 4.0), &cone, &vp, &ShadowSettings::default());
        assert!(!p.is_culled());
        assert!(p.score > 0.0 && p.score <= 1.0);
        assert!(p.tier >= 1);
    }

    #[test]
    fn test_light_behind_viewer_culled() {
        let (cone, vp) = camera();
        let p = evaluate(&light_at(Vec3::new(0.0, 0.0, 30.0), 2.0), &cone, &vp, &ShadowSettings::default());
        assert_eq!(p, LightPriority::CULLED);
    }

    #[test]
    fn test_light_off_screen_culled() {
        // Passes a very wide viewer cone but projects outside the clip box.
        let (_, vp) = camera();
        let wide = Cone::new(Vec3::new(0.0, 0.0, 10.0), Vec3::FORWARD, 100.0, 1.5);
        let p = evaluate(&light_at(Vec3::new(60.0, 0.0, -10.0), 2.0), &wide, &vp, &ShadowSettings::default());
        assert!(p.is_culled());
    }

    #[test]
    fn test_tier_monotonic_in_area() {
        let settings = ShadowSettings::default();
        let mut previous = 0;
        for step in 0..=1000 {
            let area = f64::from(step) / 1000.0;
            let tier = tier_for_area(area, &settings, 0, 4);
            assert!(tier >= previous, "tier dropped at area {area}");
            assert!(tier.is_power_of_two());
            previous = tier;
        }
        assert_eq!(tier_for_area(0.0, &settings, 0, 4), 1);
        assert_eq!(tier_for_area(1.0, &settings, 0, 4), 8);
    }

    #[test]
    fn test_tier_respects_light_power_bounds() {
        let settings = ShadowSettings::default();
        assert_eq!(tier_for_area(1.0, &settings, 0, 1), 2);
        assert_eq!(tier_for_area(0.0001, &settings, 2, 4), 4);
    }
}
