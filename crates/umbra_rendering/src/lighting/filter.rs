//! # Light Filtering
//!
//! One frame's pass from the full light set to the device light list.

use std::fmt;

use umbra_shared::math::Mat4;

use super::atlas::{allocate, AtlasExtent, Candidate};
use super::priority::{evaluate, LightPriority};
use super::{ShadowSettings, Spotlight};
use crate::culling::Cone;
use crate::records::{light_def, AtlasRect, LightDef};

/// A budget limit that degraded this frame's light set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetWarning {
    /// More visible lights than the hard maximum; the weakest were dropped.
    LightLimit {
        /// Visible lights.
        requested: usize,
        /// Lights kept.
        kept: usize,
    },
    /// The atlas filled up; the weakest remaining lights were dropped.
    AtlasSaturated {
        /// Lights that received a tile.
        accepted: usize,
        /// Lights that did not.
        rejected: usize,
        /// Blocks in use.
        used_blocks: u32,
        /// Blocks available.
        capacity_blocks: u32,
    },
}

impl fmt::Display for BudgetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LightLimit { requested, kept } => {
                write!(f, "light count saturated: {requested} visible, {kept} kept")
            }
            Self::AtlasSaturated {
                accepted,
                rejected,
                used_blocks,
                capacity_blocks,
            } => write!(
                f,
                "shadow atlas saturated: {accepted} lights placed, {rejected} dropped ({used_blocks}/{capacity_blocks} blocks)"
            ),
        }
    }
}

/// Summary of one [`filter_lights`] pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterReport {
    /// Lights considered.
    pub input: usize,
    /// Lights surviving culling.
    pub visible: usize,
    /// Lights written to the output list.
    pub placed: usize,
    /// Atlas blocks in use.
    pub used_blocks: u32,
    /// Atlas blocks available.
    pub capacity_blocks: u32,
    /// Nothing was visible; a fallback light was serviced instead.
    pub fallback: bool,
    /// Budget limits hit.
    pub warnings: Vec<BudgetWarning>,
}

impl FilterReport {
    /// Fraction of the atlas in use.
    #[must_use]
    pub fn occupancy(&self) -> f64 {
        if self.capacity_blocks == 0 {
            0.0
        } else {
            f64::from(self.used_blocks) / f64::from(self.capacity_blocks)
        }
    }
}

/// Rebuilds `out` with the lights worth shadowing this frame.
///
/// A pass that culls every light still services one: the first input
/// light, or an all-zero light if `lights` is empty, at priority 1 and
/// tier 1. Budget saturation is reported and logged, never fatal.
pub fn filter_lights<'a, I>(
    out: &mut Vec<LightDef>,
    lights: I,
    viewer: &Cone,
    camera_view_proj: &Mat4,
    atlas: AtlasExtent,
    settings: &ShadowSettings,
) -> FilterReport
where
    I: IntoIterator<Item = &'a Spotlight>,
{
    let lights: Vec<&Spotlight> = lights.into_iter().collect();
    let mut report = FilterReport {
        input: lights.len(),
        capacity_blocks: atlas.blocks(),
        ..FilterReport::default()
    };

    let mut candidates: Vec<Candidate> = lights
        .iter()
        .enumerate()
        .filter_map(|(source, light)| {
            let priority = evaluate(light, viewer, camera_view_proj, settings);
            (!priority.is_culled()).then_some(Candidate { source, priority })
        })
        .collect();
    report.visible = candidates.len();

    if candidates.is_empty() {
        report.fallback = true;
        candidates.push(Candidate {
            source: 0,
            priority: LightPriority { score: 1.0, tier: 1 },
        });
    }

    let allocation = allocate(candidates, atlas, settings.max_lights);

    out.clear();
    out.extend(allocation.placed.iter().map(|placed| match lights.get(placed.source) {
        Some(light) => light.to_light_def(placed.rect, settings.light_z_near),
        None => empty_light(placed.rect),
    }));

    for warning in &allocation.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(
        "Light cull: {} -> {} visible -> {} placed, atlas occupancy {:.3}",
        report.input,
        report.visible,
        out.len(),
        f64::from(allocation.used_blocks) / f64::from(report.capacity_blocks.max(1))
    );

    report.placed = out.len();
    report.used_blocks = allocation.used_blocks;
    report.warnings = allocation.warnings;
    report
}

fn empty_light(rect: AtlasRect) -> LightDef {
    light_def([[0.0; 4]; 4], [0.0; 4], [0.0; 4], [0.0; 3], [0.0; 2], rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_shared::math::{Placement, Quaternion, Vec3};

    fn view() -> (Cone, Mat4) {
        let eye = Placement::new(Vec3::new(0.0, 0.0, 10.0), Quaternion::IDENTITY);
        let proj = Mat4::perspective(60f64.to_radians(), 1.0, 0.1, 100.0);
        (
            Cone::from_placement(&eye, 100.0, 45f64.to_radians()),
            proj * eye.to_view_matrix(),
        )
    }

    fn light(x: f64, z: f64, depth: f64) -> Spotlight {
        Spotlight::new(
            Placement::new(Vec3::new(x, 0.0, z), Quaternion::IDENTITY),
            depth,
            90.0,
            Vec3::splat(1.0),
        )
    }

    #[test]
    fn test_visible_lights_placed_without_overlap() {
        let (cone, vp) = view();
        let lights: Vec<_> = (0..6).map(|i| light(f64::from(i) - 3.0, 0.0, 2.0)).collect();
        let atlas = AtlasExtent::new(128, 128).unwrap();
        let mut out = Vec::new();

        let report = filter_lights(&mut out, &lights, &cone, &vp, atlas, &ShadowSettings::default());

        assert_eq!(report.input, 6);
        assert_eq!(report.visible, 6);
        assert_eq!(report.placed, 6);
        assert!(!report.fallback);
        assert!(report.warnings.is_empty());
        assert!(report.occupancy() > 0.0);
        for def in &out {
            assert!(def.atlas_rect().w >= 1);
            assert_eq!(def.world_pos_depth[3], 2.0);
        }
    }

    #[test]
    fn test_all_culled_services_first_light() {
        let (cone, vp) = view();
        let behind = [light(1.0, 50.0, 1.0), light(2.0, 60.0, 1.0)];
        let atlas = AtlasExtent::new(8, 8).unwrap();
        let mut out = vec![LightDef::default(); 3];

        let report = filter_lights(&mut out, &behind, &cone, &vp, atlas, &ShadowSettings::default());

        assert!(report.fallback);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].world_pos_depth, [1.0, 0.0, 50.0, 1.0]);
        assert_eq!(out[0].atlas_rect(), AtlasRect { x: 0, y: 0, w: 1, h: 1 });
    }

    #[test]
    fn test_empty_input_services_zeroed_light() {
        let (cone, vp) = view();
        let atlas = AtlasExtent::new(8, 8).unwrap();
        let mut out = Vec::new();

        let report = filter_lights(&mut out, std::iter::empty(), &cone, &vp, atlas, &ShadowSettings::default());

        assert!(report.fallback);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].world_pos_depth, [0.0; 4]);
        assert_eq!(out[0].atlas_rect().w, 1);
    }

    #[test]
    fn test_saturation_reported() {
        let (cone, vp) = view();
        // Large lights close to the camera want the biggest tier.
        let lights: Vec<_> = (0..4).map(|i| light(f64::from(i) * 0.1, 5.0, 4.0)).collect();
        let atlas = AtlasExtent::new(8, 8).unwrap();
        let mut out = Vec::new();

        let report = filter_lights(&mut out, &lights, &cone, &vp, atlas, &ShadowSettings::default());

        assert!(report.used_blocks <= 64);
        assert!(report.placed < 4);
        assert!(matches!(report.warnings.last(), Some(BudgetWarning::AtlasSaturated { .. })));
    }
}
