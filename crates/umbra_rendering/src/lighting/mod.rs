//! # Shadowed Lighting
//!
//! Per frame, every spotlight is scored by how much screen it covers, given
//! a shadow tile tier, and packed into a fixed shadow atlas:
//!
//! ```text
//!   Spotlight ──priority──► (score, tier) ──allocate──► AtlasRect ──► LightDef
//!      │                        │                          │
//!      └─ culled (score < 0)    └─ over max_lights         └─ atlas saturated
//! ```
//!
//! Nothing carries over between frames; each frame re-evaluates from scratch.

pub mod atlas;
pub mod filter;
pub mod priority;
pub mod spotlight;

pub use atlas::{allocate, AtlasError, AtlasExtent, Allocation, Candidate, PlacedLight};
pub use filter::{filter_lights, BudgetWarning, FilterReport};
pub use priority::{evaluate, tier_for_area, LightPriority};
pub use spotlight::Spotlight;

use umbra_shared::constants::{
    LIGHT_Z_NEAR, MAX_LIGHTS, MAX_TILE_TEXELS, MAX_WORLD_DEPTH, RESOLUTION_HEURISTIC,
    SHADOW_ATLAS_BLOCK_SIZE,
};

/// Tunables for light scoring and atlas budgeting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowSettings {
    /// Atlas block edge in texels.
    pub block_size: u32,
    /// Largest tile edge in texels.
    pub max_tile_texels: u32,
    /// Hard maximum of lights per frame.
    pub max_lights: usize,
    /// Screen-area to texel multiplier.
    pub resolution_heuristic: f64,
    /// World z is clamped to this before projecting light volumes.
    pub max_world_depth: f64,
    /// Near plane of light projections.
    pub light_z_near: f64,
}

impl ShadowSettings {
    /// Largest tier in blocks.
    #[must_use]
    pub fn max_tier(&self) -> u32 {
        (self.max_tile_texels / self.block_size).max(1)
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            block_size: SHADOW_ATLAS_BLOCK_SIZE,
            max_tile_texels: MAX_TILE_TEXELS,
            max_lights: MAX_LIGHTS,
            resolution_heuristic: RESOLUTION_HEURISTIC,
            max_world_depth: MAX_WORLD_DEPTH,
            light_z_near: LIGHT_Z_NEAR,
        }
    }
}
