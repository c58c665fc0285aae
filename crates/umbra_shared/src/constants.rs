//! # Layout & Budget Constants
//!
//! **CRITICAL:** The device-side culling and lighting code reads buffers laid
//! out with these values. Changing them requires rebuilding the shaders.

// =============================================================================
// MIRROR BUFFER LAYOUT
// =============================================================================

/// Size in bytes of the header at the start of every mirror buffer.
///
/// Layout: `[len: u32, capacity: u32, 0, 0]`. Record `i` starts at
/// `ARRAY_HEADER_SIZE + i * size_of::<T>()`.
pub const ARRAY_HEADER_SIZE: u64 = 16;

/// Minimum record capacity of a freshly created mirror buffer
pub const MIN_MIRROR_CAPACITY: usize = 50;

// =============================================================================
// FRAME PIPELINING
// =============================================================================

/// Number of buffer generations cycled by the frame ring
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Maximum wait for a generation's submission before it is treated as hung
pub const DRAIN_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// SHADOW ATLAS
// =============================================================================

/// Shadow atlas texture resolution in texels `[width, height]`
pub const SHADOW_ATLAS_RESOLUTION: [u32; 2] = [8192, 8192];

/// Edge length in texels of one atlas block
pub const SHADOW_ATLAS_BLOCK_SIZE: u32 = 64;

/// Largest atlas extent in blocks per axis.
///
/// Packed atlas coordinates are single bytes.
pub const MAX_ATLAS_BLOCKS: u32 = 256;

/// Hard maximum of shadowed lights per frame
pub const MAX_LIGHTS: usize = 2048;

/// Largest shadow tile edge in texels
pub const MAX_TILE_TEXELS: u32 = 512;

/// Screen-area to texel multiplier used when picking a light's tier
pub const RESOLUTION_HEURISTIC: f64 = 2.0;

/// Light volumes are clamped to this depth when projected for scoring
pub const MAX_WORLD_DEPTH: f64 = 5.0;

/// Near plane of every shadow-casting light's projection
pub const LIGHT_Z_NEAR: f64 = 0.5;

// =============================================================================
// PACKED ATLAS PLACEMENT
// =============================================================================

/// Bit offset of the x block coordinate in `LightDef::atlas_packed`
pub const ATLAS_PACK_X_SHIFT: u32 = 0;

/// Bit offset of the y block coordinate
pub const ATLAS_PACK_Y_SHIFT: u32 = 8;

/// Bit offset of the width in blocks
pub const ATLAS_PACK_W_SHIFT: u32 = 16;

/// Bit offset of the height in blocks
pub const ATLAS_PACK_H_SHIFT: u32 = 24;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atlas_defaults_fit_packing() {
        let blocks_w = SHADOW_ATLAS_RESOLUTION[0] / SHADOW_ATLAS_BLOCK_SIZE;
        let blocks_h = SHADOW_ATLAS_RESOLUTION[1] / SHADOW_ATLAS_BLOCK_SIZE;
        assert!(blocks_w <= MAX_ATLAS_BLOCKS);
        assert!(blocks_h <= MAX_ATLAS_BLOCKS);
        assert_eq!(SHADOW_ATLAS_RESOLUTION[0] % SHADOW_ATLAS_BLOCK_SIZE, 0);
    }

    #[test]
    fn test_header_is_copy_aligned() {
        assert_eq!(ARRAY_HEADER_SIZE % 4, 0);
    }
}
