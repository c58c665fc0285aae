//! # Shadow Atlas Allocator
//!
//! Packs square power-of-two tiles into a block grid along a Morton
//! (Z-order) curve.
//!
//! ## Placement Invariant
//!
//! Tiles are placed largest first. With every tier a power of two, the
//! running Morton index is always a multiple of the current tier squared,
//! and an index aligned to `t * t` decodes to the corner of an aligned
//! `t x t` square. Consecutive tiles therefore tile the curve exactly.
//!
//! The curve puts x on even bits, so a prefix of `w * h` indices covers a
//! `w x h` rectangle when `w == h` or `w == 2h`. Other extents are rejected.

use thiserror::Error;
use umbra_shared::constants::MAX_ATLAS_BLOCKS;

use super::priority::LightPriority;
use super::BudgetWarning;
use crate::records::AtlasRect;

/// Spreads the bits of `v` into the even bits of the result.
fn spread_bits(v: u32) -> u64 {
    let mut x = u64::from(v);
    x = (x | x << 16) & 0x0000_FFFF_0000_FFFF;
    x = (x | x << 8) & 0x00FF_00FF_00FF_00FF;
    x = (x | x << 4) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | x << 2) & 0x3333_3333_3333_3333;
    x = (x | x << 1) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: gathers the even bits of `x`.
#[allow(clippy::cast_possible_truncation)]
fn gather_bits(x: u64) -> u32 {
    let mut x = x & 0x5555_5555_5555_5555;
    x = (x | x >> 1) & 0x3333_3333_3333_3333;
    x = (x | x >> 2) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | x >> 4) & 0x00FF_00FF_00FF_00FF;
    x = (x | x >> 8) & 0x0000_FFFF_0000_FFFF;
    x = (x | x >> 16) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Morton index of block `(x, y)`. x occupies the even bits.
#[must_use]
pub fn morton_encode(x: u32, y: u32) -> u64 {
    spread_bits(x) | spread_bits(y) << 1
}

/// Block coordinates of Morton index `index`.
#[must_use]
pub fn morton_decode(index: u64) -> (u32, u32) {
    (gather_bits(index), gather_bits(index >> 1))
}

/// Invalid atlas block extent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtlasError {
    /// A side is zero or not a power of two.
    #[error("atlas extent {width}x{height} blocks: sides must be non-zero powers of two")]
    NotPowerOfTwo {
        /// Width in blocks.
        width: u32,
        /// Height in blocks.
        height: u32,
    },

    /// The Morton walk cannot cover this rectangle.
    #[error("atlas extent {width}x{height} blocks: width must equal height or twice height")]
    UnsupportedAspect {
        /// Width in blocks.
        width: u32,
        /// Height in blocks.
        height: u32,
    },

    /// Packed coordinates would not fit a byte.
    #[error("atlas extent {width}x{height} blocks exceeds {MAX_ATLAS_BLOCKS} per side")]
    TooLarge {
        /// Width in blocks.
        width: u32,
        /// Height in blocks.
        height: u32,
    },
}

/// Validated atlas size in blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasExtent {
    width: u32,
    height: u32,
}

impl AtlasExtent {
    /// Validates a block extent.
    ///
    /// # Errors
    ///
    /// See [`AtlasError`].
    pub fn new(width: u32, height: u32) -> Result<Self, AtlasError> {
        if !width.is_power_of_two() || !height.is_power_of_two() {
            return Err(AtlasError::NotPowerOfTwo { width, height });
        }
        if width > MAX_ATLAS_BLOCKS || height > MAX_ATLAS_BLOCKS {
            return Err(AtlasError::TooLarge { width, height });
        }
        if width != height && width != 2 * height {
            return Err(AtlasError::UnsupportedAspect { width, height });
        }
        Ok(Self { width, height })
    }

    /// Width in blocks.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in blocks.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total blocks.
    #[must_use]
    pub fn blocks(&self) -> u32 {
        self.width * self.height
    }

    /// As `[width, height]`.
    #[must_use]
    pub fn to_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

/// A light competing for atlas space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Caller's index for the light.
    pub source: usize,
    /// Score and desired tier.
    pub priority: LightPriority,
}

/// A light that received a tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedLight {
    /// Caller's index for the light.
    pub source: usize,
    /// Score the light was accepted with.
    pub score: f64,
    /// Tile placement in blocks.
    pub rect: AtlasRect,
}

/// Outcome of one allocation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Allocation {
    /// Placed lights, largest tile first.
    pub placed: Vec<PlacedLight>,
    /// Blocks covered by placed tiles.
    pub used_blocks: u32,
    /// Budget limits hit along the way.
    pub warnings: Vec<BudgetWarning>,
}

/// Largest power of two not above `tier`, at least 1.
fn floor_power_of_two(tier: u32) -> u32 {
    if tier <= 1 {
        1
    } else {
        1 << (31 - tier.leading_zeros())
    }
}

/// Picks and places lights for one frame.
///
/// Candidates are ranked by score; anything past `max_lights` is dropped,
/// then tiles are accepted greedily until the next one would overflow the
/// atlas. Tiers are rounded down to powers of two and capped at the short
/// side of the atlas (and at 128, the largest extent a packed byte holds).
///
/// # Panics
///
/// Panics if a tile would be placed outside the atlas.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn allocate(mut candidates: Vec<Candidate>, atlas: AtlasExtent, max_lights: usize) -> Allocation {
    let mut allocation = Allocation::default();
    let max_tier = atlas.width.min(atlas.height).min(128);

    for candidate in &mut candidates {
        candidate.priority.tier = floor_power_of_two(candidate.priority.tier).min(max_tier);
    }

    // Stable: equal scores keep input order.
    candidates.sort_by(|a, b| b.priority.score.total_cmp(&a.priority.score));

    if candidates.len() > max_lights {
        allocation.warnings.push(BudgetWarning::LightLimit {
            requested: candidates.len(),
            kept: max_lights,
        });
        candidates.truncate(max_lights);
    }

    let capacity = atlas.blocks();
    let mut accepted = candidates.len();
    for (i, candidate) in candidates.iter().enumerate() {
        let area = candidate.priority.tier * candidate.priority.tier;
        if allocation.used_blocks + area > capacity {
            accepted = i;
            break;
        }
        allocation.used_blocks += area;
    }
    if accepted < candidates.len() {
        allocation.warnings.push(BudgetWarning::AtlasSaturated {
            accepted,
            rejected: candidates.len() - accepted,
            used_blocks: allocation.used_blocks,
            capacity_blocks: capacity,
        });
        candidates.truncate(accepted);
    }

    candidates.sort_by(|a, b| b.priority.tier.cmp(&a.priority.tier));

    let mut index = 0u64;
    allocation.placed.reserve(candidates.len());
    for candidate in &candidates {
        let tier = candidate.priority.tier;
        let (x, y) = morton_decode(index);
        assert!(
            x + tier <= atlas.width && y + tier <= atlas.height,
            "tile {tier}x{tier} at ({x}, {y}) outside {}x{} atlas",
            atlas.width,
            atlas.height
        );
        index += u64::from(tier) * u64::from(tier);

        allocation.placed.push(PlacedLight {
            source: candidate.source,
            score: candidate.priority.score,
            rect: AtlasRect {
                x: x as u8,
                y: y as u8,
                w: tier as u8,
                h: tier as u8,
            },
        });
    }

    allocation
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn candidate(source: usize, score: f64, tier: u32) -> Candidate {
        Candidate {
            source,
            priority: LightPriority { score, tier },
        }
    }

    fn overlaps(a: AtlasRect, b: AtlasRect) -> bool {
        let (ax, ay, aw, ah) = (u32::from(a.x), u32::from(a.y), u32::from(a.w), u32::from(a.h));
        let (bx, by, bw, bh) = (u32::from(b.x), u32::from(b.y), u32::from(b.w), u32::from(b.h));
        ax < bx + bw && bx < ax + aw && ay < by + bh && by < ay + ah
    }

    #[test]
    fn test_morton_round_trip_edges() {
        assert_eq!(morton_encode(1, 0), 1);
        assert_eq!(morton_encode(0, 1), 2);
        assert_eq!(morton_encode(3, 3), 15);
        assert_eq!(morton_decode(morton_encode(255, 128)), (255, 128));
        assert_eq!(morton_decode(morton_encode(u32::MAX, 7)), (u32::MAX, 7));
    }

    #[test]
    fn test_extent_validation() {
        assert!(AtlasExtent::new(128, 128).is_ok());
        assert!(AtlasExtent::new(8, 4).is_ok());
        assert!(matches!(AtlasExtent::new(4, 8), Err(AtlasError::UnsupportedAspect { .. })));
        assert!(matches!(AtlasExtent::new(96, 96), Err(AtlasError::NotPowerOfTwo { .. })));
        assert!(matches!(AtlasExtent::new(512, 512), Err(AtlasError::TooLarge { .. })));
    }

    #[test]
    fn test_two_of_three_fit_small_atlas() {
        let atlas = AtlasExtent::new(8, 4).unwrap();
        let result = allocate(
            vec![candidate(0, 0.1, 4), candidate(1, 0.9, 4), candidate(2, 0.5, 4)],
            atlas,
            2048,
        );

        let sources: Vec<_> = result.placed.iter().map(|p| p.source).collect();
        assert_eq!(sources, vec![1, 2]);
        assert_eq!(result.placed[0].rect, AtlasRect { x: 0, y: 0, w: 4, h: 4 });
        assert_eq!(result.placed[1].rect, AtlasRect { x: 4, y: 0, w: 4, h: 4 });
        assert_eq!(result.used_blocks, 32);
        assert_eq!(
            result.warnings,
            vec![BudgetWarning::AtlasSaturated {
                accepted: 2,
                rejected: 1,
                used_blocks: 32,
                capacity_blocks: 32,
            }]
        );
    }

    #[test]
    fn test_light_limit_drops_lowest() {
        let atlas = AtlasExtent::new(16, 16).unwrap();
        let candidates = (0..10).map(|i| candidate(i, i as f64, 1)).collect();
        let result = allocate(candidates, atlas, 4);

        let mut sources: Vec<_> = result.placed.iter().map(|p| p.source).collect();
        sources.sort_unstable();
        assert_eq!(sources, vec![6, 7, 8, 9]);
        assert!(matches!(result.warnings[0], BudgetWarning::LightLimit { requested: 10, kept: 4 }));
    }

    #[test]
    fn test_oversized_tier_clamped_to_short_side() {
        let atlas = AtlasExtent::new(4, 2).unwrap();
        let result = allocate(vec![candidate(0, 1.0, 8), candidate(1, 0.5, 3)], atlas, 2048);
        assert_eq!(result.placed[0].rect.w, 2);
        assert_eq!(result.placed[1].rect, AtlasRect { x: 2, y: 0, w: 2, h: 2 });
    }

    #[test]
    fn test_randomized_sets_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for &(w, h) in &[(8u32, 8u32), (16, 8), (32, 32), (128, 64), (256, 256)] {
            let atlas = AtlasExtent::new(w, h).unwrap();
            for _ in 0..50 {
                let count = rng.gen_range(1..200);
                let candidates = (0..count)
                    .map(|i| candidate(i, rng.gen::<f64>(), 1 << rng.gen_range(0..4)))
                    .collect::<Vec<_>>();
                let result = allocate(candidates.clone(), atlas, 2048);

                for (i, a) in result.placed.iter().enumerate() {
                    assert!(u32::from(a.rect.x) + u32::from(a.rect.w) <= w);
                    assert!(u32::from(a.rect.y) + u32::from(a.rect.h) <= h);
                    for b in &result.placed[i + 1..] {
                        assert!(!overlaps(a.rect, b.rect), "{a:?} overlaps {b:?}");
                    }
                }

                assert!(result.used_blocks <= atlas.blocks());

                // Nothing rejected outranks the weakest accepted light.
                let weakest = result
                    .placed
                    .iter()
                    .map(|p| p.score)
                    .fold(f64::INFINITY, f64::min);
                let placed: std::collections::HashSet<_> = result.placed.iter().map(|p| p.source).collect();
                for c in candidates.iter().filter(|c| !placed.contains(&c.source)) {
                    assert!(c.priority.score <= weakest);
                }
            }
        }
    }
}
