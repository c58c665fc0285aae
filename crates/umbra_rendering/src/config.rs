//! # Renderer Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! frames_in_flight = 3
//! drain_timeout_ms = 1000
//!
//! [shadow]
//! atlas_resolution = [8192, 8192]
//! block_size = 64
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use umbra_shared::constants::{
    DRAIN_TIMEOUT_MS, FRAMES_IN_FLIGHT, LIGHT_Z_NEAR, MAX_LIGHTS, MAX_TILE_TEXELS, MAX_WORLD_DEPTH,
    MIN_MIRROR_CAPACITY, RESOLUTION_HEURISTIC, SHADOW_ATLAS_BLOCK_SIZE, SHADOW_ATLAS_RESOLUTION,
};

use crate::lighting::{AtlasError, AtlasExtent, ShadowSettings};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid TOML or has mistyped fields.
    #[error("failed to parse renderer config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The frame ring needs at least one generation.
    #[error("frames_in_flight must be at least 1")]
    NoGenerations,

    /// Block size is zero or not a power of two.
    #[error("shadow block size {0} must be a non-zero power of two")]
    BlockSize(u32),

    /// Atlas resolution is not a whole number of blocks.
    #[error("shadow atlas resolution {resolution:?} is not a multiple of block size {block_size}")]
    AtlasNotDivisible {
        /// Configured resolution in texels.
        resolution: [u32; 2],
        /// Configured block size.
        block_size: u32,
    },

    /// Atlas block extent is unusable.
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    /// Tile size is not a power-of-two multiple of the block size.
    #[error("max tile size {max_tile_texels} must be a power-of-two multiple of block size {block_size}")]
    TileTexels {
        /// Configured tile size.
        max_tile_texels: u32,
        /// Configured block size.
        block_size: u32,
    },

    /// A numeric field that must be positive is not.
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

/// Shadow budgeting section.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadowConfig {
    /// Atlas texture size in texels.
    pub atlas_resolution: [u32; 2],
    /// Edge of one atlas block in texels.
    pub block_size: u32,
    /// Hard maximum of shadowed lights per frame.
    pub max_lights: usize,
    /// Largest tile edge in texels.
    pub max_tile_texels: u32,
    /// Screen-area to texel multiplier.
    pub resolution_heuristic: f64,
    /// World z clamp when projecting light volumes.
    pub max_world_depth: f64,
    /// Near plane of light projections.
    pub light_z_near: f64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            atlas_resolution: SHADOW_ATLAS_RESOLUTION,
            block_size: SHADOW_ATLAS_BLOCK_SIZE,
            max_lights: MAX_LIGHTS,
            max_tile_texels: MAX_TILE_TEXELS,
            resolution_heuristic: RESOLUTION_HEURISTIC,
            max_world_depth: MAX_WORLD_DEPTH,
            light_z_near: LIGHT_Z_NEAR,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Buffer generations in the frame ring.
    pub frames_in_flight: usize,
    /// How long to wait for a generation before treating the GPU as hung.
    pub drain_timeout_ms: u64,
    /// Starting record capacity of mirror buffers.
    pub min_mirror_capacity: usize,
    /// Shadow budgeting.
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: FRAMES_IN_FLIGHT,
            drain_timeout_ms: DRAIN_TIMEOUT_MS,
            min_mirror_capacity: MIN_MIRROR_CAPACITY,
            shadow: ShadowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed documents, any other variant for
    /// values that fail [`RendererConfig::validate`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every cross-field constraint.
    ///
    /// # Errors
    ///
    /// The first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if self.min_mirror_capacity == 0 {
            return Err(ConfigError::NotPositive("min_mirror_capacity"));
        }

        let shadow = &self.shadow;
        if !shadow.block_size.is_power_of_two() {
            return Err(ConfigError::BlockSize(shadow.block_size));
        }
        let tile_blocks = shadow.max_tile_texels / shadow.block_size;
        if shadow.max_tile_texels % shadow.block_size != 0 || !tile_blocks.is_power_of_two() {
            return Err(ConfigError::TileTexels {
                max_tile_texels: shadow.max_tile_texels,
                block_size: shadow.block_size,
            });
        }
        if shadow.max_lights == 0 {
            return Err(ConfigError::NotPositive("max_lights"));
        }
        for (name, value) in [
            ("resolution_heuristic", shadow.resolution_heuristic),
            ("max_world_depth", shadow.max_world_depth),
            ("light_z_near", shadow.light_z_near),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        self.atlas_extent().map(|_| ())
    }

    /// Atlas size in blocks.
    ///
    /// # Errors
    ///
    /// [`ConfigError::AtlasNotDivisible`] or [`ConfigError::Atlas`].
    pub fn atlas_extent(&self) -> Result<AtlasExtent, ConfigError> {
        let [w, h] = self.shadow.atlas_resolution;
        let block_size = self.shadow.block_size;
        if block_size == 0 || w % block_size != 0 || h % block_size != 0 {
            return Err(ConfigError::AtlasNotDivisible {
                resolution: self.shadow.atlas_resolution,
                block_size,
            });
        }
        Ok(AtlasExtent::new(w / block_size, h / block_size)?)
    }

    /// Scoring and budgeting parameters.
    #[must_use]
    pub fn shadow_settings(&self) -> ShadowSettings {
        ShadowSettings {
            block_size: self.shadow.block_size,
            max_tile_texels: self.shadow.max_tile_texels,
            max_lights: self.shadow.max_lights,
            resolution_heuristic: self.shadow.resolution_heuristic,
            max_world_depth: self.shadow.max_world_depth,
            light_z_near: self.shadow.light_z_near,
        }
    }

    /// Frame ring drain timeout.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.atlas_extent().unwrap().to_array(), [128, 128]);
        assert_eq!(config.shadow_settings(), ShadowSettings::default());
    }

    #[test]
    fn test_partial_override() {
        let config = RendererConfig::from_toml_str(
            r#"
            frames_in_flight = 2

            [shadow]
            atlas_resolution = [1024, 512]
            max_lights = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.shadow.block_size, 64);
        assert_eq!(config.atlas_extent().unwrap().to_array(), [16, 8]);
        assert_eq!(config.shadow_settings().max_lights, 16);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RendererConfig::from_toml_str("frames_in_flight = 0"),
            Err(ConfigError::NoGenerations)
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[shadow]\nblock_size = 48"),
            Err(ConfigError::BlockSize(48))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[shadow]\natlas_resolution = [8192, 8100]"),
            Err(ConfigError::AtlasNotDivisible { .. })
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[shadow]\natlas_resolution = [4096, 8192]"),
            Err(ConfigError::Atlas(AtlasError::UnsupportedAspect { .. }))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[shadow]\natlas_resolution = [32768, 32768]"),
            Err(ConfigError::Atlas(AtlasError::TooLarge { .. }))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[shadow]\nlight_z_near = -1.0"),
            Err(ConfigError::NotPositive("light_z_near"))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            RendererConfig::from_toml_str("frames_in_flight = \"three\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("unknown_field = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
