//! # UMBRA Shared
//!
//! Types agreed between host code and device code.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - `wgpu`
//! - Any GPU or window-related crate
//!
//! Device-facing records live in `umbra_rendering`; this crate only carries
//! the math they are built from and the layout constants the device-side
//! code mirrors.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    ARRAY_HEADER_SIZE, FRAMES_IN_FLIGHT, LIGHT_Z_NEAR, MAX_LIGHTS, MIN_MIRROR_CAPACITY,
    SHADOW_ATLAS_BLOCK_SIZE,
};
pub use math::{Mat4, Placement, Quaternion, Vec2, Vec3, Vec4};
