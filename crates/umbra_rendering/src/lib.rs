//! # UMBRA Rendering
//!
//! Scene records and per-frame shadow budgeting on top of `umbra_core`'s
//! mirrored containers.
//!
//! ## Modules
//!
//! - [`records`]: device-layout entity and light records
//! - [`culling`]: cone, sphere and box tests
//! - [`lighting`]: spotlight scoring and shadow atlas packing
//! - [`scene`]: the frame loop tying it together
//! - [`config`]: TOML renderer configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use umbra_core::SoftwareDevice;
//! use umbra_rendering::{RenderScene, RendererConfig};
//!
//! let mut scene = RenderScene::new(SoftwareDevice::new(), RendererConfig::default())?;
//! let id = scene.add_entity(entity);
//!
//! scene.begin_frame();
//! let summary = scene.prepare_frame(&viewer_cone, &camera_view_proj);
//! scene.end_frame();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod culling;
pub mod lighting;
pub mod records;
pub mod scene;

pub use config::{ConfigError, RendererConfig, ShadowConfig};
pub use culling::{Aabb3, Cone, Sphere};
pub use lighting::{
    allocate, evaluate, filter_lights, AtlasExtent, BudgetWarning, FilterReport, LightPriority,
    ShadowSettings, Spotlight,
};
pub use records::{AtlasRect, LightDef, MeshRef, RenderEntity};
pub use scene::{EntityId, FrameSummary, LightId, RenderScene};
