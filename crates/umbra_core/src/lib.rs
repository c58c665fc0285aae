//! # UMBRA Core
//!
//! Host-authoritative record containers with incrementally synchronized
//! device mirrors, designed for:
//! - Hundreds of thousands of scene records mutated every frame
//! - Uploads proportional to what changed, not to what exists
//! - Never touching a buffer the device may still be reading
//!
//! ## Architecture Rules
//!
//! 1. **Host is the source of truth** - device buffers are mirrors
//! 2. **Coalesced uploads** - neighbouring dirty slots share one copy
//! 3. **Deferred release** - transient buffers live until their generation drains
//!
//! ## Example
//!
//! ```rust,ignore
//! use umbra_core::{FrameRing, MirrorVec, SoftwareDevice};
//!
//! let device = SoftwareDevice::new();
//! let mut ring = FrameRing::default();
//! let mut mirror: MirrorVec<[f32; 4], _> = MirrorVec::new(&device, "points");
//!
//! mirror.push([0.0, 1.0, 2.0, 1.0]);
//! let generation = ring.acquire_next(&device);
//! mirror.flush(&device, generation);
//! ring.submit(device.submit());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod device;
pub mod dirty;
pub mod error;
pub mod mirror;
pub mod slots;
pub mod stable;
pub mod sync;

pub use device::{CopyRegion, Fences, GpuDevice, SoftwareBuffer, SoftwareDevice, SubmissionIndex};
#[cfg(feature = "wgpu-backend")]
pub use device::WgpuDevice;
pub use dirty::DirtyTracker;
pub use error::{DeviceError, SyncError};
pub use mirror::{FlushStats, MirrorVec};
pub use slots::{SlotArena, SlotHandle};
pub use stable::{StableId, StableList};
pub use sync::{FrameRing, Generation, GenerationState};
