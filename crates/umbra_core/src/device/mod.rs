//! # Device Abstraction
//!
//! The minimal surface the mirror containers need from a GPU: buffer
//! creation, buffer-to-buffer copies recorded into a single queue, and
//! fences for submitted work.
//!
//! ```text
//!   host records ──► staging buffer ──copy regions──► device buffer
//!                    (transient)                      (persistent)
//! ```
//!
//! Copies recorded through [`GpuDevice::copy_buffer_regions`] execute in
//! recording order when [`GpuDevice::submit`] is called.

use std::time::Duration;

use crate::error::DeviceError;

mod software;
#[cfg(feature = "wgpu-backend")]
mod wgpu_backend;

pub use software::{CopyRecord, SoftwareBuffer, SoftwareDevice};
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuDevice;

/// Monotonic identifier of one queue submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionIndex(pub u64);

/// One contiguous byte range copied between two buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyRegion {
    /// Byte offset in the source buffer.
    pub src_offset: u64,
    /// Byte offset in the destination buffer.
    pub dst_offset: u64,
    /// Number of bytes.
    pub size: u64,
}

impl CopyRegion {
    /// Creates a new copy region.
    #[must_use]
    pub const fn new(src_offset: u64, dst_offset: u64, size: u64) -> Self {
        Self {
            src_offset,
            dst_offset,
            size,
        }
    }
}

/// Completion tracking for submitted work.
pub trait Fences {
    /// Blocks until `submission` has completed on the device.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Timeout`] if it does not complete within `timeout`,
    /// [`DeviceError::UnknownSubmission`] if the index was never issued.
    fn wait(&self, submission: SubmissionIndex, timeout: Duration) -> Result<(), DeviceError>;
}

/// A GPU (or a stand-in for one) that owns buffers and a single queue.
pub trait GpuDevice: Fences {
    /// Buffer handle. Must be movable into deferred release callbacks.
    type Buffer: Send + 'static;

    /// Creates a zero-initialized device buffer usable as storage and as
    /// the source or destination of copies.
    fn create_buffer(&self, label: &str, size: u64) -> Self::Buffer;

    /// Creates a transient buffer holding `contents`, usable as a copy source.
    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Self::Buffer;

    /// Size of `buffer` in bytes.
    fn buffer_size(&self, buffer: &Self::Buffer) -> u64;

    /// Records copies from `src` into `dst`. Executed on the next submit.
    fn copy_buffer_regions(&self, src: &Self::Buffer, dst: &Self::Buffer, regions: &[CopyRegion]);

    /// Submits all recorded work to the queue.
    fn submit(&self) -> SubmissionIndex;
}
