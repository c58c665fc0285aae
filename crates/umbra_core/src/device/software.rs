//! # Software Device
//!
//! A host-memory stand-in for a GPU. Copies are recorded and executed in
//! order on submit, exactly like a single device queue, and every executed
//! region is logged so tests can count spans.
//!
//! Fence completion can be held back to simulate a hung submission.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{CopyRegion, Fences, GpuDevice, SubmissionIndex};
use crate::error::DeviceError;

/// Backing storage of one software buffer.
struct Storage {
    bytes: Mutex<Vec<u8>>,
    live: Arc<AtomicUsize>,
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Handle to a software buffer. Clones share storage.
#[derive(Clone)]
pub struct SoftwareBuffer {
    id: u64,
    label: Arc<str>,
    storage: Arc<Storage>,
}

impl SoftwareBuffer {
    /// Device-unique buffer id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Debug label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.bytes.lock().len()
    }

    /// Whether the buffer has zero size.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the buffer contents.
    #[must_use]
    pub fn read(&self) -> Vec<u8> {
        self.storage.bytes.lock().clone()
    }
}

impl std::fmt::Debug for SoftwareBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareBuffer")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// One copy region executed by a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRecord {
    /// Submission that executed the copy.
    pub submission: SubmissionIndex,
    /// Source buffer id.
    pub src: u64,
    /// Destination buffer id.
    pub dst: u64,
    /// Byte ranges.
    pub region: CopyRegion,
}

struct PendingCopy {
    src: SoftwareBuffer,
    dst: SoftwareBuffer,
    regions: Vec<CopyRegion>,
}

#[derive(Default)]
struct State {
    next_buffer_id: u64,
    pending: Vec<PendingCopy>,
    log: Vec<CopyRecord>,
    last_submitted: u64,
    completed: u64,
    hold_completion: bool,
}

/// Host-memory device. See the module docs.
pub struct SoftwareDevice {
    state: Mutex<State>,
    live_buffers: Arc<AtomicUsize>,
}

impl SoftwareDevice {
    /// Creates an empty device.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            live_buffers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of buffers whose storage is still alive.
    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.load(Ordering::Relaxed)
    }

    /// While held, waiting on any submission not yet completed times out.
    pub fn set_completion_held(&self, held: bool) {
        self.state.lock().hold_completion = held;
    }

    /// Every copy region executed so far, in execution order.
    #[must_use]
    pub fn copy_log(&self) -> Vec<CopyRecord> {
        self.state.lock().log.clone()
    }

    /// Returns and clears the copy log.
    pub fn take_copy_log(&self) -> Vec<CopyRecord> {
        std::mem::take(&mut self.state.lock().log)
    }

    /// Index of the most recent submission.
    #[must_use]
    pub fn last_submission(&self) -> SubmissionIndex {
        SubmissionIndex(self.state.lock().last_submitted)
    }

    fn allocate(&self, state: &mut State, label: &str, bytes: Vec<u8>) -> SoftwareBuffer {
        state.next_buffer_id += 1;
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        SoftwareBuffer {
            id: state.next_buffer_id,
            label: Arc::from(label),
            storage: Arc::new(Storage {
                bytes: Mutex::new(bytes),
                live: Arc::clone(&self.live_buffers),
            }),
        }
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn execute(copy: &PendingCopy, submission: SubmissionIndex, log: &mut Vec<CopyRecord>) {
    let same = Arc::ptr_eq(&copy.src.storage, &copy.dst.storage);
    for region in &copy.regions {
        let src = usize::try_from(region.src_offset).unwrap_or(usize::MAX);
        let dst = usize::try_from(region.dst_offset).unwrap_or(usize::MAX);
        let size = usize::try_from(region.size).unwrap_or(usize::MAX);

        if same {
            let mut bytes = copy.dst.storage.bytes.lock();
            assert!(
                src.saturating_add(size) <= bytes.len() && dst.saturating_add(size) <= bytes.len(),
                "copy region {region:?} out of bounds of '{}'",
                copy.dst.label
            );
            bytes.copy_within(src..src + size, dst);
        } else {
            let from = copy.src.storage.bytes.lock();
            let mut to = copy.dst.storage.bytes.lock();
            assert!(
                src.saturating_add(size) <= from.len(),
                "copy region {region:?} out of bounds of source '{}'",
                copy.src.label
            );
            assert!(
                dst.saturating_add(size) <= to.len(),
                "copy region {region:?} out of bounds of destination '{}'",
                copy.dst.label
            );
            to[dst..dst + size].copy_from_slice(&from[src..src + size]);
        }

        log.push(CopyRecord {
            submission,
            src: copy.src.id,
            dst: copy.dst.id,
            region: *region,
        });
    }
}

impl Fences for SoftwareDevice {
    fn wait(&self, submission: SubmissionIndex, timeout: Duration) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if submission.0 > state.last_submitted {
            return Err(DeviceError::UnknownSubmission(submission));
        }
        if submission.0 <= state.completed {
            return Ok(());
        }
        if state.hold_completion {
            return Err(DeviceError::Timeout {
                submission,
                timeout,
            });
        }
        state.completed = submission.0;
        Ok(())
    }
}

impl GpuDevice for SoftwareDevice {
    type Buffer = SoftwareBuffer;

    fn create_buffer(&self, label: &str, size: u64) -> SoftwareBuffer {
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        let mut state = self.state.lock();
        self.allocate(&mut state, label, vec![0u8; size])
    }

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> SoftwareBuffer {
        let mut state = self.state.lock();
        self.allocate(&mut state, label, contents.to_vec())
    }

    fn buffer_size(&self, buffer: &SoftwareBuffer) -> u64 {
        buffer.len() as u64
    }

    fn copy_buffer_regions(&self, src: &SoftwareBuffer, dst: &SoftwareBuffer, regions: &[CopyRegion]) {
        if regions.is_empty() {
            return;
        }
        self.state.lock().pending.push(PendingCopy {
            src: src.clone(),
            dst: dst.clone(),
            regions: regions.to_vec(),
        });
    }

    fn submit(&self) -> SubmissionIndex {
        let mut state = self.state.lock();
        state.last_submitted += 1;
        let submission = SubmissionIndex(state.last_submitted);

        let pending = std::mem::take(&mut state.pending);
        for copy in &pending {
            execute(copy, submission, &mut state.log);
        }
        submission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copies_execute_on_submit() {
        let device = SoftwareDevice::new();
        let dst = device.create_buffer("dst", 8);
        let src = device.create_staging_buffer("src", &[1, 2, 3, 4]);

        device.copy_buffer_regions(&src, &dst, &[CopyRegion::new(0, 4, 4)]);
        assert_eq!(dst.read(), vec![0; 8]);

        let submission = device.submit();
        assert_eq!(dst.read(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(device.copy_log().len(), 1);
        assert_eq!(device.copy_log()[0].submission, submission);
    }

    #[test]
    fn test_held_completion_times_out() {
        let device = SoftwareDevice::new();
        let submission = device.submit();

        device.set_completion_held(true);
        let result = device.wait(submission, Duration::from_millis(5));
        assert!(matches!(result, Err(DeviceError::Timeout { .. })));

        device.set_completion_held(false);
        assert!(device.wait(submission, Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn test_unknown_submission() {
        let device = SoftwareDevice::new();
        let result = device.wait(SubmissionIndex(7), Duration::from_millis(5));
        assert_eq!(result, Err(DeviceError::UnknownSubmission(SubmissionIndex(7))));
    }

    #[test]
    fn test_live_buffer_count_tracks_drops() {
        let device = SoftwareDevice::new();
        let a = device.create_buffer("a", 4);
        let b = a.clone();
        assert_eq!(device.live_buffer_count(), 1);
        drop(a);
        assert_eq!(device.live_buffer_count(), 1);
        drop(b);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
