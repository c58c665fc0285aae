//! # Frame Generation Ring
//!
//! A fixed ring of generation slots. Each frame records into one slot;
//! resources that frame made obsolete are parked on the slot and released
//! only once the slot comes round again and its submission has completed.
//!
//! ```text
//!   Idle ──acquire──► Recording ──submit──► InFlight ──acquire──► Draining ──► Recording
//!    ▲                                                                             │
//!    └──────────────────────────────── drain_all ◄─────────────────────────────────┘
//! ```

use std::time::Duration;

use umbra_shared::constants::{DRAIN_TIMEOUT_MS, FRAMES_IN_FLIGHT};

use crate::device::{Fences, SubmissionIndex};
use crate::error::SyncError;

/// Deferred release action, run after the owning generation drains.
pub type ReleaseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a generation slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationState {
    /// Unused, nothing pending.
    Idle,
    /// The current frame is recording into this generation.
    Recording,
    /// Submitted; the device may still be reading its resources.
    InFlight,
    /// Waiting for the submission to complete.
    Draining,
}

/// One slot of the ring.
pub struct Generation {
    index: usize,
    state: GenerationState,
    submission: Option<SubmissionIndex>,
    releases: Vec<ReleaseCallback>,
}

impl Generation {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: GenerationState::Idle,
            submission: None,
            releases: Vec::new(),
        }
    }

    /// Position of this slot in the ring.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Submission this generation is waiting on, if any.
    #[must_use]
    pub fn submission(&self) -> Option<SubmissionIndex> {
        self.submission
    }

    /// Number of release callbacks waiting for this generation to drain.
    #[must_use]
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    /// Queues `callback` to run once this generation's work has completed.
    pub fn defer_release(&mut self, callback: impl FnOnce() + Send + 'static) {
        debug_assert_eq!(self.state, GenerationState::Recording);
        self.releases.push(Box::new(callback));
    }

    /// Keeps `resource` alive until this generation drains.
    pub fn retain<R: Send + 'static>(&mut self, resource: R) {
        self.defer_release(move || drop(resource));
    }

    fn run_releases(&mut self) {
        for release in self.releases.drain(..) {
            release();
        }
    }

    fn drain<F: Fences + ?Sized>(&mut self, fences: &F, timeout: Duration) -> Result<(), SyncError> {
        if let Some(submission) = self.submission {
            self.state = GenerationState::Draining;
            if let Err(source) = fences.wait(submission, timeout) {
                self.state = GenerationState::InFlight;
                return Err(SyncError::DrainTimeout {
                    generation: self.index,
                    source,
                });
            }
        }
        self.run_releases();
        self.submission = None;
        self.state = GenerationState::Idle;
        Ok(())
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("submission", &self.submission)
            .field("pending_releases", &self.releases.len())
            .finish()
    }
}

/// Ring of frame generations.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut ring = FrameRing::default();
/// loop {
///     let generation = ring.acquire_next(&device);
///     mirror.flush(&device, generation);
///     ring.submit(device.submit());
/// }
/// ```
#[derive(Debug)]
pub struct FrameRing {
    generations: Vec<Generation>,
    active: Option<usize>,
    next: usize,
    timeout: Duration,
    frame_count: u64,
}

impl FrameRing {
    /// Creates a ring of `count` generations.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    pub fn new(count: usize, timeout: Duration) -> Self {
        assert!(count > 0, "frame ring needs at least one generation");
        tracing::info!("Frame ring created: {} generations, drain timeout {:?}", count, timeout);
        Self {
            generations: (0..count).map(Generation::new).collect(),
            active: None,
            next: 0,
            timeout,
            frame_count: 0,
        }
    }

    /// Number of generations in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Always false; a ring has at least one generation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// Frames acquired so far.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Drain timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read access to a generation slot.
    #[must_use]
    pub fn generation(&self, index: usize) -> &Generation {
        &self.generations[index]
    }

    /// The generation currently recording, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Generation> {
        self.active.map(|i| &self.generations[i])
    }

    /// The generation currently recording.
    ///
    /// # Panics
    ///
    /// Panics if no generation has been acquired.
    pub fn recording(&mut self) -> &mut Generation {
        let Some(index) = self.active else {
            panic!("no generation is recording; acquire one first");
        };
        &mut self.generations[index]
    }

    /// Advances to the next generation, draining its previous work.
    ///
    /// # Errors
    ///
    /// [`SyncError::DrainTimeout`] if the generation's submission did not
    /// complete in time. The ring is left unchanged and the call can be
    /// retried.
    ///
    /// # Panics
    ///
    /// Panics if a generation is still recording.
    pub fn try_acquire_next<F: Fences + ?Sized>(&mut self, fences: &F) -> Result<&mut Generation, SyncError> {
        if let Some(active) = self.active {
            panic!("generation {active} is still recording; submit it before acquiring the next");
        }

        let index = self.next;
        let timeout = self.timeout;
        let generation = &mut self.generations[index];
        generation.drain(fences, timeout)?;
        generation.state = GenerationState::Recording;

        self.active = Some(index);
        self.next = (index + 1) % self.generations.len();
        self.frame_count += 1;
        Ok(&mut self.generations[index])
    }

    /// Like [`Self::try_acquire_next`], but a drain timeout is fatal.
    ///
    /// # Panics
    ///
    /// Panics if the generation fails to drain, or one is still recording.
    pub fn acquire_next<F: Fences + ?Sized>(&mut self, fences: &F) -> &mut Generation {
        let index = self.next;
        if let Err(error) = self.try_acquire_next(fences) {
            tracing::error!("GPU appears hung: {}", error);
            panic!("frame generation {index} never drained: {error}");
        }
        self.recording()
    }

    /// Marks the recording generation in flight on `submission`.
    ///
    /// # Panics
    ///
    /// Panics if no generation is recording.
    pub fn submit(&mut self, submission: SubmissionIndex) {
        let generation = self.recording();
        generation.submission = Some(submission);
        generation.state = GenerationState::InFlight;
        self.active = None;
    }

    /// Queues a release on the recording generation.
    ///
    /// # Panics
    ///
    /// Panics if no generation is recording.
    pub fn defer_release(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.recording().defer_release(callback);
    }

    /// Waits for every generation and runs all pending releases.
    ///
    /// A generation still recording is abandoned: its releases run and it
    /// returns to idle.
    ///
    /// # Errors
    ///
    /// [`SyncError::DrainTimeout`] for the first generation that fails.
    pub fn drain_all<F: Fences + ?Sized>(&mut self, fences: &F) -> Result<(), SyncError> {
        self.active = None;
        let timeout = self.timeout;
        for generation in &mut self.generations {
            generation.drain(fences, timeout)?;
        }
        Ok(())
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new(FRAMES_IN_FLIGHT, Duration::from_millis(DRAIN_TIMEOUT_MS))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::device::{GpuDevice, SoftwareDevice};

    #[test]
    fn test_rotation_order() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(3, Duration::from_millis(10));

        let mut order = Vec::new();
        for _ in 0..7 {
            order.push(ring.acquire_next(&device).index());
            ring.submit(device.submit());
        }
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.frame_count(), 7);
    }

    #[test]
    fn test_release_runs_only_after_generation_returns() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(2, Duration::from_millis(10));
        let released = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&released);
        ring.acquire_next(&device);
        ring.defer_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ring.submit(device.submit());
        assert_eq!(ring.generation(0).state(), GenerationState::InFlight);

        // Generation 1 does not touch generation 0's releases.
        ring.acquire_next(&device);
        ring.submit(device.submit());
        assert_eq!(released.load(Ordering::SeqCst), 0);

        // Back to generation 0: fence waited, release runs.
        ring.acquire_next(&device);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(ring.generation(0).pending_releases(), 0);
    }

    #[test]
    fn test_timeout_is_reported() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(1, Duration::from_millis(1));
        let released = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&released);
        ring.acquire_next(&device).defer_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ring.submit(device.submit());

        device.set_completion_held(true);
        let err = ring.try_acquire_next(&device).unwrap_err();
        assert!(matches!(err, SyncError::DrainTimeout { generation: 0, .. }));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(ring.generation(0).state(), GenerationState::InFlight);

        // Retry once the device recovers.
        device.set_completion_held(false);
        assert!(ring.try_acquire_next(&device).is_ok());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "never drained")]
    fn test_acquire_next_panics_on_timeout() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(1, Duration::from_millis(1));
        ring.acquire_next(&device);
        ring.submit(device.submit());
        device.set_completion_held(true);
        ring.acquire_next(&device);
    }

    #[test]
    #[should_panic(expected = "still recording")]
    fn test_double_acquire_panics() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::default();
        ring.acquire_next(&device);
        ring.acquire_next(&device);
    }

    #[test]
    fn test_drain_all_releases_everything() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(3, Duration::from_millis(10));
        let buffer = device.create_buffer("parked", 16);

        ring.acquire_next(&device).retain(buffer);
        ring.submit(device.submit());
        assert_eq!(device.live_buffer_count(), 1);

        ring.drain_all(&device).unwrap();
        assert_eq!(device.live_buffer_count(), 0);
        assert!((0..3).all(|i| ring.generation(i).state() == GenerationState::Idle));
    }
}
