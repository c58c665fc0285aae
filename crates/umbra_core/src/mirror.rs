//! # Mirror Container
//!
//! A host-side array of records mirrored into one device buffer. The host
//! array is the source of truth; the device copy is brought up to date by
//! [`MirrorVec::flush`], which uploads only slots dirtied since the last
//! flush.
//!
//! ## Device Layout
//!
//! ```text
//! offset 0                16               16 + size           16 + i * size
//! ┌───────────────────────┬────────────────┬────────────────┬ ─ ─ ┬────────────────┐
//! │ len | capacity | 0 | 0│   record 0     │   record 1     │     │   record i     │
//! └───────────────────────┴────────────────┴────────────────┴ ─ ─ ┴────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Copies are recorded into the device queue, so a flush for frame N lands
//! after every device read of frame N-1. Staging buffers and buffers
//! replaced by growth are parked on the flushing generation.

use bytemuck::Pod;
use umbra_shared::constants::{ARRAY_HEADER_SIZE, MIN_MIRROR_CAPACITY};

use crate::device::{CopyRegion, GpuDevice};
use crate::dirty::DirtyTracker;
use crate::sync::Generation;

/// What a single flush did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Records uploaded.
    pub records_copied: usize,
    /// Coalesced record spans (the header copy is not counted).
    pub spans: usize,
    /// Size of the staging upload in bytes, header included.
    pub bytes_uploaded: u64,
    /// Whether the header region was written.
    pub header_written: bool,
    /// Whether the device buffer was reallocated.
    pub grew: bool,
    /// Dirty slots beyond the live length, discarded without upload.
    pub dropped: usize,
}

impl FlushStats {
    /// Whether the flush recorded any device work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.header_written
    }

    /// Accumulates another flush into this one.
    pub fn merge(&mut self, other: FlushStats) {
        self.records_copied += other.records_copied;
        self.spans += other.spans;
        self.bytes_uploaded += other.bytes_uploaded;
        self.header_written |= other.header_written;
        self.grew |= other.grew;
        self.dropped += other.dropped;
    }
}

/// Host array of `T` with an incrementally synchronized device mirror.
///
/// Slot identities are not stable: [`MirrorVec::swap_remove`] moves the
/// last record. Use [`crate::StableList`] for stable ids.
pub struct MirrorVec<T: Pod, D: GpuDevice> {
    records: Vec<T>,
    dirty: DirtyTracker,
    header_dirty: bool,
    buffer: D::Buffer,
    capacity: usize,
    label: String,
}

#[allow(clippy::cast_possible_truncation)]
fn header(len: usize, capacity: usize) -> [u32; 4] {
    [len as u32, capacity as u32, 0, 0]
}

impl<T: Pod, D: GpuDevice> MirrorVec<T, D> {
    const RECORD_SIZE: u64 = std::mem::size_of::<T>() as u64;

    /// Creates an empty container with the default minimum capacity.
    #[must_use]
    pub fn new(device: &D, label: &str) -> Self {
        Self::with_capacity(device, label, MIN_MIRROR_CAPACITY)
    }

    /// Creates an empty container whose device buffer holds `capacity`
    /// records before it must grow.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized or not a multiple of 4 bytes.
    #[must_use]
    pub fn with_capacity(device: &D, label: &str, capacity: usize) -> Self {
        assert!(
            Self::RECORD_SIZE > 0 && Self::RECORD_SIZE % 4 == 0,
            "mirror record size must be a non-zero multiple of 4 bytes, got {}",
            Self::RECORD_SIZE
        );
        let capacity = capacity.max(1);
        Self {
            records: Vec::new(),
            dirty: DirtyTracker::new(capacity),
            header_dirty: true,
            buffer: device.create_buffer(label, Self::buffer_bytes(capacity)),
            capacity,
            label: label.to_owned(),
        }
    }

    /// Creates a container holding `records`, all dirty.
    #[must_use]
    pub fn with_initial(device: &D, label: &str, records: &[T], capacity: usize) -> Self {
        let mut mirror = Self::with_capacity(device, label, capacity.max(records.len()));
        mirror.extend_from_slice(records);
        mirror
    }

    fn buffer_bytes(capacity: usize) -> u64 {
        ARRAY_HEADER_SIZE + capacity as u64 * Self::RECORD_SIZE
    }

    fn slot_offset(slot: usize) -> u64 {
        ARRAY_HEADER_SIZE + slot as u64 * Self::RECORD_SIZE
    }

    #[inline]
    fn check(&self, slot: usize) {
        assert!(
            slot < self.records.len(),
            "slot {slot} out of range for mirror '{}' (len {})",
            self.label,
            self.records.len()
        );
    }

    /// Number of live records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no live records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record capacity of the current device buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots waiting for upload.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.dirty_count()
    }

    /// Whether `slot` is waiting for upload.
    #[must_use]
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.is_dirty(slot)
    }

    /// The device buffer. Replaced when the container grows.
    #[must_use]
    pub fn device_buffer(&self) -> &D::Buffer {
        &self.buffer
    }

    /// Debug label, also used for device buffers.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Live records.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.records
    }

    /// Iterates over live records.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    /// Appends a record and returns its slot.
    pub fn push(&mut self, record: T) -> usize {
        let slot = self.records.len();
        self.records.push(record);
        self.dirty.mark_dirty(slot);
        self.header_dirty = true;
        slot
    }

    /// Appends every record in `records`.
    pub fn extend_from_slice(&mut self, records: &[T]) {
        if records.is_empty() {
            return;
        }
        let start = self.records.len();
        self.records.extend_from_slice(records);
        self.dirty.mark_range_dirty(start, self.records.len());
        self.header_dirty = true;
    }

    /// Record at `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, slot: usize) -> &T {
        self.check(slot);
        &self.records[slot]
    }

    /// Mutable record at `slot`; marks it dirty.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> &mut T {
        self.check(slot);
        self.dirty.mark_dirty(slot);
        &mut self.records[slot]
    }

    /// Removes `slot`, moving the last record into it.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn swap_remove(&mut self, slot: usize) -> T {
        self.check(slot);
        let last = self.records.len() - 1;
        let removed = self.records.swap_remove(slot);
        self.dirty.mark_dirty(slot);
        self.dirty.mark_dirty(last);
        self.header_dirty = true;
        removed
    }

    /// Removes and returns the last record.
    pub fn pop(&mut self) -> Option<T> {
        let record = self.records.pop()?;
        self.header_dirty = true;
        Some(record)
    }

    /// Shortens the container to `len` records.
    pub fn truncate(&mut self, len: usize) {
        if len < self.records.len() {
            self.records.truncate(len);
            self.header_dirty = true;
        }
    }

    /// Removes every record. The device buffer keeps its capacity.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Makes the container's content equal to `records`, dirtying only slots
    /// whose bytes changed.
    pub fn sync_from_slice(&mut self, records: &[T]) {
        let shared = self.records.len().min(records.len());
        for (slot, (current, incoming)) in self.records[..shared].iter_mut().zip(records).enumerate() {
            if bytemuck::bytes_of(current) != bytemuck::bytes_of(incoming) {
                *current = *incoming;
                self.dirty.mark_dirty(slot);
            }
        }
        if records.len() > shared {
            self.extend_from_slice(&records[shared..]);
        } else {
            self.truncate(records.len());
        }
    }

    /// Uploads the dirty set and header to the device buffer.
    ///
    /// Copies are recorded on `device` and execute with its next submit.
    /// Neighbouring dirty slots share one copy region. Dirty slots beyond
    /// the live length are discarded.
    pub fn flush(&mut self, device: &D, generation: &mut Generation) -> FlushStats {
        let len = self.records.len();
        let mut stats = FlushStats::default();

        let spans: Vec<(usize, usize)> = self
            .dirty
            .iter_spans()
            .filter(|&(first, _)| first < len)
            .map(|(first, count)| (first, count.min(len - first)))
            .collect();
        stats.records_copied = spans.iter().map(|&(_, count)| count).sum();
        stats.spans = spans.len();
        stats.dropped = self.dirty.dirty_count() - stats.records_copied;
        self.dirty.clear();

        if spans.is_empty() && !self.header_dirty {
            return stats;
        }

        if len > self.capacity {
            self.grow(device, generation, len);
            stats.grew = true;
        }

        let record_bytes = stats.records_copied as u64 * Self::RECORD_SIZE;
        let mut staging =
            Vec::with_capacity(usize::try_from(ARRAY_HEADER_SIZE + record_bytes).unwrap_or(0));
        staging.extend_from_slice(bytemuck::bytes_of(&header(len, self.capacity)));

        let mut regions = Vec::with_capacity(spans.len() + 1);
        regions.push(CopyRegion::new(0, 0, ARRAY_HEADER_SIZE));
        for &(first, count) in &spans {
            let src_offset = staging.len() as u64;
            staging.extend_from_slice(bytemuck::cast_slice(&self.records[first..first + count]));
            regions.push(CopyRegion::new(
                src_offset,
                Self::slot_offset(first),
                count as u64 * Self::RECORD_SIZE,
            ));
        }

        let upload = device.create_staging_buffer(&self.label, &staging);
        device.copy_buffer_regions(&upload, &self.buffer, &regions);
        generation.retain(upload);

        self.header_dirty = false;
        stats.header_written = true;
        stats.bytes_uploaded = staging.len() as u64;

        tracing::debug!(
            "Flushed '{}': {} records in {} spans, {} bytes{}",
            self.label,
            stats.records_copied,
            stats.spans,
            stats.bytes_uploaded,
            if stats.dropped > 0 { " (dropped stale slots)" } else { "" }
        );
        stats
    }

    /// Replaces the device buffer with one holding at least `needed`
    /// records. The old contents are carried over on the device.
    fn grow(&mut self, device: &D, generation: &mut Generation, needed: usize) {
        let mut capacity = self.capacity;
        while capacity < needed {
            capacity *= 2;
        }

        let replacement = device.create_buffer(&self.label, Self::buffer_bytes(capacity));
        let old_size = device.buffer_size(&self.buffer);
        device.copy_buffer_regions(&self.buffer, &replacement, &[CopyRegion::new(0, 0, old_size)]);
        let old = std::mem::replace(&mut self.buffer, replacement);
        generation.retain(old);

        tracing::debug!(
            "Mirror '{}' grew: {} -> {} records",
            self.label,
            self.capacity,
            capacity
        );
        self.capacity = capacity;
    }
}

impl<T: Pod + std::fmt::Debug, D: GpuDevice> std::fmt::Debug for MirrorVec<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorVec")
            .field("label", &self.label)
            .field("len", &self.records.len())
            .field("capacity", &self.capacity)
            .field("dirty", &self.dirty.dirty_count())
            .finish_non_exhaustive()
    }
}
