//! # Stable-Index List
//!
//! A [`MirrorVec`] whose slots never move. Removal leaves a hole that a
//! later `add` reuses, so a [`StableId`] handed to the device (or stored in
//! other records) keeps naming the same entity until it is removed.
//!
//! Removed slots stay in the device buffer with their last content. Callers
//! mark such records inert before removing them.

use std::collections::BTreeSet;

use bytemuck::Pod;

use crate::device::GpuDevice;
use crate::mirror::{FlushStats, MirrorVec};
use crate::sync::Generation;

/// Identifier of a live slot in a [`StableList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StableId(u32);

impl StableId {
    /// Storage slot this id refers to.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_slot(slot: usize) -> Self {
        assert!(u32::try_from(slot).is_ok(), "stable list exhausted 32-bit ids");
        Self(slot as u32)
    }
}

/// Mirror container with stable slot identities.
pub struct StableList<T: Pod, D: GpuDevice> {
    mirror: MirrorVec<T, D>,
    /// Removed slots, ordered so reuse picks the smallest.
    free: BTreeSet<usize>,
}

impl<T: Pod, D: GpuDevice> StableList<T, D> {
    /// Creates an empty list.
    #[must_use]
    pub fn new(device: &D, label: &str) -> Self {
        Self::from_mirror(MirrorVec::new(device, label))
    }

    /// Creates an empty list with an explicit initial capacity.
    #[must_use]
    pub fn with_capacity(device: &D, label: &str, capacity: usize) -> Self {
        Self::from_mirror(MirrorVec::with_capacity(device, label, capacity))
    }

    fn from_mirror(mirror: MirrorVec<T, D>) -> Self {
        Self {
            mirror,
            free: BTreeSet::new(),
        }
    }

    #[inline]
    fn check_live(&self, id: StableId) {
        assert!(
            !self.free.contains(&id.index()),
            "stable id {} was removed from '{}'",
            id.index(),
            self.mirror.label()
        );
    }

    /// Stores `record`, reusing the smallest free slot if there is one.
    pub fn add(&mut self, record: T) -> StableId {
        if let Some(&slot) = self.free.first() {
            if slot < self.mirror.len() {
                self.free.remove(&slot);
                *self.mirror.get_mut(slot) = record;
                return StableId::from_slot(slot);
            }
            // Every hole lies past the end; none can be reused.
            self.free.clear();
        }
        StableId::from_slot(self.mirror.push(record))
    }

    /// Releases `id` for reuse. The slot is not compacted.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range or already removed.
    pub fn remove(&mut self, id: StableId) -> T {
        let record = *self.get(id);
        self.free.insert(id.index());
        record
    }

    /// Record for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range or removed.
    #[must_use]
    pub fn get(&self, id: StableId) -> &T {
        self.check_live(id);
        self.mirror.get(id.index())
    }

    /// Mutable record for `id`; marks it for upload.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range or removed.
    pub fn get_mut(&mut self, id: StableId) -> &mut T {
        self.check_live(id);
        self.mirror.get_mut(id.index())
    }

    /// Whether `id` names a live record.
    #[must_use]
    pub fn contains(&self, id: StableId) -> bool {
        id.index() < self.mirror.len() && !self.free.contains(&id.index())
    }

    /// Storage length, holes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    /// Whether storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    /// Number of live records.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.mirror.len() - self.free.iter().filter(|&&slot| slot < self.mirror.len()).count()
    }

    /// Iterates over live records.
    pub fn iter(&self) -> impl Iterator<Item = (StableId, &T)> + '_ {
        self.mirror
            .iter()
            .enumerate()
            .filter(|(slot, _)| !self.free.contains(slot))
            .map(|(slot, record)| (StableId::from_slot(slot), record))
    }

    /// See [`MirrorVec::flush`].
    pub fn flush(&mut self, device: &D, generation: &mut Generation) -> FlushStats {
        self.mirror.flush(device, generation)
    }

    /// The device buffer.
    #[must_use]
    pub fn device_buffer(&self) -> &D::Buffer {
        self.mirror.device_buffer()
    }

    /// The underlying mirror, holes included.
    #[must_use]
    pub fn mirror(&self) -> &MirrorVec<T, D> {
        &self.mirror
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::{GpuDevice, SoftwareDevice};
    use crate::sync::FrameRing;

    type List = StableList<u32, SoftwareDevice>;

    #[test]
    fn test_ids_survive_removals() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");

        let a = list.add(10);
        let b = list.add(20);
        let c = list.add(30);
        list.remove(b);

        assert_eq!(*list.get(a), 10);
        assert_eq!(*list.get(c), 30);
        assert_eq!(list.len(), 3);
        assert_eq!(list.live_count(), 2);
        assert!(!list.contains(b));
    }

    #[test]
    fn test_reuse_picks_smallest_free_slot() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");

        let ids: Vec<_> = (0..5).map(|i| list.add(i)).collect();
        list.remove(ids[3]);
        list.remove(ids[1]);

        assert_eq!(list.add(100), ids[1]);
        assert_eq!(list.add(101), ids[3]);
        assert_eq!(list.add(102).index(), 5);
    }

    #[test]
    fn test_live_id_never_reissued() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");
        let mut live = std::collections::HashSet::new();

        for round in 0..200u32 {
            let id = list.add(round);
            assert!(live.insert(id), "id {id:?} issued while live");
            if round % 3 == 0 {
                let victim = *live.iter().min().unwrap();
                list.remove(victim);
                live.remove(&victim);
            }
        }
        assert_eq!(list.live_count(), live.len());
        assert_eq!(list.iter().count(), live.len());
    }

    #[test]
    fn test_free_slots_past_end_discarded() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");
        for i in 0..4 {
            list.add(i);
        }
        list.remove(StableId(2));
        list.remove(StableId(3));
        list.mirror.truncate(2);

        assert_eq!(list.add(9).index(), 2);
        assert!(list.free.is_empty());
    }

    #[test]
    fn test_removed_slot_keeps_device_content() {
        let device = SoftwareDevice::new();
        let mut ring = FrameRing::new(3, Duration::from_millis(10));
        let mut list = List::new(&device, "entities");

        let a = list.add(7);
        list.remove(a);
        list.flush(&device, ring.acquire_next(&device));
        ring.submit(device.submit());

        let bytes = list.device_buffer().read();
        let words: &[u32] = bytemuck::cast_slice(&bytes[..20]);
        assert_eq!(words[0], 1); // storage length, not live count
        assert_eq!(words[4], 7);
    }

    #[test]
    #[should_panic(expected = "was removed")]
    fn test_get_after_remove_panics() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");
        let id = list.add(1);
        list.remove(id);
        let _ = list.get(id);
    }

    #[test]
    #[should_panic(expected = "was removed")]
    fn test_double_remove_panics() {
        let device = SoftwareDevice::new();
        let mut list = List::new(&device, "entities");
        let id = list.add(1);
        list.remove(id);
        list.remove(id);
    }
}
