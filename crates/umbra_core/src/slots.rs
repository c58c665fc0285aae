//! # Slot Arena
//!
//! Host-only storage with stable handles for objects that are not mirrored
//! record-for-record (lights are re-evaluated into a fresh device list every
//! frame). Freed slots are reused smallest-first like [`crate::StableList`].

use std::collections::BTreeSet;

/// Handle to an object in a [`SlotArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotHandle {
    index: usize,
}

impl SlotHandle {
    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Growable arena with handle reuse.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = SlotArena::new();
/// let handle = arena.insert(Spotlight::default());
/// arena.get_mut(handle).unwrap().set_depth(8.0);
/// arena.remove(handle);
/// ```
#[derive(Clone, Debug)]
pub struct SlotArena<T> {
    storage: Vec<Option<T>>,
    free: BTreeSet<usize>,
}

impl<T> SlotArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
            free: BTreeSet::new(),
        }
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len() - self.free.len()
    }

    /// Whether no slot is occupied.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` and returns its handle.
    pub fn insert(&mut self, value: T) -> SlotHandle {
        if let Some(index) = self.free.pop_first() {
            self.storage[index] = Some(value);
            return SlotHandle { index };
        }
        self.storage.push(Some(value));
        SlotHandle {
            index: self.storage.len() - 1,
        }
    }

    /// Removes the object, or returns `None` for a stale handle.
    pub fn remove(&mut self, handle: SlotHandle) -> Option<T> {
        let value = self.storage.get_mut(handle.index)?.take()?;
        self.free.insert(handle.index);
        Some(value)
    }

    /// Object for `handle`.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        self.storage.get(handle.index)?.as_ref()
    }

    /// Mutable object for `handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        self.storage.get_mut(handle.index)?.as_mut()
    }

    /// Iterates over occupied slots in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotHandle, &T)> {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (SlotHandle { index }, v)))
    }

    /// Iterates mutably over occupied slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotHandle, &mut T)> {
        self.storage
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|v| (SlotHandle { index }, v)))
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_reuse() {
        let mut arena: SlotArena<&str> = SlotArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        let c = arena.insert("c");

        assert_eq!(arena.remove(c), Some("c"));
        assert_eq!(arena.remove(a), Some("a"));
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 1);

        assert_eq!(arena.insert("d"), a);
        assert_eq!(arena.insert("e"), c);
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn test_iter_skips_holes() {
        let mut arena = SlotArena::new();
        let handles: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(handles[2]);
        for (_, v) in arena.iter_mut() {
            *v *= 10;
        }
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 10, 30, 40]);
    }
}
