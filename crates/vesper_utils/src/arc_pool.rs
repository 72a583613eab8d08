use std::{
    hash::{Hash, Hasher},
    num::NonZeroU32,
    sync::{Arc, Weak},
};

/// Reference counted handle to an element in an [`ArcPool`].
///
/// Clones share the same element. Equality and hashing are by identity, not by index, so a
/// handle never compares equal to a handle of a reallocated element.
#[derive(Debug, Clone)]
pub struct ArcPoolHandle(Arc<u32>);

impl ArcPoolHandle {
    /// Index of the element within its pool.
    pub fn index(&self) -> u32 {
        *self.0
    }

    /// Amount of live clones of this handle.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl PartialEq for ArcPoolHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ArcPoolHandle {}

impl Hash for ArcPoolHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

struct Entry<T> {
    owner: Weak<u32>,
    value: T,
}

/// Atomically reference counted generic pool.
///
/// Similarly to the generic [`crate::Pool`], this allows to store a set of `T` elements, and
/// access them via specific handles. The difference is that handles in `ArcPool` are backed
/// internally by an [`Arc`]. Once the last handle of an element is dropped, the element is dead,
/// and its slot is reclaimed (dropping the value) by [`Self::collect_garbage`], which also runs
/// automatically when an allocation runs out of free slots.
pub struct ArcPool<T> {
    free_indices: Vec<u32>,
    entries: Vec<Option<Entry<T>>>,
    pub growth_size: NonZeroU32,
}

impl<T> ArcPool<T> {
    pub fn with_growth_size(size: u32) -> Self {
        Self {
            free_indices: vec![],
            entries: vec![],
            growth_size: NonZeroU32::new(size).expect("growth size can't be zero"),
        }
    }

    pub fn allocate(&mut self, initial: T) -> ArcPoolHandle {
        if self.free_indices.is_empty() && self.collect_garbage() == 0 {
            // Out of indices, grow the entry vec
            let low_index = self.entries.len() as u32;
            let high_index = low_index
                .checked_add(self.growth_size.get())
                .expect("pool index overflow");
            let growth_range = low_index..high_index;

            // Reverse index range, so that pop gets lowest entries
            self.free_indices.extend(growth_range.clone().rev());
            self.entries.extend(growth_range.map(|_| None));
        }

        let index = self
            .free_indices
            .pop()
            .expect("arc pool free list empty after growth");

        let handle = Arc::new(index);
        self.entries[index as usize] = Some(Entry {
            owner: Arc::downgrade(&handle),
            value: initial,
        });
        ArcPoolHandle(handle)
    }

    /// Returns an immutable reference to an element through its handle.
    ///
    /// ## Panics
    /// Panics if the handle is invalid (points to an invalid index or a dead element, which
    /// may happen when handles from different pools are mixed up)
    pub fn get(&self, handle: &ArcPoolHandle) -> &T {
        &self
            .entries
            .get(handle.index() as usize)
            .expect("invalid index in a live arc pool reference")
            .as_ref()
            .expect("invalid dead value in a live arc pool reference")
            .value
    }

    /// Returns a mutable reference to an element through its handle.
    ///
    /// ## Panics
    /// Same conditions as [`Self::get`].
    pub fn get_mut(&mut self, handle: &ArcPoolHandle) -> &mut T {
        &mut self
            .entries
            .get_mut(handle.index() as usize)
            .expect("invalid index in a live arc pool reference")
            .as_mut()
            .expect("invalid dead value in a live arc pool reference")
            .value
    }

    /// Iterates over elements with at least one live handle.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .flatten()
            .filter(|entry| entry.owner.strong_count() > 0)
            .map(|entry| &entry.value)
    }

    /// Iterates over elements with at least one live handle, together with a new handle clone.
    pub fn iter_handles(&self) -> impl Iterator<Item = (&T, ArcPoolHandle)> {
        self.entries
            .iter()
            .flatten()
            .filter_map(|entry| Some((&entry.value, ArcPoolHandle(entry.owner.upgrade()?))))
    }

    /// Amount of elements with at least one live handle.
    pub fn count_live(&self) -> usize {
        self.iter().count()
    }

    /// Amount of occupied slots, including dead elements that weren't collected yet.
    pub fn count_occupied(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Drops any values without live references, freeing up their indices.
    ///
    /// Returns the amount of freed entries.
    pub fn collect_garbage(&mut self) -> u32 {
        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if slot
                .as_ref()
                .is_some_and(|entry| entry.owner.strong_count() == 0)
            {
                *slot = None;
                self.free_indices.push(index as u32);
                freed += 1;
            }
        }
        freed
    }

    /// Drops every element, live or not. Outstanding handles must not be used afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free_indices.clear();
    }
}
