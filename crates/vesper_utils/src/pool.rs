use std::{fmt, iter::FusedIterator, num::NonZeroU32};

/// Default amount of slots in a single pool page.
pub const DEFAULT_PAGE_SIZE: u32 = 64;

/// Size of the page table allocated on first growth.
const INITIAL_PAGE_TABLE_SIZE: usize = 8;

/// Link terminator for the live and free lists.
const NIL: u32 = u32::MAX;

/// Untyped handle for a [`Pool`].
///
/// The index is the slot's ID, stable for the whole lifetime of the allocation. The generation is
/// unique across the pool's lifetime, so a handle to a freed (and possibly reused) slot can be told
/// apart from a live one via [`Pool::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolHandle {
    pub index: u32,
    pub generation: NonZeroU32,
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    generation: Option<NonZeroU32>,
    /// Previous live slot. Unused while the slot is free.
    prev: u32,
    /// Next live slot, or next free slot while the slot is free.
    next: u32,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            value: None,
            generation: None,
            prev: NIL,
            next: NIL,
        }
    }
}

/// Paged slab allocator. Values of type `T` live in fixed-size pages, so their addresses never
/// change while they're allocated, and each of them is addressed by a [`PoolHandle`].
///
/// Live slots are linked into a doubly-linked list in allocation order, which is what [`Pool::iter`]
/// walks. Free slots form a singly-linked free list, and freed slots are always reused before any
/// new page is allocated.
///
/// Note, this implementation isn't panic-proof. There are some conditions that can cause panics:
///  * overflowing the 32-bit index counter
///  * overflowing the 32-bit generation counter (reached after allocating over 4 294 967 294
///    entries total)
///  * improper handle accesses in `get`, `get_mut` or `free` (`try_*` variants exist). Handles are
///    only fully validated with debug assertions enabled, so in release builds a stale handle to
///    a reused slot resolves to the new value.
///
/// ## Example
/// ```
/// # use vesper_utils::Pool;
/// let mut pool: Pool<u32> = Pool::with_page_size(4);
///
/// let a = pool.allocate(10);
/// let (b, value) = pool.allocate_default();
/// *value = 20;
///
/// assert_eq!(*pool.get(a), 10);
/// assert_eq!(pool.iter().map(|(_, v)| *v).collect::<Vec<_>>(), [10, 20]);
///
/// // Freeing drops the value - the handle becomes invalid
/// pool.free(a);
/// assert!(pool.try_get(a).is_none());
/// assert_eq!(*pool.get(b), 20);
/// ```
#[derive(Clone)]
pub struct Pool<T> {
    pages: Vec<Box<[Slot<T>]>>,
    page_size: u32,
    top_generation: NonZeroU32,
    free_head: u32,
    live_head: u32,
    live_tail: u32,
    len: u32,
}

impl<T> Pool<T> {
    /// Creates a new pool with [`DEFAULT_PAGE_SIZE`] slots per page.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a new pool with the specified amount of slots per page.
    ///
    /// This is a sizing hint, not a limit: the pool grows by whole pages on demand.
    ///
    /// ## Panics
    /// Panics if `page_size` is zero.
    pub fn with_page_size(page_size: u32) -> Self {
        assert!(page_size > 0, "pool page size can't be zero");
        Self {
            pages: Vec::new(),
            page_size,
            top_generation: NonZeroU32::MIN,
            free_head: NIL,
            live_head: NIL,
            live_tail: NIL,
            len: 0,
        }
    }

    /// Allocates a new pool entry, fills it with `value`, and returns its handle.
    ///
    /// ## Panics
    ///  * On 32-bit index overflow
    ///  * On 32-bit generation overflow
    pub fn allocate(&mut self, value: T) -> PoolHandle {
        let index = match self.free_head {
            NIL => self.grow(),
            head => {
                self.free_head = self.slot(head).next;
                head
            }
        };

        let generation = self.top_generation;
        self.top_generation = generation
            .checked_add(1)
            .expect("pool generation overflow");

        let tail = self.live_tail;
        let slot = self.slot_mut(index);
        slot.value = Some(value);
        slot.generation = Some(generation);
        slot.prev = tail;
        slot.next = NIL;

        match tail {
            NIL => self.live_head = index,
            tail => self.slot_mut(tail).next = index,
        }
        self.live_tail = index;
        self.len += 1;

        PoolHandle { index, generation }
    }

    /// Allocates a new default-constructed entry, returning its handle and a mutable reference
    /// to it.
    pub fn allocate_default(&mut self) -> (PoolHandle, &mut T)
    where
        T: Default,
    {
        let handle = self.allocate(T::default());
        (handle, self.get_mut(handle))
    }

    /// Deallocates a specified pool entry, dropping the held value.
    ///
    /// ## Panics
    /// Panics if the slot is vacant. With debug assertions, panics on any invalid handle.
    pub fn free(&mut self, handle: PoolHandle) {
        drop(self.take(handle));
    }

    /// Deallocates a specified pool entry and returns the value it held.
    ///
    /// ## Panics
    /// Same conditions as [`Pool::free`].
    pub fn take(&mut self, handle: PoolHandle) -> T {
        debug_assert!(self.is_valid(handle), "freeing an invalid pool handle");

        let free_head = self.free_head;
        let slot = self.slot_mut(handle.index);
        let value = slot.value.take().expect("freeing a vacant pool slot");
        let (prev, next) = (slot.prev, slot.next);
        slot.generation = None;
        slot.prev = NIL;
        slot.next = free_head;
        self.free_head = handle.index;

        match prev {
            NIL => self.live_head = next,
            prev => self.slot_mut(prev).next = next,
        }
        match next {
            NIL => self.live_tail = prev,
            next => self.slot_mut(next).prev = prev,
        }
        self.len -= 1;

        value
    }

    /// Returns an immutable reference to a specified pool entry.
    ///
    /// ## Panics
    /// Panics if the slot is vacant. With debug assertions, panics on any invalid handle.
    pub fn get(&self, handle: PoolHandle) -> &T {
        debug_assert!(self.is_valid(handle), "invalid pool handle access");
        self.slot(handle.index)
            .value
            .as_ref()
            .expect("access to a vacant pool slot")
    }

    /// Returns a mutable reference to a specified pool entry.
    ///
    /// ## Panics
    /// Same conditions as [`Pool::get`].
    pub fn get_mut(&mut self, handle: PoolHandle) -> &mut T {
        debug_assert!(self.is_valid(handle), "invalid pool handle access");
        self.slot_mut(handle.index)
            .value
            .as_mut()
            .expect("access to a vacant pool slot")
    }

    /// Returns an immutable reference to a specified pool entry. If the handle is invalid, [`None`]
    /// is returned.
    pub fn try_get(&self, handle: PoolHandle) -> Option<&T> {
        self.is_valid(handle).then(|| self.get(handle))
    }

    /// Returns a mutable reference to a specified pool entry. If the handle is invalid, [`None`]
    /// is returned.
    pub fn try_get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_valid(handle) {
            Some(self.get_mut(handle))
        } else {
            None
        }
    }

    /// Verifies the validity of the specified handle.
    #[inline]
    pub fn is_valid(&self, handle: PoolHandle) -> bool {
        self.try_slot(handle.index)
            .map(|slot| slot.generation == Some(handle.generation))
            .unwrap_or(false)
    }

    /// Returns the current handle of a live slot with the specified index.
    pub fn handle_at(&self, index: u32) -> Option<PoolHandle> {
        let generation = self.try_slot(index)?.generation?;
        Some(PoolHandle { index, generation })
    }

    /// Amount of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Amount of allocated pages.
    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Amount of slots available without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_size as usize
    }

    /// Handle of the oldest live entry.
    pub fn first(&self) -> Option<PoolHandle> {
        self.handle_at(self.live_head)
    }

    /// Handle of the newest live entry.
    pub fn last(&self) -> Option<PoolHandle> {
        self.handle_at(self.live_tail)
    }

    /// Returns the live entry allocated right after `handle`.
    ///
    /// The handle itself must be live.
    pub fn next_after(&self, handle: PoolHandle) -> Option<PoolHandle> {
        debug_assert!(self.is_valid(handle), "invalid pool cursor");
        self.handle_at(self.slot(handle.index).next)
    }

    /// Returns the live entry allocated right before `handle`.
    ///
    /// The handle itself must be live.
    pub fn prev_before(&self, handle: PoolHandle) -> Option<PoolHandle> {
        debug_assert!(self.is_valid(handle), "invalid pool cursor");
        self.handle_at(self.slot(handle.index).prev)
    }

    /// Iterates over live entries in allocation order. The iterator is double-ended, so `.rev()`
    /// walks them newest-first.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            pool: self,
            front: self.live_head,
            back: self.live_tail,
            remaining: self.len,
        }
    }

    /// Iterates mutably over live entries.
    ///
    /// Unlike [`Pool::iter`], entries are visited in slot order, not allocation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        let page_size = self.page_size;
        self.pages
            .iter_mut()
            .enumerate()
            .flat_map(move |(page_index, page)| {
                page.iter_mut()
                    .enumerate()
                    .filter_map(move |(offset, slot)| {
                        let handle = PoolHandle {
                            index: page_index as u32 * page_size + offset as u32,
                            generation: slot.generation?,
                        };
                        Some((handle, slot.value.as_mut()?))
                    })
            })
    }

    /// Handles of all live entries, in allocation order.
    pub fn handles(&self) -> impl Iterator<Item = PoolHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    /// Drops every live entry and releases all page memory.
    ///
    /// The generation counter is kept, so handles from before the clear stay invalid.
    pub fn clear(&mut self) {
        self.pages = Vec::new();
        self.free_head = NIL;
        self.live_head = NIL;
        self.live_tail = NIL;
        self.len = 0;
    }

    /// Allocates a new page, pushing all but its first slot onto the free list. Returns the index
    /// of that first slot.
    fn grow(&mut self) -> u32 {
        if self.pages.len() == self.pages.capacity() {
            let current = self.pages.len();
            let target = match current {
                0 => INITIAL_PAGE_TABLE_SIZE,
                n => (n + n / 2).max(n + 1),
            };
            self.pages.reserve_exact(target - current);
        }

        let base = (self.pages.len() as u32)
            .checked_mul(self.page_size)
            .filter(|base| base.checked_add(self.page_size).is_some_and(|top| top < NIL))
            .expect("pool index overflow");

        self.pages
            .push((0..self.page_size).map(|_| Slot::vacant()).collect());

        // Reverse order, so that the free list yields the lowest indices first
        for index in (base + 1..base + self.page_size).rev() {
            let free_head = self.free_head;
            self.slot_mut(index).next = free_head;
            self.free_head = index;
        }

        base
    }

    #[inline]
    fn try_slot(&self, index: u32) -> Option<&Slot<T>> {
        self.pages
            .get((index / self.page_size) as usize)?
            .get((index % self.page_size) as usize)
    }

    #[inline]
    fn slot(&self, index: u32) -> &Slot<T> {
        &self.pages[(index / self.page_size) as usize][(index % self.page_size) as usize]
    }

    #[inline]
    fn slot_mut(&mut self, index: u32) -> &mut Slot<T> {
        &mut self.pages[(index / self.page_size) as usize][(index % self.page_size) as usize]
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a Pool<T> {
    type Item = (PoolHandle, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Allocation-order iterator over a [`Pool`]'s live entries.
pub struct Iter<'a, T> {
    pool: &'a Pool<T>,
    front: u32,
    back: u32,
    remaining: u32,
}

impl<'a, T> Iter<'a, T> {
    fn entry(&self, index: u32) -> (PoolHandle, &'a T) {
        let pool: &'a Pool<T> = self.pool;
        let slot = pool.slot(index);
        let handle = PoolHandle {
            index,
            generation: slot.generation.expect("vacant slot in the live list"),
        };
        (handle, slot.value.as_ref().expect("vacant slot in the live list"))
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (PoolHandle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = self.entry(self.front);
        self.front = self.pool.slot(self.front).next;
        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = self.entry(self.back);
        self.back = self.pool.slot(self.back).prev;
        self.remaining -= 1;
        Some(entry)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Record {
        value: u32,
    }

    #[test]
    fn generic_pool_test() {
        const VALUE_A: u32 = 123;
        const VALUE_B: u32 = 456;
        const VALUE_C: u32 = 789;
        const VALUE_D: u32 = 789;

        let mut pool = Pool::new();
        let a = pool.allocate(VALUE_A);
        let b = pool.allocate(VALUE_B);
        let c = pool.allocate(VALUE_C);

        assert_eq!(pool.len(), 3);
        assert_eq!(*pool.get(a), VALUE_A);
        assert_eq!(*pool.get(b), VALUE_B);
        assert_eq!(*pool.get(c), VALUE_C);

        pool.free(b);
        assert!(pool.try_get(b).is_none());

        assert_eq!(pool.len(), 2);
        assert_eq!(*pool.get(a), VALUE_A);
        assert_eq!(*pool.get(c), VALUE_C);

        let d = pool.allocate(VALUE_D);

        assert_eq!(pool.len(), 3);
        assert_eq!(*pool.get(a), VALUE_A);
        assert_eq!(*pool.get(c), VALUE_C);
        assert_eq!(*pool.get(d), VALUE_D);
    }

    #[test]
    fn ids_and_addresses_are_stable() {
        let mut pool: Pool<Record> = Pool::with_page_size(4);
        let first = pool.allocate(Record { value: 1 });
        let address = pool.get(first) as *const Record;

        // Force a few page table growths
        let others: Vec<_> = (0..100).map(|value| pool.allocate(Record { value })).collect();
        for handle in others.iter().step_by(3) {
            pool.free(*handle);
        }

        assert_eq!(pool.handle_at(first.index), Some(first));
        assert_eq!(pool.get(first) as *const Record, address);
        assert_eq!(pool.get(first).value, 1);
    }

    #[test]
    fn round_trip_reuses_slots_before_growing() {
        let mut pool: Pool<Record> = Pool::with_page_size(16);
        let handles: Vec<_> = (0..40).map(|value| pool.allocate(Record { value })).collect();
        let pages = pool.page_count();
        assert_eq!(pages, 3);

        for handle in handles {
            pool.free(handle);
        }
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());

        for value in 0..40 {
            pool.allocate(Record { value });
        }
        assert_eq!(pool.page_count(), pages);
    }

    #[test]
    fn second_page_is_allocated_on_overflow() {
        let mut pool: Pool<Record> = Pool::with_page_size(64);
        let handles: Vec<_> = (0..65).map(|value| pool.allocate(Record { value })).collect();

        assert_eq!(pool.page_count(), 2);
        assert_eq!(pool.len(), 65);
        assert_eq!(pool.capacity(), 128);

        let visited: Vec<_> = pool.iter().map(|(handle, record)| (handle, record.value)).collect();
        let expected: Vec<_> = handles.iter().copied().zip(0..65).collect();
        assert_eq!(visited, expected);

        // IDs follow allocation order on a fresh pool
        assert!(handles.iter().enumerate().all(|(i, h)| h.index == i as u32));
    }

    #[test]
    fn freed_slot_is_reused_with_a_fresh_value() {
        let mut pool: Pool<Record> = Pool::with_page_size(8);
        let handles: Vec<_> = (1..=5)
            .map(|value| {
                let (handle, record) = pool.allocate_default();
                record.value = value;
                handle
            })
            .collect();

        let third = handles[2];
        let address = pool.get(third) as *const Record;
        pool.free(third);

        let (reused, record) = pool.allocate_default();
        assert_eq!(*record, Record::default());
        assert_eq!(reused.index, third.index);
        assert_ne!(reused.generation, third.generation);
        assert_eq!(pool.get(reused) as *const Record, address);
        assert!(!pool.is_valid(third));

        // The reused slot is now the newest entry of the live list
        let order: Vec<_> = pool.handles().map(|h| h.index).collect();
        assert_eq!(order, [0, 1, 3, 4, 2]);
    }

    #[test]
    fn reverse_iteration_and_cursors() {
        let mut pool: Pool<u32> = Pool::with_page_size(2);
        let handles: Vec<_> = (0..5).map(|value| pool.allocate(value)).collect();
        pool.free(handles[0]);
        pool.free(handles[4]);

        let backwards: Vec<_> = pool.iter().rev().map(|(_, v)| *v).collect();
        assert_eq!(backwards, [3, 2, 1]);

        assert_eq!(pool.first(), Some(handles[1]));
        assert_eq!(pool.last(), Some(handles[3]));
        assert_eq!(pool.next_after(handles[1]), Some(handles[2]));
        assert_eq!(pool.prev_before(handles[1]), None);
        assert_eq!(pool.next_after(handles[3]), None);

        let mut iter = pool.iter();
        assert_eq!(iter.next().map(|(_, v)| *v), Some(1));
        assert_eq!(iter.next_back().map(|(_, v)| *v), Some(3));
        assert_eq!(iter.len(), 1);
        assert_eq!(iter.next().map(|(_, v)| *v), Some(2));
        assert!(iter.next().is_none());
        assert!(iter.next_back().is_none());
    }

    #[test]
    fn iter_mut_visits_every_live_entry() {
        let mut pool: Pool<u32> = Pool::with_page_size(3);
        let handles: Vec<_> = (0..7).map(|value| pool.allocate(value)).collect();
        pool.free(handles[5]);

        for (_, value) in pool.iter_mut() {
            *value *= 10;
        }

        let mut values: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        values.sort();
        assert_eq!(values, [0, 10, 20, 30, 40, 60]);
    }

    #[test]
    fn page_table_grows_by_half() {
        let mut pool: Pool<u8> = Pool::with_page_size(1);
        pool.allocate(0);
        assert_eq!(pool.page_count(), 1);
        assert!(pool.pages.capacity() >= INITIAL_PAGE_TABLE_SIZE);

        for value in 1..9 {
            pool.allocate(value);
        }
        assert_eq!(pool.page_count(), 9);
        assert!(pool.pages.capacity() >= 12);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut pool: Pool<Record> = Pool::with_page_size(4);
        let stale = pool.allocate(Record { value: 7 });
        pool.allocate(Record { value: 8 });

        pool.clear();
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.page_count(), 0);
        pool.clear();
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.page_count(), 0);

        // Handles from before the clear never become valid again
        let fresh = pool.allocate(Record { value: 9 });
        assert_eq!(fresh.index, stale.index);
        assert!(!pool.is_valid(stale));
        assert!(pool.try_get(stale).is_none());
    }

    #[test]
    fn take_returns_the_value() {
        let mut pool = Pool::new();
        let handle = pool.allocate(String::from("facet"));
        assert_eq!(pool.take(handle), "facet");
        assert!(pool.is_empty());
        assert!(pool.first().is_none());
    }
}
