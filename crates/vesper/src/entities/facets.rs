use super::{Component, DirtyState, Entity};
use ahash::AHashMap;
use std::any::{self, Any, TypeId};
use vesper_utils::{Pool, PoolHandle, DEFAULT_PAGE_SIZE};

/// A component stored in the [`FacetStore`], together with its owner and dirty state.
#[derive(Debug, Clone)]
pub struct StoredComponent<T> {
    pub owner: Option<Entity>,
    pub(in crate::entities) dirty: DirtyState,
    pub value: T,
}

impl<T> StoredComponent<T> {
    #[inline]
    pub fn dirty(&self) -> &DirtyState {
        &self.dirty
    }
}

type ComponentPoolImpl<T> = Pool<StoredComponent<T>>;

/// Type-erased interface of a single component pool.
trait ComponentPool: Any {
    fn type_name(&self) -> &'static str;
    fn owner_of(&self, handle: PoolHandle) -> Option<Option<Entity>>;
    fn remove_erased(&mut self, handle: PoolHandle) -> bool;
    fn live_count(&self) -> usize;
    fn clear(&mut self);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ComponentPool for ComponentPoolImpl<T> {
    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn owner_of(&self, handle: PoolHandle) -> Option<Option<Entity>> {
        self.try_get(handle).map(|stored| stored.owner)
    }

    fn remove_erased(&mut self, handle: PoolHandle) -> bool {
        let valid = self.is_valid(handle);
        if valid {
            self.free(handle);
        }
        valid
    }

    fn live_count(&self) -> usize {
        self.len()
    }

    fn clear(&mut self) {
        Pool::clear(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-type pools of components, each addressable by a stable [`PoolHandle`].
///
/// Components are either attached to an entity's facet slot or standalone. Either way they keep
/// their owner, if any, so they can be traced back to an entity.
pub struct FacetStore {
    pools: AHashMap<TypeId, Box<dyn ComponentPool>>,
    page_size: u32,
}

impl Default for FacetStore {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl FacetStore {
    /// Creates an empty store. `page_size` is used for every pool created on demand.
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            pools: AHashMap::default(),
            page_size,
        }
    }

    fn pool<T: Component>(&self) -> Option<&ComponentPoolImpl<T>> {
        self.pools.get(&TypeId::of::<T>()).map(|pool| {
            pool.as_any()
                .downcast_ref()
                .expect("invalid internal facet store type mapping")
        })
    }

    fn pool_mut<T: Component>(&mut self) -> &mut ComponentPoolImpl<T> {
        let page_size = self.page_size;
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentPoolImpl::<T>::with_page_size(page_size)))
            .as_any_mut()
            .downcast_mut()
            .expect("invalid internal facet store type mapping")
    }

    /// Stores a new component with its `CREATE` pending.
    pub fn insert<T: Component>(&mut self, owner: Option<Entity>, value: T) -> PoolHandle {
        self.pool_mut::<T>().allocate(StoredComponent {
            owner,
            dirty: DirtyState::pending_create(),
            value,
        })
    }

    pub fn contains<T: Component>(&self, handle: PoolHandle) -> bool {
        self.pool::<T>()
            .is_some_and(|pool| pool.is_valid(handle))
    }

    pub fn get<T: Component>(&self, handle: PoolHandle) -> Option<&T> {
        self.stored::<T>(handle).map(|stored| &stored.value)
    }

    pub fn get_mut<T: Component>(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.stored_mut::<T>(handle).map(|stored| &mut stored.value)
    }

    pub fn stored<T: Component>(&self, handle: PoolHandle) -> Option<&StoredComponent<T>> {
        self.pool::<T>()?.try_get(handle)
    }

    pub(in crate::entities) fn stored_mut<T: Component>(
        &mut self,
        handle: PoolHandle,
    ) -> Option<&mut StoredComponent<T>> {
        self.pools.get(&TypeId::of::<T>())?;
        self.pool_mut::<T>().try_get_mut(handle)
    }

    /// Removes a component, returning its value if the handle was live.
    pub fn remove<T: Component>(&mut self, handle: PoolHandle) -> Option<T> {
        let pool = self.pool_mut::<T>();
        pool.is_valid(handle)
            .then(|| pool.take(handle).value)
    }

    /// Removes a component of a type only known at runtime.
    ///
    /// Returns `false` if the type isn't stored here, or the handle isn't live.
    pub fn remove_erased(&mut self, type_id: TypeId, handle: PoolHandle) -> bool {
        self.pools
            .get_mut(&type_id)
            .is_some_and(|pool| pool.remove_erased(handle))
    }

    /// Returns the owner of a component of a type only known at runtime. The outer option is
    /// [`None`] if the component doesn't exist.
    pub fn owner_erased(&self, type_id: TypeId, handle: PoolHandle) -> Option<Option<Entity>> {
        self.pools.get(&type_id)?.owner_of(handle)
    }

    /// Iterates over all live components of type `T`, in allocation order.
    pub fn iter<T: Component>(
        &self,
    ) -> impl Iterator<Item = (PoolHandle, &StoredComponent<T>)> {
        self.pool::<T>().into_iter().flat_map(|pool| pool.iter())
    }

    pub fn len<T: Component>(&self) -> usize {
        self.pool::<T>().map_or(0, |pool| pool.len())
    }

    /// Amount of live components across all types.
    pub fn total_len(&self) -> usize {
        self.pools.values().map(|pool| pool.live_count()).sum()
    }

    /// Names of the stored types and their live counts, for debug output.
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut summary: Vec<_> = self
            .pools
            .values()
            .map(|pool| (pool.type_name(), pool.live_count()))
            .collect();
        summary.sort_unstable();
        summary
    }

    pub fn clear(&mut self) {
        for pool in self.pools.values_mut() {
            pool.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, PartialEq)]
    struct Name(&'static str);
    impl Component for Name {}

    #[test]
    fn components_are_stored_per_type() {
        let mut store = FacetStore::with_page_size(2);
        let health = store.insert(None, Health(100));
        let name = store.insert(None, Name("crate"));

        assert_eq!(store.get::<Health>(health), Some(&Health(100)));
        assert_eq!(store.get::<Name>(name), Some(&Name("crate")));
        assert_eq!(store.total_len(), 2);

        store.get_mut::<Health>(health).unwrap().0 -= 40;
        assert_eq!(store.remove::<Health>(health), Some(Health(60)));
        assert!(!store.contains::<Health>(health));
        assert_eq!(store.remove::<Health>(health), None);
    }

    #[test]
    fn erased_removal_checks_type_and_generation() {
        let mut store = FacetStore::default();
        let owner = Entity {
            index: 0,
            generation: NonZeroU32::MIN,
        };
        let health = store.insert(Some(owner), Health(1));

        assert_eq!(
            store.owner_erased(TypeId::of::<Health>(), health),
            Some(Some(owner))
        );
        assert!(!store.remove_erased(TypeId::of::<Name>(), health));
        assert!(store.remove_erased(TypeId::of::<Health>(), health));
        assert!(!store.remove_erased(TypeId::of::<Health>(), health));
        assert_eq!(store.owner_erased(TypeId::of::<Health>(), health), None);
    }

    #[test]
    fn missing_pools_read_as_empty() {
        let store = FacetStore::default();
        assert_eq!(store.len::<Health>(), 0);
        assert_eq!(store.iter::<Health>().count(), 0);
        assert!(store.summary().is_empty());
    }
}
