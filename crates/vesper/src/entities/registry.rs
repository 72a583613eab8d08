use super::{
    components::Transform, DirtyFlags, DirtyState, Entity, EntityCategory, EntityFilter,
    EntityKind, FacetCategory, FacetRef, Lifecycle,
};
use vesper_utils::Pool;

/// A single entity slot.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    kind: EntityKind,
    pub label: Option<String>,
    pub(in crate::entities) transform: Transform,
    pub(in crate::entities) dirty: DirtyState,
    pub(in crate::entities) facets: [Option<FacetRef>; FacetCategory::COUNT],
}

impl EntityRecord {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            label: None,
            transform: Transform::default(),
            dirty: DirtyState::pending_create(),
            facets: [None; FacetCategory::COUNT],
        }
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[inline]
    pub fn category(&self) -> EntityCategory {
        self.kind.category()
    }

    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Flags accumulated since the last dispatch.
    #[inline]
    pub fn pending_flags(&self) -> DirtyFlags {
        self.dirty.pending()
    }

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.dirty.lifecycle()
    }

    #[inline]
    pub fn detail_facet(&self, category: FacetCategory) -> Option<FacetRef> {
        self.facets[category.slot()]
    }

    /// Iterates over occupied facet slots.
    pub fn facets(&self) -> impl Iterator<Item = (FacetCategory, FacetRef)> + '_ {
        FacetCategory::ALL
            .into_iter()
            .filter_map(|category| Some((category, self.facets[category.slot()]?)))
    }

    /// Label used in logs, falling back to the kind name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(self.kind.name())
    }
}

/// Pooled set of entity records.
///
/// Entities are visited in allocation order, which is also the order of the category cursor.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Pool<EntityRecord>,
}

impl EntityRegistry {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            entities: Pool::with_page_size(page_size),
        }
    }

    /// Allocates a new record. Its `CREATE` is left pending.
    pub fn create(&mut self, kind: EntityKind) -> Entity {
        self.entities.allocate(EntityRecord::new(kind)).into()
    }

    /// Frees the record, returning it if the handle was live.
    pub fn remove(&mut self, entity: Entity) -> Option<EntityRecord> {
        self.is_alive(entity)
            .then(|| self.entities.take(entity.handle()))
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity.handle())
    }

    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&EntityRecord> {
        self.entities.try_get(entity.handle())
    }

    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        self.entities.try_get_mut(entity.handle())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Entity, &EntityRecord)> {
        self.entities
            .iter()
            .map(|(handle, record)| (handle.into(), record))
    }

    pub fn iter_filtered(
        &self,
        filter: EntityFilter,
    ) -> impl Iterator<Item = (Entity, &EntityRecord)> {
        self.iter()
            .filter(move |(_, record)| filter.matches(record.kind()))
    }

    /// Returns the first entity matching `filter`, allocated after `after`. Passing [`None`]
    /// starts from the oldest entity.
    ///
    /// A stale cursor yields [`None`].
    pub fn next_in_category(&self, after: Option<Entity>, filter: EntityFilter) -> Option<Entity> {
        let mut cursor = match after {
            Some(entity) if self.is_alive(entity) => self.entities.next_after(entity.handle()),
            Some(_) => return None,
            None => self.entities.first(),
        };

        while let Some(handle) = cursor {
            if filter.matches(self.entities.get(handle).kind()) {
                return Some(handle.into());
            }
            cursor = self.entities.next_after(handle);
        }
        None
    }

    /// Handles of all entities, in allocation order.
    pub fn handles(&self) -> Vec<Entity> {
        self.entities.handles().map(Entity::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ActorType, CameraType, LightType};

    #[test]
    fn cursor_walks_a_category_in_allocation_order() {
        let mut registry = EntityRegistry::with_page_size(4);
        let camera = registry.create(EntityKind::Camera(CameraType::Perspective));
        let sun = registry.create(EntityKind::Light(LightType::Sun));
        let actor = registry.create(EntityKind::Actor(ActorType::Mesh));
        let point = registry.create(EntityKind::Light(LightType::Point));

        let lights = EntityFilter::Category(EntityCategory::Light);
        assert_eq!(registry.next_in_category(None, lights), Some(sun));
        assert_eq!(registry.next_in_category(Some(sun), lights), Some(point));
        assert_eq!(registry.next_in_category(Some(point), lights), None);
        assert_eq!(
            registry.next_in_category(Some(camera), EntityFilter::Category(EntityCategory::Actor)),
            Some(actor)
        );
    }

    #[test]
    fn stale_cursor_yields_nothing() {
        let mut registry = EntityRegistry::default();
        let first = registry.create(EntityKind::Light(LightType::Point));
        registry.create(EntityKind::Light(LightType::Point));
        assert!(registry.remove(first).is_some());

        assert!(registry.remove(first).is_none());
        assert_eq!(registry.next_in_category(Some(first), EntityFilter::All), None);
    }

    #[test]
    fn new_records_are_fresh_with_create_pending() {
        let mut registry = EntityRegistry::default();
        let entity = registry.create(EntityKind::Light(LightType::Area));
        let record = registry.get(entity).unwrap();

        assert_eq!(record.lifecycle(), Lifecycle::Fresh);
        assert_eq!(record.pending_flags(), DirtyFlags::CREATE);
        assert_eq!(record.facets().count(), 0);
        assert_eq!(record.display_name(), "area light");
    }
}
