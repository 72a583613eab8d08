use super::{
    components::Transform,
    handlers::{HandlerRegistry, Postponed},
    Component, ComponentRef, DirtyEvent, DirtyFlags, Entity, EntityFilter, EntityKind,
    EntityRecord, EntityRegistry, FacetCategory, FacetRef, FacetStore, HandlerId, Lifecycle,
    SharedHandler,
};
use anyhow::Context;
use log::*;
use smallvec::SmallVec;
use std::{any, collections::VecDeque};
use thiserror::Error;
use vesper_utils::{ok, AnyResult, PoolHandle, DEFAULT_PAGE_SIZE};

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("{0} is stale or was destroyed")]
    StaleEntity(Entity),
    #[error("{type_name} component {handle} is stale or was removed")]
    StaleComponent {
        type_name: &'static str,
        handle: PoolHandle,
    },
}

/// The entity registry, the facet store and the dirty handler fan-out, in one place.
///
/// There's no global universe. Whoever owns it passes it explicitly to whatever needs it, and
/// handlers receive it as an argument for the duration of a dispatch.
pub struct Universe {
    entities: EntityRegistry,
    facets: FacetStore,
    handlers: HandlerRegistry,
    frame: u64,
    /// Entities with a dispatch in flight, innermost last.
    dispatching: SmallVec<[Entity; 4]>,
    /// Events for handlers that were busy when the events were raised, oldest first.
    postponed: VecDeque<Postponed>,
    /// Destroyed entities whose records are kept until their postponed `DESTROY`s are delivered.
    doomed: SmallVec<[Entity; 4]>,
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl Universe {
    pub fn new() -> Self {
        Self::with_page_sizes(DEFAULT_PAGE_SIZE, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_sizes(entity_page_size: u32, component_page_size: u32) -> Self {
        Self {
            entities: EntityRegistry::with_page_size(entity_page_size),
            facets: FacetStore::with_page_size(component_page_size),
            handlers: HandlerRegistry::default(),
            frame: 0,
            dispatching: SmallVec::new(),
            postponed: VecDeque::new(),
            doomed: SmallVec::new(),
        }
    }

    #[inline]
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    #[inline]
    pub fn facets(&self) -> &FacetStore {
        &self.facets
    }

    /// Direct store access. Changes made through it aren't announced to anyone.
    #[inline]
    pub fn facets_mut(&mut self) -> &mut FacetStore {
        &mut self.facets
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Bumps the frame counter used to time stamp facet updates.
    pub fn advance_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    #[inline]
    pub fn entity(&self, entity: Entity) -> Option<&EntityRecord> {
        self.entities.get(entity)
    }

    /// Whether the entity exists and wasn't destroyed. Handlers with a postponed `DESTROY` still
    /// see the record of a destroyed entity through [`Universe::entity`].
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|record| record.lifecycle() != Lifecycle::Destroyed)
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn iter_entities(&self) -> impl Iterator<Item = (Entity, &EntityRecord)> {
        self.entities.iter()
    }

    pub fn iter_filtered(
        &self,
        filter: EntityFilter,
    ) -> impl Iterator<Item = (Entity, &EntityRecord)> {
        self.entities.iter_filtered(filter)
    }

    /// See [`EntityRegistry::next_in_category`].
    pub fn next_in_category(&self, after: Option<Entity>, filter: EntityFilter) -> Option<Entity> {
        self.entities.next_in_category(after, filter)
    }

    fn record_mut(&mut self, entity: Entity) -> Result<&mut EntityRecord, UniverseError> {
        self.entities
            .get_mut(entity)
            .ok_or(UniverseError::StaleEntity(entity))
    }

    /// Allocates a new entity. Nothing is announced until the first
    /// [`Universe::mark_entity_as_dirty`], which delivers the pending `CREATE`.
    pub fn create_entity(&mut self, kind: EntityKind) -> Entity {
        let entity = self.entities.create(kind);
        trace!("created {kind} {entity}");
        entity
    }

    pub fn set_label(&mut self, entity: Entity, label: impl Into<String>) -> Result<(), UniverseError> {
        self.record_mut(entity)?.label = Some(label.into());
        Ok(())
    }

    /// Announces `DESTROY` to every handler, then frees the entity and every store-owned facet
    /// attached to it.
    ///
    /// If a handler was busy during the dispatch, the record stays readable until the handler
    /// got its postponed `DESTROY`, but the entity counts as dead right away.
    pub fn destroy_entity(&mut self, entity: Entity) -> AnyResult {
        if !self.is_alive(entity) {
            return Err(UniverseError::StaleEntity(entity).into());
        }

        self.dispatch_entity(entity, DirtyFlags::DESTROY)?;

        match self.entities.get_mut(entity) {
            Some(record) if record.lifecycle() != Lifecycle::Destroyed => {
                record.dirty.finish(DirtyFlags::DESTROY)
            }
            // A nested handler might've already finished the job
            _ => return ok(),
        }

        if self.awaits_delivery(entity) {
            trace!("{entity} waits for postponed deliveries");
            self.doomed.push(entity);
        } else {
            self.free_entity(entity);
        }
        ok()
    }

    fn free_entity(&mut self, entity: Entity) {
        let Some(record) = self.entities.remove(entity) else {
            return;
        };
        for (category, facet) in record.facets() {
            if category != FacetCategory::Graphic {
                self.facets.remove_erased(facet.type_id(), facet.handle());
            }
        }
        debug!("destroyed {} ({entity})", record.display_name());
    }

    fn awaits_delivery(&self, entity: Entity) -> bool {
        self.postponed
            .iter()
            .any(|postponed| matches!(postponed.event, DirtyEvent::Entity(e, _) if e == entity))
    }

    fn free_doomed(&mut self) {
        let mut index = 0;
        while index < self.doomed.len() {
            let entity = self.doomed[index];
            if self.awaits_delivery(entity) {
                index += 1;
            } else {
                self.doomed.swap_remove(index);
                self.free_entity(entity);
            }
        }
    }

    /// Destroys every entity, oldest first.
    pub fn destroy_all(&mut self) -> AnyResult {
        for entity in self.entities.handles() {
            if self.is_alive(entity) {
                self.destroy_entity(entity)?;
            }
        }
        ok()
    }

    pub fn transform(&self, entity: Entity) -> Option<&Transform> {
        self.entities.get(entity).map(|record| &record.transform)
    }

    /// Replaces the transform without announcing it.
    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> Result<(), UniverseError> {
        self.record_mut(entity)?.transform = transform;
        Ok(())
    }

    /// Replaces the transform and marks the entity `MOVE`.
    pub fn move_entity(&mut self, entity: Entity, transform: Transform) -> AnyResult {
        self.set_transform(entity, transform)?;
        self.mark_entity_as_dirty(entity, DirtyFlags::MOVE)
    }

    /// ORs `flags` into the entity's pending mask and delivers the whole mask to every
    /// registered handler, in registration order, before returning.
    ///
    /// An already delivered `CREATE` is dropped, and passing `DESTROY` destroys the entity. The
    /// pending mask is cleared once every handler ran. A failing handler aborts the dispatch and
    /// leaves the mask pending.
    ///
    /// Handlers busy further up the call stack (the mark comes from inside their own callback)
    /// get the event as soon as that callback returns.
    ///
    /// ## Panics
    /// With debug assertions, panics if the entity is marked again by one of its own handlers.
    pub fn mark_entity_as_dirty(&mut self, entity: Entity, flags: DirtyFlags) -> AnyResult {
        if flags.contains(DirtyFlags::DESTROY) {
            return self.destroy_entity(entity);
        }
        if !self.is_alive(entity) {
            return Err(UniverseError::StaleEntity(entity).into());
        }

        let delivered = self.record_mut(entity)?.dirty.accumulate(flags);
        if delivered.is_empty() {
            return ok();
        }

        self.dispatch_entity(entity, delivered)?;

        if let Some(record) = self.entities.get_mut(entity) {
            record.dirty.finish(delivered);
        }
        ok()
    }

    pub fn is_dispatching(&self, entity: Entity) -> bool {
        self.dispatching.contains(&entity)
    }

    fn dispatch_entity(&mut self, entity: Entity, flags: DirtyFlags) -> AnyResult {
        debug_assert!(
            !self.is_dispatching(entity),
            "{entity} was marked dirty while its own dispatch was in flight"
        );
        trace!("dispatching {flags:?} for {entity}");

        self.dispatching.push(entity);
        let result = self.for_each_handler(DirtyEvent::Entity(entity, flags));
        self.dispatching.pop();
        result.with_context(|| format!("couldn't dispatch {flags:?} for {entity}"))
    }

    /// Delivers `event` to every handler registered when the dispatch started, skipping those
    /// unregistered since.
    ///
    /// A handler is never re-entered. If it's busy, because the dispatch is nested inside one of
    /// its own callbacks, the event is postponed until that callback returns.
    fn for_each_handler(&mut self, event: DirtyEvent) -> AnyResult {
        for (id, label, handler) in self.handlers.snapshot() {
            if !self.handlers.is_registered(id) {
                continue;
            }
            let Ok(mut borrowed) = handler.try_borrow_mut() else {
                trace!("`{label}` is busy, postponing {event:?}");
                self.postponed.push_back(Postponed {
                    id,
                    label,
                    handler: handler.clone(),
                    event,
                });
                continue;
            };
            let result = event.deliver(&mut *borrowed, self);
            drop(borrowed);
            result.with_context(|| format!("`{label}` failed"))?;

            if !self.postponed.is_empty() {
                self.deliver_postponed()?;
            }
        }
        ok()
    }

    /// Delivers postponed events to every handler that isn't busy anymore, keeping the order
    /// each handler would've seen them in.
    fn deliver_postponed(&mut self) -> AnyResult {
        let mut index = 0;
        while index < self.postponed.len() {
            if self.postponed[index].handler.try_borrow_mut().is_err() {
                index += 1;
                continue;
            }
            let Some(Postponed {
                id,
                label,
                handler,
                event,
            }) = self.postponed.remove(index)
            else {
                break;
            };
            if !self.handlers.is_registered(id) || !self.is_current(event) {
                continue;
            }

            trace!("delivering postponed {event:?} to `{label}`");
            let result = event.deliver(&mut *handler.borrow_mut(), self);
            result.with_context(|| format!("`{label}` failed (postponed {event:?})"))?;
        }
        self.free_doomed();
        ok()
    }

    /// Whether a postponed event still refers to something handlers can look at.
    fn is_current(&self, event: DirtyEvent) -> bool {
        let destroy = event.flags().contains(DirtyFlags::DESTROY);
        match event {
            DirtyEvent::Entity(entity, _) => self
                .entities
                .get(entity)
                .is_some_and(|record| destroy || record.lifecycle() != Lifecycle::Destroyed),
            DirtyEvent::Component(component, _) => {
                destroy
                    || self
                        .facets
                        .owner_erased(component.facet.type_id(), component.facet.handle())
                        .is_some()
            }
        }
    }

    /// Registers a handler at the end of the dispatch order. Dispatches already in flight
    /// don't see it.
    pub fn register_dirty_handler(&mut self, label: &'static str, handler: SharedHandler) -> HandlerId {
        let id = self.handlers.register(label, handler);
        debug!("registered dirty handler `{label}` ({id})");
        id
    }

    /// Unregisters a handler. Returns `false` if it wasn't registered.
    ///
    /// Safe to call from within a dispatch, including from the handler itself.
    pub fn unregister_dirty_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.unregister(id)
    }

    pub fn is_handler_registered(&self, id: HandlerId) -> bool {
        self.handlers.is_registered(id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn handler_labels(&self) -> Vec<&'static str> {
        self.handlers.labels().collect()
    }

    pub fn get_detail_facet(&self, entity: Entity, category: FacetCategory) -> Option<FacetRef> {
        self.entities.get(entity)?.detail_facet(category)
    }

    /// Points a facet slot at `facet`, returning the previous reference. Nothing is freed.
    pub fn set_detail_facet(
        &mut self,
        entity: Entity,
        category: FacetCategory,
        facet: Option<FacetRef>,
    ) -> Result<Option<FacetRef>, UniverseError> {
        let slot = &mut self.record_mut(entity)?.facets[category.slot()];
        Ok(std::mem::replace(slot, facet))
    }

    /// Stores `value` and attaches it to one of the entity's slots. A store-owned facet
    /// previously attached there is freed. Nothing is announced.
    pub fn attach_facet<T: Component>(
        &mut self,
        entity: Entity,
        category: FacetCategory,
        value: T,
    ) -> Result<PoolHandle, UniverseError> {
        if !self.is_alive(entity) {
            return Err(UniverseError::StaleEntity(entity));
        }

        let handle = self.facets.insert(Some(entity), value);
        if let Some(previous) =
            self.set_detail_facet(entity, category, Some(FacetRef::of::<T>(handle)))?
        {
            self.facets.remove_erased(previous.type_id(), previous.handle());
        }
        Ok(handle)
    }

    pub fn add_data_facet<T: Component>(&mut self, entity: Entity, value: T) -> Result<PoolHandle, UniverseError> {
        self.attach_facet(entity, FacetCategory::Data, value)
    }

    /// Returns the facet in the given slot, if it's a store-owned `T`.
    pub fn facet<T: Component>(&self, entity: Entity, category: FacetCategory) -> Option<&T> {
        let handle = self.get_detail_facet(entity, category)?.typed::<T>()?;
        self.facets.get(handle)
    }

    pub fn facet_mut<T: Component>(&mut self, entity: Entity, category: FacetCategory) -> Option<&mut T> {
        let handle = self.get_detail_facet(entity, category)?.typed::<T>()?;
        self.facets.get_mut(handle)
    }

    #[inline]
    pub fn data_facet<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.facet(entity, FacetCategory::Data)
    }

    #[inline]
    pub fn data_facet_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.facet_mut(entity, FacetCategory::Data)
    }

    /// Stores a component outside of any facet slot. Its `CREATE` is delivered on the first
    /// [`Universe::mark_component_as_dirty`].
    pub fn add_component<T: Component>(&mut self, owner: Option<Entity>, value: T) -> PoolHandle {
        self.facets.insert(owner, value)
    }

    pub fn component<T: Component>(&self, handle: PoolHandle) -> Option<&T> {
        self.facets.get(handle)
    }

    pub fn component_mut<T: Component>(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.facets.get_mut(handle)
    }

    fn stale_component<T>(handle: PoolHandle) -> UniverseError {
        UniverseError::StaleComponent {
            type_name: any::type_name::<T>(),
            handle,
        }
    }

    /// Component counterpart of [`Universe::mark_entity_as_dirty`].
    pub fn mark_component_as_dirty<T: Component>(
        &mut self,
        handle: PoolHandle,
        flags: DirtyFlags,
    ) -> AnyResult {
        if flags.contains(DirtyFlags::DESTROY) {
            return self.remove_component::<T>(handle).map(drop);
        }

        let stored = self
            .facets
            .stored_mut::<T>(handle)
            .ok_or_else(|| Self::stale_component::<T>(handle))?;
        let delivered = stored.dirty.accumulate(flags);
        if delivered.is_empty() {
            return ok();
        }
        let component = ComponentRef {
            facet: FacetRef::of::<T>(handle),
            owner: stored.owner,
        };

        self.dispatch_component(component, delivered)?;

        if let Some(stored) = self.facets.stored_mut::<T>(handle) {
            stored.dirty.finish(delivered);
        }
        ok()
    }

    /// Announces `DESTROY` for the component, then removes it from the store and from its
    /// owner's facet slot.
    pub fn remove_component<T: Component>(&mut self, handle: PoolHandle) -> AnyResult<T> {
        let owner = self
            .facets
            .stored::<T>(handle)
            .ok_or_else(|| Self::stale_component::<T>(handle))?
            .owner;
        let facet = FacetRef::of::<T>(handle);

        self.dispatch_component(ComponentRef { facet, owner }, DirtyFlags::DESTROY)?;

        if let Some(record) = owner.and_then(|owner| self.entities.get_mut(owner)) {
            for slot in record.facets.iter_mut() {
                if *slot == Some(facet) {
                    *slot = None;
                }
            }
        }
        let value = self
            .facets
            .remove::<T>(handle)
            .ok_or_else(|| Self::stale_component::<T>(handle))?;
        Ok(value)
    }

    fn dispatch_component(&mut self, component: ComponentRef, flags: DirtyFlags) -> AnyResult {
        trace!("dispatching {flags:?} for {:?}", component.facet);
        self.for_each_handler(DirtyEvent::Component(component, flags))
            .with_context(|| {
                format!(
                    "couldn't dispatch {flags:?} for {} component {}",
                    component.facet.type_name(),
                    component.facet.handle()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        handler_fn, ActorType, CameraType, DirtyHandler, EntityBuilder, EntityCategory,
        LightType,
    };
    use std::{cell::RefCell, rc::Rc};

    type Log = Rc<RefCell<Vec<(&'static str, Entity, DirtyFlags)>>>;

    fn recorder(universe: &mut Universe, name: &'static str, log: &Log) -> HandlerId {
        let log = log.clone();
        universe.register_dirty_handler(
            name,
            handler_fn(move |_, entity, flags| {
                log.borrow_mut().push((name, entity, flags));
                ok()
            }),
        )
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Fuel(f32);
    impl Component for Fuel {}

    #[test]
    fn handlers_run_in_registration_order_inline() {
        let mut universe = Universe::new();
        let log = Log::default();
        recorder(&mut universe, "first", &log);
        recorder(&mut universe, "second", &log);

        let entity = universe.create_entity(EntityKind::Light(LightType::Point));
        assert!(log.borrow().is_empty());

        universe.mark_entity_as_dirty(entity, DirtyFlags::MOVE).unwrap();
        let expected = DirtyFlags::CREATE | DirtyFlags::MOVE;
        assert_eq!(
            *log.borrow(),
            [("first", entity, expected), ("second", entity, expected)]
        );
        assert_eq!(universe.entity(entity).unwrap().pending_flags(), DirtyFlags::empty());
        assert_eq!(universe.entity(entity).unwrap().lifecycle(), Lifecycle::Live);
    }

    #[test]
    fn repeated_create_is_not_delivered() {
        let mut universe = Universe::new();
        let log = Log::default();
        recorder(&mut universe, "only", &log);

        let entity = universe.create_entity(EntityKind::Actor(ActorType::Mesh));
        universe.mark_entity_as_dirty(entity, DirtyFlags::CREATE).unwrap();
        universe.mark_entity_as_dirty(entity, DirtyFlags::CREATE).unwrap();
        universe
            .mark_entity_as_dirty(entity, DirtyFlags::CREATE | DirtyFlags::DETAIL)
            .unwrap();

        let delivered: Vec<_> = log.borrow().iter().map(|&(_, _, flags)| flags).collect();
        assert_eq!(delivered, [DirtyFlags::CREATE, DirtyFlags::DETAIL]);
    }

    #[test]
    fn destroy_reaches_handlers_and_frees_store_facets() {
        let mut universe = Universe::new();
        let log = Log::default();
        recorder(&mut universe, "only", &log);

        let entity = EntityBuilder::new(&mut universe, EntityKind::Light(LightType::Sun))
            .with_data(Fuel(3.0))
            .finish()
            .unwrap();
        let data = universe.get_detail_facet(entity, FacetCategory::Data).unwrap();
        assert!(universe.facets().contains::<Fuel>(data.handle()));

        universe.destroy_entity(entity).unwrap();
        assert_eq!(log.borrow().last(), Some(&("only", entity, DirtyFlags::DESTROY)));
        assert!(!universe.is_alive(entity));
        assert!(!universe.facets().contains::<Fuel>(data.handle()));
        assert_eq!(universe.data_facet::<Fuel>(entity), None);

        assert!(universe.destroy_entity(entity).is_err());
        assert!(universe.mark_entity_as_dirty(entity, DirtyFlags::MOVE).is_err());
    }

    #[test]
    fn handlers_can_unregister_during_dispatch() {
        let mut universe = Universe::new();
        let log = Log::default();
        let victim: Rc<RefCell<Option<HandlerId>>> = Rc::default();

        let victim_id = victim.clone();
        universe.register_dirty_handler(
            "unregisterer",
            handler_fn(move |universe, _, _| {
                if let Some(id) = victim_id.borrow_mut().take() {
                    assert!(universe.unregister_dirty_handler(id));
                }
                ok()
            }),
        );
        *victim.borrow_mut() = Some(recorder(&mut universe, "victim", &log));
        recorder(&mut universe, "survivor", &log);

        let entity = universe.create_entity(EntityKind::Light(LightType::Area));
        universe.mark_entity_as_dirty(entity, DirtyFlags::CREATE).unwrap();

        assert_eq!(*log.borrow(), [("survivor", entity, DirtyFlags::CREATE)]);
        assert_eq!(universe.handler_labels(), ["unregisterer", "survivor"]);
    }

    #[test]
    fn handlers_can_mark_other_entities() {
        let mut universe = Universe::new();
        let log = Log::default();
        let follower = universe.create_entity(EntityKind::Light(LightType::Point));

        universe.register_dirty_handler(
            "leader",
            handler_fn(move |universe, entity, flags| {
                if entity != follower && flags.contains(DirtyFlags::MOVE) {
                    universe.mark_entity_as_dirty(follower, DirtyFlags::MOVE)?;
                }
                ok()
            }),
        );
        recorder(&mut universe, "observer", &log);

        let leader = universe.create_entity(EntityKind::Actor(ActorType::Skinned));
        universe.mark_entity_as_dirty(leader, DirtyFlags::MOVE).unwrap();

        // The nested dispatch for the follower completes before the outer one continues
        let order: Vec<_> = log.borrow().iter().map(|&(_, entity, _)| entity).collect();
        assert_eq!(order, [follower, leader]);
        assert_eq!(universe.entity(follower).unwrap().lifecycle(), Lifecycle::Live);
    }

    #[test]
    fn spawners_see_their_children_after_returning() {
        let mut universe = Universe::new();
        let log = Log::default();
        let seen: Rc<RefCell<Vec<(Entity, DirtyFlags)>>> = Rc::default();

        let spawner_seen = seen.clone();
        universe.register_dirty_handler(
            "spawner",
            handler_fn(move |universe, entity, flags| {
                spawner_seen.borrow_mut().push((entity, flags));
                let parent = universe
                    .entity(entity)
                    .is_some_and(|record| record.kind() == EntityKind::Actor(ActorType::Mesh));
                if parent && flags.contains(DirtyFlags::CREATE) {
                    let child = universe.create_entity(EntityKind::Light(LightType::Point));
                    universe.mark_entity_as_dirty(child, DirtyFlags::CREATE)?;
                    universe.mark_entity_as_dirty(child, DirtyFlags::MOVE)?;
                    assert_eq!(spawner_seen.borrow().len(), 1);
                }
                ok()
            }),
        );
        recorder(&mut universe, "observer", &log);

        let parent = universe.create_entity(EntityKind::Actor(ActorType::Mesh));
        universe.mark_entity_as_dirty(parent, DirtyFlags::CREATE).unwrap();
        let child = universe
            .next_in_category(None, EntityFilter::Category(EntityCategory::Light))
            .unwrap();

        assert_eq!(
            *seen.borrow(),
            [
                (parent, DirtyFlags::CREATE),
                (child, DirtyFlags::CREATE),
                (child, DirtyFlags::MOVE),
            ]
        );
        assert_eq!(
            *log.borrow(),
            [
                ("observer", child, DirtyFlags::CREATE),
                ("observer", child, DirtyFlags::MOVE),
                ("observer", parent, DirtyFlags::CREATE),
            ]
        );
        assert_eq!(universe.entity(child).unwrap().lifecycle(), Lifecycle::Live);
    }

    #[test]
    fn destroyed_records_wait_for_busy_handlers() {
        let mut universe = Universe::new();
        let victim = universe.create_entity(EntityKind::Light(LightType::Point));
        universe.add_data_facet(victim, Fuel(1.0)).unwrap();
        let seen: Rc<RefCell<Vec<(Entity, DirtyFlags, Option<Lifecycle>)>>> = Rc::default();

        let destroyer_seen = seen.clone();
        universe.register_dirty_handler(
            "destroyer",
            handler_fn(move |universe, entity, flags| {
                let lifecycle = universe.entity(entity).map(|record| record.lifecycle());
                destroyer_seen.borrow_mut().push((entity, flags, lifecycle));
                if entity != victim && flags.contains(DirtyFlags::DETAIL) {
                    universe.destroy_entity(victim)?;
                    assert!(!universe.is_alive(victim));
                    assert!(universe.entity(victim).is_some());
                }
                ok()
            }),
        );

        let trigger = universe.create_entity(EntityKind::Camera(CameraType::Perspective));
        universe.mark_entity_as_dirty(trigger, DirtyFlags::DETAIL).unwrap();

        assert_eq!(
            seen.borrow()[1],
            (victim, DirtyFlags::DESTROY, Some(Lifecycle::Destroyed))
        );
        assert!(universe.entity(victim).is_none());
        assert_eq!(universe.facets().len::<Fuel>(), 0);
        assert!(universe.mark_entity_as_dirty(victim, DirtyFlags::MOVE).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "marked dirty while its own dispatch was in flight")]
    fn remarking_the_dispatched_entity_panics() {
        let mut universe = Universe::new();
        universe.register_dirty_handler(
            "offender",
            handler_fn(|universe, entity, _| {
                universe.mark_entity_as_dirty(entity, DirtyFlags::DETAIL)
            }),
        );

        let entity = universe.create_entity(EntityKind::Light(LightType::Point));
        let _ = universe.mark_entity_as_dirty(entity, DirtyFlags::CREATE);
    }

    #[test]
    fn failing_handler_aborts_and_keeps_the_mask() {
        let mut universe = Universe::new();
        let log = Log::default();
        universe.register_dirty_handler(
            "broken",
            handler_fn(|_, _, _| Err(anyhow::anyhow!("out of video memory"))),
        );
        recorder(&mut universe, "after", &log);

        let entity = universe.create_entity(EntityKind::Light(LightType::Point));
        let error = universe
            .mark_entity_as_dirty(entity, DirtyFlags::CREATE)
            .unwrap_err();

        assert_eq!(error.root_cause().to_string(), "out of video memory");
        assert!(log.borrow().is_empty());
        assert_eq!(universe.entity(entity).unwrap().pending_flags(), DirtyFlags::CREATE);
    }

    #[test]
    fn components_have_their_own_dirty_protocol() {
        #[derive(Default)]
        struct Counter {
            seen: Vec<(Option<Entity>, DirtyFlags)>,
        }
        impl DirtyHandler for Counter {
            fn on_dirty_component(
                &mut self,
                universe: &mut Universe,
                component: ComponentRef,
                flags: DirtyFlags,
            ) -> AnyResult {
                if let Some(handle) = component.facet.typed::<Fuel>() {
                    assert!(
                        universe.component::<Fuel>(handle).is_some(),
                        "component must still exist during its dispatch"
                    );
                }
                self.seen.push((component.owner, flags));
                ok()
            }
        }

        let mut universe = Universe::new();
        let counter = Rc::new(RefCell::new(Counter::default()));
        universe.register_dirty_handler("counter", counter.clone());

        let owner = universe.create_entity(EntityKind::Light(LightType::Point));
        let handle = universe.add_component(Some(owner), Fuel(1.0));
        universe
            .mark_component_as_dirty::<Fuel>(handle, DirtyFlags::DETAIL)
            .unwrap();
        universe.component_mut::<Fuel>(handle).unwrap().0 = 2.0;
        universe
            .mark_component_as_dirty::<Fuel>(handle, DirtyFlags::DETAIL)
            .unwrap();
        assert_eq!(universe.remove_component::<Fuel>(handle).unwrap(), Fuel(2.0));

        assert_eq!(
            counter.borrow().seen,
            [
                (Some(owner), DirtyFlags::CREATE | DirtyFlags::DETAIL),
                (Some(owner), DirtyFlags::DETAIL),
                (Some(owner), DirtyFlags::DESTROY),
            ]
        );
        assert!(universe
            .mark_component_as_dirty::<Fuel>(handle, DirtyFlags::DETAIL)
            .is_err());
    }

    #[test]
    fn attaching_replaces_the_previous_facet() {
        let mut universe = Universe::new();
        let entity = universe.create_entity(EntityKind::Light(LightType::Point));
        let first = universe.add_data_facet(entity, Fuel(1.0)).unwrap();
        let second = universe.add_data_facet(entity, Fuel(2.0)).unwrap();

        assert!(!universe.facets().contains::<Fuel>(first));
        assert_eq!(universe.data_facet::<Fuel>(entity), Some(&Fuel(2.0)));
        assert_eq!(
            universe.get_detail_facet(entity, FacetCategory::Data),
            Some(FacetRef::of::<Fuel>(second))
        );
        assert_eq!(universe.facets().len::<Fuel>(), 1);
    }

    #[test]
    fn entities_are_walked_by_category() {
        let mut universe = Universe::new();
        let a = universe.create_entity(EntityKind::Light(LightType::Point));
        universe.create_entity(EntityKind::Actor(ActorType::Mesh));
        let b = universe.create_entity(EntityKind::Light(LightType::GlobalProbe));

        let lights = EntityFilter::Category(EntityCategory::Light);
        let walked: Vec<_> = std::iter::successors(universe.next_in_category(None, lights), |&e| {
            universe.next_in_category(Some(e), lights)
        })
        .collect();
        assert_eq!(walked, [a, b]);
        assert_eq!(universe.iter_filtered(lights).count(), 2);
    }

    #[test]
    fn destroy_all_empties_the_universe() {
        let mut universe = Universe::new();
        let log = Log::default();
        recorder(&mut universe, "only", &log);
        for _ in 0..3 {
            universe.create_entity(EntityKind::Light(LightType::Point));
        }

        universe.destroy_all().unwrap();
        assert_eq!(universe.entity_count(), 0);
        assert_eq!(log.borrow().len(), 3);
    }
}
