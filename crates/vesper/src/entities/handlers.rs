use super::{DirtyFlags, Entity, FacetRef, Universe};
use smallvec::SmallVec;
use std::{cell::RefCell, fmt, rc::Rc};
use vesper_utils::{ok, AnyResult, Pool, PoolHandle};

/// Receives dirty notifications from a [`Universe`].
///
/// Handlers run synchronously inside `mark_*_as_dirty`, in registration order, with mutable
/// access to the universe. They may mark *other* entities dirty, create and destroy entities,
/// and register or unregister handlers. Marking the entity currently being dispatched is a
/// programming error.
///
/// A handler is never re-entered. Events raised from within its own callback, like the `CREATE`
/// of an entity it spawns, are queued and delivered in order as soon as the callback returns.
pub trait DirtyHandler {
    fn on_dirty_entity(
        &mut self,
        _universe: &mut Universe,
        _entity: Entity,
        _flags: DirtyFlags,
    ) -> AnyResult {
        ok()
    }

    fn on_dirty_component(
        &mut self,
        _universe: &mut Universe,
        _component: ComponentRef,
        _flags: DirtyFlags,
    ) -> AnyResult {
        ok()
    }
}

pub type SharedHandler = Rc<RefCell<dyn DirtyHandler>>;

/// Reference to a stored component, as delivered to [`DirtyHandler::on_dirty_component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRef {
    pub facet: FacetRef,
    pub owner: Option<Entity>,
}

/// A single notification, as passed to one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyEvent {
    Entity(Entity, DirtyFlags),
    Component(ComponentRef, DirtyFlags),
}

impl DirtyEvent {
    pub fn flags(&self) -> DirtyFlags {
        match *self {
            DirtyEvent::Entity(_, flags) | DirtyEvent::Component(_, flags) => flags,
        }
    }

    pub fn deliver(self, handler: &mut dyn DirtyHandler, universe: &mut Universe) -> AnyResult {
        match self {
            DirtyEvent::Entity(entity, flags) => handler.on_dirty_entity(universe, entity, flags),
            DirtyEvent::Component(component, flags) => {
                handler.on_dirty_component(universe, component, flags)
            }
        }
    }
}

/// Adapts a closure into an entity-only [`DirtyHandler`].
pub struct EntityHandlerFn<F>(pub F);

/// Wraps a closure into a shareable entity-only handler.
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: FnMut(&mut Universe, Entity, DirtyFlags) -> AnyResult + 'static,
{
    Rc::new(RefCell::new(EntityHandlerFn(f)))
}

impl<F> DirtyHandler for EntityHandlerFn<F>
where
    F: FnMut(&mut Universe, Entity, DirtyFlags) -> AnyResult,
{
    fn on_dirty_entity(
        &mut self,
        universe: &mut Universe,
        entity: Entity,
        flags: DirtyFlags,
    ) -> AnyResult {
        (self.0)(universe, entity, flags)
    }
}

/// Registration token returned by [`Universe::register_dirty_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(PoolHandle);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler {}", self.0)
    }
}

struct HandlerSlot {
    label: &'static str,
    handler: SharedHandler,
}

/// Snapshot of the registry taken at the start of a dispatch.
pub(in crate::entities) type HandlerSnapshot = SmallVec<[(HandlerId, &'static str, SharedHandler); 8]>;

/// An event a handler couldn't take because it was busy further up the call stack.
pub(in crate::entities) struct Postponed {
    pub id: HandlerId,
    pub label: &'static str,
    pub handler: SharedHandler,
    pub event: DirtyEvent,
}

/// Registered dirty handlers, in registration order.
///
/// Unregistering frees the slot, which bumps its generation. A dispatch in flight iterates its
/// own snapshot and checks every id before calling it, so a handler unregistered mid-dispatch is
/// skipped, and one registered mid-dispatch only sees the next dispatch.
#[derive(Default)]
pub(in crate::entities) struct HandlerRegistry {
    slots: Pool<HandlerSlot>,
}

impl HandlerRegistry {
    pub fn register(&mut self, label: &'static str, handler: SharedHandler) -> HandlerId {
        HandlerId(self.slots.allocate(HandlerSlot { label, handler }))
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let valid = self.slots.is_valid(id.0);
        if valid {
            self.slots.free(id.0);
        }
        valid
    }

    #[inline]
    pub fn is_registered(&self, id: HandlerId) -> bool {
        self.slots.is_valid(id.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(|(_, slot)| slot.label)
    }

    pub fn snapshot(&self) -> HandlerSnapshot {
        self.slots
            .iter()
            .map(|(handle, slot)| (HandlerId(handle), slot.label, slot.handler.clone()))
            .collect()
    }
}
