//! The Vesper entity registry and dirty-flag protocol
//!
//! ## Overview
//! Every entity is a lightweight record: a closed [`EntityKind`], a transform, a pending dirty
//! mask and one optional facet per [`FacetCategory`]. Facets are the per-concern bits of state
//! attached to an entity. Data facets hold game-side parameters and live in the universe's
//! [`FacetStore`], graphic facets are owned by the graphics managers, and the entity only stores
//! a generation-checked [`FacetRef`] to each of them.
//!
//! Game code changes data, then calls [`Universe::mark_entity_as_dirty`] with the kind of change.
//! The universe synchronously forwards the accumulated mask to every registered
//! [`DirtyHandler`], and the handlers rebuild or re-derive whatever they own.
//!
//! ## Lifecycle
//! Entities start *fresh*. The first dispatch containing [`DirtyFlags::CREATE`] makes them
//! *created*, any later `MOVE` or `DETAIL` dispatch makes them *live*, and the `DESTROY` dispatch
//! issued by [`Universe::destroy_entity`] ends them. Marking `CREATE` again on a created entity is
//! a no-op.

use std::{
    any::{self, Any, TypeId},
    fmt,
    num::NonZeroU32,
};
use vesper_utils::PoolHandle;

pub mod components;

#[doc(inline)]
pub use builder::*;
mod builder;

#[doc(inline)]
pub use dirty::*;
mod dirty;

#[doc(inline)]
pub use facets::*;
mod facets;

#[doc(inline)]
pub use handlers::*;
mod handlers;

#[doc(inline)]
pub use registry::*;
mod registry;

#[doc(inline)]
pub use universe::*;
mod universe;

/// An entity handle. It's very cheap to copy (2x32-bit values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    /// The entity's index within the universe entity set.
    pub index: u32,
    /// The entity's generation number. It's unique across the entire universe.
    pub generation: NonZeroU32,
}

impl Entity {
    #[inline]
    pub(crate) fn handle(self) -> PoolHandle {
        PoolHandle {
            index: self.index,
            generation: self.generation,
        }
    }
}

impl From<PoolHandle> for Entity {
    fn from(handle: PoolHandle) -> Self {
        Self {
            index: handle.index,
            generation: handle.generation,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity #{}@{}", self.index, self.generation)
    }
}

/// Marker trait for components and store-owned facets.
pub trait Component: Any + Send + Sync {}

/// Broad entity category. Filters and cursors match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Actor,
    Light,
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    Mesh,
    Skinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Point,
    Sun,
    Area,
    GlobalProbe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraType {
    Perspective,
    Orthographic,
}

/// The closed set of entity kinds. Managers match on it instead of downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Actor(ActorType),
    Light(LightType),
    Camera(CameraType),
}

impl EntityKind {
    pub fn category(self) -> EntityCategory {
        match self {
            EntityKind::Actor(_) => EntityCategory::Actor,
            EntityKind::Light(_) => EntityCategory::Light,
            EntityKind::Camera(_) => EntityCategory::Camera,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Actor(ActorType::Mesh) => "mesh actor",
            EntityKind::Actor(ActorType::Skinned) => "skinned actor",
            EntityKind::Light(LightType::Point) => "point light",
            EntityKind::Light(LightType::Sun) => "sun light",
            EntityKind::Light(LightType::Area) => "area light",
            EntityKind::Light(LightType::GlobalProbe) => "global light probe",
            EntityKind::Camera(CameraType::Perspective) => "perspective camera",
            EntityKind::Camera(CameraType::Orthographic) => "orthographic camera",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Selects entities by category, optionally narrowed down to a single kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFilter {
    All,
    Category(EntityCategory),
    Kind(EntityKind),
}

impl EntityFilter {
    pub fn matches(self, kind: EntityKind) -> bool {
        match self {
            EntityFilter::All => true,
            EntityFilter::Category(category) => kind.category() == category,
            EntityFilter::Kind(expected) => kind == expected,
        }
    }
}

/// Facet slots available on every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetCategory {
    /// Game-side parameters, owned by the [`FacetStore`].
    Data,
    /// Render state, owned by a graphics manager.
    Graphic,
    /// Gameplay state, owned by the [`FacetStore`].
    Logic,
}

impl FacetCategory {
    pub const COUNT: usize = 3;
    pub const ALL: [FacetCategory; Self::COUNT] =
        [FacetCategory::Data, FacetCategory::Graphic, FacetCategory::Logic];

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// Type-tagged, generation-counted reference to a facet living in some pool.
///
/// The reference carries the [`TypeId`] of the pooled type, so a manager can tell its own facets
/// apart from anything else stored in the same slot, and the generation of the pool handle, so a
/// reference to a freed facet can be detected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FacetRef {
    type_id: TypeId,
    type_name: &'static str,
    handle: PoolHandle,
}

impl FacetRef {
    pub fn of<T: Any>(handle: PoolHandle) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            handle,
        }
    }

    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Returns the pool handle if the reference points at a `T`.
    #[inline]
    pub fn typed<T: Any>(&self) -> Option<PoolHandle> {
        self.is::<T>().then_some(self.handle)
    }

    #[inline]
    pub fn handle(&self) -> PoolHandle {
        self.handle
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for FacetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacetRef({} {})", self.type_name, self.handle)
    }
}
