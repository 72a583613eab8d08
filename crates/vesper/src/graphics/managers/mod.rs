//! Graphic facet managers
//!
//! Every renderable entity kind has a manager owning a pool of graphic facets. All of them share
//! the same update protocol, implemented once by [`FacetManager`], and differ only in their
//! [`FacetSubsystem`]:
//!
//! 1. Entities the subsystem doesn't [accept](FacetSubsystem::accepts) are ignored.
//! 2. On `DESTROY` the facet is freed and the entity's graphic slot cleared.
//! 3. Entities without a data facet of the subsystem's type are ignored.
//! 4. Missing facets are allocated and attached, even when the change isn't `CREATE`. This covers
//!    data facets added after creation.
//! 5. On `CREATE`, `DETAIL` or a fresh facet, the expensive parameters are recomputed, and the
//!    facet's [`RebuildGate`] rebuilds GPU resources if they changed. A `MOVE`-only change never
//!    gets here.
//! 6. The cheap state is re-derived from the data and the transform, and the facet is stamped
//!    with the current frame.

use crate::{
    engine::Manager,
    entities::{
        components::Transform, Component, DirtyFlags, DirtyHandler, Entity, EntityKind,
        FacetCategory, FacetRef, Universe,
    },
    graphics::{RebuildGate, Renderer, SharedRenderer},
};
use log::*;
use std::fmt;
use vesper_utils::{ok, AnyResult, Pool, PoolHandle};

#[doc(inline)]
pub use actor::*;
mod actor;

#[doc(inline)]
pub use area_light::*;
mod area_light;

#[doc(inline)]
pub use camera::*;
mod camera;

#[doc(inline)]
pub use light_probe::*;
mod light_probe;

#[doc(inline)]
pub use material::*;
mod material;

#[doc(inline)]
pub use point_light::*;
mod point_light;

#[doc(inline)]
pub use sun_light::*;
mod sun_light;

/// Entity-kind specific part of a [`FacetManager`].
pub trait FacetSubsystem: 'static {
    /// Data facet the graphic facet is derived from.
    type Data: Component + Clone;
    /// Per-entity render state.
    type Facet: Default;
    /// Everything the expensive resources depend on.
    type Params: Clone + PartialEq + fmt::Debug;

    const LABEL: &'static str;

    fn accepts(kind: EntityKind) -> bool;

    fn params(kind: EntityKind, data: &Self::Data) -> Self::Params;

    /// (Re)creates the facet's expensive resources for `params`.
    fn rebuild(
        &mut self,
        renderer: &mut Renderer,
        params: &Self::Params,
        facet: &mut Self::Facet,
    ) -> AnyResult;

    /// Re-derives the cheap state. Must not allocate renderer resources.
    fn derive(&self, kind: EntityKind, data: &Self::Data, transform: &Transform, facet: &mut Self::Facet);

    fn on_start(&mut self, _renderer: &mut Renderer) -> AnyResult {
        ok()
    }

    /// Per-frame work on a facet about to be rendered, like uniform uploads.
    fn prepare(&mut self, _renderer: &mut Renderer, _facet: &Self::Facet) -> AnyResult {
        ok()
    }

    fn is_renderable(_facet: &Self::Facet) -> bool {
        true
    }

    fn on_exit(&mut self) {}
}

/// A graphic facet, as stored in a [`FacetManager`]'s pool.
pub struct GraphicFacet<S: FacetSubsystem> {
    pub owner: Entity,
    /// Frame of the last update.
    pub time_stamp: u64,
    pub gate: RebuildGate<S::Params>,
    pub inner: S::Facet,
}

impl<S: FacetSubsystem> GraphicFacet<S> {
    fn new(owner: Entity) -> Self {
        Self {
            owner,
            time_stamp: 0,
            gate: RebuildGate::default(),
            inner: S::Facet::default(),
        }
    }
}

/// A facet to be rendered this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderJob {
    pub entity: Entity,
    pub facet: PoolHandle,
}

/// Generic graphic facet manager, see the module docs for the update protocol.
pub struct FacetManager<S: FacetSubsystem> {
    subsystem: S,
    renderer: SharedRenderer,
    facets: Pool<GraphicFacet<S>>,
    jobs: Vec<RenderJob>,
    started: bool,
}

impl<S: FacetSubsystem> FacetManager<S> {
    pub fn new(subsystem: S, renderer: SharedRenderer, page_size: u32) -> Self {
        Self {
            subsystem,
            renderer,
            facets: Pool::with_page_size(page_size),
            jobs: Vec::new(),
            started: false,
        }
    }

    pub fn subsystem(&self) -> &S {
        &self.subsystem
    }

    pub fn facets(&self) -> &Pool<GraphicFacet<S>> {
        &self.facets
    }

    /// Render jobs collected by the last update.
    pub fn jobs(&self) -> &[RenderJob] {
        &self.jobs
    }

    /// Handle of the entity's graphic facet, if it has a live one owned by this manager.
    pub fn facet_handle(&self, universe: &Universe, entity: Entity) -> Option<PoolHandle> {
        universe
            .get_detail_facet(entity, FacetCategory::Graphic)?
            .typed::<GraphicFacet<S>>()
            .filter(|&handle| self.facets.is_valid(handle))
    }

    pub fn facet_of(&self, universe: &Universe, entity: Entity) -> Option<&GraphicFacet<S>> {
        self.facets.try_get(self.facet_handle(universe, entity)?)
    }

    fn release(&mut self, universe: &mut Universe, entity: Entity, handle: PoolHandle) -> AnyResult {
        self.facets.free(handle);
        universe.set_detail_facet(entity, FacetCategory::Graphic, None)?;
        debug!("{}: released the facet of {entity}", S::LABEL);
        ok()
    }
}

impl<S: FacetSubsystem> DirtyHandler for FacetManager<S> {
    fn on_dirty_entity(
        &mut self,
        universe: &mut Universe,
        entity: Entity,
        flags: DirtyFlags,
    ) -> AnyResult {
        let Some(record) = universe.entity(entity) else {
            return ok();
        };
        let kind = record.kind();
        if !S::accepts(kind) {
            return ok();
        }

        let slot = record.detail_facet(FacetCategory::Graphic);
        if let Some(facet) = slot.filter(|facet| !facet.is::<GraphicFacet<S>>()) {
            warn!("{}: {entity} has a foreign graphic facet {facet:?}", S::LABEL);
            return ok();
        }
        let existing = slot
            .and_then(|facet| facet.typed::<GraphicFacet<S>>())
            .filter(|&handle| self.facets.is_valid(handle));

        if flags.contains(DirtyFlags::DESTROY) {
            if let Some(handle) = existing {
                self.release(universe, entity, handle)?;
            }
            return ok();
        }

        let transform = record.transform().clone();
        let Some(data) = universe.data_facet::<S::Data>(entity).cloned() else {
            trace!("{}: {entity} has no data facet yet", S::LABEL);
            return ok();
        };

        let handle = match existing {
            Some(handle) => handle,
            None => {
                if !flags.contains(DirtyFlags::CREATE) {
                    debug!("{}: late facet creation for {entity} ({flags:?})", S::LABEL);
                }
                let handle = self.facets.allocate(GraphicFacet::new(entity));
                universe.set_detail_facet(
                    entity,
                    FacetCategory::Graphic,
                    Some(FacetRef::of::<GraphicFacet<S>>(handle)),
                )?;
                handle
            }
        };

        let facet = self.facets.get_mut(handle);
        if existing.is_none() || flags.intersects(DirtyFlags::CREATE | DirtyFlags::DETAIL) {
            let params = S::params(kind, &data);
            let subsystem = &mut self.subsystem;
            let mut renderer = self.renderer.borrow_mut();
            let rebuilt = facet.gate.refresh(params, |params| {
                subsystem.rebuild(&mut renderer, params, &mut facet.inner)
            })?;
            if rebuilt {
                trace!("{}: rebuilt {entity} from {:?}", S::LABEL, facet.gate.built_from());
            }
        }

        self.subsystem.derive(kind, &data, &transform, &mut facet.inner);
        facet.time_stamp = universe.frame();
        ok()
    }
}

impl<S: FacetSubsystem> Manager for FacetManager<S> {
    fn label(&self) -> &'static str {
        S::LABEL
    }

    fn on_start(&mut self) -> AnyResult {
        if !self.started {
            self.subsystem.on_start(&mut self.renderer.borrow_mut())?;
            self.started = true;
        }
        ok()
    }

    fn update(&mut self, universe: &Universe) -> AnyResult {
        self.jobs.clear();
        let mut renderer = self.renderer.borrow_mut();

        for (entity, record) in universe.iter_entities() {
            if !S::accepts(record.kind()) {
                continue;
            }
            let Some(handle) = record
                .detail_facet(FacetCategory::Graphic)
                .and_then(|facet| facet.typed::<GraphicFacet<S>>())
            else {
                continue;
            };
            let Some(facet) = self.facets.try_get(handle) else {
                continue;
            };
            if !S::is_renderable(&facet.inner) {
                continue;
            }

            self.subsystem.prepare(&mut renderer, &facet.inner)?;
            self.jobs.push(RenderJob {
                entity,
                facet: handle,
            });
        }
        ok()
    }

    fn on_exit(&mut self) {
        if !self.facets.is_empty() {
            debug!("{}: dropping {} facets", S::LABEL, self.facets.len());
        }
        self.facets.clear();
        self.jobs.clear();
        if self.started {
            self.subsystem.on_exit();
            self.started = false;
        }
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn jobs(&self) -> &[RenderJob] {
        &self.jobs
    }
}
