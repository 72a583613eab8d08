//! The engine context
//!
//! An [`Engine`] owns the [`Universe`], the shared [`Renderer`] and one instance of every manager.
//! Nothing here is global: whoever needs a manager gets it from the engine, and the engine decides
//! the order everything starts, updates and shuts down in.
//!
//! Each frame goes through the managers in a fixed order:
//!  * materials, so actors see up to date material facets
//!  * lights (point, sun, area, probes)
//!  * actors
//!  * cameras
//!
//! Shutdown happens in the reverse order.

use crate::{
    config::EngineConfig,
    entities::{DirtyHandler, HandlerId, SharedHandler, Universe},
    graphics::{create_backend, managers::*, FrameState, Renderer, SharedRenderer},
};
use anyhow::{ensure, Context};
use log::*;
use std::{cell::RefCell, rc::Rc};
use vesper_utils::{ok, AnyResult};

#[doc(inline)]
pub use app::*;
mod app;

#[doc(inline)]
pub use profiler::*;
mod profiler;

/// A subsystem manager driven by the [`Engine`].
///
/// Managers are also [`DirtyHandler`]s, registered with the universe between [`Manager::on_start`]
/// and [`Manager::on_exit`].
pub trait Manager: DirtyHandler {
    /// Constant label used in logs, handler registration and profiling.
    fn label(&self) -> &'static str;

    /// Loads whatever the manager needs before its first update. Calling it again is a no-op.
    fn on_start(&mut self) -> AnyResult;

    /// Once a frame, after all dirty handling of the previous frame.
    fn update(&mut self, universe: &Universe) -> AnyResult;

    /// Releases every facet and resource. Safe to call repeatedly, and without starting.
    fn on_exit(&mut self);

    fn is_started(&self) -> bool;

    /// Render jobs collected by the last update.
    fn jobs(&self) -> &[RenderJob] {
        &[]
    }
}

/// Every manager the engine runs, by type.
pub struct Managers {
    pub materials: Rc<RefCell<MaterialManager>>,
    pub point_lights: Rc<RefCell<PointLightManager>>,
    pub sun_lights: Rc<RefCell<SunLightManager>>,
    pub area_lights: Rc<RefCell<AreaLightManager>>,
    pub light_probes: Rc<RefCell<LightProbeManager>>,
    pub actors: Rc<RefCell<ActorManager>>,
    pub cameras: Rc<RefCell<CameraManager>>,
}

/// A manager in update order, along with its handler registration.
struct ManagerSlot {
    label: &'static str,
    manager: Rc<RefCell<dyn Manager>>,
    handler: SharedHandler,
    id: Option<HandlerId>,
}

impl ManagerSlot {
    fn new<M: Manager + 'static>(manager: &Rc<RefCell<M>>) -> Self {
        Self {
            label: manager.borrow().label(),
            manager: manager.clone(),
            handler: manager.clone(),
            id: None,
        }
    }
}

pub struct Engine {
    pub universe: Universe,
    renderer: SharedRenderer,
    managers: Managers,
    slots: Vec<ManagerSlot>,
    profiler: FrameProfiler,
    frame_state: FrameState,
    started: bool,
}

impl Engine {
    pub fn new(renderer: Renderer, config: &EngineConfig) -> Self {
        let renderer = renderer.into_shared();
        let pools = &config.pools;

        let managers = Managers {
            materials: Rc::new(RefCell::new(MaterialManager::new(
                renderer.clone(),
                pools.materials,
            ))),
            point_lights: Rc::new(RefCell::new(PointLightManager::new(
                PointLights::default(),
                renderer.clone(),
                pools.point_lights,
            ))),
            sun_lights: Rc::new(RefCell::new(SunLightManager::new(
                SunLights::default(),
                renderer.clone(),
                pools.sun_lights,
            ))),
            area_lights: Rc::new(RefCell::new(AreaLightManager::new(
                AreaLights::default(),
                renderer.clone(),
                pools.area_lights,
            ))),
            light_probes: Rc::new(RefCell::new(LightProbeManager::new(
                LightProbes::default(),
                renderer.clone(),
                pools.light_probes,
            ))),
            actors: Rc::new(RefCell::new(ActorManager::new(
                Actors::default(),
                renderer.clone(),
                pools.actors,
            ))),
            cameras: Rc::new(RefCell::new(CameraManager::new(
                Cameras::default(),
                renderer.clone(),
                pools.cameras,
            ))),
        };

        let slots = vec![
            ManagerSlot::new(&managers.materials),
            ManagerSlot::new(&managers.point_lights),
            ManagerSlot::new(&managers.sun_lights),
            ManagerSlot::new(&managers.area_lights),
            ManagerSlot::new(&managers.light_probes),
            ManagerSlot::new(&managers.actors),
            ManagerSlot::new(&managers.cameras),
        ];

        Self {
            universe: Universe::with_page_sizes(pools.entities, pools.components),
            renderer,
            managers,
            slots,
            profiler: FrameProfiler::new(config.app.profiler_history),
            frame_state: FrameState::default(),
            started: false,
        }
    }

    /// An engine rendering with the backend picked by [`RendererConfig::backend`].
    ///
    /// [`RendererConfig::backend`]: crate::config::RendererConfig::backend
    pub fn from_config(config: &EngineConfig) -> AnyResult<Self> {
        let backend = create_backend(config.renderer.backend)
            .with_context(|| format!("couldn't create the {:?} backend", config.renderer.backend))?;
        let renderer = Renderer::new(backend, &config.renderer.descriptor());
        Ok(Self::new(renderer, config))
    }

    pub fn renderer(&self) -> &SharedRenderer {
        &self.renderer
    }

    pub fn managers(&self) -> &Managers {
        &self.managers
    }

    pub fn profiler(&self) -> &FrameProfiler {
        &self.profiler
    }

    /// Render jobs of the last frame.
    pub fn frame_state(&self) -> &FrameState {
        &self.frame_state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Manager labels, in update order.
    pub fn manager_labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(|slot| slot.label)
    }

    /// Starts every manager and registers it as a dirty handler. Entities created before this
    /// point aren't seen by the managers until they're marked dirty again.
    pub fn start(&mut self) -> AnyResult {
        if self.started {
            return ok();
        }
        info!("starting the engine ({})", self.renderer.borrow().backend_name());

        for slot in &mut self.slots {
            slot.manager
                .borrow_mut()
                .on_start()
                .with_context(|| format!("couldn't start `{}`", slot.label))?;
            slot.id = Some(
                self.universe
                    .register_dirty_handler(slot.label, slot.handler.clone()),
            );
            debug!("started `{}`", slot.label);
        }

        self.started = true;
        ok()
    }

    /// Runs a single frame: updates every manager in order, collects their render jobs and
    /// releases unused renderer resources.
    pub fn frame(&mut self) -> AnyResult<&FrameState> {
        ensure!(self.started, "the engine isn't running");

        let frame = self.universe.advance_frame();
        self.profiler.begin_frame(frame);
        self.frame_state.reset(frame);

        for slot in &self.slots {
            let mut manager = slot.manager.borrow_mut();
            let universe = &self.universe;
            let result = self.profiler.measure(slot.label, || manager.update(universe));
            if let Err(error) = result {
                self.profiler.abandon_frame();
                return Err(error.context(format!("`{}` failed in frame {frame}", slot.label)));
            }
            self.frame_state.push(slot.label, manager.jobs());
        }

        self.renderer.borrow_mut().collect_garbage();
        self.profiler.finish_frame();
        Ok(&self.frame_state)
    }

    /// Unregisters and stops every manager, in reverse order. Safe to call repeatedly.
    pub fn exit(&mut self) {
        if self.started {
            info!("shutting down the engine");
        }

        for slot in self.slots.iter_mut().rev() {
            if let Some(id) = slot.id.take() {
                self.universe.unregister_dirty_handler(id);
            }
            slot.manager.borrow_mut().on_exit();
        }

        let freed = self.renderer.borrow_mut().collect_garbage();
        if freed > 0 {
            debug!("released {freed} renderer resources on exit");
        }
        self.frame_state.reset(self.universe.frame());
        self.started = false;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.exit();
    }
}
