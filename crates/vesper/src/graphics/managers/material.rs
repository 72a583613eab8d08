use crate::{
    engine::Manager,
    entities::{components::MaterialComponent, ComponentRef, DirtyFlags, DirtyHandler, Universe},
    graphics::{
        BufferDescriptor, BufferHandle, RebuildGate, Renderer, ShaderHandle, ShaderStage,
        SharedRenderer, TextureDescriptor, TextureFormat, TextureHandle, TextureUsages,
    },
};
use ahash::AHashMap;
use glam::*;
use log::*;
use vesper_utils::{ok, pack_floats, AnyResult, Pool, PoolHandle};

/// GPU side of a [`MaterialComponent`].
pub struct MaterialFacet {
    /// Store handle of the source component.
    pub component: PoolHandle,
    pub time_stamp: u64,
    pub gate: RebuildGate<UVec2>,

    pub albedo_texture: Option<TextureHandle>,
    pub uniforms: Option<BufferHandle>,

    pub albedo: Vec4,
    pub roughness: f32,
    pub metallic: f32,
}

impl MaterialFacet {
    fn new(component: PoolHandle) -> Self {
        Self {
            component,
            time_stamp: 0,
            gate: RebuildGate::default(),
            albedo_texture: None,
            uniforms: None,
            albedo: Vec4::ONE,
            roughness: 0.5,
            metallic: 0.0,
        }
    }
}

fn rebuild_resources(
    renderer: &mut Renderer,
    size: UVec2,
    albedo_texture: &mut Option<TextureHandle>,
    uniforms: &mut Option<BufferHandle>,
) -> AnyResult {
    *albedo_texture = None;
    if size.min_element() > 0 {
        *albedo_texture = Some(
            renderer.create_texture(
                &TextureDescriptor::new_2d(
                    "material albedo",
                    size,
                    TextureFormat::Rgba8Unorm,
                    TextureUsages::SAMPLED | TextureUsages::COPY_DST,
                )
                .with_full_mip_chain(),
            )?,
        );
    }
    if uniforms.is_none() {
        *uniforms =
            Some(renderer.create_buffer(&BufferDescriptor::uniforms("material uniforms", 8))?);
    }
    ok()
}

/// Keeps a [`MaterialFacet`] for every [`MaterialComponent`] in the universe.
///
/// Materials aren't entity facets, so unlike the other managers this one reacts to component dirty
/// events. Facets are found through the component's store handle.
pub struct MaterialManager {
    renderer: SharedRenderer,
    facets: Pool<MaterialFacet>,
    by_component: AHashMap<PoolHandle, PoolHandle>,
    shader: Option<ShaderHandle>,
    started: bool,
}

impl MaterialManager {
    pub fn new(renderer: SharedRenderer, page_size: u32) -> Self {
        Self {
            renderer,
            facets: Pool::with_page_size(page_size),
            by_component: AHashMap::new(),
            shader: None,
            started: false,
        }
    }

    pub fn facets(&self) -> &Pool<MaterialFacet> {
        &self.facets
    }

    /// Facet of the material component stored under `component`.
    pub fn facet_for(&self, component: PoolHandle) -> Option<&MaterialFacet> {
        self.facets.try_get(*self.by_component.get(&component)?)
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

impl DirtyHandler for MaterialManager {
    fn on_dirty_component(
        &mut self,
        universe: &mut Universe,
        component: ComponentRef,
        flags: DirtyFlags,
    ) -> AnyResult {
        let Some(handle) = component.facet.typed::<MaterialComponent>() else {
            return ok();
        };

        if flags.contains(DirtyFlags::DESTROY) {
            if let Some(facet) = self.by_component.remove(&handle) {
                self.facets.free(facet);
                debug!("materials: released the facet of component {handle}");
            }
            return ok();
        }

        let Some(data) = universe.component::<MaterialComponent>(handle) else {
            return ok();
        };

        let existing = self
            .by_component
            .get(&handle)
            .copied()
            .filter(|&facet| self.facets.is_valid(facet));
        let facet_handle = match existing {
            Some(facet) => facet,
            None => {
                let facet = self.facets.allocate(MaterialFacet::new(handle));
                self.by_component.insert(handle, facet);
                facet
            }
        };

        let facet = self.facets.get_mut(facet_handle);
        if existing.is_none() || flags.intersects(DirtyFlags::CREATE | DirtyFlags::DETAIL) {
            let mut renderer = self.renderer.borrow_mut();
            let (texture, uniforms) = (&mut facet.albedo_texture, &mut facet.uniforms);
            let rebuilt = facet.gate.refresh(data.texture_size, |&size| {
                rebuild_resources(&mut renderer, size, texture, uniforms)
            })?;
            if rebuilt {
                trace!("materials: rebuilt `{}` at {}", data.name, data.texture_size);
            }
        }

        facet.albedo = data.albedo;
        facet.roughness = data.roughness;
        facet.metallic = data.metallic;
        facet.time_stamp = universe.frame();
        ok()
    }
}

impl Manager for MaterialManager {
    fn label(&self) -> &'static str {
        "materials"
    }

    fn on_start(&mut self) -> AnyResult {
        if !self.started {
            let shader = self
                .renderer
                .borrow_mut()
                .load_shader("material", ShaderStage::Fragment)?;
            self.shader = Some(shader);
            self.started = true;
        }
        ok()
    }

    fn update(&mut self, _universe: &Universe) -> AnyResult {
        let mut renderer = self.renderer.borrow_mut();
        for (_, facet) in self.facets.iter() {
            let Some(uniforms) = &facet.uniforms else {
                continue;
            };
            let floats = facet
                .albedo
                .to_array()
                .into_iter()
                .chain([facet.roughness, facet.metallic, 0.0, 0.0])
                .collect::<Vec<_>>();
            renderer.write_buffer(uniforms, 0, &pack_floats(&floats))?;
        }
        ok()
    }

    fn on_exit(&mut self) {
        self.facets.clear();
        self.by_component.clear();
        self.shader = None;
        self.started = false;
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::{cell::RefCell, rc::Rc};
    use vesper_utils::unpack_floats;

    fn setup() -> (Universe, Rc<RefCell<MaterialManager>>, SharedRenderer) {
        let renderer = testing::renderer().into_shared();
        let manager = Rc::new(RefCell::new(MaterialManager::new(renderer.clone(), 4)));
        let mut universe = Universe::new();
        universe.register_dirty_handler("materials", manager.clone());
        (universe, manager, renderer)
    }

    #[test]
    fn texture_follows_the_component() {
        let (mut universe, manager, renderer) = setup();
        let material = universe.add_component(
            None,
            MaterialComponent {
                name: "bricks".into(),
                texture_size: UVec2::splat(64),
                ..Default::default()
            },
        );
        assert!(manager.borrow().facet_for(material).is_none());

        universe
            .mark_component_as_dirty::<MaterialComponent>(material, DirtyFlags::empty())
            .unwrap();
        let first = manager
            .borrow()
            .facet_for(material)
            .unwrap()
            .albedo_texture
            .clone()
            .unwrap();

        // Tweaking a scalar keeps the texture
        universe
            .component_mut::<MaterialComponent>(material)
            .unwrap()
            .roughness = 0.9;
        universe
            .mark_component_as_dirty::<MaterialComponent>(material, DirtyFlags::DETAIL)
            .unwrap();
        {
            let manager = manager.borrow();
            let facet = manager.facet_for(material).unwrap();
            assert_eq!(facet.albedo_texture.as_ref(), Some(&first));
            assert_eq!(facet.roughness, 0.9);
            assert_eq!(facet.gate.rebuilds(), 1);
        }

        // Dropping the texture size drops the texture
        universe
            .component_mut::<MaterialComponent>(material)
            .unwrap()
            .texture_size = UVec2::ZERO;
        universe
            .mark_component_as_dirty::<MaterialComponent>(material, DirtyFlags::DETAIL)
            .unwrap();
        assert!(manager.borrow().facet_for(material).unwrap().albedo_texture.is_none());
        drop(first);
        assert_eq!(renderer.borrow().stats().textures, 0);
    }

    #[test]
    fn removal_releases_the_facet() {
        let (mut universe, manager, _) = setup();
        let material = universe.add_component(None, MaterialComponent::default());
        universe
            .mark_component_as_dirty::<MaterialComponent>(material, DirtyFlags::CREATE)
            .unwrap();
        assert_eq!(manager.borrow().len(), 1);

        universe.remove_component::<MaterialComponent>(material).unwrap();
        assert!(manager.borrow().is_empty());
        assert!(manager.borrow().facet_for(material).is_none());
    }

    #[test]
    fn uniforms_are_uploaded_on_update() {
        let (mut universe, manager, renderer) = setup();
        let material = universe.add_component(
            None,
            MaterialComponent {
                albedo: Vec4::new(1.0, 0.5, 0.25, 1.0),
                metallic: 1.0,
                ..Default::default()
            },
        );
        universe
            .mark_component_as_dirty::<MaterialComponent>(material, DirtyFlags::CREATE)
            .unwrap();
        manager.borrow_mut().update(&universe).unwrap();

        let manager = manager.borrow();
        let uniforms = manager.facet_for(material).unwrap().uniforms.clone().unwrap();
        let renderer = renderer.borrow();
        assert_eq!(
            unpack_floats(renderer.buffer_contents(&uniforms).unwrap()),
            [1.0, 0.5, 0.25, 1.0, 0.5, 1.0, 0.0, 0.0]
        );
    }
}
