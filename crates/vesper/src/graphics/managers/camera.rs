use super::{FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{CameraData, Transform},
        CameraType, EntityKind,
    },
    graphics::{
        BufferDescriptor, BufferHandle, Renderer, ShaderHandle, ShaderStage, TextureDescriptor,
        TextureHandle, TextureUsages, DEPTH_FORMAT, RENDER_FORMAT,
    },
};
use glam::*;
use vesper_utils::{ok, pack_floats, AnyResult};

#[derive(Default)]
pub struct CameraFacet {
    pub color_target: Option<TextureHandle>,
    pub depth_target: Option<TextureHandle>,
    pub uniforms: Option<BufferHandle>,

    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

#[derive(Default)]
pub struct Cameras {
    shader: Option<ShaderHandle>,
}

pub type CameraManager = FacetManager<Cameras>;

impl FacetSubsystem for Cameras {
    type Data = CameraData;
    type Facet = CameraFacet;
    /// Render target size.
    type Params = UVec2;

    const LABEL: &'static str = "cameras";

    fn accepts(kind: EntityKind) -> bool {
        matches!(kind, EntityKind::Camera(_))
    }

    fn params(_kind: EntityKind, data: &CameraData) -> UVec2 {
        data.target_size.max(UVec2::ONE)
    }

    fn rebuild(&mut self, renderer: &mut Renderer, size: &UVec2, facet: &mut CameraFacet) -> AnyResult {
        facet.color_target = None;
        facet.depth_target = None;

        facet.color_target = Some(renderer.create_texture(&TextureDescriptor::new_2d(
            "camera color target",
            *size,
            RENDER_FORMAT,
            TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
        ))?);
        facet.depth_target = Some(renderer.create_texture(&TextureDescriptor::new_2d(
            "camera depth target",
            *size,
            DEPTH_FORMAT,
            TextureUsages::RENDER_TARGET,
        ))?);

        if facet.uniforms.is_none() {
            facet.uniforms =
                Some(renderer.create_buffer(&BufferDescriptor::uniforms("camera uniforms", 20))?);
        }
        ok()
    }

    fn derive(&self, kind: EntityKind, data: &CameraData, transform: &Transform, facet: &mut CameraFacet) {
        let near = data.near.max(f32::EPSILON);
        let far = data.far.max(near * 2.0);
        let aspect = data.aspect_ratio();

        facet.position = transform.position();
        facet.view = transform.view_matrix();
        facet.projection = match kind {
            EntityKind::Camera(CameraType::Orthographic) => {
                let half_height = data.ortho_height * 0.5;
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
            _ => Mat4::perspective_rh(data.fov.to_radians(), aspect, near, far),
        };
        facet.view_projection = facet.projection * facet.view;
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("camera_resolve", ShaderStage::Fragment)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &CameraFacet) -> AnyResult {
        if let Some(uniforms) = &facet.uniforms {
            let mut floats = facet.view_projection.to_cols_array().to_vec();
            floats.extend_from_slice(&facet.position.extend(1.0).to_array());
            renderer.write_buffer(uniforms, 0, &pack_floats(&floats))?;
        }
        ok()
    }

    fn on_exit(&mut self) {
        self.shader = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entities::{DirtyFlags, EntityBuilder, Universe},
        testing,
    };
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn resizing_reallocates_targets() {
        let renderer = testing::renderer().into_shared();
        let manager = Rc::new(RefCell::new(CameraManager::new(
            Cameras::default(),
            renderer.clone(),
            4,
        )));
        let mut universe = Universe::new();
        universe.register_dirty_handler("cameras", manager.clone());

        let camera = EntityBuilder::new(&mut universe, EntityKind::Camera(CameraType::Orthographic))
            .with_data(CameraData {
                target_size: UVec2::new(320, 240),
                ..Default::default()
            })
            .finish()
            .unwrap();
        let first_target = manager
            .borrow()
            .facet_of(&universe, camera)
            .unwrap()
            .inner
            .color_target
            .clone()
            .unwrap();

        universe.data_facet_mut::<CameraData>(camera).unwrap().target_size = UVec2::new(640, 480);
        universe.mark_entity_as_dirty(camera, DirtyFlags::DETAIL).unwrap();

        let manager = manager.borrow();
        let facet = &manager.facet_of(&universe, camera).unwrap().inner;
        let target = facet.color_target.as_ref().unwrap();
        assert_ne!(*target, first_target);
        assert_eq!(renderer.borrow().textures.get(target).desc.size, UVec2::new(640, 480));

        // Orthographic projections keep depth linear, so the near plane maps to 0 in NDC
        let near_point = facet.view_projection.project_point3(Vec3::new(0.0, 0.0, -0.1));
        assert!(near_point.z.abs() < 1e-5);
    }
}
