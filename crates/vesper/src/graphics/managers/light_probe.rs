use super::{point_light::cube_face_matrices, FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{LightProbeData, Transform, MAX_SHADOW_RESOLUTION, MIN_SHADOW_RESOLUTION},
        EntityKind, LightType,
    },
    graphics::{
        BufferDescriptor, BufferHandle, BufferUsages, Renderer, ShaderHandle, ShaderStage,
        TextureDescriptor, TextureHandle, TextureUsages, RENDER_FORMAT,
    },
};
use glam::*;
use vesper_utils::{ok, pack_floats, AnyResult};

/// Second order spherical harmonics, one vec4 per coefficient.
const IRRADIANCE_FLOATS: usize = 9 * 4;
/// Position + far plane.
const UNIFORM_FLOATS: usize = 4;

#[derive(Default)]
pub struct LightProbeFacet {
    /// Captured environment, with a full mip chain for filtered lookups.
    pub environment: Option<TextureHandle>,
    /// Irradiance coefficients, written by the filter pass.
    pub irradiance: Option<BufferHandle>,
    pub uniforms: Option<BufferHandle>,

    pub position: Vec3,
    pub far: f32,
    pub face_view_proj: [Mat4; 6],
}

#[derive(Default)]
pub struct LightProbes {
    shader: Option<ShaderHandle>,
}

pub type LightProbeManager = FacetManager<LightProbes>;

impl FacetSubsystem for LightProbes {
    type Data = LightProbeData;
    type Facet = LightProbeFacet;
    /// Environment face edge.
    type Params = u32;

    const LABEL: &'static str = "light probes";

    fn accepts(kind: EntityKind) -> bool {
        kind == EntityKind::Light(LightType::GlobalProbe)
    }

    fn params(_kind: EntityKind, data: &LightProbeData) -> u32 {
        data.resolution
            .max(1)
            .next_power_of_two()
            .clamp(MIN_SHADOW_RESOLUTION, MAX_SHADOW_RESOLUTION)
    }

    fn rebuild(&mut self, renderer: &mut Renderer, edge: &u32, facet: &mut LightProbeFacet) -> AnyResult {
        facet.environment = None;
        facet.environment = Some(
            renderer.create_texture(
                &TextureDescriptor::cube(
                    "light probe environment",
                    *edge,
                    RENDER_FORMAT,
                    TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
                )
                .with_full_mip_chain(),
            )?,
        );

        if facet.irradiance.is_none() {
            facet.irradiance = Some(renderer.create_buffer(&BufferDescriptor::new(
                "light probe irradiance",
                (IRRADIANCE_FLOATS * std::mem::size_of::<f32>()) as u64,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            ))?);
        }
        if facet.uniforms.is_none() {
            facet.uniforms = Some(renderer.create_buffer(&BufferDescriptor::uniforms(
                "light probe uniforms",
                UNIFORM_FLOATS,
            ))?);
        }
        ok()
    }

    fn derive(&self, _kind: EntityKind, data: &LightProbeData, transform: &Transform, facet: &mut LightProbeFacet) {
        facet.position = transform.position();
        facet.far = data.far.max(data.near * 2.0);
        facet.face_view_proj = cube_face_matrices(facet.position, data.near, facet.far);
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("probe_filter", ShaderStage::Compute)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &LightProbeFacet) -> AnyResult {
        if let Some(uniforms) = &facet.uniforms {
            let data = pack_floats(&[facet.position.x, facet.position.y, facet.position.z, facet.far]);
            renderer.write_buffer(uniforms, 0, &data)?;
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
    fn environment_has_a_full_mip_chain() {
        let renderer = testing::renderer().into_shared();
        let manager = Rc::new(RefCell::new(LightProbeManager::new(
            LightProbes::default(),
            renderer.clone(),
            4,
        )));
        let mut universe = Universe::new();
        universe.register_dirty_handler("light probes", manager.clone());

        let probe = EntityBuilder::new(&mut universe, EntityKind::Light(LightType::GlobalProbe))
            .with_data(LightProbeData {
                resolution: 100,
                ..Default::default()
            })
            .finish()
            .unwrap();

        {
            let manager = manager.borrow();
            let facet = manager.facet_of(&universe, probe).unwrap();
            let renderer = renderer.borrow();
            let environment = renderer
                .textures
                .get(facet.inner.environment.as_ref().unwrap());
            assert_eq!(environment.desc.size, UVec2::splat(128));
            assert_eq!(environment.desc.mip_levels, 8);
        }

        // Same rounded resolution, nothing to rebuild
        universe.data_facet_mut::<LightProbeData>(probe).unwrap().resolution = 120;
        universe.mark_entity_as_dirty(probe, DirtyFlags::DETAIL).unwrap();
        let manager = manager.borrow();
        assert_eq!(manager.facet_of(&universe, probe).unwrap().gate.rebuilds(), 1);
    }
}
