use super::{FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{AreaLightData, ShadowSettings, Transform},
        EntityKind, LightType,
    },
    graphics::{
        BufferDescriptor, BufferHandle, Renderer, ShaderHandle, ShaderStage, TextureDescriptor,
        TextureHandle, TextureUsages, DEPTH_FORMAT,
    },
};
use glam::*;
use vesper_utils::{ok, pack_floats, AnyResult};

/// Four corners as homogeneous points, radiance + two-sided flag.
const UNIFORM_FLOATS: usize = 20;
/// Field of view of the shadow projection, wide enough to cover the lit hemisphere.
const SHADOW_FOV: f32 = 120.0;
const SHADOW_NEAR: f32 = 0.05;
const SHADOW_FAR: f32 = 100.0;

#[derive(Default)]
pub struct AreaLightFacet {
    pub shadow_map: Option<TextureHandle>,
    pub uniforms: Option<BufferHandle>,

    /// World space corners, counter-clockwise when looking at the lit side.
    pub corners: [Vec3; 4],
    pub normal: Vec3,
    pub radiance: Vec3,
    pub two_sided: bool,
    pub shadow_view_proj: Mat4,
}

#[derive(Default)]
pub struct AreaLights {
    shader: Option<ShaderHandle>,
}

pub type AreaLightManager = FacetManager<AreaLights>;

impl FacetSubsystem for AreaLights {
    type Data = AreaLightData;
    type Facet = AreaLightFacet;
    type Params = ShadowSettings;

    const LABEL: &'static str = "area lights";

    fn accepts(kind: EntityKind) -> bool {
        kind == EntityKind::Light(LightType::Area)
    }

    fn params(_kind: EntityKind, data: &AreaLightData) -> ShadowSettings {
        data.shadow
    }

    fn rebuild(
        &mut self,
        renderer: &mut Renderer,
        shadow: &ShadowSettings,
        facet: &mut AreaLightFacet,
    ) -> AnyResult {
        facet.shadow_map = None;

        if shadow.casts_shadows() {
            facet.shadow_map = Some(renderer.create_texture(&TextureDescriptor::new_2d(
                "area light shadow map",
                UVec2::splat(shadow.resolution()),
                DEPTH_FORMAT,
                TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
            ))?);
        }

        if facet.uniforms.is_none() {
            facet.uniforms = Some(renderer.create_buffer(&BufferDescriptor::uniforms(
                "area light uniforms",
                UNIFORM_FLOATS,
            ))?);
        }
        ok()
    }

    fn derive(&self, _kind: EntityKind, data: &AreaLightData, transform: &Transform, facet: &mut AreaLightFacet) {
        let center = transform.position();
        let right = transform.right() * data.size.x * 0.5;
        let up = transform.up() * data.size.y * 0.5;

        facet.corners = [
            center - right - up,
            center + right - up,
            center + right + up,
            center - right + up,
        ];
        facet.normal = transform.forward();
        facet.radiance = data.color * data.intensity;
        facet.two_sided = data.two_sided;

        let projection =
            Mat4::perspective_rh(SHADOW_FOV.to_radians(), 1.0, SHADOW_NEAR, SHADOW_FAR);
        facet.shadow_view_proj = projection * transform.view_matrix();
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("shadow_area", ShaderStage::Vertex)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &AreaLightFacet) -> AnyResult {
        let Some(uniforms) = &facet.uniforms else {
            return ok();
        };

        let mut floats = Vec::with_capacity(UNIFORM_FLOATS);
        for corner in facet.corners {
            floats.extend_from_slice(&corner.extend(1.0).to_array());
        }
        floats.extend_from_slice(&facet.radiance.to_array());
        floats.push(if facet.two_sided { 1.0 } else { 0.0 });

        renderer.write_buffer(uniforms, 0, &pack_floats(&floats))?;
        ok()
    }

    fn is_renderable(facet: &AreaLightFacet) -> bool {
        facet.radiance != Vec3::ZERO && facet.corners[0] != facet.corners[2]
    }

    fn on_exit(&mut self) {
        self.shader = None;
    }
}
