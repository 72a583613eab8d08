use super::{FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{ShadowSettings, SunLightData, Transform},
        EntityKind, LightType,
    },
    graphics::{
        BufferDescriptor, BufferHandle, Renderer, ShaderHandle, ShaderStage, TextureDescriptor,
        TextureHandle, TextureUsages, DEPTH_FORMAT,
    },
};
use glam::*;
use smallvec::SmallVec;
use vesper_utils::{ok, pack_floats, AnyResult};

/// Direction + cascade count, radiance + padding.
const UNIFORM_FLOATS: usize = 8;
/// Each cascade covers this many times the extent of the previous one.
const CASCADE_SCALE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunShadowParams {
    pub shadow: ShadowSettings,
    pub cascades: u32,
}

#[derive(Default)]
pub struct SunLightFacet {
    /// One layer per cascade.
    pub cascade_maps: Option<TextureHandle>,
    pub uniforms: Option<BufferHandle>,

    pub direction: Vec3,
    pub radiance: Vec3,
    pub cascade_view_proj: SmallVec<[Mat4; 4]>,
}

#[derive(Default)]
pub struct SunLights {
    shader: Option<ShaderHandle>,
}

pub type SunLightManager = FacetManager<SunLights>;

impl FacetSubsystem for SunLights {
    type Data = SunLightData;
    type Facet = SunLightFacet;
    type Params = SunShadowParams;

    const LABEL: &'static str = "sun lights";

    fn accepts(kind: EntityKind) -> bool {
        kind == EntityKind::Light(LightType::Sun)
    }

    fn params(_kind: EntityKind, data: &SunLightData) -> SunShadowParams {
        SunShadowParams {
            shadow: data.shadow,
            cascades: data.cascade_count(),
        }
    }

    fn rebuild(
        &mut self,
        renderer: &mut Renderer,
        params: &SunShadowParams,
        facet: &mut SunLightFacet,
    ) -> AnyResult {
        facet.cascade_maps = None;

        if params.shadow.casts_shadows() {
            facet.cascade_maps = Some(renderer.create_texture(&TextureDescriptor::array(
                "sun cascade maps",
                UVec2::splat(params.shadow.resolution()),
                params.cascades,
                DEPTH_FORMAT,
                TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
            ))?);
        }

        if facet.uniforms.is_none() {
            facet.uniforms = Some(renderer.create_buffer(&BufferDescriptor::uniforms(
                "sun light uniforms",
                UNIFORM_FLOATS,
            ))?);
        }
        ok()
    }

    fn derive(&self, _kind: EntityKind, data: &SunLightData, transform: &Transform, facet: &mut SunLightFacet) {
        let direction = (transform.rotation() * data.direction).normalize_or_zero();
        facet.direction = if direction == Vec3::ZERO {
            Vec3::NEG_Y
        } else {
            direction
        };
        facet.radiance = data.color * data.intensity;

        let up = if facet.direction.abs().y > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let center = transform.position();
        facet.cascade_view_proj = (0..data.cascade_count())
            .map(|cascade| {
                let extent = data.cascade_extent * CASCADE_SCALE.powi(cascade as i32);
                let eye = center - facet.direction * extent;
                let view = Mat4::look_to_rh(eye, facet.direction, up);
                let projection =
                    Mat4::orthographic_rh(-extent, extent, -extent, extent, 0.0, extent * 2.0);
                projection * view
            })
            .collect();
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("shadow_cascade", ShaderStage::Vertex)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &SunLightFacet) -> AnyResult {
        let Some(uniforms) = &facet.uniforms else {
            return ok();
        };
        let data = pack_floats(&[
            facet.direction.x,
            facet.direction.y,
            facet.direction.z,
            facet.cascade_view_proj.len() as f32,
            facet.radiance.x,
            facet.radiance.y,
            facet.radiance.z,
            0.0,
        ]);
        renderer.write_buffer(uniforms, 0, &data)?;
        ok()
    }

    fn on_exit(&mut self) {
        self.shader = None;
    }
}
