use super::{FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{PointLightData, ShadowKind, ShadowSettings, Transform},
        EntityKind, LightType,
    },
    graphics::{
        BufferDescriptor, BufferHandle, Renderer, ShaderHandle, ShaderStage, TextureDescriptor,
        TextureHandle, TextureUsages, DEPTH_FORMAT, MOMENTS_FORMAT,
    },
};
use glam::*;
use std::f32::consts::FRAC_PI_2;
use vesper_utils::{ok, pack_floats, AnyResult};

/// Near plane of the cube shadow projections.
const SHADOW_NEAR: f32 = 0.05;
/// Position + radius, radiance + shadow flag.
const UNIFORM_FLOATS: usize = 8;

/// View direction and up vector of each cube face, in the usual +X, -X, +Y, -Y, +Z, -Z order.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// View-projection matrices rendering the 6 faces of a cube map centered at `position`.
pub(in crate::graphics) fn cube_face_matrices(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, near, far.max(near * 2.0));
    CUBE_FACES.map(|(direction, up)| {
        projection * Mat4::look_to_rh(position, direction, up)
    })
}

#[derive(Default)]
pub struct PointLightFacet {
    pub shadow_map: Option<TextureHandle>,
    /// Filtered depth moments, only allocated for soft shadows.
    pub moments: Option<TextureHandle>,
    pub uniforms: Option<BufferHandle>,

    pub position: Vec3,
    pub radius: f32,
    pub radiance: Vec3,
    pub face_view_proj: [Mat4; 6],
}

#[derive(Default)]
pub struct PointLights {
    shader: Option<ShaderHandle>,
}

pub type PointLightManager = FacetManager<PointLights>;

impl FacetSubsystem for PointLights {
    type Data = PointLightData;
    type Facet = PointLightFacet;
    type Params = ShadowSettings;

    const LABEL: &'static str = "point lights";

    fn accepts(kind: EntityKind) -> bool {
        kind == EntityKind::Light(LightType::Point)
    }

    fn params(_kind: EntityKind, data: &PointLightData) -> ShadowSettings {
        data.shadow
    }

    fn rebuild(
        &mut self,
        renderer: &mut Renderer,
        shadow: &ShadowSettings,
        facet: &mut PointLightFacet,
    ) -> AnyResult {
        // Release the old maps first, so they don't count against the budget
        facet.shadow_map = None;
        facet.moments = None;

        if shadow.casts_shadows() {
            let edge = shadow.resolution();
            facet.shadow_map = Some(renderer.create_texture(&TextureDescriptor::cube(
                "point light shadow map",
                edge,
                DEPTH_FORMAT,
                TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
            ))?);

            if shadow.kind == ShadowKind::Soft {
                facet.moments = Some(renderer.create_texture(&TextureDescriptor::cube(
                    "point light shadow moments",
                    edge,
                    MOMENTS_FORMAT,
                    TextureUsages::RENDER_TARGET | TextureUsages::SAMPLED,
                ))?);
            }
        }

        if facet.uniforms.is_none() {
            facet.uniforms = Some(renderer.create_buffer(&BufferDescriptor::uniforms(
                "point light uniforms",
                UNIFORM_FLOATS,
            ))?);
        }
        ok()
    }

    fn derive(&self, _kind: EntityKind, data: &PointLightData, transform: &Transform, facet: &mut PointLightFacet) {
        facet.position = transform.position();
        facet.radius = data.radius.max(SHADOW_NEAR);
        facet.radiance = data.color * data.intensity;
        facet.face_view_proj = cube_face_matrices(facet.position, SHADOW_NEAR, facet.radius);
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("shadow_cube", ShaderStage::Vertex)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &PointLightFacet) -> AnyResult {
        let Some(uniforms) = &facet.uniforms else {
            return ok();
        };
        let shadowed = if facet.shadow_map.is_some() { 1.0 } else { 0.0 };
        let data = pack_floats(&[
            facet.position.x,
            facet.position.y,
            facet.position.z,
            facet.radius,
            facet.radiance.x,
            facet.radiance.y,
            facet.radiance.z,
            shadowed,
        ]);
        renderer.write_buffer(uniforms, 0, &data)?;
        ok()
    }

    fn is_renderable(facet: &PointLightFacet) -> bool {
        facet.radiance != Vec3::ZERO
    }

    fn on_exit(&mut self) {
        self.shader = None;
    }
}
