use super::{FacetManager, FacetSubsystem};
use crate::{
    entities::{
        components::{ActorData, Transform},
        ActorType, EntityKind,
    },
    graphics::{
        BufferDescriptor, BufferHandle, BufferUsages, Renderer, ShaderHandle, ShaderStage,
    },
};
use glam::*;
use vesper_utils::{ok, pack_floats, AnyResult, PoolHandle};

/// Position, normal, UV and tangent sign, all as 32-bit floats.
pub const VERTEX_STRIDE: u64 = 32;
pub const INDEX_SIZE: u64 = 4;
/// One 4x4 matrix per bone.
pub const BONE_SIZE: u64 = 64;

/// Everything an actor's GPU buffers depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorGeometry {
    pub vertex_count: u32,
    pub index_count: u32,
    pub bone_count: u32,
}

#[derive(Default)]
pub struct ActorFacet {
    pub vertex_buffer: Option<BufferHandle>,
    pub index_buffer: Option<BufferHandle>,
    pub bone_buffer: Option<BufferHandle>,
    pub instance_uniforms: Option<BufferHandle>,

    pub world: Mat4,
    pub material: Option<PoolHandle>,
    pub visible: bool,
}

#[derive(Default)]
pub struct Actors {
    shader: Option<ShaderHandle>,
}

pub type ActorManager = FacetManager<Actors>;

fn optional_buffer(
    renderer: &mut Renderer,
    label: &str,
    size: u64,
    usage: BufferUsages,
) -> AnyResult<Option<BufferHandle>> {
    if size == 0 {
        return Ok(None);
    }
    Ok(Some(renderer.create_buffer(&BufferDescriptor::new(label, size, usage))?))
}

impl FacetSubsystem for Actors {
    type Data = ActorData;
    type Facet = ActorFacet;
    type Params = ActorGeometry;

    const LABEL: &'static str = "actors";

    fn accepts(kind: EntityKind) -> bool {
        matches!(kind, EntityKind::Actor(_))
    }

    fn params(kind: EntityKind, data: &ActorData) -> ActorGeometry {
        ActorGeometry {
            vertex_count: data.mesh.vertex_count,
            index_count: data.mesh.index_count,
            bone_count: match kind {
                EntityKind::Actor(ActorType::Skinned) => data.bone_count,
                _ => 0,
            },
        }
    }

    fn rebuild(&mut self, renderer: &mut Renderer, geometry: &ActorGeometry, facet: &mut ActorFacet) -> AnyResult {
        facet.vertex_buffer = None;
        facet.index_buffer = None;
        facet.bone_buffer = None;

        facet.vertex_buffer = optional_buffer(
            renderer,
            "actor vertices",
            geometry.vertex_count as u64 * VERTEX_STRIDE,
            BufferUsages::VERTEX | BufferUsages::COPY_DST,
        )?;
        facet.index_buffer = optional_buffer(
            renderer,
            "actor indices",
            geometry.index_count as u64 * INDEX_SIZE,
            BufferUsages::INDEX | BufferUsages::COPY_DST,
        )?;
        facet.bone_buffer = optional_buffer(
            renderer,
            "actor bones",
            geometry.bone_count as u64 * BONE_SIZE,
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
        )?;

        if facet.instance_uniforms.is_none() {
            facet.instance_uniforms = Some(
                renderer.create_buffer(&BufferDescriptor::uniforms("actor instance", 16))?,
            );
        }
        ok()
    }

    fn derive(&self, _kind: EntityKind, data: &ActorData, transform: &Transform, facet: &mut ActorFacet) {
        facet.world = transform.as_mat4();
        facet.material = data.material;
        facet.visible = data.visible;
    }

    fn on_start(&mut self, renderer: &mut Renderer) -> AnyResult {
        self.shader = Some(renderer.load_shader("mesh", ShaderStage::Vertex)?);
        ok()
    }

    fn prepare(&mut self, renderer: &mut Renderer, facet: &ActorFacet) -> AnyResult {
        if let Some(uniforms) = &facet.instance_uniforms {
            renderer.write_buffer(uniforms, 0, &pack_floats(&facet.world.to_cols_array()))?;
        }
        ok()
    }

    fn is_renderable(facet: &ActorFacet) -> bool {
        facet.visible && facet.vertex_buffer.is_some()
    }

    fn on_exit(&mut self) {
        self.shader = None;
    }
}
