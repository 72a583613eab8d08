use super::{
    BufferDescriptor, BufferHandle, BufferResource, GraphicsError, HeadlessBackend, RenderBackend,
    ShaderDescriptor, ShaderHandle, ShaderResource, TextureDescriptor, TextureHandle,
    TextureResource,
};
use ahash::AHashMap;
use log::*;
use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
};
use vesper_utils::ArcPool;

pub type SharedRenderer = Rc<RefCell<Renderer>>;

/// Settings a [`Renderer`] is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererDescriptor {
    /// Directory shaders are loaded from.
    pub shader_root: PathBuf,
    /// Upper bound on texture and buffer memory, in bytes. [`None`] means unlimited.
    pub memory_budget: Option<u64>,
    pub pool_growth: u32,
}

impl RendererDescriptor {
    pub fn new(shader_root: impl Into<PathBuf>) -> Self {
        Self {
            shader_root: shader_root.into(),
            memory_budget: None,
            pool_growth: 16,
        }
    }
}

/// Public interface to the renderer API. It owns various renderer resources stored within dedicated
/// pools.
///
/// Resources are accessed through reference counted handles. Once the last handle of a resource
/// is dropped, the resource stops counting against the memory budget, and it's released by the
/// next [`Renderer::collect_garbage`].
pub struct Renderer {
    pub(in crate::graphics) backend: Box<dyn RenderBackend>,

    pub textures: Textures,
    pub buffers: Buffers,
    pub shaders: Shaders,

    pub(in crate::graphics) shader_root: PathBuf,
    /// Loaded shaders by name, see [`Renderer::load_shader`].
    pub(in crate::graphics) shader_cache: AHashMap<String, ShaderHandle>,
    memory_budget: Option<u64>,
}

/// Common & miscellaneous functions
impl Renderer {
    pub fn new(backend: Box<dyn RenderBackend>, desc: &RendererDescriptor) -> Self {
        info!(
            "creating a {} renderer (shaders: {}, budget: {})",
            backend.name(),
            desc.shader_root.display(),
            desc.memory_budget
                .map_or_else(|| "unlimited".to_string(), |budget| format!("{budget} bytes"))
        );

        Self {
            backend,
            textures: Textures::with_growth_size(desc.pool_growth),
            buffers: Buffers::with_growth_size(desc.pool_growth),
            shaders: Shaders::with_growth_size(desc.pool_growth),
            shader_root: desc.shader_root.clone(),
            shader_cache: AHashMap::with_capacity(16),
            memory_budget: desc.memory_budget,
        }
    }

    pub fn headless(desc: &RendererDescriptor) -> Self {
        Self::new(Box::new(HeadlessBackend), desc)
    }

    pub fn into_shared(self) -> SharedRenderer {
        Rc::new(RefCell::new(self))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn shader_root(&self) -> &Path {
        &self.shader_root
    }

    pub fn memory_budget(&self) -> Option<u64> {
        self.memory_budget
    }

    /// Bytes taken by live textures and buffers.
    pub fn memory_in_use(&self) -> u64 {
        let textures: u64 = self.textures.iter().map(|texture| texture.byte_size).sum();
        let buffers: u64 = self.buffers.iter().map(|buffer| buffer.desc.size).sum();
        textures + buffers
    }

    /// Checks whether `bytes` more fit in the memory budget.
    pub(in crate::graphics) fn reserve_memory(
        &mut self,
        label: &str,
        bytes: u64,
    ) -> Result<(), GraphicsError> {
        let Some(budget) = self.memory_budget else {
            return Ok(());
        };

        let in_use = self.memory_in_use();
        if in_use.saturating_add(bytes) <= budget {
            return Ok(());
        }

        warn!("`{label}` doesn't fit in the memory budget ({in_use} + {bytes} > {budget})");
        Err(GraphicsError::OutOfMemory {
            label: label.to_string(),
            requested: bytes,
            available: budget.saturating_sub(in_use),
            budget,
        })
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            textures: self.textures.count_elements(),
            buffers: self.buffers.count_elements(),
            shaders: self.shaders.count_elements(),
            textures_created: self.textures.created,
            buffers_created: self.buffers.created,
            memory_in_use: self.memory_in_use(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub textures: usize,
    pub buffers: usize,
    pub shaders: usize,
    pub textures_created: u64,
    pub buffers_created: u64,
    pub memory_in_use: u64,
}

// boilerplate generator 666
macro_rules! resources {
    ($({ $Name:ident $field:ident $singular:ident : $Resource:ty, $Handle:ident, $Descriptor:ty })*) => {
        ::paste::paste! {
            $(
                pub struct $Name {
                    pub raw_pool: ArcPool<$Resource>,
                    /// Amount of resources ever created.
                    pub created: u64,
                }

                impl $Name {
                    fn with_growth_size(size: u32) -> Self {
                        Self {
                            raw_pool: ArcPool::with_growth_size(size),
                            created: 0,
                        }
                    }

                    pub fn get(&self, handle: &$Handle) -> &$Resource {
                        self.raw_pool.get(&handle.0)
                    }

                    pub fn get_mut(&mut self, handle: &$Handle) -> &mut $Resource {
                        self.raw_pool.get_mut(&handle.0)
                    }

                    pub fn collect_garbage(&mut self) -> u32 {
                        self.raw_pool.collect_garbage()
                    }

                    pub fn iter(&self) -> impl Iterator<Item = &$Resource> {
                        self.raw_pool.iter()
                    }

                    pub fn iter_handles(&self) -> impl Iterator<Item = (&$Resource, $Handle)> {
                        self.raw_pool
                            .iter_handles()
                            .map(|(value, handle)| (value, $Handle(handle)))
                    }

                    /// Amount of live resources.
                    pub fn count_elements(&self) -> usize {
                        self.raw_pool.count_live()
                    }

                    /// Amount of occupied slots, including released resources not collected yet.
                    pub fn count_occupied(&self) -> usize {
                        self.raw_pool.count_occupied()
                    }
                }

                impl Renderer {
                    pub fn [<create_ $singular>](&mut self, desc: &$Descriptor) -> Result<$Handle, GraphicsError> {
                        let resource = <$Resource>::new(self, desc)?;
                        self.$field.created += 1;
                        Ok($Handle(self.$field.raw_pool.allocate(resource)))
                    }
                }
            )*

            impl Renderer {
                /// Releases every resource without live handles. Returns the amount released.
                pub fn collect_garbage(&mut self) -> u32 {
                    let freed = 0 $( + self.$field.collect_garbage() )*;
                    if freed > 0 {
                        trace!("released {freed} renderer resources");
                    }
                    freed
                }
            }
        }
    };
}

resources! {
    { Textures textures texture : TextureResource, TextureHandle, TextureDescriptor }
    { Buffers  buffers  buffer  : BufferResource,  BufferHandle,  BufferDescriptor  }
    { Shaders  shaders  shader  : ShaderResource,  ShaderHandle,  ShaderDescriptor  }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{BufferUsages, ShaderStage, TextureFormat, TextureUsages};
    use crate::testing;
    use glam::UVec2;
    use vesper_utils::unpack_floats;

    fn small_texture(label: &str) -> TextureDescriptor {
        TextureDescriptor::new_2d(
            label,
            UVec2::splat(16),
            TextureFormat::Rgba8Unorm,
            TextureUsages::SAMPLED,
        )
    }

    #[test]
    fn released_resources_are_collected() {
        let mut renderer = testing::renderer();
        let kept = renderer.create_texture(&small_texture("kept")).unwrap();
        let dropped = renderer.create_texture(&small_texture("dropped")).unwrap();
        assert_eq!(renderer.memory_in_use(), 2 * 16 * 16 * 4);

        drop(dropped);
        assert_eq!(renderer.memory_in_use(), 16 * 16 * 4);
        assert_eq!(renderer.textures.count_occupied(), 2);
        assert_eq!(renderer.collect_garbage(), 1);
        assert_eq!(renderer.textures.count_occupied(), 1);
        assert_eq!(renderer.textures.get(&kept).desc.label, "kept");
    }

    #[test]
    fn budget_is_enforced() {
        let mut desc = testing::renderer_descriptor();
        desc.memory_budget = Some(16 * 16 * 4);
        let mut renderer = Renderer::headless(&desc);

        let first = renderer.create_texture(&small_texture("first")).unwrap();
        let error = renderer.create_texture(&small_texture("second")).err();
        assert!(matches!(
            error,
            Some(GraphicsError::OutOfMemory { available: 0, .. })
        ));

        // Releasing the first one frees up the budget
        drop(first);
        assert!(renderer.create_texture(&small_texture("third")).is_ok());
    }

    #[test]
    fn buffer_writes_are_checked() {
        let mut renderer = testing::renderer();
        let buffer = renderer
            .create_buffer(&BufferDescriptor::uniforms("uniforms", 4))
            .unwrap();
        let readonly = renderer
            .create_buffer(&BufferDescriptor::new("vertices", 64, BufferUsages::VERTEX))
            .unwrap();

        renderer
            .write_buffer(&buffer, 4, &vesper_utils::pack_floats(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(
            unpack_floats(renderer.buffer_contents(&buffer).unwrap()),
            [0.0, 1.0, 2.0, 0.0]
        );

        assert!(renderer.write_buffer(&buffer, 8, &[0; 12]).is_err());
        assert!(renderer.write_buffer(&buffer, 2, &[0; 4]).is_err());
        assert!(renderer.write_buffer(&readonly, 0, &[0; 4]).is_err());
    }

    #[test]
    fn shaders_are_loaded_once() {
        let mut renderer = testing::renderer();
        let first = renderer
            .load_shader("shadow_cube", ShaderStage::Vertex)
            .unwrap();
        let second = renderer
            .load_shader("shadow_cube", ShaderStage::Vertex)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(renderer.shaders.created, 1);
        assert!(renderer.is_shader_loaded("shadow_cube"));
    }

    #[test]
    fn missing_shaders_are_reported() {
        let mut renderer = testing::renderer();
        let error = renderer
            .load_shader("does_not_exist", ShaderStage::Fragment)
            .err();
        assert!(matches!(error, Some(GraphicsError::ShaderNotFound { .. })));
        assert!(!renderer.is_shader_loaded("does_not_exist"));
    }

    #[test]
    fn shaders_need_a_matching_entry_point() {
        let mut renderer = testing::renderer();
        let error = renderer
            .create_shader(&ShaderDescriptor {
                name: "broken".into(),
                stage: ShaderStage::Compute,
                source: "@vertex fn main() {}".into(),
            })
            .err();
        assert!(matches!(error, Some(GraphicsError::ShaderCompile { .. })));
    }
}
