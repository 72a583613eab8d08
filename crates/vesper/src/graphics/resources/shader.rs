use crate::graphics::{GraphicsError, RawShader, Renderer};
use log::*;
use std::fs;
use vesper_utils::ArcPoolHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(in crate::graphics) ArcPoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// WGSL attribute marking an entry point of this stage.
    pub fn entry_attribute(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "@vertex",
            ShaderStage::Fragment => "@fragment",
            ShaderStage::Compute => "@compute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDescriptor {
    pub name: String,
    pub stage: ShaderStage,
    pub source: String,
}

pub struct ShaderResource {
    pub name: String,
    pub stage: ShaderStage,
    pub(in crate::graphics) raw: RawShader,
}

impl ShaderResource {
    pub fn new(r: &mut Renderer, desc: &ShaderDescriptor) -> Result<Self, GraphicsError> {
        if !desc.source.contains(desc.stage.entry_attribute()) {
            return Err(GraphicsError::ShaderCompile {
                name: desc.name.clone(),
                message: format!("no {} entry point", desc.stage.entry_attribute()),
            });
        }

        Ok(Self {
            name: desc.name.clone(),
            stage: desc.stage,
            raw: r.backend.create_shader(desc)?,
        })
    }
}

/// Shader functions
impl Renderer {
    /// Loads `<shader root>/<name>.wgsl`, or returns the already loaded shader of that name.
    pub fn load_shader(
        &mut self,
        name: &str,
        stage: ShaderStage,
    ) -> Result<ShaderHandle, GraphicsError> {
        if let Some(handle) = self.shader_cache.get(name) {
            return Ok(handle.clone());
        }

        let path = self.shader_root.join(format!("{name}.wgsl"));
        let source = fs::read_to_string(&path).map_err(|source| GraphicsError::ShaderNotFound {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;

        let handle = self.create_shader(&ShaderDescriptor {
            name: name.to_string(),
            stage,
            source,
        })?;
        debug!("loaded shader `{name}` from {}", path.display());

        self.shader_cache.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn is_shader_loaded(&self, name: &str) -> bool {
        self.shader_cache.contains_key(name)
    }

    /// Forgets every cached shader. Shaders still referenced elsewhere stay alive.
    pub fn clear_shader_cache(&mut self) {
        self.shader_cache.clear();
    }
}
