use super::{BufferDescriptor, GraphicsError, ShaderDescriptor, TextureDescriptor};
use serde::Deserialize;
use vesper_utils::AnyResult;

/// Which [`RenderBackend`] the engine renders with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Headless,
    /// A wgpu device. Only available with the `wgpu` feature.
    Wgpu,
}

/// Creates a backend of the given kind.
pub fn create_backend(kind: BackendKind) -> AnyResult<Box<dyn RenderBackend>> {
    let backend: Box<dyn RenderBackend> = match kind {
        BackendKind::Headless => Box::new(HeadlessBackend),
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu => Box::new(super::WgpuBackend::new()?),
        #[cfg(not(feature = "wgpu"))]
        BackendKind::Wgpu => anyhow::bail!("Vesper was built without the `wgpu` feature"),
    };
    Ok(backend)
}

/// Creates the backend objects behind renderer resources.
///
/// The [`super::Renderer`] validates descriptors and accounts memory, backends only create.
pub trait RenderBackend {
    fn name(&self) -> &'static str;
    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<RawTexture, GraphicsError>;
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<RawBuffer, GraphicsError>;
    fn create_shader(&mut self, desc: &ShaderDescriptor) -> Result<RawShader, GraphicsError>;
    fn write_buffer(&mut self, buffer: &mut RawBuffer, offset: u64, data: &[u8]);
}

pub enum RawTexture {
    Headless,
    #[cfg(feature = "wgpu")]
    Wgpu {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

pub enum RawBuffer {
    /// CPU side copy of the contents.
    Headless(Vec<u8>),
    #[cfg(feature = "wgpu")]
    Wgpu(wgpu::Buffer),
}

impl RawBuffer {
    pub fn contents(&self) -> Option<&[u8]> {
        match self {
            RawBuffer::Headless(bytes) => Some(bytes),
            #[cfg(feature = "wgpu")]
            RawBuffer::Wgpu(_) => None,
        }
    }
}

pub enum RawShader {
    Headless,
    #[cfg(feature = "wgpu")]
    Wgpu(wgpu::ShaderModule),
}

/// Backend without a GPU. Buffers are plain byte vectors, textures and shaders are bookkeeping
/// only. Used by tests and by the headless runner.
#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_texture(&mut self, _desc: &TextureDescriptor) -> Result<RawTexture, GraphicsError> {
        Ok(RawTexture::Headless)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<RawBuffer, GraphicsError> {
        Ok(RawBuffer::Headless(vec![0; desc.size as usize]))
    }

    fn create_shader(&mut self, _desc: &ShaderDescriptor) -> Result<RawShader, GraphicsError> {
        Ok(RawShader::Headless)
    }

    fn write_buffer(&mut self, buffer: &mut RawBuffer, offset: u64, data: &[u8]) {
        match buffer {
            RawBuffer::Headless(bytes) => {
                let offset = offset as usize;
                bytes[offset..offset + data.len()].copy_from_slice(data);
            }
            #[cfg(feature = "wgpu")]
            RawBuffer::Wgpu(_) => unreachable!("wgpu buffer written through the headless backend"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_backend_is_always_available() {
        let backend = create_backend(BackendKind::Headless).unwrap();
        assert_eq!(backend.name(), "headless");
    }

    #[cfg(not(feature = "wgpu"))]
    #[test]
    fn wgpu_needs_its_feature() {
        let error = create_backend(BackendKind::Wgpu).err().unwrap();
        assert!(error.to_string().contains("`wgpu` feature"));
    }
}
