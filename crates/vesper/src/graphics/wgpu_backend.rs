use super::{
    BufferDescriptor, BufferUsages, GraphicsError, RawBuffer, RawShader, RawTexture,
    RenderBackend, ShaderDescriptor, TextureDescriptor, TextureDimension,
    TextureFormat, TextureUsages,
};
use log::*;
use pollster::FutureExt;
use std::borrow::Cow;
use vesper_utils::{AnyResult, AnyhowResultExt};

/// Hardware backend. Resources are created on a wgpu device without a surface.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    pub fn new() -> AnyResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .block_on()
            .otherwise("couldn't find a GPU")?;

        let info = adapter.get_info();
        info!("GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Vesper device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .block_on()
            .otherwise("couldn't initialize the device")?;

        Ok(Self { device, queue })
    }

    /// Runs `f` inside a validation error scope, turning validation failures into errors.
    fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, GraphicsError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match self.device.pop_error_scope().block_on() {
            Some(error) => Err(GraphicsError::Backend(error.to_string())),
            None => Ok(value),
        }
    }
}

fn convert_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn convert_texture_usages(usage: TextureUsages) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsages::SAMPLED) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsages::RENDER_TARGET) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsages::STORAGE) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsages::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    result
}

fn convert_buffer_usages(usage: BufferUsages) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsages::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsages::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsages::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsages::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsages::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    result
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> Result<RawTexture, GraphicsError> {
        let format = convert_format(desc.format);
        let texture = self.validated(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&desc.label),
                size: wgpu::Extent3d {
                    width: desc.size.x,
                    height: desc.size.y,
                    depth_or_array_layers: desc.layers,
                },
                mip_level_count: desc.mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: convert_texture_usages(desc.usage),
                view_formats: &[format],
            })
        })?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            format: Some(format),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });

        Ok(RawTexture::Wgpu { texture, view })
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<RawBuffer, GraphicsError> {
        let buffer = self.validated(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size: desc.size,
                usage: convert_buffer_usages(desc.usage),
                mapped_at_creation: false,
            })
        })?;
        Ok(RawBuffer::Wgpu(buffer))
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> Result<RawShader, GraphicsError> {
        trace!("compiling {:?} shader `{}`", desc.stage, desc.name);
        let module = self
            .validated(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&desc.name),
                    source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&desc.source)),
                })
            })
            .map_err(|error| GraphicsError::ShaderCompile {
                name: desc.name.clone(),
                message: error.to_string(),
            })?;
        Ok(RawShader::Wgpu(module))
    }

    fn write_buffer(&mut self, buffer: &mut RawBuffer, offset: u64, data: &[u8]) {
        match buffer {
            RawBuffer::Wgpu(buffer) => self.queue.write_buffer(buffer, offset, data),
            RawBuffer::Headless(bytes) => {
                let offset = offset as usize;
                bytes[offset..offset + data.len()].copy_from_slice(data);
            }
        }
    }
}
