use crate::graphics::{GraphicsError, RawBuffer, Renderer};
use bitflags::bitflags;
use vesper_utils::ArcPoolHandle;

/// Required alignment of buffer sizes, write offsets and write lengths.
pub const BUFFER_ALIGNMENT: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(in crate::graphics) ArcPoolHandle);

bitflags! {
    pub struct BufferUsages: u8 {
        const UNIFORM = 1 << 0;
        const VERTEX = 1 << 1;
        const INDEX = 1 << 2;
        const STORAGE = 1 << 3;
        const COPY_DST = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsages,
}

impl BufferDescriptor {
    pub fn new(label: impl Into<String>, size: u64, usage: BufferUsages) -> Self {
        Self {
            label: label.into(),
            size,
            usage,
        }
    }

    /// Uniform buffer large enough for `floats` values, writable from the CPU.
    pub fn uniforms(label: impl Into<String>, floats: usize) -> Self {
        Self::new(
            label,
            (floats * std::mem::size_of::<f32>()) as u64,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        )
    }

    pub fn validate(&self) -> Result<(), GraphicsError> {
        let reason = if self.size == 0 {
            "zero sized buffer"
        } else if self.size % BUFFER_ALIGNMENT != 0 {
            "buffer size isn't 4 byte aligned"
        } else if self.usage.is_empty() {
            "no usages"
        } else {
            return Ok(());
        };

        Err(GraphicsError::InvalidDescriptor {
            label: self.label.clone(),
            reason,
        })
    }
}

pub struct BufferResource {
    pub desc: BufferDescriptor,
    pub(in crate::graphics) raw: RawBuffer,
}

impl BufferResource {
    pub fn new(r: &mut Renderer, desc: &BufferDescriptor) -> Result<Self, GraphicsError> {
        desc.validate()?;
        r.reserve_memory(&desc.label, desc.size)?;

        Ok(Self {
            desc: desc.clone(),
            raw: r.backend.create_buffer(desc)?,
        })
    }
}

/// Buffer functions
impl Renderer {
    /// Uploads `data` into a buffer at `offset`. The buffer needs [`BufferUsages::COPY_DST`].
    pub fn write_buffer(
        &mut self,
        handle: &BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffer = self.buffers.get_mut(handle);
        let len = data.len() as u64;

        let reason = if !buffer.desc.usage.contains(BufferUsages::COPY_DST) {
            Some("buffer isn't writable".to_string())
        } else if offset % BUFFER_ALIGNMENT != 0 || len % BUFFER_ALIGNMENT != 0 {
            Some(format!("unaligned write of {len} bytes at {offset}"))
        } else if offset.checked_add(len).map_or(true, |end| end > buffer.desc.size) {
            Some(format!(
                "{len} bytes at {offset} overflow the {} byte buffer",
                buffer.desc.size
            ))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(GraphicsError::InvalidWrite {
                label: buffer.desc.label.clone(),
                reason,
            });
        }

        self.backend.write_buffer(&mut buffer.raw, offset, data);
        Ok(())
    }

    /// CPU side copy of a buffer's contents. Only available with backends that keep one.
    pub fn buffer_contents(&self, handle: &BufferHandle) -> Option<&[u8]> {
        self.buffers.get(handle).raw.contents()
    }
}
