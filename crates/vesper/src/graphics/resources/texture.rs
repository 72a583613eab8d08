use crate::graphics::{GraphicsError, RawTexture, Renderer};
use bitflags::bitflags;
use glam::*;
use vesper_utils::ArcPoolHandle;

/// Handle to a texture of any dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(in crate::graphics) ArcPoolHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rg32Float,
    R32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn bytes_per_texel(self) -> u64 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rg32Float => 8,
            TextureFormat::R32Float => 4,
            TextureFormat::Depth32Float => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        self == TextureFormat::Depth32Float
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D2Array,
    Cube,
}

bitflags! {
    pub struct TextureUsages: u8 {
        const SAMPLED = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const STORAGE = 1 << 2;
        const COPY_DST = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub size: UVec2,
    pub layers: u32,
    pub mip_levels: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

impl TextureDescriptor {
    pub fn new_2d(
        label: impl Into<String>,
        size: UVec2,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Self {
        Self {
            label: label.into(),
            size,
            layers: 1,
            mip_levels: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
        }
    }

    pub fn array(
        label: impl Into<String>,
        size: UVec2,
        layers: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Self {
        Self {
            layers,
            dimension: TextureDimension::D2Array,
            ..Self::new_2d(label, size, format, usage)
        }
    }

    pub fn cube(
        label: impl Into<String>,
        edge: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Self {
        Self {
            layers: 6,
            dimension: TextureDimension::Cube,
            ..Self::new_2d(label, UVec2::splat(edge), format, usage)
        }
    }

    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = Self::max_mip_levels(self.size);
        self
    }

    pub fn max_mip_levels(size: UVec2) -> u32 {
        u32::BITS - size.max_element().max(1).leading_zeros()
    }

    /// Memory taken by every layer and mip level.
    pub fn byte_size(&self) -> u64 {
        (0..self.mip_levels)
            .map(|mip| {
                let width = (self.size.x >> mip).max(1) as u64;
                let height = (self.size.y >> mip).max(1) as u64;
                width * height
            })
            .sum::<u64>()
            * self.layers as u64
            * self.format.bytes_per_texel()
    }

    pub fn validate(&self) -> Result<(), GraphicsError> {
        let reason = if self.size.min_element() == 0 {
            "zero sized texture"
        } else if self.layers == 0 {
            "no layers"
        } else if self.mip_levels == 0 || self.mip_levels > Self::max_mip_levels(self.size) {
            "invalid mip level count"
        } else if self.dimension == TextureDimension::Cube
            && (self.size.x != self.size.y || self.layers != 6)
        {
            "cube textures need 6 square layers"
        } else if self.dimension == TextureDimension::D2 && self.layers != 1 {
            "2D textures have exactly one layer"
        } else if self.usage.is_empty() {
            "no usages"
        } else if self.format.is_depth() && self.usage.contains(TextureUsages::STORAGE) {
            "depth textures can't be storage textures"
        } else {
            return Ok(());
        };

        Err(GraphicsError::InvalidDescriptor {
            label: self.label.clone(),
            reason,
        })
    }
}

pub struct TextureResource {
    pub desc: TextureDescriptor,
    pub byte_size: u64,
    pub(in crate::graphics) raw: RawTexture,
}

impl TextureResource {
    pub fn new(r: &mut Renderer, desc: &TextureDescriptor) -> Result<Self, GraphicsError> {
        desc.validate()?;
        let byte_size = desc.byte_size();
        r.reserve_memory(&desc.label, byte_size)?;

        Ok(Self {
            desc: desc.clone(),
            byte_size,
            raw: r.backend.create_texture(desc)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_covers_layers_and_mips() {
        let cube = TextureDescriptor::cube(
            "cube",
            256,
            TextureFormat::Depth32Float,
            TextureUsages::RENDER_TARGET,
        );
        assert_eq!(cube.byte_size(), 256 * 256 * 6 * 4);

        let mipped = TextureDescriptor::new_2d(
            "mipped",
            UVec2::new(4, 2),
            TextureFormat::Rgba8Unorm,
            TextureUsages::SAMPLED,
        )
        .with_full_mip_chain();
        assert_eq!(mipped.mip_levels, 3);
        assert_eq!(mipped.byte_size(), (8 + 2 + 1) * 4);
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        let mut cube = TextureDescriptor::cube(
            "cube",
            64,
            TextureFormat::Rgba16Float,
            TextureUsages::SAMPLED,
        );
        assert!(cube.validate().is_ok());

        cube.size.y = 32;
        assert!(matches!(
            cube.validate(),
            Err(GraphicsError::InvalidDescriptor { reason: "cube textures need 6 square layers", .. })
        ));

        let empty = TextureDescriptor::new_2d(
            "empty",
            UVec2::ZERO,
            TextureFormat::R32Float,
            TextureUsages::SAMPLED,
        );
        assert!(empty.validate().is_err());
    }
}
