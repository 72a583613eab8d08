use crate::entities::Component;
use glam::*;
use serde::Deserialize;

/// Smallest shadow map edge a light can ask for.
pub const MIN_SHADOW_RESOLUTION: u32 = 16;
/// Largest shadow map edge a light can ask for.
pub const MAX_SHADOW_RESOLUTION: u32 = 4096;
/// Upper bound on sun shadow cascades.
pub const MAX_CASCADES: u32 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowKind {
    None,
    #[default]
    Hard,
    /// Hard shadows plus a filtered moments map.
    Soft,
}

/// Shadow parameters shared by every shadow casting light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub kind: ShadowKind,
    /// Requested shadow map edge, in texels.
    pub quality: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            kind: ShadowKind::Hard,
            quality: 256,
        }
    }
}

impl ShadowSettings {
    pub const DISABLED: Self = Self {
        kind: ShadowKind::None,
        quality: 0,
    };

    #[inline]
    pub fn casts_shadows(&self) -> bool {
        self.kind != ShadowKind::None
    }

    /// Shadow map edge actually used: the quality rounded up to a power of two and clamped.
    pub fn resolution(&self) -> u32 {
        self.quality
            .max(1)
            .next_power_of_two()
            .clamp(MIN_SHADOW_RESOLUTION, MAX_SHADOW_RESOLUTION)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PointLightData {
    pub color: Vec3,
    pub intensity: f32,
    /// Distance at which the light's contribution reaches zero.
    pub radius: f32,
    pub shadow: ShadowSettings,
}

impl Component for PointLightData {}

impl Default for PointLightData {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            shadow: ShadowSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SunLightData {
    pub color: Vec3,
    pub intensity: f32,
    /// Direction the light travels in, before the entity's rotation is applied.
    pub direction: Vec3,
    pub cascades: u32,
    /// World space extent covered by the first cascade. Each further cascade covers 4x more.
    pub cascade_extent: f32,
    pub shadow: ShadowSettings,
}

impl Component for SunLightData {}

impl Default for SunLightData {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 3.0,
            direction: Vec3::NEG_Y,
            cascades: 3,
            cascade_extent: 10.0,
            shadow: ShadowSettings {
                kind: ShadowKind::Hard,
                quality: 1024,
            },
        }
    }
}

impl SunLightData {
    /// Cascade count, clamped to what the renderer supports.
    pub fn cascade_count(&self) -> u32 {
        self.cascades.clamp(1, MAX_CASCADES)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AreaLightData {
    pub color: Vec3,
    pub intensity: f32,
    /// Width and height of the emitting rectangle.
    pub size: Vec2,
    pub two_sided: bool,
    pub shadow: ShadowSettings,
}

impl Component for AreaLightData {}

impl Default for AreaLightData {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            size: Vec2::ONE,
            two_sided: false,
            shadow: ShadowSettings::DISABLED,
        }
    }
}

/// Parameters of a global light probe, capturing the environment around its position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightProbeData {
    /// Edge of each environment cube face, in texels.
    pub resolution: u32,
    pub near: f32,
    pub far: f32,
}

impl Component for LightProbeData {}

impl Default for LightProbeData {
    fn default() -> Self {
        Self {
            resolution: 128,
            near: 0.1,
            far: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_resolution_is_a_clamped_power_of_two() {
        let with_quality = |quality| ShadowSettings {
            kind: ShadowKind::Hard,
            quality,
        };
        assert_eq!(with_quality(256).resolution(), 256);
        assert_eq!(with_quality(1000).resolution(), 1024);
        assert_eq!(with_quality(0).resolution(), MIN_SHADOW_RESOLUTION);
        assert_eq!(with_quality(100_000).resolution(), MAX_SHADOW_RESOLUTION);
    }

    #[test]
    fn light_data_deserializes_with_defaults() {
        let data: PointLightData =
            toml::from_str("intensity = 4.0\nshadow = { kind = \"soft\", quality = 512 }").unwrap();
        assert_eq!(data.intensity, 4.0);
        assert_eq!(data.radius, PointLightData::default().radius);
        assert_eq!(data.shadow.kind, ShadowKind::Soft);
        assert_eq!(data.shadow.quality, 512);

        let sun: SunLightData = toml::from_str("cascades = 9").unwrap();
        assert_eq!(sun.cascade_count(), MAX_CASCADES);
    }
}
