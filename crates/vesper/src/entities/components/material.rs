use crate::entities::Component;
use glam::*;
use serde::Deserialize;

/// Surface description shared by any number of actors.
///
/// Materials are standalone components, not entity facets. Actors refer to them by handle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaterialComponent {
    pub name: String,
    pub albedo: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    /// Size of the albedo texture. A zero size means no texture.
    pub texture_size: UVec2,
}

impl Component for MaterialComponent {}

impl Default for MaterialComponent {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: Vec4::ONE,
            roughness: 0.5,
            metallic: 0.0,
            texture_size: UVec2::ZERO,
        }
    }
}
