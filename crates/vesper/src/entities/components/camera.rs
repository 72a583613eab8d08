use crate::entities::Component;
use glam::*;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraData {
    /// Vertical field of view of perspective cameras, in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Size of the camera's render target, in pixels.
    pub target_size: UVec2,
    /// Vertical extent of orthographic cameras, in world units.
    pub ortho_height: f32,
}

impl Component for CameraData {}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            target_size: UVec2::new(1280, 720),
            ortho_height: 10.0,
        }
    }
}

impl CameraData {
    pub fn aspect_ratio(&self) -> f32 {
        self.target_size.x.max(1) as f32 / self.target_size.y.max(1) as f32
    }
}
