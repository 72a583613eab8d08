//! Vesper engine core
//!
//! Game state lives in a [`entities::Universe`] as entities with typed facets. Whenever game code
//! changes an entity it marks it dirty, and every registered handler, like the graphic managers
//! in [`graphics::managers`], brings its own state up to date right away. The [`engine::Engine`]
//! ties the universe, the renderer and the managers together.

pub mod cli;
pub mod config;
pub mod engine;
pub mod entities;
pub mod graphics;
pub mod scene;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) mod testing {
    use crate::graphics::{Renderer, RendererDescriptor};

    /// Descriptor pointing at the crate's own shaders.
    pub fn renderer_descriptor() -> RendererDescriptor {
        RendererDescriptor::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/shaders"))
    }

    pub fn renderer() -> Renderer {
        Renderer::headless(&renderer_descriptor())
    }
}
