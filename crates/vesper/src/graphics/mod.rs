//! Vesper graphics layer
//!
//! The graphics layer is split into two parts.
//!
//! ## [`Renderer`]
//! The renderer is the API entrypoint for creating render resources, like textures, buffers and
//! shaders. Resources are accessed via dedicated handles, which point to a shared reference count.
//! Once a handle loses its last reference, the underlying resource is released. The actual
//! backend objects come from a [`RenderBackend`]: the [`HeadlessBackend`] always, and a wgpu
//! device with the `wgpu` feature.
//!
//! ## [`managers`]
//! Managers keep graphic facets in sync with entities. Each of them is a
//! [`crate::entities::DirtyHandler`] registered with the universe: whenever an entity of a kind it
//! cares about is marked dirty, the manager (re)builds the entity's graphic facet, using a
//! [`RebuildGate`] to skip expensive work the change doesn't require. Once a frame, each manager
//! also refreshes per-frame state and collects its render jobs into a [`FrameState`].

pub mod managers;

#[doc(inline)]
pub use backend::*;
mod backend;

#[doc(inline)]
pub use error::*;
mod error;

#[doc(inline)]
pub use frame_state::*;
mod frame_state;

#[doc(inline)]
pub use interface::*;
mod interface;

#[doc(inline)]
pub use rebuild::*;
mod rebuild;

#[doc(inline)]
pub use resources::*;
mod resources;

#[cfg(feature = "wgpu")]
#[doc(inline)]
pub use wgpu_backend::*;
#[cfg(feature = "wgpu")]
mod wgpu_backend;

/// Format used by camera color targets.
pub const RENDER_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Format used by depth targets and shadow maps.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
/// Format used by soft shadow moment maps.
pub const MOMENTS_FORMAT: TextureFormat = TextureFormat::Rg32Float;
