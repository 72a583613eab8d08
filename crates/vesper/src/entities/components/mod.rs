//! Transforms and the data facets game code attaches to entities
//!
//! Data facets are plain parameter bags. They're deserializable with defaults for every field,
//! so map files only need to spell out what differs.

#[doc(inline)]
pub use actor::*;
mod actor;

#[doc(inline)]
pub use camera::*;
mod camera;

#[doc(inline)]
pub use light::*;
mod light;

#[doc(inline)]
pub use material::*;
mod material;

#[doc(inline)]
pub use transform::*;
mod transform;
