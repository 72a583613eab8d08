#[doc(inline)]
pub use buffer::*;
mod buffer;

#[doc(inline)]
pub use shader::*;
mod shader;

#[doc(inline)]
pub use texture::*;
mod texture;
