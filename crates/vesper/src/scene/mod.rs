//! Scene descriptions
//!
//! Maps are the only way content enters the engine for now. They go through the same contract as
//! any game code: loading creates entities and marks them `CREATE`, unloading destroys them.

#[doc(inline)]
pub use map::*;
mod map;
