use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("shader `{name}` couldn't be read from {}", path.display())]
    ShaderNotFound {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("shader `{name}` is invalid: {message}")]
    ShaderCompile { name: String, message: String },
    #[error("`{label}` needs {requested} bytes, but only {available} of the {budget} byte budget are left")]
    OutOfMemory {
        label: String,
        requested: u64,
        available: u64,
        budget: u64,
    },
    #[error("invalid descriptor for `{label}`: {reason}")]
    InvalidDescriptor { label: String, reason: &'static str },
    #[error("invalid write into `{label}`: {reason}")]
    InvalidWrite { label: String, reason: String },
    #[error("{feature} isn't supported by the {backend} backend")]
    Unsupported {
        feature: &'static str,
        backend: &'static str,
    },
    #[error("backend error: {0}")]
    Backend(String),
}
