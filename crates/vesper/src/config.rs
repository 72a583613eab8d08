//! Engine configuration
//!
//! The configuration is a TOML file, where every section and field is optional. Command line
//! arguments are applied on top of it, see [`crate::cli::Args::apply`].
//!
//! ```toml
//! log_level = "debug"
//!
//! [renderer]
//! backend = "headless"
//! shader_root = "assets/shaders"
//! memory_budget = 268435456
//!
//! [pools]
//! point_lights = 128
//!
//! [app]
//! map = "assets/maps/demo.toml"
//! play_frames = 300
//! ```

use crate::graphics::{BackendKind, RendererDescriptor};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use vesper_utils::DEFAULT_PAGE_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config file `{path}`: `pools.{field}` can't be zero")]
    ZeroPoolSize { path: PathBuf, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter, in `RUST_LOG` syntax.
    pub log_level: String,
    pub renderer: RendererConfig,
    pub pools: PoolConfig,
    pub app: AppConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            renderer: RendererConfig::default(),
            pools: PoolConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses a config file already in memory. `path` is only used for error messages.
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

        if let Some(field) = config.pools.first_zero() {
            return Err(ConfigError::ZeroPoolSize {
                path: path.to_owned(),
                field,
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub backend: BackendKind,
    pub shader_root: PathBuf,
    /// Texture and buffer memory limit in bytes, unlimited if missing.
    pub memory_budget: Option<u64>,
    /// Growth step of the resource pools.
    pub pool_growth: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Headless,
            shader_root: "assets/shaders".into(),
            memory_budget: None,
            pool_growth: 16,
        }
    }
}

impl RendererConfig {
    pub fn descriptor(&self) -> RendererDescriptor {
        RendererDescriptor {
            shader_root: self.shader_root.clone(),
            memory_budget: self.memory_budget,
            pool_growth: self.pool_growth.max(1),
        }
    }
}

/// Page sizes of the engine's pools. They're capacity hints, pools grow past them as needed, but
/// none of them can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub entities: u32,
    pub components: u32,
    pub point_lights: u32,
    pub sun_lights: u32,
    pub area_lights: u32,
    pub light_probes: u32,
    pub actors: u32,
    pub cameras: u32,
    pub materials: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            entities: 256,
            components: DEFAULT_PAGE_SIZE,
            point_lights: DEFAULT_PAGE_SIZE,
            sun_lights: 4,
            area_lights: 16,
            light_probes: 4,
            actors: 256,
            cameras: 4,
            materials: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PoolConfig {
    /// Name of the first zero page size, if there's one.
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("entities", self.entities),
            ("components", self.components),
            ("point_lights", self.point_lights),
            ("sun_lights", self.sun_lights),
            ("area_lights", self.area_lights),
            ("light_probes", self.light_probes),
            ("actors", self.actors),
            ("cameras", self.cameras),
            ("materials", self.materials),
        ]
        .into_iter()
        .find_map(|(field, size)| (size == 0).then_some(field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Map loaded after the main menu. Without one, the application exits right away.
    pub map: Option<PathBuf>,
    pub skip_intro: bool,
    pub intro_frames: u32,
    /// Frames played before the map is unloaded.
    pub play_frames: u64,
    /// Whether to periodically enter the debug state.
    pub debug: bool,
    /// Frames between two debug reports.
    pub debug_frames: u64,
    /// Frames kept by the profiler.
    pub profiler_history: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            map: None,
            skip_intro: false,
            intro_frames: 3,
            play_frames: 600,
            debug: false,
            debug_frames: 120,
            profiler_history: 1000,
        }
    }
}
