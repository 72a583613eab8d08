use crate::{config::EngineConfig, graphics::BackendKind};
use clap::Parser;
use std::path::PathBuf;

/// User-specified command line parameters
#[derive(Debug, Default, Parser)]
#[clap(name = "Vesper", version, about)]
pub struct Args {
    #[clap(long, short = 'c')]
    /// Path to a TOML configuration file.
    pub config: Option<PathBuf>,

    #[clap(long, short = 'm')]
    /// Map to play, overriding the one in the configuration.
    pub map: Option<PathBuf>,

    #[clap(long, short = 'f')]
    /// Amount of frames to play the map for.
    pub frames: Option<u64>,

    #[clap(long, value_enum)]
    /// Render backend, overriding the one in the configuration.
    pub backend: Option<BackendKind>,

    #[clap(long)]
    /// Periodically logs engine statistics while playing.
    pub debug: bool,

    #[clap(long)]
    /// Skips the intro frames.
    pub skip_intro: bool,

    #[clap(long)]
    /// Log filter in `RUST_LOG` syntax, like `debug` or `vesper::entities=trace`.
    pub log: Option<String>,
}

impl Args {
    /// Applies the arguments on top of a loaded configuration.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(map) = &self.map {
            config.app.map = Some(map.clone());
        }
        if let Some(frames) = self.frames {
            config.app.play_frames = frames;
        }
        if let Some(backend) = self.backend {
            config.renderer.backend = backend;
        }
        if let Some(log) = &self.log {
            config.log_level = log.clone();
        }
        config.app.debug |= self.debug;
        config.app.skip_intro |= self.skip_intro;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_override_the_config() {
        let args = Args::parse_from(["vesper", "--map", "maps/test.toml", "-f", "10", "--debug"]);
        let mut config = EngineConfig::default();
        config.app.play_frames = 100;
        args.apply(&mut config);

        assert_eq!(config.app.map, Some(PathBuf::from("maps/test.toml")));
        assert_eq!(config.app.play_frames, 10);
        assert!(config.app.debug);
        assert!(!config.app.skip_intro);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.renderer.backend, BackendKind::Headless);
    }

    #[test]
    fn backend_can_be_picked() {
        let args = Args::parse_from(["vesper", "--backend", "wgpu"]);
        let mut config = EngineConfig::default();
        args.apply(&mut config);
        assert_eq!(config.renderer.backend, BackendKind::Wgpu);

        assert!(Args::try_parse_from(["vesper", "--backend", "metal"]).is_err());
    }

    #[test]
    fn missing_arguments_keep_the_config() {
        let mut config = EngineConfig::default();
        config.app.debug = true;
        Args::parse_from(["vesper"]).apply(&mut config);
        assert_eq!(config, EngineConfig {
            app: crate::config::AppConfig {
                debug: true,
                ..Default::default()
            },
            ..Default::default()
        });
    }
}
