use super::Engine;
use crate::{
    config::{AppConfig, EngineConfig},
    scene::{LoadedMap, MapDesc},
};
use anyhow::Context;
use log::*;
use vesper_utils::{ok, AnyResult, AnyhowResultExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Start,
    Intro,
    /// Aka. the menu
    MainMenu,
    LoadMap,
    Play,
    /// Statistics report, entered periodically while playing
    Debug,
    UnloadMap,
    Exit,
}

/// Headless application driving an [`Engine`] through its states.
pub struct Application {
    engine: Engine,
    config: AppConfig,
    /// Preloaded map, used instead of [`AppConfig::map`].
    map: Option<MapDesc>,
    loaded: Option<LoadedMap>,
    intro_left: u32,
    played: u64,
}

impl Application {
    pub fn new(config: &EngineConfig) -> AnyResult<Self> {
        Ok(Self::with_engine(Engine::from_config(config)?, config.app.clone()))
    }

    pub fn with_engine(engine: Engine, config: AppConfig) -> Self {
        Self {
            engine,
            intro_left: config.intro_frames,
            config,
            map: None,
            loaded: None,
            played: 0,
        }
    }

    pub fn with_map(mut self, map: MapDesc) -> Self {
        self.map = Some(map);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn loaded_map(&self) -> Option<&LoadedMap> {
        self.loaded.as_ref()
    }

    /// Frames played on the current map.
    pub fn played_frames(&self) -> u64 {
        self.played
    }

    /// Runs until [`AppState::Exit`] is processed.
    pub fn run(&mut self) -> AnyResult {
        let mut state = AppState::Start;
        loop {
            let next = self
                .step(state)
                .with_context(|| format!("failure in the {state:?} state"))?;
            if state == AppState::Exit {
                break;
            }
            if next != state {
                trace!("{state:?} -> {next:?}");
            }
            state = next;
        }
        ok()
    }

    /// Does the work of `state`, returning the state to go to next.
    pub fn step(&mut self, state: AppState) -> AnyResult<AppState> {
        Ok(match state {
            AppState::Start => {
                self.engine.start()?;
                if self.config.skip_intro || self.intro_left == 0 {
                    AppState::MainMenu
                } else {
                    AppState::Intro
                }
            }

            AppState::Intro => {
                self.engine.frame()?;
                self.intro_left = self.intro_left.saturating_sub(1);
                if self.intro_left == 0 {
                    AppState::MainMenu
                } else {
                    AppState::Intro
                }
            }

            AppState::MainMenu => {
                if self.map.is_some() || self.config.map.is_some() {
                    AppState::LoadMap
                } else {
                    info!("no map to play, exiting");
                    AppState::Exit
                }
            }

            AppState::LoadMap => {
                let map = match self.map.take() {
                    Some(map) => map,
                    None => {
                        let path = self.config.map.as_ref().otherwise("no map configured")?;
                        MapDesc::load(path).otherwise("couldn't load the configured map")?
                    }
                };
                self.loaded = Some(map.spawn(&mut self.engine.universe)?);
                self.played = 0;
                AppState::Play
            }

            AppState::Play => {
                if self.played >= self.config.play_frames {
                    AppState::UnloadMap
                } else {
                    self.engine.frame()?;
                    self.played += 1;

                    let debug_frames = self.config.debug_frames;
                    if self.config.debug && debug_frames > 0 && self.played % debug_frames == 0 {
                        AppState::Debug
                    } else {
                        AppState::Play
                    }
                }
            }

            AppState::Debug => {
                self.report();
                AppState::Play
            }

            AppState::UnloadMap => {
                if let Some(loaded) = self.loaded.take() {
                    loaded.unload(&mut self.engine.universe)?;
                }
                AppState::Exit
            }

            AppState::Exit => {
                self.engine.exit();
                AppState::Exit
            }
        })
    }

    fn report(&self) {
        let universe = &self.engine.universe;
        info!(
            "frame {}: {} entities, {} components, {} handlers",
            universe.frame(),
            universe.entity_count(),
            universe.facets().total_len(),
            universe.handler_count()
        );
        for (name, count) in universe.facets().summary() {
            info!("  {count} x {name}");
        }

        let stats = self.engine.renderer().borrow().stats();
        info!(
            "renderer: {} textures, {} buffers, {} shaders, {} bytes in use",
            stats.textures, stats.buffers, stats.shaders, stats.memory_in_use
        );
        info!("render jobs: {}", self.engine.frame_state().job_count());

        let profiler = self.engine.profiler();
        if let Some(average) = profiler.average_frame_time() {
            info!("average frame time: {average:?}");
        }
        for (label, average) in profiler.averages() {
            debug!("  {label}: {average:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    const MAP: &str = r#"
        name = "smoke test"

        [[entity]]
        kind = "sun_light"
        name = "sun"

        [[entity]]
        kind = "orthographic_camera"
        name = "map view"
        camera = { target_size = [64, 64] }
    "#;

    fn app(config: AppConfig) -> Application {
        let engine = Engine::new(testing::renderer(), &EngineConfig::default());
        Application::with_engine(engine, config)
    }

    #[test]
    fn without_a_map_the_app_exits() {
        let mut app = app(AppConfig {
            intro_frames: 2,
            ..Default::default()
        });
        assert_eq!(app.step(AppState::Start).unwrap(), AppState::Intro);
        assert_eq!(app.step(AppState::Intro).unwrap(), AppState::Intro);
        assert_eq!(app.step(AppState::Intro).unwrap(), AppState::MainMenu);
        assert_eq!(app.step(AppState::MainMenu).unwrap(), AppState::Exit);
        assert_eq!(app.engine().universe.frame(), 2);
    }

    #[test]
    fn full_run() {
        let mut app = app(AppConfig {
            skip_intro: true,
            play_frames: 4,
            debug: true,
            debug_frames: 2,
            ..Default::default()
        })
        .with_map(MapDesc::parse(MAP, "smoke.toml").unwrap());

        assert_eq!(app.step(AppState::Start).unwrap(), AppState::MainMenu);
        assert_eq!(app.step(AppState::MainMenu).unwrap(), AppState::LoadMap);
        assert_eq!(app.step(AppState::LoadMap).unwrap(), AppState::Play);
        assert_eq!(app.loaded_map().unwrap().entities.len(), 2);

        assert_eq!(app.step(AppState::Play).unwrap(), AppState::Play);
        assert_eq!(app.step(AppState::Play).unwrap(), AppState::Debug);
        assert_eq!(app.engine().frame_state().job_count(), 2);
        assert_eq!(app.step(AppState::Debug).unwrap(), AppState::Play);
        app.step(AppState::Play).unwrap();
        app.step(AppState::Play).unwrap();
        assert_eq!(app.played_frames(), 4);
        assert_eq!(app.step(AppState::Play).unwrap(), AppState::UnloadMap);

        assert_eq!(app.step(AppState::UnloadMap).unwrap(), AppState::Exit);
        assert_eq!(app.engine().universe.entity_count(), 0);
        assert_eq!(app.step(AppState::Exit).unwrap(), AppState::Exit);
        assert!(!app.engine().is_started());
    }

    #[test]
    fn run_reaches_exit() {
        let mut app = app(AppConfig {
            intro_frames: 1,
            play_frames: 3,
            ..Default::default()
        })
        .with_map(MapDesc::parse(MAP, "smoke.toml").unwrap());

        app.run().unwrap();
        assert_eq!(app.engine().universe.frame(), 4);
        assert!(app.loaded_map().is_none());
        assert!(!app.engine().is_started());
    }

    #[test]
    fn missing_map_files_fail_the_run() {
        let mut app = app(AppConfig {
            skip_intro: true,
            map: Some("/definitely/not/a/map.toml".into()),
            ..Default::default()
        });
        let error = app.run().unwrap_err();
        assert!(format!("{error:#}").contains("couldn't load the configured map"));
    }

    #[test]
    fn configured_apps_start_headless() {
        let mut config = EngineConfig::default();
        config.app.skip_intro = true;
        let mut app = Application::new(&config).unwrap();
        assert_eq!(app.engine().renderer().borrow().backend_name(), "headless");
        app.run().unwrap();
    }

    #[test]
    fn demo_map_plays() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/maps/demo.toml");
        let mut app = app(AppConfig {
            skip_intro: true,
            play_frames: 2,
            ..Default::default()
        })
        .with_map(MapDesc::load(path).unwrap());

        app.step(AppState::Start).unwrap();
        app.step(AppState::MainMenu).unwrap();
        app.step(AppState::LoadMap).unwrap();
        app.step(AppState::Play).unwrap();

        let state = app.engine().frame_state();
        assert_eq!(state.job_count(), 7);
        assert_eq!(state.jobs_of("actors").len(), 2);
        assert_eq!(app.engine().managers().materials.borrow().len(), 2);

        assert_eq!(app.step(AppState::Play).unwrap(), AppState::Play);
        assert_eq!(app.step(AppState::Play).unwrap(), AppState::UnloadMap);
        app.step(AppState::UnloadMap).unwrap();
        app.step(AppState::Exit).unwrap();
        assert_eq!(app.engine().universe.entity_count(), 0);
        assert_eq!(app.engine().renderer().borrow().stats().memory_in_use, 0);
    }
}
