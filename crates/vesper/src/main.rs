use clap::Parser;
use log::*;
use std::process::ExitCode;
use vesper::{
    cli::Args,
    config::{ConfigError, EngineConfig},
    engine::Application,
    VERSION,
};

fn load_config(args: &Args) -> Result<EngineConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    args.apply(&mut config);
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = load_config(&args);

    let filters = match &config {
        Ok(config) => config.log_level.as_str(),
        Err(_) => args.log.as_deref().unwrap_or("info"),
    };
    pretty_env_logger::formatted_builder()
        .format_indent(None)
        .format_timestamp(None)
        .filter_level(LevelFilter::Info)
        .filter_module("wgpu_hal", LevelFilter::Off)
        .filter_module("wgpu_core", LevelFilter::Error)
        .filter_module("naga", LevelFilter::Off)
        .parse_filters(filters)
        .init();

    info!("Welcome to Vesper {VERSION}");

    let config = match config {
        Ok(config) => config,
        Err(error) => {
            error!("{:?}", anyhow::Error::from(error));
            return ExitCode::FAILURE;
        }
    };

    match Application::new(&config).and_then(|mut app| app.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("fatal error: {error:?}");
            ExitCode::FAILURE
        }
    }
}
