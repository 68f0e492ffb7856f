//! mixdown - load audio files, audition them together and bounce a stereo WAV

mod args;
mod session;

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mixdown_audio::{AudioBackend, CpalBackend, Engine};
use mixdown_library::{Config, DecodePool, TrackLoader};

use args::Args;
use session::Session;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mixdown=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = match Args::parse().validated() {
        Ok(args) => args,
        Err(message) => Args::command()
            .error(ErrorKind::TooManyValues, message)
            .exit(),
    };

    let (config, config_path) = load_config(args.config.clone())?;
    info!(path = %config_path.display(), "config loaded");

    let loader = match config.target_sample_rate {
        Some(rate) => TrackLoader::with_sample_rate(rate),
        None => TrackLoader::new(),
    };
    if let Some(rate) = loader.target_sample_rate() {
        info!(rate, "tracks will be resampled on load");
    }

    // The output device is opened on first playback, never in export-only mode
    let engine = if args.export_only {
        Engine::new()
    } else {
        Engine::with_backend_factory(Box::new(|| {
            CpalBackend::open_default().map(|backend| Box::new(backend) as Box<dyn AudioBackend>)
        }))
    };

    let mut session = Session::new(
        engine,
        DecodePool::new(loader),
        config,
        config_path,
        args.output.clone(),
    );
    for (index, file) in args.files.iter().enumerate() {
        session.load(file.clone(), args.gain_for(index));
    }

    if args.export_only {
        session.export_only()
    } else {
        session.run()
    }
}

/// Config from `--config` or the default location; a missing file means defaults
fn load_config(path: Option<PathBuf>) -> anyhow::Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(Config::config_path);
    match Config::load_from(&path) {
        Ok(config) => Ok((config, path)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((Config::default(), path)),
        Err(e) => Err(e).with_context(|| format!("reading config {}", path.display())),
    }
}
