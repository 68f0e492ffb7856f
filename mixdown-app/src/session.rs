//! Interactive session: ties stdin commands, background decodes and exports to one engine

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context};
use crossbeam_channel::{never, select, unbounded, Receiver};
use tracing::{info, warn};

use mixdown_audio::{Engine, EngineError, PcmBuffer, PlaybackState, RenderJob, TrackInfo};
use mixdown_input::{format_time, parse_command, Command, ParseError, HELP};
use mixdown_library::{Config, DecodeOutcome, DecodePool, DecodeSource};

/// An export whose render has not come back yet
struct PendingExport {
    job: RenderJob,
    path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    engine: Engine,
    pool: DecodePool,
    config: Config,
    config_path: PathBuf,
    config_dirty: bool,
    /// Export path from the command line, preferred over the configured one
    output: Option<PathBuf>,
    /// Gains to apply when a decode request finishes
    gains: HashMap<u64, f32>,
    export: Option<PendingExport>,
}

impl Session {
    pub fn new(
        engine: Engine,
        pool: DecodePool,
        config: Config,
        config_path: PathBuf,
        output: Option<PathBuf>,
    ) -> Self {
        Self {
            engine,
            pool,
            config,
            config_path,
            config_dirty: false,
            output,
            gains: HashMap::new(),
            export: None,
        }
    }

    /// Queue a file for decoding; `gain` overrides the configured default
    pub fn load(&mut self, path: PathBuf, gain: Option<f32>) {
        let path = self.resolve(path);
        if let Some(folder) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if self.config.last_load_folder.as_deref() != Some(folder) {
                self.config.last_load_folder = Some(folder.to_path_buf());
                self.config_dirty = true;
            }
        }

        println!("loading {}", path.display());
        match self.pool.submit(DecodeSource::File(path)) {
            Ok(request_id) => {
                self.gains
                    .insert(request_id, gain.unwrap_or(self.config.default_gain));
            }
            Err(e) => println!("could not start decode: {}", e),
        }
    }

    /// Relative paths that don't exist here are tried against the last load folder
    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_relative() && !path.exists() {
            if let Some(folder) = &self.config.last_load_folder {
                let candidate = folder.join(&path);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
        path
    }

    /// Read commands from stdin until `quit` or end of input
    pub fn run(mut self) -> anyhow::Result<()> {
        let input = spawn_stdin_reader()?;
        let decoded = self.pool.results().clone();
        println!("type 'help' for commands");

        loop {
            let rendered = self
                .export
                .as_ref()
                .map(|export| export.job.receiver().clone())
                .unwrap_or_else(never);

            select! {
                recv(input) -> line => match line {
                    Ok(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break;
                        }
                    }
                    Err(_) => {
                        info!("input closed");
                        break;
                    }
                },
                recv(decoded) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.on_decoded(outcome);
                    }
                }
                recv(rendered) -> result => {
                    if let Some(export) = self.export.take() {
                        let result = result
                            .unwrap_or_else(|_| Err(EngineError::Worker("render thread exited".into())));
                        self.on_rendered(&export.path, result);
                    }
                }
            }
        }

        // Don't drop a render that is almost done
        if self.export.is_some() {
            println!("waiting for export to finish");
        }
        self.finish_export();
        self.save_config();
        Ok(())
    }

    /// Block until the pending export, if any, is written
    fn finish_export(&mut self) {
        if let Some(export) = self.export.take() {
            let result = export.job.wait();
            self.on_rendered(&export.path, result);
        }
    }

    /// Decode everything queued, mix it and write the result without opening a device
    pub fn export_only(mut self) -> anyhow::Result<()> {
        let expected = self.gains.len();
        if expected == 0 {
            bail!("--export-only needs at least one input file");
        }

        let mut outcomes = Vec::with_capacity(expected);
        for _ in 0..expected {
            let outcome = self
                .pool
                .results()
                .recv()
                .context("decode workers stopped unexpectedly")?;
            outcomes.push(outcome);
        }
        // Keep command-line order regardless of which decode finished first
        outcomes.sort_by_key(|o| o.request_id);
        for outcome in outcomes {
            self.on_decoded(outcome);
        }

        let loaded = self.engine.registry().len();
        if loaded < self.config.min_export_tracks {
            bail!(
                "need at least {} tracks to export, {} loaded",
                self.config.min_export_tracks,
                loaded
            );
        }

        let path = self.export_path(None);
        let buffer = self
            .engine
            .start_export()
            .and_then(|job| job.wait())
            .context("mixdown failed")?;
        self.write_export(&path, &buffer)?;
        self.save_config();
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Flow {
        match parse_command(line) {
            Ok(command) => self.handle_command(command),
            Err(ParseError::Empty) => Flow::Continue,
            Err(e) => {
                println!("{}", e);
                Flow::Continue
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Quit => return Flow::Quit,
            Command::Help => println!("{}", HELP),
            Command::List => self.list(),
            Command::Load(path) => self.load(path, None),
            Command::Export(path) => self.start_export(path),
            other => {
                if let Some(cmd) = other.to_audio_command() {
                    if let Err(e) = self.engine.handle_command(cmd) {
                        println!("error: {}", e);
                    }
                }
            }
        }
        Flow::Continue
    }

    fn list(&self) {
        let tracks = self.engine.tracks();
        if tracks.is_empty() {
            println!("no tracks loaded");
            return;
        }
        for info in &tracks {
            println!("{}", describe(info));
        }
        let pending = self.pool.pending();
        if pending > 0 {
            println!("({} still decoding)", pending);
        }
        if self.engine.export_in_progress() {
            println!("(export rendering)");
        }
    }

    fn on_decoded(&mut self, outcome: DecodeOutcome) {
        let gain = self
            .gains
            .remove(&outcome.request_id)
            .unwrap_or(self.config.default_gain);

        match outcome.result {
            Ok(track) => {
                let name = track.metadata.title;
                let id = self.engine.add_named_track(track.buffer, Some(name));
                if let Err(e) = self.engine.set_gain(id, gain) {
                    warn!(track = %id, error = %e, "keeping unity gain");
                }
                if let Some(info) = self.engine.tracks().iter().find(|t| t.id == id) {
                    println!("{}", describe(info));
                }
            }
            Err(e) => println!("failed to load {}: {}", outcome.name, e),
        }
    }

    fn export_path(&self, requested: Option<PathBuf>) -> PathBuf {
        requested
            .or_else(|| self.output.clone())
            .unwrap_or_else(|| self.config.export_path.clone())
    }

    fn start_export(&mut self, requested: Option<PathBuf>) {
        // The previous result may be rendered but not yet written
        if let Some(export) = &self.export {
            println!(
                "export failed: {} (still writing {})",
                EngineError::RenderInProgress,
                export.path.display()
            );
            return;
        }

        let loaded = self.engine.registry().len();
        if loaded < self.config.min_export_tracks {
            println!(
                "load at least {} tracks before exporting ({} loaded)",
                self.config.min_export_tracks, loaded
            );
            return;
        }

        let pending = self.pool.pending();
        if pending > 0 {
            println!("{} files still decoding, exporting the loaded tracks", pending);
        }

        let path = self.export_path(requested);
        match self.engine.start_export() {
            Ok(job) => {
                println!("exporting {} tracks to {}", loaded, path.display());
                self.export = Some(PendingExport { job, path });
            }
            Err(e) => println!("export failed: {}", e),
        }
    }

    fn on_rendered(&self, path: &Path, result: Result<PcmBuffer, EngineError>) {
        let outcome = result
            .context("mixdown failed")
            .and_then(|buffer| self.write_export(path, &buffer));
        if let Err(e) = outcome {
            println!("export failed: {:#}", e);
        }
    }

    fn write_export(&self, path: &Path, buffer: &PcmBuffer) -> anyhow::Result<()> {
        let bytes = self.engine.encode(buffer)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;

        info!(path = %path.display(), bytes = bytes.len(), "export written");
        println!(
            "wrote {} ({}, {} Hz stereo)",
            path.display(),
            format_time(buffer.duration_secs()),
            buffer.sample_rate()
        );
        Ok(())
    }

    fn save_config(&mut self) {
        if !self.config_dirty {
            return;
        }
        match self.config.save_to(&self.config_path) {
            Ok(()) => self.config_dirty = false,
            Err(e) => warn!(path = %self.config_path.display(), error = %e, "could not save config"),
        }
    }
}

/// One line of the track list
fn describe(info: &TrackInfo) -> String {
    let state = match info.state {
        PlaybackState::Playing => "playing",
        PlaybackState::Stopped if info.position > 0.0 => "paused",
        PlaybackState::Stopped => "stopped",
    };
    format!(
        "{:>3}  {:<7}  {} / {}  gain {:.2}  {}",
        info.id.raw(),
        state,
        format_time(info.position),
        format_time(info.duration),
        info.gain,
        info.name.as_deref().unwrap_or("untitled"),
    )
}

/// Lines from stdin, read on their own thread so the session can wait on several channels
fn spawn_stdin_reader() -> anyhow::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("mixdown-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        })
        .context("spawning input thread")?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_audio::{wav, TrackId};
    use mixdown_library::TrackLoader;

    fn tone(seconds: usize, value: f32) -> PcmBuffer {
        PcmBuffer::new(vec![vec![value; 8000 * seconds]], 8000).unwrap()
    }

    fn session(dir: &Path, config: Config) -> Session {
        Session::new(
            Engine::new(),
            DecodePool::new(TrackLoader::new()),
            config,
            dir.join("config.txt"),
            None,
        )
    }

    #[test]
    fn test_describe_states() {
        let mut info = TrackInfo {
            id: TrackId::new(3),
            name: Some("kick".into()),
            duration: 125.0,
            position: 0.0,
            gain: 0.5,
            state: PlaybackState::Stopped,
            channels: 1,
            sample_rate: 44100,
        };
        assert_eq!(describe(&info), "  3  stopped  00:00 / 02:05  gain 0.50  kick");

        info.position = 61.2;
        assert!(describe(&info).contains("paused   01:01 / 02:05"));

        info.state = PlaybackState::Playing;
        assert!(describe(&info).contains("playing"));
    }

    #[test]
    fn test_export_only_writes_mix_in_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        fs::write(&a, wav::encode(&tone(1, 0.5)).unwrap()).unwrap();
        fs::write(&b, wav::encode(&tone(2, 0.25)).unwrap()).unwrap();

        let out = dir.path().join("renders").join("mix.wav");
        let mut session = session(dir.path(), Config::default());
        session.output = Some(out.clone());
        session.load(a, Some(1.0));
        session.load(b, Some(2.0));
        session.export_only().unwrap();

        let bytes = fs::read(&out).unwrap();
        let header = wav::WavHeader::parse(&bytes).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 8000);
        assert_eq!(header.frames(), 16000);
    }

    #[test]
    fn test_export_needs_minimum_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        fs::write(&a, wav::encode(&tone(1, 0.5)).unwrap()).unwrap();

        let mut session = session(dir.path(), Config::default());
        session.load(a, None);
        assert!(session.export_only().is_err());
    }

    #[test]
    fn test_load_remembers_folder() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        fs::write(&a, wav::encode(&tone(1, 0.5)).unwrap()).unwrap();

        let config = Config {
            export_path: dir.path().join("solo.wav"),
            min_export_tracks: 1,
            ..Config::default()
        };
        let mut session = session(dir.path(), config);
        session.load(a, None);
        session.export_only().unwrap();

        let saved = Config::load_from(&dir.path().join("config.txt")).unwrap();
        assert_eq!(saved.last_load_folder.as_deref(), Some(dir.path()));
        assert!(dir.path().join("solo.wav").exists());
    }

    #[test]
    fn test_second_export_waits_for_first_to_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        let config = Config {
            min_export_tracks: 1,
            ..Config::default()
        };
        let mut session = session(dir.path(), config);
        session.engine.add_track(tone(1, 0.5));

        session.handle_line(&format!("export {}", first.display()));
        // Render done, result not yet collected by the session
        while session.engine.export_in_progress() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        session.handle_line(&format!("export {}", second.display()));

        session.finish_export();
        assert!(first.exists());
        assert!(!second.exists());

        // Once written, the next export goes through
        session.handle_line(&format!("export {}", second.display()));
        session.finish_export();
        assert!(second.exists());
    }

    #[test]
    fn test_commands_without_device_report_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path(), Config::default());
        session.engine.add_track(tone(1, 0.1));

        assert_eq!(session.handle_line("play 0"), Flow::Continue);
        assert_eq!(session.handle_line("gain 0 3"), Flow::Continue);
        assert_eq!(session.engine.track(TrackId::new(0)).unwrap().gain(), 3.0);
        assert_eq!(session.handle_line("bogus"), Flow::Continue);
        assert_eq!(session.handle_line("quit"), Flow::Quit);
    }
}
