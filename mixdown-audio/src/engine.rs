//! Audio engine - owns the tracks, the shared output backend and the renderer

use crate::backend::{AudioBackend, BackendFactory};
use crate::error::{DecodeError, EngineError};
use crate::pcm::PcmBuffer;
use crate::playback::{has_finished, position_at, silence, PlaybackController};
use crate::registry::{PlaybackState, Track, TrackId, TrackRegistry};
use crate::render::{RenderJob, RenderWorker};
use crate::wav;
use tracing::{info, warn};

/// Turns encoded audio bytes into a decoded buffer
///
/// Implementations must be shareable across decode worker threads.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PcmBuffer, DecodeError>;
}

/// Commands the presentation layer sends to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    Play(TrackId),
    Pause(TrackId),
    Resume(TrackId),
    Stop(TrackId),
    PlayAll,
    PauseAll,
    ResumeAll,
    SetGain(TrackId, f32),
    Remove(TrackId),
}

/// Snapshot of one track for display
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub name: Option<String>,
    pub duration: f64, // seconds
    pub position: f64, // seconds
    pub gain: f32,
    pub state: PlaybackState,
    pub channels: usize,
    pub sample_rate: u32,
}

/// The single output backend of a session, created on first use
struct BackendHandle {
    backend: Option<Box<dyn AudioBackend>>,
    factory: Option<BackendFactory>,
}

impl BackendHandle {
    fn ensure(&mut self) -> Result<&mut Box<dyn AudioBackend>, EngineError> {
        if self.backend.is_none() {
            let factory = self
                .factory
                .as_mut()
                .ok_or(EngineError::BackendUnavailable)?;
            match factory() {
                Ok(backend) => {
                    info!("audio backend initialized");
                    self.backend = Some(backend);
                }
                Err(e) => {
                    warn!(error = %e, "audio backend failed to initialize");
                    return Err(EngineError::BackendUnavailable);
                }
            }
        }
        self.backend.as_mut().ok_or(EngineError::BackendUnavailable)
    }
}

/// Engine context for one session
///
/// Playback and export are independent: export renders a snapshot of the
/// registry and never touches playback state.
pub struct Engine {
    registry: TrackRegistry,
    backend: BackendHandle,
    renderer: RenderWorker,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine without an output backend. Playback fails with `BackendUnavailable`
    /// until one is attached.
    pub fn new() -> Self {
        Self {
            registry: TrackRegistry::new(),
            backend: BackendHandle {
                backend: None,
                factory: None,
            },
            renderer: RenderWorker::new(),
        }
    }

    /// Engine that opens its backend through `factory` the first time playback needs it
    pub fn with_backend_factory(factory: BackendFactory) -> Self {
        let mut engine = Self::new();
        engine.backend.factory = Some(factory);
        engine
    }

    /// Install an already-open backend, replacing none
    pub fn attach_backend(&mut self, backend: Box<dyn AudioBackend>) {
        if self.backend.backend.is_none() {
            self.backend.backend = Some(backend);
        }
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    /// Decode bytes and register the result
    pub fn load<D: Decoder + ?Sized>(
        &mut self,
        decoder: &D,
        bytes: &[u8],
        name: Option<String>,
    ) -> Result<TrackId, EngineError> {
        let buffer = decoder.decode(bytes)?;
        Ok(self.add_named_track(buffer, name))
    }

    pub fn add_track(&mut self, buffer: PcmBuffer) -> TrackId {
        self.add_named_track(buffer, None)
    }

    pub fn add_named_track(&mut self, buffer: PcmBuffer, name: Option<String>) -> TrackId {
        let (frames, rate) = (buffer.frames(), buffer.sample_rate());
        let id = self.registry.add_named_track(buffer, name);
        info!(track = %id, frames, sample_rate = rate, "track added");
        id
    }

    /// Remove a track, silencing it first if it is sounding
    pub fn remove_track(&mut self, id: TrackId) -> Result<(), EngineError> {
        let mut track = self.registry.remove_track(id)?;
        if let Some(backend) = self.backend.backend.as_mut() {
            silence(&mut track, &mut **backend);
        }
        info!(track = %id, "track removed");
        Ok(())
    }

    pub fn track(&self, id: TrackId) -> Result<&Track, EngineError> {
        self.registry.get(id)
    }

    /// Set a track's gain; a sounding track picks it up immediately
    pub fn set_gain(&mut self, id: TrackId, value: f32) -> Result<(), EngineError> {
        match self.backend.backend.as_mut() {
            Some(backend) => {
                PlaybackController::new(&mut self.registry, &mut **backend).set_gain(id, value)
            }
            None => self.registry.set_gain(id, value),
        }
    }

    pub fn play(&mut self, id: TrackId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        let backend = self.backend.ensure()?;
        PlaybackController::new(&mut self.registry, &mut **backend).play(id)
    }

    pub fn pause(&mut self, id: TrackId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        let backend = self.backend.ensure()?;
        PlaybackController::new(&mut self.registry, &mut **backend).pause(id)
    }

    pub fn resume(&mut self, id: TrackId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        let backend = self.backend.ensure()?;
        PlaybackController::new(&mut self.registry, &mut **backend).resume(id)
    }

    pub fn stop(&mut self, id: TrackId) -> Result<(), EngineError> {
        self.registry.get(id)?;
        let backend = self.backend.ensure()?;
        PlaybackController::new(&mut self.registry, &mut **backend).stop(id)
    }

    /// Start every track from the top, together
    pub fn play_all(&mut self) -> Result<(), EngineError> {
        self.for_each_track(|ctl, id| ctl.play(id))
    }

    pub fn pause_all(&mut self) -> Result<(), EngineError> {
        self.for_each_track(|ctl, id| ctl.pause(id))
    }

    pub fn resume_all(&mut self) -> Result<(), EngineError> {
        self.for_each_track(|ctl, id| ctl.resume(id))
    }

    fn for_each_track<F>(&mut self, mut op: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut PlaybackController<'_, dyn AudioBackend>, TrackId) -> Result<(), EngineError>,
    {
        let ids = self.registry.ids();
        let backend = self.backend.ensure()?;
        let mut ctl = PlaybackController::new(&mut self.registry, &mut **backend);
        for id in ids {
            op(&mut ctl, id)?;
        }
        Ok(())
    }

    /// Playback position of a track in seconds
    pub fn position(&self, id: TrackId) -> Result<f64, EngineError> {
        let track = self.registry.get(id)?;
        Ok(self.live_state(track).1)
    }

    /// Display snapshot of every track, in load order
    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.registry
            .iter()
            .map(|track| {
                let (state, position) = self.live_state(track);
                TrackInfo {
                    id: track.id(),
                    name: track.name().map(str::to_owned),
                    duration: track.duration_secs(),
                    position,
                    gain: track.gain(),
                    state,
                    channels: track.buffer().channel_count(),
                    sample_rate: track.buffer().sample_rate(),
                }
            })
            .collect()
    }

    /// State and position as the listener hears them; a track whose source ran
    /// out reads as stopped at the top
    fn live_state(&self, track: &Track) -> (PlaybackState, f64) {
        match self.backend.backend.as_deref() {
            Some(backend) if has_finished(track, backend) => (PlaybackState::Stopped, 0.0),
            backend => (
                track.playback().state(),
                position_at(track, backend.map(|b| b.now())),
            ),
        }
    }

    /// Dispatch a command
    pub fn handle_command(&mut self, cmd: AudioCommand) -> Result<(), EngineError> {
        match cmd {
            AudioCommand::Play(id) => self.play(id),
            AudioCommand::Pause(id) => self.pause(id),
            AudioCommand::Resume(id) => self.resume(id),
            AudioCommand::Stop(id) => self.stop(id),
            AudioCommand::PlayAll => self.play_all(),
            AudioCommand::PauseAll => self.pause_all(),
            AudioCommand::ResumeAll => self.resume_all(),
            AudioCommand::SetGain(id, gain) => self.set_gain(id, gain),
            AudioCommand::Remove(id) => self.remove_track(id),
        }
    }

    /// Render the current mix in the background. Only one export runs at a time.
    pub fn start_export(&self) -> Result<RenderJob, EngineError> {
        let request = self.registry.snapshot();
        if request.is_empty() {
            return Err(EngineError::EmptyMixdown);
        }
        info!(tracks = request.len(), "export started");
        self.renderer.submit(request)
    }

    pub fn export_in_progress(&self) -> bool {
        self.renderer.is_busy()
    }

    /// Serialize a rendered buffer as WAV bytes
    pub fn encode(&self, buffer: &PcmBuffer) -> Result<Vec<u8>, EngineError> {
        Ok(wav::encode(buffer)?)
    }
}
