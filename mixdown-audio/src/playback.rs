//! Playback controller - per-track play/pause/resume on top of an audio backend
//!
//! Each track is either Stopped or Playing. The controller keeps the start time
//! of the current segment in backend clock seconds so a pause can work out how
//! far into the buffer playback got, and a later resume can seek there.

use crate::backend::AudioBackend;
use crate::error::EngineError;
use crate::registry::{PlaybackState, Track, TrackId, TrackRegistry};
use std::sync::Arc;
use tracing::debug;

/// Drives playback of registry tracks through one backend
pub struct PlaybackController<'a, B: AudioBackend + ?Sized> {
    registry: &'a mut TrackRegistry,
    backend: &'a mut B,
}

impl<'a, B: AudioBackend + ?Sized> PlaybackController<'a, B> {
    pub fn new(registry: &'a mut TrackRegistry, backend: &'a mut B) -> Self {
        Self { registry, backend }
    }

    /// Start a track from the beginning
    ///
    /// A track that is already sounding is stopped first, so a track never has
    /// two overlapping sources.
    pub fn play(&mut self, id: TrackId) -> Result<(), EngineError> {
        let track = self.registry.get_mut(id)?;
        silence(track, &mut *self.backend);

        let source = self
            .backend
            .start(Arc::clone(track.buffer()), track.gain(), 0.0)?;
        let playback = &mut track.playback;
        playback.source = Some(source);
        playback.start_time = self.backend.now();
        playback.resume_offset = None;
        playback.state = PlaybackState::Playing;
        debug!(track = %id, %source, "play");
        Ok(())
    }

    /// Pause a playing track, remembering where it got to. No-op when stopped.
    pub fn pause(&mut self, id: TrackId) -> Result<(), EngineError> {
        let track = self.registry.get_mut(id)?;
        settle(track, &mut *self.backend);
        if !track.playback.is_playing() {
            return Ok(());
        }

        let offset = elapsed(track, self.backend.now());
        silence(track, &mut *self.backend);
        track.playback.resume_offset = Some(offset);
        debug!(track = %id, offset, "pause");
        Ok(())
    }

    /// Resume a paused track from its recorded offset
    ///
    /// No-op when the track is playing or has never been paused.
    pub fn resume(&mut self, id: TrackId) -> Result<(), EngineError> {
        let track = self.registry.get_mut(id)?;
        settle(track, &mut *self.backend);
        if track.playback.is_playing() {
            return Ok(());
        }
        let Some(offset) = track.playback.resume_offset else {
            return Ok(());
        };

        let source = self
            .backend
            .start(Arc::clone(track.buffer()), track.gain(), offset)?;
        let playback = &mut track.playback;
        playback.source = Some(source);
        playback.start_time = self.backend.now() - offset;
        playback.state = PlaybackState::Playing;
        debug!(track = %id, %source, offset, "resume");
        Ok(())
    }

    /// Stop a track and forget its pause position
    pub fn stop(&mut self, id: TrackId) -> Result<(), EngineError> {
        let track = self.registry.get_mut(id)?;
        silence(track, &mut *self.backend);
        track.playback.resume_offset = None;
        debug!(track = %id, "stop");
        Ok(())
    }

    /// Change a track's gain, following through to its sounding source
    pub fn set_gain(&mut self, id: TrackId, value: f32) -> Result<(), EngineError> {
        self.registry.set_gain(id, value)?;
        if let Some(source) = self.registry.get(id)?.playback.source {
            self.backend.set_gain(source, value);
        }
        Ok(())
    }

    /// Current position of a track in seconds
    pub fn position(&self, id: TrackId) -> Result<f64, EngineError> {
        let track = self.registry.get(id)?;
        if has_finished(track, &*self.backend) {
            return Ok(0.0);
        }
        Ok(position_at(track, Some(self.backend.now())))
    }
}

/// Position of a track given the backend clock, or without one
///
/// Live while playing, the pause offset while paused, zero otherwise. Always
/// within `0.0..=duration`.
pub fn position_at(track: &Track, now: Option<f64>) -> f64 {
    match (track.playback.state, now) {
        (PlaybackState::Playing, Some(now)) => elapsed(track, now),
        _ => track.playback.resume_offset.unwrap_or(0.0),
    }
}

fn elapsed(track: &Track, now: f64) -> f64 {
    (now - track.playback.start_time).clamp(0.0, track.duration_secs())
}

/// Whether a playing track's source has run off the end of its buffer
pub(crate) fn has_finished<B: AudioBackend + ?Sized>(track: &Track, backend: &B) -> bool {
    track.playback.is_playing()
        && track
            .playback
            .source
            .map_or(true, |source| !backend.is_active(source))
}

/// A track that played to its end counts as stopped at the top
fn settle<B: AudioBackend + ?Sized>(track: &mut Track, backend: &mut B) {
    if has_finished(track, backend) {
        silence(track, backend);
        track.playback.resume_offset = None;
    }
}

/// Stop whatever source the track has and mark it stopped. Idempotent.
pub(crate) fn silence<B: AudioBackend + ?Sized>(track: &mut Track, backend: &mut B) {
    if let Some(source) = track.playback.source.take() {
        backend.stop(source);
    }
    track.playback.state = PlaybackState::Stopped;
}
