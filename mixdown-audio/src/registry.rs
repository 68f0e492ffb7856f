//! Track registry - loaded tracks, their gain and playback bookkeeping

use crate::backend::SourceId;
use crate::error::EngineError;
use crate::gain::Gain;
use crate::pcm::PcmBuffer;
use crate::render::MixdownRequest;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a track within one registry
///
/// Ids are handed out in load order and never reused, so removing a track
/// does not shift the ids of the tracks that remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Time bookkeeping for one track, owned by the playback controller
#[derive(Debug, Clone, Default)]
pub struct TrackPlayback {
    pub(crate) state: PlaybackState,
    /// Backend clock time (seconds) at which the current segment would have started from offset 0
    pub(crate) start_time: f64,
    /// Offset (seconds into the buffer) recorded by the last pause
    pub(crate) resume_offset: Option<f64>,
    /// Backend source currently sounding for this track
    pub(crate) source: Option<SourceId>,
}

impl TrackPlayback {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn resume_offset(&self) -> Option<f64> {
        self.resume_offset
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }
}

/// One loaded audio source
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    name: Option<String>,
    buffer: Arc<PcmBuffer>,
    gain: Gain,
    pub(crate) playback: TrackPlayback,
}

impl Track {
    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn buffer(&self) -> &Arc<PcmBuffer> {
        &self.buffer
    }

    pub fn gain(&self) -> f32 {
        self.gain.value()
    }

    pub fn playback(&self) -> &TrackPlayback {
        &self.playback
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }
}

/// Owns every loaded track, keyed by [`TrackId`] in load order
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackId, Track>,
    next_id: u64,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoded buffer and return its id
    pub fn add_track(&mut self, buffer: PcmBuffer) -> TrackId {
        self.add_named_track(buffer, None)
    }

    /// Register a decoded buffer under a display name
    pub fn add_named_track(&mut self, buffer: PcmBuffer, name: Option<String>) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.insert(
            id,
            Track {
                id,
                name,
                buffer: Arc::new(buffer),
                gain: Gain::default(),
                playback: TrackPlayback::default(),
            },
        );
        id
    }

    /// Set a track's gain. Out-of-range values leave the track unchanged.
    pub fn set_gain(&mut self, id: TrackId, value: f32) -> Result<(), EngineError> {
        let track = self.get_mut(id)?;
        track.gain = Gain::new(value)?;
        Ok(())
    }

    /// Remove a track, handing it back to the caller
    pub fn remove_track(&mut self, id: TrackId) -> Result<Track, EngineError> {
        self.tracks.remove(&id).ok_or(EngineError::TrackNotFound(id))
    }

    pub fn get(&self, id: TrackId) -> Result<&Track, EngineError> {
        self.tracks.get(&id).ok_or(EngineError::TrackNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: TrackId) -> Result<&mut Track, EngineError> {
        self.tracks.get_mut(&id).ok_or(EngineError::TrackNotFound(id))
    }

    /// Tracks in load order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Read-only (buffer, gain) snapshot of every track, in load order
    pub fn snapshot(&self) -> MixdownRequest {
        let mut request = MixdownRequest::new();
        for track in self.tracks.values() {
            request.push(Arc::clone(&track.buffer), track.gain.value());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(frames: usize) -> PcmBuffer {
        PcmBuffer::silence(1, frames, 44100).unwrap()
    }

    #[test]
    fn test_ids_follow_load_order_and_are_not_reused() {
        let mut registry = TrackRegistry::new();
        let a = registry.add_track(mono(10));
        let b = registry.add_track(mono(10));
        assert!(a < b);

        registry.remove_track(a).unwrap();
        let c = registry.add_track(mono(10));
        assert_ne!(c, a);
        assert_ne!(c, b);

        // Surviving tracks keep their ids
        assert_eq!(registry.get(b).unwrap().id(), b);
        assert_eq!(registry.ids(), vec![b, c]);
    }

    #[test]
    fn test_default_gain_is_unity() {
        let mut registry = TrackRegistry::new();
        let id = registry.add_track(mono(1));
        assert_eq!(registry.get(id).unwrap().gain(), 1.0);
    }

    #[test]
    fn test_invalid_gain_leaves_track_unchanged() {
        let mut registry = TrackRegistry::new();
        let id = registry.add_track(mono(1));

        let err = registry.set_gain(id, 15.0).unwrap_err();
        assert_eq!(err, EngineError::InvalidGain(15.0));
        assert_eq!(registry.get(id).unwrap().gain(), 1.0);

        registry.set_gain(id, 0.5).unwrap();
        assert_eq!(registry.get(id).unwrap().gain(), 0.5);
    }

    #[test]
    fn test_unknown_track() {
        let mut registry = TrackRegistry::new();
        let missing = TrackId::new(42);
        assert_eq!(
            registry.set_gain(missing, 1.0),
            Err(EngineError::TrackNotFound(missing))
        );
        assert!(registry.remove_track(missing).is_err());
        assert!(registry.get(missing).is_err());
    }

    #[test]
    fn test_snapshot_keeps_order_and_gain() {
        let mut registry = TrackRegistry::new();
        let a = registry.add_track(mono(5));
        let b = registry.add_track(mono(7));
        registry.set_gain(b, 0.25).unwrap();
        let _ = a;

        let request = registry.snapshot();
        let gains: Vec<f32> = request.inputs().iter().map(|i| i.gain).collect();
        let lengths: Vec<usize> = request.inputs().iter().map(|i| i.buffer.frames()).collect();
        assert_eq!(gains, vec![1.0, 0.25]);
        assert_eq!(lengths, vec![5, 7]);
    }
}
