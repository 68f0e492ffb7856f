//! Error types for the audio engine

use crate::registry::TrackId;
use crate::wav::WavError;
use thiserror::Error;

/// Errors that can occur while decoding encoded audio into a [`PcmBuffer`](crate::PcmBuffer)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("No audio track found in input")]
    NoAudioTrack,
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    #[error("Malformed input: {0}")]
    Malformed(String),
    #[error("Decoded stream contained no samples")]
    Empty,
    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Errors raised by engine operations
///
/// Every error is local to the operation that raised it; prior state is left intact.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Track {0} not found")]
    TrackNotFound(TrackId),
    #[error("Invalid gain {0}: must be within 0.0..=10.0")]
    InvalidGain(f32),
    #[error("Audio backend is not initialized")]
    BackendUnavailable,
    #[error("Audio backend error: {0}")]
    Backend(String),
    #[error("Sample rate mismatch: expected {expected} Hz, input {index} is {found} Hz")]
    SampleRateMismatch {
        expected: u32,
        found: u32,
        index: usize,
    },
    #[error("Nothing to mix down")]
    EmptyMixdown,
    #[error("A render is already in progress")]
    RenderInProgress,
    #[error("Worker thread error: {0}")]
    Worker(String),
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(&'static str),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] WavError),
}
