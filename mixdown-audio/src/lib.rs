//! Audio engine for mixdown - tracks, playback, offline render and WAV export
//!
//! This crate provides the core pipeline:
//! - Registry: loaded tracks with per-track gain
//! - Playback: play/pause/resume bookkeeping against an output backend
//! - Render: offline mixdown of N tracks into one stereo buffer
//! - Wav: byte-exact 16-bit PCM WAV encoding
//!
//! The engine never touches the filesystem; callers hand it decoded buffers
//! and receive encoded bytes back.

mod backend;
mod engine;
mod error;
mod gain;
mod output;
mod pcm;
mod playback;
mod registry;
mod render;
pub mod wav;

pub use backend::{AudioBackend, BackendFactory, SourceId};
pub use engine::{AudioCommand, Decoder, Engine, TrackInfo};
pub use error::{DecodeError, EngineError};
pub use gain::{accumulate, apply_gain, Gain};
pub use output::CpalBackend;
pub use pcm::PcmBuffer;
pub use playback::{position_at, PlaybackController};
pub use registry::{PlaybackState, Track, TrackId, TrackPlayback, TrackRegistry};
pub use render::{render, MixdownInput, MixdownRequest, RenderJob, RenderWorker, OUTPUT_CHANNELS};
pub use wav::{encode, quantize, WavError, WavHeader};
