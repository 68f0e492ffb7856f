//! Track loading for mixdown - decoding, resampling, and configuration

mod config;
mod decode_pool;
mod loader;

pub use config::Config;
pub use decode_pool::{DecodeOutcome, DecodePool, DecodeSource};
pub use loader::{resample, LoadError, LoadedTrack, TrackLoader, TrackMetadata};
