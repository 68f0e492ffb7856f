//! Audio backend abstraction - the sound sources the playback controller drives

use crate::error::EngineError;
use crate::pcm::PcmBuffer;
use std::fmt;
use std::sync::Arc;

/// Handle to one sounding source inside a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

/// A device (or stand-in) that can sound buffers and report a running clock
///
/// Sources play once from their start offset to the end of the buffer and then
/// fall silent on their own. Stopping a source that already finished, or was
/// never started, does nothing.
pub trait AudioBackend {
    /// Backend clock in seconds. Monotonic, starts near zero.
    fn now(&self) -> f64;

    /// Start sounding `buffer` from `offset_secs` with the given linear gain
    fn start(
        &mut self,
        buffer: Arc<PcmBuffer>,
        gain: f32,
        offset_secs: f64,
    ) -> Result<SourceId, EngineError>;

    /// Silence a source
    fn stop(&mut self, source: SourceId);

    /// Change the gain of a sounding source
    fn set_gain(&mut self, source: SourceId, gain: f32);

    /// Whether the source is still producing sound
    fn is_active(&self, source: SourceId) -> bool;
}

/// Produces the shared backend the first time playback needs it
pub type BackendFactory = Box<dyn FnMut() -> Result<Box<dyn AudioBackend>, EngineError>>;
