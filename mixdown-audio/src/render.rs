//! Offline mixdown - sums gain-staged tracks into one stereo buffer

use crate::error::EngineError;
use crate::gain::accumulate;
use crate::pcm::PcmBuffer;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Mixdown output is always stereo
pub const OUTPUT_CHANNELS: usize = 2;

/// One track's contribution to a mixdown
#[derive(Debug, Clone)]
pub struct MixdownInput {
    pub buffer: Arc<PcmBuffer>,
    pub gain: f32,
}

/// Immutable snapshot of the tracks to mix, taken at export time
#[derive(Debug, Clone, Default)]
pub struct MixdownRequest {
    inputs: Vec<MixdownInput>,
}

impl MixdownRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, buffer: Arc<PcmBuffer>, gain: f32) {
        self.inputs.push(MixdownInput { buffer, gain });
    }

    pub fn inputs(&self) -> &[MixdownInput] {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl FromIterator<(Arc<PcmBuffer>, f32)> for MixdownRequest {
    fn from_iter<I: IntoIterator<Item = (Arc<PcmBuffer>, f32)>>(iter: I) -> Self {
        Self {
            inputs: iter
                .into_iter()
                .map(|(buffer, gain)| MixdownInput { buffer, gain })
                .collect(),
        }
    }
}

/// Sample rate every input must share
///
/// Taken from the first input that has audio; zero-length inputs add nothing
/// and are exempt. If every input is empty the first one decides.
fn mix_sample_rate(inputs: &[MixdownInput]) -> Result<u32, EngineError> {
    let first = inputs.first().ok_or(EngineError::EmptyMixdown)?;
    let expected = inputs
        .iter()
        .find(|input| !input.buffer.is_empty())
        .map_or(first.buffer.sample_rate(), |input| input.buffer.sample_rate());

    for (index, input) in inputs.iter().enumerate() {
        let found = input.buffer.sample_rate();
        if !input.buffer.is_empty() && found != expected {
            return Err(EngineError::SampleRateMismatch {
                expected,
                found,
                index,
            });
        }
    }
    Ok(expected)
}

/// Mix every input into a stereo buffer as long as the longest input
///
/// Mono inputs feed both output channels; wider inputs feed their first two
/// channels left and right. Shorter inputs fall silent past their end. The sum
/// is not clamped.
pub fn render(request: &MixdownRequest) -> Result<PcmBuffer, EngineError> {
    let inputs = request.inputs();
    let sample_rate = mix_sample_rate(inputs)?;
    let frames = inputs
        .iter()
        .map(|input| input.buffer.frames())
        .max()
        .unwrap_or(0);

    let mut output = vec![vec![0.0f32; frames]; OUTPUT_CHANNELS];
    for input in inputs {
        let last_channel = input.buffer.channel_count() - 1;
        for (ch, out) in output.iter_mut().enumerate() {
            if let Some(source) = input.buffer.channel(ch.min(last_channel)) {
                accumulate(out, source, input.gain);
            }
        }
    }

    PcmBuffer::new(output, sample_rate)
}

/// Clears the busy flag however the render thread exits
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of a render running on the worker thread
pub struct RenderJob {
    receiver: Receiver<Result<PcmBuffer, EngineError>>,
}

impl RenderJob {
    /// Channel that yields the rendered buffer exactly once
    pub fn receiver(&self) -> &Receiver<Result<PcmBuffer, EngineError>> {
        &self.receiver
    }

    /// Block until the render finishes
    pub fn wait(self) -> Result<PcmBuffer, EngineError> {
        self.receiver
            .recv()
            .map_err(|_| EngineError::Worker("render thread exited without a result".into()))?
    }
}

/// Runs renders off the caller's thread, one at a time
#[derive(Debug, Default)]
pub struct RenderWorker {
    busy: Arc<AtomicBool>,
}

impl RenderWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start rendering `request` in the background
    ///
    /// Fails with `RenderInProgress` while an earlier job is still running.
    pub fn submit(&self, request: MixdownRequest) -> Result<RenderJob, EngineError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::RenderInProgress);
        }

        let (tx, rx) = bounded(1);
        let guard = BusyGuard(Arc::clone(&self.busy));
        let spawned = thread::Builder::new()
            .name("mixdown-render".into())
            .spawn(move || {
                let started = Instant::now();
                let tracks = request.len();
                let result = {
                    let _guard = guard;
                    render(&request)
                };
                match &result {
                    Ok(buffer) => info!(
                        tracks,
                        frames = buffer.frames(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "mixdown rendered"
                    ),
                    Err(e) => debug!(error = %e, "mixdown failed"),
                }
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => Ok(RenderJob { receiver: rx }),
            // The closure (and the guard inside it) is dropped on spawn failure
            Err(e) => Err(EngineError::Worker(e.to_string())),
        }
    }
}
