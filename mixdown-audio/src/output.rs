//! Real-time output through the default cpal device

use crate::backend::{AudioBackend, SourceId};
use crate::error::EngineError;
use crate::pcm::PcmBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// One buffer sounding on the output stream
struct Voice {
    id: SourceId,
    buffer: Arc<PcmBuffer>,
    gain: f32,
    /// Read position in buffer frames
    position: f64,
    /// Buffer frames consumed per output frame (buffer rate / device rate)
    step: f64,
}

impl Voice {
    fn finished(&self) -> bool {
        self.position >= self.buffer.frames() as f64
    }

    /// Linearly interpolated sample for an output channel
    #[inline]
    fn sample(&self, out_channel: usize) -> f32 {
        let channel = out_channel.min(self.buffer.channel_count() - 1);
        let pos = self.position as usize;
        let frac = self.position.fract() as f32;
        let s0 = self.buffer.sample(channel, pos);
        let s1 = self.buffer.sample(channel, pos + 1);
        s0 + frac * (s1 - s0)
    }
}

/// Mix every voice into an interleaved output block, dropping voices that end
fn mix_voices(voices: &mut Vec<Voice>, output: &mut [f32], channels: usize) {
    output.fill(0.0);
    if channels == 0 {
        return;
    }

    for voice in voices.iter_mut() {
        for frame in output.chunks_mut(channels) {
            if voice.finished() {
                break;
            }
            for (ch, out) in frame.iter_mut().enumerate() {
                *out += voice.sample(ch) * voice.gain;
            }
            voice.position += voice.step;
        }
    }

    voices.retain(|voice| !voice.finished());
}

/// Backend that sounds tracks on the system's default output device
///
/// The clock is the number of frames the device has pulled, so it only moves
/// while the stream is running.
pub struct CpalBackend {
    _stream: cpal::Stream,
    voices: Arc<Mutex<Vec<Voice>>>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    channels: usize,
    next_source: u64,
}

impl CpalBackend {
    /// Open the default output device and start its stream
    pub fn open_default() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Backend("No audio output device found".into()))?;

        let config = device
            .default_output_config()
            .map_err(|e| EngineError::Backend(format!("Failed to get audio config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let voices: Arc<Mutex<Vec<Voice>>> = Arc::new(Mutex::new(Vec::new()));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let voices_for_callback = Arc::clone(&voices);
        let frames_for_callback = Arc::clone(&frames_rendered);

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Never block the device thread; a missed lock is one block of silence
                    if let Some(mut voices) = voices_for_callback.try_lock() {
                        mix_voices(&mut voices, data, channels);
                    } else {
                        data.fill(0.0);
                    }
                    if channels > 0 {
                        frames_for_callback
                            .fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| EngineError::Backend(format!("Failed to create audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| EngineError::Backend(format!("Failed to start audio: {}", e)))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate, channels, "audio output opened"
        );

        Ok(Self {
            _stream: stream,
            voices,
            frames_rendered,
            sample_rate,
            channels,
            next_source: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl AudioBackend for CpalBackend {
    fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn start(
        &mut self,
        buffer: Arc<PcmBuffer>,
        gain: f32,
        offset_secs: f64,
    ) -> Result<SourceId, EngineError> {
        let id = SourceId::new(self.next_source);
        self.next_source += 1;

        let buffer_rate = buffer.sample_rate() as f64;
        let voice = Voice {
            id,
            position: offset_secs.max(0.0) * buffer_rate,
            step: buffer_rate / self.sample_rate as f64,
            buffer,
            gain,
        };
        self.voices.lock().push(voice);
        Ok(id)
    }

    fn stop(&mut self, source: SourceId) {
        self.voices.lock().retain(|voice| voice.id != source);
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        if let Some(voice) = self.voices.lock().iter_mut().find(|v| v.id == source) {
            voice.gain = gain;
        }
    }

    fn is_active(&self, source: SourceId) -> bool {
        self.voices.lock().iter().any(|voice| voice.id == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: u64, buffer: PcmBuffer, gain: f32, step: f64) -> Voice {
        Voice {
            id: SourceId::new(id),
            buffer: Arc::new(buffer),
            gain,
            position: 0.0,
            step,
        }
    }

    #[test]
    fn test_mono_voice_feeds_both_channels() {
        let buffer = PcmBuffer::new(vec![vec![0.5; 8]], 48000).unwrap();
        let mut voices = vec![voice(0, buffer, 2.0, 1.0)];
        let mut out = vec![0.0; 8];
        mix_voices(&mut voices, &mut out, 2);
        assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-6));
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn test_voice_ends_and_is_dropped() {
        let buffer = PcmBuffer::new(vec![vec![0.25; 3]], 48000).unwrap();
        let mut voices = vec![voice(0, buffer, 1.0, 1.0)];
        let mut out = vec![1.0; 10];
        mix_voices(&mut voices, &mut out, 2);

        assert_eq!(&out[..6], &[0.25; 6]);
        assert_eq!(&out[6..], &[0.0; 4]);
        assert!(voices.is_empty());
    }

    #[test]
    fn test_voices_are_summed() {
        let a = PcmBuffer::new(vec![vec![0.1; 4], vec![0.2; 4]], 44100).unwrap();
        let b = PcmBuffer::new(vec![vec![0.3; 4]], 44100).unwrap();
        let mut voices = vec![voice(0, a, 1.0, 1.0), voice(1, b, 1.0, 1.0)];
        let mut out = vec![0.0; 4];
        mix_voices(&mut voices, &mut out, 2);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rate_ratio_interpolates() {
        let ramp = PcmBuffer::new(vec![vec![0.0, 1.0, 0.0]], 24000).unwrap();
        // Half-rate buffer on a full-rate device advances half a frame per output frame
        let mut voices = vec![voice(0, ramp, 1.0, 0.5)];
        let mut out = vec![0.0; 3];
        mix_voices(&mut voices, &mut out, 1);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }
}
