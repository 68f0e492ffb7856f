//! Decoded PCM audio buffers

use crate::error::EngineError;

/// Decoded audio held as planar `f32` channels
///
/// All channels share the same length and sample rate. Buffers are immutable once
/// built and are shared between the registry, the output backend and the renderer
/// through `Arc<PcmBuffer>`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Build a buffer from planar channel data
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, EngineError> {
        if channels.is_empty() {
            return Err(EngineError::InvalidBuffer("buffer has no channels"));
        }
        if sample_rate == 0 {
            return Err(EngineError::InvalidBuffer("sample rate is zero"));
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(EngineError::InvalidBuffer("channels differ in length"));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Build a buffer from interleaved samples (`[L, R, L, R, ...]` for stereo)
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        if channel_count == 0 {
            return Err(EngineError::InvalidBuffer("buffer has no channels"));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }
        Self::new(channels, sample_rate)
    }

    /// Build a buffer of digital silence
    pub fn silence(
        channel_count: usize,
        frames: usize,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        Self::new(vec![vec![0.0; frames]; channel_count], sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel, or `None` if the channel does not exist
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Sample at `frame` on `channel`, zero past the end
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|ch| ch.get(frame))
            .copied()
            .unwrap_or(0.0)
    }

    /// Copy out as interleaved samples
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * self.channel_count());
        for frame in 0..self.frames() {
            for ch in &self.channels {
                out.push(ch[frame]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_ragged_channels() {
        let result = PcmBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 44100);
        assert!(matches!(result, Err(EngineError::InvalidBuffer(_))));
    }

    #[test]
    fn test_rejects_zero_rate_and_no_channels() {
        assert!(PcmBuffer::new(vec![vec![0.0]], 0).is_err());
        assert!(PcmBuffer::new(Vec::new(), 44100).is_err());
    }

    #[test]
    fn test_interleaved_layout() {
        let buf = PcmBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3], 2, 48000).unwrap();
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[0.1, 0.2]);
        assert_eq!(buf.channel(1).unwrap(), &[-0.1, -0.2]);
        assert_eq!(buf.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2]);
    }

    #[test]
    fn test_duration_and_out_of_range_sample() {
        let buf = PcmBuffer::silence(1, 22050, 44100).unwrap();
        assert!((buf.duration_secs() - 0.5).abs() < 1e-9);
        assert_eq!(buf.sample(0, 100_000), 0.0);
        assert_eq!(buf.sample(3, 0), 0.0);
    }

    #[test]
    fn test_empty_buffer_is_valid() {
        let buf = PcmBuffer::silence(2, 0, 44100).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.duration_secs(), 0.0);
    }
}
