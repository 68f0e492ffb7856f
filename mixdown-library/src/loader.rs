//! Audio decoding with Symphonia

use mixdown_audio::{DecodeError, Decoder, PcmBuffer};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Track metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: f64,
    /// Rate of the encoded stream, before any resampling
    pub source_sample_rate: u32,
    pub channels: u16,
}

/// A decoded track ready for the engine
#[derive(Debug, Clone)]
pub struct LoadedTrack {
    pub buffer: PcmBuffer,
    pub metadata: TrackMetadata,
}

/// Audio decoder using Symphonia, optionally conforming everything to one rate
#[derive(Debug, Clone, Default)]
pub struct TrackLoader {
    target_sample_rate: Option<u32>,
}

impl TrackLoader {
    /// Decoder that keeps each file's own sample rate
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that resamples every track to `target_sample_rate`
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate: Some(target_sample_rate),
        }
    }

    pub fn target_sample_rate(&self) -> Option<u32> {
        self.target_sample_rate
    }

    /// Read and decode an audio file
    pub fn load(&self, path: &Path) -> Result<LoadedTrack, LoadError> {
        let bytes = std::fs::read(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        let mut track = self.decode_bytes(bytes, extension)?;

        if track.metadata.title.is_empty() {
            track.metadata.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
                .to_string();
        }
        Ok(track)
    }

    /// Decode an in-memory file; `extension` helps the format probe
    pub fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<LoadedTrack, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut format = probed.format;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut metadata = extract_metadata(&mut format);
        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count());

        // Decode all samples
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(e) => {
                    end_of_stream(e)?;
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = %e, "skipping corrupt packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };

            // Convert to f32 interleaved
            let spec = *decoded.spec();
            sample_rate = Some(spec.rate);
            channels = Some(spec.channels.count());

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        let (Some(rate), Some(channel_count)) = (sample_rate, channels) else {
            return Err(DecodeError::Empty);
        };

        let buffer = PcmBuffer::from_interleaved(&samples, channel_count, rate)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        metadata.duration_secs = buffer.duration_secs();
        metadata.source_sample_rate = rate;
        metadata.channels = channel_count as u16;

        let buffer = match self.target_sample_rate {
            Some(target) if target != rate => resample(&buffer, target)?,
            _ => buffer,
        };

        Ok(LoadedTrack { buffer, metadata })
    }
}

impl Decoder for TrackLoader {
    fn decode(&self, bytes: &[u8]) -> Result<PcmBuffer, DecodeError> {
        self.decode_bytes(bytes.to_vec(), None)
            .map(|track| track.buffer)
    }
}

/// Resample a buffer to `target_rate`
pub fn resample(buffer: &PcmBuffer, target_rate: u32) -> Result<PcmBuffer, DecodeError> {
    use rubato::{FftFixedInOut, Resampler};

    let source_rate = buffer.sample_rate();
    if source_rate == target_rate {
        return Ok(buffer.clone());
    }

    let channel_count = buffer.channel_count();
    let frames = buffer.frames();
    let expected_frames =
        (frames as u64 * target_rate as u64 / source_rate as u64) as usize;

    let mut resampler =
        FftFixedInOut::<f32>::new(source_rate as usize, target_rate as usize, 1024, channel_count)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames); channel_count];
    let chunk_size = resampler.input_frames_next();

    let mut pos = 0;
    while pos < frames {
        let end = (pos + chunk_size).min(frames);
        // Last chunk is padded with zeros to a full block
        let chunk: Vec<Vec<f32>> = buffer
            .channels()
            .iter()
            .map(|ch| {
                let mut block = ch[pos..end].to_vec();
                block.resize(chunk_size, 0.0);
                block
            })
            .collect();

        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }
        pos = end;
    }

    for ch in &mut output {
        ch.resize(expected_frames, 0.0);
    }

    debug!(
        from = source_rate,
        to = target_rate,
        frames = expected_frames,
        "resampled track"
    );
    PcmBuffer::new(output, target_rate).map_err(|e| DecodeError::Resample(e.to_string()))
}

/// Sort a packet read error into a clean end of stream or a malformed input
fn end_of_stream(error: SymphoniaError) -> Result<(), DecodeError> {
    match error {
        SymphoniaError::IoError(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(()),
        // A new chained stream starts; only the first is decoded
        SymphoniaError::ResetRequired => {
            debug!("stream reset, keeping first stream only");
            Ok(())
        }
        e => Err(DecodeError::Malformed(e.to_string())),
    }
}

/// Pull title and artist tags from the container
fn extract_metadata(format: &mut Box<dyn FormatReader>) -> TrackMetadata {
    let mut metadata = TrackMetadata::default();

    if let Some(meta) = format.metadata().current() {
        for tag in meta.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => {
                    metadata.title = tag.value.to_string();
                }
                Some(StandardTagKey::Artist) => {
                    metadata.artist = tag.value.to_string();
                }
                _ => {}
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_audio::wav;

    fn sine(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_silence_round_trip() {
        let pcm = PcmBuffer::silence(2, 4410, 44100).unwrap();
        let bytes = wav::encode(&pcm).unwrap();

        let decoded = TrackLoader::new().decode(&bytes).unwrap();
        assert_eq!(decoded.frames(), 4410);
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.sample_rate(), 44100);
        assert!(decoded.channels().iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_encoded_signal_survives_decode() {
        let pcm = PcmBuffer::new(vec![sine(1000, 8000)], 8000).unwrap();
        let bytes = wav::encode(&pcm).unwrap();

        let track = TrackLoader::new()
            .decode_bytes(bytes, Some("wav"))
            .unwrap();
        assert_eq!(track.metadata.channels, 1);
        assert_eq!(track.metadata.source_sample_rate, 8000);
        for (a, b) in pcm.channel(0).unwrap().iter().zip(track.buffer.channel(0).unwrap()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_read_errors_are_not_end_of_stream() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "end of stream");
        assert_eq!(end_of_stream(SymphoniaError::IoError(eof)), Ok(()));
        assert_eq!(end_of_stream(SymphoniaError::ResetRequired), Ok(()));

        let broken = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk");
        assert!(matches!(
            end_of_stream(SymphoniaError::IoError(broken)),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            end_of_stream(SymphoniaError::DecodeError("invalid packet")),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = TrackLoader::new().decode(b"definitely not audio");
        assert!(matches!(result, Err(DecodeError::Unsupported(_))));
    }

    #[test]
    fn test_resample_to_target_rate() {
        let pcm = PcmBuffer::new(vec![sine(22050, 22050); 2], 22050).unwrap();
        let bytes = wav::encode(&pcm).unwrap();

        let decoded = TrackLoader::with_sample_rate(44100).decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate(), 44100);
        assert_eq!(decoded.frames(), 44100);
        assert_eq!(decoded.channel_count(), 2);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let pcm = PcmBuffer::new(vec![sine(100, 48000)], 48000).unwrap();
        assert_eq!(resample(&pcm, 48000).unwrap(), pcm);
    }

    #[test]
    fn test_load_missing_file() {
        let result = TrackLoader::new().load(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_load_uses_file_stem_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        std::fs::write(&path, wav::encode(&PcmBuffer::silence(1, 10, 8000).unwrap()).unwrap()).unwrap();

        let track = TrackLoader::new().load(&path).unwrap();
        assert_eq!(track.metadata.title, "kick");
        assert_eq!(track.buffer.frames(), 10);
    }
}
