//! 16-bit PCM WAV encoding
//!
//! Layout is a single RIFF chunk holding one `fmt ` and one `data` subchunk,
//! 44 header bytes, everything little-endian.

use crate::pcm::PcmBuffer;
use thiserror::Error;

/// Size of the canonical header in bytes
pub const HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;
/// Largest data chunk whose RIFF chunk size still fits in 32 bits
pub const MAX_DATA_LEN: u64 = u32::MAX as u64 - (HEADER_LEN as u64 - 8);

/// Errors from reading a header back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WavError {
    #[error("Header too short: {0} bytes")]
    TooShort(usize),
    #[error("Missing {0} tag")]
    BadTag(&'static str),
    #[error("Unsupported audio format {0}")]
    NotPcm(u16),
    #[error("Unsupported bit depth {0}")]
    BitDepth(u16),
    #[error("Too many channels for a WAV file: {0}")]
    TooManyChannels(usize),
    #[error("Audio too long for a WAV file: {0} data bytes")]
    TooLong(u64),
}

/// The fields of a canonical 44-byte header that vary between files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    /// Size of the sample data in bytes
    pub data_len: u32,
}

impl WavHeader {
    /// Header for `frames` frames of `channels` channels
    ///
    /// Fails rather than write a header that disagrees with the data after it.
    pub fn new(channels: usize, frames: usize, sample_rate: u32) -> Result<Self, WavError> {
        let channels_u16 = u16::try_from(channels)
            .ok()
            .filter(|&c| c <= u16::MAX / BYTES_PER_SAMPLE)
            .ok_or(WavError::TooManyChannels(channels))?;
        let data_len = (frames as u64)
            .saturating_mul(channels as u64)
            .saturating_mul(BYTES_PER_SAMPLE as u64);
        if data_len > MAX_DATA_LEN {
            return Err(WavError::TooLong(data_len));
        }
        Ok(Self {
            channels: channels_u16,
            sample_rate,
            data_len: data_len as u32,
        })
    }

    pub fn for_buffer(pcm: &PcmBuffer) -> Result<Self, WavError> {
        Self::new(pcm.channel_count(), pcm.frames(), pcm.sample_rate())
    }

    pub fn block_align(&self) -> u16 {
        self.channels * BYTES_PER_SAMPLE
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align() as u32)
    }

    /// RIFF chunk size: file length minus the 8-byte RIFF preamble
    pub fn chunk_size(&self) -> u32 {
        (HEADER_LEN as u32 - 8).saturating_add(self.data_len)
    }

    pub fn frames(&self) -> u32 {
        match self.block_align() {
            0 => 0,
            align => self.data_len / align as u32,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&self.chunk_size().to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate().to_le_bytes());
        out.extend_from_slice(&self.block_align().to_le_bytes());
        out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&self.data_len.to_le_bytes());
    }

    /// Read back a canonical header as written by [`encode`]
    pub fn parse(bytes: &[u8]) -> Result<Self, WavError> {
        if bytes.len() < HEADER_LEN {
            return Err(WavError::TooShort(bytes.len()));
        }
        let u16_at = |pos: usize| u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
        let u32_at = |pos: usize| {
            u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
        };

        for (pos, tag, name) in [
            (0, b"RIFF", "RIFF"),
            (8, b"WAVE", "WAVE"),
            (12, b"fmt ", "fmt"),
            (36, b"data", "data"),
        ] {
            if &bytes[pos..pos + 4] != tag {
                return Err(WavError::BadTag(name));
            }
        }

        let format = u16_at(20);
        if format != FORMAT_PCM {
            return Err(WavError::NotPcm(format));
        }
        let bits = u16_at(34);
        if bits != BITS_PER_SAMPLE {
            return Err(WavError::BitDepth(bits));
        }

        Ok(Self {
            channels: u16_at(22),
            sample_rate: u32_at(24),
            data_len: u32_at(40),
        })
    }
}

/// Convert a float sample to 16-bit PCM
///
/// Clamps to `-1.0..=1.0`, then scales negatives by 32768 and the rest by 32767
/// so both ends of the range land exactly on `i16::MIN` and `i16::MAX`.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Serialize a buffer as a 16-bit PCM WAV file
///
/// Samples are interleaved frame by frame. An empty buffer yields a bare
/// 44-byte header. Buffers whose data would not fit the 32-bit RIFF size
/// fields are refused.
pub fn encode(pcm: &PcmBuffer) -> Result<Vec<u8>, WavError> {
    let header = WavHeader::for_buffer(pcm)?;
    let mut out = Vec::with_capacity(HEADER_LEN + header.data_len as usize);
    header.write_to(&mut out);

    let channels = pcm.channels();
    for frame in 0..pcm.frames() {
        for channel in channels {
            out.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
        }
    }
    Ok(out)
}
