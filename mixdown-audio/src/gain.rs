//! Gain stage - linear amplitude scaling
//!
//! Gain is applied unclamped everywhere in the pipeline. The only clamp happens
//! once, when samples are quantized by the WAV encoder.

use crate::error::EngineError;

/// Validated per-track gain in `0.0..=10.0`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Gain(f32);

impl Gain {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 10.0;
    pub const UNITY: Gain = Gain(1.0);

    /// Validate a raw gain value. NaN and values outside the range are rejected.
    pub fn new(value: f32) -> Result<Self, EngineError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidGain(value))
        }
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::UNITY
    }
}

impl TryFrom<f32> for Gain {
    type Error = EngineError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Scale one sample. No clamping.
#[inline(always)]
pub fn apply_gain(sample: f32, gain: f32) -> f32 {
    sample * gain
}

/// Add `input * gain` into `output`, sample by sample
///
/// Only `min(input.len(), output.len())` samples are touched, so a short input
/// leaves the tail of `output` as it was (silence when `output` started zeroed).
#[inline]
pub fn accumulate(output: &mut [f32], input: &[f32], gain: f32) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out += apply_gain(sample, gain);
    }
}
