//! Signal conditioning: raw capture chunk → backend-ready waveform.
//!
//! The inference backends consume mono 16 kHz float audio in [-1, 1].
//! Conditioning runs four pure steps in order: channel mixdown, sinc
//! resampling, gain, hard clip.

use crate::audio::chunk::AudioChunk;
use crate::defaults;
use crate::error::{Result, StreamscribeError};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::time::Duration;

/// Mono 16 kHz float waveform derived from exactly one [`AudioChunk`].
///
/// Invariant: `samples.len() == round(duration_secs × 16000)`, so
/// fixed-shape backends can rely on the length exactly.
#[derive(Debug, Clone)]
pub struct ConditionedWaveform {
    /// Mono samples at 16 kHz, amplitude clipped to [-1, 1].
    pub samples: Vec<f32>,
    /// Duration carried over from the source chunk.
    pub duration: Duration,
    /// Overlap carried over from the source chunk.
    pub overlap: Duration,
    /// Sequence number carried over from the source chunk.
    pub sequence: u64,
}

/// How multi-channel captures are reduced to mono.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Average all channels — privileges the full-room signal.
    Mix,
    /// Use a single channel, discarding the rest. Useful when one mic of
    /// a stereo HAT is known to be electrically noisy.
    Select(u16),
}

/// Converts raw chunks to the canonical backend format.
pub struct SignalConditioner {
    channel_mode: ChannelMode,
    gain: f32,
}

impl SignalConditioner {
    /// Creates a conditioner with the given mixdown mode and gain.
    pub fn new(channel_mode: ChannelMode, gain: f32) -> Self {
        Self { channel_mode, gain }
    }

    /// Conditions one chunk: mixdown → resample → gain → clip.
    ///
    /// The only failure path is a malformed chunk (`InvalidChunk`); every
    /// processing step is a pure function of its input.
    pub fn condition(&self, chunk: &AudioChunk) -> Result<ConditionedWaveform> {
        if chunk.samples.is_empty() {
            return Err(StreamscribeError::InvalidChunk {
                message: "zero-length chunk".to_string(),
            });
        }
        if chunk.channels == 0 {
            return Err(StreamscribeError::InvalidChunk {
                message: "chunk has zero channels".to_string(),
            });
        }
        if chunk.samples.len() % chunk.channels as usize != 0 {
            return Err(StreamscribeError::InvalidChunk {
                message: format!(
                    "{} samples not divisible by {} channels",
                    chunk.samples.len(),
                    chunk.channels
                ),
            });
        }
        if let ChannelMode::Select(ch) = self.channel_mode
            && ch >= chunk.channels
        {
            return Err(StreamscribeError::InvalidChunk {
                message: format!("channel {} selected but chunk has {}", ch, chunk.channels),
            });
        }

        let mono = mixdown(&chunk.samples, chunk.channels, self.channel_mode);
        let target_len =
            (chunk.duration.as_secs_f64() * defaults::MODEL_SAMPLE_RATE as f64).round() as usize;
        let resampled = resample(&mono, chunk.sample_rate, defaults::MODEL_SAMPLE_RATE, target_len)?;

        let samples: Vec<f32> = resampled
            .into_iter()
            .map(|s| (s * self.gain).clamp(-1.0, 1.0))
            .collect();

        Ok(ConditionedWaveform {
            samples,
            duration: chunk.duration,
            overlap: chunk.overlap,
            sequence: chunk.sequence,
        })
    }
}

/// Reduce interleaved samples to normalized mono floats.
fn mixdown(samples: &[i16], channels: u16, mode: ChannelMode) -> Vec<f32> {
    let channels = channels as usize;
    if channels == 1 {
        return samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    }
    match mode {
        ChannelMode::Mix => samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32).sum();
                sum / channels as f32 / i16::MAX as f32
            })
            .collect(),
        ChannelMode::Select(ch) => samples
            .chunks_exact(channels)
            .map(|frame| frame[ch as usize] as f32 / i16::MAX as f32)
            .collect(),
    }
}

/// Sinc resampling to the model rate, exactly `target_len` samples out.
///
/// A windowed-sinc FIR is used rather than naive decimation: aliasing
/// above 8 kHz folds straight into the speech band and costs accuracy.
/// The sinc kernel delays the signal by `output_delay()` samples, so
/// the filter must be flushed with zero-padded partial chunks or the
/// tail of every chunk is lost and fixed-shape backends see short input.
fn resample(input: &[f32], from_rate: u32, to_rate: u32, target_len: usize) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        input.len(),
        1,
    )
    .map_err(|e| StreamscribeError::InvalidChunk {
        message: format!("resampler construction failed: {}", e),
    })?;
    let delay = resampler.output_delay();

    let waves_in = vec![input.to_vec()];
    let mut output = resampler
        .process(&waves_in, None)
        .map_err(|e| StreamscribeError::InvalidChunk {
            message: format!("resampling failed: {}", e),
        })?
        .into_iter()
        .next()
        .unwrap_or_default();

    // Flush until the delayed tail has fully come through.
    for _ in 0..4 {
        if output.len() >= delay + target_len {
            break;
        }
        let tail = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| StreamscribeError::InvalidChunk {
                message: format!("resampler flush failed: {}", e),
            })?
            .into_iter()
            .next()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    let mut samples: Vec<f32> = output.into_iter().skip(delay).take(target_len).collect();
    samples.resize(target_len, 0.0);
    Ok(samples)
}
