//! Captured audio chunk type.

use std::time::Duration;

/// One fixed-duration unit of captured audio.
///
/// Samples are interleaved 16-bit PCM at the device's native rate and
/// channel count. The first `overlap` seconds of content are shared with
/// the tail of the previous chunk. A chunk is owned exclusively by the
/// pipeline stage currently processing it and is discarded afterwards.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
    /// Native sample rate of the capture device in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Start offset of this chunk relative to session start, in seconds.
    pub start_secs: f64,
    /// Duration of the chunk's audio content.
    pub duration: Duration,
    /// Seconds of content shared with the previous chunk.
    pub overlap: Duration,
    /// Sequence number for ordering and diagnostics.
    pub sequence: u64,
}

impl AudioChunk {
    /// Creates a new audio chunk.
    pub fn new(
        samples: Vec<i16>,
        sample_rate: u32,
        channels: u16,
        start_secs: f64,
        duration: Duration,
        overlap: Duration,
        sequence: u64,
    ) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            start_secs,
            duration,
            overlap,
            sequence,
        }
    }

    /// Number of sample frames (one frame = one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration implied by the sample count, as opposed to the nominal
    /// `duration` field. Used by validation.
    pub fn measured_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}
