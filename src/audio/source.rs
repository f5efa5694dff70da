//! Chunked audio acquisition.
//!
//! An [`AudioSource`] produces fixed-duration, overlapping chunks from a
//! capture device. The source keeps the trailing `overlap` seconds of the
//! previous capture and prepends them to the next chunk, so consecutive
//! chunks share a region of real time and no spoken word is truncated at
//! a window boundary in every chunk it appears in.

use crate::audio::chunk::AudioChunk;
use crate::error::{Result, StreamscribeError};
use std::collections::VecDeque;
use std::time::Duration;

/// Capture format and chunking parameters, fixed for a session.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSpec {
    /// Native sample rate requested from the device, in Hz.
    pub sample_rate: u32,
    /// Number of channels requested from the device.
    pub channels: u16,
    /// Duration of each emitted chunk.
    pub chunk_duration: Duration,
    /// Seconds of content shared between consecutive chunks.
    pub overlap: Duration,
}

impl CaptureSpec {
    /// Sample frames per chunk.
    pub fn chunk_frames(&self) -> usize {
        (self.chunk_duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Sample frames retained from the previous chunk.
    pub fn overlap_frames(&self) -> usize {
        (self.overlap.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Fresh (non-overlapping) frames needed to complete a chunk.
    pub fn fresh_frames(&self) -> usize {
        self.chunk_frames().saturating_sub(self.overlap_frames())
    }
}

/// Trait for chunked audio sources.
///
/// This trait allows swapping implementations (real capture device, WAV
/// file, mock). Implementations own the overlap bookkeeping.
pub trait AudioSource: Send {
    /// Open the capture device and negotiate the configured format.
    ///
    /// Fails with `Device` when the requested sample rate / channel
    /// combination is unsupported by the hardware.
    fn open(&mut self) -> Result<()>;

    /// Block until one chunk of audio has been collected.
    ///
    /// Returns `Ok(None)` when a finite source (file, pipe) is exhausted;
    /// a live microphone never returns `None`. Fails with `CaptureTimeout`
    /// when the device stalls.
    fn capture(&mut self) -> Result<Option<AudioChunk>>;

    /// Release the device and recycle any transient buffers.
    fn close(&mut self) -> Result<()>;

    /// The capture format this source was configured with.
    fn spec(&self) -> &CaptureSpec;
}

/// Tracks the overlap tail and chunk sequencing shared by all sources.
///
/// Feed raw frames in, take completed chunks out. Used by the cpal and
/// WAV sources so the overlap arithmetic lives in exactly one place.
#[derive(Debug)]
pub struct ChunkAssembler {
    spec: CaptureSpec,
    /// Trailing samples of the previous chunk, prepended to the next one.
    tail: Vec<i16>,
    sequence: u64,
    /// Session-relative start of the next chunk, in seconds.
    next_start_secs: f64,
}

impl ChunkAssembler {
    pub fn new(spec: CaptureSpec) -> Self {
        Self {
            spec,
            tail: Vec::new(),
            sequence: 0,
            next_start_secs: 0.0,
        }
    }

    /// Interleaved samples still needed before [`assemble`](Self::assemble)
    /// can produce a chunk.
    pub fn samples_needed(&self) -> usize {
        let per_chunk = self.spec.chunk_frames() * self.spec.channels as usize;
        per_chunk.saturating_sub(self.tail.len())
    }

    /// Builds a chunk from the retained tail plus `fresh` new samples.
    ///
    /// `fresh` must contain exactly [`samples_needed`](Self::samples_needed)
    /// interleaved samples.
    pub fn assemble(&mut self, fresh: &[i16]) -> AudioChunk {
        let mut samples = std::mem::take(&mut self.tail);
        samples.extend_from_slice(fresh);

        let chunk = AudioChunk::new(
            samples,
            self.spec.sample_rate,
            self.spec.channels,
            self.next_start_secs,
            self.spec.chunk_duration,
            if self.sequence == 0 {
                // First chunk of a session has no predecessor to overlap.
                Duration::ZERO
            } else {
                self.spec.overlap
            },
            self.sequence,
        );

        // Retain the trailing overlap for the next chunk.
        let overlap_samples = self.spec.overlap_frames() * self.spec.channels as usize;
        if overlap_samples > 0 && chunk.samples.len() >= overlap_samples {
            self.tail = chunk.samples[chunk.samples.len() - overlap_samples..].to_vec();
        }

        self.sequence += 1;
        self.next_start_secs += self.spec.chunk_duration.as_secs_f64()
            - self.spec.overlap.as_secs_f64().min(self.spec.chunk_duration.as_secs_f64());
        chunk
    }

    /// Builds a final, shorter chunk from whatever samples remain.
    ///
    /// Returns `None` when nothing beyond the already-emitted tail is left.
    pub fn assemble_partial(&mut self, fresh: &[i16]) -> Option<AudioChunk> {
        if fresh.is_empty() {
            return None;
        }
        let mut samples = std::mem::take(&mut self.tail);
        samples.extend_from_slice(fresh);

        let frames = samples.len() / self.spec.channels.max(1) as usize;
        let duration = Duration::from_secs_f64(frames as f64 / self.spec.sample_rate as f64);
        let chunk = AudioChunk::new(
            samples,
            self.spec.sample_rate,
            self.spec.channels,
            self.next_start_secs,
            duration,
            if self.sequence == 0 {
                Duration::ZERO
            } else {
                self.spec.overlap.min(duration)
            },
            self.sequence,
        );
        self.sequence += 1;
        Some(chunk)
    }
}

/// Mock audio source for testing.
///
/// Serves pre-scripted chunks in order, with optional scripted failures.
pub struct MockChunkSource {
    spec: CaptureSpec,
    queue: VecDeque<Result<Option<AudioChunk>>>,
    opened: bool,
    fail_open: Option<String>,
}

impl MockChunkSource {
    /// Create a mock source with the given capture spec.
    pub fn new(spec: CaptureSpec) -> Self {
        Self {
            spec,
            queue: VecDeque::new(),
            opened: false,
            fail_open: None,
        }
    }

    /// Queue a chunk to be returned by the next `capture` call.
    pub fn push_chunk(mut self, chunk: AudioChunk) -> Self {
        self.queue.push_back(Ok(Some(chunk)));
        self
    }

    /// Queue a capture failure.
    pub fn push_error(mut self, error: StreamscribeError) -> Self {
        self.queue.push_back(Err(error));
        self
    }

    /// Configure `open` to fail with a device error.
    pub fn with_open_failure(mut self, message: &str) -> Self {
        self.fail_open = Some(message.to_string());
        self
    }

    /// Whether `open` has been called successfully.
    pub fn is_open(&self) -> bool {
        self.opened
    }
}

impl AudioSource for MockChunkSource {
    fn open(&mut self) -> Result<()> {
        if let Some(message) = &self.fail_open {
            return Err(StreamscribeError::Device {
                message: message.clone(),
            });
        }
        self.opened = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<AudioChunk>> {
        match self.queue.pop_front() {
            Some(item) => item,
            // Scripted chunks exhausted: behave like a finite source.
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn spec(&self) -> &CaptureSpec {
        &self.spec
    }
}
