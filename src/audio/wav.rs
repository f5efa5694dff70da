//! WAV file audio source for pipe mode and offline runs.

use crate::audio::chunk::AudioChunk;
use crate::audio::source::{AudioSource, CaptureSpec, ChunkAssembler};
use crate::error::{Result, StreamscribeError};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Finite audio source backed by WAV file data.
///
/// Samples stay at the file's native rate and channel layout; the
/// conditioner owns mixdown and resampling. Chunks come out with the
/// same overlap structure a live source would produce, and `capture`
/// returns `Ok(None)` once the file is exhausted.
pub struct WavFileSource {
    samples: Vec<i16>,
    position: usize,
    spec: CaptureSpec,
    assembler: ChunkAssembler,
    drained: bool,
}

impl WavFileSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        chunk_duration: Duration,
        overlap: Duration,
    ) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| StreamscribeError::Device {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let wav_spec = wav_reader.spec();
        if wav_spec.channels == 0 {
            return Err(StreamscribeError::Device {
                message: "WAV file declares zero channels".to_string(),
            });
        }

        let samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StreamscribeError::Device {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let spec = CaptureSpec {
            sample_rate: wav_spec.sample_rate,
            channels: wav_spec.channels,
            chunk_duration,
            overlap,
        };

        Ok(Self {
            samples,
            position: 0,
            spec,
            assembler: ChunkAssembler::new(spec),
            drained: false,
        })
    }

    /// Create from a WAV file on disk.
    pub fn from_path(
        path: &Path,
        chunk_duration: Duration,
        overlap: Duration,
    ) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(file), chunk_duration, overlap)
    }

    /// Create from stdin.
    pub fn from_stdin(chunk_duration: Duration, overlap: Duration) -> Result<Self> {
        use std::io::Cursor;

        // Read all of stdin into memory first (StdinLock is not Send).
        let mut buffer = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .map_err(|e| StreamscribeError::Device {
                message: format!("Failed to read from stdin: {}", e),
            })?;

        Self::from_reader(Box::new(Cursor::new(buffer)), chunk_duration, overlap)
    }

    fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for WavFileSource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<AudioChunk>> {
        if self.drained {
            return Ok(None);
        }

        let needed = self.assembler.samples_needed();
        if self.remaining() >= needed {
            let fresh = &self.samples[self.position..self.position + needed];
            self.position += needed;
            return Ok(Some(self.assembler.assemble(fresh)));
        }

        // Tail of the file: emit one shorter final chunk, then EOF.
        self.drained = true;
        let fresh = &self.samples[self.position..];
        self.position = self.samples.len();
        Ok(self.assembler.assemble_partial(fresh))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn spec(&self) -> &CaptureSpec {
        &self.spec
    }
}
