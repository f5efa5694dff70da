//! Fixed-shape accelerator backend.
//!
//! NPU HATs for the target hardware run whisper as a pair of compiled
//! encoder/decoder programs with a hard-wired input size: the program
//! variant dictates the chunk duration, not the other way round. The
//! device itself sits behind [`AcceleratorDevice`] so the backend logic
//! (program resolution, shape validation, lifecycle) is testable without
//! the HAT.

use crate::defaults;
use crate::error::{Result, StreamscribeError};
use crate::stt::backend::{InferenceBackend, TranscriptionResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Compiled program variant, which fixes the chunk duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramVariant {
    /// Fastest; requires 10 s chunks.
    Tiny,
    /// Better quality; requires 5 s chunks.
    Base,
}

impl ProgramVariant {
    /// Parse from a config value.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            other => Err(StreamscribeError::ConfigInvalidValue {
                key: "stt.variant".to_string(),
                message: format!("unknown program variant '{}', expected tiny or base", other),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
        }
    }

    /// Chunk duration the compiled program was built for.
    pub fn chunk_duration(self) -> Duration {
        match self {
            Self::Tiny => Duration::from_secs(10),
            Self::Base => Duration::from_secs(5),
        }
    }

    /// Exact input length in mono 16 kHz samples.
    pub fn required_samples(self) -> usize {
        self.chunk_duration().as_secs() as usize * defaults::MODEL_SAMPLE_RATE as usize
    }

    /// Encoder program filename. The tiny build carries a "15dB" gain
    /// stage in its name, the base build does not.
    pub fn encoder_filename(self) -> String {
        match self {
            Self::Tiny => format!(
                "tiny-whisper-encoder-{}s_15dB_h8l.hef",
                self.chunk_duration().as_secs()
            ),
            Self::Base => format!(
                "base-whisper-encoder-{}s_h8l.hef",
                self.chunk_duration().as_secs()
            ),
        }
    }

    /// Decoder program filename.
    pub fn decoder_filename(self) -> String {
        format!(
            "{}-whisper-decoder-fixed-sequence-matmul-split_h8l.hef",
            self.as_str()
        )
    }

    /// Encoder path under `program_dir`, which contains one subdirectory
    /// per variant.
    pub fn encoder_path(self, program_dir: &Path) -> PathBuf {
        program_dir.join(self.as_str()).join(self.encoder_filename())
    }

    /// Decoder path under `program_dir`.
    pub fn decoder_path(self, program_dir: &Path) -> PathBuf {
        program_dir.join(self.as_str()).join(self.decoder_filename())
    }
}

/// Trait for the accelerator device itself.
///
/// This trait allows swapping implementations (real NPU vs mock). The
/// backend validates input shape before calling into the device, so
/// implementations may assume correctly sized input.
pub trait AcceleratorDevice: Send {
    /// Load the compiled encoder/decoder pair onto the device.
    fn load_program(&mut self, encoder: &Path, decoder: &Path) -> Result<()>;

    /// Run inference on exactly one correctly sized chunk.
    fn infer(&mut self, samples: &[f32]) -> Result<String>;

    /// Release device resources.
    fn release(&mut self) -> Result<()>;
}

/// Mock accelerator device for testing.
pub struct MockAcceleratorDevice {
    responses: std::collections::VecDeque<Result<String>>,
    loaded: bool,
    fail_load: bool,
    infer_lengths: Vec<usize>,
}

impl MockAcceleratorDevice {
    pub fn new() -> Self {
        Self {
            responses: std::collections::VecDeque::new(),
            loaded: false,
            fail_load: false,
            infer_lengths: Vec::new(),
        }
    }

    pub fn with_response(mut self, text: &str) -> Self {
        self.responses.push_back(Ok(text.to_string()));
        self
    }

    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn infer_lengths(&self) -> &[usize] {
        &self.infer_lengths
    }
}

impl Default for MockAcceleratorDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceleratorDevice for MockAcceleratorDevice {
    fn load_program(&mut self, _encoder: &Path, _decoder: &Path) -> Result<()> {
        if self.fail_load {
            return Err(StreamscribeError::Inference {
                message: "mock device load failure".to_string(),
            });
        }
        self.loaded = true;
        Ok(())
    }

    fn infer(&mut self, samples: &[f32]) -> Result<String> {
        self.infer_lengths.push(samples.len());
        match self.responses.pop_front() {
            Some(result) => result,
            None => Ok(String::new()),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.loaded = false;
        Ok(())
    }
}

/// Accelerator-backed inference.
///
/// Unlike the CPU backend this one is fixed-shape: `transcribe` rejects
/// any input whose length differs from the program's compiled size with
/// `ChunkSizeMismatch`, before the sample ever reaches the device.
pub struct AcceleratedBackend {
    variant: ProgramVariant,
    program_dir: PathBuf,
    device: Box<dyn AcceleratorDevice>,
    loaded: bool,
    name: String,
}

impl AcceleratedBackend {
    pub fn new(
        variant: ProgramVariant,
        program_dir: PathBuf,
        device: Box<dyn AcceleratorDevice>,
    ) -> Self {
        let name = format!("accel-{}", variant.as_str());
        Self {
            variant,
            program_dir,
            device,
            loaded: false,
            name,
        }
    }

    pub fn variant(&self) -> ProgramVariant {
        self.variant
    }
}

impl InferenceBackend for AcceleratedBackend {
    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        let encoder = self.variant.encoder_path(&self.program_dir);
        let decoder = self.variant.decoder_path(&self.program_dir);
        if !encoder.exists() {
            return Err(StreamscribeError::ModelNotFound {
                path: encoder.to_string_lossy().to_string(),
            });
        }
        if !decoder.exists() {
            return Err(StreamscribeError::ModelNotFound {
                path: decoder.to_string_lossy().to_string(),
            });
        }

        self.device.load_program(&encoder, &decoder)?;
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        if self.loaded {
            self.device.release()?;
            self.loaded = false;
        }
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32]) -> Result<TranscriptionResult> {
        if !self.loaded {
            return Err(StreamscribeError::Inference {
                message: "transcribe called before load".to_string(),
            });
        }

        let required = self.variant.required_samples();
        if samples.len() != required {
            return Err(StreamscribeError::ChunkSizeMismatch {
                expected_samples: required,
                actual_samples: samples.len(),
            });
        }

        let text = self.device.infer(samples)?;
        Ok(TranscriptionResult::from_text(&text))
    }

    fn required_samples(&self) -> Option<usize> {
        Some(self.variant.required_samples())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_dir_with_files(variant: ProgramVariant) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let variant_dir = dir.path().join(variant.as_str());
        std::fs::create_dir_all(&variant_dir).unwrap();
        std::fs::write(variant_dir.join(variant.encoder_filename()), b"hef").unwrap();
        std::fs::write(variant_dir.join(variant.decoder_filename()), b"hef").unwrap();
        dir
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!(ProgramVariant::parse("tiny").unwrap(), ProgramVariant::Tiny);
        assert_eq!(ProgramVariant::parse("base").unwrap(), ProgramVariant::Base);
        match ProgramVariant::parse("large") {
            Err(StreamscribeError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "stt.variant");
            }
            _ => panic!("Expected ConfigInvalidValue"),
        }
    }

    #[test]
    fn test_variant_fixes_chunk_duration_and_input_size() {
        assert_eq!(
            ProgramVariant::Tiny.chunk_duration(),
            Duration::from_secs(10)
        );
        assert_eq!(ProgramVariant::Base.chunk_duration(), Duration::from_secs(5));
        assert_eq!(ProgramVariant::Tiny.required_samples(), 160000);
        assert_eq!(ProgramVariant::Base.required_samples(), 80000);
    }

    #[test]
    fn test_program_filenames() {
        assert_eq!(
            ProgramVariant::Tiny.encoder_filename(),
            "tiny-whisper-encoder-10s_15dB_h8l.hef"
        );
        assert_eq!(
            ProgramVariant::Base.encoder_filename(),
            "base-whisper-encoder-5s_h8l.hef"
        );
        assert_eq!(
            ProgramVariant::Base.decoder_filename(),
            "base-whisper-decoder-fixed-sequence-matmul-split_h8l.hef"
        );
    }

    #[test]
    fn test_program_paths_include_variant_subdirectory() {
        let path = ProgramVariant::Tiny.encoder_path(Path::new("/opt/programs"));
        assert_eq!(
            path,
            PathBuf::from("/opt/programs/tiny/tiny-whisper-encoder-10s_15dB_h8l.hef")
        );
    }

    #[test]
    fn test_load_fails_for_missing_programs() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Base,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new()),
        );
        match backend.load() {
            Err(StreamscribeError::ModelNotFound { path }) => {
                assert!(path.contains("base-whisper-encoder"));
            }
            _ => panic!("Expected ModelNotFound"),
        }
    }

    #[test]
    fn test_transcribe_rejects_wrong_input_length() {
        let dir = program_dir_with_files(ProgramVariant::Base);
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Base,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new().with_response("should not be reached")),
        );
        backend.load().unwrap();

        match backend.transcribe(&vec![0.0; 80001]) {
            Err(StreamscribeError::ChunkSizeMismatch {
                expected_samples,
                actual_samples,
            }) => {
                assert_eq!(expected_samples, 80000);
                assert_eq!(actual_samples, 80001);
            }
            other => panic!("Expected ChunkSizeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_transcribe_passes_exact_length_to_device() {
        let dir = program_dir_with_files(ProgramVariant::Base);
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Base,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new().with_response("hello from the device")),
        );
        backend.load().unwrap();

        let result = backend.transcribe(&vec![0.0; 80000]).unwrap();
        assert_eq!(result.text(), "hello from the device");
        assert_eq!(backend.required_samples(), Some(80000));
    }

    #[test]
    fn test_transcribe_before_load_fails() {
        let dir = program_dir_with_files(ProgramVariant::Base);
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Base,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new()),
        );
        let err = backend.transcribe(&vec![0.0; 80000]).unwrap_err();
        assert!(matches!(err, StreamscribeError::Inference { .. }));
    }

    #[test]
    fn test_device_load_failure_propagates() {
        let dir = program_dir_with_files(ProgramVariant::Tiny);
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Tiny,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new().with_load_failure()),
        );
        assert!(backend.load().is_err());
    }

    #[test]
    fn test_unload_is_idempotent() {
        let dir = program_dir_with_files(ProgramVariant::Base);
        let mut backend = AcceleratedBackend::new(
            ProgramVariant::Base,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new()),
        );
        backend.load().unwrap();
        backend.unload().unwrap();
        backend.unload().unwrap();
    }

    #[test]
    fn test_backend_name_carries_variant() {
        let dir = tempfile::tempdir().unwrap();
        let backend = AcceleratedBackend::new(
            ProgramVariant::Tiny,
            dir.path().to_path_buf(),
            Box::new(MockAcceleratorDevice::new()),
        );
        assert_eq!(backend.name(), "accel-tiny");
    }
}
