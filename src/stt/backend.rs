//! Inference backend abstraction.
//!
//! One trait covers both the general CPU path (whisper.cpp, arbitrary
//! input length) and fixed-shape accelerator programs that only accept
//! exactly one input size. The pipeline never needs to know which it is
//! talking to; the one shape-specific concern is exposed through
//! [`InferenceBackend::required_samples`].

use crate::error::{Result, StreamscribeError};
use std::collections::VecDeque;

/// One recognized word with optional per-word metadata.
///
/// Confidence and timing are best-effort: backends that cannot produce
/// them leave the fields `None` and the stitcher falls back to
/// position-based heuristics.
#[derive(Debug, Clone, PartialEq)]
pub struct WordToken {
    pub text: String,
    /// Recognition confidence in [0, 1], when the backend reports one.
    pub confidence: Option<f32>,
    /// Offset of the word from the start of the chunk, in seconds.
    pub start_secs: Option<f32>,
}

impl WordToken {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            confidence: None,
            start_secs: None,
        }
    }
}

/// Transcription of one conditioned chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionResult {
    pub words: Vec<WordToken>,
}

impl TranscriptionResult {
    /// Builds a result from plain text, splitting on whitespace.
    ///
    /// Used by backends that only return a flat string.
    pub fn from_text(text: &str) -> Self {
        Self {
            words: text.split_whitespace().map(WordToken::new).collect(),
        }
    }

    /// The result joined back into a single space-separated string.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Trait for speech-to-text inference backends.
///
/// This trait allows swapping implementations (whisper.cpp, accelerator,
/// mock). Model weights are heavy, so loading is explicit: the pipeline
/// calls [`load`](Self::load) once before the session and
/// [`unload`](Self::unload) on every exit path.
pub trait InferenceBackend: Send {
    /// Load model weights into memory. Idempotent.
    fn load(&mut self) -> Result<()>;

    /// Release model weights. Idempotent.
    fn unload(&mut self) -> Result<()>;

    /// Transcribe mono 16 kHz float samples in [-1, 1].
    ///
    /// Fails with `Inference` on model errors and `ChunkSizeMismatch`
    /// when a fixed-shape backend receives the wrong input length.
    fn transcribe(&mut self, samples: &[f32]) -> Result<TranscriptionResult>;

    /// Recent transcript text to condition the next `transcribe` call on,
    /// for cross-chunk accuracy. Backends that cannot use it ignore it.
    fn set_context(&mut self, _context: &str) {}

    /// Exact input length a fixed-shape backend requires, or `None` for
    /// backends accepting arbitrary lengths.
    fn required_samples(&self) -> Option<usize> {
        None
    }

    /// Human-readable backend name for logs and summaries.
    fn name(&self) -> &str;
}

/// Mock backend for testing.
///
/// Serves scripted results in order; once the script is exhausted it
/// returns an empty result. Records the sample count of every call so
/// tests can assert what the pipeline actually fed it.
pub struct MockBackend {
    name: String,
    script: VecDeque<Result<TranscriptionResult>>,
    loaded: bool,
    fail_load: bool,
    required: Option<usize>,
    call_lengths: Vec<usize>,
    contexts: Vec<String>,
    unload_count: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            script: VecDeque::new(),
            loaded: false,
            fail_load: false,
            required: None,
            call_lengths: Vec::new(),
            contexts: Vec::new(),
            unload_count: 0,
        }
    }

    /// Queue a transcription to be returned by the next call.
    pub fn with_transcription(mut self, text: &str) -> Self {
        self.script
            .push_back(Ok(TranscriptionResult::from_text(text)));
        self
    }

    /// Queue a transcription failure.
    pub fn with_error(mut self, message: &str) -> Self {
        self.script.push_back(Err(StreamscribeError::Inference {
            message: message.to_string(),
        }));
        self
    }

    /// Configure `load` to fail.
    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Simulate a fixed-shape backend requiring exactly `n` samples.
    pub fn with_required_samples(mut self, n: usize) -> Self {
        self.required = Some(n);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Sample counts of every `transcribe` call, in order.
    pub fn call_lengths(&self) -> &[usize] {
        &self.call_lengths
    }

    /// Context strings received via `set_context`, in order.
    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }

    pub fn unload_count(&self) -> u32 {
        self.unload_count
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn load(&mut self) -> Result<()> {
        if self.fail_load {
            return Err(StreamscribeError::Inference {
                message: "mock load failure".to_string(),
            });
        }
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.loaded = false;
        self.unload_count += 1;
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32]) -> Result<TranscriptionResult> {
        if !self.loaded {
            return Err(StreamscribeError::Inference {
                message: "transcribe called before load".to_string(),
            });
        }
        if let Some(required) = self.required
            && samples.len() != required
        {
            return Err(StreamscribeError::ChunkSizeMismatch {
                expected_samples: required,
                actual_samples: samples.len(),
            });
        }
        self.call_lengths.push(samples.len());
        match self.script.pop_front() {
            Some(result) => result,
            None => Ok(TranscriptionResult::default()),
        }
    }

    fn set_context(&mut self, context: &str) {
        self.contexts.push(context.to_string());
    }

    fn required_samples(&self) -> Option<usize> {
        self.required
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_splits_on_whitespace() {
        let result = TranscriptionResult::from_text("  the quick   brown fox ");
        assert_eq!(result.words.len(), 4);
        assert_eq!(result.words[0].text, "the");
        assert_eq!(result.words[3].text, "fox");
        assert_eq!(result.text(), "the quick brown fox");
    }

    #[test]
    fn test_empty_text_yields_empty_result() {
        let result = TranscriptionResult::from_text("   ");
        assert!(result.is_empty());
        assert_eq!(result.text(), "");
    }

    #[test]
    fn test_word_token_has_no_metadata_by_default() {
        let token = WordToken::new("hello");
        assert_eq!(token.confidence, None);
        assert_eq!(token.start_secs, None);
    }

    #[test]
    fn test_mock_backend_serves_scripted_results_in_order() {
        let mut backend = MockBackend::new()
            .with_transcription("first chunk")
            .with_transcription("second chunk");
        backend.load().unwrap();

        assert_eq!(backend.transcribe(&[0.0; 10]).unwrap().text(), "first chunk");
        assert_eq!(
            backend.transcribe(&[0.0; 10]).unwrap().text(),
            "second chunk"
        );
        // Script exhausted: empty result, not an error.
        assert!(backend.transcribe(&[0.0; 10]).unwrap().is_empty());
    }

    #[test]
    fn test_mock_backend_requires_load_first() {
        let mut backend = MockBackend::new().with_transcription("text");
        let err = backend.transcribe(&[0.0; 10]).unwrap_err();
        assert!(matches!(err, StreamscribeError::Inference { .. }));
    }

    #[test]
    fn test_mock_backend_scripted_error() {
        let mut backend = MockBackend::new().with_error("model crashed");
        backend.load().unwrap();
        match backend.transcribe(&[0.0; 10]) {
            Err(StreamscribeError::Inference { message }) => {
                assert_eq!(message, "model crashed");
            }
            other => panic!("Expected Inference error, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_backend_load_failure() {
        let mut backend = MockBackend::new().with_load_failure();
        assert!(backend.load().is_err());
        assert!(!backend.is_loaded());
    }

    #[test]
    fn test_mock_backend_fixed_shape_rejects_wrong_length() {
        let mut backend = MockBackend::new()
            .with_required_samples(160000)
            .with_transcription("ok");
        backend.load().unwrap();

        match backend.transcribe(&[0.0; 80000]) {
            Err(StreamscribeError::ChunkSizeMismatch {
                expected_samples,
                actual_samples,
            }) => {
                assert_eq!(expected_samples, 160000);
                assert_eq!(actual_samples, 80000);
            }
            other => panic!("Expected ChunkSizeMismatch, got {:?}", other),
        }

        assert!(backend.transcribe(&vec![0.0; 160000]).is_ok());
    }

    #[test]
    fn test_mock_backend_records_call_lengths() {
        let mut backend = MockBackend::new()
            .with_transcription("a")
            .with_transcription("b");
        backend.load().unwrap();
        backend.transcribe(&[0.0; 5]).unwrap();
        backend.transcribe(&[0.0; 7]).unwrap();
        assert_eq!(backend.call_lengths(), &[5, 7]);
    }

    #[test]
    fn test_mock_backend_records_contexts() {
        let mut backend = MockBackend::new().with_transcription("a");
        backend.load().unwrap();
        backend.set_context("previously spoken words");
        backend.transcribe(&[0.0; 5]).unwrap();
        assert_eq!(backend.contexts(), &["previously spoken words".to_string()]);
    }

    #[test]
    fn test_backend_trait_is_object_safe() {
        let mut backend: Box<dyn InferenceBackend> =
            Box::new(MockBackend::new().with_transcription("boxed"));
        backend.load().unwrap();
        assert_eq!(backend.transcribe(&[0.0; 10]).unwrap().text(), "boxed");
        assert_eq!(backend.required_samples(), None);
        assert_eq!(backend.name(), "mock");
        backend.unload().unwrap();
    }

    #[test]
    fn test_unload_is_counted_and_idempotent() {
        let mut backend = MockBackend::new();
        backend.load().unwrap();
        backend.unload().unwrap();
        backend.unload().unwrap();
        assert_eq!(backend.unload_count(), 2);
        assert!(!backend.is_loaded());
    }
}
