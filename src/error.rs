//! Error types for streamscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamscribeError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture device errors
    #[error("Capture device error: {message}")]
    Device { message: String },

    #[error("Capture stalled: no audio after {seconds:.1}s")]
    CaptureTimeout { seconds: f64 },

    // Content-level errors (recovered locally, never abort the session)
    #[error("Invalid audio chunk: {message}")]
    InvalidChunk { message: String },

    // Backend contract violation (caught by config validation before a
    // session starts; the runtime guard exists so a bad waveform can never
    // reach the accelerator)
    #[error("Chunk size mismatch: backend requires {expected_samples} samples, got {actual_samples} samples")]
    ChunkSizeMismatch {
        expected_samples: usize,
        actual_samples: usize,
    },

    // Inference errors (fatal for the session)
    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Model not found at {path}")]
    ModelNotFound { path: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, StreamscribeError>;

impl StreamscribeError {
    /// True for errors that end the session; content-level anomalies
    /// (`InvalidChunk`) are recovered locally and never abort.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StreamscribeError::InvalidChunk { .. })
    }
}
