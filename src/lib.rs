//! streamscribe - continuous speech-to-text for single-board computers.
//!
//! Captures overlapping audio chunks, conditions them to the 16 kHz mono
//! model format, gates out silence, transcribes with a swappable backend,
//! and stitches chunk transcripts into one continuous text stream.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod stt;

// Core traits (source → condition → gate → transcribe → stitch → sink)
pub use audio::source::AudioSource;
pub use pipeline::sink::{CollectorSink, StdoutSink, TranscriptSink};
pub use stt::backend::InferenceBackend;

// Pipeline
pub use pipeline::controller::{PipelineController, PipelineState, SessionOutcome};
pub use pipeline::reporter::{AnomalyReporter, LogReporter, PipelineAnomaly};

// Error handling
pub use error::{Result, StreamscribeError};

// Config
pub use config::{BackendKind, Config};
