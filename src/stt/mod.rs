//! Speech-to-text inference backends.

pub mod accelerated;
pub mod backend;
pub mod whisper;

pub use accelerated::{
    AcceleratedBackend, AcceleratorDevice, MockAcceleratorDevice, ProgramVariant,
};
pub use backend::{InferenceBackend, MockBackend, TranscriptionResult, WordToken};
pub use whisper::{WhisperBackend, WhisperConfig};
