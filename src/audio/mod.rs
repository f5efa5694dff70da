//! Audio acquisition and conditioning.
//!
//! Sources produce fixed-duration overlapping chunks of raw interleaved
//! PCM; the conditioner converts them to the mono 16 kHz float format the
//! inference backends consume; the gate drops chunks that carry no speech.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod chunk;
pub mod conditioner;
pub mod gate;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::{CpalChunkSource, list_devices, suppress_audio_warnings};
pub use chunk::AudioChunk;
pub use conditioner::{ChannelMode, ConditionedWaveform, SignalConditioner};
pub use gate::{ActivityDecision, ActivityGate, EnergyVad, VerdictSource};
pub use source::{AudioSource, CaptureSpec, ChunkAssembler, MockChunkSource};
pub use wav::WavFileSource;
