//! Reporting for pipeline-internal anomalies.
//!
//! Anomalies are conditions worth surfacing that do not end the session:
//! retried captures, dropped chunks, ambiguous stitches. Fatal errors do
//! not go through here; they travel the `Result` path.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Non-fatal conditions the running pipeline surfaces.
#[derive(Debug, Clone)]
pub enum PipelineAnomaly {
    /// Transient capture failure about to be retried.
    CaptureRetry { message: String },
    /// A malformed chunk was dropped.
    ChunkDropped { sequence: u64, message: String },
    /// A chunk was gated out as silence.
    SilenceSkipped { sequence: u64, energy: f32 },
    /// A chunk boundary was appended without a trustworthy overlap match.
    AmbiguousStitch { sequence: u64 },
    /// Inference is not keeping up with capture.
    FallingBehind { speed_factor: f64 },
}

impl fmt::Display for PipelineAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineAnomaly::CaptureRetry { message } => {
                write!(f, "capture failed, retrying: {message}")
            }
            PipelineAnomaly::ChunkDropped { sequence, message } => {
                write!(f, "dropping chunk {sequence}: {message}")
            }
            PipelineAnomaly::SilenceSkipped { sequence, energy } => {
                write!(f, "chunk {sequence} gated out as silence (energy {energy:.5})")
            }
            PipelineAnomaly::AmbiguousStitch { sequence } => {
                write!(
                    f,
                    "chunk {sequence}: no trustworthy overlap match, appending as-is"
                )
            }
            PipelineAnomaly::FallingBehind { speed_factor } => {
                write!(
                    f,
                    "warning: transcription is falling behind real-time \
                     (speed factor {speed_factor:.2})"
                )
            }
        }
    }
}

/// Trait for reporting pipeline anomalies.
pub trait AnomalyReporter: Send {
    fn report(&mut self, anomaly: &PipelineAnomaly);
}

/// Logs anomalies to stderr, filtered by verbosity.
///
/// Falling-behind and retry conditions always print; dropped chunks at
/// `-v`; silence skips and ambiguous stitches at `-vv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter {
    verbosity: u8,
}

impl LogReporter {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    fn threshold(anomaly: &PipelineAnomaly) -> u8 {
        match anomaly {
            PipelineAnomaly::CaptureRetry { .. } | PipelineAnomaly::FallingBehind { .. } => 0,
            PipelineAnomaly::ChunkDropped { .. } => 1,
            PipelineAnomaly::SilenceSkipped { .. } | PipelineAnomaly::AmbiguousStitch { .. } => 2,
        }
    }
}

impl AnomalyReporter for LogReporter {
    fn report(&mut self, anomaly: &PipelineAnomaly) {
        if self.verbosity >= Self::threshold(anomaly) {
            eprintln!("streamscribe: {anomaly}");
        }
    }
}

/// Collects anomalies for test assertions. Clones share the same
/// backing store, so a handle kept outside the controller sees what
/// the controller reported.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reported: Arc<Mutex<Vec<PipelineAnomaly>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported(&self) -> Vec<PipelineAnomaly> {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AnomalyReporter for CollectingReporter {
    fn report(&mut self, anomaly: &PipelineAnomaly) {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(anomaly.clone());
    }
}
