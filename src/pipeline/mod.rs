//! Transcription pipeline: capture feeds a processing loop that
//! conditions, gates, transcribes and stitches each chunk, with a bounded
//! crossbeam channel between the capture thread and the processor.

pub mod controller;
pub mod reporter;
pub mod sink;
pub mod stats;
pub mod stitcher;
pub mod transcript;

pub use controller::{PipelineController, PipelineState, SessionOutcome};
pub use reporter::{AnomalyReporter, CollectingReporter, LogReporter, PipelineAnomaly};
pub use sink::{CollectorSink, StdoutSink, TranscriptSink};
pub use stats::{ChunkTiming, PerformanceTracker, SessionSummary};
pub use stitcher::{StitchOutcome, StitcherConfig, TranscriptStitcher};
pub use transcript::RunningTranscript;
