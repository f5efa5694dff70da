//! Session controller that runs capture, conditioning, gating, inference
//! and stitching from startup until shutdown.
//!
//! Capture runs on its own thread and feeds chunks through a bounded
//! channel, so the next chunk is being recorded while the current one is
//! transcribed. The processing thread owns the conditioner, gate, backend,
//! stitcher and stats exclusively; nothing here takes a lock.

use crate::audio::conditioner::SignalConditioner;
use crate::audio::gate::ActivityGate;
use crate::audio::source::AudioSource;
use crate::audio::chunk::AudioChunk;
use crate::defaults;
use crate::error::{Result, StreamscribeError};
use crate::pipeline::reporter::{AnomalyReporter, LogReporter, PipelineAnomaly};
use crate::pipeline::sink::TranscriptSink;
use crate::pipeline::stats::{ChunkTiming, PerformanceTracker, SessionSummary};
use crate::pipeline::stitcher::TranscriptStitcher;
use crate::pipeline::transcript::RunningTranscript;
use crate::stt::backend::InferenceBackend;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

/// Where the session currently is in its processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Conditioning,
    Gating,
    Transcribing,
    SkippingSilence,
    Stitching,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Capturing => "capturing",
            PipelineState::Conditioning => "conditioning",
            PipelineState::Gating => "gating",
            PipelineState::Transcribing => "transcribing",
            PipelineState::SkippingSilence => "skipping-silence",
            PipelineState::Stitching => "stitching",
            PipelineState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// What the capture thread hands to the processing loop.
enum CaptureEvent {
    Chunk(AudioChunk),
    /// A transient capture failure the thread is about to retry.
    Retry(StreamscribeError),
    /// Capture ended with an unrecoverable error.
    Failed(StreamscribeError),
    /// Finite source drained cleanly.
    End,
}

/// Result of a completed session.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The full stitched transcript.
    pub transcript: String,
    /// Aggregated performance statistics.
    pub summary: SessionSummary,
    /// Whatever the sink accumulated, if it collects.
    pub collected: Option<String>,
}

/// Drives one transcription session end to end.
pub struct PipelineController {
    conditioner: SignalConditioner,
    gate: ActivityGate,
    stitcher: TranscriptStitcher,
    transcript: RunningTranscript,
    tracker: PerformanceTracker,
    state: PipelineState,
    reporter: Option<Box<dyn AnomalyReporter>>,
    stop: Arc<AtomicBool>,
    queue_depth: usize,
    capture_retries: u32,
    context_words: usize,
    verbosity: u8,
    quiet: bool,
}

impl PipelineController {
    pub fn new(
        conditioner: SignalConditioner,
        gate: ActivityGate,
        stitcher: TranscriptStitcher,
    ) -> Self {
        Self {
            conditioner,
            gate,
            stitcher,
            transcript: RunningTranscript::new(),
            tracker: PerformanceTracker::new(),
            state: PipelineState::Idle,
            reporter: None,
            stop: Arc::new(AtomicBool::new(false)),
            queue_depth: defaults::CAPTURE_QUEUE_DEPTH,
            capture_retries: defaults::CAPTURE_RETRIES,
            context_words: 0,
            verbosity: 0,
            quiet: false,
        }
    }

    /// Sets verbosity (0=results, 1=progress, 2=diagnostics).
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Suppress the session summary on stderr.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_capture_retries(mut self, retries: u32) -> Self {
        self.capture_retries = retries;
        self
    }

    /// Replaces the default stderr reporter. Anomalies always reach a
    /// custom reporter unfiltered; the default filters by verbosity.
    pub fn with_reporter(mut self, reporter: Box<dyn AnomalyReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    fn report(&mut self, anomaly: PipelineAnomaly) {
        match &mut self.reporter {
            Some(reporter) => reporter.report(&anomaly),
            None => LogReporter::new(self.verbosity).report(&anomaly),
        }
    }

    /// Shared stop flag. Setting it stops the session at the next chunk
    /// boundary; in-flight capture and inference complete first.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the session until the source drains, the stop flag is set, or
    /// a fatal error occurs.
    ///
    /// The backend is loaded before the first chunk and unloaded on every
    /// exit path. The sink's `finish` and the stats summary run in all
    /// cases, including fatal errors.
    pub fn run(
        mut self,
        mut source: Box<dyn AudioSource>,
        backend: &mut dyn InferenceBackend,
        sink: &mut dyn TranscriptSink,
    ) -> Result<SessionOutcome> {
        self.validate_chunk_shape(source.spec().chunk_duration, backend)?;

        // Recent-transcript context window: the last few chunks' worth of
        // words, sized the same way the stitcher predicts word counts.
        self.context_words = (source.spec().chunk_duration.as_secs_f64()
            * defaults::WORDS_PER_SECOND as f64)
            .round() as usize
            * defaults::CONTEXT_CHUNKS;

        backend.load()?;
        if let Err(e) = source.open() {
            let _ = backend.unload();
            return Err(e);
        }

        if self.verbosity >= 1 {
            eprintln!(
                "streamscribe: session started (backend: {}, chunk: {:.1}s, overlap: {:.1}s)",
                backend.name(),
                source.spec().chunk_duration.as_secs_f64(),
                source.spec().overlap.as_secs_f64(),
            );
        }

        let session_error = self.run_loop(source, backend, sink);

        self.state = PipelineState::Stopped;
        if let Err(e) = backend.unload() {
            eprintln!("streamscribe: failed to unload backend: {e}");
        }

        let collected = sink.finish();
        if !self.quiet {
            self.tracker.print_summary();
        }

        match session_error {
            Some(e) => Err(e),
            None => Ok(SessionOutcome {
                transcript: self.transcript.text(),
                summary: self.tracker.summary(),
                collected,
            }),
        }
    }

    /// Fixed-shape backends must match the session's chunk duration.
    fn validate_chunk_shape(
        &self,
        chunk_duration: std::time::Duration,
        backend: &dyn InferenceBackend,
    ) -> Result<()> {
        if let Some(required) = backend.required_samples() {
            let produced = (chunk_duration.as_secs_f64() * defaults::MODEL_SAMPLE_RATE as f64)
                .round() as usize;
            if produced != required {
                return Err(StreamscribeError::ChunkSizeMismatch {
                    expected_samples: required,
                    actual_samples: produced,
                });
            }
        }
        Ok(())
    }

    /// The processing loop proper. Returns the fatal error that ended the
    /// session, if any.
    fn run_loop(
        &mut self,
        source: Box<dyn AudioSource>,
        backend: &mut dyn InferenceBackend,
        sink: &mut dyn TranscriptSink,
    ) -> Option<StreamscribeError> {
        let (tx, rx) = bounded::<CaptureEvent>(self.queue_depth);
        let capture_handle = spawn_capture_thread(source, tx, self.stop.clone(), self.capture_retries);

        let mut gap_since_last = false;
        let mut warned_behind = false;
        let mut session_error: Option<StreamscribeError> = None;

        self.state = PipelineState::Capturing;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let event = match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match event {
                CaptureEvent::Chunk(chunk) => {
                    self.tracker.record_captured();

                    // The channel holding a full backlog means inference is
                    // not keeping up with capture.
                    if rx.len() >= self.queue_depth && !warned_behind {
                        let speed_factor = self.tracker.speed_factor();
                        self.report(PipelineAnomaly::FallingBehind { speed_factor });
                        warned_behind = true;
                    }

                    match self.process_chunk(&chunk, backend, sink, &mut gap_since_last) {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            eprintln!("streamscribe: fatal error on chunk {}: {e}", chunk.sequence);
                            session_error = Some(e);
                            self.stop.store(true, Ordering::SeqCst);
                            break;
                        }
                        Err(e) => {
                            // Malformed chunk: drop it and keep going. The
                            // gap breaks overlap continuity like silence does.
                            self.report(PipelineAnomaly::ChunkDropped {
                                sequence: chunk.sequence,
                                message: e.to_string(),
                            });
                            gap_since_last = true;
                        }
                    }

                    if !warned_behind && self.tracker.is_falling_behind() {
                        let speed_factor = self.tracker.speed_factor();
                        self.report(PipelineAnomaly::FallingBehind { speed_factor });
                        warned_behind = true;
                    }
                    self.state = PipelineState::Capturing;
                }
                CaptureEvent::Retry(e) => {
                    self.tracker.record_retry();
                    self.report(PipelineAnomaly::CaptureRetry {
                        message: e.to_string(),
                    });
                }
                CaptureEvent::Failed(e) => {
                    eprintln!("streamscribe: capture ended: {e}");
                    session_error = Some(e);
                    break;
                }
                CaptureEvent::End => {
                    if self.verbosity >= 1 {
                        eprintln!("streamscribe: audio source drained");
                    }
                    break;
                }
            }
        }

        // Let the capture thread observe the stop flag and exit.
        self.stop.store(true, Ordering::SeqCst);
        drop(rx);
        if capture_handle.join().is_err() {
            eprintln!("streamscribe: capture thread panicked");
        }

        session_error
    }

    /// Condition → gate → transcribe → stitch for one chunk.
    fn process_chunk(
        &mut self,
        chunk: &AudioChunk,
        backend: &mut dyn InferenceBackend,
        sink: &mut dyn TranscriptSink,
        gap_since_last: &mut bool,
    ) -> Result<()> {
        self.state = PipelineState::Conditioning;
        let conditioning_start = Instant::now();
        let waveform = self.conditioner.condition(chunk)?;
        let conditioning = conditioning_start.elapsed();

        self.state = PipelineState::Gating;
        let decision = self.gate.assess(&waveform);
        if !decision.is_active() {
            self.state = PipelineState::SkippingSilence;
            self.tracker.record_skipped(chunk.duration);
            // The skipped chunk's content never reached the stitcher, so
            // the next chunk's overlap has nothing to match against.
            *gap_since_last = true;
            self.report(PipelineAnomaly::SilenceSkipped {
                sequence: chunk.sequence,
                energy: decision.energy,
            });
            return Ok(());
        }

        self.state = PipelineState::Transcribing;
        if !self.transcript.is_empty() {
            let context = self
                .transcript
                .tail(self.context_words)
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            backend.set_context(&context);
        }
        let inference_start = Instant::now();
        let result = backend.transcribe(&waveform.samples)?;
        let inference = inference_start.elapsed();

        self.state = PipelineState::Stitching;
        let continuous = !*gap_since_last;
        *gap_since_last = false;
        let outcome = self.stitcher.stitch(&result, continuous);
        if outcome.ambiguous {
            self.tracker.record_ambiguous();
            self.report(PipelineAnomaly::AmbiguousStitch {
                sequence: chunk.sequence,
            });
        }

        if !outcome.words.is_empty() {
            let fragment = outcome
                .words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            sink.emit(&fragment)?;
            self.transcript.push_words(outcome.words);
        }

        self.tracker.record_timing(ChunkTiming {
            conditioning,
            inference,
            audio_duration: chunk.duration,
        });
        Ok(())
    }
}

/// Captures chunks on a dedicated thread so the device keeps recording
/// while inference runs. Timeouts are retried up to `max_retries` times
/// in a row; any other error ends the session.
fn spawn_capture_thread(
    mut source: Box<dyn AudioSource>,
    tx: crossbeam_channel::Sender<CaptureEvent>,
    stop: Arc<AtomicBool>,
    max_retries: u32,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut consecutive_retries: u32 = 0;
        while !stop.load(Ordering::SeqCst) {
            match source.capture() {
                Ok(Some(chunk)) => {
                    consecutive_retries = 0;
                    // Blocking send gives backpressure: at most one chunk
                    // queued behind the one being processed.
                    if tx.send(CaptureEvent::Chunk(chunk)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(CaptureEvent::End);
                    break;
                }
                Err(e @ StreamscribeError::CaptureTimeout { .. })
                    if consecutive_retries < max_retries =>
                {
                    consecutive_retries += 1;
                    if tx.send(CaptureEvent::Retry(e)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(CaptureEvent::Failed(e));
                    break;
                }
            }
        }
        if let Err(e) = source.close() {
            eprintln!("streamscribe: failed to close audio source: {e}");
        }
    })
}
