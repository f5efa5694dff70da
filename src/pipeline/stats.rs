//! Performance measurement and reporting for the transcription session.

use std::time::{Duration, Instant};

/// Timing for one chunk that went through the full path.
#[derive(Debug, Clone)]
pub struct ChunkTiming {
    /// Conditioning time (mixdown, resample, gain).
    pub conditioning: Duration,
    /// Backend inference time.
    pub inference: Duration,
    /// Duration of the chunk's audio content.
    pub audio_duration: Duration,
}

impl ChunkTiming {
    /// Inference time relative to audio time. < 1.0 is faster than
    /// real time.
    pub fn realtime_factor(&self) -> f64 {
        if self.audio_duration.is_zero() {
            return 0.0;
        }
        self.inference.as_secs_f64() / self.audio_duration.as_secs_f64()
    }
}

/// Aggregated session statistics.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Chunks captured, including gated-out ones.
    pub chunks_captured: u64,
    /// Chunks skipped as silence.
    pub chunks_skipped: u64,
    /// Chunks that ran inference.
    pub chunks_transcribed: u64,
    /// Capture attempts that had to be retried.
    pub capture_retries: u64,
    /// Chunk boundaries appended without a trustworthy overlap match.
    pub ambiguous_stitches: u64,
    pub conditioning_avg: Duration,
    pub inference_avg: Duration,
    pub inference_max: Duration,
    pub realtime_factor_avg: f64,
    /// Audio seconds handled per wall second. Every captured chunk counts
    /// its full duration, so overlap is deliberately double-counted: the
    /// backend really does process the overlap twice. Below 1.0 the
    /// session is falling behind live audio.
    pub speed_factor: f64,
    pub wall_time: Duration,
}

/// Collects per-chunk measurements and turns them into a session summary.
pub struct PerformanceTracker {
    started: Instant,
    timings: Vec<ChunkTiming>,
    skipped_audio: Duration,
    chunks_captured: u64,
    chunks_skipped: u64,
    capture_retries: u64,
    ambiguous_stitches: u64,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            timings: Vec::new(),
            skipped_audio: Duration::ZERO,
            chunks_captured: 0,
            chunks_skipped: 0,
            capture_retries: 0,
            ambiguous_stitches: 0,
        }
    }

    pub fn record_captured(&mut self) {
        self.chunks_captured += 1;
    }

    /// A silence-gated chunk. Its audio still went through capture and
    /// conditioning in real time, so its duration counts toward the
    /// speed factor even though no inference ran.
    pub fn record_skipped(&mut self, audio_duration: Duration) {
        self.chunks_skipped += 1;
        self.skipped_audio += audio_duration;
    }

    pub fn record_retry(&mut self) {
        self.capture_retries += 1;
    }

    pub fn record_ambiguous(&mut self) {
        self.ambiguous_stitches += 1;
    }

    pub fn record_timing(&mut self, timing: ChunkTiming) {
        self.timings.push(timing);
    }

    /// Current speed factor over the session so far.
    pub fn speed_factor(&self) -> f64 {
        self.speed_factor_at(self.started.elapsed())
    }

    /// True once the session has measurably fallen behind real time.
    pub fn is_falling_behind(&self) -> bool {
        !self.timings.is_empty() && self.speed_factor() < 1.0
    }

    fn speed_factor_at(&self, wall: Duration) -> f64 {
        if wall.is_zero() {
            return 0.0;
        }
        let audio_secs: f64 = self
            .timings
            .iter()
            .map(|t| t.audio_duration.as_secs_f64())
            .sum::<f64>()
            + self.skipped_audio.as_secs_f64();
        audio_secs / wall.as_secs_f64()
    }

    /// Summarize the session up to now.
    pub fn summary(&self) -> SessionSummary {
        self.summary_at(self.started.elapsed())
    }

    fn summary_at(&self, wall: Duration) -> SessionSummary {
        let conditioning: Vec<Duration> = self.timings.iter().map(|t| t.conditioning).collect();
        let inference: Vec<Duration> = self.timings.iter().map(|t| t.inference).collect();
        let inference_max = inference.iter().max().copied().unwrap_or(Duration::ZERO);

        let realtime_factor_avg = if self.timings.is_empty() {
            0.0
        } else {
            self.timings
                .iter()
                .map(|t| t.realtime_factor())
                .sum::<f64>()
                / self.timings.len() as f64
        };

        SessionSummary {
            chunks_captured: self.chunks_captured,
            chunks_skipped: self.chunks_skipped,
            chunks_transcribed: self.timings.len() as u64,
            capture_retries: self.capture_retries,
            ambiguous_stitches: self.ambiguous_stitches,
            conditioning_avg: avg_duration(&conditioning),
            inference_avg: avg_duration(&inference),
            inference_max,
            realtime_factor_avg,
            speed_factor: self.speed_factor_at(wall),
            wall_time: wall,
        }
    }

    /// Prints a user-friendly summary of session performance.
    pub fn print_summary(&self) {
        let stats = self.summary();
        eprintln!();
        eprintln!("=== Session Summary ===");
        eprintln!(
            "Captured {} chunk{} over {}",
            stats.chunks_captured,
            if stats.chunks_captured == 1 { "" } else { "s" },
            format_duration(stats.wall_time)
        );
        eprintln!(
            "  Transcribed: {} | Skipped as silence: {}",
            stats.chunks_transcribed, stats.chunks_skipped
        );
        if stats.capture_retries > 0 {
            eprintln!("  Capture retries:          {}", stats.capture_retries);
        }
        if stats.ambiguous_stitches > 0 {
            eprintln!("  Ambiguous boundaries:     {}", stats.ambiguous_stitches);
        }
        eprintln!();
        eprintln!(
            "  Avg conditioning:         {}",
            format_duration(stats.conditioning_avg)
        );
        eprintln!(
            "  Avg inference:            {}  ({:.1}x real-time, worst {})",
            format_duration(stats.inference_avg),
            stats.realtime_factor_avg,
            format_duration(stats.inference_max)
        );
        eprintln!("  Speed factor:             {:.2}", stats.speed_factor);
        if stats.speed_factor < 1.0 && stats.chunks_transcribed > 0 {
            eprintln!("  Warning: session fell behind live audio");
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a duration as a human-friendly string.
/// Under 1s: "450ms", at or above 1s: "1.5s".
fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

fn avg_duration(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let sum: Duration = durations.iter().sum();
    sum / durations.len() as u32
}
