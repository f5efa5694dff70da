//! Default configuration constants for streamscribe.
//!
//! Shared constants used across configuration types to keep the pipeline,
//! the config file and the CLI in agreement.

/// Sample rate the inference backends are trained at, in Hz.
///
/// Every waveform handed to a backend is mono 16 kHz float. Mismatched
/// rate is the single largest accuracy failure mode for this model class.
pub const MODEL_SAMPLE_RATE: u32 = 16000;

/// Default capture sample rate in Hz.
///
/// USB microphone HATs on the target hardware commonly expose 48 kHz
/// stereo as their only native format; the conditioner resamples down.
pub const CAPTURE_SAMPLE_RATE: u32 = 48000;

/// Default capture channel count.
pub const CAPTURE_CHANNELS: u16 = 2;

/// Default chunk duration in seconds.
pub const CHUNK_SECS: f64 = 5.0;

/// Default overlap between consecutive chunks in seconds.
///
/// Fixed-window inference truncates words at window boundaries; repeating
/// the trailing overlap in the next window guarantees every spoken word
/// appears complete in at least one window.
pub const OVERLAP_SECS: f64 = 2.0;

/// Default linear amplitude gain.
///
/// Low-sensitivity microphones on the target hardware produce very quiet
/// signals; 30x brings typical speech up to usable amplitude.
pub const GAIN: f32 = 30.0;

/// Minimum RMS energy for a chunk to be worth transcribing.
///
/// Chunks below this are silence/ambient noise — skip inference entirely.
/// Gating avoids the known hallucination failure mode on near-silent input.
pub const MIN_ENERGY_THRESHOLD: f32 = 0.0002;

/// Default per-frame RMS threshold for the dedicated voice detector.
pub const VAD_THRESHOLD: f32 = 0.2;

/// Default minimum silence duration in milliseconds before a dip between
/// speech frames counts as real silence.
pub const MIN_SILENCE_MS: u64 = 300;

/// Frame length used by the voice detector, in milliseconds.
pub const VAD_FRAME_MS: u64 = 200;

/// Expected spoken words per second, used to size the stitcher's
/// trailing-context window from the overlap duration.
pub const WORDS_PER_SECOND: f32 = 2.5;

/// How many recent chunks' worth of transcript feed the backend as
/// decoding context, roughly the last 20-30 seconds of speech.
pub const CONTEXT_CHUNKS: usize = 4;

/// Minimum matched run length (in words) for an overlap trim.
///
/// Shorter matches on common words ("the", "a") are too risky to trim.
pub const MIN_MATCH_WORDS: usize = 2;

/// Bounded retries for a failed or stalled capture before the session ends.
pub const CAPTURE_RETRIES: u32 = 3;

/// Depth of the capture-to-processing handoff channel.
///
/// One in-flight chunk plus one queued. Deliberately not unbounded: under
/// sustained overload the session falls measurably behind real time, which
/// must be observable via the speed factor rather than hidden in a queue.
pub const CAPTURE_QUEUE_DEPTH: usize = 2;

/// Grace period added to the chunk duration before a capture is declared
/// stalled, in seconds.
pub const CAPTURE_TIMEOUT_GRACE_SECS: f64 = 5.0;

/// Default beam width for the general backend (beam search decoding).
pub const BEAM_WIDTH: u32 = 5;

/// Default sampling temperature for the general backend.
pub const TEMPERATURE: f32 = 0.0;

/// Default transcription language code.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Special language value for automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";
