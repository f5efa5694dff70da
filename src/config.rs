//! TOML configuration with environment overrides.
//!
//! The configuration is immutable once a session starts; every knob is
//! validated up front so failures happen before the microphone opens.

use crate::audio::conditioner::ChannelMode;
use crate::audio::gate::{ActivityGate, EnergyVad};
use crate::audio::source::CaptureSpec;
use crate::defaults;
use crate::error::{Result, StreamscribeError};
use crate::stt::accelerated::ProgramVariant;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub gate: GateConfig,
    pub stt: SttConfig,
}

/// Audio capture and conditioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name, or None for the system default.
    pub device: Option<String>,
    /// Native capture sample rate in Hz.
    pub sample_rate: u32,
    /// Capture channel count.
    pub channels: u16,
    /// Chunk length in seconds.
    pub chunk_secs: f64,
    /// Seconds shared between consecutive chunks.
    pub overlap_secs: f64,
    /// "mix" to average all channels, or a zero-based channel index.
    pub channel: String,
    /// Amplitude gain applied after resampling.
    pub gain: f32,
}

/// Silence gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Mean absolute amplitude below which a chunk is silence.
    pub min_energy: f32,
    /// Enable the frame-based detector on top of the energy floor.
    pub vad_enabled: bool,
    /// Per-frame RMS threshold for the detector.
    pub vad_threshold: f32,
    /// Detector frame length in milliseconds.
    pub vad_frame_ms: u64,
    /// Minimum total speech per chunk in milliseconds.
    pub min_speech_ms: u64,
}

/// Inference backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// "whisper" or "accelerated".
    pub backend: BackendKind,
    /// Whisper model file.
    pub model: PathBuf,
    /// Language code, or "auto" for detection.
    pub language: String,
    /// Decoder threads, or None for the library default.
    pub threads: Option<usize>,
    pub beam_width: u32,
    pub temperature: f32,
    /// Accelerator program variant: "tiny" or "base".
    pub variant: String,
    /// Directory holding compiled accelerator programs.
    pub program_dir: PathBuf,
}

/// Which inference backend drives the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Whisper,
    Accelerated,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::CAPTURE_SAMPLE_RATE,
            channels: defaults::CAPTURE_CHANNELS,
            chunk_secs: defaults::CHUNK_SECS,
            overlap_secs: defaults::OVERLAP_SECS,
            channel: "mix".to_string(),
            gain: defaults::GAIN,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_energy: defaults::MIN_ENERGY_THRESHOLD,
            vad_enabled: false,
            vad_threshold: defaults::VAD_THRESHOLD,
            vad_frame_ms: defaults::VAD_FRAME_MS,
            min_speech_ms: defaults::MIN_SILENCE_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Whisper,
            model: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            beam_width: defaults::BEAM_WIDTH,
            temperature: defaults::TEMPERATURE,
            variant: "base".to_string(),
            program_dir: PathBuf::from("programs"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from a file, or return defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str::<Config>(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - STREAMSCRIBE_MODEL → stt.model
    /// - STREAMSCRIBE_LANGUAGE → stt.language
    /// - STREAMSCRIBE_DEVICE → audio.device
    /// - STREAMSCRIBE_PROGRAM_DIR → stt.program_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("STREAMSCRIBE_MODEL")
            && !model.is_empty()
        {
            self.stt.model = PathBuf::from(model);
        }

        if let Ok(language) = std::env::var("STREAMSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(device) = std::env::var("STREAMSCRIBE_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(dir) = std::env::var("STREAMSCRIBE_PROGRAM_DIR")
            && !dir.is_empty()
        {
            self.stt.program_dir = PathBuf::from(dir);
        }

        self
    }

    /// Default configuration file location:
    /// ~/.config/streamscribe/config.toml on Linux.
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("streamscribe").join("config.toml"))
    }

    /// Reject invalid combinations before a session starts.
    pub fn validate(&self) -> Result<()> {
        if self.audio.chunk_secs <= 0.0 {
            return Err(invalid("audio.chunk_secs", "must be positive"));
        }
        if self.audio.overlap_secs < 0.0 {
            return Err(invalid("audio.overlap_secs", "must not be negative"));
        }
        if self.audio.overlap_secs >= self.audio.chunk_secs {
            return Err(invalid(
                "audio.overlap_secs",
                "must be shorter than audio.chunk_secs",
            ));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.channels == 0 {
            return Err(invalid("audio.channels", "must be at least 1"));
        }
        if self.audio.gain <= 0.0 {
            return Err(invalid("audio.gain", "must be positive"));
        }
        self.channel_mode()?;
        if self.gate.min_energy < 0.0 {
            return Err(invalid("gate.min_energy", "must not be negative"));
        }
        if self.gate.vad_enabled && self.gate.vad_frame_ms == 0 {
            return Err(invalid("gate.vad_frame_ms", "must be positive"));
        }

        if self.stt.backend == BackendKind::Accelerated {
            // Fixed-shape programs only accept their compiled chunk length.
            let variant = ProgramVariant::parse(&self.stt.variant)?;
            let required_secs = variant.chunk_duration().as_secs_f64();
            if (self.audio.chunk_secs - required_secs).abs() > f64::EPSILON {
                return Err(StreamscribeError::ChunkSizeMismatch {
                    expected_samples: variant.required_samples(),
                    actual_samples: (self.audio.chunk_secs
                        * defaults::MODEL_SAMPLE_RATE as f64)
                        .round() as usize,
                });
            }
        }
        Ok(())
    }

    /// The capture spec this configuration describes.
    pub fn capture_spec(&self) -> CaptureSpec {
        CaptureSpec {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            chunk_duration: Duration::from_secs_f64(self.audio.chunk_secs),
            overlap: Duration::from_secs_f64(self.audio.overlap_secs),
        }
    }

    /// Parsed channel selection.
    pub fn channel_mode(&self) -> Result<ChannelMode> {
        if self.audio.channel.eq_ignore_ascii_case("mix") {
            return Ok(ChannelMode::Mix);
        }
        match self.audio.channel.parse::<u16>() {
            Ok(index) if index < self.audio.channels => Ok(ChannelMode::Select(index)),
            Ok(_) => Err(invalid(
                "audio.channel",
                "channel index exceeds audio.channels",
            )),
            Err(_) => Err(invalid(
                "audio.channel",
                "expected \"mix\" or a zero-based channel index",
            )),
        }
    }

    /// The silence gate this configuration describes.
    pub fn activity_gate(&self) -> ActivityGate {
        if self.gate.vad_enabled {
            ActivityGate::with_vad(
                self.gate.min_energy,
                EnergyVad::new(
                    self.gate.vad_threshold,
                    Duration::from_millis(self.gate.vad_frame_ms),
                    Duration::from_millis(self.gate.min_speech_ms),
                ),
            )
        } else {
            ActivityGate::new(self.gate.min_energy)
        }
    }
}

fn invalid(key: &str, message: &str) -> StreamscribeError {
    StreamscribeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Serializes tests that touch environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: only used with ENV_LOCK held, so no concurrent env access.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_streamscribe_env() {
        remove_env("STREAMSCRIBE_MODEL");
        remove_env("STREAMSCRIBE_LANGUAGE");
        remove_env("STREAMSCRIBE_DEVICE");
        remove_env("STREAMSCRIBE_PROGRAM_DIR");
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.chunk_secs, 5.0);
        assert_eq!(config.audio.overlap_secs, 2.0);
        assert_eq!(config.audio.channel, "mix");
        assert_eq!(config.audio.gain, 30.0);

        assert_eq!(config.gate.min_energy, 0.0002);
        assert!(!config.gate.vad_enabled);

        assert_eq!(config.stt.backend, BackendKind::Whisper);
        assert_eq!(config.stt.language, "en");
        assert_eq!(config.stt.beam_width, 5);
        assert_eq!(config.stt.temperature, 0.0);
    }

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[audio]
chunk_secs = 10.0
overlap_secs = 3.0

[stt]
language = "de"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.chunk_secs, 10.0);
        assert_eq!(config.audio.overlap_secs, 3.0);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.stt.language, "de");
        assert_eq!(config.stt.beam_width, 5);
    }

    #[test]
    fn load_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [[[").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_or_default_missing_file_returns_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config {
            audio: AudioConfig {
                device: Some("hw:0,0".to_string()),
                channel: "0".to_string(),
                ..Default::default()
            },
            stt: SttConfig {
                backend: BackendKind::Accelerated,
                variant: "tiny".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_MODEL", "/models/ggml-tiny.bin");
        set_env("STREAMSCRIBE_LANGUAGE", "sv");
        set_env("STREAMSCRIBE_DEVICE", "USB Microphone");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.model, PathBuf::from("/models/ggml-tiny.bin"));
        assert_eq!(config.stt.language, "sv");
        assert_eq!(config.audio.device, Some("USB Microphone".to_string()));

        clear_streamscribe_env();
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_streamscribe_env();

        set_env("STREAMSCRIBE_LANGUAGE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.stt.language, "en");

        clear_streamscribe_env();
    }

    #[test]
    fn overlap_must_be_shorter_than_chunk() {
        let mut config = Config::default();
        config.audio.overlap_secs = 5.0;

        match config.validate() {
            Err(StreamscribeError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "audio.overlap_secs");
            }
            other => panic!("expected ConfigInvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn negative_gain_rejected() {
        let mut config = Config::default();
        config.audio.gain = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn channel_mode_parses_mix_and_index() {
        let mut config = Config::default();
        assert_eq!(config.channel_mode().unwrap(), ChannelMode::Mix);

        config.audio.channel = "0".to_string();
        assert_eq!(config.channel_mode().unwrap(), ChannelMode::Select(0));

        config.audio.channel = "5".to_string();
        assert!(config.channel_mode().is_err());

        config.audio.channel = "left".to_string();
        assert!(config.channel_mode().is_err());
    }

    #[test]
    fn accelerated_backend_requires_matching_chunk_length() {
        let mut config = Config::default();
        config.stt.backend = BackendKind::Accelerated;
        config.stt.variant = "tiny".to_string();
        // Tiny programs are compiled for 10s chunks; default is 5s.
        match config.validate() {
            Err(StreamscribeError::ChunkSizeMismatch {
                expected_samples,
                actual_samples,
            }) => {
                assert_eq!(expected_samples, 160_000);
                assert_eq!(actual_samples, 80_000);
            }
            other => panic!("expected ChunkSizeMismatch, got {other:?}"),
        }

        config.audio.chunk_secs = 10.0;
        config.validate().unwrap();
    }

    #[test]
    fn unknown_variant_rejected() {
        let mut config = Config::default();
        config.stt.backend = BackendKind::Accelerated;
        config.stt.variant = "huge".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn capture_spec_reflects_audio_config() {
        let config = Config::default();
        let spec = config.capture_spec();
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.chunk_duration, Duration::from_secs(5));
        assert_eq!(spec.overlap, Duration::from_secs(2));
    }
}
