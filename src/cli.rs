//! Command-line interface for streamscribe.
//!
//! Argument parsing via clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Continuous speech-to-text from a microphone or WAV file
#[derive(Parser, Debug)]
#[command(
    name = "streamscribe",
    version,
    about = "Continuous speech-to-text for single-board computers"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress the session summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., hw:0)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Transcribe a WAV file instead of the microphone ("-" for stdin)
    #[arg(long, value_name = "FILE")]
    pub wav: Option<String>,

    /// Whisper model file
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Language code (default: en). Use "auto" for detection
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Inference backend (whisper, accelerated)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Accelerator program variant (tiny, base)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<String>,

    /// Chunk duration in seconds
    #[arg(long, short = 'c', value_name = "SECONDS")]
    pub chunk: Option<f64>,

    /// Overlap between consecutive chunks in seconds
    #[arg(long, value_name = "SECONDS")]
    pub overlap: Option<f64>,

    /// Amplitude gain applied before inference
    #[arg(long, value_name = "FACTOR")]
    pub gain: Option<f32>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,
}

impl Cli {
    /// Fold command-line flags into a loaded configuration.
    /// Flags win over both the file and environment overrides.
    pub fn apply_to(&self, mut config: crate::config::Config) -> crate::config::Config {
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(chunk) = self.chunk {
            config.audio.chunk_secs = chunk;
        }
        if let Some(overlap) = self.overlap {
            config.audio.overlap_secs = overlap;
        }
        if let Some(gain) = self.gain {
            config.audio.gain = gain;
        }
        if let Some(model) = &self.model {
            config.stt.model = model.clone();
        }
        if let Some(language) = &self.language {
            config.stt.language = language.clone();
        }
        if let Some(backend) = &self.backend {
            config.stt.backend = match backend.to_lowercase().as_str() {
                "accelerated" => crate::config::BackendKind::Accelerated,
                _ => crate::config::BackendKind::Whisper,
            };
        }
        if let Some(variant) = &self.variant {
            config.stt.variant = variant.clone();
        }
        config
    }
}
