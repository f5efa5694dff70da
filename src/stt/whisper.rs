//! Whisper-based general inference backend.
//!
//! CPU implementation of [`InferenceBackend`] using whisper-rs. Accepts
//! arbitrary input lengths, so `required_samples` is `None`.
//!
//! # Feature Gate
//!
//! This module requires the `whisper` feature to be enabled and cmake to
//! be installed:
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::defaults;
use crate::error::{Result, StreamscribeError};
use crate::stt::backend::InferenceBackend;
#[cfg(feature = "whisper")]
use crate::stt::backend::{TranscriptionResult, WordToken};
#[cfg(not(feature = "whisper"))]
use crate::stt::backend::TranscriptionResult;
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper backend.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Language code (e.g. "en"), or "auto" for detection
    pub language: String,
    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,
    /// Beam width for beam-search decoding
    pub beam_width: u32,
    /// Sampling temperature; 0.0 keeps decoding deterministic
    pub temperature: f32,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            beam_width: defaults::BEAM_WIDTH,
            temperature: defaults::TEMPERATURE,
        }
    }
}

/// Whisper backend implementation.
///
/// Model weights are loaded lazily through [`InferenceBackend::load`] and
/// released with [`InferenceBackend::unload`]; the model file is multiple
/// hundred megabytes on the target hardware, so the context never outlives
/// the session.
///
/// # Feature Gate
///
/// The real implementation is only available when the `whisper` feature
/// is enabled.
#[cfg(feature = "whisper")]
pub struct WhisperBackend {
    config: WhisperConfig,
    model_name: String,
    context: Option<WhisperContext>,
    prompt: Option<String>,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperBackend")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("loaded", &self.context.is_some())
            .finish()
    }
}

/// Whisper backend placeholder (without whisper feature).
///
/// Stub that fails on `load`. Enable the `whisper` feature for real
/// transcription.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperBackend {
    config: WhisperConfig,
    model_name: String,
}

impl WhisperBackend {
    /// Create a backend for the given configuration.
    ///
    /// Cheap: weights are not touched until [`InferenceBackend::load`].
    ///
    /// # Errors
    /// Returns `ModelNotFound` if the model file does not exist.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(StreamscribeError::ModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = config
            .model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        #[cfg(feature = "whisper")]
        {
            Ok(Self {
                config,
                model_name,
                context: None,
                prompt: None,
            })
        }
        #[cfg(not(feature = "whisper"))]
        {
            Ok(Self { config, model_name })
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl InferenceBackend for WhisperBackend {
    fn load(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Ok(());
        }

        // Install logging hooks to suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        let mut context_params = WhisperContextParameters::default();
        // Fused attention kernels avoid the standalone softmax path that
        // misbehaves on some GPU generations; harmless on CPU.
        context_params.flash_attn(true);
        let context = WhisperContext::new_with_params(
            self.config.model_path.to_str().ok_or_else(|| {
                StreamscribeError::Inference {
                    message: "Invalid UTF-8 in model path".to_string(),
                }
            })?,
            context_params,
        )
        .map_err(|e| StreamscribeError::Inference {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        self.context = Some(context);
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.context = None;
        self.prompt = None;
        Ok(())
    }

    fn set_context(&mut self, context: &str) {
        self.prompt = Some(context.to_string());
    }

    fn transcribe(&mut self, samples: &[f32]) -> Result<TranscriptionResult> {
        let context = self.context.as_ref().ok_or_else(|| {
            StreamscribeError::Inference {
                message: "transcribe called before load".to_string(),
            }
        })?;

        let mut state = context
            .create_state()
            .map_err(|e| StreamscribeError::Inference {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: self.config.beam_width as i32,
            patience: -1.0,
        });

        if self.config.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }

        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_temperature(self.config.temperature);

        // Recent transcript text steers decoding across chunk boundaries.
        if let Some(prompt) = &self.prompt
            && !prompt.is_empty()
        {
            params.set_initial_prompt(prompt);
        }

        // Keep whisper.cpp off stdout; the transcript sink owns that stream.
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| StreamscribeError::Inference {
                message: format!("Whisper inference failed: {}", e),
            })?;

        // Per-word confidence is approximated by the segment confidence;
        // whisper only reports no-speech probability at segment level.
        let mut words = Vec::new();
        for segment in state.as_iter() {
            let confidence = (1.0 - segment.no_speech_probability()).clamp(0.0, 1.0);
            for word in segment.to_string().split_whitespace() {
                words.push(WordToken {
                    text: word.to_string(),
                    confidence: Some(confidence),
                    start_secs: None,
                });
            }
        }

        Ok(TranscriptionResult { words })
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl InferenceBackend for WhisperBackend {
    fn load(&mut self) -> Result<()> {
        Err(StreamscribeError::Inference {
            message: concat!(
                "Whisper feature not enabled. This binary was built without the CPU backend.\n",
                "To fix: cargo build --features whisper\n",
                "If the build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn unload(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(&mut self, _samples: &[f32]) -> Result<TranscriptionResult> {
        Err(StreamscribeError::Inference {
            message: "Whisper feature not enabled".to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
