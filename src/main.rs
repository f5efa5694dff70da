use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::atomic::Ordering;
use streamscribe::cli::{Cli, Commands};
use streamscribe::audio::source::AudioSource;
use streamscribe::audio::wav::WavFileSource;
use streamscribe::config::{BackendKind, Config};
use streamscribe::pipeline::controller::PipelineController;
use streamscribe::pipeline::sink::{StdoutSink, TranscriptSink};
use streamscribe::pipeline::stitcher::{StitcherConfig, TranscriptStitcher};
use streamscribe::stt::backend::InferenceBackend;
use streamscribe::stt::whisper::{WhisperBackend, WhisperConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Devices) => list_audio_devices(),
        None => run_session(cli).await,
    }
}

fn list_audio_devices() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    {
        streamscribe::audio::capture::suppress_audio_warnings();
        let devices = streamscribe::audio::capture::list_devices()?;
        if devices.is_empty() {
            eprintln!("No audio input devices found");
        } else {
            println!("Available audio input devices:");
            for device in devices {
                println!("  {device}");
            }
        }
        Ok(())
    }
    #[cfg(not(feature = "cpal-audio"))]
    bail!("This build has no audio capture support (cpal-audio feature disabled)")
}

async fn run_session(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let config = cli.apply_to(config.with_env_overrides());
    config.validate()?;

    let spec = config.capture_spec();
    let source = open_source(&cli, &config)?;
    let mut backend = build_backend(&config)?;
    let mut sink: Box<dyn TranscriptSink> = Box::new(StdoutSink::new());

    let conditioner = streamscribe::audio::conditioner::SignalConditioner::new(
        config.channel_mode()?,
        config.audio.gain,
    );
    let gate = config.activity_gate();
    let stitcher = TranscriptStitcher::new(StitcherConfig::new(spec.overlap));

    let controller = PipelineController::new(conditioner, gate, stitcher)
        .with_verbosity(cli.verbose)
        .with_quiet(cli.quiet);
    let stop = controller.stop_handle();

    let mut session = tokio::task::spawn_blocking(move || {
        let result = controller.run(source, backend.as_mut(), sink.as_mut());
        result.map(|outcome| outcome.transcript)
    });

    let quiet = cli.quiet;
    tokio::select! {
        result = &mut session => {
            result.context("session thread panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to wait for Ctrl+C")?;
            if !quiet {
                eprintln!("\nShutting down...");
            }
            stop.store(true, Ordering::SeqCst);
            session.await.context("session thread panicked")??;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))
        }
        None => match Config::default_path() {
            Some(path) => Ok(Config::load_or_default(&path)?),
            None => Ok(Config::default()),
        },
    }
}

/// Pick the audio source: an explicit WAV file, piped stdin, or the
/// microphone.
fn open_source(cli: &Cli, config: &Config) -> Result<Box<dyn AudioSource>> {
    let spec = config.capture_spec();

    if let Some(wav) = &cli.wav {
        let source = if wav == "-" {
            WavFileSource::from_stdin(spec.chunk_duration, spec.overlap)?
        } else {
            WavFileSource::from_path(Path::new(wav), spec.chunk_duration, spec.overlap)?
        };
        return Ok(Box::new(source));
    }

    if !std::io::stdin().is_terminal() {
        return Ok(Box::new(WavFileSource::from_stdin(
            spec.chunk_duration,
            spec.overlap,
        )?));
    }

    open_microphone(config, spec)
}

#[cfg(feature = "cpal-audio")]
fn open_microphone(
    config: &Config,
    spec: streamscribe::audio::source::CaptureSpec,
) -> Result<Box<dyn AudioSource>> {
    streamscribe::audio::capture::suppress_audio_warnings();
    let source = streamscribe::audio::capture::CpalChunkSource::new(
        config.audio.device.as_deref(),
        spec,
    )?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "cpal-audio"))]
fn open_microphone(
    _config: &Config,
    _spec: streamscribe::audio::source::CaptureSpec,
) -> Result<Box<dyn AudioSource>> {
    bail!(
        "This build has no audio capture support (cpal-audio feature disabled); \
         pipe a WAV file or use --wav"
    )
}

fn build_backend(config: &Config) -> Result<Box<dyn InferenceBackend>> {
    match config.stt.backend {
        BackendKind::Whisper => {
            let backend = WhisperBackend::new(WhisperConfig {
                model_path: config.stt.model.clone(),
                language: config.stt.language.clone(),
                threads: config.stt.threads,
                beam_width: config.stt.beam_width,
                temperature: config.stt.temperature,
            })?;
            Ok(Box::new(backend))
        }
        BackendKind::Accelerated => {
            // The accelerator runtime is linked in by downstream builds
            // that implement AcceleratorDevice for their hardware.
            bail!(
                "the accelerated backend requires an accelerator runtime; \
                 none is linked into this binary"
            )
        }
    }
}
