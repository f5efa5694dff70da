//! Live audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::chunk::AudioChunk;
use crate::audio::source::{AudioSource, CaptureSpec, ChunkAssembler};
use crate::defaults;
use crate::error::{Result, StreamscribeError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA messages that occur during audio backend probing.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for desktop PipeWire/Pulse environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]"; obviously unusable
/// devices (surround channels, HDMI, S/PDIF) are filtered out.
///
/// # Errors
/// Returns `StreamscribeError::Device` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| StreamscribeError::Device {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio over
/// raw ALSA so the desktop's device selection is respected.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| StreamscribeError::Device {
                message: "no default input device available".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only accessed from a single thread at a time
/// through the Mutex wrapper in CpalChunkSource. Stream methods are
/// called synchronously and never cross thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live microphone source producing overlapping chunks.
///
/// The CPAL callback appends raw interleaved samples to a shared buffer;
/// [`capture`](AudioSource::capture) drains that buffer through a
/// [`ChunkAssembler`] which owns the overlap tail. Sample rate and channel
/// count are requested as configured; mixdown and resampling happen later
/// in the conditioner, not here.
pub struct CpalChunkSource {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callback_count: Arc<AtomicU64>,
    spec: CaptureSpec,
    assembler: ChunkAssembler,
    /// Give up on a capture after chunk duration plus this grace period.
    grace: Duration,
}

impl CpalChunkSource {
    /// Create a source bound to the named device, or the best default when
    /// `device_name` is `None`.
    ///
    /// # Errors
    /// Returns `Device` when the named device does not exist or enumeration
    /// fails.
    pub fn new(device_name: Option<&str>, spec: CaptureSpec) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| StreamscribeError::Device {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| StreamscribeError::Device {
                    message: format!("input device not found: {}", name),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            spec,
            assembler: ChunkAssembler::new(spec),
            grace: Duration::from_secs_f64(defaults::CAPTURE_TIMEOUT_GRACE_SECS),
        })
    }

    /// Build the input stream at the configured rate and channel count.
    ///
    /// Tries i16 first (zero-copy path), then f32 with conversion. Some
    /// PipeWire-ALSA setups accept a config but never fire the data
    /// callback, so `open` verifies delivery after starting the stream.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: self.spec.channels,
            sample_rate: cpal::SampleRate(self.spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("streamscribe: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| StreamscribeError::Device {
                message: format!(
                    "device does not support {}ch/{}Hz capture: {}",
                    self.spec.channels, self.spec.sample_rate, e
                ),
            })
    }
}

impl AudioSource for CpalChunkSource {
    fn open(&mut self) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| StreamscribeError::Device {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already open
            }
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| StreamscribeError::Device {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Verify the callback actually fires. Some PipeWire-ALSA setups
        // accept a non-native config but never deliver data.
        std::thread::sleep(Duration::from_millis(200));
        if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            return Err(StreamscribeError::Device {
                message: format!(
                    "stream started but no data arrived at {}ch/{}Hz; \
                     try another device with --device",
                    self.spec.channels, self.spec.sample_rate
                ),
            });
        }

        let mut stream_guard = self.stream.lock().map_err(|e| StreamscribeError::Device {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(stream));
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<AudioChunk>> {
        let needed = self.assembler.samples_needed();
        let deadline = Instant::now() + self.spec.chunk_duration + self.grace;

        loop {
            let available = {
                let buffer = self.buffer.lock().map_err(|e| StreamscribeError::Device {
                    message: format!("Failed to lock audio buffer: {}", e),
                })?;
                buffer.len()
            };

            if available >= needed {
                let fresh: Vec<i16> = {
                    let mut buffer =
                        self.buffer.lock().map_err(|e| StreamscribeError::Device {
                            message: format!("Failed to lock audio buffer: {}", e),
                        })?;
                    buffer.drain(..needed).collect()
                };
                return Ok(Some(self.assembler.assemble(&fresh)));
            }

            if Instant::now() >= deadline {
                return Err(StreamscribeError::CaptureTimeout {
                    seconds: (self.spec.chunk_duration + self.grace).as_secs_f64(),
                });
            }

            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| StreamscribeError::Device {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| StreamscribeError::Device {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
        Ok(())
    }

    fn spec(&self) -> &CaptureSpec {
        &self.spec
    }
}
