//! Silence gating for conditioned waveforms.
//!
//! Inference is by far the most expensive stage, so chunks that carry no
//! speech are dropped before they reach the backend. Two checks run in
//! order: a whole-chunk mean-energy floor that rejects dead air cheaply,
//! then an optional frame-wise RMS scan that rejects low-level hum which
//! passes the mean check but contains no speech-shaped bursts.

use crate::audio::conditioner::ConditionedWaveform;
use crate::defaults;
use std::time::Duration;

/// Which check settled the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    /// The whole-chunk mean-energy floor.
    EnergyFloor,
    /// The frame-wise detector.
    Detector,
}

/// Verdict for one conditioned waveform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityDecision {
    /// True when the chunk likely contains speech.
    pub is_speech: bool,
    /// Mean absolute amplitude of the waveform.
    pub energy: f32,
    /// Which check produced the verdict.
    pub source: VerdictSource,
}

impl ActivityDecision {
    pub fn is_active(&self) -> bool {
        self.is_speech
    }
}

/// Frame-wise RMS voice activity detector.
///
/// Splits the waveform into fixed-length frames and counts a frame as
/// speech when its RMS exceeds the threshold. The chunk passes when the
/// speech frames together cover at least `min_speech`.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
    frame: Duration,
    min_speech: Duration,
}

impl EnergyVad {
    pub fn new(threshold: f32, frame: Duration, min_speech: Duration) -> Self {
        Self {
            threshold,
            frame,
            min_speech,
        }
    }

    /// Returns true when enough frames carry speech-level energy.
    pub fn has_speech(&self, samples: &[f32], sample_rate: u32) -> bool {
        let frame_len = (sample_rate as f64 * self.frame.as_secs_f64()) as usize;
        if frame_len == 0 || samples.is_empty() {
            return false;
        }
        let speech_frames = samples
            .chunks(frame_len)
            .filter(|frame| rms(frame) > self.threshold)
            .count();
        let speech = self.frame.as_secs_f64() * speech_frames as f64;
        speech >= self.min_speech.as_secs_f64()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(
            defaults::VAD_THRESHOLD,
            Duration::from_millis(defaults::VAD_FRAME_MS),
            Duration::from_millis(defaults::MIN_SILENCE_MS),
        )
    }
}

/// Decides whether a conditioned waveform is worth transcribing.
pub struct ActivityGate {
    min_energy: f32,
    vad: Option<EnergyVad>,
    skipped: u64,
    passed: u64,
}

impl ActivityGate {
    /// Gate with only the mean-energy floor.
    pub fn new(min_energy: f32) -> Self {
        Self {
            min_energy,
            vad: None,
            skipped: 0,
            passed: 0,
        }
    }

    /// Gate with the mean-energy floor plus frame-wise VAD.
    pub fn with_vad(min_energy: f32, vad: EnergyVad) -> Self {
        Self {
            min_energy,
            vad: Some(vad),
            skipped: 0,
            passed: 0,
        }
    }

    /// Assesses one waveform and updates the gate's counters.
    pub fn assess(&mut self, waveform: &ConditionedWaveform) -> ActivityDecision {
        let decision = self.decide(&waveform.samples);
        if decision.is_speech {
            self.passed += 1;
        } else {
            self.skipped += 1;
        }
        decision
    }

    fn decide(&self, samples: &[f32]) -> ActivityDecision {
        if samples.is_empty() {
            return ActivityDecision {
                is_speech: false,
                energy: 0.0,
                source: VerdictSource::EnergyFloor,
            };
        }
        let mean_abs: f32 = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
        if mean_abs < self.min_energy {
            return ActivityDecision {
                is_speech: false,
                energy: mean_abs,
                source: VerdictSource::EnergyFloor,
            };
        }
        match &self.vad {
            Some(vad) => ActivityDecision {
                is_speech: vad.has_speech(samples, defaults::MODEL_SAMPLE_RATE),
                energy: mean_abs,
                source: VerdictSource::Detector,
            },
            None => ActivityDecision {
                is_speech: true,
                energy: mean_abs,
                source: VerdictSource::EnergyFloor,
            },
        }
    }

    /// Chunks rejected so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Chunks passed through so far.
    pub fn passed(&self) -> u64 {
        self.passed
    }
}

impl Default for ActivityGate {
    fn default() -> Self {
        Self::new(defaults::MIN_ENERGY_THRESHOLD)
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waveform(samples: Vec<f32>) -> ConditionedWaveform {
        ConditionedWaveform {
            samples,
            duration: Duration::from_secs(5),
            overlap: Duration::ZERO,
            sequence: 0,
        }
    }

    fn speech_like(secs: f64, amplitude: f32) -> Vec<f32> {
        let n = (defaults::MODEL_SAMPLE_RATE as f64 * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / defaults::MODEL_SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * 200.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn dead_air_is_silent() {
        let mut gate = ActivityGate::new(defaults::MIN_ENERGY_THRESHOLD);
        let decision = gate.assess(&waveform(vec![0.0; 16000]));
        assert!(!decision.is_active());
        assert_eq!(decision.energy, 0.0);
        assert_eq!(decision.source, VerdictSource::EnergyFloor);
        assert_eq!(gate.skipped(), 1);
        assert_eq!(gate.passed(), 0);
    }

    #[test]
    fn empty_waveform_is_silent() {
        let mut gate = ActivityGate::default();
        assert!(!gate.assess(&waveform(vec![])).is_active());
    }

    #[test]
    fn loud_signal_is_active() {
        let mut gate = ActivityGate::new(defaults::MIN_ENERGY_THRESHOLD);
        let decision = gate.assess(&waveform(speech_like(1.0, 0.5)));
        assert!(decision.is_active());
        assert!(decision.energy > defaults::MIN_ENERGY_THRESHOLD);
        assert_eq!(gate.passed(), 1);
    }

    #[test]
    fn energy_just_below_floor_is_silent() {
        let mut gate = ActivityGate::new(0.01);
        // Mean abs of a sine is ~0.637 × amplitude.
        let decision = gate.assess(&waveform(speech_like(1.0, 0.01)));
        assert!(!decision.is_active());
        assert_eq!(decision.source, VerdictSource::EnergyFloor);
    }

    #[test]
    fn vad_rejects_sub_threshold_hum() {
        // Passes the mean floor but every frame RMS stays under 0.2.
        let mut gate =
            ActivityGate::with_vad(defaults::MIN_ENERGY_THRESHOLD, EnergyVad::default());
        let decision = gate.assess(&waveform(speech_like(2.0, 0.1)));
        assert!(!decision.is_active());
        assert_eq!(decision.source, VerdictSource::Detector);
    }

    #[test]
    fn vad_passes_sustained_speech_energy() {
        let mut gate =
            ActivityGate::with_vad(defaults::MIN_ENERGY_THRESHOLD, EnergyVad::default());
        let decision = gate.assess(&waveform(speech_like(2.0, 0.6)));
        assert!(decision.is_active());
        assert_eq!(decision.source, VerdictSource::Detector);
    }

    #[test]
    fn vad_rejects_a_single_short_burst() {
        let vad = EnergyVad::new(0.2, Duration::from_millis(200), Duration::from_millis(600));
        // 200 ms of loud signal inside 2 s of silence: one speech frame,
        // well under the 600 ms minimum.
        let mut samples = vec![0.0f32; 32000];
        for (i, s) in speech_like(0.2, 0.8).into_iter().enumerate() {
            samples[8000 + i] = s;
        }
        assert!(!vad.has_speech(&samples, defaults::MODEL_SAMPLE_RATE));
    }

    #[test]
    fn counters_accumulate_across_chunks() {
        let mut gate = ActivityGate::default();
        gate.assess(&waveform(speech_like(1.0, 0.5)));
        gate.assess(&waveform(vec![0.0; 16000]));
        gate.assess(&waveform(speech_like(1.0, 0.5)));
        assert_eq!(gate.passed(), 2);
        assert_eq!(gate.skipped(), 1);
    }
}
