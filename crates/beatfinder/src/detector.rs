use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

/// Flux must exceed the running mean by this factor to count as an onset.
const THRESHOLD_FACTOR: f32 = 1.5;
/// Number of flux values kept for the adaptive threshold.
const FLUX_HISTORY: usize = 43;
const MIN_FLUX_HISTORY: usize = 4;
/// Onsets closer than this are treated as the same event (seconds).
const MIN_ONSET_INTERVAL: f64 = 0.25;
const MAX_INTERVALS: usize = 8;

/// Outcome of analysing one audio period.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Detection {
    pub beat: bool,
    /// Tempo confidence in [0, 1].
    pub confidence: f32,
    pub silence: bool,
}

/// Analyses mono audio periods and reports onsets.
///
/// The capture thread owns the detector and calls [`OnsetDetector::process`]
/// once per captured period.
pub trait OnsetDetector: Send {
    fn process(&mut self, mono: &[f32]) -> Detection;

    /// Current tempo estimate in beats per minute, if one exists.
    fn tempo_bpm(&self) -> Option<f32> {
        None
    }
}

/// Spectral-flux onset detector with an adaptive threshold and an RMS silence gate.
pub struct SpectralFluxDetector {
    sample_rate: u32,
    silence_db: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    previous: Vec<f32>,
    flux_history: VecDeque<f32>,
    intervals: VecDeque<f64>,
    last_onset: Option<f64>,
    processed_samples: u64,
}

impl SpectralFluxDetector {
    pub fn new(sample_rate: u32, fft_size: usize, silence_db: f32) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let bins = spectrum.len();
        Self {
            sample_rate: sample_rate.max(1),
            silence_db,
            plan,
            window: hann_window(fft_size),
            input,
            spectrum,
            scratch,
            previous: vec![0.0; bins],
            flux_history: VecDeque::with_capacity(FLUX_HISTORY),
            intervals: VecDeque::with_capacity(MAX_INTERVALS),
            last_onset: None,
            processed_samples: 0,
        }
    }

    fn push_flux(&mut self, flux: f32) {
        if self.flux_history.len() == FLUX_HISTORY {
            self.flux_history.pop_front();
        }
        self.flux_history.push_back(flux);
    }

    fn spectral_flux(&mut self, mono: &[f32]) -> Option<f32> {
        let size = self.input.len();
        for (i, slot) in self.input.iter_mut().enumerate() {
            *slot = mono.get(i).copied().unwrap_or(0.0) * self.window[i];
        }
        if mono.len() > size {
            log::trace!("[beatfinder] period of {} samples truncated to {}", mono.len(), size);
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .ok()?;

        let mut flux = 0.0;
        for (bin, previous) in self.spectrum.iter().zip(self.previous.iter_mut()) {
            let magnitude = bin.norm();
            flux += (magnitude - *previous).max(0.0);
            *previous = magnitude;
        }
        Some(flux)
    }

    fn confidence(&self) -> f32 {
        if self.intervals.len() < 2 {
            return 0.0;
        }
        let count = self.intervals.len() as f64;
        let mean = self.intervals.iter().sum::<f64>() / count;
        if mean <= f64::EPSILON {
            return 0.0;
        }
        let variance = self
            .intervals
            .iter()
            .map(|interval| (interval - mean).powi(2))
            .sum::<f64>()
            / count;
        (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0) as f32
    }
}

impl OnsetDetector for SpectralFluxDetector {
    fn process(&mut self, mono: &[f32]) -> Detection {
        let timestamp = self.processed_samples as f64 / self.sample_rate as f64;
        self.processed_samples += mono.len() as u64;

        if is_silent(mono, self.silence_db) {
            self.previous.iter_mut().for_each(|value| *value = 0.0);
            self.push_flux(0.0);
            return Detection {
                beat: false,
                confidence: 0.0,
                silence: true,
            };
        }

        let Some(flux) = self.spectral_flux(mono) else {
            return Detection::default();
        };

        let enough_history = self.flux_history.len() >= MIN_FLUX_HISTORY;
        let mean = if self.flux_history.is_empty() {
            0.0
        } else {
            self.flux_history.iter().sum::<f32>() / self.flux_history.len() as f32
        };
        self.push_flux(flux);

        let spaced = self
            .last_onset
            .map(|last| timestamp - last >= MIN_ONSET_INTERVAL)
            .unwrap_or(true);

        if !(enough_history && spaced && flux > mean * THRESHOLD_FACTOR + f32::EPSILON) {
            return Detection {
                beat: false,
                confidence: self.confidence(),
                silence: false,
            };
        }

        if let Some(last) = self.last_onset {
            if self.intervals.len() == MAX_INTERVALS {
                self.intervals.pop_front();
            }
            self.intervals.push_back(timestamp - last);
        }
        self.last_onset = Some(timestamp);

        Detection {
            beat: true,
            confidence: self.confidence(),
            silence: false,
        }
    }

    fn tempo_bpm(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let mean = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        (mean > f64::EPSILON).then(|| (60.0 / mean) as f32)
    }
}

impl fmt::Debug for SpectralFluxDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralFluxDetector")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.input.len())
            .field("silence_db", &self.silence_db)
            .field("last_onset", &self.last_onset)
            .finish()
    }
}

/// True when the RMS level of `samples` is below `floor_db` (dBFS).
pub fn is_silent(samples: &[f32], floor_db: f32) -> bool {
    if samples.is_empty() {
        return true;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    if rms <= f32::MIN_POSITIVE {
        return true;
    }
    20.0 * rms.log10() < floor_db
}

/// Peak absolute amplitude mapped onto 0..=u16::MAX.
pub fn coarse_level(samples: &[f32]) -> u16 {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    (peak.clamp(0.0, 1.0) * u16::MAX as f32) as u16
}

/// Sums interleaved frames into a mono signal.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>())
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let angle = 2.0 * PI * i as f32 / (size as f32 - 1.0);
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;
    const BLOCK: usize = 512;

    fn click() -> Vec<f32> {
        (0..BLOCK)
            .map(|i| 0.8 * (2.0 * PI * 440.0 * i as f32 / RATE as f32).sin())
            .collect()
    }

    #[test]
    fn silence_is_reported_without_beats() {
        let mut detector = SpectralFluxDetector::new(RATE, BLOCK, -60.0);
        let detection = detector.process(&vec![0.0; BLOCK]);
        assert!(detection.silence);
        assert!(!detection.beat);
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn regular_clicks_produce_confident_beats() {
        let mut detector = SpectralFluxDetector::new(RATE, BLOCK, -60.0);
        let silence = vec![0.0; BLOCK];
        let click = click();

        for _ in 0..8 {
            detector.process(&silence);
        }

        let mut beats = Vec::new();
        for _ in 0..6 {
            beats.push(detector.process(&click));
            for _ in 0..7 {
                detector.process(&silence);
            }
        }

        assert!(beats.iter().all(|d| d.beat), "beats={beats:?}");
        let last = beats.last().unwrap();
        assert!(last.confidence > 0.9, "confidence={}", last.confidence);

        // 8 blocks of 512 samples at 8 kHz = 0.512 s per beat.
        let tempo = detector.tempo_bpm().expect("tempo should be known");
        assert!((tempo - 117.19).abs() < 0.5, "tempo={tempo}");
    }

    #[test]
    fn downmix_sums_stereo_frames() {
        let mono = downmix(&[0.25, 0.5, -0.5, 0.25], 2);
        assert_eq!(mono, vec![0.75, -0.25]);
    }

    #[test]
    fn coarse_level_tracks_peak() {
        assert_eq!(coarse_level(&[0.0, -1.0, 0.5]), u16::MAX);
        assert_eq!(coarse_level(&[]), 0);
    }
}
