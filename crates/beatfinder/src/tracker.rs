use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::detector::Detection;

/// Beats below this confidence do not advance the counter.
pub const MIN_CONFIDENCE: f32 = 0.1;

/// The counter restarts at zero once it passes this bound, keeping sub-beat
/// precision of the f64 intact.
pub const BEAT_WRAP: f64 = 1_000_000.0;

/// Values published by the capture thread.
///
/// Every field is its own atomic scalar. Readers never block, and may observe
/// a beat value and a confidence from slightly different periods.
#[derive(Debug, Default)]
pub struct BeatState {
    beat: AtomicU64,
    confidence: AtomicU64,
    audio_level: AtomicU32,
}

impl BeatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat_value(&self) -> f64 {
        f64::from_bits(self.beat.load(Ordering::Acquire))
    }

    pub fn confidence(&self) -> f64 {
        f64::from_bits(self.confidence.load(Ordering::Acquire))
    }

    pub fn audio_level(&self) -> u16 {
        self.audio_level.load(Ordering::Acquire) as u16
    }

    fn publish_beat(&self, beat: f64) {
        self.beat.store(beat.to_bits(), Ordering::Release);
    }

    fn publish_confidence(&self, confidence: f64) {
        self.confidence.store(confidence.to_bits(), Ordering::Release);
    }

    pub(crate) fn publish_audio_level(&self, level: u16) {
        self.audio_level.store(level as u32, Ordering::Release);
    }
}

/// Turns per-period detections into the published beat counter.
///
/// Whole beats come from confident detections; between them the counter moves
/// in quarter beats, paced by the length of the previous beat.
#[derive(Debug)]
pub struct BeatTracker {
    state: Arc<BeatState>,
    whole_beat: f64,
    last_beat_at: Option<f64>,
    beat_period: Option<f64>,
}

impl BeatTracker {
    pub fn new(state: Arc<BeatState>) -> Self {
        let whole_beat = state.beat_value().floor();
        Self {
            state,
            whole_beat,
            last_beat_at: None,
            beat_period: None,
        }
    }

    pub fn state(&self) -> &Arc<BeatState> {
        &self.state
    }

    /// Applies one detection taken at `now` seconds on the capture clock.
    pub fn update(&mut self, detection: &Detection, now: f64) {
        if detection.silence {
            self.state.publish_confidence(0.0);
            return;
        }

        if detection.beat && detection.confidence >= MIN_CONFIDENCE {
            let mut next = self.whole_beat + 1.0;
            if next > BEAT_WRAP {
                next = 0.0;
            }
            if let Some(last) = self.last_beat_at {
                let period = now - last;
                if period > 0.0 {
                    self.beat_period = Some(period);
                }
            }
            self.last_beat_at = Some(now);
            self.whole_beat = next;
            self.state.publish_beat(next);
            self.state.publish_confidence(detection.confidence as f64);
            return;
        }

        if let (Some(last), Some(period)) = (self.last_beat_at, self.beat_period) {
            let fraction = ((now - last) / period).max(0.0);
            let quarters = ((fraction * 4.0).floor() / 4.0).min(0.75);
            self.state.publish_beat(self.whole_beat + quarters);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(confidence: f32) -> Detection {
        Detection {
            beat: true,
            confidence,
            silence: false,
        }
    }

    fn quiet() -> Detection {
        Detection::default()
    }

    #[test]
    fn low_confidence_beat_leaves_counter_unchanged() {
        let state = Arc::new(BeatState::new());
        let mut tracker = BeatTracker::new(state.clone());

        tracker.update(&beat(MIN_CONFIDENCE / 2.0), 0.0);
        assert_eq!(state.beat_value(), 0.0);
        assert_eq!(state.confidence(), 0.0);

        // A second reader sees the same, unchanged value.
        let reader = state.clone();
        assert_eq!(reader.beat_value(), state.beat_value());
    }

    #[test]
    fn confident_beats_increment_whole_beats() {
        let state = Arc::new(BeatState::new());
        let mut tracker = BeatTracker::new(state.clone());

        tracker.update(&beat(0.8), 0.0);
        tracker.update(&beat(0.9), 0.5);
        assert_eq!(state.beat_value(), 2.0);
        assert!((state.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn interpolates_quarter_beats_between_detections() {
        let state = Arc::new(BeatState::new());
        let mut tracker = BeatTracker::new(state.clone());
        tracker.update(&beat(0.8), 0.0);
        tracker.update(&beat(0.8), 1.0);

        tracker.update(&quiet(), 1.3);
        assert_eq!(state.beat_value(), 2.25);
        tracker.update(&quiet(), 1.6);
        assert_eq!(state.beat_value(), 2.5);
        // Never runs into the next whole beat on its own.
        tracker.update(&quiet(), 3.0);
        assert_eq!(state.beat_value(), 2.75);
    }

    #[test]
    fn silence_zeroes_confidence_but_keeps_counter() {
        let state = Arc::new(BeatState::new());
        let mut tracker = BeatTracker::new(state.clone());
        tracker.update(&beat(0.7), 0.0);

        tracker.update(
            &Detection {
                beat: false,
                confidence: 0.0,
                silence: true,
            },
            0.2,
        );
        assert_eq!(state.beat_value(), 1.0);
        assert_eq!(state.confidence(), 0.0);
    }

    #[test]
    fn counter_wraps_after_bound() {
        let state = Arc::new(BeatState::new());
        let mut tracker = BeatTracker::new(state.clone());
        tracker.whole_beat = BEAT_WRAP;
        tracker.update(&beat(0.5), 0.0);
        assert_eq!(state.beat_value(), 0.0);
    }
}
