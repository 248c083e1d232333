use std::time::Instant;

use beatfinder::BeatFinder;

/// Clock readings shared by every controllable during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    /// Milliseconds since the engine was created.
    pub time_ms: u64,
    /// Number of ticks run so far.
    pub timestep: u64,
    pub beat: f64,
    pub beat_confidence: f64,
    pub audio_level: u16,
}

impl Timing {
    /// A reading at `time_ms` with no beat information.
    pub fn at(time_ms: u64) -> Self {
        Self {
            time_ms,
            ..Self::default()
        }
    }

    /// Reads the clock and the published beat values. Never blocks.
    pub fn sample(started: Instant, timestep: u64, beat: Option<&BeatFinder>) -> Self {
        let time_ms = started.elapsed().as_millis() as u64;
        let (beat, beat_confidence, audio_level) = match beat {
            Some(finder) => {
                let (value, confidence) = finder.get_beat_value();
                (value, confidence, finder.get_audio_level())
            }
            None => (0.0, 0.0, 0),
        };
        Self {
            time_ms,
            timestep,
            beat,
            beat_confidence,
            audio_level,
        }
    }

    pub fn audio_ratio(&self) -> f64 {
        self.audio_level as f64 / u16::MAX as f64
    }
}
