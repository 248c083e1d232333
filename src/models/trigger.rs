use serde::{Deserialize, Serialize};

use crate::engine::Timing;

/// When a chase or sequence step moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// After `ms` milliseconds of show time.
    Delay { ms: u32 },
    /// After `count` engine ticks.
    Sync { count: u32 },
    /// After `count` whole beats from the beat finder.
    Beat { count: u32 },
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Delay { ms: 1000 }
    }
}

/// Clock readings taken when a step became active.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepClock {
    pub time_ms: u64,
    pub timestep: u64,
    pub beat: f64,
}

impl StepClock {
    pub fn at(timing: &Timing) -> Self {
        Self {
            time_ms: timing.time_ms,
            timestep: timing.timestep,
            beat: timing.beat,
        }
    }
}

impl Trigger {
    /// True once the step that started at `start` should enter its transition.
    pub fn has_fired(&self, start: &StepClock, timing: &Timing) -> bool {
        match *self {
            Trigger::Delay { ms } => timing.time_ms.saturating_sub(start.time_ms) >= ms as u64,
            Trigger::Sync { count } => {
                timing.timestep.saturating_sub(start.timestep) >= count.max(1) as u64
            }
            Trigger::Beat { count } => {
                // The beat counter wraps; a reading below the start means it did.
                timing.beat < start.beat || timing.beat - start.beat >= count.max(1) as f64
            }
        }
    }

    /// Period length for a delay trigger; zero for the pulse-driven kinds.
    pub fn delay_ms(&self) -> u64 {
        match *self {
            Trigger::Delay { ms } => ms as u64,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Hard cut half way through the window.
    #[default]
    None,
    Fade,
    FadeThroughBlack,
}

/// How one step hands over to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub length_ms: u32,
}

impl Transition {
    pub const CUT: Transition = Transition {
        kind: TransitionKind::None,
        length_ms: 0,
    };

    pub fn new(kind: TransitionKind, length_ms: u32) -> Self {
        Self { kind, length_ms }
    }

    pub fn fade(length_ms: u32) -> Self {
        Self::new(TransitionKind::Fade, length_ms)
    }

    /// Weights of the outgoing and incoming step at `progress` in [0, 1].
    pub fn weights(&self, progress: f64) -> (f64, f64) {
        let p = progress.clamp(0.0, 1.0);
        match self.kind {
            TransitionKind::None => {
                if p < 0.5 {
                    (1.0, 0.0)
                } else {
                    (0.0, 1.0)
                }
            }
            TransitionKind::Fade => (1.0 - p, p),
            TransitionKind::FadeThroughBlack => {
                if p < 0.5 {
                    (1.0 - 2.0 * p, 0.0)
                } else {
                    (0.0, 2.0 * p - 1.0)
                }
            }
        }
    }
}
