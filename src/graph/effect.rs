use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::Timing;
use crate::graph::MixContext;
use crate::models::control_value::ControlValue;
use crate::models::ids::ControllableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    /// Passes the input through only while it lies in `lower..=upper`.
    Threshold {
        lower: ControlValue,
        upper: ControlValue,
    },
    Inverter,
    /// Attack, hold, release and sleep phases repeated forever, scaled by the input.
    Pulse {
        attack_ms: u32,
        hold_ms: u32,
        release_ms: u32,
        sleep_ms: u32,
    },
    /// Follows the input no faster than a full-range fade of the given lengths.
    Fade { fade_up_ms: u32, fade_down_ms: u32 },
    /// Input scaled by the captured audio level.
    AudioLevel,
    /// Random level re-drawn every `speed_ms`, scaled by the input.
    Flicker { speed_ms: u32 },
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Threshold { .. } => "threshold",
            EffectKind::Inverter => "inverter",
            EffectKind::Pulse { .. } => "pulse",
            EffectKind::Fade { .. } => "fade",
            EffectKind::AudioLevel => "audio level",
            EffectKind::Flicker { .. } => "flicker",
        }
    }

    pub fn input_names(&self) -> Vec<String> {
        vec!["Input".to_string()]
    }
}

/// Where an effect sends its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub target: ControllableId,
    pub input: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EffectState {
    level: ControlValue,
    last_ms: Option<u64>,
    flicker_period: Option<u64>,
    flicker_level: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    kind: EffectKind,
    connections: Vec<Connection>,
    state: EffectState,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            connections: Vec::new(),
            state: EffectState::default(),
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub(crate) fn set_kind(&mut self, kind: EffectKind) {
        self.kind = kind;
        self.state = EffectState::default();
    }

    pub(crate) fn connections_mut(&mut self) -> &mut Vec<Connection> {
        &mut self.connections
    }

    /// Output value for this tick. Stateful kinds update their state.
    pub fn output(&mut self, input: ControlValue, timing: &Timing) -> ControlValue {
        match self.kind {
            EffectKind::Threshold { lower, upper } => {
                if input >= lower && input <= upper {
                    input
                } else {
                    ControlValue::ZERO
                }
            }
            EffectKind::Inverter => ControlValue::new(ControlValue::MAX.raw() - input.raw()),
            EffectKind::Pulse {
                attack_ms,
                hold_ms,
                release_ms,
                sleep_ms,
            } => input.scaled(pulse_envelope(
                timing.time_ms,
                attack_ms as u64,
                hold_ms as u64,
                release_ms as u64,
                sleep_ms as u64,
            )),
            EffectKind::Fade {
                fade_up_ms,
                fade_down_ms,
            } => self.follow(input, timing.time_ms, fade_up_ms, fade_down_ms),
            EffectKind::AudioLevel => input.scaled(timing.audio_ratio()),
            EffectKind::Flicker { speed_ms } => {
                let period = timing.time_ms / speed_ms.max(1) as u64;
                if self.state.flicker_period != Some(period) {
                    self.state.flicker_period = Some(period);
                    self.state.flicker_level = rand::thread_rng().gen_range(0.0..=1.0);
                }
                input.scaled(self.state.flicker_level)
            }
        }
    }

    fn follow(&mut self, target: ControlValue, now_ms: u64, up_ms: u32, down_ms: u32) -> ControlValue {
        let elapsed = match self.state.last_ms {
            Some(last) => now_ms.saturating_sub(last),
            None => 0,
        };
        self.state.last_ms = Some(now_ms);

        let current = self.state.level;
        let fade_ms = if target >= current { up_ms } else { down_ms };
        let next = if fade_ms == 0 {
            target
        } else {
            let max = ControlValue::MAX.raw() as u64;
            let step = (max.saturating_mul(elapsed) / fade_ms as u64).min(max) as u32;
            if target >= current {
                ControlValue::new(current.raw().saturating_add(step)).min(target)
            } else {
                ControlValue::new(current.raw().saturating_sub(step)).max(target)
            }
        };
        self.state.level = next;
        next
    }

    pub(crate) fn mix(&mut self, input: ControlValue, ctx: &mut MixContext<'_>, timing: &Timing) {
        let value = self.output(input, timing);
        for connection in &self.connections {
            ctx.forward(connection.target, connection.input, value);
        }
    }
}

fn pulse_envelope(now_ms: u64, attack: u64, hold: u64, release: u64, sleep: u64) -> f64 {
    let cycle = attack + hold + release + sleep;
    if cycle == 0 {
        return 1.0;
    }
    let phase = now_ms % cycle;
    if phase < attack {
        phase as f64 / attack as f64
    } else if phase < attack + hold {
        1.0
    } else if phase < attack + hold + release {
        1.0 - (phase - attack - hold) as f64 / release as f64
    } else {
        0.0
    }
}
