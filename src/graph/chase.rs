use crate::engine::Timing;
use crate::graph::sequence::Sequence;
use crate::graph::MixContext;
use crate::models::control_value::ControlValue;
use crate::models::trigger::{Transition, Trigger};

/// Cycles through its sequence under one global trigger and transition.
///
/// A chase keeps no progress of its own: the active step is computed from the
/// clock on every tick, so the same reading always selects the same step.
#[derive(Debug, Clone, PartialEq)]
pub struct Chase {
    sequence: Sequence,
    trigger: Trigger,
    transition: Transition,
}

/// Where a chase is for a given clock reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChasePosition {
    pub step: usize,
    pub next: usize,
    /// Set while inside the transition window, in [0, 1).
    pub progress: Option<f64>,
}

impl Chase {
    pub fn new(trigger: Trigger, transition: Transition) -> Self {
        Self {
            sequence: Sequence::new(),
            trigger,
            transition,
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub(crate) fn sequence_mut(&mut self) -> &mut Sequence {
        &mut self.sequence
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub(crate) fn set_trigger(&mut self, trigger: Trigger) {
        self.trigger = trigger;
    }

    pub(crate) fn set_transition(&mut self, transition: Transition) {
        self.transition = transition;
    }

    /// Step selected at `timing`; `None` for an empty sequence.
    pub fn position(&self, timing: &Timing) -> Option<ChasePosition> {
        let len = self.sequence.len() as u64;
        if len == 0 {
            return None;
        }

        let hold = |cycle: u64| ChasePosition {
            step: (cycle % len) as usize,
            next: (cycle % len) as usize,
            progress: None,
        };

        match self.trigger {
            Trigger::Delay { ms } => {
                let hold_ms = ms as u64;
                let fade_ms = self.transition.length_ms as u64;
                let period = hold_ms + fade_ms;
                if period == 0 {
                    return Some(hold(0));
                }
                let cycle = timing.time_ms / period;
                let within = timing.time_ms % period;
                if within < hold_ms || fade_ms == 0 {
                    return Some(hold(cycle));
                }
                Some(ChasePosition {
                    step: (cycle % len) as usize,
                    next: ((cycle + 1) % len) as usize,
                    progress: Some((within - hold_ms) as f64 / fade_ms as f64),
                })
            }
            Trigger::Sync { count } => Some(hold(timing.timestep / count.max(1) as u64)),
            Trigger::Beat { count } => {
                let beats = timing.beat.max(0.0).floor() as u64;
                Some(hold(beats / count.max(1) as u64))
            }
        }
    }

    pub(crate) fn mix(&self, master: ControlValue, ctx: &mut MixContext<'_>, timing: &Timing) {
        if master.is_zero() {
            return;
        }
        let Some(position) = self.position(timing) else {
            return;
        };
        let steps = self.sequence.steps();

        match position.progress {
            Some(progress) if position.next != position.step => {
                let (outgoing, incoming) = self.transition.weights(progress);
                ctx.forward(steps[position.step], 0, master.scaled(outgoing));
                ctx.forward(steps[position.next], 0, master.scaled(incoming));
            }
            _ => ctx.forward(steps[position.step], 0, master),
        }
    }
}
