use serde::{Deserialize, Serialize};

use crate::engine::Timing;
use crate::graph::sequence::Sequence;
use crate::graph::MixContext;
use crate::models::control_value::ControlValue;
use crate::models::ids::ControllableId;
use crate::models::trigger::{StepClock, Transition, Trigger};

/// Trigger and transition of one time sequence step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSettings {
    pub trigger: Trigger,
    pub transition: Transition,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Progress {
    step: usize,
    started: StepClock,
    /// Show time at which the current step's transition began.
    transition_start: Option<u64>,
    advances: u64,
    finished: bool,
    active: bool,
    ever_started: bool,
}

/// Steps through its sequence one step at a time, each step with its own
/// trigger and transition. Restarts from the first step whenever its input
/// becomes active.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSequence {
    sequence: Sequence,
    settings: Vec<StepSettings>,
    /// Number of passes through the sequence; 0 repeats forever.
    repeat_count: u32,
    sustain: bool,
    progress: Progress,
}

impl Default for TimeSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSequence {
    pub fn new() -> Self {
        Self {
            sequence: Sequence::new(),
            settings: Vec::new(),
            repeat_count: 0,
            sustain: false,
            progress: Progress::default(),
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn step_settings(&self, step: usize) -> Option<StepSettings> {
        self.settings.get(step).copied()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    pub fn current_step(&self) -> usize {
        match self.sequence.len() {
            0 => 0,
            len => self.progress.step % len,
        }
    }

    /// Completed step advances since the last restart.
    pub fn advances(&self) -> u64 {
        self.progress.advances
    }

    pub fn is_finished(&self) -> bool {
        self.progress.finished
    }

    pub fn in_transition(&self) -> bool {
        self.progress.transition_start.is_some()
    }

    pub(crate) fn push_step(
        &mut self,
        collection: ControllableId,
        settings: StepSettings,
    ) -> usize {
        self.settings.push(settings);
        self.sequence.push(collection)
    }

    pub(crate) fn pop_step(&mut self) {
        let last = self.sequence.len().saturating_sub(1);
        self.remove_step(last);
    }

    pub(crate) fn remove_step(&mut self, index: usize) -> Option<ControllableId> {
        let removed = self.sequence.remove(index)?;
        self.settings.remove(index);
        // Keep the cursor on the same collection.
        if index < self.progress.step {
            self.progress.step -= 1;
        } else if index == self.progress.step {
            self.progress.transition_start = None;
        }
        Some(removed)
    }

    pub(crate) fn settings_mut(&mut self, step: usize) -> Option<&mut StepSettings> {
        self.settings.get_mut(step)
    }

    pub(crate) fn set_repeat_count(&mut self, repeat_count: u32) {
        self.repeat_count = repeat_count;
    }

    pub(crate) fn set_sustain(&mut self, sustain: bool) {
        self.sustain = sustain;
    }

    fn total_advances(&self) -> Option<u64> {
        (self.repeat_count > 0).then(|| self.repeat_count as u64 * self.sequence.len() as u64)
    }

    /// The step the current one hands over to. The last allowed advance
    /// stays on the final step.
    fn next_step(&self, len: usize) -> usize {
        if let Some(total) = self.total_advances() {
            if self.progress.advances + 1 >= total {
                return len - 1;
            }
        }
        (self.progress.step + 1) % len
    }

    fn restart(&mut self, timing: &Timing) {
        self.progress = Progress {
            started: StepClock::at(timing),
            ever_started: true,
            ..Progress::default()
        };
    }

    fn advance(&mut self, timing: &Timing, len: usize) {
        if self.progress.finished {
            return;
        }
        let step = self.progress.step % len;
        let settings = self.settings[step];

        if self.progress.transition_start.is_none()
            && settings.trigger.has_fired(&self.progress.started, timing)
        {
            self.progress.transition_start = Some(timing.time_ms);
        }

        let Some(start) = self.progress.transition_start else {
            return;
        };
        if timing.time_ms.saturating_sub(start) < settings.transition.length_ms as u64 {
            return;
        }

        let next = self.next_step(len);
        self.progress.advances += 1;
        self.progress.step = next;
        self.progress.transition_start = None;
        self.progress.started = StepClock::at(timing);

        if let Some(total) = self.total_advances() {
            if self.progress.advances >= total {
                self.progress.finished = true;
                self.progress.step = len - 1;
            }
        }
    }

    pub(crate) fn mix(&mut self, master: ControlValue, ctx: &mut MixContext<'_>, timing: &Timing) {
        let len = self.sequence.len();
        let active = !master.is_zero();
        if len == 0 || !active {
            self.progress.active = active;
            return;
        }

        if !self.progress.active && !(self.sustain && self.progress.ever_started) {
            self.restart(timing);
        }
        self.progress.active = true;
        self.advance(timing, len);

        let step = self.progress.step % len;
        let steps = self.sequence.steps();
        let Some(start) = self.progress.transition_start else {
            ctx.forward(steps[step], 0, master);
            return;
        };

        let next = self.next_step(len);
        if next == step {
            ctx.forward(steps[step], 0, master);
            return;
        }
        let transition = self.settings[step].transition;
        let elapsed = timing.time_ms.saturating_sub(start) as f64;
        let progress = if transition.length_ms == 0 {
            1.0
        } else {
            elapsed / transition.length_ms as f64
        };
        let (outgoing, incoming) = transition.weights(progress);
        ctx.forward(steps[step], 0, master.scaled(outgoing));
        ctx.forward(steps[next], 0, master.scaled(incoming));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Theatre;
    use crate::models::trigger::TransitionKind;
    use crate::models::universe::ChannelBuffer;

    fn sequence_of(steps: u32, settings: StepSettings) -> TimeSequence {
        let mut ts = TimeSequence::new();
        for i in 0..steps {
            ts.push_step(ControllableId(i), settings);
        }
        ts
    }

    fn tick(ts: &mut TimeSequence, master: ControlValue, timing: Timing) -> Vec<(u32, ControlValue)> {
        let theatre = Theatre::new();
        let mut buffer = ChannelBuffer::new(1);
        let mut ctx = MixContext::new(&mut buffer, &theatre);
        ts.mix(master, &mut ctx, &timing);
        ctx.take_forwards()
            .into_iter()
            .map(|f| (f.target.0, f.value))
            .collect()
    }

    fn sync_tick(timestep: u64) -> Timing {
        Timing {
            timestep,
            time_ms: timestep * 10,
            ..Timing::default()
        }
    }

    #[test]
    fn repeat_count_bounds_advances() {
        let mut ts = sequence_of(
            3,
            StepSettings {
                trigger: Trigger::Sync { count: 1 },
                transition: Transition::CUT,
            },
        );
        ts.set_repeat_count(2);

        for timestep in 0..40 {
            tick(&mut ts, ControlValue::MAX, sync_tick(timestep));
        }

        assert_eq!(ts.advances(), 6);
        assert!(ts.is_finished());
        assert_eq!(ts.current_step(), 2);
        let out = tick(&mut ts, ControlValue::MAX, sync_tick(41));
        assert_eq!(out, vec![(2, ControlValue::MAX)]);
    }

    #[test]
    fn unbounded_sequence_wraps() {
        let mut ts = sequence_of(
            3,
            StepSettings {
                trigger: Trigger::Sync { count: 1 },
                transition: Transition::CUT,
            },
        );
        for timestep in 0..=4 {
            tick(&mut ts, ControlValue::MAX, sync_tick(timestep));
        }
        assert_eq!(ts.advances(), 4);
        assert_eq!(ts.current_step(), 1);
        assert!(!ts.is_finished());
    }

    #[test]
    fn rising_edge_restarts_unless_sustained() {
        let settings = StepSettings {
            trigger: Trigger::Sync { count: 1 },
            transition: Transition::CUT,
        };
        let mut ts = sequence_of(3, settings);
        for timestep in 0..3 {
            tick(&mut ts, ControlValue::MAX, sync_tick(timestep));
        }
        assert_eq!(ts.current_step(), 2);

        tick(&mut ts, ControlValue::ZERO, sync_tick(3));
        tick(&mut ts, ControlValue::MAX, sync_tick(4));
        assert_eq!(ts.current_step(), 0);

        let mut sustained = sequence_of(4, settings);
        sustained.set_sustain(true);
        for timestep in 0..3 {
            tick(&mut sustained, ControlValue::MAX, sync_tick(timestep));
        }
        tick(&mut sustained, ControlValue::ZERO, sync_tick(3));
        tick(&mut sustained, ControlValue::MAX, sync_tick(100));
        assert_ne!(sustained.current_step(), 0);
    }

    #[test]
    fn fade_transition_splits_master() {
        let mut ts = sequence_of(
            2,
            StepSettings {
                trigger: Trigger::Delay { ms: 100 },
                transition: Transition::new(TransitionKind::Fade, 200),
            },
        );
        assert_eq!(tick(&mut ts, ControlValue::MAX, Timing::at(0)).len(), 1);
        // Trigger fires at 100 ms; half way through the fade at 200 ms.
        tick(&mut ts, ControlValue::MAX, Timing::at(100));
        let out = tick(&mut ts, ControlValue::MAX, Timing::at(200));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, 0);
        assert_eq!(out[1].0, 1);
        assert_eq!(out[0].1, ControlValue::MAX.scaled(0.5));
        assert_eq!(out[1].1, ControlValue::MAX.scaled(0.5));

        tick(&mut ts, ControlValue::MAX, Timing::at(300));
        assert_eq!(ts.current_step(), 1);
        assert!(!ts.in_transition());
    }

    #[test]
    fn removing_an_earlier_step_keeps_the_current_collection() {
        let mut ts = sequence_of(
            4,
            StepSettings {
                trigger: Trigger::Sync { count: 1 },
                transition: Transition::CUT,
            },
        );
        for timestep in 0..3 {
            tick(&mut ts, ControlValue::MAX, sync_tick(timestep));
        }
        assert_eq!(ts.current_step(), 2);

        assert_eq!(ts.remove_step(0), Some(ControllableId(0)));
        assert_eq!(ts.current_step(), 1);
        assert_eq!(
            tick(&mut ts, ControlValue::MAX, sync_tick(2)),
            vec![(2, ControlValue::MAX)]
        );

        assert_eq!(ts.remove_step(2), Some(ControllableId(3)));
        assert_eq!(ts.current_step(), 1);
        assert_eq!(
            tick(&mut ts, ControlValue::MAX, sync_tick(3)),
            vec![(1, ControlValue::MAX)]
        );
    }

    #[test]
    fn empty_sequence_never_advances() {
        let mut ts = TimeSequence::new();
        for timestep in 0..10 {
            assert!(tick(&mut ts, ControlValue::MAX, sync_tick(timestep)).is_empty());
        }
        assert_eq!(ts.advances(), 0);
        assert_eq!(ts.current_step(), 0);
    }
}
