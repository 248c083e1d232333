use crate::engine::Timing;
use crate::graph::chase::Chase;
use crate::graph::effect::{Connection, Effect};
use crate::graph::fixture_control::FixtureControl;
use crate::graph::preset_collection::PresetCollection;
use crate::graph::time_sequence::TimeSequence;
use crate::graph::MixContext;
use crate::models::control_value::{ControlValue, MixStyle};
use crate::models::ids::{ControllableId, FolderId};

/// Kind-specific payload of a controllable.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllableKind {
    FixtureControl(FixtureControl),
    PresetCollection(PresetCollection),
    Chase(Chase),
    TimeSequence(TimeSequence),
    Effect(Effect),
}

impl ControllableKind {
    pub fn name(&self) -> &'static str {
        match self {
            ControllableKind::FixtureControl(_) => "fixture control",
            ControllableKind::PresetCollection(_) => "preset collection",
            ControllableKind::Chase(_) => "chase",
            ControllableKind::TimeSequence(_) => "time sequence",
            ControllableKind::Effect(_) => "effect",
        }
    }
}

/// A named input and the value accumulated into it this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub name: String,
    value: ControlValue,
}

impl Input {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ControlValue::ZERO,
        }
    }

    pub fn value(&self) -> ControlValue {
        self.value
    }
}

/// A node of the mixing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Controllable {
    id: ControllableId,
    name: String,
    folder: FolderId,
    inputs: Vec<Input>,
    kind: ControllableKind,
}

impl Controllable {
    pub(crate) fn new(
        id: ControllableId,
        name: &str,
        folder: FolderId,
        input_names: Vec<String>,
        kind: ControllableKind,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            folder,
            inputs: input_names.into_iter().map(Input::new).collect(),
            kind,
        }
    }

    pub fn id(&self) -> ControllableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> FolderId {
        self.folder
    }

    pub fn kind(&self) -> &ControllableKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ControllableKind {
        &mut self.kind
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_value(&self, input: usize) -> Option<ControlValue> {
        self.inputs.get(input).map(|i| i.value)
    }

    /// Folds `value` into an input with the highest-value rule.
    /// Returns false when the input does not exist.
    pub fn mix_input(&mut self, input: usize, value: ControlValue) -> bool {
        match self.inputs.get_mut(input) {
            Some(slot) => {
                slot.value = slot.value.mix(value, MixStyle::Default);
                true
            }
            None => false,
        }
    }

    pub(crate) fn reset_inputs(&mut self) {
        for input in &mut self.inputs {
            input.value = ControlValue::ZERO;
        }
    }

    /// Edges from this node into other nodes' inputs, in forwarding order.
    pub fn outputs(&self) -> Vec<Connection> {
        let mut outputs: Vec<Connection> = match &self.kind {
            ControllableKind::FixtureControl(_) => Vec::new(),
            ControllableKind::PresetCollection(collection) => collection
                .values()
                .iter()
                .map(|v| Connection {
                    target: v.target,
                    input: v.input,
                })
                .collect(),
            ControllableKind::Chase(chase) => master_edges(chase.sequence().steps()),
            ControllableKind::TimeSequence(ts) => master_edges(ts.sequence().steps()),
            ControllableKind::Effect(effect) => effect.connections().to_vec(),
        };
        let mut seen = std::collections::HashSet::new();
        outputs.retain(|c| seen.insert(*c));
        outputs
    }

    pub fn output_count(&self) -> usize {
        self.outputs().len()
    }

    /// True when any output edge ends at `target`.
    pub fn references(&self, target: ControllableId) -> bool {
        self.outputs().iter().any(|c| c.target == target)
    }

    /// Runs this node's part of the tick. Reads only its own inputs.
    pub fn mix(&mut self, ctx: &mut MixContext<'_>, timing: &Timing) {
        let master = self.input_value(0).unwrap_or_default();
        match &mut self.kind {
            ControllableKind::FixtureControl(control) => control.mix(&self.inputs, ctx),
            ControllableKind::PresetCollection(collection) => collection.mix(master, ctx),
            ControllableKind::Chase(chase) => chase.mix(master, ctx, timing),
            ControllableKind::TimeSequence(ts) => ts.mix(master, ctx, timing),
            ControllableKind::Effect(effect) => effect.mix(master, ctx, timing),
        }
    }
}

fn master_edges(steps: &[ControllableId]) -> Vec<Connection> {
    steps
        .iter()
        .map(|id| Connection {
            target: *id,
            input: 0,
        })
        .collect()
}
