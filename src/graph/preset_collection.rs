use serde::{Deserialize, Serialize};

use crate::graph::MixContext;
use crate::models::control_value::{mix, ControlValue, MixStyle};
use crate::models::ids::{ControllableId, PresetValueId};

/// A fixed value bound to one input of a controllable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetValue {
    pub id: PresetValueId,
    pub target: ControllableId,
    pub input: usize,
    pub value: ControlValue,
}

/// Owns a set of preset values and forwards each, multiplied by the master
/// input, into its target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetCollection {
    values: Vec<PresetValue>,
}

impl PresetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[PresetValue] {
        &self.values
    }

    pub fn value(&self, id: PresetValueId) -> Option<&PresetValue> {
        self.values.iter().find(|v| v.id == id)
    }

    pub(crate) fn value_mut(&mut self, id: PresetValueId) -> Option<&mut PresetValue> {
        self.values.iter_mut().find(|v| v.id == id)
    }

    pub(crate) fn push(&mut self, value: PresetValue) {
        self.values.push(value);
    }

    pub(crate) fn pop(&mut self) -> Option<PresetValue> {
        self.values.pop()
    }

    pub(crate) fn remove(&mut self, id: PresetValueId) -> Option<PresetValue> {
        let index = self.values.iter().position(|v| v.id == id)?;
        Some(self.values.remove(index))
    }

    /// Drops every value aimed at `target`; returns how many went.
    pub(crate) fn remove_target(&mut self, target: ControllableId) -> usize {
        let before = self.values.len();
        self.values.retain(|v| v.target != target);
        before - self.values.len()
    }

    pub(crate) fn replace(&mut self, values: Vec<PresetValue>) -> Vec<PresetValue> {
        std::mem::replace(&mut self.values, values)
    }

    pub(crate) fn mix(&self, master: ControlValue, ctx: &mut MixContext<'_>) {
        if master.is_zero() {
            return;
        }
        for value in &self.values {
            ctx.forward(
                value.target,
                value.input,
                mix(value.value, master, MixStyle::Multiply),
            );
        }
    }
}
