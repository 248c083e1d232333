use serde::{Deserialize, Serialize};

use crate::models::ids::ControllableId;

/// Ordered list of preset collections stepped through by a chase or time
/// sequence. The sequence refers to collections; it does not own them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence {
    steps: Vec<ControllableId>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at `index` modulo the length; `None` when empty.
    pub fn wrapped(&self, index: usize) -> Option<ControllableId> {
        if self.steps.is_empty() {
            None
        } else {
            Some(self.steps[index % self.steps.len()])
        }
    }

    pub fn get(&self, index: usize) -> Option<ControllableId> {
        self.steps.get(index).copied()
    }

    pub fn steps(&self) -> &[ControllableId] {
        &self.steps
    }

    pub fn contains(&self, collection: ControllableId) -> bool {
        self.steps.contains(&collection)
    }

    pub(crate) fn push(&mut self, collection: ControllableId) -> usize {
        self.steps.push(collection);
        self.steps.len() - 1
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<ControllableId> {
        (index < self.steps.len()).then(|| self.steps.remove(index))
    }

    /// Indices of every step that uses `collection`, highest first so they
    /// can be removed in order.
    pub(crate) fn positions_of(&self, collection: ControllableId) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, id)| **id == collection)
            .map(|(i, _)| i)
            .collect()
    }
}
