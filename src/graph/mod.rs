//! The controllable graph.
//!
//! [`Graph`] owns every controllable, the flat preset values, the folder tree,
//! the theatre and the show overlay. All structural edits go through its
//! methods: each one validates first, and an edit that would introduce a
//! dependency cycle is rolled back before it returns. The cached evaluation
//! order is therefore always valid when the tick loop reads it.

pub mod chase;
pub mod controllable;
pub mod description;
pub mod effect;
pub mod fixture_control;
pub mod folder;
pub mod preset_collection;
pub mod resolver;
pub mod sequence;
pub mod time_sequence;

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::Timing;
use crate::error::{EngineError, Result};
use crate::fixtures::{FixtureFunction, Theatre};
use crate::models::control_value::ControlValue;
use crate::models::ids::{
    ControllableId, FixtureId, FolderId, IdCounter, PresetValueId, SceneId,
};
use crate::models::trigger::{Transition, Trigger};
use crate::models::universe::ChannelBuffer;
use crate::show::{SceneItem, Show};

pub use chase::{Chase, ChasePosition};
pub use controllable::{Controllable, ControllableKind, Input};
pub use description::GraphDescription;
pub use effect::{Connection, Effect, EffectKind};
pub use fixture_control::FixtureControl;
pub use folder::{Folder, Folders};
pub use preset_collection::{PresetCollection, PresetValue};
pub use sequence::Sequence;
pub use time_sequence::{StepSettings, TimeSequence};

/// A value sent along an output edge during the mix pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forward {
    pub target: ControllableId,
    pub input: usize,
    pub value: ControlValue,
}

/// What a controllable can touch while it mixes: the working channel buffer,
/// the theatre, and a queue of values for its output edges.
pub struct MixContext<'a> {
    buffer: &'a mut ChannelBuffer,
    theatre: &'a Theatre,
    forwards: Vec<Forward>,
}

impl<'a> MixContext<'a> {
    pub fn new(buffer: &'a mut ChannelBuffer, theatre: &'a Theatre) -> Self {
        Self {
            buffer,
            theatre,
            forwards: Vec::new(),
        }
    }

    pub fn theatre(&self) -> &'a Theatre {
        self.theatre
    }

    pub fn buffer(&mut self) -> &mut ChannelBuffer {
        self.buffer
    }

    /// Queues `value` for `target`'s input. Zero values are dropped since the
    /// highest-value fold would ignore them anyway.
    pub fn forward(&mut self, target: ControllableId, input: usize, value: ControlValue) {
        if value.is_zero() {
            return;
        }
        self.forwards.push(Forward {
            target,
            input,
            value,
        });
    }

    pub fn take_forwards(&mut self) -> Vec<Forward> {
        std::mem::take(&mut self.forwards)
    }
}

const MASTER_INPUT: &str = "Master";

#[derive(Debug, Default)]
pub struct Graph {
    folders: Folders,
    theatre: Theatre,
    controllables: BTreeMap<ControllableId, Controllable>,
    preset_values: BTreeMap<PresetValueId, PresetValue>,
    show: Show,
    order: Vec<ControllableId>,
    controllable_ids: IdCounter,
    preset_value_ids: IdCounter,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- introspection ----

    pub fn folders(&self) -> &Folders {
        &self.folders
    }

    pub fn theatre(&self) -> &Theatre {
        &self.theatre
    }

    pub fn show(&self) -> &Show {
        &self.show
    }

    pub fn controllable(&self, id: ControllableId) -> Option<&Controllable> {
        self.controllables.get(&id)
    }

    pub fn controllables(&self) -> impl Iterator<Item = &Controllable> {
        self.controllables.values()
    }

    pub(crate) fn registry(&self) -> &BTreeMap<ControllableId, Controllable> {
        &self.controllables
    }

    pub fn len(&self) -> usize {
        self.controllables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllables.is_empty()
    }

    /// Flat preset values, by id.
    pub fn preset_values(&self) -> impl Iterator<Item = &PresetValue> {
        self.preset_values.values()
    }

    /// A preset value from the flat list or from inside any collection.
    pub fn preset_value(&self, id: PresetValueId) -> Option<&PresetValue> {
        self.preset_values.get(&id).or_else(|| {
            self.controllables.values().find_map(|c| match c.kind() {
                ControllableKind::PresetCollection(collection) => collection.value(id),
                _ => None,
            })
        })
    }

    /// Cached dependency order: every node precedes the nodes it forwards into.
    pub fn evaluation_order(&self) -> &[ControllableId] {
        &self.order
    }

    /// `folder/path/name` of a controllable.
    pub fn path_of(&self, id: ControllableId) -> Option<String> {
        let controllable = self.controllables.get(&id)?;
        let folder = self.folders.path(controllable.folder())?;
        if folder.is_empty() {
            Some(controllable.name().to_string())
        } else {
            Some(format!("{}/{}", folder, controllable.name()))
        }
    }

    /// Looks a controllable up by its `folder/path/name`.
    pub fn find(&self, path: &str) -> Option<ControllableId> {
        let (folder_path, name) = match path.rsplit_once('/') {
            Some((folder, name)) => (folder, name),
            None => ("", path),
        };
        let folder = self.folders.find(folder_path)?;
        self.controllables
            .values()
            .find(|c| c.folder() == folder && c.name() == name)
            .map(Controllable::id)
    }

    /// Every fixture control driving `fixture`.
    pub fn controls_for_fixture(&self, fixture: FixtureId) -> Vec<ControllableId> {
        self.controllables
            .values()
            .filter(|c| matches!(c.kind(), ControllableKind::FixtureControl(f) if f.fixture() == fixture))
            .map(Controllable::id)
            .collect()
    }

    /// How many preset values, collection entries, sequence steps, effect
    /// connections and scene items point at `id`.
    pub fn references_to(&self, id: ControllableId) -> usize {
        let flat = self.preset_values.values().filter(|v| v.target == id).count();
        let nested: usize = self
            .controllables
            .values()
            .map(|c| match c.kind() {
                ControllableKind::FixtureControl(_) => 0,
                ControllableKind::PresetCollection(collection) => {
                    collection.values().iter().filter(|v| v.target == id).count()
                }
                ControllableKind::Chase(chase) => {
                    chase.sequence().steps().iter().filter(|s| **s == id).count()
                }
                ControllableKind::TimeSequence(ts) => {
                    ts.sequence().steps().iter().filter(|s| **s == id).count()
                }
                ControllableKind::Effect(effect) => effect
                    .connections()
                    .iter()
                    .filter(|c| c.target == id)
                    .count(),
            })
            .sum();
        flat + nested + self.show.references(id)
    }

    // ---- creation ----

    pub fn add_folder(&mut self, name: &str, parent: FolderId) -> Result<FolderId> {
        self.folders.add(name, parent)
    }

    pub fn add_fixture(&mut self, name: &str, functions: Vec<FixtureFunction>) -> Result<FixtureId> {
        self.theatre.add_fixture(name, functions)
    }

    pub fn add_fixture_control(
        &mut self,
        name: &str,
        folder: FolderId,
        fixture: FixtureId,
    ) -> Result<ControllableId> {
        let id = self.next_controllable_id()?;
        self.insert_controllable(
            id,
            name,
            folder,
            ControllableKind::FixtureControl(FixtureControl::new(fixture)),
        )
    }

    pub fn add_preset_collection(&mut self, name: &str, folder: FolderId) -> Result<ControllableId> {
        let id = self.next_controllable_id()?;
        self.insert_controllable(
            id,
            name,
            folder,
            ControllableKind::PresetCollection(PresetCollection::new()),
        )
    }

    pub fn add_chase(
        &mut self,
        name: &str,
        folder: FolderId,
        trigger: Trigger,
        transition: Transition,
    ) -> Result<ControllableId> {
        let id = self.next_controllable_id()?;
        self.insert_controllable(
            id,
            name,
            folder,
            ControllableKind::Chase(Chase::new(trigger, transition)),
        )
    }

    pub fn add_time_sequence(&mut self, name: &str, folder: FolderId) -> Result<ControllableId> {
        let id = self.next_controllable_id()?;
        self.insert_controllable(
            id,
            name,
            folder,
            ControllableKind::TimeSequence(TimeSequence::new()),
        )
    }

    pub fn add_effect(&mut self, name: &str, folder: FolderId, kind: EffectKind) -> Result<ControllableId> {
        let id = self.next_controllable_id()?;
        self.insert_controllable(id, name, folder, ControllableKind::Effect(Effect::new(kind)))
    }

    fn next_controllable_id(&mut self) -> Result<ControllableId> {
        Ok(ControllableId(self.controllable_ids.next()?))
    }

    /// Registers a controllable under `id`. Used by the `add_*` methods and
    /// by description loading, which keeps the stored ids.
    pub(crate) fn insert_controllable(
        &mut self,
        id: ControllableId,
        name: &str,
        folder: FolderId,
        kind: ControllableKind,
    ) -> Result<ControllableId> {
        if !self.folders.contains(folder) {
            return Err(EngineError::UnknownFolder(folder));
        }
        if self.controllables.contains_key(&id) {
            return Err(EngineError::InvalidEdit(format!("{} already exists", id)));
        }
        let input_names = match &kind {
            ControllableKind::FixtureControl(control) => self
                .theatre
                .fixture(control.fixture())
                .ok_or(EngineError::UnknownFixture(control.fixture()))?
                .functions
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            ControllableKind::PresetCollection(_)
            | ControllableKind::Chase(_)
            | ControllableKind::TimeSequence(_) => vec![MASTER_INPUT.to_string()],
            ControllableKind::Effect(effect) => effect.kind().input_names(),
        };

        self.controllable_ids.observe(id.0)?;
        self.controllables
            .insert(id, Controllable::new(id, name, folder, input_names, kind));
        // A node without edges cannot close a cycle.
        self.refresh_order()?;
        Ok(id)
    }

    // ---- preset values ----

    pub fn add_preset_value(
        &mut self,
        target: ControllableId,
        input: usize,
        value: ControlValue,
    ) -> Result<PresetValueId> {
        self.check_input(target, input)?;
        let id = PresetValueId(self.preset_value_ids.next()?);
        self.preset_values.insert(
            id,
            PresetValue {
                id,
                target,
                input,
                value,
            },
        );
        Ok(id)
    }

    pub fn set_preset_value(&mut self, id: PresetValueId, value: ControlValue) -> Result<()> {
        if let Some(preset) = self.preset_values.get_mut(&id) {
            preset.value = value;
            return Ok(());
        }
        for controllable in self.controllables.values_mut() {
            if let ControllableKind::PresetCollection(collection) = controllable.kind_mut() {
                if let Some(preset) = collection.value_mut(id) {
                    preset.value = value;
                    return Ok(());
                }
            }
        }
        Err(EngineError::UnknownPresetValue(id))
    }

    pub fn remove_preset_value(&mut self, id: PresetValueId) -> Result<()> {
        if self.preset_values.remove(&id).is_some() {
            return Ok(());
        }
        let mut found = false;
        for controllable in self.controllables.values_mut() {
            if let ControllableKind::PresetCollection(collection) = controllable.kind_mut() {
                if collection.remove(id).is_some() {
                    found = true;
                    break;
                }
            }
        }
        if !found {
            return Err(EngineError::UnknownPresetValue(id));
        }
        self.refresh_order()
    }

    /// Adds a value to a preset collection; the collection now forwards into
    /// `target`, so the edit fails if `target` already feeds the collection.
    pub fn add_to_collection(
        &mut self,
        collection: ControllableId,
        target: ControllableId,
        input: usize,
        value: ControlValue,
    ) -> Result<PresetValueId> {
        self.collection_mut(collection)?;
        self.check_input(target, input)?;

        let id = PresetValueId(self.preset_value_ids.next()?);
        self.collection_mut(collection)?.push(PresetValue {
            id,
            target,
            input,
            value,
        });
        if let Err(err) = self.refresh_order() {
            if let Ok(c) = self.collection_mut(collection) {
                c.pop();
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Replaces the collection's values with every non-zero fixture control
    /// input as mixed by the last tick. Returns how many values were captured.
    pub fn capture_collection(&mut self, collection: ControllableId) -> Result<usize> {
        self.collection_mut(collection)?;

        let current: Vec<(ControllableId, usize, ControlValue)> = self
            .controllables
            .values()
            .filter(|c| matches!(c.kind(), ControllableKind::FixtureControl(_)))
            .flat_map(|c| {
                c.inputs()
                    .iter()
                    .enumerate()
                    .filter(|(_, input)| !input.value().is_zero())
                    .map(move |(i, input)| (c.id(), i, input.value()))
            })
            .collect();

        let mut captured = Vec::with_capacity(current.len());
        for (target, input, value) in current {
            captured.push(PresetValue {
                id: PresetValueId(self.preset_value_ids.next()?),
                target,
                input,
                value,
            });
        }
        let count = captured.len();

        let previous = self.collection_mut(collection)?.replace(captured);
        if let Err(err) = self.refresh_order() {
            if let Ok(c) = self.collection_mut(collection) {
                c.replace(previous);
            }
            return Err(err);
        }
        log::debug!("[graph] captured {} values into {}", count, collection);
        Ok(count)
    }

    // ---- sequences ----

    /// Appends `collection` to a chase or time sequence. Returns the step index.
    pub fn add_step(&mut self, owner: ControllableId, collection: ControllableId) -> Result<usize> {
        if !matches!(
            self.require(collection)?.kind(),
            ControllableKind::PresetCollection(_)
        ) {
            return Err(EngineError::InvalidEdit(format!(
                "{} is not a preset collection",
                collection
            )));
        }

        let index = match self.require_mut(owner)?.kind_mut() {
            ControllableKind::Chase(chase) => chase.sequence_mut().push(collection),
            ControllableKind::TimeSequence(ts) => ts.push_step(collection, StepSettings::default()),
            _ => return Err(EngineError::InvalidEdit(format!("{} has no sequence", owner))),
        };

        if let Err(err) = self.refresh_order() {
            if let Ok(node) = self.require_mut(owner) {
                match node.kind_mut() {
                    ControllableKind::Chase(chase) => {
                        chase.sequence_mut().remove(index);
                    }
                    ControllableKind::TimeSequence(ts) => ts.pop_step(),
                    _ => {}
                }
            }
            return Err(err);
        }
        Ok(index)
    }

    pub fn remove_step(&mut self, owner: ControllableId, index: usize) -> Result<ControllableId> {
        let removed = match self.require_mut(owner)?.kind_mut() {
            ControllableKind::Chase(chase) => chase.sequence_mut().remove(index),
            ControllableKind::TimeSequence(ts) => ts.remove_step(index),
            _ => return Err(EngineError::InvalidEdit(format!("{} has no sequence", owner))),
        };
        let removed = removed
            .ok_or_else(|| EngineError::InvalidEdit(format!("{} has no step {}", owner, index)))?;
        self.refresh_order()?;
        Ok(removed)
    }

    pub fn set_trigger(&mut self, chase: ControllableId, trigger: Trigger) -> Result<()> {
        self.chase_mut(chase)?.set_trigger(trigger);
        Ok(())
    }

    pub fn set_transition(&mut self, chase: ControllableId, transition: Transition) -> Result<()> {
        self.chase_mut(chase)?.set_transition(transition);
        Ok(())
    }

    pub fn set_step_trigger(&mut self, owner: ControllableId, step: usize, trigger: Trigger) -> Result<()> {
        self.step_settings_mut(owner, step)?.trigger = trigger;
        Ok(())
    }

    pub fn set_step_transition(
        &mut self,
        owner: ControllableId,
        step: usize,
        transition: Transition,
    ) -> Result<()> {
        self.step_settings_mut(owner, step)?.transition = transition;
        Ok(())
    }

    /// Passes through the sequence before it holds on the final step; 0 loops forever.
    pub fn set_repeat_count(&mut self, owner: ControllableId, repeat_count: u32) -> Result<()> {
        self.time_sequence_mut(owner)?.set_repeat_count(repeat_count);
        Ok(())
    }

    pub fn set_sustain(&mut self, owner: ControllableId, sustain: bool) -> Result<()> {
        self.time_sequence_mut(owner)?.set_sustain(sustain);
        Ok(())
    }

    // ---- effects ----

    pub fn connect(&mut self, effect: ControllableId, target: ControllableId, input: usize) -> Result<()> {
        self.effect_mut(effect)?;
        self.check_input(target, input)?;

        let connection = Connection { target, input };
        let connections = self.effect_mut(effect)?.connections_mut();
        if connections.contains(&connection) {
            return Err(EngineError::InvalidEdit(format!(
                "{} is already connected to {} input {}",
                effect, target, input
            )));
        }
        connections.push(connection);

        if let Err(err) = self.refresh_order() {
            if let Ok(e) = self.effect_mut(effect) {
                e.connections_mut().pop();
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn disconnect(&mut self, effect: ControllableId, target: ControllableId, input: usize) -> Result<()> {
        let connections = self.effect_mut(effect)?.connections_mut();
        let position = connections
            .iter()
            .position(|c| c.target == target && c.input == input)
            .ok_or_else(|| {
                EngineError::InvalidEdit(format!("{} is not connected to {}", effect, target))
            })?;
        connections.remove(position);
        self.refresh_order()
    }

    pub fn set_effect_kind(&mut self, effect: ControllableId, kind: EffectKind) -> Result<()> {
        self.effect_mut(effect)?.set_kind(kind);
        Ok(())
    }

    // ---- scenes ----

    pub fn add_scene(&mut self, name: &str) -> Result<SceneId> {
        self.show.add_scene(name)
    }

    pub fn add_scene_item(&mut self, scene: SceneId, item: SceneItem) -> Result<()> {
        if self.show.scene(scene).is_none() {
            return Err(EngineError::UnknownScene(scene));
        }
        self.check_input(item.target, item.input)?;
        self.show.push_item(scene, item)
    }

    pub fn remove_scene(&mut self, scene: SceneId) -> Result<()> {
        self.show.remove_scene(scene).map(|_| ())
    }

    pub fn start_scene(&mut self, scene: SceneId, now_ms: u64) -> Result<()> {
        self.show.start_scene(scene, now_ms)
    }

    pub fn stop_scene(&mut self, scene: SceneId) -> Result<()> {
        self.show.stop_scene(scene)
    }

    // ---- removal ----

    pub fn rename(&mut self, id: ControllableId, name: &str) -> Result<()> {
        self.require_mut(id)?.set_name(name);
        Ok(())
    }

    /// Removes a controllable and every reference to it: flat preset values,
    /// collection entries, sequence steps, effect connections and scene items.
    pub fn remove_controllable(&mut self, id: ControllableId) -> Result<()> {
        let removed = self
            .controllables
            .remove(&id)
            .ok_or(EngineError::UnknownControllable(id))?;

        let mut dropped = 0;
        let before = self.preset_values.len();
        self.preset_values.retain(|_, v| v.target != id);
        dropped += before - self.preset_values.len();

        for controllable in self.controllables.values_mut() {
            match controllable.kind_mut() {
                ControllableKind::FixtureControl(_) => {}
                ControllableKind::PresetCollection(collection) => {
                    dropped += collection.remove_target(id);
                }
                ControllableKind::Chase(chase) => {
                    for index in chase.sequence().positions_of(id) {
                        chase.sequence_mut().remove(index);
                        dropped += 1;
                    }
                }
                ControllableKind::TimeSequence(ts) => {
                    for index in ts.sequence().positions_of(id) {
                        ts.remove_step(index);
                        dropped += 1;
                    }
                }
                ControllableKind::Effect(effect) => {
                    let connections = effect.connections_mut();
                    let before = connections.len();
                    connections.retain(|c| c.target != id);
                    dropped += before - connections.len();
                }
            }
        }
        dropped += self.show.remove_target(id);

        log::debug!(
            "[graph] removed {} '{}' and {} reference(s) to it",
            removed.kind().name(),
            removed.name(),
            dropped
        );
        self.refresh_order()
    }

    /// Removes a fixture and the fixture controls driving it.
    pub fn remove_fixture(&mut self, fixture: FixtureId) -> Result<()> {
        if self.theatre.fixture(fixture).is_none() {
            return Err(EngineError::UnknownFixture(fixture));
        }
        for control in self.controls_for_fixture(fixture) {
            self.remove_controllable(control)?;
        }
        self.theatre.remove_fixture(fixture)?;
        Ok(())
    }

    /// Removes a folder, its sub-folders and every controllable inside them.
    pub fn remove_folder(&mut self, folder: FolderId) -> Result<()> {
        let removed: BTreeSet<FolderId> = self.folders.remove_subtree(folder)?.into_iter().collect();
        let doomed: Vec<ControllableId> = self
            .controllables
            .values()
            .filter(|c| removed.contains(&c.folder()))
            .map(Controllable::id)
            .collect();
        for id in doomed {
            self.remove_controllable(id)?;
        }
        Ok(())
    }

    // ---- tick ----

    pub fn reset_inputs(&mut self) {
        for controllable in self.controllables.values_mut() {
            controllable.reset_inputs();
        }
    }

    pub fn apply_preset_values(&mut self) {
        for preset in self.preset_values.values() {
            if let Some(target) = self.controllables.get_mut(&preset.target) {
                target.mix_input(preset.input, preset.value);
            }
        }
    }

    pub fn mix_input(&mut self, target: ControllableId, input: usize, value: ControlValue) -> Result<()> {
        let node = self.require_mut(target)?;
        if node.mix_input(input, value) {
            Ok(())
        } else {
            Err(EngineError::InputOutOfRange {
                name: node.name().to_string(),
                input,
                count: node.input_count(),
            })
        }
    }

    /// Mixes every controllable once, in dependency order, delivering each
    /// node's forwarded values before any later node runs.
    pub fn mix_pass(&mut self, buffer: &mut ChannelBuffer, timing: &Timing) {
        let mut ctx = MixContext::new(buffer, &self.theatre);
        for id in &self.order {
            let Some(node) = self.controllables.get_mut(id) else {
                debug_assert!(false, "evaluation order names missing {}", id);
                continue;
            };
            node.mix(&mut ctx, timing);
            for forward in ctx.forwards.drain(..) {
                if let Some(target) = self.controllables.get_mut(&forward.target) {
                    target.mix_input(forward.input, forward.value);
                }
            }
        }
    }

    /// The locked part of a tick: overlay, reset, presets, mix.
    pub fn mix_tick(&mut self, buffer: &mut ChannelBuffer, timing: &Timing) {
        let overlay = self.show.contributions(timing.time_ms);
        self.reset_inputs();
        self.apply_preset_values();
        for contribution in overlay {
            if let Some(target) = self.controllables.get_mut(&contribution.target) {
                target.mix_input(contribution.input, contribution.value);
            }
        }
        self.mix_pass(buffer, timing);
    }

    // ---- helpers ----

    pub(crate) fn refresh_order(&mut self) -> Result<()> {
        self.order = resolver::order_of(&self.controllables)?;
        Ok(())
    }

    fn require(&self, id: ControllableId) -> Result<&Controllable> {
        self.controllables
            .get(&id)
            .ok_or(EngineError::UnknownControllable(id))
    }

    fn require_mut(&mut self, id: ControllableId) -> Result<&mut Controllable> {
        self.controllables
            .get_mut(&id)
            .ok_or(EngineError::UnknownControllable(id))
    }

    fn check_input(&self, target: ControllableId, input: usize) -> Result<()> {
        let node = self.require(target)?;
        if input >= node.input_count() {
            return Err(EngineError::InputOutOfRange {
                name: node.name().to_string(),
                input,
                count: node.input_count(),
            });
        }
        Ok(())
    }

    fn collection_mut(&mut self, id: ControllableId) -> Result<&mut PresetCollection> {
        match self.require_mut(id)?.kind_mut() {
            ControllableKind::PresetCollection(collection) => Ok(collection),
            _ => Err(EngineError::InvalidEdit(format!("{} is not a preset collection", id))),
        }
    }

    fn chase_mut(&mut self, id: ControllableId) -> Result<&mut Chase> {
        match self.require_mut(id)?.kind_mut() {
            ControllableKind::Chase(chase) => Ok(chase),
            _ => Err(EngineError::InvalidEdit(format!("{} is not a chase", id))),
        }
    }

    fn time_sequence_mut(&mut self, id: ControllableId) -> Result<&mut TimeSequence> {
        match self.require_mut(id)?.kind_mut() {
            ControllableKind::TimeSequence(ts) => Ok(ts),
            _ => Err(EngineError::InvalidEdit(format!("{} is not a time sequence", id))),
        }
    }

    fn step_settings_mut(&mut self, id: ControllableId, step: usize) -> Result<&mut StepSettings> {
        self.time_sequence_mut(id)?
            .settings_mut(step)
            .ok_or_else(|| EngineError::InvalidEdit(format!("{} has no step {}", id, step)))
    }

    fn effect_mut(&mut self, id: ControllableId) -> Result<&mut Effect> {
        match self.require_mut(id)?.kind_mut() {
            ControllableKind::Effect(effect) => Ok(effect),
            _ => Err(EngineError::InvalidEdit(format!("{} is not an effect", id))),
        }
    }
}

#[cfg(test)]
mod tests;
