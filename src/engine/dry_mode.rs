//! Deep copy of a graph for dry-mode editing.
//!
//! The copy is rebuilt through the public construction API. Controllables
//! are copied on demand: before a node is created, everything it forwards
//! into is copied first, and a memo keeps shared targets from being copied
//! twice.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::graph::{ControllableKind, Graph};
use crate::models::ids::{ControllableId, FixtureId, FolderId};

struct Copier<'a> {
    source: &'a Graph,
    target: Graph,
    folders: HashMap<FolderId, FolderId>,
    fixtures: HashMap<FixtureId, FixtureId>,
    controllables: HashMap<ControllableId, ControllableId>,
}

pub(crate) fn copy_graph(source: &Graph) -> Result<Graph> {
    let mut copier = Copier {
        source,
        target: Graph::new(),
        folders: HashMap::from([(FolderId::ROOT, FolderId::ROOT)]),
        fixtures: HashMap::new(),
        controllables: HashMap::new(),
    };
    copier.copy_folders()?;
    copier.copy_fixtures()?;

    let ids: Vec<ControllableId> = source.controllables().map(|c| c.id()).collect();
    for id in ids {
        copier.copy_dependency(id)?;
    }
    copier.copy_preset_values()?;
    copier.copy_scenes()?;
    Ok(copier.target)
}

impl Copier<'_> {
    fn copy_folders(&mut self) -> Result<()> {
        let source = self.source;
        // Parents come before their children.
        for id in source.folders().subtree(FolderId::ROOT) {
            let Some(folder) = source.folders().get(id) else {
                continue;
            };
            let Some(parent) = folder.parent else {
                continue;
            };
            let parent = self.folder(parent)?;
            let copied = self.target.add_folder(&folder.name, parent)?;
            self.folders.insert(id, copied);
        }
        Ok(())
    }

    fn copy_fixtures(&mut self) -> Result<()> {
        for fixture in self.source.theatre().fixtures() {
            let copied = self
                .target
                .add_fixture(&fixture.name, fixture.functions.clone())?;
            self.fixtures.insert(fixture.id, copied);
        }
        Ok(())
    }

    /// Copies `id` after everything it forwards into; returns its id in the copy.
    fn copy_dependency(&mut self, id: ControllableId) -> Result<ControllableId> {
        if let Some(copied) = self.controllables.get(&id) {
            return Ok(*copied);
        }
        let source = self.source;
        let node = source
            .controllable(id)
            .ok_or(EngineError::UnknownControllable(id))?;
        let folder = self.folder(node.folder())?;
        let name = node.name();

        let copied = match node.kind() {
            ControllableKind::FixtureControl(control) => {
                let fixture = *self
                    .fixtures
                    .get(&control.fixture())
                    .ok_or(EngineError::UnknownFixture(control.fixture()))?;
                self.target.add_fixture_control(name, folder, fixture)?
            }
            ControllableKind::PresetCollection(collection) => {
                let mut entries = Vec::with_capacity(collection.values().len());
                for value in collection.values() {
                    entries.push((self.copy_dependency(value.target)?, value.input, value.value));
                }
                let copy = self.target.add_preset_collection(name, folder)?;
                for (target, input, value) in entries {
                    self.target.add_to_collection(copy, target, input, value)?;
                }
                copy
            }
            ControllableKind::Chase(chase) => {
                let steps = self.copy_all(chase.sequence().steps())?;
                let copy = self
                    .target
                    .add_chase(name, folder, chase.trigger(), chase.transition())?;
                for step in steps {
                    self.target.add_step(copy, step)?;
                }
                copy
            }
            ControllableKind::TimeSequence(ts) => {
                let steps = self.copy_all(ts.sequence().steps())?;
                let copy = self.target.add_time_sequence(name, folder)?;
                for (index, step) in steps.into_iter().enumerate() {
                    self.target.add_step(copy, step)?;
                    if let Some(settings) = ts.step_settings(index) {
                        self.target.set_step_trigger(copy, index, settings.trigger)?;
                        self.target
                            .set_step_transition(copy, index, settings.transition)?;
                    }
                }
                self.target.set_repeat_count(copy, ts.repeat_count())?;
                self.target.set_sustain(copy, ts.sustain())?;
                copy
            }
            ControllableKind::Effect(effect) => {
                let mut connections = Vec::with_capacity(effect.connections().len());
                for connection in effect.connections() {
                    connections.push((self.copy_dependency(connection.target)?, connection.input));
                }
                let copy = self.target.add_effect(name, folder, effect.kind())?;
                for (target, input) in connections {
                    self.target.connect(copy, target, input)?;
                }
                copy
            }
        };

        self.controllables.insert(id, copied);
        Ok(copied)
    }

    fn copy_all(&mut self, ids: &[ControllableId]) -> Result<Vec<ControllableId>> {
        ids.iter().map(|id| self.copy_dependency(*id)).collect()
    }

    fn copy_preset_values(&mut self) -> Result<()> {
        let source = self.source;
        for preset in source.preset_values() {
            let target = self.mapped(preset.target)?;
            self.target.add_preset_value(target, preset.input, preset.value)?;
        }
        Ok(())
    }

    fn copy_scenes(&mut self) -> Result<()> {
        let source = self.source;
        for scene in source.show().scenes() {
            let copy = self.target.add_scene(&scene.name)?;
            for item in &scene.items {
                let mut item = *item;
                item.target = self.mapped(item.target)?;
                self.target.add_scene_item(copy, item)?;
            }
        }
        Ok(())
    }

    fn folder(&self, id: FolderId) -> Result<FolderId> {
        self.folders
            .get(&id)
            .copied()
            .ok_or(EngineError::UnknownFolder(id))
    }

    fn mapped(&self, id: ControllableId) -> Result<ControllableId> {
        self.controllables
            .get(&id)
            .copied()
            .ok_or(EngineError::UnknownControllable(id))
    }
}
