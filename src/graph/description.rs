//! Plain serde view of a graph, for persistence.
//!
//! Everything is keyed by its stable id. Loading creates every entity first and
//! resolves references afterwards, so entries may appear in any order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{EngineError, Result};
use crate::fixtures::FixtureFunction;
use crate::graph::effect::Connection;
use crate::graph::{
    Chase, ControllableKind, Effect, EffectKind, FixtureControl, Graph, PresetCollection,
    PresetValue, StepSettings, TimeSequence,
};
use crate::models::ids::{ControllableId, FixtureId, FolderId, PresetValueId, SceneId};
use crate::models::trigger::{Transition, Trigger};
use crate::show::SceneItem;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDescription {
    #[serde(default)]
    pub folders: Vec<FolderDescription>,
    #[serde(default)]
    pub fixtures: Vec<FixtureDescription>,
    #[serde(default)]
    pub controllables: Vec<ControllableDescription>,
    #[serde(default)]
    pub preset_values: Vec<PresetValue>,
    #[serde(default)]
    pub scenes: Vec<SceneDescription>,
}

impl GraphDescription {
    /// Preset value ids are shared between flat values and collection entries,
    /// so a repeat anywhere is an error.
    fn check_preset_ids(&self) -> Result<()> {
        let nested = self.controllables.iter().flat_map(|c| match &c.kind {
            KindDescription::PresetCollection { values } => values.as_slice(),
            _ => &[][..],
        });
        let mut seen = BTreeSet::<PresetValueId>::new();
        for value in nested.chain(self.preset_values.iter()) {
            if !seen.insert(value.id) {
                return Err(EngineError::InvalidEdit(format!("{} appears twice", value.id)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescription {
    pub id: FolderId,
    pub name: String,
    pub parent: FolderId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureDescription {
    pub id: FixtureId,
    pub name: String,
    pub functions: Vec<FixtureFunction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllableDescription {
    pub id: ControllableId,
    pub name: String,
    #[serde(default = "root_folder")]
    pub folder: FolderId,
    pub kind: KindDescription,
}

fn root_folder() -> FolderId {
    FolderId::ROOT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindDescription {
    FixtureControl {
        fixture: FixtureId,
    },
    PresetCollection {
        #[serde(default)]
        values: Vec<PresetValue>,
    },
    Chase {
        #[serde(default)]
        steps: Vec<ControllableId>,
        #[serde(default)]
        trigger: Trigger,
        #[serde(default)]
        transition: Transition,
    },
    TimeSequence {
        #[serde(default)]
        steps: Vec<StepDescription>,
        #[serde(default)]
        repeat_count: u32,
        #[serde(default)]
        sustain: bool,
    },
    Effect {
        effect: EffectKind,
        #[serde(default)]
        connections: Vec<Connection>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    pub collection: ControllableId,
    #[serde(flatten)]
    pub settings: StepSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub id: SceneId,
    pub name: String,
    #[serde(default)]
    pub items: Vec<SceneItem>,
}

impl Graph {
    pub fn describe(&self) -> GraphDescription {
        let folders = self
            .folders
            .iter()
            .filter_map(|f| {
                f.parent.map(|parent| FolderDescription {
                    id: f.id,
                    name: f.name.clone(),
                    parent,
                })
            })
            .collect();

        let fixtures = self
            .theatre
            .fixtures()
            .map(|f| FixtureDescription {
                id: f.id,
                name: f.name.clone(),
                functions: f.functions.clone(),
            })
            .collect();

        let controllables = self
            .controllables
            .values()
            .map(|c| ControllableDescription {
                id: c.id(),
                name: c.name().to_string(),
                folder: c.folder(),
                kind: describe_kind(c.kind()),
            })
            .collect();

        let scenes = self
            .show
            .scenes()
            .map(|s| SceneDescription {
                id: s.id,
                name: s.name.clone(),
                items: s.items.clone(),
            })
            .collect();

        GraphDescription {
            folders,
            fixtures,
            controllables,
            preset_values: self.preset_values.values().copied().collect(),
            scenes,
        }
    }

    /// Rebuilds a graph with the ids stored in `description`.
    pub fn from_description(description: &GraphDescription) -> Result<Graph> {
        description.check_preset_ids()?;
        let mut graph = Graph::new();

        for folder in &description.folders {
            graph.folders.insert(folder.id, &folder.name, folder.parent)?;
        }
        graph.folders.validate()?;

        for fixture in &description.fixtures {
            graph
                .theatre
                .insert_fixture(fixture.id, &fixture.name, fixture.functions.clone())?;
        }

        // Pass one: every node, without edges.
        for entry in &description.controllables {
            let kind = match &entry.kind {
                KindDescription::FixtureControl { fixture } => {
                    ControllableKind::FixtureControl(FixtureControl::new(*fixture))
                }
                KindDescription::PresetCollection { .. } => {
                    ControllableKind::PresetCollection(PresetCollection::new())
                }
                KindDescription::Chase {
                    trigger,
                    transition,
                    ..
                } => ControllableKind::Chase(Chase::new(*trigger, *transition)),
                KindDescription::TimeSequence {
                    repeat_count,
                    sustain,
                    ..
                } => {
                    let mut ts = TimeSequence::new();
                    ts.set_repeat_count(*repeat_count);
                    ts.set_sustain(*sustain);
                    ControllableKind::TimeSequence(ts)
                }
                KindDescription::Effect { effect, .. } => {
                    ControllableKind::Effect(Effect::new(*effect))
                }
            };
            graph.insert_controllable(entry.id, &entry.name, entry.folder, kind)?;
        }

        // Pass two: edges, now that every target exists.
        for entry in &description.controllables {
            graph.attach_edges(entry)?;
        }
        graph.refresh_order()?;

        for preset in &description.preset_values {
            graph.check_input(preset.target, preset.input)?;
            graph.preset_value_ids.observe(preset.id.0)?;
            graph.preset_values.insert(preset.id, *preset);
        }

        for scene in &description.scenes {
            graph.show.insert_scene(scene.id, &scene.name)?;
            for item in &scene.items {
                graph.check_input(item.target, item.input)?;
                graph.show.push_item(scene.id, *item)?;
            }
        }

        log::debug!(
            "[graph] loaded {} controllables, {} fixtures",
            graph.len(),
            graph.theatre.len()
        );
        Ok(graph)
    }

    fn attach_edges(&mut self, entry: &ControllableDescription) -> Result<()> {
        match &entry.kind {
            KindDescription::FixtureControl { .. } => {}
            KindDescription::PresetCollection { values } => {
                for value in values {
                    self.check_input(value.target, value.input)?;
                    self.preset_value_ids.observe(value.id.0)?;
                    self.collection_mut(entry.id)?.push(*value);
                }
            }
            KindDescription::Chase { steps, .. } => {
                for step in steps {
                    self.expect_collection(*step)?;
                    self.chase_mut(entry.id)?.sequence_mut().push(*step);
                }
            }
            KindDescription::TimeSequence { steps, .. } => {
                for step in steps {
                    self.expect_collection(step.collection)?;
                    self.time_sequence_mut(entry.id)?
                        .push_step(step.collection, step.settings);
                }
            }
            KindDescription::Effect { connections, .. } => {
                for connection in connections {
                    self.check_input(connection.target, connection.input)?;
                    self.effect_mut(entry.id)?.connections_mut().push(*connection);
                }
            }
        }
        Ok(())
    }

    fn expect_collection(&self, id: ControllableId) -> Result<()> {
        match self.controllables.get(&id).map(|c| c.kind()) {
            Some(ControllableKind::PresetCollection(_)) => Ok(()),
            Some(_) => Err(EngineError::InvalidEdit(format!(
                "{} is not a preset collection",
                id
            ))),
            None => Err(EngineError::UnknownControllable(id)),
        }
    }
}

fn describe_kind(kind: &ControllableKind) -> KindDescription {
    match kind {
        ControllableKind::FixtureControl(control) => KindDescription::FixtureControl {
            fixture: control.fixture(),
        },
        ControllableKind::PresetCollection(collection) => KindDescription::PresetCollection {
            values: collection.values().to_vec(),
        },
        ControllableKind::Chase(chase) => KindDescription::Chase {
            steps: chase.sequence().steps().to_vec(),
            trigger: chase.trigger(),
            transition: chase.transition(),
        },
        ControllableKind::TimeSequence(ts) => KindDescription::TimeSequence {
            steps: ts
                .sequence()
                .steps()
                .iter()
                .enumerate()
                .map(|(i, collection)| StepDescription {
                    collection: *collection,
                    settings: ts.step_settings(i).unwrap_or_default(),
                })
                .collect(),
            repeat_count: ts.repeat_count(),
            sustain: ts.sustain(),
        },
        ControllableKind::Effect(effect) => KindDescription::Effect {
            effect: effect.kind(),
            connections: effect.connections().to_vec(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::control_value::ControlValue;

    #[test]
    fn edges_may_reference_later_entries() {
        let description: GraphDescription = serde_json::from_str(
            r#"{
                "controllables": [
                    { "id": 1, "name": "chase", "kind": { "kind": "chase", "steps": [2],
                      "trigger": { "type": "delay", "ms": 250 } } },
                    { "id": 2, "name": "look", "kind": { "kind": "preset_collection" } }
                ],
                "preset_values": [ { "id": 7, "target": 1, "input": 0, "value": 16777215 } ]
            }"#,
        )
        .expect("valid json");

        let mut graph = Graph::from_description(&description).expect("loads");
        assert_eq!(graph.evaluation_order(), &[ControllableId(1), ControllableId(2)]);

        let next = graph
            .add_preset_value(ControllableId(2), 0, ControlValue::MAX)
            .expect("master");
        assert!(next.0 > 7);
        let fresh = graph.add_preset_collection("new", FolderId::ROOT).expect("root");
        assert!(fresh.0 > 2);
    }

    #[test]
    fn cyclic_description_is_rejected() {
        let description = GraphDescription {
            controllables: vec![
                ControllableDescription {
                    id: ControllableId(0),
                    name: "a".into(),
                    folder: FolderId::ROOT,
                    kind: KindDescription::Effect {
                        effect: EffectKind::Inverter,
                        connections: vec![Connection {
                            target: ControllableId(1),
                            input: 0,
                        }],
                    },
                },
                ControllableDescription {
                    id: ControllableId(1),
                    name: "b".into(),
                    folder: FolderId::ROOT,
                    kind: KindDescription::Effect {
                        effect: EffectKind::Inverter,
                        connections: vec![Connection {
                            target: ControllableId(0),
                            input: 0,
                        }],
                    },
                },
            ],
            ..GraphDescription::default()
        };

        assert!(matches!(
            Graph::from_description(&description),
            Err(EngineError::Cycle { .. })
        ));
    }

    fn collection(id: u32, values: Vec<PresetValue>) -> ControllableDescription {
        ControllableDescription {
            id: ControllableId(id),
            name: format!("look {}", id),
            folder: FolderId::ROOT,
            kind: KindDescription::PresetCollection { values },
        }
    }

    fn master(id: u32, target: u32) -> PresetValue {
        PresetValue {
            id: PresetValueId(id),
            target: ControllableId(target),
            input: 0,
            value: ControlValue::MAX,
        }
    }

    #[test]
    fn largest_id_is_rejected_without_panicking() {
        let description = GraphDescription {
            controllables: vec![collection(u32::MAX, Vec::new())],
            ..GraphDescription::default()
        };
        assert!(matches!(
            Graph::from_description(&description),
            Err(EngineError::InvalidEdit(_))
        ));

        let description = GraphDescription {
            controllables: vec![collection(u32::MAX - 1, Vec::new())],
            ..GraphDescription::default()
        };
        let mut graph = Graph::from_description(&description).expect("last usable id");
        assert!(matches!(
            graph.add_preset_collection("one more", FolderId::ROOT),
            Err(EngineError::InvalidEdit(_))
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn preset_ids_are_unique_across_collections_and_flat_values() {
        let flat_and_nested = GraphDescription {
            controllables: vec![collection(1, vec![master(5, 2)]), collection(2, Vec::new())],
            preset_values: vec![master(5, 1)],
            ..GraphDescription::default()
        };
        assert!(matches!(
            Graph::from_description(&flat_and_nested),
            Err(EngineError::InvalidEdit(_))
        ));

        let two_collections = GraphDescription {
            controllables: vec![
                collection(1, vec![master(3, 3)]),
                collection(2, vec![master(3, 3)]),
                collection(3, Vec::new()),
            ],
            ..GraphDescription::default()
        };
        assert!(matches!(
            Graph::from_description(&two_collections),
            Err(EngineError::InvalidEdit(_))
        ));

        let distinct = GraphDescription {
            controllables: vec![collection(1, vec![master(5, 2)]), collection(2, Vec::new())],
            preset_values: vec![master(6, 1)],
            ..GraphDescription::default()
        };
        let mut graph = Graph::from_description(&distinct).expect("unique ids");
        graph
            .set_preset_value(PresetValueId(5), ControlValue::ZERO)
            .expect("collection entry");
        graph.remove_preset_value(PresetValueId(6)).expect("flat value");
        assert_eq!(graph.preset_values().count(), 0);
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let description = GraphDescription {
            preset_values: vec![PresetValue {
                id: PresetValueId(0),
                target: ControllableId(9),
                input: 0,
                value: ControlValue::MAX,
            }],
            ..GraphDescription::default()
        };
        assert!(matches!(
            Graph::from_description(&description),
            Err(EngineError::UnknownControllable(ControllableId(9)))
        ));
    }
}
