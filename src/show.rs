//! Scenes played as an overlay above the steady-state graph.
//!
//! A playing scene contributes the envelope-scaled level of each active item
//! into its target input, on top of whatever the preset values put there.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::models::control_value::ControlValue;
use crate::models::ids::{ControllableId, IdCounter, SceneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneItem {
    /// Offset from the scene start.
    pub start_ms: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub fade_in_ms: u64,
    #[serde(default)]
    pub fade_out_ms: u64,
    pub target: ControllableId,
    pub input: usize,
    pub level: ControlValue,
}

impl SceneItem {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }

    /// Envelope factor in [0, 1] at `local_ms` from the scene start.
    pub fn envelope(&self, local_ms: u64) -> f64 {
        if local_ms < self.start_ms || local_ms >= self.end_ms() {
            return 0.0;
        }
        let into = local_ms - self.start_ms;
        let remaining = self.end_ms() - local_ms;
        let fade_in = if self.fade_in_ms > 0 && into < self.fade_in_ms {
            into as f64 / self.fade_in_ms as f64
        } else {
            1.0
        };
        let fade_out = if self.fade_out_ms > 0 && remaining < self.fade_out_ms {
            remaining as f64 / self.fade_out_ms as f64
        } else {
            1.0
        };
        fade_in.min(fade_out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub items: Vec<SceneItem>,
}

impl Scene {
    pub fn duration_ms(&self) -> u64 {
        self.items.iter().map(SceneItem::end_ms).max().unwrap_or(0)
    }
}

/// One value the overlay puts into an input this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution {
    pub target: ControllableId,
    pub input: usize,
    pub value: ControlValue,
}

#[derive(Debug, Clone, Default)]
pub struct Show {
    scenes: BTreeMap<SceneId, Scene>,
    /// Playing scenes and the show time they started at.
    playing: BTreeMap<SceneId, u64>,
    ids: IdCounter,
}

impl Show {
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn is_playing(&self, id: SceneId) -> bool {
        self.playing.contains_key(&id)
    }

    pub(crate) fn add_scene(&mut self, name: &str) -> Result<SceneId> {
        let id = SceneId(self.ids.next()?);
        self.insert_scene(id, name)?;
        Ok(id)
    }

    pub(crate) fn insert_scene(&mut self, id: SceneId, name: &str) -> Result<()> {
        self.ids.observe(id.0)?;
        self.scenes.insert(
            id,
            Scene {
                id,
                name: name.to_string(),
                items: Vec::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn push_item(&mut self, scene: SceneId, item: SceneItem) -> Result<()> {
        self.scenes
            .get_mut(&scene)
            .ok_or(EngineError::UnknownScene(scene))?
            .items
            .push(item);
        Ok(())
    }

    pub(crate) fn remove_scene(&mut self, id: SceneId) -> Result<Scene> {
        self.playing.remove(&id);
        self.scenes.remove(&id).ok_or(EngineError::UnknownScene(id))
    }

    pub fn start_scene(&mut self, id: SceneId, now_ms: u64) -> Result<()> {
        if !self.scenes.contains_key(&id) {
            return Err(EngineError::UnknownScene(id));
        }
        log::debug!("[show] starting {}", id);
        self.playing.insert(id, now_ms);
        Ok(())
    }

    pub fn stop_scene(&mut self, id: SceneId) -> Result<()> {
        if !self.scenes.contains_key(&id) {
            return Err(EngineError::UnknownScene(id));
        }
        self.playing.remove(&id);
        Ok(())
    }

    /// Items of any scene aimed at `target` are dropped; returns how many.
    pub(crate) fn remove_target(&mut self, target: ControllableId) -> usize {
        let mut removed = 0;
        for scene in self.scenes.values_mut() {
            let before = scene.items.len();
            scene.items.retain(|item| item.target != target);
            removed += before - scene.items.len();
        }
        removed
    }

    pub fn references(&self, target: ControllableId) -> usize {
        self.scenes
            .values()
            .flat_map(|s| s.items.iter())
            .filter(|item| item.target == target)
            .count()
    }

    /// Values of every active item at `now_ms`. Scenes whose items have all
    /// ended stop playing.
    pub fn contributions(&mut self, now_ms: u64) -> Vec<Contribution> {
        let mut out = Vec::new();
        let mut ended = Vec::new();

        for (&id, &started) in &self.playing {
            let Some(scene) = self.scenes.get(&id) else {
                ended.push(id);
                continue;
            };
            let local = now_ms.saturating_sub(started);
            if local >= scene.duration_ms() {
                ended.push(id);
                continue;
            }
            for item in &scene.items {
                let factor = item.envelope(local);
                if factor > 0.0 {
                    out.push(Contribution {
                        target: item.target,
                        input: item.input,
                        value: item.level.scaled(factor),
                    });
                }
            }
        }

        for id in ended {
            log::debug!("[show] {} finished", id);
            self.playing.remove(&id);
        }
        out
    }
}
