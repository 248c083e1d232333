//! Theatre: the patched fixtures and the DMX addresses of their functions.

pub mod definition;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::models::ids::{FixtureId, IdCounter};
use crate::models::universe::UNIVERSE_SIZE;

pub use definition::FixtureDefinition;
pub use parser::{functions_for_mode, parse_definition, parse_definition_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    MasterDimmer,
    Red,
    Green,
    Blue,
    White,
    Amber,
    Uv,
    Pan,
    Tilt,
    Strobe,
    Generic,
}

/// One addressable function of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureFunction {
    pub name: String,
    pub function_type: FunctionType,
    pub universe: usize,
    /// 0-based channel within the universe.
    pub channel: usize,
    /// Low byte of a 16-bit function.
    #[serde(default)]
    pub fine_channel: Option<usize>,
}

impl FixtureFunction {
    pub fn new(name: &str, function_type: FunctionType, universe: usize, channel: usize) -> Self {
        Self {
            name: name.to_string(),
            function_type,
            universe,
            channel,
            fine_channel: None,
        }
    }

    pub fn with_fine_channel(mut self, channel: usize) -> Self {
        self.fine_channel = Some(channel);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub id: FixtureId,
    pub name: String,
    pub functions: Vec<FixtureFunction>,
}

#[derive(Debug, Clone, Default)]
pub struct Theatre {
    fixtures: BTreeMap<FixtureId, Fixture>,
    ids: IdCounter,
}

impl Theatre {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fixture(&mut self, name: &str, functions: Vec<FixtureFunction>) -> Result<FixtureId> {
        let id = FixtureId(self.ids.next()?);
        self.insert_fixture(id, name, functions)?;
        Ok(id)
    }

    /// Patches a fixture under a known id, as when loading a description.
    pub(crate) fn insert_fixture(
        &mut self,
        id: FixtureId,
        name: &str,
        functions: Vec<FixtureFunction>,
    ) -> Result<()> {
        if self.fixtures.contains_key(&id) {
            return Err(EngineError::InvalidEdit(format!("{} already exists", id)));
        }
        for function in &functions {
            let out_of_range = function.channel >= UNIVERSE_SIZE
                || function.fine_channel.map(|c| c >= UNIVERSE_SIZE).unwrap_or(false);
            if out_of_range {
                return Err(EngineError::InvalidEdit(format!(
                    "function '{}' of '{}' is outside the universe",
                    function.name, name
                )));
            }
        }
        self.ids.observe(id.0)?;
        self.fixtures.insert(
            id,
            Fixture {
                id,
                name: name.to_string(),
                functions,
            },
        );
        Ok(())
    }

    /// Patches every function of `mode` from a QLC+ definition.
    pub fn add_from_definition(
        &mut self,
        name: &str,
        definition: &FixtureDefinition,
        mode: &str,
        universe: usize,
        start_channel: usize,
    ) -> Result<FixtureId> {
        let functions = functions_for_mode(definition, mode, universe, start_channel)?;
        self.add_fixture(name, functions)
    }

    pub(crate) fn remove_fixture(&mut self, id: FixtureId) -> Result<Fixture> {
        self.fixtures
            .remove(&id)
            .ok_or(EngineError::UnknownFixture(id))
    }

    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.get(&id)
    }

    pub fn fixtures(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.values()
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Highest universe index any function writes to, plus one.
    pub fn universes_used(&self) -> usize {
        self.fixtures
            .values()
            .flat_map(|f| f.functions.iter())
            .map(|f| f.universe + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(universe: usize, start: usize) -> Vec<FixtureFunction> {
        vec![
            FixtureFunction::new("Red", FunctionType::Red, universe, start),
            FixtureFunction::new("Green", FunctionType::Green, universe, start + 1),
            FixtureFunction::new("Blue", FunctionType::Blue, universe, start + 2),
        ]
    }

    #[test]
    fn fixture_ids_are_monotonic() {
        let mut theatre = Theatre::new();
        let a = theatre.add_fixture("a", rgb(0, 0)).expect("patch a");
        let b = theatre.add_fixture("b", rgb(1, 0)).expect("patch b");
        assert!(b > a);
        theatre.remove_fixture(b).expect("remove b");
        let c = theatre.add_fixture("c", rgb(0, 3)).expect("patch c");
        assert!(c > b);
        assert_eq!(theatre.universes_used(), 1);
    }

    #[test]
    fn rejects_functions_outside_the_universe() {
        let mut theatre = Theatre::new();
        let bad = vec![FixtureFunction::new("Pan", FunctionType::Pan, 0, 511).with_fine_channel(512)];
        assert!(matches!(
            theatre.add_fixture("bad", bad),
            Err(EngineError::InvalidEdit(_))
        ));
        assert!(theatre.is_empty());
    }

    #[test]
    fn unknown_fixture_removal_fails() {
        let mut theatre = Theatre::new();
        assert!(matches!(
            theatre.remove_fixture(FixtureId(9)),
            Err(EngineError::UnknownFixture(FixtureId(9)))
        ));
    }
}
