use crate::models::control_value::{ControlValue, MixStyle};

/// Channels per DMX universe.
pub const UNIVERSE_SIZE: usize = 512;

pub type UniverseValues = [u8; UNIVERSE_SIZE];

/// High-resolution working buffer written by the mix pass.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    universes: Vec<[ControlValue; UNIVERSE_SIZE]>,
}

impl ChannelBuffer {
    pub fn new(universe_count: usize) -> Self {
        Self {
            universes: vec![[ControlValue::ZERO; UNIVERSE_SIZE]; universe_count],
        }
    }

    pub fn universe_count(&self) -> usize {
        self.universes.len()
    }

    pub fn reset(&mut self) {
        for universe in &mut self.universes {
            universe.fill(ControlValue::ZERO);
        }
    }

    pub fn get(&self, universe: usize, channel: usize) -> ControlValue {
        self.universes
            .get(universe)
            .and_then(|u| u.get(channel))
            .copied()
            .unwrap_or_default()
    }

    /// Folds `value` into a channel with the highest-value rule.
    /// Writes outside the configured universes are dropped.
    pub fn mix(&mut self, universe: usize, channel: usize, value: ControlValue) {
        if let Some(slot) = self
            .universes
            .get_mut(universe)
            .and_then(|u| u.get_mut(channel))
        {
            *slot = slot.mix(value, MixStyle::Default);
        }
    }

    /// Quantizes every channel to 8 bits.
    pub fn quantize(&self) -> ValueSnapshot {
        let universes = self
            .universes
            .iter()
            .map(|universe| {
                let mut out = [0u8; UNIVERSE_SIZE];
                for (byte, value) in out.iter_mut().zip(universe.iter()) {
                    *byte = value.to_u8();
                }
                out
            })
            .collect();
        ValueSnapshot { universes }
    }
}

/// Final 8-bit channel values of every universe for one tick.
///
/// A snapshot never changes after it is built; cloning copies the arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSnapshot {
    universes: Vec<UniverseValues>,
}

impl ValueSnapshot {
    /// All channels at zero.
    pub fn blank(universe_count: usize) -> Self {
        Self {
            universes: vec![[0; UNIVERSE_SIZE]; universe_count],
        }
    }

    pub fn from_universes(universes: Vec<UniverseValues>) -> Self {
        Self { universes }
    }

    pub fn universe_count(&self) -> usize {
        self.universes.len()
    }

    pub fn universe(&self, index: usize) -> Option<&UniverseValues> {
        self.universes.get(index)
    }

    pub fn universes(&self) -> &[UniverseValues] {
        &self.universes
    }

    /// Channel value, or 0 outside the configured range.
    pub fn value(&self, universe: usize, channel: usize) -> u8 {
        self.universe(universe)
            .and_then(|u| u.get(channel))
            .copied()
            .unwrap_or(0)
    }

    pub fn active_channels(&self) -> usize {
        self.universes
            .iter()
            .map(|u| u.iter().filter(|v| **v > 0).count())
            .sum()
    }
}
