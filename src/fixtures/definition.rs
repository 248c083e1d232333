//! Serde mirror of the QLC+ `.qxf` fixture definition format.
//!
//! Only the parts the theatre needs are modelled: channel names, their
//! preset/group classification and the channel lists of each mode.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct FixtureDefinition {
    pub manufacturer: String,
    pub model: String,
    #[serde(rename = "Type", default)]
    pub type_: String,
    #[serde(rename = "Channel", default)]
    pub channels: Vec<Channel>,
    #[serde(rename = "Mode", default)]
    pub modes: Vec<Mode>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Channel {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Preset", default)]
    pub preset: Option<String>,
    pub group: Option<Group>,
    #[serde(rename = "Colour", default)]
    pub colour: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Group {
    /// 0 for the coarse byte, 1 for the fine byte of a 16-bit function.
    #[serde(rename = "@Byte", default)]
    pub byte: u8,
    #[serde(rename = "$value")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Mode {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "Channel", default)]
    pub channels: Vec<ModeChannel>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModeChannel {
    #[serde(rename = "@Number")]
    pub number: u32,
    #[serde(rename = "$value")]
    pub name: String,
}

impl FixtureDefinition {
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.iter().find(|m| m.name == name)
    }
}

impl Channel {
    /// True for the low byte of a 16-bit function.
    pub fn is_fine(&self) -> bool {
        if let Some(preset) = &self.preset {
            return preset.ends_with("Fine");
        }
        self.group.as_ref().map(|g| g.byte == 1).unwrap_or(false)
    }
}
