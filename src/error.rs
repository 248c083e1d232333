use thiserror::Error;

use crate::models::ids::{ControllableId, FixtureId, FolderId, PresetValueId, SceneId};

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("edit would create a dependency cycle through '{name}'")]
    Cycle { name: String },

    #[error("unknown controllable {0}")]
    UnknownControllable(ControllableId),

    #[error("unknown folder {0}")]
    UnknownFolder(FolderId),

    #[error("unknown fixture {0}")]
    UnknownFixture(FixtureId),

    #[error("unknown preset value {0}")]
    UnknownPresetValue(PresetValueId),

    #[error("unknown scene {0}")]
    UnknownScene(SceneId),

    #[error("input {input} out of range for '{name}' ({count} inputs)")]
    InputOutOfRange {
        name: String,
        input: usize,
        count: usize,
    },

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("device '{device}': {message}")]
    Device { device: String, message: String },

    /// The device missed its output period; the engine re-prepares it.
    #[error("device '{device}' under/overrun")]
    Underrun { device: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("settings: {0}")]
    Settings(String),

    #[error("fixture definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn device(device: &str, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.to_string(),
            message: message.into(),
        }
    }

    /// Errors the caller made while editing, as opposed to runtime I/O failures.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. }
                | Self::UnknownControllable(_)
                | Self::UnknownFolder(_)
                | Self::UnknownFixture(_)
                | Self::UnknownPresetValue(_)
                | Self::UnknownScene(_)
                | Self::InputOutOfRange { .. }
                | Self::InvalidEdit(_)
        )
    }
}
