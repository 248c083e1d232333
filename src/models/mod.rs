pub mod control_value;
pub mod ids;
pub mod trigger;
pub mod universe;

pub use control_value::{mix, ControlValue, MixStyle};
pub use ids::{ControllableId, FixtureId, FolderId, PresetValueId, SceneId};
pub use trigger::{StepClock, Transition, TransitionKind, Trigger};
pub use universe::{ChannelBuffer, UniverseValues, ValueSnapshot, UNIVERSE_SIZE};
