use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

macro_rules! registry_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $prefix, self.0)
            }
        }
    };
}

registry_id!(
    /// Identifies a controllable in the graph registry.
    ControllableId,
    "controllable"
);
registry_id!(
    /// Identifies a folder. [`FolderId::ROOT`] always exists.
    FolderId,
    "folder"
);
registry_id!(FixtureId, "fixture");
registry_id!(
    /// Preset value ids are handed out monotonically and never reused.
    PresetValueId,
    "preset"
);
registry_id!(SceneId, "scene");

impl FolderId {
    pub const ROOT: FolderId = FolderId(0);
}

/// Hands out ids in increasing order. `u32::MAX` is never handed out, so
/// the counter can always step past any id it has seen.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdCounter(u32);

impl IdCounter {
    pub fn starting_at(first: u32) -> Self {
        Self(first)
    }

    pub fn next(&mut self) -> Result<u32> {
        let id = self.0;
        if id == u32::MAX {
            return Err(exhausted());
        }
        self.0 = id + 1;
        Ok(id)
    }

    /// Makes sure future ids are above `seen`.
    pub fn observe(&mut self, seen: u32) -> Result<()> {
        if seen == u32::MAX {
            return Err(exhausted());
        }
        if seen >= self.0 {
            self.0 = seen + 1;
        }
        Ok(())
    }
}

fn exhausted() -> EngineError {
    EngineError::InvalidEdit("id space exhausted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_never_wraps() {
        let mut ids = IdCounter::default();
        assert!(ids.observe(u32::MAX).is_err());
        assert_eq!(ids.next().expect("fresh"), 0);

        ids.observe(u32::MAX - 2).expect("below the limit");
        assert_eq!(ids.next().expect("last id"), u32::MAX - 1);
        assert!(ids.next().is_err());
        assert!(ids.next().is_err());
    }
}
