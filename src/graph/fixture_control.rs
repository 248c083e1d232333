use crate::graph::controllable::Input;
use crate::graph::MixContext;
use crate::models::control_value::ControlValue;
use crate::models::ids::FixtureId;

/// Drives the DMX channels of one fixture: input `i` sets function `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureControl {
    fixture: FixtureId,
}

impl FixtureControl {
    pub fn new(fixture: FixtureId) -> Self {
        Self { fixture }
    }

    pub fn fixture(&self) -> FixtureId {
        self.fixture
    }

    pub(crate) fn mix(&self, inputs: &[Input], ctx: &mut MixContext<'_>) {
        let Some(fixture) = ctx.theatre().fixture(self.fixture) else {
            return;
        };
        let buffer = ctx.buffer();
        for (function, input) in fixture.functions.iter().zip(inputs.iter()) {
            let value = input.value();
            if value.is_zero() {
                continue;
            }
            buffer.mix(function.universe, function.channel, value);
            if let Some(fine) = function.fine_channel {
                buffer.mix(function.universe, fine, ControlValue::from_u8(value.fine_u8()));
            }
        }
    }
}
