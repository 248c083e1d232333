use serde::{Deserialize, Serialize};

/// A 24-bit intensity. Every constructor and every [`MixStyle`] keeps the
/// value inside `0..=ControlValue::MAX`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ControlValue(u32);

/// How two values combine when they meet at the same input or channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixStyle {
    #[default]
    Default,
    HighestValue,
    Sum,
    LowestValue,
    Multiply,
    First,
    Second,
}

impl ControlValue {
    pub const ZERO: ControlValue = ControlValue(0);
    pub const MAX: ControlValue = ControlValue((1 << 24) - 1);

    /// Clamps `raw` into the value domain.
    pub const fn new(raw: u32) -> Self {
        if raw > Self::MAX.0 {
            Self::MAX
        } else {
            Self(raw)
        }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `ratio` in [0, 1]; values outside are clamped.
    pub fn from_ratio(ratio: f64) -> Self {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Self::ZERO;
        }
        Self::new((ratio.min(1.0) * Self::MAX.0 as f64).round() as u32)
    }

    /// Expands an 8-bit DMX level so that 255 maps to `MAX`.
    pub const fn from_u8(level: u8) -> Self {
        let v = level as u32;
        Self((v << 16) | (v << 8) | v)
    }

    pub fn ratio(self) -> f64 {
        self.0 as f64 / Self::MAX.0 as f64
    }

    /// Multiplies by `factor`, clamped to [0, 1].
    pub fn scaled(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return Self::ZERO;
        }
        if factor >= 1.0 {
            return self;
        }
        Self::new((self.0 as f64 * factor).round() as u32)
    }

    /// Coarse 8-bit DMX level.
    pub const fn to_u8(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// The byte below [`ControlValue::to_u8`], for 16-bit fine channels.
    pub const fn fine_u8(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub fn mix(self, other: ControlValue, style: MixStyle) -> ControlValue {
        mix(self, other, style)
    }
}

/// Combines two values. Total over the domain; never leaves `0..=MAX`.
pub fn mix(a: ControlValue, b: ControlValue, style: MixStyle) -> ControlValue {
    match style {
        MixStyle::Default | MixStyle::HighestValue => a.max(b),
        MixStyle::Sum => ControlValue::new(a.0.saturating_add(b.0)),
        MixStyle::LowestValue => a.min(b),
        // 15-bit operands keep the product within u32; >> 6 brings it back to 24 bits.
        MixStyle::Multiply => ControlValue::new(((a.0 >> 9) * (b.0 >> 9)) >> 6),
        MixStyle::First => a,
        MixStyle::Second => b,
    }
}

impl From<u8> for ControlValue {
    fn from(level: u8) -> Self {
        Self::from_u8(level)
    }
}
