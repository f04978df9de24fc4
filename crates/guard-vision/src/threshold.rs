use serde::{Deserialize, Deserializer};

/// Process-wide confidence cutoff, always within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(0.5);
    pub const STEP: f32 = 0.05;

    /// Clamps into range. Non-finite input yields `None`.
    pub fn new(v: f32) -> Option<Self> {
        v.is_finite().then(|| Self(v.clamp(0.0, 1.0)))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn step_up(self) -> Self {
        Self::snap(self.0 + Self::STEP)
    }

    pub fn step_down(self) -> Self {
        Self::snap(self.0 - Self::STEP)
    }

    // keeps repeated steps on the 0.05 grid
    fn snap(v: f32) -> Self {
        Self(((v / Self::STEP).round() * Self::STEP).clamp(0.0, 1.0))
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = f32::deserialize(d)?;
        Threshold::new(v).ok_or_else(|| serde::de::Error::custom("threshold must be a finite number"))
    }
}
