use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed set of colored targets the locator tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetIdentity {
    Red,
    Yellow,
    Green,
}

impl TargetIdentity {
    /// Every known identity, in tick order
    pub const ALL: [TargetIdentity; 3] = [Self::Red, Self::Yellow, Self::Green];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }

    /// RGB color used when visualizing this target
    pub fn draw_color(&self) -> [u8; 3] {
        match self {
            Self::Red => [255, 0, 0],
            Self::Yellow => [255, 255, 0],
            Self::Green => [0, 255, 0],
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "yellow" => Ok(Self::Yellow),
            "green" => Ok(Self::Green),
            other => Err(format!("unknown target: {}", other)),
        }
    }
}

/// Inclusive HSV bounds for one target, in OpenCV's 8-bit HSV ranges
/// (hue 0..180, saturation and value 0..255)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBounds {
    pub low: [f64; 3],
    pub high: [f64; 3],
}

impl ColorBounds {
    pub fn new(low: [f64; 3], high: [f64; 3]) -> Self {
        Self { low, high }
    }

    /// True when every channel satisfies low <= high
    pub fn is_ordered(&self) -> bool {
        self.low.iter().zip(self.high.iter()).all(|(l, h)| l <= h)
    }
}
