mod color;
mod target;

pub use color::{ColorDetector, DetectorOutcome};
pub use target::{ColorBounds, TargetIdentity};
