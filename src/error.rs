use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::TargetIdentity;
use crate::geometry::PoseError;

/// Why a ray configuration could not produce a meaningful point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degeneracy {
    /// Fewer rays than a unique intersection needs
    TooFewRays(usize),
    /// Normal equations too close to singular (near-parallel rays)
    IllConditioned { condition: f64 },
    /// The least-squares point lies behind every camera
    BehindCameras,
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewRays(n) => write!(f, "only {} ray(s)", n),
            Self::IllConditioned { condition } => {
                write!(f, "ill-conditioned rays (condition number {:.3e})", condition)
            }
            Self::BehindCameras => f.write_str("intersection behind all cameras"),
        }
    }
}

/// Local, recoverable outcomes of the detection-to-estimate pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocateError {
    #[error("target not found in frame")]
    DetectionNotFound,

    #[error("pose unavailable: {0}")]
    PoseUnavailable(#[from] PoseError),

    #[error("platform moving too fast: {speed:.2} > {max_speed:.2}")]
    RejectedMotion { speed: f64, max_speed: f64 },

    #[error("viewpoint too close to last admission: {distance:.3} < {threshold:.3}")]
    RejectedNovelty { distance: f64, threshold: f64 },

    #[error("insufficient samples: {have} (need more than {need})")]
    InsufficientSamples { have: usize, need: usize },

    #[error("camera model not initialized")]
    Uninitialized,

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(Degeneracy),

    #[error("no color bounds configured for {0}")]
    MissingColorBounds(TargetIdentity),

    #[error("opencv: {0}")]
    OpenCv(String),

    #[error("config: {0}")]
    Config(String),
}

impl From<opencv::Error> for LocateError {
    fn from(err: opencv::Error) -> Self {
        Self::OpenCv(err.to_string())
    }
}

impl LocateError {
    /// Reason tag reported to synchronous callers alongside `found = false`
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::DetectionNotFound => FailureReason::DetectionNotFound,
            Self::PoseUnavailable(_) => FailureReason::PoseUnavailable,
            Self::RejectedMotion { .. } => FailureReason::RejectedMotion,
            Self::RejectedNovelty { .. } => FailureReason::RejectedNovelty,
            Self::InsufficientSamples { .. } => FailureReason::InsufficientSamples,
            Self::Uninitialized => FailureReason::Uninitialized,
            Self::DegenerateGeometry(_) => FailureReason::DegenerateGeometry,
            Self::MissingColorBounds(_) => FailureReason::MissingColorBounds,
            Self::OpenCv(_) | Self::Config(_) => FailureReason::Internal,
        }
    }
}

/// Serializable failure tag of the query surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    DetectionNotFound,
    PoseUnavailable,
    RejectedMotion,
    RejectedNovelty,
    InsufficientSamples,
    Uninitialized,
    DegenerateGeometry,
    MissingColorBounds,
    Internal,
}

pub type Result<T> = std::result::Result<T, LocateError>;
