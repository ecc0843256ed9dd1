mod config;
mod detection;
mod error;
mod geometry;
mod locator;
mod tracking;

pub use config::{DetectorConfig, LocatorConfig, TriangulationConfig};
pub use detection::{ColorBounds, ColorDetector, DetectorOutcome, TargetIdentity};
pub use error::{Degeneracy, FailureReason, LocateError, Result};
pub use geometry::{CameraIntrinsics, PoseError, PoseHistory, PoseProvider, PoseRecord, PoseSample};
#[cfg(feature = "rerun")]
pub use locator::RerunSink;
pub use locator::{
    DebugSink, Detection2dResponse, Estimate3dResponse, Frame, ImageDims, NullSink,
    ObserveOutcome, TargetLocator, TickReport, Ticker,
};
pub use tracking::{
    BufferedObservation, Estimate, GateConfig, GateDecision, MotionGate, ObservationStore, Ray,
    TrackState, Triangulator, intersect_rays,
};
