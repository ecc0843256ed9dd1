mod gate;
mod store;
mod triangulation;

pub use gate::{GateConfig, GateDecision, MotionGate};
pub use store::{BufferedObservation, ObservationStore, TrackState};
pub use triangulation::{Estimate, Ray, Triangulator, intersect_rays};
