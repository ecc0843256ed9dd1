mod camera;
mod pose;

pub use camera::CameraIntrinsics;
pub use pose::{PoseError, PoseHistory, PoseProvider, PoseRecord, PoseSample};
