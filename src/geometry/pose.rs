use nalgebra as na;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// Tolerance when matching a lookup stamp against the ends of the history
const STAMP_EPSILON: f64 = 1e-9;

/// Camera pose in the world frame at a timestamp.
///
/// `rotation` maps camera-frame vectors into the world frame and
/// `translation` is the camera optical center in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub timestamp: f64,
    pub translation: na::Vector3<f64>,
    pub rotation: na::UnitQuaternion<f64>,
}

impl PoseSample {
    pub fn new(
        timestamp: f64,
        translation: na::Vector3<f64>,
        rotation: na::UnitQuaternion<f64>,
    ) -> Self {
        Self {
            timestamp,
            translation,
            rotation,
        }
    }

    /// Pose with identity rotation
    pub fn at(timestamp: f64, translation: na::Vector3<f64>) -> Self {
        Self::new(timestamp, translation, na::UnitQuaternion::identity())
    }

    /// Rotate a camera-frame direction into the world frame
    pub fn to_world(&self, direction: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.rotation * direction
    }
}

/// Serialized pose as it appears in recorded trajectory files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecord {
    pub timestamp: f64,
    pub translation: [f64; 3],
    /// Quaternion as `[x, y, z, w]`
    pub rotation: [f64; 4],
}

impl From<&PoseRecord> for PoseSample {
    fn from(record: &PoseRecord) -> Self {
        let [x, y, z, w] = record.rotation;
        let rotation = na::UnitQuaternion::from_quaternion(na::Quaternion::new(w, x, y, z));
        let [tx, ty, tz] = record.translation;
        PoseSample::new(record.timestamp, na::Vector3::new(tx, ty, tz), rotation)
    }
}

/// Failures of a pose or velocity lookup
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoseError {
    #[error("no pose history buffered")]
    Empty,

    #[error("timestamp {stamp:.3} outside buffered history [{oldest:.3}, {newest:.3}]")]
    OutOfRange { stamp: f64, oldest: f64, newest: f64 },

    #[error("pose lookup timed out")]
    Timeout,

    #[error("no transform from {world} to {camera}")]
    UnknownTransform { world: String, camera: String },

    #[error("invalid averaging window")]
    InvalidWindow,
}

/// Source of camera poses and platform velocity
pub trait PoseProvider: Send + Sync {
    /// Pose of `camera_frame` in `world_frame` at `stamp`
    fn lookup_pose(
        &self,
        world_frame: &str,
        camera_frame: &str,
        stamp: f64,
        timeout: Duration,
    ) -> Result<PoseSample, PoseError>;

    /// Translational speed of `camera_frame` over the window ending at `stamp`
    fn lookup_speed(
        &self,
        world_frame: &str,
        camera_frame: &str,
        stamp: f64,
        window: Duration,
        timeout: Duration,
    ) -> Result<f64, PoseError>;
}

/// Time-bounded buffer of camera poses for one world/camera frame pair
pub struct PoseHistory {
    world_frame: String,
    camera_frame: String,
    samples: RwLock<VecDeque<PoseSample>>,
    /// Samples older than newest - cache_secs are dropped
    cache_secs: f64,
}

impl PoseHistory {
    /// Create an empty history keeping the last 10 seconds of poses
    pub fn new(world_frame: &str, camera_frame: &str) -> Self {
        Self {
            world_frame: world_frame.to_string(),
            camera_frame: camera_frame.to_string(),
            samples: RwLock::new(VecDeque::new()),
            cache_secs: 10.0,
        }
    }

    /// Set how many seconds of history to keep
    pub fn with_cache_secs(mut self, secs: f64) -> Self {
        self.cache_secs = secs;
        self
    }

    /// Build a history from recorded poses
    pub fn from_records(world_frame: &str, camera_frame: &str, records: &[PoseRecord]) -> Self {
        let history = Self::new(world_frame, camera_frame).with_cache_secs(f64::INFINITY);
        for record in records {
            history.insert(PoseSample::from(record));
        }
        history
    }

    /// Insert a pose, keeping samples ordered by timestamp
    pub fn insert(&self, sample: PoseSample) {
        let mut samples = self.samples.write();
        let idx = samples.partition_point(|s| s.timestamp < sample.timestamp);
        match samples.get(idx) {
            Some(existing) if (existing.timestamp - sample.timestamp).abs() < STAMP_EPSILON => {
                samples[idx] = sample;
            }
            _ => samples.insert(idx, sample),
        }

        if let Some(newest) = samples.back().map(|s| s.timestamp) {
            while samples
                .front()
                .is_some_and(|s| s.timestamp < newest - self.cache_secs)
            {
                samples.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    fn check_frames(&self, world_frame: &str, camera_frame: &str) -> Result<(), PoseError> {
        if world_frame != self.world_frame || camera_frame != self.camera_frame {
            return Err(PoseError::UnknownTransform {
                world: world_frame.to_string(),
                camera: camera_frame.to_string(),
            });
        }
        Ok(())
    }
}

/// Interpolate the pose at `stamp`: linear in translation, slerp in rotation
fn interpolate(samples: &VecDeque<PoseSample>, stamp: f64) -> Result<PoseSample, PoseError> {
    let (oldest, newest) = match (samples.front(), samples.back()) {
        (Some(front), Some(back)) => (front, back),
        _ => return Err(PoseError::Empty),
    };

    if stamp < oldest.timestamp - STAMP_EPSILON || stamp > newest.timestamp + STAMP_EPSILON {
        return Err(PoseError::OutOfRange {
            stamp,
            oldest: oldest.timestamp,
            newest: newest.timestamp,
        });
    }

    let idx = samples.partition_point(|s| s.timestamp < stamp);
    if idx == 0 {
        return Ok(PoseSample { timestamp: stamp, ..*oldest });
    }
    if idx == samples.len() {
        return Ok(PoseSample { timestamp: stamp, ..*newest });
    }

    let before = &samples[idx - 1];
    let after = &samples[idx];
    let span = after.timestamp - before.timestamp;
    if span < STAMP_EPSILON {
        return Ok(PoseSample { timestamp: stamp, ..*after });
    }

    let alpha = (stamp - before.timestamp) / span;
    let translation = before.translation.lerp(&after.translation, alpha);
    let rotation = before
        .rotation
        .try_slerp(&after.rotation, alpha, 1e-9)
        .unwrap_or(before.rotation);

    Ok(PoseSample::new(stamp, translation, rotation))
}

impl PoseProvider for PoseHistory {
    fn lookup_pose(
        &self,
        world_frame: &str,
        camera_frame: &str,
        stamp: f64,
        timeout: Duration,
    ) -> Result<PoseSample, PoseError> {
        self.check_frames(world_frame, camera_frame)?;
        let samples = self
            .samples
            .try_read_for(timeout)
            .ok_or(PoseError::Timeout)?;
        interpolate(&samples, stamp)
    }

    fn lookup_speed(
        &self,
        world_frame: &str,
        camera_frame: &str,
        stamp: f64,
        window: Duration,
        timeout: Duration,
    ) -> Result<f64, PoseError> {
        self.check_frames(world_frame, camera_frame)?;
        let window = window.as_secs_f64();
        if window <= 0.0 {
            return Err(PoseError::InvalidWindow);
        }

        let samples = self
            .samples
            .try_read_for(timeout)
            .ok_or(PoseError::Timeout)?;
        let end = interpolate(&samples, stamp)?;

        let oldest = samples.front().map(|s| s.timestamp).ok_or(PoseError::Empty)?;
        let start_stamp = (stamp - window).max(oldest);
        let elapsed = stamp - start_stamp;
        if elapsed < STAMP_EPSILON {
            return Err(PoseError::OutOfRange {
                stamp: stamp - window,
                oldest,
                newest: samples.back().map_or(oldest, |s| s.timestamp),
            });
        }

        let start = interpolate(&samples, start_stamp)?;
        Ok((end.translation - start.translation).norm() / elapsed)
    }
}
