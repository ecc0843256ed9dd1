//! Orchestration of detection, admission and triangulation across targets.
//!
//! [`TargetLocator`] owns all per-target state. Frame arrival, periodic ticks
//! and synchronous queries may run concurrently on different threads: every
//! target's gate and buffer sit behind their own mutex, the latest frame is
//! deep-copied before segmentation, and the camera model is write-once.

mod query;
mod sink;
mod ticker;

pub use query::{Detection2dResponse, Estimate3dResponse, ImageDims};
#[cfg(feature = "rerun")]
pub use sink::RerunSink;
pub use sink::{DebugSink, NullSink};
pub use ticker::Ticker;

use nalgebra as na;
use opencv::{
    core::{Mat, Point, Scalar},
    imgproc,
    prelude::*,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::config::LocatorConfig;
use crate::detection::{ColorBounds, ColorDetector, DetectorOutcome, TargetIdentity};
use crate::error::{LocateError, Result};
use crate::geometry::{CameraIntrinsics, PoseProvider};
use crate::tracking::{
    BufferedObservation, Estimate, GateDecision, MotionGate, ObservationStore, TrackState,
    Triangulator,
};

/// A camera frame with its capture time
pub struct Frame {
    pub image: Mat,
    pub timestamp: f64,
}

/// Result of running one target through detection and admission
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObserveOutcome {
    NotFound,
    RejectedMotion {
        speed: f64,
    },
    RejectedNovelty {
        distance: f64,
    },
    Admitted {
        center: na::Point2<f64>,
        radius: f64,
        /// Buffer length after admission
        buffered: usize,
    },
}

/// Everything one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    pub timestamp: f64,
    pub outcomes: BTreeMap<TargetIdentity, Result<ObserveOutcome>>,
    pub estimates: BTreeMap<TargetIdentity, Estimate>,
}

struct TargetTrack {
    gate: MotionGate,
    store: ObservationStore,
}

/// Turns a stream of frames into per-target 3D estimates
pub struct TargetLocator {
    config: LocatorConfig,
    detector: ColorDetector,
    poses: Arc<dyn PoseProvider>,
    sink: Arc<dyn DebugSink>,
    camera: OnceLock<CameraIntrinsics>,
    latest_frame: Mutex<Option<Frame>>,
    tracks: BTreeMap<TargetIdentity, Mutex<TargetTrack>>,
    search_active: AtomicBool,
}

impl TargetLocator {
    /// Create a locator; fails if the config does not validate
    pub fn new(config: LocatorConfig, poses: Arc<dyn PoseProvider>) -> Result<Self> {
        config.validate()?;

        let tracks = TargetIdentity::ALL
            .iter()
            .map(|&identity| {
                let track = TargetTrack {
                    gate: MotionGate::with_config(config.gate_config()),
                    store: ObservationStore::with_limits(
                        config.max_observations,
                        config.min_observations,
                    ),
                };
                (identity, Mutex::new(track))
            })
            .collect();

        Ok(Self {
            detector: config.detector.build(),
            config,
            poses,
            sink: Arc::new(NullSink),
            camera: OnceLock::new(),
            latest_frame: Mutex::new(None),
            tracks,
            search_active: AtomicBool::new(false),
        })
    }

    /// Route debug output to the given sink
    pub fn with_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Install the camera model. Only the first call has any effect.
    pub fn set_camera_model(&self, intrinsics: CameraIntrinsics) -> bool {
        let installed = self.camera.set(intrinsics).is_ok();
        if installed {
            info!(
                "Camera model ready: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
                intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
            );
        } else {
            debug!("Camera model already set, ignoring update");
        }
        installed
    }

    pub fn camera_model(&self) -> Option<&CameraIntrinsics> {
        self.camera.get()
    }

    /// Replace the most recent frame
    pub fn on_frame(&self, image: Mat, timestamp: f64) {
        *self.latest_frame.lock() = Some(Frame { image, timestamp });
    }

    /// Timestamp of the most recent frame
    pub fn last_frame_time(&self) -> Option<f64> {
        self.latest_frame.lock().as_ref().map(|f| f.timestamp)
    }

    /// Toggle periodic processing; returns the acknowledged state
    pub fn set_search_active(&self, active: bool) -> bool {
        let was = self.search_active.swap(active, Ordering::AcqRel);
        if active && !was {
            info!("Looking for targets now");
        } else if !active && was {
            info!("Done looking for targets");
        }
        active
    }

    pub fn is_search_active(&self) -> bool {
        self.search_active.load(Ordering::Acquire)
    }

    pub fn track_state(&self, identity: TargetIdentity) -> TrackState {
        self.track(identity).lock().store.state()
    }

    pub fn observation_count(&self, identity: TargetIdentity) -> usize {
        self.track(identity).lock().store.len()
    }

    /// Owned copy of one target's buffer, oldest first
    pub fn observations(&self, identity: TargetIdentity) -> Vec<BufferedObservation> {
        self.track(identity).lock().store.snapshot()
    }

    /// One periodic step: detect every configured target in the latest
    /// frame, admit what passes the gate and refresh ready estimates.
    /// Returns `None` when search is inactive or no frame has arrived.
    pub fn tick(&self) -> Option<TickReport> {
        if !self.is_search_active() {
            return None;
        }
        let frame = match self.snapshot_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not snapshot frame: {}", e);
                return None;
            }
        };

        let mut report = TickReport {
            timestamp: frame.timestamp,
            ..Default::default()
        };
        let mut found = Vec::new();

        for (&identity, bounds) in &self.config.targets {
            let outcome = self.detect(&frame.image, identity, bounds).and_then(|detection| {
                match detection {
                    DetectorOutcome::Found { center, radius } => {
                        let outcome = self.admit(identity, center, radius, frame.timestamp);
                        // A pixel taken while moving too fast is not drawn
                        if !matches!(outcome, Ok(ObserveOutcome::RejectedMotion { .. })) {
                            found.push((identity, center, radius));
                        }
                        outcome
                    }
                    DetectorOutcome::NotFound => Ok(ObserveOutcome::NotFound),
                }
            });

            match &outcome {
                Ok(ObserveOutcome::Admitted { .. } | ObserveOutcome::RejectedNovelty { .. }) => {
                    if let Some(estimate) = self.refresh_estimate(identity) {
                        report.estimates.insert(identity, estimate);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("{}: skipped this tick ({})", identity, e),
            }
            report.outcomes.insert(identity, outcome);
        }

        if let Err(e) = self.publish_annotated(&frame.image, &found) {
            warn!("Could not annotate frame: {}", e);
        }

        Some(report)
    }

    /// Run detection and admission for one target on the latest frame
    pub fn observe(&self, identity: TargetIdentity) -> Result<ObserveOutcome> {
        let bounds = *self.bounds(identity)?;
        let frame = self.snapshot_frame()?.ok_or(LocateError::DetectionNotFound)?;
        match self.detect(&frame.image, identity, &bounds)? {
            DetectorOutcome::Found { center, radius } => {
                self.admit(identity, center, radius, frame.timestamp)
            }
            DetectorOutcome::NotFound => Ok(ObserveOutcome::NotFound),
        }
    }

    /// Historyless 2D read of the latest frame; never touches the buffer
    pub fn get_2d(&self, identity: TargetIdentity) -> Result<Detection2dResponse> {
        let bounds = *self.bounds(identity)?;
        let Some(frame) = self.snapshot_frame()? else {
            debug!("{}: 2D query before any frame arrived", identity);
            return Ok(Detection2dResponse::not_found());
        };

        match self.detect(&frame.image, identity, &bounds)? {
            DetectorOutcome::Found { center, radius } => {
                let dims = ImageDims {
                    width: frame.image.cols(),
                    height: frame.image.rows(),
                };
                Ok(Detection2dResponse::found(center, radius, dims, frame.timestamp))
            }
            DetectorOutcome::NotFound => Ok(Detection2dResponse::not_found()),
        }
    }

    /// Triangulate one target from its current buffer
    pub fn get_3d(&self, identity: TargetIdentity) -> Result<Estimate3dResponse> {
        self.bounds(identity)?;
        let timestamp = self.last_frame_time();

        match self.estimate(identity) {
            Ok(estimate) => {
                self.sink.publish_estimate(identity, &estimate);
                Ok(Estimate3dResponse::found(&estimate, timestamp))
            }
            Err(e) => {
                warn!("{}: did not attempt estimate: {}", identity, e);
                Ok(Estimate3dResponse::not_found(e.reason(), timestamp))
            }
        }
    }

    /// Recompute the estimate of one target from a buffer snapshot
    pub fn estimate(&self, identity: TargetIdentity) -> Result<Estimate> {
        let snapshot = {
            let track = self.track(identity).lock();
            if !track.store.is_ready() {
                return Err(LocateError::InsufficientSamples {
                    have: track.store.len(),
                    need: track.store.min_observations(),
                });
            }
            track.store.snapshot()
        };

        let intrinsics = self.camera.get().ok_or(LocateError::Uninitialized)?;
        Triangulator::new(*intrinsics)
            .with_max_condition(self.config.triangulation.max_condition)
            .triangulate(&snapshot)
    }

    fn bounds(&self, identity: TargetIdentity) -> Result<&ColorBounds> {
        self.config
            .targets
            .get(&identity)
            .ok_or(LocateError::MissingColorBounds(identity))
    }

    fn track(&self, identity: TargetIdentity) -> &Mutex<TargetTrack> {
        // Every identity gets a track in `new`
        &self.tracks[&identity]
    }

    /// Deep copy of the latest frame so segmentation sees a stable image
    fn snapshot_frame(&self) -> Result<Option<Frame>> {
        let slot = self.latest_frame.lock();
        match slot.as_ref() {
            Some(frame) => Ok(Some(Frame {
                image: frame.image.try_clone()?,
                timestamp: frame.timestamp,
            })),
            None => Ok(None),
        }
    }

    fn detect(
        &self,
        image: &Mat,
        identity: TargetIdentity,
        bounds: &ColorBounds,
    ) -> Result<DetectorOutcome> {
        let (outcome, mask) = self.detector.detect_with_mask(image, bounds)?;
        if !mask.empty() {
            self.sink.publish_mask(identity, &mask);
        }
        Ok(outcome)
    }

    /// Gate a detection and, if it passes, append it to the target's buffer
    fn admit(
        &self,
        identity: TargetIdentity,
        center: na::Point2<f64>,
        radius: f64,
        stamp: f64,
    ) -> Result<ObserveOutcome> {
        if self.camera.get().is_none() {
            return Err(LocateError::Uninitialized);
        }

        let world = &self.config.world_frame;
        let camera = &self.config.camera_frame;
        let timeout = self.config.pose_timeout();

        let speed = self
            .poses
            .lookup_speed(world, camera, stamp, self.config.speed_window(), timeout)?;
        let pose = self.poses.lookup_pose(world, camera, stamp, timeout)?;

        let mut track = self.track(identity).lock();
        match track.gate.evaluate(speed, &pose.translation) {
            GateDecision::Admit => {
                track.gate.record_admission(pose.translation);
                if let Some(evicted) = track.store.push(BufferedObservation::new(center, pose)) {
                    debug!(
                        "{}: evicted observation from t={:.3}",
                        identity, evicted.pose.timestamp
                    );
                }
                let buffered = track.store.len();
                debug!("{}: admitted observation {} at t={:.3}", identity, buffered, stamp);
                Ok(ObserveOutcome::Admitted {
                    center,
                    radius,
                    buffered,
                })
            }
            GateDecision::RejectedMotion { speed } => {
                warn!(
                    "{}: moving too fast ({:.2} > {:.2}), not observing",
                    identity, speed, self.config.max_speed
                );
                Ok(ObserveOutcome::RejectedMotion { speed })
            }
            GateDecision::RejectedNovelty { distance } => {
                debug!(
                    "{}: viewpoint only {:.3} from last admission",
                    identity, distance
                );
                Ok(ObserveOutcome::RejectedNovelty { distance })
            }
        }
    }

    fn refresh_estimate(&self, identity: TargetIdentity) -> Option<Estimate> {
        match self.estimate(identity) {
            Ok(estimate) => {
                self.sink.publish_estimate(identity, &estimate);
                Some(estimate)
            }
            Err(LocateError::InsufficientSamples { .. }) => None,
            Err(e) => {
                debug!("{}: no estimate this tick ({})", identity, e);
                None
            }
        }
    }

    fn publish_annotated(
        &self,
        image: &Mat,
        found: &[(TargetIdentity, na::Point2<f64>, f64)],
    ) -> Result<()> {
        let mut draw = image.try_clone()?;
        for (identity, center, radius) in found {
            let point = Point::new(center.x.round() as i32, center.y.round() as i32);
            imgproc::circle(
                &mut draw,
                point,
                radius.round() as i32,
                Scalar::new(255.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                0,
            )?;
            imgproc::put_text(
                &mut draw,
                identity.name(),
                point,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.8,
                Scalar::new(20.0, 20.0, 240.0, 0.0),
                1,
                imgproc::LINE_8,
                false,
            )?;
        }
        self.sink.publish_annotated(&draw);
        Ok(())
    }
}
