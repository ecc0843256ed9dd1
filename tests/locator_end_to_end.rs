use buoykit_rs::{
    CameraIntrinsics, ColorBounds, FailureReason, LocatorConfig, ObserveOutcome, PoseError,
    PoseHistory, PoseProvider, PoseSample, TargetIdentity, TargetLocator, TrackState,
};
use nalgebra as na;
use opencv::{
    core::{self, Mat, Point, Scalar},
    imgproc,
    prelude::*,
};
use std::sync::Arc;
use std::time::Duration;

const TARGET: [f64; 3] = [0.0, 0.0, 5.0];

/// Replays a fixed list of poses, each matched by exact timestamp
struct ScriptedRig {
    poses: Vec<PoseSample>,
    speed: f64,
}

impl PoseProvider for ScriptedRig {
    fn lookup_pose(
        &self,
        _world: &str,
        _camera: &str,
        stamp: f64,
        _timeout: Duration,
    ) -> Result<PoseSample, PoseError> {
        self.poses
            .iter()
            .find(|p| (p.timestamp - stamp).abs() < 1e-6)
            .copied()
            .ok_or(PoseError::Empty)
    }

    fn lookup_speed(
        &self,
        _world: &str,
        _camera: &str,
        _stamp: f64,
        _window: Duration,
        _timeout: Duration,
    ) -> Result<f64, PoseError> {
        Ok(self.speed)
    }
}

fn red_config() -> LocatorConfig {
    LocatorConfig::default().with_target(
        TargetIdentity::Red,
        ColorBounds::new([0.0, 100.0, 100.0], [10.0, 255.0, 255.0]),
    )
}

/// Render the red target as seen from a camera at `camera_x` on the x axis
fn render(cam: &CameraIntrinsics, camera_x: f64) -> Mat {
    let target = na::Point3::new(TARGET[0] - camera_x, TARGET[1], TARGET[2]);
    let pixel = cam.project(&target).unwrap();

    let mut frame =
        Mat::new_rows_cols_with_default(480, 640, core::CV_8UC3, Scalar::all(0.0)).unwrap();
    imgproc::circle(
        &mut frame,
        Point::new(pixel.x.round() as i32, pixel.y.round() as i32),
        20,
        Scalar::new(0.0, 0.0, 255.0, 0.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        0,
    )
    .unwrap();
    frame
}

fn camera_x(k: usize) -> f64 {
    -1.8 + 0.4 * k as f64
}

fn line_rig(count: usize, speed: f64) -> ScriptedRig {
    let poses = (0..count)
        .map(|k| PoseSample::at(k as f64, na::Vector3::new(camera_x(k), 0.0, 0.0)))
        .collect();
    ScriptedRig { poses, speed }
}

#[test]
fn ten_views_along_a_line_recover_target() {
    let cam = CameraIntrinsics::webcam_vga();
    let locator = TargetLocator::new(red_config(), Arc::new(line_rig(10, 0.0))).unwrap();
    locator.set_camera_model(cam);
    locator.set_search_active(true);

    for k in 0..10 {
        locator.on_frame(render(&cam, camera_x(k)), k as f64);
        let report = locator.tick().unwrap();
        assert!(
            matches!(
                report.outcomes[&TargetIdentity::Red],
                Ok(ObserveOutcome::Admitted { .. })
            ),
            "view {} not admitted: {:?}",
            k,
            report.outcomes[&TargetIdentity::Red]
        );
        assert_eq!(report.estimates.contains_key(&TargetIdentity::Red), k >= 5);
    }

    assert_eq!(locator.observation_count(TargetIdentity::Red), 10);
    assert_eq!(
        locator.track_state(TargetIdentity::Red),
        TrackState::Estimating
    );

    let response = locator.get_3d(TargetIdentity::Red).unwrap();
    assert!(response.found);
    assert_eq!(response.timestamp, Some(9.0));
    let point = response.position().unwrap();
    let truth = na::Point3::new(TARGET[0], TARGET[1], TARGET[2]);
    assert!(
        (point - truth).norm() < 0.05,
        "estimate {:?} too far from {:?}",
        point,
        truth
    );
}

#[test]
fn two_d_query_reports_latest_frame_only() {
    let cam = CameraIntrinsics::webcam_vga();
    let locator = TargetLocator::new(red_config(), Arc::new(line_rig(10, 0.0))).unwrap();
    locator.set_camera_model(cam);

    locator.on_frame(render(&cam, camera_x(3)), 3.0);
    let response = locator.get_2d(TargetIdentity::Red).unwrap();
    assert!(response.found);
    let [x, y] = response.center.unwrap();
    // u = 320 - 100 * camera_x
    assert!((x - (320.0 - 100.0 * camera_x(3))).abs() <= 1.0);
    assert!((y - 240.0).abs() <= 1.0);
    let radius = response.radius.unwrap();
    assert!((radius - 20.0).abs() <= 1.0);

    assert_eq!(locator.observation_count(TargetIdentity::Red), 0);
    let response = locator.get_3d(TargetIdentity::Red).unwrap();
    assert!(!response.found);
    assert_eq!(response.reason, Some(FailureReason::InsufficientSamples));
}

#[test]
fn fast_platform_never_admits() {
    let cam = CameraIntrinsics::webcam_vga();
    let locator = TargetLocator::new(red_config(), Arc::new(line_rig(10, 2.0))).unwrap();
    locator.set_camera_model(cam);
    locator.set_search_active(true);

    for k in 0..10 {
        locator.on_frame(render(&cam, camera_x(k)), k as f64);
        let report = locator.tick().unwrap();
        assert_eq!(
            report.outcomes[&TargetIdentity::Red],
            Ok(ObserveOutcome::RejectedMotion { speed: 2.0 })
        );
    }
    assert_eq!(locator.track_state(TargetIdentity::Red), TrackState::NoData);
}

#[test]
fn buffer_keeps_most_recent_views() {
    let cam = CameraIntrinsics::webcam_vga();
    let config = LocatorConfig {
        max_observations: 6,
        min_observations: 3,
        ..red_config()
    };
    let locator = TargetLocator::new(config, Arc::new(line_rig(10, 0.0))).unwrap();
    locator.set_camera_model(cam);

    for k in 0..10 {
        locator.on_frame(render(&cam, camera_x(k)), k as f64);
        locator.observe(TargetIdentity::Red).unwrap();
        assert!(locator.observation_count(TargetIdentity::Red) <= 6);
    }

    let stamps: Vec<f64> = locator
        .observations(TargetIdentity::Red)
        .iter()
        .map(|o| o.pose.timestamp)
        .collect();
    assert_eq!(stamps, vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    assert!(locator.get_3d(TargetIdentity::Red).unwrap().found);
}

#[test]
fn pose_history_drives_motion_gate() {
    let cam = CameraIntrinsics::webcam_vga();
    let config = red_config();
    let history = Arc::new(
        PoseHistory::new(&config.world_frame, &config.camera_frame).with_cache_secs(60.0),
    );

    // 0.4 units every 2 seconds: 0.2 units/s
    for k in 0..10 {
        history.insert(PoseSample::at(
            2.0 * k as f64,
            na::Vector3::new(camera_x(k), 0.0, 0.0),
        ));
    }
    // Sprint after the last slow sample: 3 units in one second
    history.insert(PoseSample::at(19.0, na::Vector3::new(4.8, 0.0, 0.0)));

    let locator = TargetLocator::new(config, history.clone()).unwrap();
    assert_eq!(history.len(), 11);
    locator.set_camera_model(cam);

    for k in 1..10 {
        locator.on_frame(render(&cam, camera_x(k)), 2.0 * k as f64);
        let outcome = locator.observe(TargetIdentity::Red).unwrap();
        assert!(matches!(outcome, ObserveOutcome::Admitted { .. }), "{:?}", outcome);
    }

    locator.on_frame(render(&cam, 0.0), 19.0);
    let outcome = locator.observe(TargetIdentity::Red).unwrap();
    assert!(matches!(outcome, ObserveOutcome::RejectedMotion { .. }));

    // Stamps past the history fail cleanly
    locator.on_frame(render(&cam, 0.0), 50.0);
    let result = locator.observe(TargetIdentity::Red);
    assert_eq!(result.unwrap_err().reason(), FailureReason::PoseUnavailable);

    assert_eq!(locator.observation_count(TargetIdentity::Red), 9);
    let point = locator.get_3d(TargetIdentity::Red).unwrap().position().unwrap();
    assert!((point - na::Point3::new(0.0, 0.0, 5.0)).norm() < 0.05);
}

#[test]
fn concurrent_queries_see_consistent_buffers() {
    let cam = CameraIntrinsics::webcam_vga();
    let config = LocatorConfig {
        max_observations: 7,
        ..red_config()
    };
    let locator = Arc::new(TargetLocator::new(config, Arc::new(line_rig(10, 0.0))).unwrap());
    locator.set_camera_model(cam);
    locator.set_search_active(true);

    let reader = {
        let locator = Arc::clone(&locator);
        std::thread::spawn(move || {
            for _ in 0..200 {
                let count = locator.observation_count(TargetIdentity::Red);
                assert!(count <= 7);
                let response = locator.get_3d(TargetIdentity::Red).unwrap();
                if !response.found {
                    assert_eq!(response.reason, Some(FailureReason::InsufficientSamples));
                }
            }
        })
    };

    for k in 0..10 {
        locator.on_frame(render(&cam, camera_x(k)), k as f64);
        locator.tick();
    }
    reader.join().unwrap();

    assert_eq!(locator.observation_count(TargetIdentity::Red), 7);
}
