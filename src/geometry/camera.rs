use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics (rectified image, no distortion)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64, // focal length x
    pub fy: f64, // focal length y
    pub cx: f64, // principal point x
    pub cy: f64, // principal point y
}

impl CameraIntrinsics {
    /// Create a new camera intrinsics with the given parameters.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Generic webcam preset (640x480)
    pub fn webcam_vga() -> Self {
        Self {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        }
    }

    /// Back-project a pixel to a unit ray direction in the camera frame
    /// (x right, y down, z forward)
    pub fn back_project(&self, pixel: &na::Point2<f64>) -> na::Unit<na::Vector3<f64>> {
        let x = (pixel.x - self.cx) / self.fx;
        let y = (pixel.y - self.cy) / self.fy;
        na::Unit::new_normalize(na::Vector3::new(x, y, 1.0))
    }

    /// Project a camera-frame point to pixel coordinates
    pub fn project(&self, point_cam: &na::Point3<f64>) -> Option<na::Point2<f64>> {
        // Check if point is in front of camera
        if point_cam.z <= 0.0 {
            return None;
        }

        let x = self.fx * (point_cam.x / point_cam.z) + self.cx;
        let y = self.fy * (point_cam.y / point_cam.z) + self.cy;
        Some(na::Point2::new(x, y))
    }
}
