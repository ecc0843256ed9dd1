use nalgebra as na;
use serde::Serialize;

use crate::error::FailureReason;
use crate::tracking::Estimate;

/// Size of the frame a 2D answer was computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDims {
    pub width: i32,
    pub height: i32,
}

/// Answer to a 2D query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection2dResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_dims: Option<ImageDims>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Detection2dResponse {
    pub fn found(center: na::Point2<f64>, radius: f64, image_dims: ImageDims, timestamp: f64) -> Self {
        Self {
            found: true,
            center: Some([center.x, center.y]),
            radius: Some(radius),
            image_dims: Some(image_dims),
            timestamp: Some(timestamp),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            center: None,
            radius: None,
            image_dims: None,
            timestamp: None,
        }
    }
}

/// Answer to a 3D query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate3dResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rms_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl Estimate3dResponse {
    pub fn found(estimate: &Estimate, timestamp: Option<f64>) -> Self {
        let p = estimate.position;
        Self {
            found: true,
            point: Some([p.x, p.y, p.z]),
            rms_distance: Some(estimate.rms_distance),
            timestamp,
            reason: None,
        }
    }

    pub fn not_found(reason: FailureReason, timestamp: Option<f64>) -> Self {
        Self {
            found: false,
            point: None,
            rms_distance: None,
            timestamp,
            reason: Some(reason),
        }
    }

    pub fn position(&self) -> Option<na::Point3<f64>> {
        self.point.map(|[x, y, z]| na::Point3::new(x, y, z))
    }
}
