use nalgebra as na;
use serde::Serialize;

use super::store::BufferedObservation;
use crate::error::{Degeneracy, LocateError};
use crate::geometry::CameraIntrinsics;

/// A world-space half-line from a camera center through a detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: na::Point3<f64>,
    pub direction: na::Unit<na::Vector3<f64>>,
}

impl Ray {
    pub fn new(origin: na::Point3<f64>, direction: na::Vector3<f64>) -> Self {
        Self {
            origin,
            direction: na::Unit::new_normalize(direction),
        }
    }

    /// Perpendicular distance from a point to the ray's line
    pub fn distance_to(&self, point: &na::Point3<f64>) -> f64 {
        let v = point - self.origin;
        let along = self.direction.dot(&v);
        (v - self.direction.into_inner() * along).norm()
    }

    /// True if the point lies on the forward side of the origin
    fn is_in_front(&self, point: &na::Point3<f64>) -> bool {
        self.direction.dot(&(point - self.origin)) > 0.0
    }
}

/// Triangulated target position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// World-frame position
    pub position: na::Point3<f64>,
    /// Root-mean-square perpendicular distance from the rays
    pub rms_distance: f64,
    /// Number of rays used
    pub rays: usize,
}

/// Least-squares intersection of rays.
///
/// Minimizes the summed squared perpendicular distance by solving
/// `Σ(I - d dᵀ) x = Σ(I - d dᵀ) c`. The 3x3 system is symmetric positive
/// semi-definite, so it is solved through its eigen-decomposition; the ratio
/// of extreme eigenvalues is the conditioning test for near-parallel rays.
pub fn intersect_rays(rays: &[Ray], max_condition: f64) -> Result<Estimate, Degeneracy> {
    if rays.len() < 2 {
        return Err(Degeneracy::TooFewRays(rays.len()));
    }

    let mut a = na::Matrix3::<f64>::zeros();
    let mut b = na::Vector3::<f64>::zeros();
    for ray in rays {
        let d = ray.direction.into_inner();
        let projector = na::Matrix3::identity() - d * d.transpose();
        a += projector;
        b += projector * ray.origin.coords;
    }

    let eigen = na::SymmetricEigen::new(a);
    let largest = eigen.eigenvalues.max();
    let smallest = eigen.eigenvalues.min();
    if smallest <= 1e-12 * rays.len() as f64 {
        return Err(Degeneracy::IllConditioned {
            condition: f64::INFINITY,
        });
    }

    let condition = largest / smallest;
    if condition > max_condition {
        return Err(Degeneracy::IllConditioned { condition });
    }

    let inverse_eigenvalues = eigen.eigenvalues.map(|l| 1.0 / l);
    let a_inv = eigen.eigenvectors
        * na::Matrix3::from_diagonal(&inverse_eigenvalues)
        * eigen.eigenvectors.transpose();
    let position = na::Point3::from(a_inv * b);

    if !rays.iter().any(|ray| ray.is_in_front(&position)) {
        return Err(Degeneracy::BehindCameras);
    }

    let sum_sq: f64 = rays
        .iter()
        .map(|ray| ray.distance_to(&position).powi(2))
        .sum();

    Ok(Estimate {
        position,
        rms_distance: (sum_sq / rays.len() as f64).sqrt(),
        rays: rays.len(),
    })
}

/// Turns buffered pixel/pose pairs into a 3D estimate
#[derive(Debug, Clone)]
pub struct Triangulator {
    intrinsics: CameraIntrinsics,
    /// Largest accepted eigenvalue ratio of the normal equations
    max_condition: f64,
}

impl Triangulator {
    /// Create a new triangulator with the given camera intrinsics
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            max_condition: 1e6,
        }
    }

    /// Set the conditioning limit
    pub fn with_max_condition(mut self, condition: f64) -> Self {
        self.max_condition = condition;
        self
    }

    /// World-space ray through an observation
    pub fn ray(&self, observation: &BufferedObservation) -> Ray {
        let camera_ray = self.intrinsics.back_project(&observation.pixel);
        Ray::new(
            na::Point3::from(observation.pose.translation),
            observation.pose.to_world(&camera_ray),
        )
    }

    /// Triangulate one target from a buffer snapshot
    pub fn triangulate(&self, observations: &[BufferedObservation]) -> Result<Estimate, LocateError> {
        let rays: Vec<Ray> = observations.iter().map(|o| self.ray(o)).collect();
        intersect_rays(&rays, self.max_condition).map_err(LocateError::DegenerateGeometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PoseSample;
    use approx::assert_relative_eq;

    fn ray_through(origin: na::Point3<f64>, target: &na::Point3<f64>) -> Ray {
        Ray::new(origin, target - origin)
    }

    #[test]
    fn test_two_ray_intersection() {
        let target = na::Point3::new(1.0, 2.0, 3.0);
        let rays = [
            ray_through(na::Point3::origin(), &target),
            ray_through(na::Point3::new(4.0, 0.0, 0.0), &target),
        ];

        let estimate = intersect_rays(&rays, 1e6).unwrap();
        assert_relative_eq!(estimate.position, target, epsilon = 1e-9);
        assert!(estimate.rms_distance < 1e-9);
        assert_eq!(estimate.rays, 2);
    }

    #[test]
    fn test_many_ray_intersection() {
        let target = na::Point3::new(-0.5, 0.25, 6.0);
        let rays: Vec<Ray> = (0..8)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::FRAC_PI_4;
                ray_through(na::Point3::new(angle.cos(), angle.sin(), 0.0), &target)
            })
            .collect();

        let estimate = intersect_rays(&rays, 1e6).unwrap();
        assert_relative_eq!(estimate.position, target, epsilon = 1e-9);
    }

    #[test]
    fn test_skew_rays_midpoint() {
        // Two perpendicular lines offset in z: closest point is halfway between
        let rays = [
            Ray::new(na::Point3::new(-5.0, 0.0, 0.0), na::Vector3::x()),
            Ray::new(na::Point3::new(0.0, -5.0, 1.0), na::Vector3::y()),
        ];
        let estimate = intersect_rays(&rays, 1e6).unwrap();
        assert_relative_eq!(estimate.position, na::Point3::new(0.0, 0.0, 0.5), epsilon = 1e-9);
        assert_relative_eq!(estimate.rms_distance, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_single_ray_degenerate() {
        let rays = [Ray::new(na::Point3::origin(), na::Vector3::z())];
        assert_eq!(intersect_rays(&rays, 1e6), Err(Degeneracy::TooFewRays(1)));
    }

    #[test]
    fn test_parallel_rays_degenerate() {
        let rays: Vec<Ray> = (0..6)
            .map(|i| Ray::new(na::Point3::new(i as f64, 0.0, 0.0), na::Vector3::z()))
            .collect();
        let result = intersect_rays(&rays, 1e6);
        assert!(matches!(result, Err(Degeneracy::IllConditioned { .. })));
    }

    #[test]
    fn test_near_parallel_rays_degenerate() {
        let target = na::Point3::new(0.0, 0.0, 1e5);
        let rays = [
            ray_through(na::Point3::origin(), &target),
            ray_through(na::Point3::new(0.01, 0.0, 0.0), &target),
        ];
        let result = intersect_rays(&rays, 1e6);
        assert!(matches!(result, Err(Degeneracy::IllConditioned { .. })));
    }

    #[test]
    fn test_behind_cameras_degenerate() {
        let target = na::Point3::new(0.0, 0.0, -5.0);
        let rays = [
            Ray::new(na::Point3::new(-1.0, 0.0, 0.0), -(target - na::Point3::new(-1.0, 0.0, 0.0))),
            Ray::new(na::Point3::new(1.0, 0.0, 0.0), -(target - na::Point3::new(1.0, 0.0, 0.0))),
        ];
        assert_eq!(intersect_rays(&rays, 1e6), Err(Degeneracy::BehindCameras));
    }

    #[test]
    fn test_triangulate_observations() {
        let cam = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let triangulator = Triangulator::new(cam);
        let target = na::Point3::new(0.5, -0.2, 6.0);

        let observations: Vec<BufferedObservation> = (0..6)
            .map(|i| {
                let yaw = (i as f64 - 2.5) * 0.05;
                let rotation = na::UnitQuaternion::from_axis_angle(&na::Vector3::y_axis(), yaw);
                let translation = na::Vector3::new(i as f64 * 0.4 - 1.0, 0.1 * i as f64, 0.0);
                let pose = PoseSample::new(i as f64, translation, rotation);

                // World point into this camera's frame, then onto the image
                let point_cam = rotation.inverse() * (target.coords - translation);
                let pixel = cam.project(&na::Point3::from(point_cam)).unwrap();
                BufferedObservation::new(pixel, pose)
            })
            .collect();

        let estimate = triangulator.triangulate(&observations).unwrap();
        assert_relative_eq!(estimate.position, target, epsilon = 1e-6);
        assert_eq!(estimate.rays, 6);
    }

    #[test]
    fn test_triangulate_same_viewpoint() {
        let cam = CameraIntrinsics::webcam_vga();
        let triangulator = Triangulator::new(cam);
        let pose = PoseSample::at(0.0, na::Vector3::zeros());
        let observations = vec![BufferedObservation::new(na::Point2::new(320.0, 240.0), pose); 6];

        let result = triangulator.triangulate(&observations);
        assert!(matches!(result, Err(LocateError::DegenerateGeometry(_))));
    }
}
