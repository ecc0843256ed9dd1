use nalgebra as na;
use opencv::{
    core::{self, Mat, Point, Point2f, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};

use super::target::ColorBounds;

/// Result of segmenting one frame for one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorOutcome {
    /// Sub-pixel center and radius of the minimum enclosing circle
    Found { center: na::Point2<f64>, radius: f64 },
    NotFound,
}

impl DetectorOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// HSV threshold detector for a single colored blob
#[derive(Debug, Clone)]
pub struct ColorDetector {
    /// Side of the square structuring element used for the morphological close
    kernel_size: i32,
    /// Contours must enclose strictly more than this many square pixels
    min_area: f64,
}

impl ColorDetector {
    /// Create a detector with a 13x13 close and a 50 px² area floor
    pub fn new() -> Self {
        Self {
            kernel_size: 13,
            min_area: 50.0,
        }
    }

    /// Set the morphological kernel size (odd, in pixels)
    pub fn with_kernel_size(mut self, size: i32) -> Self {
        self.kernel_size = size;
        self
    }

    /// Set the minimum contour area
    pub fn with_min_area(mut self, area: f64) -> Self {
        self.min_area = area;
        self
    }

    /// Detect the target in a BGR frame
    pub fn detect(&self, image: &Mat, bounds: &ColorBounds) -> opencv::Result<DetectorOutcome> {
        self.detect_with_mask(image, bounds).map(|(outcome, _)| outcome)
    }

    /// Detect the target and also return the cleaned binary mask
    pub fn detect_with_mask(
        &self,
        image: &Mat,
        bounds: &ColorBounds,
    ) -> opencv::Result<(DetectorOutcome, Mat)> {
        if image.empty() {
            return Ok((DetectorOutcome::NotFound, Mat::default()));
        }

        let mask = self.threshold(image, bounds)?;
        let closed = self.close(&mask)?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &closed,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let Some(contour) = self.largest_contour(&contours)? else {
            return Ok((DetectorOutcome::NotFound, closed));
        };

        let mut center = Point2f::default();
        let mut radius = 0.0f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;

        let outcome = DetectorOutcome::Found {
            center: na::Point2::new(center.x as f64, center.y as f64),
            radius: radius as f64,
        };
        Ok((outcome, closed))
    }

    /// Binary mask of pixels inside the HSV bounds
    fn threshold(&self, image: &Mat, bounds: &ColorBounds) -> opencv::Result<Mat> {
        let mut hsv = Mat::default();
        imgproc::cvt_color_def(image, &mut hsv, imgproc::COLOR_BGR2HSV)?;

        let low = Scalar::new(bounds.low[0], bounds.low[1], bounds.low[2], 0.0);
        let high = Scalar::new(bounds.high[0], bounds.high[1], bounds.high[2], 0.0);

        let mut mask = Mat::default();
        core::in_range(&hsv, &low, &high, &mut mask)?;
        Ok(mask)
    }

    /// Dilate then erode to merge fragments and drop speckle
    fn close(&self, mask: &Mat) -> opencv::Result<Mat> {
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(self.kernel_size, self.kernel_size),
            Point::new(-1, -1),
        )?;
        let border = imgproc::morphology_default_border_value()?;

        let mut dilated = Mat::default();
        imgproc::dilate(
            mask,
            &mut dilated,
            &kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            border,
        )?;

        let mut closed = Mat::default();
        imgproc::erode(
            &dilated,
            &mut closed,
            &kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            border,
        )?;
        Ok(closed)
    }

    /// Contour with the largest area, if it beats the area floor
    fn largest_contour(
        &self,
        contours: &Vector<Vector<Point>>,
    ) -> opencv::Result<Option<Vector<Point>>> {
        let mut best: Option<(f64, Vector<Point>)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
                best = Some((area, contour));
            }
        }

        Ok(best
            .filter(|(area, _)| *area > self.min_area)
            .map(|(_, contour)| contour))
    }
}

impl Default for ColorDetector {
    fn default() -> Self {
        Self::new()
    }
}
