use opencv::core::Mat;

use crate::detection::TargetIdentity;
use crate::tracking::Estimate;

/// Fire-and-forget debug outputs. Implementations swallow their own failures.
pub trait DebugSink: Send + Sync {
    /// Cleaned segmentation mask for one target
    fn publish_mask(&self, _identity: TargetIdentity, _mask: &Mat) {}

    /// Frame annotated with every detection of a tick
    fn publish_annotated(&self, _frame: &Mat) {}

    /// Latest 3D estimate of one target
    fn publish_estimate(&self, _identity: TargetIdentity, _estimate: &Estimate) {}
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DebugSink for NullSink {}

#[cfg(feature = "rerun")]
pub use rerun_sink::RerunSink;

#[cfg(feature = "rerun")]
mod rerun_sink {
    use opencv::{core::Mat, imgproc, prelude::*};
    use tracing::warn;

    use super::DebugSink;
    use crate::detection::TargetIdentity;
    use crate::tracking::Estimate;

    /// Streams masks, annotated frames and estimate spheres to a Rerun viewer
    pub struct RerunSink {
        rec: rerun::RecordingStream,
    }

    impl RerunSink {
        pub fn new(rec: rerun::RecordingStream) -> Self {
            Self { rec }
        }

        /// Spawn a viewer and stream into it
        pub fn spawn(app_id: &str) -> Result<Self, Box<dyn std::error::Error>> {
            let rec = rerun::RecordingStreamBuilder::new(app_id).spawn()?;
            rec.log_static("world", &rerun::ViewCoordinates::RUB())?;
            Ok(Self { rec })
        }

        fn log_image(
            &self,
            path: &str,
            image: &Mat,
            code: i32,
        ) -> Result<(), Box<dyn std::error::Error>> {
            let mut rgb = Mat::default();
            imgproc::cvt_color_def(image, &mut rgb, code)?;

            let width = rgb.cols() as u32;
            let height = rgb.rows() as u32;
            let data = rgb.data_bytes()?.to_vec();
            self.rec
                .log(path, &rerun::Image::from_rgb24(data, [width, height]))?;
            Ok(())
        }
    }

    impl DebugSink for RerunSink {
        fn publish_mask(&self, identity: TargetIdentity, mask: &Mat) {
            let path = format!("camera/mask/{}", identity);
            if let Err(e) = self.log_image(&path, mask, imgproc::COLOR_GRAY2RGB) {
                warn!("Failed to log {} mask: {}", identity, e);
            }
        }

        fn publish_annotated(&self, frame: &Mat) {
            if let Err(e) = self.log_image("camera/annotated", frame, imgproc::COLOR_BGR2RGB) {
                warn!("Failed to log annotated frame: {}", e);
            }
        }

        fn publish_estimate(&self, identity: TargetIdentity, estimate: &Estimate) {
            let p = estimate.position;
            let [r, g, b] = identity.draw_color();
            let points = rerun::Points3D::new([[p.x as f32, p.y as f32, p.z as f32]])
                .with_colors([rerun::Color::from_rgb(r, g, b)])
                .with_radii([0.25]);
            if let Err(e) = self.rec.log(format!("world/targets/{}", identity), &points) {
                warn!("Failed to log {} estimate: {}", identity, e);
            }
        }
    }
}
