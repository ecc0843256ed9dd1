use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::detection::{ColorBounds, ColorDetector, TargetIdentity};
use crate::error::{LocateError, Result};
use crate::tracking::GateConfig;

/// Color segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Side of the square morphological kernel (odd)
    pub kernel_size: i32,
    /// Minimum contour area in px²
    pub min_area: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kernel_size: 13,
            min_area: 50.0,
        }
    }
}

impl DetectorConfig {
    pub fn build(&self) -> ColorDetector {
        ColorDetector::new()
            .with_kernel_size(self.kernel_size)
            .with_min_area(self.min_area)
    }
}

/// Ray intersection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Largest accepted eigenvalue ratio of the normal equations
    pub max_condition: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self { max_condition: 1e6 }
    }
}

/// Everything the locator needs besides its collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Buffer capacity per target
    pub max_observations: usize,
    /// Triangulate only with more than this many observations
    pub min_observations: usize,
    /// Minimum camera displacement between admissions
    pub novelty_threshold: f64,
    /// Maximum platform speed for admission
    pub max_speed: f64,
    /// Trailing window for the speed lookup
    pub speed_window_secs: f64,
    /// Upper bound on any single pose or speed lookup
    pub pose_timeout_ms: u64,
    /// Period of the background tick
    pub tick_period_secs: f64,
    pub world_frame: String,
    pub camera_frame: String,
    pub detector: DetectorConfig,
    pub triangulation: TriangulationConfig,
    /// HSV bounds per target; targets without bounds are not searched
    pub targets: BTreeMap<TargetIdentity, ColorBounds>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_observations: 50,
            min_observations: 5,
            novelty_threshold: 0.3,
            max_speed: 1.0,
            speed_window_secs: 0.5,
            pose_timeout_ms: 200,
            tick_period_secs: 1.0,
            world_frame: "/map".to_string(),
            camera_frame: "/stereo_front/right".to_string(),
            detector: DetectorConfig::default(),
            triangulation: TriangulationConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LocatorConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LocateError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON config string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LocateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Add or replace the bounds of one target
    pub fn with_target(mut self, identity: TargetIdentity, bounds: ColorBounds) -> Self {
        self.targets.insert(identity, bounds);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(LocateError::Config(msg));

        if self.max_observations == 0 {
            return fail("max_observations must be positive".into());
        }
        if self.min_observations >= self.max_observations {
            return fail(format!(
                "min_observations ({}) must be below max_observations ({})",
                self.min_observations, self.max_observations
            ));
        }
        if !(self.novelty_threshold >= 0.0) || !(self.max_speed >= 0.0) {
            return fail("thresholds must be non-negative".into());
        }
        for (name, secs) in [
            ("speed_window_secs", self.speed_window_secs),
            ("tick_period_secs", self.tick_period_secs),
        ] {
            if !(secs > 0.0) || Duration::try_from_secs_f64(secs).is_err() {
                return fail(format!("{} must be a positive duration, got {}", name, secs));
            }
        }
        if self.detector.kernel_size <= 0 || self.detector.kernel_size % 2 == 0 {
            return fail(format!(
                "kernel_size must be odd and positive, got {}",
                self.detector.kernel_size
            ));
        }
        if self.triangulation.max_condition <= 1.0 {
            return fail("max_condition must exceed 1".into());
        }
        for (identity, bounds) in &self.targets {
            if !bounds.is_ordered() {
                return fail(format!("{} bounds have low > high", identity));
            }
        }
        Ok(())
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            max_speed: self.max_speed,
            novelty_threshold: self.novelty_threshold,
        }
    }

    pub fn pose_timeout(&self) -> Duration {
        Duration::from_millis(self.pose_timeout_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_secs_f64(self.speed_window_secs)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period_secs)
    }
}
