use nalgebra as na;

/// Admission thresholds
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Maximum platform speed for a usable observation (units/s)
    pub max_speed: f64,
    /// Minimum camera displacement from the last admission (units)
    pub novelty_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_speed: 1.0,
            novelty_threshold: 0.3,
        }
    }
}

/// Outcome of gating a candidate observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Admit,
    /// Platform moved too fast for the pixel/pose pairing to hold
    RejectedMotion { speed: f64 },
    /// Too close to the last admitted viewpoint
    RejectedNovelty { distance: f64 },
}

impl GateDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Motion and viewpoint-novelty gate for one target
#[derive(Debug, Clone)]
pub struct MotionGate {
    config: GateConfig,
    last_admitted: Option<na::Vector3<f64>>,
}

impl MotionGate {
    /// Create new gate with default thresholds
    pub fn new() -> Self {
        Self::with_config(GateConfig::default())
    }

    /// Create new gate with custom thresholds
    pub fn with_config(config: GateConfig) -> Self {
        Self {
            config,
            last_admitted: None,
        }
    }

    /// Speed sanity check. A NaN speed is rejected.
    pub fn check_motion(&self, speed: f64) -> GateDecision {
        if !(speed <= self.config.max_speed) {
            GateDecision::RejectedMotion { speed }
        } else {
            GateDecision::Admit
        }
    }

    /// Baseline check against the last admitted camera translation
    pub fn check_novelty(&self, translation: &na::Vector3<f64>) -> GateDecision {
        match self.last_admitted {
            Some(last) => {
                let distance = (translation - last).norm();
                if distance >= self.config.novelty_threshold {
                    GateDecision::Admit
                } else {
                    GateDecision::RejectedNovelty { distance }
                }
            }
            None => GateDecision::Admit,
        }
    }

    /// Run both checks in order
    pub fn evaluate(&self, speed: f64, translation: &na::Vector3<f64>) -> GateDecision {
        match self.check_motion(speed) {
            GateDecision::Admit => self.check_novelty(translation),
            rejected => rejected,
        }
    }

    /// Remember the translation of an admitted observation
    pub fn record_admission(&mut self, translation: na::Vector3<f64>) {
        self.last_admitted = Some(translation);
    }

    pub fn last_admitted(&self) -> Option<&na::Vector3<f64>> {
        self.last_admitted.as_ref()
    }
}

impl Default for MotionGate {
    fn default() -> Self {
        Self::new()
    }
}
