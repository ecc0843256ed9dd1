use nalgebra as na;
use serde::Serialize;
use std::collections::VecDeque;

use crate::geometry::PoseSample;

/// A detected pixel center paired with the camera pose it was seen from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedObservation {
    pub pixel: na::Point2<f64>,
    pub pose: PoseSample,
}

impl BufferedObservation {
    pub fn new(pixel: na::Point2<f64>, pose: PoseSample) -> Self {
        Self { pixel, pose }
    }
}

/// Coarse lifecycle of one target's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Nothing admitted yet
    NoData,
    /// Some observations, not enough to triangulate
    Accumulating,
    /// More than `min_observations`; estimates are computed
    Estimating,
}

/// Bounded FIFO of observations for one target
#[derive(Debug, Clone)]
pub struct ObservationStore {
    observations: VecDeque<BufferedObservation>,
    /// Maximum number of buffered observations
    capacity: usize,
    /// Triangulate only once the buffer holds more than this many
    min_observations: usize,
}

impl ObservationStore {
    /// Create a store holding up to 50 observations, estimating past 5
    pub fn new() -> Self {
        Self::with_limits(50, 5)
    }

    pub fn with_limits(capacity: usize, min_observations: usize) -> Self {
        Self {
            observations: VecDeque::with_capacity(capacity + 1),
            capacity,
            min_observations,
        }
    }

    /// Append an observation, evicting the oldest one on overflow
    pub fn push(&mut self, observation: BufferedObservation) -> Option<BufferedObservation> {
        self.observations.push_back(observation);
        if self.observations.len() > self.capacity {
            self.observations.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// True when the buffer holds enough observations to triangulate
    pub fn is_ready(&self) -> bool {
        self.observations.len() > self.min_observations
    }

    pub fn state(&self) -> TrackState {
        if self.observations.is_empty() {
            TrackState::NoData
        } else if self.is_ready() {
            TrackState::Estimating
        } else {
            TrackState::Accumulating
        }
    }

    /// Oldest-first iterator over buffered observations
    pub fn iter(&self) -> impl Iterator<Item = &BufferedObservation> {
        self.observations.iter()
    }

    /// Owned copy of the buffer, oldest first
    pub fn snapshot(&self) -> Vec<BufferedObservation> {
        self.observations.iter().copied().collect()
    }
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(i: usize) -> BufferedObservation {
        BufferedObservation::new(
            na::Point2::new(i as f64, 0.0),
            PoseSample::at(i as f64, na::Vector3::new(i as f64, 0.0, 0.0)),
        )
    }

    #[test]
    fn test_store_creation() {
        let store = ObservationStore::new();
        assert_eq!(store.capacity(), 50);
        assert_eq!(store.min_observations(), 5);
        assert!(store.is_empty());
        assert_eq!(store.state(), TrackState::NoData);
    }

    #[test]
    fn test_state_transitions() {
        let mut store = ObservationStore::new();
        for i in 0..5 {
            store.push(observation(i));
            assert_eq!(store.state(), TrackState::Accumulating);
            assert!(!store.is_ready());
        }
        store.push(observation(5));
        assert_eq!(store.state(), TrackState::Estimating);
        assert!(store.is_ready());
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut store = ObservationStore::with_limits(7, 2);
        for i in 0..100 {
            store.push(observation(i));
            assert!(store.len() <= 7);
        }
        assert_eq!(store.len(), 7);
    }

    #[test]
    fn test_fifo_eviction_order() {
        let mut store = ObservationStore::with_limits(4, 1);
        let mut evicted = Vec::new();
        for i in 0..10 {
            if let Some(old) = store.push(observation(i)) {
                evicted.push(old.pixel.x as usize);
            }
        }

        assert_eq!(evicted, vec![0, 1, 2, 3, 4, 5]);
        let kept: Vec<usize> = store.iter().map(|o| o.pixel.x as usize).collect();
        assert_eq!(kept, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut store = ObservationStore::with_limits(3, 1);
        store.push(observation(0));
        let snapshot = store.snapshot();
        store.push(observation(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }
}
