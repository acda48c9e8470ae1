use std::collections::VecDeque;

use crate::types::{FEATURE_LEN, FeatureVector, GripAssessment};

/// Mean squared error between the autoencoder's input and its reconstruction,
/// used as the anomaly score.
pub fn reconstruction_error(input: &FeatureVector, output: &FeatureVector) -> f64 {
    let sum: f64 = input
        .iter()
        .zip(output.iter())
        .map(|(a, b)| {
            let diff = f64::from(a - b);
            diff * diff
        })
        .sum();
    sum / FEATURE_LEN as f64
}

/// Classify a reconstruction error against the active threshold.
///
/// The boundary is inclusive: an error exactly at the threshold counts as a
/// correct grip. Confidence expresses distance from the threshold on either
/// side, clamped to [0, 1].
pub fn classify_grip(error: f64, threshold: f64) -> GripAssessment {
    let is_correct = error <= threshold;
    let confidence = if is_correct {
        (1.0 - error / threshold).clamp(0.0, 1.0)
    } else {
        ((error - threshold) / threshold).clamp(0.0, 1.0)
    };

    GripAssessment {
        is_correct,
        confidence,
    }
}

/// Sliding-window majority vote over per-frame correctness flags.
///
/// Holds the last `capacity` flags; `decide` is true only when correct frames
/// strictly outnumber half the window, so an even-window tie reads as
/// incorrect.
#[derive(Debug)]
pub struct TemporalSmoother {
    window: VecDeque<bool>,
    capacity: usize,
}

impl TemporalSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, is_correct: bool) {
        self.window.push_back(is_correct);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    pub fn decide(&self) -> bool {
        let correct = self.window.iter().filter(|flag| **flag).count();
        correct * 2 > self.capacity
    }

    /// Drop all buffered flags. Called at session start and stop so no state
    /// leaks across sessions.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 0.00729;

    #[test]
    fn test_classify_correct_example() {
        let assessment = classify_grip(0.005, THRESHOLD);
        assert!(assessment.is_correct);
        assert!((assessment.confidence - 0.3141).abs() < 1e-3);
    }

    #[test]
    fn test_classify_incorrect_example() {
        let assessment = classify_grip(0.01, THRESHOLD);
        assert!(!assessment.is_correct);
        assert!((assessment.confidence - 0.3719).abs() < 1e-3);
    }

    #[test]
    fn test_classify_boundary_is_inclusive() {
        let assessment = classify_grip(THRESHOLD, THRESHOLD);
        assert!(assessment.is_correct);
        assert!(assessment.confidence.abs() < 1e-12);
    }

    #[test]
    fn test_classify_confidence_clamped() {
        assert!((classify_grip(0.0, THRESHOLD).confidence - 1.0).abs() < 1e-12);
        assert!((classify_grip(THRESHOLD * 10.0, THRESHOLD).confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_classify_monotonic_in_error() {
        let mut last_correct = f64::INFINITY;
        let mut last_incorrect = f64::NEG_INFINITY;
        for step in 0..100 {
            let error = THRESHOLD * 2.0 * f64::from(step) / 100.0;
            let assessment = classify_grip(error, THRESHOLD);
            if assessment.is_correct {
                assert!(assessment.confidence <= last_correct);
                last_correct = assessment.confidence;
            } else {
                assert!(assessment.confidence >= last_incorrect);
                last_incorrect = assessment.confidence;
            }
        }
    }

    #[test]
    fn test_reconstruction_error_of_identity_is_zero() {
        let input = [0.25f32; 63];
        assert_eq!(reconstruction_error(&input, &input), 0.0);
    }

    #[test]
    fn test_reconstruction_error_uniform_offset() {
        let input = [0.0f32; 63];
        let output = [0.1f32; 63];
        assert!((reconstruction_error(&input, &output) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_majority_vote_three_of_five() {
        let mut smoother = TemporalSmoother::new(5);
        for flag in [true, true, false, true, false] {
            smoother.push(flag);
        }
        assert!(smoother.decide());
    }

    #[test]
    fn test_majority_requires_strict_majority() {
        let mut smoother = TemporalSmoother::new(5);
        for flag in [true, true, false, false, false] {
            smoother.push(flag);
        }
        assert!(!smoother.decide());
    }

    #[test]
    fn test_even_window_tie_is_incorrect() {
        let mut smoother = TemporalSmoother::new(4);
        for flag in [true, true, false, false] {
            smoother.push(flag);
        }
        assert!(!smoother.decide());
    }

    #[test]
    fn test_fifo_eviction_drops_oldest() {
        let mut smoother = TemporalSmoother::new(5);
        for flag in [true, false, false, true, true, true] {
            smoother.push(flag);
        }
        // Window is now [false, false, true, true, true].
        assert_eq!(smoother.len(), 5);
        assert!(smoother.decide());
    }

    #[test]
    fn test_partial_window_votes() {
        let mut smoother = TemporalSmoother::new(5);
        smoother.push(true);
        smoother.push(true);
        // 2 of a 5-wide window is not a strict majority of the capacity.
        assert!(!smoother.decide());
        smoother.push(true);
        assert!(smoother.decide());
    }

    #[test]
    fn test_reset_clears_window() {
        let mut smoother = TemporalSmoother::new(5);
        for _ in 0..5 {
            smoother.push(true);
        }
        smoother.reset();
        assert!(smoother.is_empty());
        assert!(!smoother.decide());
    }
}
