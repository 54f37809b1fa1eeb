use crate::state::RunState;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Immutable view of a run's progress, recomputed from [`RunState`] on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed_points: u64,
    pub points_inside_circle: u64,
    pub elapsed_millis: u64,
    pub pi_estimate: f64,
    pub absolute_error: f64,
    pub accuracy_percent: f64,
    pub progress_percent: f64,
}

impl ProgressSnapshot {
    pub fn project(state: &RunState, total_points: u64) -> Self {
        let processed = state.processed_points();
        let inside = state.points_inside_circle();
        let pi_estimate = pi_estimate(processed, inside);

        Self {
            processed_points: processed,
            points_inside_circle: inside,
            elapsed_millis: state.elapsed().as_millis() as u64,
            pi_estimate,
            absolute_error: (pi_estimate - PI).abs(),
            accuracy_percent: if processed > 0 { accuracy_percent(pi_estimate) } else { 0.0 },
            progress_percent: progress_percent(processed, total_points),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress_percent >= 100.0
    }
}

/// `4 * inside / processed`, or 0 before any point was processed.
pub fn pi_estimate(processed: u64, inside: u64) -> f64 {
    if processed == 0 {
        0.0
    } else {
        4.0 * inside as f64 / processed as f64
    }
}

/// `max(0, 100 - 100 * |estimate - π| / π)`.
pub fn accuracy_percent(estimate: f64) -> f64 {
    (100.0 - 100.0 * (estimate - PI).abs() / PI).max(0.0)
}

/// `min(100, 100 * processed / total)`.
pub fn progress_percent(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (100.0 * processed as f64 / total as f64).min(100.0)
}
