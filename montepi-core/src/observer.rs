//! Presentation boundary.
//!
//! The controller publishes [`RunEvent`]s on a channel; a presentation layer
//! drains them and hands them to a [`RunObserver`] through an [`EventDispatcher`],
//! which keeps the accumulated visualization samples so observers always see
//! the full preview set.

use crate::metrics::ProgressSnapshot;
use crate::scheduler::BatchReport;
use crate::state::VisualizationSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ControllerState::Idle => "idle",
            ControllerState::Running => "running",
            ControllerState::Completed => "completed",
            ControllerState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Messages from the run thread to the presentation layer.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Published after every batch. `new_samples` holds only the samples
    /// collected since the previous progress event.
    Progress {
        snapshot: ProgressSnapshot,
        batch: BatchReport,
        new_samples: Vec<VisualizationSample>,
    },
    StateChanged(ControllerState),
    /// A fatal failure; the run has been moved to `Cancelled`.
    Diagnostic(String),
}

pub trait RunObserver {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot, batch: &BatchReport);

    /// Every sample collected so far in the current run.
    fn on_visualization_update(&mut self, samples: &[VisualizationSample]);

    fn on_run_state_change(&mut self, state: ControllerState);

    fn on_diagnostic(&mut self, _message: &str) {}
}

/// Routes events to an observer, accumulating samples across progress events.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    samples: Vec<VisualizationSample>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, event: RunEvent, observer: &mut dyn RunObserver) {
        match event {
            RunEvent::Progress { snapshot, batch, new_samples } => {
                observer.on_progress(&snapshot, &batch);
                self.samples.extend(new_samples);
                observer.on_visualization_update(&self.samples);
            }
            RunEvent::StateChanged(state) => {
                if matches!(state, ControllerState::Idle | ControllerState::Running) {
                    self.samples.clear();
                }
                observer.on_run_state_change(state);
            }
            RunEvent::Diagnostic(message) => observer.on_diagnostic(&message),
        }
    }

    pub fn samples(&self) -> &[VisualizationSample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        progress: usize,
        last_samples: usize,
        states: Vec<ControllerState>,
        diagnostics: Vec<String>,
    }

    impl RunObserver for Recorder {
        fn on_progress(&mut self, _snapshot: &ProgressSnapshot, _batch: &BatchReport) {
            self.progress += 1;
        }

        fn on_visualization_update(&mut self, samples: &[VisualizationSample]) {
            self.last_samples = samples.len();
        }

        fn on_run_state_change(&mut self, state: ControllerState) {
            self.states.push(state);
        }

        fn on_diagnostic(&mut self, message: &str) {
            self.diagnostics.push(message.to_string());
        }
    }

    fn progress(new: usize) -> RunEvent {
        RunEvent::Progress {
            snapshot: ProgressSnapshot {
                processed_points: 100,
                points_inside_circle: 78,
                elapsed_millis: 1,
                pi_estimate: 3.12,
                absolute_error: 0.02,
                accuracy_percent: 99.3,
                progress_percent: 10.0,
            },
            batch: BatchReport {
                worker: None,
                points: 100,
                inside: 78,
                virtual_start: Duration::ZERO,
            },
            new_samples: vec![VisualizationSample { x: 0.1, y: 0.1, inside_circle: true }; new],
        }
    }

    #[test]
    fn dispatcher_accumulates_samples_per_run() {
        let mut dispatcher = EventDispatcher::new();
        let mut recorder = Recorder::default();

        dispatcher.dispatch(RunEvent::StateChanged(ControllerState::Running), &mut recorder);
        dispatcher.dispatch(progress(3), &mut recorder);
        dispatcher.dispatch(progress(2), &mut recorder);
        assert_eq!(recorder.progress, 2);
        assert_eq!(recorder.last_samples, 5);

        dispatcher.dispatch(RunEvent::StateChanged(ControllerState::Completed), &mut recorder);
        assert_eq!(dispatcher.samples().len(), 5);

        dispatcher.dispatch(RunEvent::StateChanged(ControllerState::Idle), &mut recorder);
        assert!(dispatcher.samples().is_empty());
        assert_eq!(
            recorder.states,
            vec![ControllerState::Running, ControllerState::Completed, ControllerState::Idle]
        );
    }

    #[test]
    fn diagnostics_reach_the_observer() {
        let mut dispatcher = EventDispatcher::new();
        let mut recorder = Recorder::default();
        dispatcher.dispatch(RunEvent::Diagnostic("boom".into()), &mut recorder);
        assert_eq!(recorder.diagnostics, vec!["boom".to_string()]);
    }
}
