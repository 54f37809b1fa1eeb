//! Monte Carlo π sampling engine.
//!
//! Points are drawn uniformly in the unit square and classified against the
//! quarter circle `x² + y² <= 1`; four times the inside ratio approximates π.
//! Work is split into batches so a presentation layer can receive a
//! [`ProgressSnapshot`] after every one of them.

pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod run;
pub mod sampling;
pub mod scheduler;
pub mod state;

pub use config::{Mode, Pacing, SimulationConfig};
pub use controller::RunController;
pub use error::EngineError;
pub use metrics::ProgressSnapshot;
pub use observer::{ControllerState, EventDispatcher, RunEvent, RunObserver};
pub use run::{CancelToken, Run, RunOutcome};
pub use sampling::{PointSource, RngSource, ScriptedSource};
pub use scheduler::{BatchReport, Scheduler};
pub use state::{RunState, VisualizationSample};

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{Mode, Pacing, SimulationConfig};
    pub use crate::controller::RunController;
    pub use crate::metrics::ProgressSnapshot;
    pub use crate::observer::{ControllerState, EventDispatcher, RunEvent, RunObserver};
    pub use crate::state::VisualizationSample;
}
