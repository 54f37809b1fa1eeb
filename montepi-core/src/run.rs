use crate::config::{Pacing, SimulationConfig};
use crate::error::EngineError;
use crate::metrics::ProgressSnapshot;
use crate::sampling::PointSource;
use crate::scheduler::{self, BatchReport, Scheduler};
use crate::state::{lock_state, SharedRunState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation flag, checked at every yield point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// A single run: iterating it executes one batch per step.
///
/// Each `next()` is a yield point. Cancellation is observed before the next
/// batch starts, so an in-flight batch is always flushed completely.
pub struct Run {
    config: SimulationConfig,
    scheduler: Box<dyn Scheduler>,
    state: SharedRunState,
    cancel: CancelToken,
}

impl Run {
    pub fn new(
        config: SimulationConfig,
        source: Box<dyn PointSource>,
        state: SharedRunState,
        cancel: CancelToken,
    ) -> Result<Self, EngineError> {
        let scheduler = scheduler::for_config(&config, source)?;
        Ok(Self {
            config,
            scheduler,
            state,
            cancel,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn scheduler_name(&self) -> &'static str {
        self.scheduler.name()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::project(&lock_state(&self.state), self.config.total_points())
    }

    /// Completed once every point was processed, Cancelled otherwise.
    pub fn outcome(&self) -> RunOutcome {
        if self.scheduler.remaining() == 0 {
            RunOutcome::Completed
        } else {
            RunOutcome::Cancelled
        }
    }

    /// Drains all remaining batches and stops the run clock.
    pub fn run_to_end(mut self) -> RunOutcome {
        for _ in self.by_ref() {}
        self.finish()
    }

    /// Stops the run clock and reports the outcome.
    pub fn finish(&mut self) -> RunOutcome {
        lock_state(&self.state).finish();
        self.outcome()
    }
}

impl Iterator for Run {
    type Item = BatchReport;

    fn next(&mut self) -> Option<BatchReport> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.scheduler.next_batch(&self.state)
    }
}

/// Maps virtual batch times onto the wall clock.
pub struct Pacer {
    pacing: Pacing,
    origin: Instant,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            origin: Instant::now(),
        }
    }

    /// Under real-time pacing, sleeps until `virtual_time` after the origin.
    pub fn wait_until(&self, virtual_time: Duration) {
        if self.pacing != Pacing::RealTime {
            return;
        }
        let target = self.origin + virtual_time;
        let now = Instant::now();
        if target > now {
            spin_sleep::sleep(target - now);
        }
    }
}
