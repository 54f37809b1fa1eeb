use super::worker::{spawn_workers, Worker};
use super::{BatchReport, Scheduler, WORKER_YIELD};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::sampling::PointSource;
use crate::state::{lock_state, SharedRunState};
use log::trace;
use rayon::prelude::*;
use std::time::Duration;

/// Runs one batch of every unfinished worker concurrently per round.
///
/// Partitioning and sampling policy match [`SimulatedParallelScheduler`](super::SimulatedParallelScheduler);
/// only the execution differs. Each worker flushes under the state lock, so
/// the counters and the sample cap hold under concurrent flushes.
pub struct ThreadedScheduler {
    workers: Vec<Worker>,
    round: u32,
}

impl ThreadedScheduler {
    pub fn new(config: &SimulationConfig, mut source: Box<dyn PointSource>) -> Result<Self, EngineError> {
        let workers = spawn_workers(config, source.as_mut())?;
        Ok(Self { workers, round: 0 })
    }

    /// Virtual time the next round would start at.
    pub fn clock(&self) -> Duration {
        WORKER_YIELD * self.round
    }
}

impl Scheduler for ThreadedScheduler {
    fn next_batch(&mut self, state: &SharedRunState) -> Option<BatchReport> {
        let active: Vec<&mut Worker> = self.workers.iter_mut().filter(|w| !w.is_done()).collect();
        if active.is_empty() {
            return None;
        }
        let fan_out = active.len();

        let (points, inside) = active
            .into_par_iter()
            .map(|worker| {
                let (tally, picked) = worker.run_batch();
                lock_state(state).flush(tally, &picked);
                (tally.processed, tally.inside)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        let virtual_start = self.clock();
        self.round += 1;
        trace!("round {} across {} workers: {} points", self.round, fan_out, points);

        Some(BatchReport {
            worker: None,
            points,
            inside,
            virtual_start,
        })
    }

    fn remaining(&self) -> u64 {
        self.workers.iter().map(Worker::remaining).sum()
    }

    fn name(&self) -> &'static str {
        "threaded"
    }
}
