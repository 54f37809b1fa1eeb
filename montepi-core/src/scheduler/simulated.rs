use super::worker::{spawn_workers, Worker};
use super::{BatchReport, Scheduler, WORKER_YIELD};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::sampling::PointSource;
use crate::state::{lock_state, SharedRunState};
use log::trace;

/// Interleaves logical workers on the calling thread.
///
/// Workers are ordered like tasks on a cooperative event loop: the next batch
/// belongs to the unfinished worker with the earliest virtual ready time, ties
/// broken by worker index. Worker `i` becomes ready at `i * WORKER_STAGGER` and
/// again `WORKER_YIELD` after each of its batches.
pub struct SimulatedParallelScheduler {
    workers: Vec<Worker>,
}

impl SimulatedParallelScheduler {
    pub fn new(config: &SimulationConfig, mut source: Box<dyn PointSource>) -> Result<Self, EngineError> {
        let workers = spawn_workers(config, source.as_mut())?;
        Ok(Self { workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Scheduler for SimulatedParallelScheduler {
    fn next_batch(&mut self, state: &SharedRunState) -> Option<BatchReport> {
        let worker = self
            .workers
            .iter_mut()
            .filter(|w| !w.is_done())
            .min_by_key(|w| (w.ready_at, w.index))?;

        let virtual_start = worker.ready_at;
        let (tally, picked) = worker.run_batch();
        worker.ready_at += WORKER_YIELD;

        lock_state(state).flush(tally, &picked);
        trace!(
            "worker {} flushed {} points at {:?}",
            worker.index,
            tally.processed,
            virtual_start
        );

        Some(BatchReport {
            worker: Some(worker.index),
            points: tally.processed,
            inside: tally.inside,
            virtual_start,
        })
    }

    fn remaining(&self) -> u64 {
        self.workers.iter().map(Worker::remaining).sum()
    }

    fn name(&self) -> &'static str {
        "simulated-parallel"
    }
}
