use super::{partition, worker_batch_size, WORKER_STAGGER};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::sampling::{sample_point, PointSource, Thinning};
use crate::state::{BatchTally, VisualizationSample};
use std::time::Duration;

/// Index of the only worker that collects visualization samples.
pub(crate) const VISUALIZING_WORKER: usize = 0;

/// One logical worker's share of a multi-worker run.
pub(crate) struct Worker {
    pub(crate) index: usize,
    quota: u64,
    done: u64,
    batch_size: u64,
    source: Box<dyn PointSource>,
    thinning: Thinning,
    /// Virtual time at which this worker may run its next batch.
    pub(crate) ready_at: Duration,
}

impl Worker {
    pub(crate) fn is_done(&self) -> bool {
        self.done >= self.quota
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.quota - self.done
    }

    /// Samples one batch into local counters.
    pub(crate) fn run_batch(&mut self) -> (BatchTally, Vec<VisualizationSample>) {
        let size = self.batch_size.min(self.remaining());
        let mut tally = BatchTally::default();
        let mut picked = Vec::new();

        for _ in 0..size {
            let sample = sample_point(self.source.as_mut());
            tally.record(sample.inside_circle);
            self.thinning.offer(sample, &mut picked);
        }

        self.done += tally.processed;
        (tally, picked)
    }
}

/// Builds the worker set: quotas from [`partition`], staggered start times,
/// one split point stream each, and thinning only on the visualizing worker at
/// half the run's visualization limit.
pub(crate) fn spawn_workers(
    config: &SimulationConfig,
    source: &mut dyn PointSource,
) -> Result<Vec<Worker>, EngineError> {
    let limit = config.visualization_limit();
    let shares = partition(config.total_points(), config.worker_count());

    let mut workers = Vec::with_capacity(shares.len());
    for (index, quota) in shares.into_iter().enumerate() {
        let thinning = if index == VISUALIZING_WORKER && quota > 0 {
            let rate = limit as f64 / quota as f64;
            Thinning::new(rate, limit / 2, config.seed())?
        } else {
            Thinning::disabled()
        };

        workers.push(Worker {
            index,
            quota,
            done: 0,
            batch_size: worker_batch_size(quota),
            source: source.split(index),
            thinning,
            ready_at: WORKER_STAGGER * index as u32,
        });
    }
    Ok(workers)
}
