use super::{sequential_batch_size, BatchReport, Scheduler, SEQUENTIAL_YIELD};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::sampling::{sample_point, PointSource, Thinning};
use crate::state::{lock_state, BatchTally, SharedRunState};
use log::trace;
use std::time::Duration;

/// Processes every point in one batch loop.
pub struct SequentialScheduler {
    total: u64,
    processed: u64,
    batch_size: u64,
    source: Box<dyn PointSource>,
    thinning: Thinning,
    clock: Duration,
}

impl SequentialScheduler {
    pub fn new(config: &SimulationConfig, source: Box<dyn PointSource>) -> Result<Self, EngineError> {
        let total = config.total_points();
        let limit = config.visualization_limit();
        let rate = limit as f64 / total as f64;

        Ok(Self {
            total,
            processed: 0,
            batch_size: sequential_batch_size(total),
            source,
            thinning: Thinning::new(rate, limit, config.seed())?,
            clock: Duration::ZERO,
        })
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }
}

impl Scheduler for SequentialScheduler {
    fn next_batch(&mut self, state: &SharedRunState) -> Option<BatchReport> {
        let size = self.batch_size.min(self.remaining());
        if size == 0 {
            return None;
        }

        let mut tally = BatchTally::default();
        let mut picked = Vec::new();
        for _ in 0..size {
            let sample = sample_point(self.source.as_mut());
            tally.record(sample.inside_circle);
            self.thinning.offer(sample, &mut picked);
        }

        lock_state(state).flush(tally, &picked);
        self.processed += tally.processed;

        let report = BatchReport {
            worker: None,
            points: tally.processed,
            inside: tally.inside,
            virtual_start: self.clock,
        };
        self.clock += SEQUENTIAL_YIELD;
        trace!("sequential batch of {} ({} remaining)", size, self.remaining());
        Some(report)
    }

    fn remaining(&self) -> u64 {
        self.total - self.processed
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}
