//! Batch schedulers.
//!
//! A scheduler turns a run's point budget into a sequence of batches. Each call
//! to [`Scheduler::next_batch`] samples one batch, flushes it into the shared
//! [`RunState`](crate::state::RunState) and returns; the return is the
//! cooperative yield point where the caller publishes progress and checks for
//! cancellation.
//!
//! Timing is expressed in virtual time: the pauses between batches (and the
//! staggered worker starts) are tracked as offsets from the run start instead
//! of real sleeps. A pacer may later map them onto the wall clock.

mod sequential;
mod simulated;
mod threaded;
mod worker;

pub use self::sequential::SequentialScheduler;
pub use self::simulated::SimulatedParallelScheduler;
pub use self::threaded::ThreadedScheduler;

use crate::config::{Mode, SimulationConfig};
use crate::error::EngineError;
use crate::sampling::PointSource;
use crate::state::SharedRunState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause after every sequential batch.
pub const SEQUENTIAL_YIELD: Duration = Duration::from_millis(5);
/// Pause after every worker batch.
pub const WORKER_YIELD: Duration = Duration::from_millis(2);
/// Start offset between consecutive workers.
pub const WORKER_STAGGER: Duration = Duration::from_millis(10);

/// What one batch contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Worker that ran the batch; `None` for sequential batches and threaded rounds.
    pub worker: Option<usize>,
    pub points: u64,
    pub inside: u64,
    /// Virtual time at which the batch started.
    #[serde(with = "duration_millis")]
    pub virtual_start: Duration,
}

pub trait Scheduler: Send {
    /// Runs the next batch and flushes it into `state`.
    /// Returns `None` once every point has been processed.
    fn next_batch(&mut self, state: &SharedRunState) -> Option<BatchReport>;

    /// Points not yet processed.
    fn remaining(&self) -> u64;

    fn name(&self) -> &'static str;
}

/// Builds the scheduler for `config.mode()`.
pub fn for_config(
    config: &SimulationConfig,
    source: Box<dyn PointSource>,
) -> Result<Box<dyn Scheduler>, EngineError> {
    let scheduler: Box<dyn Scheduler> = match config.mode() {
        Mode::Sequential => Box::new(SequentialScheduler::new(config, source)?),
        Mode::SimulatedParallel => Box::new(SimulatedParallelScheduler::new(config, source)?),
        Mode::Threaded => Box::new(ThreadedScheduler::new(config, source)?),
    };
    Ok(scheduler)
}

/// `clamp(total / 200, 100, 2000)`.
pub fn sequential_batch_size(total_points: u64) -> u64 {
    (total_points / 200).clamp(100, 2_000)
}

/// `min(1000, worker_points / 10)`, at least one point.
pub fn worker_batch_size(worker_points: u64) -> u64 {
    (worker_points / 10).min(1_000).max(1)
}

/// Splits `total` evenly across `workers`; the remainder goes to the last worker.
pub fn partition(total: u64, workers: usize) -> Vec<u64> {
    let workers = workers.max(1);
    let base = total / workers as u64;
    let remainder = total % workers as u64;
    let mut shares = vec![base; workers];
    if let Some(last) = shares.last_mut() {
        *last += remainder;
    }
    shares
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_batch_size_is_clamped() {
        assert_eq!(sequential_batch_size(1_000), 100);
        assert_eq!(sequential_batch_size(100_000), 500);
        assert_eq!(sequential_batch_size(10_000_000), 2_000);
    }

    #[test]
    fn worker_batch_size_is_capped() {
        assert_eq!(worker_batch_size(125), 12);
        assert_eq!(worker_batch_size(1_250_000), 1_000);
        assert_eq!(worker_batch_size(3), 1);
    }

    #[test]
    fn remainder_goes_to_last_worker() {
        assert_eq!(partition(1_003, 4), vec![250, 250, 250, 253]);
        assert_eq!(partition(1_000, 8), vec![125; 8]);
        assert_eq!(partition(1_000, 0), vec![1_000]);
        assert_eq!(partition(9_999_999, 7).iter().sum::<u64>(), 9_999_999);
    }
}
