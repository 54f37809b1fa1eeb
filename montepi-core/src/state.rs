use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A retained point for rendering previews.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSample {
    pub x: f64,
    pub y: f64,
    pub inside_circle: bool,
}

/// Counts gathered locally during one batch before being flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub processed: u64,
    pub inside: u64,
}

impl BatchTally {
    #[inline]
    pub fn record(&mut self, inside_circle: bool) {
        self.processed += 1;
        if inside_circle {
            self.inside += 1;
        }
    }
}

/// Append-only sample storage that never grows past its limit.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    samples: Vec<VisualizationSample>,
    limit: usize,
}

impl SampleBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            samples: Vec::new(),
            limit,
        }
    }

    /// Appends as many of `incoming` as fit; returns how many were accepted.
    pub fn extend_capped(&mut self, incoming: &[VisualizationSample]) -> usize {
        let room = self.limit.saturating_sub(self.samples.len());
        let accepted = room.min(incoming.len());
        self.samples.extend_from_slice(&incoming[..accepted]);
        accepted
    }

    pub fn as_slice(&self) -> &[VisualizationSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Progress of a single run.
///
/// Counters only move through [`RunState::flush`], which adds a whole batch at
/// once, so `points_inside_circle <= processed_points` holds for every reader.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    processed_points: u64,
    points_inside_circle: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    samples: SampleBuffer,
    running: bool,
}

impl RunState {
    pub fn new(visualization_limit: usize) -> Self {
        Self {
            samples: SampleBuffer::with_limit(visualization_limit),
            ..Self::default()
        }
    }

    /// Marks the run as started now.
    pub fn begin(&mut self) {
        self.started_at = Some(Instant::now());
        self.finished_at = None;
        self.running = true;
    }

    /// Folds one batch into the run. Samples beyond the buffer limit are dropped.
    pub fn flush(&mut self, tally: BatchTally, picked: &[VisualizationSample]) {
        debug_assert!(tally.inside <= tally.processed);
        self.processed_points += tally.processed;
        self.points_inside_circle += tally.inside;
        self.samples.extend_capped(picked);
    }

    /// Stops the clock; later snapshots report a frozen elapsed time.
    pub fn finish(&mut self) {
        if self.running {
            self.finished_at = Some(Instant::now());
            self.running = false;
        }
    }

    pub fn processed_points(&self) -> u64 {
        self.processed_points
    }

    pub fn points_inside_circle(&self) -> u64 {
        self.points_inside_circle
    }

    pub fn samples(&self) -> &[VisualizationSample] {
        self.samples.as_slice()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Wall-clock time since `begin`, frozen at `finish`. Zero before `begin`.
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(start) => self
                .finished_at
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }
}

/// Run state shared between the controller and its run thread.
pub type SharedRunState = Arc<Mutex<RunState>>;

/// Locks shared run state. A poisoned lock still holds consistent counters
/// because every mutation is a single `flush`, so the poison is ignored.
pub fn lock_state(state: &SharedRunState) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(inside_circle: bool) -> VisualizationSample {
        VisualizationSample { x: 0.25, y: 0.5, inside_circle }
    }

    #[test]
    fn tally_counts_inside_and_total() {
        let mut tally = BatchTally::default();
        tally.record(true);
        tally.record(false);
        tally.record(true);
        assert_eq!(tally, BatchTally { processed: 3, inside: 2 });
    }

    #[test]
    fn sample_buffer_never_exceeds_limit() {
        let mut buffer = SampleBuffer::with_limit(5);
        assert!(buffer.is_empty());
        assert_eq!(buffer.extend_capped(&[sample(true); 3]), 3);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.extend_capped(&[sample(false); 4]), 2);
        assert_eq!(buffer.extend_capped(&[sample(false); 1]), 0);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn flush_accumulates_counts() {
        let mut state = RunState::new(10);
        state.begin();
        state.flush(BatchTally { processed: 100, inside: 80 }, &[sample(true)]);
        state.flush(BatchTally { processed: 50, inside: 40 }, &[sample(false); 20]);
        assert_eq!(state.processed_points(), 150);
        assert_eq!(state.points_inside_circle(), 120);
        assert_eq!(state.samples().len(), 10);
        assert!(state.is_running());
    }

    #[test]
    fn elapsed_is_zero_before_begin_and_frozen_after_finish() {
        let mut state = RunState::new(10);
        assert_eq!(state.elapsed(), Duration::ZERO);
        state.begin();
        std::thread::sleep(Duration::from_millis(2));
        state.finish();
        let frozen = state.elapsed();
        assert!(frozen >= Duration::from_millis(2));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(state.elapsed(), frozen);
        assert!(!state.is_running());
    }
}
