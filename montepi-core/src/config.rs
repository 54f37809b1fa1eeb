use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// Smallest accepted run size; smaller requests are clamped up.
pub const MIN_TOTAL_POINTS: u64 = 1_000;
/// Largest accepted run size; larger requests are clamped down.
pub const MAX_TOTAL_POINTS: u64 = 10_000_000;
/// Upper bound on logical workers in the multi-worker modes.
pub const MAX_WORKERS: usize = 8;
/// Worker count used when the platform cannot report its parallelism.
pub const DEFAULT_WORKERS: usize = 4;
/// Hard cap on retained visualization samples, independent of run size.
pub const VISUALIZATION_LIMIT: usize = 5_000;

// --- Enums for Choices ---

/// How a run schedules its batches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One batch loop over all points.
    #[default]
    Sequential,
    /// Several logical workers interleaved on the run thread.
    #[serde(alias = "parallel")]
    SimulatedParallel,
    /// Several workers whose batches run concurrently on the rayon pool.
    Threaded,
}

impl Mode {
    pub fn is_multi_worker(self) -> bool {
        !matches!(self, Mode::Sequential)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Sequential => "sequential",
            Mode::SimulatedParallel => "parallel",
            Mode::Threaded => "threaded",
        };
        f.write_str(name)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Mode::Sequential),
            "parallel" | "simulated_parallel" | "simulated-parallel" => Ok(Mode::SimulatedParallel),
            "threaded" => Ok(Mode::Threaded),
            other => Err(format!(
                "unknown mode '{}' (expected sequential, parallel or threaded)",
                other
            )),
        }
    }
}

/// Whether batches are released as fast as possible or on the virtual clock.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    #[default]
    Unthrottled,
    /// Sleep until each batch's virtual start time, so workers visibly interleave.
    RealTime,
}

// --- Top-Level Config Struct ---

/// Parameters of a single run. Out-of-range values are clamped on the way in,
/// so every constructed config is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    total_points: u64,
    mode: Mode,
    worker_count: usize,
    seed: Option<u64>,
    pacing: Pacing,
}

impl SimulationConfig {
    pub fn new(total_points: u64, mode: Mode) -> Self {
        Self {
            total_points: clamp_total_points(total_points),
            mode,
            worker_count: detect_worker_count(),
            seed: None,
            pacing: Pacing::default(),
        }
    }

    /// Overrides the detected worker count. Clamped to `1..=MAX_WORKERS`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Logical workers for this run; always 1 in sequential mode.
    pub fn worker_count(&self) -> usize {
        if self.mode.is_multi_worker() {
            self.worker_count
        } else {
            1
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// `min(VISUALIZATION_LIMIT, total_points)`.
    pub fn visualization_limit(&self) -> usize {
        VISUALIZATION_LIMIT.min(self.total_points as usize)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new(1_000_000, Mode::Sequential)
    }
}

pub fn clamp_total_points(requested: u64) -> u64 {
    requested.clamp(MIN_TOTAL_POINTS, MAX_TOTAL_POINTS)
}

/// Available parallelism capped at `MAX_WORKERS`, falling back to `DEFAULT_WORKERS`.
pub fn detect_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(DEFAULT_WORKERS)
        .min(MAX_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_points_are_clamped_not_rejected() {
        assert_eq!(SimulationConfig::new(10, Mode::Sequential).total_points(), 1_000);
        assert_eq!(SimulationConfig::new(0, Mode::Sequential).total_points(), 1_000);
        assert_eq!(
            SimulationConfig::new(50_000_000, Mode::Sequential).total_points(),
            10_000_000
        );
        assert_eq!(SimulationConfig::new(12_345, Mode::Sequential).total_points(), 12_345);
    }

    #[test]
    fn worker_count_is_capped() {
        let config = SimulationConfig::new(1_000, Mode::SimulatedParallel).with_workers(64);
        assert_eq!(config.worker_count(), MAX_WORKERS);
        let config = config.with_workers(0);
        assert_eq!(config.worker_count(), 1);
        assert!(detect_worker_count() >= 1 && detect_worker_count() <= MAX_WORKERS);
    }

    #[test]
    fn sequential_mode_reports_a_single_worker() {
        let config = SimulationConfig::new(1_000, Mode::Sequential).with_workers(6);
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn visualization_limit_follows_small_runs() {
        assert_eq!(SimulationConfig::new(1_000, Mode::Sequential).visualization_limit(), 1_000);
        assert_eq!(
            SimulationConfig::new(2_000_000, Mode::Sequential).visualization_limit(),
            VISUALIZATION_LIMIT
        );
    }

    #[test]
    fn mode_parses_cli_spellings() {
        assert_eq!("Sequential".parse::<Mode>(), Ok(Mode::Sequential));
        assert_eq!("parallel".parse::<Mode>(), Ok(Mode::SimulatedParallel));
        assert_eq!("simulated-parallel".parse::<Mode>(), Ok(Mode::SimulatedParallel));
        assert_eq!("threaded".parse::<Mode>(), Ok(Mode::Threaded));
        assert!("gpu".parse::<Mode>().is_err());
        assert_eq!(Mode::SimulatedParallel.to_string(), "parallel");
    }
}
