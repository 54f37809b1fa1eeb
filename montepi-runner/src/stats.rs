use hdrhistogram::{CreationError, Histogram};
use log::info;
use std::time::{Duration, Instant};

/// Wall-clock gaps between consecutive progress events, in microseconds.
pub struct BatchLatency {
    histogram: Histogram<u64>,
    last: Option<Instant>,
}

impl BatchLatency {
    pub fn new() -> Result<Self, CreationError> {
        // 1µs to 60s at three significant figures
        let histogram = Histogram::new_with_bounds(1, 60_000_000, 3)?;
        Ok(Self { histogram, last: None })
    }

    /// Marks the start of a run; the first batch is measured from here.
    pub fn start(&mut self) {
        self.histogram.reset();
        self.last = Some(Instant::now());
    }

    pub fn record_batch(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last.replace(now) {
            self.record(now - last);
        }
    }

    pub fn record(&mut self, gap: Duration) {
        let micros = u64::try_from(gap.as_micros()).unwrap_or(u64::MAX).max(1);
        self.histogram.saturating_record(micros);
    }

    pub fn batches(&self) -> u64 {
        self.histogram.len()
    }

    pub fn quantile(&self, quantile: f64) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(quantile))
    }

    pub fn log_summary(&self) {
        if self.histogram.is_empty() {
            info!("No batches recorded");
            return;
        }
        info!(
            "Batch latency over {} batches: mean {:.0}µs, p50 {}µs, p99 {}µs, max {}µs",
            self.batches(),
            self.histogram.mean(),
            self.histogram.value_at_quantile(0.5),
            self.histogram.value_at_quantile(0.99),
            self.histogram.max()
        );
    }
}
