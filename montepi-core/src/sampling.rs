//! Point generation and unit-circle classification.
//!
//! Every mode draws through a [`PointSource`], so the schedulers never touch a
//! concrete RNG. Seeded sources are ChaCha8 streams; worker `i` reads stream
//! `i + 1` of the same key, which keeps runs reproducible regardless of how
//! batches end up interleaved.

use crate::error::EngineError;
use crate::state::VisualizationSample;
use rand::rngs::OsRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stream reserved for the visualization thinning decisions.
const THINNING_STREAM: u64 = u64::MAX;

/// A source of uniform values in `[0, 1)`.
pub trait PointSource: Send {
    fn next_unit(&mut self) -> f64;

    /// An independent source for logical worker `worker`.
    fn split(&mut self, worker: usize) -> Box<dyn PointSource>;
}

/// `x² + y² <= 1`.
#[inline]
pub fn is_inside_circle(x: f64, y: f64) -> bool {
    x * x + y * y <= 1.0
}

/// Draws one point and classifies it.
#[inline]
pub fn sample_point(source: &mut dyn PointSource) -> VisualizationSample {
    let x = source.next_unit();
    let y = source.next_unit();
    VisualizationSample {
        x,
        y,
        inside_circle: is_inside_circle(x, y),
    }
}

// --- RNG-backed source ---

pub struct RngSource {
    rng: ChaCha8Rng,
}

impl RngSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Result<Self, EngineError> {
        let rng = ChaCha8Rng::from_rng(OsRng)?;
        Ok(Self { rng })
    }

    /// Seeded when `seed` is set, otherwise from OS entropy.
    pub fn from_seed_option(seed: Option<u64>) -> Result<Self, EngineError> {
        match seed {
            Some(seed) => Ok(Self::seeded(seed)),
            None => Self::from_entropy(),
        }
    }
}

impl PointSource for RngSource {
    #[inline]
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn split(&mut self, worker: usize) -> Box<dyn PointSource> {
        let mut rng = ChaCha8Rng::from_seed(self.rng.get_seed());
        rng.set_stream(worker as u64 + 1);
        Box::new(RngSource { rng })
    }
}

// --- Scripted source ---

/// Replays a fixed cycle of points. Splitting restarts the script.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new<I>(points: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut values = Vec::new();
        for (x, y) in points {
            for v in [x, y] {
                if !(0.0..1.0).contains(&v) {
                    return Err(EngineError::ScriptOutOfRange(v));
                }
                values.push(v);
            }
        }
        if values.is_empty() {
            return Err(EngineError::EmptyScript);
        }
        Ok(Self { values, cursor: 0 })
    }
}

impl PointSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        let v = self.values[self.cursor];
        self.cursor = (self.cursor + 1) % self.values.len();
        v
    }

    fn split(&mut self, _worker: usize) -> Box<dyn PointSource> {
        Box::new(ScriptedSource {
            values: self.values.clone(),
            cursor: 0,
        })
    }
}

// --- Visualization thinning ---

/// Keeps each offered point with probability `rate` until `cap` points were kept.
///
/// Uses its own RNG so that thinning never perturbs the point stream.
pub struct Thinning {
    rate: f64,
    cap: usize,
    kept: usize,
    rng: ChaCha8Rng,
}

impl Thinning {
    pub fn new(rate: f64, cap: usize, seed: Option<u64>) -> Result<Self, EngineError> {
        let rng = match seed {
            Some(seed) => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(THINNING_STREAM);
                rng
            }
            None => ChaCha8Rng::from_rng(OsRng)?,
        };
        Ok(Self {
            rate,
            cap,
            kept: 0,
            rng,
        })
    }

    /// Never keeps anything.
    pub fn disabled() -> Self {
        Self {
            rate: 0.0,
            cap: 0,
            kept: 0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Offers `sample`; pushes it onto `picked` when kept.
    #[inline]
    pub fn offer(&mut self, sample: VisualizationSample, picked: &mut Vec<VisualizationSample>) {
        if self.kept < self.cap && self.rng.gen::<f64>() < self.rate {
            picked.push(sample);
            self.kept += 1;
        }
    }

    pub fn kept(&self) -> usize {
        self.kept
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
