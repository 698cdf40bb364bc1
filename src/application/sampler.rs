//! Probabilistic admission for best-effort traffic.

use crate::application::ports::RandomSource;
use std::sync::Arc;

/// Admits a configured fraction of calls.
#[derive(Debug, Clone)]
pub struct Sampler {
    source: Arc<dyn RandomSource>,
}

impl Sampler {
    /// Create a sampler drawing from `source`.
    pub fn new(source: Arc<dyn RandomSource>) -> Self {
        Self { source }
    }

    /// Admit with probability `rate`.
    ///
    /// Rates at or above 1.0 always admit and rates at or below 0.0 never
    /// do; neither draws a random number.
    pub fn admit(&self, rate: f64) -> bool {
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 || rate.is_nan() {
            false
        } else {
            self.source.next_f64() < rate
        }
    }
}
