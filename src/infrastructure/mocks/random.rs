//! Scripted random source for testing.

use crate::application::ports::RandomSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Random source that replays a fixed sequence, cycling when it runs out.
///
/// Clones share the sequence position.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Arc<Vec<f64>>,
    next: Arc<AtomicUsize>,
}

impl SequenceRandom {
    /// Replay `values` in order.
    ///
    /// An empty sequence always yields 0.0.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values: Arc::new(values),
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always yield `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// Number of values drawn so far.
    pub fn draws(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&self) -> f64 {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        if self.values.is_empty() {
            0.0
        } else {
            self.values[i % self.values.len()]
        }
    }
}
