//! Randomness adapters.

use crate::application::ports::RandomSource;

/// Uniform draws from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl ThreadRandom {
    /// Create a new thread-local random source.
    pub fn new() -> Self {
        Self
    }
}

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::random::<f64>()
    }
}
