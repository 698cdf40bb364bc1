//! Operation double that counts invocations.

use crate::application::ports::Operation;
use crate::domain::outcome::OperationOutcome;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Operation that returns a preset outcome and records how often it ran.
///
/// Clones share the counter and the outcome.
#[derive(Debug, Clone)]
pub struct CountingOperation {
    outcome: Arc<Mutex<OperationOutcome>>,
    calls: Arc<AtomicUsize>,
}

impl CountingOperation {
    /// Always return `outcome`.
    pub fn returning(outcome: OperationOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the outcome returned by later runs.
    pub fn set_outcome(&self, outcome: OperationOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    /// Number of runs so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for CountingOperation {
    async fn run(&self, _identity: &str, _params: &Value) -> OperationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
