//! Periodic background housekeeping.
//!
//! The gate already sweeps probabilistically during evaluation. A long-lived
//! service with bursty traffic can additionally run a [`Sweeper`] so stale
//! state is collected during quiet periods too.

use crate::application::ports::Housekeeping;
use std::fmt;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Error returned when sweeper configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweeperConfigError {
    /// Sweep interval duration must be greater than zero
    ZeroInterval,
}

impl fmt::Display for SweeperConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweeperConfigError::ZeroInterval => write!(f, "sweep interval must be greater than 0"),
        }
    }
}

impl std::error::Error for SweeperConfigError {}

/// Error returned when the background task does not stop cleanly.
#[derive(Debug)]
pub enum ShutdownError {
    /// The sweep task panicked
    TaskPanicked,
    /// The sweep task was cancelled before it could stop
    TaskCancelled,
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "sweeper task panicked"),
            ShutdownError::TaskCancelled => write!(f, "sweeper task was cancelled"),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Configuration for background sweeping.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to sweep
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl SweeperConfig {
    /// Create a new sweeper config with the specified interval.
    ///
    /// # Errors
    /// Returns `SweeperConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, SweeperConfigError> {
        if interval.is_zero() {
            return Err(SweeperConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }
}

/// Runs housekeeping on a fixed interval.
///
/// Holds its target weakly: the loop stops on its own once the target is
/// dropped.
pub struct Sweeper {
    target: Weak<dyn Housekeeping>,
    config: SweeperConfig,
}

impl Sweeper {
    /// Create a sweeper for `target`.
    pub fn new(target: Weak<dyn Housekeeping>, config: SweeperConfig) -> Self {
        Self { target, config }
    }

    /// Get the sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one full interval after start.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(target) = self.target.upgrade() else {
                            tracing::debug!("sweep target dropped, stopping");
                            break;
                        };
                        let stats = target.sweep();
                        tracing::trace!(
                            cache_entries = stats.cache_entries,
                            rate_windows = stats.rate_windows,
                            burst_states = stats.burst_states,
                            durable_documents = stats.durable_documents,
                            "background sweep finished"
                        );
                    }
                }
            }
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running [`Sweeper`].
///
/// Dropping the handle without calling [`SweeperHandle::shutdown`] leaves the
/// task running until its target is dropped or the runtime stops.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep loop and wait for it to exit.
    ///
    /// # Errors
    /// Returns an error if the task panicked or was aborted.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // the task may already be gone; the join below reports why
            let _ = tx.send(());
        }

        self.task.await.map_err(|e| {
            if e.is_panic() {
                ShutdownError::TaskPanicked
            } else {
                ShutdownError::TaskCancelled
            }
        })
    }

    /// Check if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
