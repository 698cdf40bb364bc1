//! Application layer - orchestration of domain logic.
//!
//! This layer holds the stateful admission components:
//! - TTL cache of recent outcomes
//! - Hour-bucket rate limiter
//! - Loop guard and sampler
//! - Fail-open durable dedupe store
//! - Background sweeper
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod config;
pub mod dedupe;
pub mod loop_guard;
pub mod metrics;
pub mod ports;
pub mod rate_limiter;
pub mod sampler;
#[cfg(feature = "async")]
pub mod sweeper;
pub mod ttl_cache;
