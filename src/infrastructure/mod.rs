//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock and randomness (system vs mock)
//! - Storage implementations (sharded maps)
//! - Eviction policy
//! - Durable stores (in-memory, Redis)
//! - The admission gate itself

pub mod clock;
pub mod eviction;
pub mod gate;
pub mod memory_store;
pub mod random;
pub mod storage;

#[cfg(feature = "redis-storage")]
pub mod redis_store;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for clocks,
/// randomness, durable stores, operations and log capture.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// admission-gate = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
