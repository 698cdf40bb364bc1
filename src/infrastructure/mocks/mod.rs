//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod layer;
pub mod operation;
pub mod random;
pub mod store;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use operation::CountingOperation;
pub use random::SequenceRandom;
pub use store::MockDocumentStore;
