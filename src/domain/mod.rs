//! Domain layer - pure admission logic with no I/O.
//!
//! This layer contains the core concepts and invariants of the gate:
//! - Call fingerprints and outcomes
//! - Hour-bucket rate windows
//! - Burst tracking for loop detection
//! - Cache entries and admission decisions
//!
//! Every type here takes the current time as an argument, so all of it is
//! deterministic and easily testable.

pub mod burst;
pub mod decision;
pub mod entry;
pub mod fingerprint;
pub mod outcome;
pub mod time;
pub mod window;
