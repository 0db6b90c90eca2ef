//! Utility module
//!
//! Helpers used alongside the clock that do not touch its state.

pub mod random;

pub use self::random::{EntropySource, SeedGenerator, ThreadRngEntropy};
