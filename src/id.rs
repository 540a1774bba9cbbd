//! Correlation identifiers
//!
//! Ids only need to differ from whatever stale frame may still be queued on
//! the device; one call is in flight per connection, so a non-cryptographic
//! random source is enough.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Supplies the id for each outgoing request
pub trait IdSource {
    fn next_id(&mut self) -> u64;
}

impl<F: FnMut() -> u64> IdSource for F {
    fn next_id(&mut self) -> u64 {
        self()
    }
}

/// Pseudo-random ids, seeded from the OS by default
#[derive(Debug, Clone)]
pub struct RandomIds(StdRng);

impl RandomIds {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Reproducible sequence
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIds {
    fn next_id(&mut self) -> u64 {
        self.0.next_u64()
    }
}
