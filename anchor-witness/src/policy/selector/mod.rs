//! Witness selection strategies.
//!
//! The policy engine decides *how many* witnesses of each class it needs;
//! the strategy decides *which ones*. Production uses uniform random
//! selection; tests inject deterministic strategies.

pub mod random;

use anchor_core::Witness;
use thiserror::Error;

pub use random::RandomSelector;

/// The candidate pool cannot cover the requested selection size.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot select {requested} witnesses from a pool of {available}")]
pub struct SelectionError {
    pub requested: usize,
    pub available: usize,
}

/// Chooses `n` witnesses out of a candidate pool.
///
/// Implementations must return exactly `n` distinct candidates and error
/// when `n` exceeds the pool size; beyond that, the choice is theirs.
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, candidates: &[Witness], n: usize) -> Result<Vec<Witness>, SelectionError>;
}
