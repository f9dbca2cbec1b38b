//! Uniform random witness selection.

use anchor_core::Witness;
use rand::seq::SliceRandom;

use super::{SelectionError, SelectionStrategy};

/// Selects uniformly at random, without replacement.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for RandomSelector {
    fn select(&self, candidates: &[Witness], n: usize) -> Result<Vec<Witness>, SelectionError> {
        if n > candidates.len() {
            return Err(SelectionError {
                requested: n,
                available: candidates.len(),
            });
        }

        let mut rng = rand::thread_rng();

        Ok(candidates
            .choose_multiple(&mut rng, n)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::WitnessType;
    use std::collections::HashSet;
    use url::Url;

    fn candidates(n: usize) -> Vec<Witness> {
        (0..n)
            .map(|i| {
                Witness::new(
                    WitnessType::Batch,
                    Url::parse(&format!("https://w{i}.example.com/service")).unwrap(),
                    true,
                )
            })
            .collect()
    }

    #[test]
    fn test_selects_requested_count_without_duplicates() {
        let pool = candidates(10);
        let selector = RandomSelector::new();

        for n in 0..=pool.len() {
            let selection = selector.select(&pool, n).unwrap();
            assert_eq!(selection.len(), n);

            let unique: HashSet<&str> = selection.iter().map(|w| w.uri.as_str()).collect();
            assert_eq!(unique.len(), n);
        }
    }

    #[test]
    fn test_oversized_request_is_an_error() {
        let pool = candidates(3);
        let err = RandomSelector::new().select(&pool, 4).unwrap_err();
        assert_eq!(err.requested, 4);
        assert_eq!(err.available, 3);
    }

    #[test]
    fn test_empty_pool_zero_request() {
        let selection = RandomSelector::new().select(&[], 0).unwrap();
        assert!(selection.is_empty());
    }
}
