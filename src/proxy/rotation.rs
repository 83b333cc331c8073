//! Per-request egress rotation
//!
//! Tracks which pool entries a single request has already tried and draws
//! the next candidate at random from the rest. Discarded with the request.

use std::collections::HashSet;

use rand::seq::SliceRandom;

use super::egress::EgressPool;

#[derive(Debug)]
pub struct EgressAttempts {
    candidates: Vec<usize>,
    tried: HashSet<usize>,
}

impl EgressAttempts {
    /// Start a rotation over the entries of `pool` serving `country`
    pub fn new(pool: &EgressPool, country: &str) -> Self {
        Self {
            candidates: pool.candidates_for(country),
            tried: HashSet::new(),
        }
    }

    /// Whether any matching entry is still untried
    pub fn has_untried(&self) -> bool {
        self.candidates.iter().any(|c| !self.tried.contains(c))
    }

    /// Number of entries drawn so far
    pub fn attempts(&self) -> u32 {
        self.tried.len() as u32
    }

    /// Draw a random untried entry and mark it tried
    pub fn draw(&mut self) -> Option<usize> {
        let available: Vec<usize> = self
            .candidates
            .iter()
            .copied()
            .filter(|c| !self.tried.contains(c))
            .collect();

        let mut rng = rand::thread_rng();
        let chosen = available.choose(&mut rng).copied()?;
        self.tried.insert(chosen);
        Some(chosen)
    }
}
