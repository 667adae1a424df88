//! Randomness for unresolvable comparisons.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A fair coin shared by concurrent oracle calls.
#[derive(Debug)]
pub struct TieBreaker {
    rng: Mutex<StdRng>,
}

impl TieBreaker {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// `true` with probability one half.
    pub fn flip(&self) -> bool {
        self.rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_bool(0.5)
    }
}

impl Default for TieBreaker {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let a = TieBreaker::seeded(42);
        let b = TieBreaker::seeded(42);
        let xs: Vec<bool> = (0..64).map(|_| a.flip()).collect();
        let ys: Vec<bool> = (0..64).map(|_| b.flip()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn coin_is_roughly_fair() {
        let coin = TieBreaker::seeded(7);
        let heads = (0..1000).filter(|_| coin.flip()).count();
        assert!((420..=580).contains(&heads), "heads = {heads}");
    }
}
