//! Execution settings for a ranking run.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// Merge sort over pairwise judgements.
    Tournament,
    /// One absolute score per work.
    Scoring,
}

#[derive(Debug, Clone)]
pub struct RankRunOptions {
    /// Oracle calls dispatched per round. One reproduces sequential order.
    pub batch_size: usize,
    /// Seed for the input shuffle.
    pub rng_seed: Option<u64>,
    /// Shuffle works on receipt to remove source ordering bias.
    pub shuffle: bool,
    /// Drop works whose identity repeats.
    pub dedup: bool,
}

impl Default for RankRunOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rng_seed: None,
            shuffle: true,
            dedup: true,
        }
    }
}

impl RankRunOptions {
    /// Sequential, no shuffle: the order of oracle calls is fully determined.
    pub fn deterministic() -> Self {
        Self {
            batch_size: 1,
            rng_seed: None,
            shuffle: false,
            dedup: true,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
