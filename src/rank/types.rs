//! Outcome types shared by both rankers.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::item::Work;

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// Bad preference or work records. Raised before any oracle call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankStatus {
    Completed,
    /// Interrupted; the result holds only what was judged.
    Cancelled,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RankingStats {
    /// Fresh oracle judgements (cache misses).
    pub comparisons_made: usize,
    /// Progress estimate; never used for control.
    pub comparisons_expected: usize,
    pub cache: CacheStats,
    /// Oracle calls avoided by the cache.
    pub calls_saved: usize,
    pub rounds: usize,
    /// Works carrying a rank or score.
    pub ranked: usize,
    pub total: usize,
}

/// `floor(1.44 * n * log2 n)`, zero for `n <= 1`.
pub fn expected_comparisons(n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let n = n as f64;
    (1.44 * n * n.log2()).floor() as usize
}

#[derive(Debug, Clone, Serialize)]
pub struct RankOutcome {
    pub status: RankStatus,
    pub stats: RankingStats,
    pub works: Vec<Work>,
}

impl RankOutcome {
    pub fn is_partial(&self) -> bool {
        self.status == RankStatus::Cancelled
    }
}
