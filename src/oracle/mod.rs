//! The judgement oracle: pairwise comparisons and single-work scores.
//!
//! Oracle calls fail open. A reply that cannot be read, a timeout or a
//! transport failure never surfaces to the ranker: comparisons fall back to a
//! fair coin from the [`TieBreaker`], scores to [`DEFAULT_SCORE`].

pub mod conversation;
pub mod llm;
pub mod parse;
pub mod tiebreak;

use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::ProviderError;
use crate::item::Work;

pub use conversation::Conversation;
pub use llm::{LlmOracle, OracleConfig};
pub use parse::{parse_comparison, parse_scores, ScoreBreakdown};
pub use tiebreak::TieBreaker;

/// Total used when a scoring reply cannot be read.
pub const DEFAULT_SCORE: u32 = 15;

/// Why an oracle call fell back. Logged, never returned to rankers.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("unparseable reply: {0}")]
    Unparseable(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] ProviderError),
}

impl OracleError {
    /// The model never answered, as opposed to answering badly.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(e) => e.is_transport(),
            Self::Unparseable(_) => false,
        }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// `true` when `a` matches the preference better than `b`.
    async fn compare(&self, a: &Work, b: &Work, preference: &str) -> bool;

    async fn score(&self, work: &Work, preference: &str) -> u32;

    /// Results come back in input order.
    async fn compare_batch(&self, pairs: &[(&Work, &Work)], preference: &str) -> Vec<bool> {
        let mut out = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            out.push(self.compare(a, b, preference).await);
        }
        out
    }

    /// Results come back in input order.
    async fn score_batch(&self, works: &[&Work], preference: &str) -> Vec<u32> {
        let mut out = Vec::with_capacity(works.len());
        for work in works {
            out.push(self.score(work, preference).await);
        }
        out
    }

    /// Release resources between independent runs.
    async fn teardown(&self) {}
}
