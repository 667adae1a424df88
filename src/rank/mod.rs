//! Ranking passes over validated works.
//!
//! [`rank_records`] is the full pipeline: validate, dedup, shuffle, then run
//! the [`tournament_rank`] or [`score_rank`] pass selected by [`RankMode`].

pub mod options;
pub mod scoring;
pub mod tournament;
pub mod trace;
pub mod types;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::item::{dedup_by_identity, shuffle_works, validate_preference, validate_works, Work, WorkRecord};
use crate::oracle::Oracle;

pub use options::{RankMode, RankRunOptions, DEFAULT_BATCH_SIZE};
pub use scoring::score_rank;
pub use tournament::tournament_rank;
pub use trace::{
    ComparisonTrace, JsonlTraceSink, ScoreTrace, TraceError, TraceEvent, TraceSink, TraceWorker,
};
pub use types::{expected_comparisons, RankError, RankOutcome, RankStatus, RankingStats};

/// Validate records and apply the receipt steps (dedup, shuffle).
///
/// Fails before any work is done if the preference is blank or a record
/// lacks a required field.
pub fn prepare_works(
    records: Vec<WorkRecord>,
    preference: &str,
    options: &RankRunOptions,
) -> Result<Vec<Work>, RankError> {
    validate_preference(preference)?;
    let mut works = validate_works(records)?;
    if options.dedup {
        let dropped = dedup_by_identity(&mut works);
        if dropped > 0 {
            info!(dropped, "Dropped duplicate works");
        }
    }
    if options.shuffle {
        shuffle_works(&mut works, options.rng_seed);
    }
    Ok(works)
}

pub async fn rank_records<O: Oracle + ?Sized>(
    records: Vec<WorkRecord>,
    preference: &str,
    mode: RankMode,
    oracle: &O,
    options: &RankRunOptions,
    cancel: &CancellationToken,
    trace: Option<&dyn TraceSink>,
) -> Result<RankOutcome, RankError> {
    let works = prepare_works(records, preference, options)?;
    match mode {
        RankMode::Tournament => {
            tournament_rank(works, preference, oracle, options, cancel, trace).await
        }
        RankMode::Scoring => score_rank(works, preference, oracle, options, cancel, trace).await,
    }
}
