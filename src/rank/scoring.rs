//! Absolute scoring: one oracle call per work, then a stable sort.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::CacheStats;
use crate::item::{validate_preference, Work};
use crate::oracle::{Oracle, DEFAULT_SCORE};

use super::options::RankRunOptions;
use super::trace::{emit, now_epoch_ms, ScoreTrace, TraceEvent, TraceSink};
use super::types::{RankError, RankOutcome, RankStatus, RankingStats};

/// Score every work and order them best-first. Equal scores keep input order.
///
/// On cancellation only the works already scored are returned.
pub async fn score_rank<O: Oracle + ?Sized>(
    works: Vec<Work>,
    preference: &str,
    oracle: &O,
    options: &RankRunOptions,
    cancel: &CancellationToken,
    trace: Option<&dyn TraceSink>,
) -> Result<RankOutcome, RankError> {
    validate_preference(preference)?;
    let total = works.len();
    let batch_size = options.effective_batch_size();

    info!(works = total, "Starting scoring pass");

    let mut scores: Vec<Option<u32>> = vec![None; total];
    let mut scored = 0usize;
    let mut rounds = 0usize;
    let mut status = RankStatus::Completed;

    for (chunk_idx, chunk) in works.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            status = RankStatus::Cancelled;
            break;
        }
        rounds += 1;
        let refs: Vec<&Work> = chunk.iter().collect();
        let batch = tokio::select! {
            biased;
            batch = oracle.score_batch(&refs, preference) => batch,
            _ = cancel.cancelled() => {
                status = RankStatus::Cancelled;
                break;
            }
        };

        if batch.len() < chunk.len() {
            warn!(
                expected = chunk.len(),
                got = batch.len(),
                default = DEFAULT_SCORE,
                "Oracle returned a short batch; missing works get the default score"
            );
        }
        let scored_chunk = batch
            .into_iter()
            .chain(std::iter::repeat(DEFAULT_SCORE))
            .take(chunk.len());

        let offset = chunk_idx * batch_size;
        for (i, score) in scored_chunk.enumerate() {
            let work = &chunk[i];
            scored += 1;
            scores[offset + i] = Some(score);
            info!("Fic {scored}: '{}' scored {score}", work.title);
            emit(
                trace,
                TraceEvent::Score(ScoreTrace {
                    timestamp_ms: now_epoch_ms(),
                    score_index: scored,
                    work: work.identity().to_string(),
                    title: work.title.clone(),
                    score,
                }),
            );
        }
    }

    let mut ranked: Vec<Work> = works
        .into_iter()
        .zip(scores)
        .filter_map(|(mut work, score)| {
            work.score = Some(score?);
            Some(work)
        })
        .collect();
    // `sort_by` is stable.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    if status == RankStatus::Cancelled {
        warn!(
            scored = ranked.len(),
            total, "Scoring interrupted; unscored works dropped"
        );
    } else {
        info!(scored = ranked.len(), "Scoring finished");
    }

    Ok(RankOutcome {
        status,
        stats: RankingStats {
            comparisons_made: scored,
            comparisons_expected: total,
            cache: CacheStats::default(),
            calls_saved: 0,
            rounds,
            ranked: ranked.len(),
            total,
        },
        works: ranked,
    })
}
