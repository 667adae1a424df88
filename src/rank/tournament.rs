//! Merge sort over the oracle.
//!
//! The sort is laid out as a tree of merge nodes in post-order (left subtree,
//! right subtree, parent). A merge becomes active once both children hold a
//! sorted run and then has exactly one pending decision at a time. Decisions
//! of different merges never depend on each other, so each round collects up
//! to `batch_size` of them in post-order, answers what it can from the cache
//! and sends the rest to the oracle as one batch. With a batch size of one the
//! oracle sees the same calls, in the same order, as a plain recursive merge
//! sort.
//!
//! Left runs take `ceil(n/2)` works and right runs `floor(n/2)`, by position.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ComparisonCache, PairKey};
use crate::item::{validate_preference, Work};
use crate::oracle::Oracle;

use super::options::RankRunOptions;
use super::trace::{emit, now_epoch_ms, pair_hash, ComparisonTrace, TraceEvent, TraceSink};
use super::types::{expected_comparisons, RankError, RankOutcome, RankStatus, RankingStats};

// =============================================================================
// Merge tree
// =============================================================================

#[derive(Debug)]
enum NodeKind {
    Leaf,
    Merge { left: usize, right: usize },
}

/// Two-pointer merge of sorted runs of work indices.
#[derive(Debug)]
struct MergeProgress {
    left: Vec<usize>,
    right: Vec<usize>,
    i: usize,
    j: usize,
    out: Vec<usize>,
}

impl MergeProgress {
    fn new(left: Vec<usize>, right: Vec<usize>) -> Self {
        let cap = left.len() + right.len();
        Self {
            left,
            right,
            i: 0,
            j: 0,
            out: Vec::with_capacity(cap),
        }
    }

    /// Heads of both runs while neither is exhausted.
    fn current(&self) -> Option<(usize, usize)> {
        match (self.left.get(self.i), self.right.get(self.j)) {
            (Some(&a), Some(&b)) => Some((a, b)),
            _ => None,
        }
    }

    fn take(&mut self, left_wins: bool) {
        if left_wins {
            self.out.push(self.left[self.i]);
            self.i += 1;
        } else {
            self.out.push(self.right[self.j]);
            self.j += 1;
        }
    }

    fn finish(mut self) -> Vec<usize> {
        self.out.extend_from_slice(&self.left[self.i..]);
        self.out.extend_from_slice(&self.right[self.j..]);
        self.out
    }
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    progress: Option<MergeProgress>,
    /// Completed sorted run.
    output: Option<Vec<usize>>,
}

#[derive(Debug)]
struct MergeTree {
    nodes: Vec<Node>,
}

impl MergeTree {
    fn build(n: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(n.saturating_mul(2)),
        };
        if n > 0 {
            tree.build_range(0, n);
        }
        tree
    }

    fn build_range(&mut self, lo: usize, hi: usize) -> usize {
        if hi - lo == 1 {
            self.nodes.push(Node {
                kind: NodeKind::Leaf,
                progress: None,
                output: Some(vec![lo]),
            });
            return self.nodes.len() - 1;
        }
        let mid = lo + (hi - lo + 1) / 2;
        let left = self.build_range(lo, mid);
        let right = self.build_range(mid, hi);
        self.nodes.push(Node {
            kind: NodeKind::Merge { left, right },
            progress: None,
            output: None,
        });
        self.nodes.len() - 1
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `idx` is a merge in progress, starting it if both children
    /// have finished.
    fn activate(&mut self, idx: usize) -> bool {
        let node = &self.nodes[idx];
        if node.output.is_some() {
            return false;
        }
        if node.progress.is_some() {
            return true;
        }
        let NodeKind::Merge { left, right } = node.kind else {
            return false;
        };
        let (Some(l), Some(r)) = (&self.nodes[left].output, &self.nodes[right].output) else {
            return false;
        };
        let progress = MergeProgress::new(l.clone(), r.clone());
        self.nodes[idx].progress = Some(progress);
        true
    }

    fn decision(&self, idx: usize) -> Option<(usize, usize)> {
        self.nodes[idx].progress.as_ref().and_then(MergeProgress::current)
    }

    fn apply(&mut self, idx: usize, left_wins: bool) {
        let node = &mut self.nodes[idx];
        let Some(progress) = node.progress.as_mut() else {
            return;
        };
        progress.take(left_wins);
        if progress.current().is_none() {
            if let Some(done) = node.progress.take() {
                node.output = Some(done.finish());
            }
        }
    }

    /// Outermost finished runs, left to right. Together they cover every
    /// work exactly once: a finished merge stands in for its whole subtree,
    /// and a work never compared is its own leaf run.
    fn finished_runs(&self) -> Vec<&[usize]> {
        let mut runs = Vec::new();
        if let Some(root) = self.nodes.len().checked_sub(1) {
            self.collect_runs(root, &mut runs);
        }
        runs
    }

    fn collect_runs<'t>(&'t self, idx: usize, runs: &mut Vec<&'t [usize]>) {
        let node = &self.nodes[idx];
        if let Some(run) = node.output.as_deref() {
            runs.push(run);
            return;
        }
        if let NodeKind::Merge { left, right } = node.kind {
            self.collect_runs(left, runs);
            self.collect_runs(right, runs);
        }
    }
}

/// Index into `runs` of the longest merged run; the leftmost on ties.
/// Single works do not count.
fn longest_run(runs: &[&[usize]]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, run) in runs.iter().enumerate() {
        if run.len() < 2 {
            continue;
        }
        if best.map_or(true, |b| run.len() > runs[b].len()) {
            best = Some(i);
        }
    }
    best
}

// =============================================================================
// Ranker
// =============================================================================

/// A decision waiting on the oracle.
#[derive(Debug, Clone, Copy)]
struct Pending {
    node: usize,
    a: usize,
    b: usize,
}

struct RunState<'a> {
    works: &'a [Work],
    cache: ComparisonCache,
    trace: Option<&'a dyn TraceSink>,
    made: usize,
    expected: usize,
    decisions: usize,
    rounds: usize,
}

impl RunState<'_> {
    fn record_trace(&self, node: usize, a: usize, b: usize, a_wins: bool, cached: bool) {
        if self.trace.is_none() {
            return;
        }
        let (wa, wb) = (&self.works[a], &self.works[b]);
        let winner = if a_wins { wa } else { wb };
        let event = ComparisonTrace {
            timestamp_ms: now_epoch_ms(),
            comparison_index: self.decisions,
            round: self.rounds,
            merge_index: node,
            work_a: wa.identity().to_string(),
            work_b: wb.identity().to_string(),
            title_a: wa.title.clone(),
            title_b: wb.title.clone(),
            winner: winner.identity().to_string(),
            cached,
            pair_hash: pair_hash(&PairKey::new(wa.identity(), wb.identity())),
        };
        emit(self.trace, TraceEvent::Comparison(event));
    }

    /// Walk active merges in post-order, settling cache hits, until
    /// `batch_size` decisions need the oracle.
    fn gather(&mut self, tree: &mut MergeTree, batch_size: usize) -> Vec<Pending> {
        let mut pending = Vec::new();
        let mut in_flight: HashSet<PairKey> = HashSet::new();

        'scan: for idx in 0..tree.len() {
            if !tree.activate(idx) {
                continue;
            }
            while let Some((a, b)) = tree.decision(idx) {
                let (wa, wb) = (&self.works[a], &self.works[b]);
                if wa.identity() == wb.identity() {
                    // Same work twice: keep input order.
                    tree.apply(idx, true);
                    continue;
                }
                let key = PairKey::new(wa.identity(), wb.identity());
                if in_flight.contains(&key) {
                    // Answered from the cache next round.
                    break;
                }
                if pending.len() >= batch_size {
                    break 'scan;
                }
                match self.cache.lookup(wa.identity(), wb.identity()) {
                    Some(a_wins) => {
                        self.decisions += 1;
                        debug!(a = %wa.title, b = %wb.title, a_wins, "Cache hit");
                        self.record_trace(idx, a, b, a_wins, true);
                        tree.apply(idx, a_wins);
                    }
                    None => {
                        in_flight.insert(key);
                        pending.push(Pending { node: idx, a, b });
                        break;
                    }
                }
            }
        }
        pending
    }

    fn settle(&mut self, tree: &mut MergeTree, pending: &[Pending], verdicts: Vec<bool>) {
        if verdicts.len() != pending.len() {
            warn!(
                expected = pending.len(),
                got = verdicts.len(),
                "Oracle returned a short batch; missing decisions will be retried"
            );
        }
        for (p, a_wins) in pending.iter().zip(verdicts) {
            self.made += 1;
            self.decisions += 1;
            let (wa, wb) = (&self.works[p.a], &self.works[p.b]);
            if let Err(e) = self.cache.record_verdict(wa.identity(), wb.identity(), a_wins) {
                warn!(error = %e, "Failed to cache comparison");
            }
            let winner = if a_wins { wa } else { wb };
            info!(
                "({}/{}): '{}' vs '{}' -> '{}'",
                self.made, self.expected, wa.title, wb.title, winner.title
            );
            self.record_trace(p.node, p.a, p.b, a_wins, false);
            tree.apply(p.node, a_wins);
        }
    }

    fn stats(&self, ranked: usize) -> RankingStats {
        let cache = self.cache.stats();
        RankingStats {
            comparisons_made: self.made,
            comparisons_expected: self.expected,
            cache,
            calls_saved: cache.hits,
            rounds: self.rounds,
            ranked,
            total: self.works.len(),
        }
    }
}

/// Rank `works` best-first with pairwise oracle judgements.
///
/// On cancellation the longest finished sorted run is ranked `1..k`. Every
/// other finished run follows unranked in its judged order, left to right, so
/// no verdict already paid for is thrown away. Works never compared keep
/// their input positions relative to those runs.
pub async fn tournament_rank<O: Oracle + ?Sized>(
    works: Vec<Work>,
    preference: &str,
    oracle: &O,
    options: &RankRunOptions,
    cancel: &CancellationToken,
    trace: Option<&dyn TraceSink>,
) -> Result<RankOutcome, RankError> {
    validate_preference(preference)?;
    let n = works.len();

    let mut state = RunState {
        works: &works,
        cache: ComparisonCache::new(),
        trace,
        made: 0,
        expected: expected_comparisons(n),
        decisions: 0,
        rounds: 0,
    };

    if n <= 1 {
        let stats = state.stats(n);
        drop(state);
        let runs: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let works = assemble(works, &runs, runs.first().map(|_| 0));
        return Ok(RankOutcome {
            status: RankStatus::Completed,
            stats,
            works,
        });
    }

    info!(works = n, expected = state.expected, "Starting tournament");

    let batch_size = options.effective_batch_size();
    let mut tree = MergeTree::build(n);
    let mut status = RankStatus::Completed;

    loop {
        if cancel.is_cancelled() {
            status = RankStatus::Cancelled;
            break;
        }

        let pending = state.gather(&mut tree, batch_size);
        if pending.is_empty() {
            break;
        }

        state.rounds += 1;
        let pairs: Vec<(&Work, &Work)> = pending
            .iter()
            .map(|p| (&works[p.a], &works[p.b]))
            .collect();

        let verdicts = tokio::select! {
            biased;
            verdicts = oracle.compare_batch(&pairs, preference) => verdicts,
            _ = cancel.cancelled() => {
                status = RankStatus::Cancelled;
                break;
            }
        };
        state.settle(&mut tree, &pending, verdicts);
    }

    let runs: Vec<Vec<usize>> = tree
        .finished_runs()
        .into_iter()
        .map(<[usize]>::to_vec)
        .collect();
    let ranked = match status {
        RankStatus::Completed => (runs.len() == 1).then_some(0),
        RankStatus::Cancelled => {
            let views: Vec<&[usize]> = runs.iter().map(Vec::as_slice).collect();
            longest_run(&views)
        }
    };
    let ranked_len = ranked.map_or(0, |i| runs[i].len());

    let stats = state.stats(ranked_len);
    drop(state);
    let cache = stats.cache;
    match status {
        RankStatus::Completed => info!(
            "Tournament finished: {} unique comparisons, {} cache hits ({:.1}% hit rate), {} calls saved",
            stats.comparisons_made,
            cache.hits,
            cache.hit_rate() * 100.0,
            stats.calls_saved
        ),
        RankStatus::Cancelled => warn!(
            ranked = stats.ranked,
            total = n,
            comparisons = stats.comparisons_made,
            runs = runs.len(),
            "Tournament interrupted; keeping the longest finished run"
        ),
    }

    Ok(RankOutcome {
        status,
        stats,
        works: assemble(works, &runs, ranked),
    })
}

/// The run at `ranked` first, ranked from 1. Every other run follows
/// unranked, left to right, each still in its judged order.
fn assemble(works: Vec<Work>, runs: &[Vec<usize>], ranked: Option<usize>) -> Vec<Work> {
    let mut slots: Vec<Option<Work>> = works.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    if let Some(run) = ranked.and_then(|i| runs.get(i)) {
        for (pos, &idx) in run.iter().enumerate() {
            if let Some(mut work) = slots[idx].take() {
                work.rank = Some(pos + 1);
                out.push(work);
            }
        }
    }
    for (i, run) in runs.iter().enumerate() {
        if Some(i) == ranked {
            continue;
        }
        for &idx in run {
            if let Some(mut work) = slots[idx].take() {
                work.rank = None;
                out.push(work);
            }
        }
    }
    out.extend(slots.into_iter().flatten().map(|mut w| {
        w.rank = None;
        w
    }));
    out
}
