mod common;

use common::{work, WordCountOracle};
use ficrank::rank::trace::{ComparisonTrace, TraceEvent};
use ficrank::rank::{tournament_rank, JsonlTraceSink, RankRunOptions, TraceSink};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, serde::Deserialize)]
struct TraceRow {
    kind: String,
    comparison_index: usize,
    cached: bool,
    winner: String,
}

fn make_trace(comparison_index: usize) -> TraceEvent {
    TraceEvent::Comparison(ComparisonTrace {
        timestamp_ms: 0,
        comparison_index,
        round: 1,
        merge_index: 2,
        work_a: "a".to_string(),
        work_b: "b".to_string(),
        title_a: "A".to_string(),
        title_b: "B".to_string(),
        winner: "a".to_string(),
        cached: false,
        pair_hash: "0123456789abcdef".to_string(),
    })
}

#[test]
fn jsonl_trace_sink_writes_events_and_flushes_on_join() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    sink.record(make_trace(1)).unwrap();
    sink.record(make_trace(2)).unwrap();

    drop(sink);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: TraceRow = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.kind, "comparison");
    assert_eq!(first.comparison_index, 1);
}

#[tokio::test]
async fn tournament_traces_every_decision() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();

    // The second pair repeats the first by identity and is served from cache.
    let a = work("A", 100);
    let b = work("B", 200);
    let works = vec![a.clone(), b.clone(), a, b];
    let oracle = WordCountOracle::new();
    let outcome = tournament_rank(
        works,
        "x",
        &oracle,
        &RankRunOptions::deterministic(),
        &CancellationToken::new(),
        Some(&sink as &dyn TraceSink),
    )
    .await
    .unwrap();

    drop(sink);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<TraceRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let fresh = rows.iter().filter(|r| !r.cached).count();
    let cached = rows.iter().filter(|r| r.cached).count();
    assert_eq!(fresh, outcome.stats.comparisons_made);
    assert_eq!(cached, outcome.stats.cache.hits);
    let indices: Vec<usize> = rows.iter().map(|r| r.comparison_index).collect();
    assert_eq!(indices, (1..=rows.len()).collect::<Vec<_>>());
    assert!(rows.iter().all(|r| r.winner.ends_with("/B")));
}
