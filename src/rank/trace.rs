//! Decision trace capture for ranking runs.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::PairKey;

/// One tournament decision, answered by the oracle or the cache.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTrace {
    pub timestamp_ms: i64,
    /// Position among all decisions of the run, from 1.
    pub comparison_index: usize,
    pub round: usize,
    /// Post-order index of the merge that asked.
    pub merge_index: usize,
    pub work_a: String,
    pub work_b: String,
    pub title_a: String,
    pub title_b: String,
    pub winner: String,
    pub cached: bool,
    pub pair_hash: String,
}

/// One scoring-mode judgement.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreTrace {
    pub timestamp_ms: i64,
    pub score_index: usize,
    pub work: String,
    pub title: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Comparison(ComparisonTrace),
    Score(ScoreTrace),
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<TraceEvent>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Drop every sink clone first.
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<TraceEvent>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<TraceEvent>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line = serde_json::to_string(&event).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Record an event, logging instead of failing the run.
pub(crate) fn emit(trace: Option<&dyn TraceSink>, event: TraceEvent) {
    if let Some(sink) = trace {
        if let Err(e) = sink.record(event) {
            tracing::warn!(error = %e, "Failed to record trace event");
        }
    }
}

/// Short stable hash of an unordered pair, for joining traces across runs.
pub fn pair_hash(key: &PairKey) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.low().as_bytes());
    hasher.update(&[0]);
    hasher.update(key.high().as_bytes());
    hasher.finalize().to_hex().as_str()[..16].to_string()
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
