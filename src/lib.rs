#![forbid(unsafe_code)]

//! # ficrank
//!
//! Rank fan-fiction works against a reader's preference using a chat model
//! as the only judge of quality.
//!
//! The tournament ranker runs a merge sort whose comparator is the model:
//! "which of these two fics fits the preference better?". Judgements are
//! cached per run, independent decisions are sent to the model in batches,
//! and an interrupted run still yields the longest fully judged prefix. A
//! cheaper scoring ranker asks for one absolute score per work instead.

pub mod cache;
pub mod gateway;
pub mod item;
pub mod oracle;
pub mod prompts;
pub mod rank;
pub mod report;

pub use cache::{CacheStats, ComparisonCache, PairKey};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink, UsageTally, UsageTotals};
pub use item::{Work, WorkMetadata, WorkRecord};
pub use oracle::{LlmOracle, Oracle, OracleConfig, OracleError, TieBreaker, DEFAULT_SCORE};
pub use rank::{
    prepare_works, rank_records, score_rank, tournament_rank, JsonlTraceSink, RankError,
    RankMode, RankOutcome, RankRunOptions, RankStatus, RankingStats, TraceError, TraceSink,
    TraceWorker,
};
pub use report::{build_report, render_report_markdown, ReportError, ReportOptions};
