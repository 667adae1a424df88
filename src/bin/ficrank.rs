#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ficrank::gateway::{ProviderGateway, UsageTally, UsageTotals};
use ficrank::item::{Work, WorkRecord};
use ficrank::oracle::{LlmOracle, Oracle, OracleConfig, TieBreaker};
use ficrank::rank::{
    prepare_works, score_rank, tournament_rank, JsonlTraceSink, RankMode, RankOutcome,
    RankRunOptions, TraceSink, DEFAULT_BATCH_SIZE,
};
use ficrank::report::{
    build_report, render_report_markdown, report_from_works, write_report, ReportOptions,
};

/// Conventional status for a process stopped by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "ficrank", version, about = "Rank fan fiction with a local chat model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Tournament,
    Scoring,
}

impl From<ModeArg> for RankMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Tournament => RankMode::Tournament,
            ModeArg::Scoring => RankMode::Scoring,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Rank scraped works against a preference
    Rank {
        /// JSON array of work records
        #[arg(long)]
        works: PathBuf,
        #[arg(long)]
        preference: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Tournament)]
        mode: ModeArg,
        /// Ranked works and run statistics as JSON
        #[arg(long)]
        out: PathBuf,
        /// Markdown report path
        #[arg(long)]
        report: Option<PathBuf>,
        /// JSONL decision trace path
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Oracle calls per round (1 = sequential)
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Seed for shuffling and tie-breaks
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        no_shuffle: bool,
        /// Model tag on the server (default: FICRANK_MODEL or built-in)
        #[arg(long)]
        model: Option<String>,
        /// Per-call timeout (default: OLLAMA_TIMEOUT_SECONDS or 120)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Prior exchanges replayed into sequential model calls
        #[arg(long, default_value_t = 0)]
        history_pairs: usize,
        /// Also print one JSON line per model call to stderr
        #[arg(long)]
        usage_log: bool,
    },
    /// Render a Markdown report from ranked JSON
    Report {
        #[arg(long)]
        ranked: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

struct RankArgs {
    works: PathBuf,
    preference: String,
    mode: RankMode,
    out: PathBuf,
    report: Option<PathBuf>,
    trace: Option<PathBuf>,
    options: RankRunOptions,
    oracle_config: OracleConfig,
}

/// What `rank` writes and `report` reads back.
#[derive(Serialize)]
struct RunOutput<'a> {
    run_id: Uuid,
    mode: RankMode,
    model: &'a str,
    preference: &'a str,
    usage: UsageTotals,
    #[serde(flatten)]
    outcome: &'a RankOutcome,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RankedInput {
    Run {
        works: Vec<Work>,
        #[serde(default)]
        preference: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Works(Vec<Work>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ficrank=info".parse()?))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rank {
            works,
            preference,
            mode,
            out,
            report,
            trace,
            batch_size,
            seed,
            no_shuffle,
            model,
            timeout_secs,
            history_pairs,
            usage_log,
        } => {
            if batch_size == 0 {
                return Err("--batch-size must be >= 1".into());
            }
            let mut oracle_config = OracleConfig::from_env()
                .with_concurrency(batch_size)
                .with_history(history_pairs);
            if let Some(model) = model {
                oracle_config = oracle_config.with_model(model);
            }
            if let Some(secs) = timeout_secs {
                oracle_config = oracle_config.with_timeout(Duration::from_secs(secs));
            }
            let args = RankArgs {
                works,
                preference,
                mode: mode.into(),
                out,
                report,
                trace,
                options: RankRunOptions {
                    batch_size,
                    rng_seed: seed,
                    shuffle: !no_shuffle,
                    dedup: true,
                },
                oracle_config,
            };
            let usage = Arc::new(if usage_log {
                UsageTally::echoing()
            } else {
                UsageTally::new()
            });
            let gateway = ProviderGateway::from_env(Arc::clone(&usage))?;
            run_rank(args, gateway, &usage).await?;
        }
        Commands::Report { ranked, out } => {
            let (works, preference, model) = match read_json::<RankedInput>(&ranked)? {
                RankedInput::Run {
                    works,
                    preference,
                    model,
                } => (works, preference, model),
                RankedInput::Works(works) => (works, None, None),
            };
            let opts = ReportOptions {
                preference,
                model,
                ..ReportOptions::default()
            };
            let report = report_from_works(works, &opts);
            write_report(&out, &render_report_markdown(&report))?;
            eprintln!("Markdown file created: {}", out.display());
        }
    }

    Ok(())
}

async fn run_rank(
    args: RankArgs,
    gateway: ProviderGateway<UsageTally>,
    usage: &UsageTally,
) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<WorkRecord> = read_json(&args.works)?;
    // Validation happens before the model is touched.
    let works = prepare_works(records, &args.preference, &args.options)?;
    let total = works.len();

    let run_id = Uuid::new_v4();
    let model = args.oracle_config.model.clone();
    let mut oracle = LlmOracle::new(
        Arc::new(gateway),
        args.oracle_config,
        TieBreaker::from_seed(args.options.rng_seed),
    )
    .with_run(run_id);

    info!(%run_id, model = %model, works = total, "Loading model");
    oracle.prepare().await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "\nInterrupt received; finishing with the works judged so far \
             (press Ctrl+C again to quit immediately)..."
        );
        ctrl_c.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Second interrupt; exiting without saving results.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
    eprintln!("(Press Ctrl+C to stop ranking and keep the works ranked so far)");

    let (trace_sink, trace_worker) = if let Some(path) = &args.trace {
        let (sink, worker) = JsonlTraceSink::new(path)?;
        (Some(sink), Some(worker))
    } else {
        (None, None)
    };
    let trace_ref = trace_sink.as_ref().map(|sink| sink as &dyn TraceSink);

    let result = match args.mode {
        RankMode::Tournament => {
            tournament_rank(works, &args.preference, &oracle, &args.options, &cancel, trace_ref)
                .await
        }
        RankMode::Scoring => {
            score_rank(works, &args.preference, &oracle, &args.options, &cancel, trace_ref).await
        }
    };
    oracle.teardown().await;

    drop(trace_sink);
    if let Some(worker) = trace_worker {
        worker.join()?;
    }
    let outcome = result?;
    let usage = usage.totals();
    info!(
        calls = usage.calls,
        failed = usage.failed_calls,
        tokens = usage.tokens(),
        "Model usage"
    );

    if outcome.is_partial() {
        eprintln!("\n{}", "=".repeat(80));
        eprintln!(
            "PARTIAL RESULTS: ranking interrupted. {} of {} works ranked; {} comparisons made.",
            outcome.stats.ranked, outcome.stats.total, outcome.stats.comparisons_made
        );
        eprintln!("{}\n", "=".repeat(80));
    }

    write_json(
        &args.out,
        &RunOutput {
            run_id,
            mode: args.mode,
            model: &model,
            preference: &args.preference,
            usage,
            outcome: &outcome,
        },
    )?;

    if let Some(report_path) = args.report {
        let opts = ReportOptions {
            preference: Some(args.preference.clone()),
            model: Some(model.clone()),
            rng_seed: args.options.rng_seed,
            ..ReportOptions::default()
        };
        let report = build_report(&outcome, &opts);
        write_report(&report_path, &render_report_markdown(&report))?;
        eprintln!("Markdown file created: {}", report_path.display());
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
