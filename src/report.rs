//! Markdown report for ranked works.

use std::path::Path;

use serde::Serialize;

use crate::item::{Work, MISSING_PLACEHOLDER};
use crate::rank::{RankOutcome, RankStatus, RankingStats};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOptions {
    pub heading: String,
    pub preference: Option<String>,
    pub model: Option<String>,
    pub rng_seed: Option<u64>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            heading: "Filtered AO3 Fics".to_string(),
            preference: None,
            model: None,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankReport {
    /// blake3 over the preference and the ordered identities.
    pub run_hash: String,
    pub status: Option<RankStatus>,
    pub stats: Option<RankingStats>,
    pub options: ReportOptions,
    pub works: Vec<Work>,
}

pub fn build_report(outcome: &RankOutcome, opts: &ReportOptions) -> RankReport {
    RankReport {
        run_hash: hash_run(opts.preference.as_deref(), &outcome.works),
        status: Some(outcome.status),
        stats: Some(outcome.stats),
        options: opts.clone(),
        works: outcome.works.clone(),
    }
}

/// Report over works ranked elsewhere (no run statistics).
pub fn report_from_works(works: Vec<Work>, opts: &ReportOptions) -> RankReport {
    RankReport {
        run_hash: hash_run(opts.preference.as_deref(), &works),
        status: None,
        stats: None,
        options: opts.clone(),
        works,
    }
}

pub fn render_report_markdown(report: &RankReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", report.options.heading));
    out.push_str(&format!("**Total fics:** {}\n\n", report.works.len()));

    if let Some(pref) = &report.options.preference {
        out.push_str(&format!("**Preference:** {}\n\n", pref.trim()));
    }
    if let Some(model) = &report.options.model {
        out.push_str(&format!("**Model:** {model}\n\n"));
    }
    if let Some(seed) = report.options.rng_seed {
        out.push_str(&format!("**Seed:** {seed}\n\n"));
    }
    if let Some(stats) = &report.stats {
        out.push_str(&format!(
            "**Comparisons:** {} unique, {} cached ({:.1}% hit rate)\n\n",
            stats.comparisons_made,
            stats.cache.hits,
            stats.cache.hit_rate() * 100.0
        ));
        if report.status == Some(RankStatus::Cancelled) {
            out.push_str(&format!(
                "**Partial results:** ranking was interrupted; {} of {} works judged.\n\n",
                stats.ranked, stats.total
            ));
        }
    }
    out.push_str(&format!("**Run hash:** `{}`\n\n", report.run_hash));
    out.push_str("---\n\n");

    for (idx, work) in report.works.iter().enumerate() {
        render_work(&mut out, idx + 1, work);
    }
    out
}

pub fn write_report(path: impl AsRef<Path>, markdown: &str) -> Result<(), ReportError> {
    std::fs::write(path, markdown)?;
    Ok(())
}

fn render_work(out: &mut String, position: usize, work: &Work) {
    let meta = &work.metadata;
    match work.url.as_deref() {
        Some(url) if !url.is_empty() && url != MISSING_PLACEHOLDER => {
            out.push_str(&format!("## {position}. [{}]({url})\n\n", work.title));
        }
        _ => out.push_str(&format!("## {position}. {}\n\n", work.title)),
    }

    match (work.rank, work.score) {
        (Some(rank), _) => out.push_str(&format!("**Tournament Rank:** {rank}\n\n")),
        (None, None) => out.push_str("**Tournament Rank:** unranked\n\n"),
        (None, Some(_)) => {}
    }
    if let Some(score) = work.score {
        out.push_str(&format!("**LLM Score:** {score}\n\n"));
    }

    out.push_str(&format!("**Rating:** {}  \n", or_missing(meta.rating.as_deref())));
    out.push_str(&format!("**Category:** {}  \n", or_missing(meta.category.as_deref())));
    out.push_str(&format!(
        "**Status:** {}  \n",
        if meta.is_complete { "Complete" } else { "In Progress" }
    ));
    out.push_str(&format!("**Chapters:** {}  \n", or_missing(meta.chapters.as_deref())));
    out.push_str(&format!(
        "**Word Count:** {}  \n\n",
        group_thousands(work.word_count)
    ));

    push_code_list(out, "Fandoms", &meta.fandoms);
    if let Some(warnings) = meta.warnings.as_deref() {
        if !warnings.is_empty() && warnings != MISSING_PLACEHOLDER {
            out.push_str(&format!("**Warnings:** {warnings}  \n\n"));
        }
    }
    push_code_list(out, "Relationships", &meta.relationships);
    push_code_list(out, "Characters", &meta.characters);
    push_code_list(out, "Tags", &work.tags);

    let summary = work.summary.trim();
    if !summary.is_empty() && summary != MISSING_PLACEHOLDER {
        out.push_str("**Summary:**\n\n");
        for line in summary.lines() {
            out.push_str(&format!("> {line}\n"));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "**Stats:** {} kudos | {} comments  \n\n",
        work.kudos, meta.comments
    ));
    out.push_str("---\n\n");
}

fn or_missing(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => MISSING_PLACEHOLDER,
    }
}

fn push_code_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let joined = items
        .iter()
        .map(|item| format!("`{item}`"))
        .collect::<Vec<_>>()
        .join(" ");
    out.push_str(&format!("**{label}:** {joined}  \n\n"));
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn hash_run(preference: Option<&str>, works: &[Work]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(preference.unwrap_or_default().trim().as_bytes());
    for work in works {
        hasher.update(&[0]);
        hasher.update(work.identity().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
