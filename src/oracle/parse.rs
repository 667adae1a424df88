//! Parsing model replies into verdicts and scores.

use once_cell::sync::Lazy;
use regex::Regex;

use super::OracleError;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("Invalid think block regex"));

static VERDICT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*fic\s*([12])\s*>").expect("Invalid verdict tag regex"));

static VERDICT_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfic\s*([12])\b").expect("Invalid verdict mention regex"));

static WORD_COUNT_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*word\s*count\s*:\s*(\d+)\s*>").expect("Invalid word count regex")
});

static RELATIONSHIP_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*relationship\s*:\s*(\d+)\s*>").expect("Invalid relationship regex")
});

static RELEVANCE_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*overall\s*relevance\s*:\s*(\d+)\s*>").expect("Invalid relevance regex")
});

/// Drop `<think>` reasoning blocks. An unterminated block swallows the rest.
pub fn strip_reasoning(raw: &str) -> String {
    let stripped = THINK_BLOCK.replace_all(raw, "");
    let lower = stripped.to_ascii_lowercase();
    match lower.find("<think>") {
        Some(idx) => stripped[..idx].to_string(),
        None => stripped.into_owned(),
    }
}

/// Which fics a pattern refers to: (mentions fic 1, mentions fic 2).
fn sides(re: &Regex, text: &str) -> (bool, bool) {
    let mut one = false;
    let mut two = false;
    for cap in re.captures_iter(text) {
        match &cap[1] {
            "1" => one = true,
            _ => two = true,
        }
    }
    (one, two)
}

/// `true` when the reply favours Fic 1.
///
/// An explicit `<Fic N>` tag naming a single side decides first; failing that,
/// a bare mention of exactly one side. Anything else is unparseable.
pub fn parse_comparison(raw: &str) -> Result<bool, OracleError> {
    let text = strip_reasoning(raw);

    match sides(&VERDICT_TAG, &text) {
        (true, false) => return Ok(true),
        (false, true) => return Ok(false),
        _ => {}
    }

    match sides(&VERDICT_MENTION, &text) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        (true, true) => Err(OracleError::Unparseable(
            "reply mentions both fics".into(),
        )),
        (false, false) => Err(OracleError::Unparseable(
            "reply names neither fic".into(),
        )),
    }
}

/// The three sub-scores a scoring reply must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub word_count: u32,
    pub relationship: u32,
    pub overall_relevance: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.word_count
            .saturating_add(self.relationship)
            .saturating_add(self.overall_relevance)
    }
}

fn capture_number(re: &Regex, text: &str, label: &str) -> Result<u32, OracleError> {
    let caps = re
        .captures(text)
        .ok_or_else(|| OracleError::Unparseable(format!("missing <{label}: N> marker")))?;
    caps[1]
        .parse()
        .map_err(|e| OracleError::Unparseable(format!("bad {label} value: {e}")))
}

pub fn parse_scores(raw: &str) -> Result<ScoreBreakdown, OracleError> {
    let text = strip_reasoning(raw);
    Ok(ScoreBreakdown {
        word_count: capture_number(&WORD_COUNT_SCORE, &text, "Word Count")?,
        relationship: capture_number(&RELATIONSHIP_SCORE, &text, "Relationship")?,
        overall_relevance: capture_number(&RELEVANCE_SCORE, &text, "Overall Relevance")?,
    })
}
