//! Work records: the items being ranked.
//!
//! The scraper hands over [`WorkRecord`]s, a loose wire shape in which every
//! field the rankers depend on may be missing. [`validate_works`] turns them
//! into strict [`Work`]s, reporting every offending record up front so that no
//! model call is made for a malformed batch.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::rank::RankError;

/// Placeholder the scraper writes for fields it could not find.
pub const MISSING_PLACEHOLDER: &str = "N/A";

/// Descriptive metadata carried through ranking untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkMetadata {
    pub fandoms: Vec<String>,
    pub rating: Option<String>,
    pub warnings: Option<String>,
    pub category: Option<String>,
    pub is_complete: bool,
    pub warnings_tags: Vec<String>,
    pub relationships: Vec<String>,
    pub characters: Vec<String>,
    pub chapters: Option<String>,
    pub chapters_complete: bool,
    pub comments: u64,
}

/// A work as delivered by the item source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkRecord {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub freeform_tags: Option<Vec<String>>,
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub kudos: Option<u64>,
    #[serde(flatten)]
    pub metadata: WorkMetadata,
}

impl WorkRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.summary.is_none() {
            missing.push("summary");
        }
        if self.freeform_tags.is_none() {
            missing.push("freeform_tags");
        }
        if self.word_count.is_none() {
            missing.push("word_count");
        }
        if self.kudos.is_none() {
            missing.push("kudos");
        }
        missing
    }
}

/// A validated work, optionally annotated by a ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub url: Option<String>,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub word_count: u64,
    /// Popularity signal (kudos on the source site).
    pub kudos: u64,
    #[serde(flatten)]
    pub metadata: WorkMetadata,
    /// 1-based position after a tournament pass; `None` if unranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    /// Sum of sub-scores from a scoring pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl Work {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            url: None,
            title: title.into(),
            summary: String::new(),
            tags: Vec::new(),
            word_count: 0,
            kudos: 0,
            metadata: WorkMetadata::default(),
            rank: None,
            score: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_word_count(mut self, word_count: u64) -> Self {
        self.word_count = word_count;
        self
    }

    pub fn with_kudos(mut self, kudos: u64) -> Self {
        self.kudos = kudos;
        self
    }

    /// Stable key for caching and dedup: canonical URL, else title.
    pub fn identity(&self) -> &str {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() && url != MISSING_PLACEHOLDER => url,
            _ => &self.title,
        }
    }
}

impl From<Work> for WorkRecord {
    fn from(work: Work) -> Self {
        Self {
            url: work.url,
            title: Some(work.title),
            summary: Some(work.summary),
            freeform_tags: Some(work.tags),
            word_count: Some(work.word_count),
            kudos: Some(work.kudos),
            metadata: work.metadata,
        }
    }
}

/// Reject a blank preference before any work is done.
pub fn validate_preference(preference: &str) -> Result<(), RankError> {
    if preference.trim().is_empty() {
        return Err(RankError::InvalidInput(
            "preference must be a non-empty string".into(),
        ));
    }
    Ok(())
}

/// Convert wire records into works, failing on the first record that lacks
/// a required field.
pub fn validate_works(records: Vec<WorkRecord>) -> Result<Vec<Work>, RankError> {
    let mut works = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let missing = record.missing_fields();
        if !missing.is_empty() {
            let label = record
                .title
                .clone()
                .unwrap_or_else(|| format!("#{idx}"));
            return Err(RankError::InvalidInput(format!(
                "work '{label}' missing required fields: {}",
                missing.join(", ")
            )));
        }
        works.push(Work {
            url: record.url,
            title: record.title.unwrap_or_default(),
            summary: record.summary.unwrap_or_default(),
            tags: record.freeform_tags.unwrap_or_default(),
            word_count: record.word_count.unwrap_or_default(),
            kudos: record.kudos.unwrap_or_default(),
            metadata: record.metadata,
            rank: None,
            score: None,
        });
    }
    Ok(works)
}

/// Drop works whose identity was already seen, keeping the first.
/// Returns how many were dropped.
pub fn dedup_by_identity(works: &mut Vec<Work>) -> usize {
    let before = works.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    works.retain(|w| seen.insert(w.identity().to_string()));
    before - works.len()
}

/// Shuffle in place to remove positional bias from the source ordering.
pub fn shuffle_works(works: &mut [Work], seed: Option<u64>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    works.shuffle(&mut rng);
}
