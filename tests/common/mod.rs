#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ficrank::item::Work;
use ficrank::oracle::Oracle;

pub fn work(title: &str, word_count: u64) -> Work {
    Work::new(title)
        .with_url(format!("https://archiveofourown.org/works/{title}"))
        .with_summary(format!("Summary of {title}"))
        .with_tags(["Fluff"])
        .with_word_count(word_count)
        .with_kudos(word_count / 10)
}

/// Prefers the longer work. Records every pair it is asked about.
#[derive(Default)]
pub struct WordCountOracle {
    pub compares: AtomicUsize,
    pub scores: AtomicUsize,
    pub asked: Mutex<Vec<(String, String)>>,
    pub batches: Mutex<Vec<usize>>,
    /// Cancelled once this many comparisons have been answered.
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl WordCountOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((n, token)),
            ..Self::default()
        }
    }

    pub fn compare_count(&self) -> usize {
        self.compares.load(Ordering::SeqCst)
    }

    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for WordCountOracle {
    async fn compare(&self, a: &Work, b: &Work, _preference: &str) -> bool {
        let n = self.compares.fetch_add(1, Ordering::SeqCst) + 1;
        self.asked
            .lock()
            .unwrap()
            .push((a.title.clone(), b.title.clone()));
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }
        a.word_count > b.word_count
    }

    async fn score(&self, work: &Work, _preference: &str) -> u32 {
        self.scores.fetch_add(1, Ordering::SeqCst);
        (work.word_count / 1000) as u32
    }

    async fn compare_batch(&self, pairs: &[(&Work, &Work)], preference: &str) -> Vec<bool> {
        self.batches.lock().unwrap().push(pairs.len());
        let mut out = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            out.push(self.compare(a, b, preference).await);
        }
        out
    }
}

/// Gives every work the same score.
pub struct ConstantScoreOracle {
    pub score: u32,
    pub calls: AtomicUsize,
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl ConstantScoreOracle {
    pub fn new(score: u32) -> Self {
        Self {
            score,
            calls: AtomicUsize::new(0),
            cancel_after: None,
        }
    }
}

#[async_trait]
impl Oracle for ConstantScoreOracle {
    async fn compare(&self, _a: &Work, _b: &Work, _preference: &str) -> bool {
        true
    }

    async fn score(&self, _work: &Work, _preference: &str) -> u32 {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }
        self.score
    }
}

/// Answers like [`WordCountOracle`] until batch number `stall_at`, which
/// cancels the run and then never completes.
pub struct StallingOracle {
    pub inner: WordCountOracle,
    pub stall_at: usize,
    pub token: CancellationToken,
    pub batches: AtomicUsize,
    pub stalled: Mutex<Vec<(String, String)>>,
}

impl StallingOracle {
    pub fn new(stall_at: usize, token: CancellationToken) -> Self {
        Self {
            inner: WordCountOracle::new(),
            stall_at,
            token,
            batches: AtomicUsize::new(0),
            stalled: Mutex::new(Vec::new()),
        }
    }

    fn stalls_now(&self) -> bool {
        self.batches.fetch_add(1, Ordering::SeqCst) + 1 >= self.stall_at
    }
}

#[async_trait]
impl Oracle for StallingOracle {
    async fn compare(&self, a: &Work, b: &Work, preference: &str) -> bool {
        self.inner.compare(a, b, preference).await
    }

    async fn score(&self, work: &Work, preference: &str) -> u32 {
        self.inner.score(work, preference).await
    }

    async fn compare_batch(&self, pairs: &[(&Work, &Work)], preference: &str) -> Vec<bool> {
        if self.stalls_now() {
            self.stalled
                .lock()
                .unwrap()
                .extend(pairs.iter().map(|(a, b)| (a.title.clone(), b.title.clone())));
            self.token.cancel();
            return std::future::pending().await;
        }
        self.inner.compare_batch(pairs, preference).await
    }

    async fn score_batch(&self, works: &[&Work], preference: &str) -> Vec<u32> {
        if self.stalls_now() {
            self.token.cancel();
            return std::future::pending().await;
        }
        let mut out = Vec::with_capacity(works.len());
        for work in works {
            out.push(self.inner.score(work, preference).await);
        }
        out
    }
}
