//! Per-run cache of pairwise judgements.
//!
//! Keys are unordered identity pairs: a judgement recorded for (A, B) answers
//! queries for (B, A) with the result flipped. The cache lives for one ranking
//! invocation and is never persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Order-independent key for a pair of work identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

/// Which side of the normalized key won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("winner '{winner}' is not one of '{a}' / '{b}'")]
    UnknownWinner { a: String, b: String, winner: String },
    #[error("cannot record a judgement of '{0}' against itself")]
    SelfComparison(String),
}

#[derive(Debug, Default)]
pub struct ComparisonCache {
    entries: Mutex<HashMap<PairKey, Winner>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ComparisonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(true)` if `a` was judged better than `b`, `Some(false)` if `b`
    /// was, `None` if the pair has not been judged. Counts a hit or a miss.
    pub fn lookup(&self, a: &str, b: &str) -> Option<bool> {
        let key = PairKey::new(a, b);
        let found = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied();

        match found {
            Some(winner) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let winner_id = match winner {
                    Winner::Low => key.low(),
                    Winner::High => key.high(),
                };
                Some(winner_id == a)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a judgement. Returns `Ok(false)` when the pair already had one
    /// (the first judgement stays).
    pub fn record(&self, a: &str, b: &str, winner: &str) -> Result<bool, CacheError> {
        if a == b {
            return Err(CacheError::SelfComparison(a.to_string()));
        }
        if winner != a && winner != b {
            return Err(CacheError::UnknownWinner {
                a: a.to_string(),
                b: b.to_string(),
                winner: winner.to_string(),
            });
        }
        let key = PairKey::new(a, b);
        let side = if winner == key.low() {
            Winner::Low
        } else {
            Winner::High
        };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, side);
        Ok(true)
    }

    /// Convenience for callers holding a boolean verdict.
    pub fn record_verdict(&self, a: &str, b: &str, a_wins: bool) -> Result<bool, CacheError> {
        let winner = if a_wins { a } else { b };
        self.record(a, b, winner)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits(),
            misses: self.misses(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(PairKey::new("a", "b"), PairKey::new("b", "a"));
        assert_ne!(PairKey::new("a", "b"), PairKey::new("a", "c"));
    }

    #[test]
    fn lookup_flips_for_reversed_order() {
        let cache = ComparisonCache::new();
        cache.record("x", "y", "y").unwrap();

        assert_eq!(cache.lookup("x", "y"), Some(false));
        assert_eq!(cache.lookup("y", "x"), Some(true));
        // Repeated queries are stable.
        assert_eq!(cache.lookup("x", "y"), Some(false));
        assert_eq!(cache.lookup("y", "x"), Some(true));
    }

    #[test]
    fn first_judgement_wins() {
        let cache = ComparisonCache::new();
        assert!(cache.record("a", "b", "a").unwrap());
        assert!(!cache.record("b", "a", "b").unwrap());
        assert_eq!(cache.lookup("a", "b"), Some(true));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = ComparisonCache::new();
        assert_eq!(cache.lookup("a", "b"), None);
        cache.record_verdict("a", "b", true).unwrap();
        assert_eq!(cache.lookup("b", "a"), Some(false));
        assert_eq!(cache.lookup("a", "c"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_foreign_winner_and_self_pairs() {
        let cache = ComparisonCache::new();
        assert!(matches!(
            cache.record("a", "b", "c"),
            Err(CacheError::UnknownWinner { .. })
        ));
        assert!(matches!(
            cache.record("a", "a", "a"),
            Err(CacheError::SelfComparison(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_stats_have_zero_hit_rate() {
        assert_eq!(ComparisonCache::new().stats().hit_rate(), 0.0);
    }
}
