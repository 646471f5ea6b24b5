//! IRR memoization across simulation runs
//!
//! Cash-flow series are keyed by their values rounded to whole cents. Both
//! solved rates and "no solution" outcomes are cached. A cache belongs to one
//! Monte Carlo session and can be handed to the next one explicitly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::metrics::calculate_irr;

/// Canonical key of a cash-flow series
pub type CashFlowSignature = Vec<i64>;

/// Snapshot of cache usage
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Cache of IRR outcomes by cash-flow signature
#[derive(Debug, Clone, Default)]
pub struct IrrCache {
    /// Outcomes by signature; None records a series with no IRR
    entries: HashMap<CashFlowSignature, Option<f64>>,

    /// Stop inserting once this many entries are held
    limit: Option<usize>,

    /// Statistics
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl IrrCache {
    /// Create an unbounded cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that holds at most `limit` entries
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn signature(cashflows: &[f64]) -> CashFlowSignature {
        cashflows.iter().map(|cf| (cf * 100.0).round() as i64).collect()
    }

    /// IRR of `cashflows`, computed once per signature
    pub fn irr(&mut self, cashflows: &[f64]) -> Option<f64> {
        let key = Self::signature(cashflows);
        if let Some(outcome) = self.entries.get(&key) {
            self.cache_hits += 1;
            return *outcome;
        }

        self.cache_misses += 1;
        let outcome = calculate_irr(cashflows);
        if self.limit.map_or(true, |limit| self.entries.len() < limit) {
            self.entries.insert(key, outcome);
        }
        outcome
    }

    /// Cached outcome for a series, if any; the outer Option is the lookup
    pub fn get(&self, cashflows: &[f64]) -> Option<Option<f64>> {
        self.entries.get(&Self::signature(cashflows)).copied()
    }

    /// Clear all cached data
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cache_hits = 0;
        self.cache_misses = 0;
    }

    /// Get number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.cache_hits,
            misses: self.cache_misses,
            hit_rate: self.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let mut cache = IrrCache::new();
        let first = cache.irr(&[-100.0, 110.0]);
        let second = cache.irr(&[-100.0, 110.0]);

        assert_eq!(first, second);
        assert_eq!(cache.cache_misses, 1);
        assert_eq!(cache.cache_hits, 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn test_sub_cent_differences_share_an_entry() {
        let mut cache = IrrCache::new();
        cache.irr(&[-100.0, 110.0]);
        cache.irr(&[-100.001, 110.002]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cache_hits, 1);
    }

    #[test]
    fn test_no_solution_is_cached() {
        let mut cache = IrrCache::new();
        assert_eq!(cache.irr(&[100.0, 10.0]), None);
        assert_eq!(cache.get(&[100.0, 10.0]), Some(None));
        assert_eq!(cache.irr(&[100.0, 10.0]), None);
        assert_eq!(cache.cache_hits, 1);
    }

    #[test]
    fn test_limit_and_clear() {
        let mut cache = IrrCache::with_limit(2);
        for i in 1..=5 {
            cache.irr(&[-100.0, 100.0 + i as f64]);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().misses, 5);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.limit(), Some(2));
    }
}
