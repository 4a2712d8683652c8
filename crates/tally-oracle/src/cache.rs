//! Last-known-good price slot.
//!
//! Holds the most recent price any validation tier accepted. When both
//! feeds fail, the aggregator may still serve this price for an extended
//! window of `2 * max_staleness_seconds` past its observation time; beyond
//! that the oracle is considered exhausted.
//!
//! `observed_at` never moves backwards: a fallback answer older than the
//! cached one refreshes the price but keeps the newer timestamp.

use tally_types::price::{LastKnownGood, OracleConfig};

/// Single mutable last-known-good slot.
#[derive(Debug, Clone, Default)]
pub struct LastKnownGoodCache {
    entry: LastKnownGood,
}

impl LastKnownGoodCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a cache from a persisted entry.
    pub fn from_entry(entry: LastKnownGood) -> Self {
        Self { entry }
    }

    /// Record an accepted price.
    pub fn accept(&mut self, price: u128, observed_at: u64) {
        self.entry.price = price;
        self.entry.observed_at = self.entry.observed_at.max(observed_at);
    }

    /// The cached entry.
    pub fn entry(&self) -> LastKnownGood {
        self.entry
    }

    /// The cached price, zero if nothing was ever accepted.
    pub fn price(&self) -> u128 {
        self.entry.price
    }

    /// Seconds since the cached price was observed, `None` if empty.
    pub fn age(&self, now: u64) -> Option<u64> {
        self.entry
            .is_set()
            .then(|| now.saturating_sub(self.entry.observed_at))
    }

    /// The cached entry if it is still inside the extended staleness window.
    pub fn serve(&self, config: &OracleConfig, now: u64) -> Option<LastKnownGood> {
        let age = self.age(now)?;
        (age <= config.extended_staleness_seconds()).then_some(self.entry)
    }
}
