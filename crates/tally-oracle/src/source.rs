//! Price source interface and in-process sources.
//!
//! Production feed adapters live outside this crate and implement
//! [`PriceSource`]. The sources here back tests and the simulation host:
//! [`StaticSource`] serves a settable reading through a shared handle so a
//! test can move the price after the aggregator has taken ownership, and
//! [`FailingSource`] never answers.

use std::sync::{Arc, Mutex, PoisonError};

use tally_types::price::RawFeedReading;

use crate::SourceError;

/// A synchronous external price feed.
pub trait PriceSource: Send {
    /// Fetch the feed's current answer.
    fn read(&self, now: u64) -> Result<RawFeedReading, SourceError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "price-source"
    }
}

/// A source returning whatever reading was last set on any of its clones.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    reading: Arc<Mutex<Option<RawFeedReading>>>,
}

impl StaticSource {
    /// Create a source serving `reading`.
    pub fn new(name: impl Into<String>, reading: RawFeedReading) -> Self {
        Self {
            name: name.into(),
            reading: Arc::new(Mutex::new(Some(reading))),
        }
    }

    /// Create a source that is initially offline.
    pub fn offline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reading: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the served reading.
    pub fn set_reading(&self, reading: RawFeedReading) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = Some(reading);
    }

    /// Publish a new answer in a fresh, complete round.
    ///
    /// Keeps the current decimals (8 if the source was offline).
    pub fn publish(&self, price: i128, updated_at: u64) {
        let mut guard = self.reading.lock().unwrap_or_else(PoisonError::into_inner);
        let (round_id, decimals) = (*guard)
            .map(|r| (r.round_id.saturating_add(1), r.decimals))
            .unwrap_or((1, 8));
        *guard = Some(RawFeedReading {
            price,
            updated_at,
            round_id,
            answered_in_round: round_id,
            decimals,
        });
    }

    /// Stop answering until a reading is set again.
    pub fn go_offline(&self) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The currently served reading, if any.
    pub fn current(&self) -> Option<RawFeedReading> {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PriceSource for StaticSource {
    fn read(&self, _now: u64) -> Result<RawFeedReading, SourceError> {
        self.current()
            .ok_or_else(|| SourceError::Unavailable(format!("{} is offline", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A source that always fails.
#[derive(Debug, Clone)]
pub struct FailingSource {
    reason: String,
}

impl FailingSource {
    /// Create a source failing with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PriceSource for FailingSource {
    fn read(&self, _now: u64) -> Result<RawFeedReading, SourceError> {
        Err(SourceError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
