//! TWAP (Time-Weighted Average Price) ring buffer.
//!
//! Accepted prices are recorded as `(timestamp, price, cumulative)` where
//!
//! ```text
//! cumulative_n = cumulative_(n-1) + price_n * (timestamp_n - timestamp_(n-1))
//! cumulative_0 = 0
//! ```
//!
//! so the average over any two retained observations is a single
//! subtraction and division:
//!
//! ```text
//! TWAP = (head.cumulative - anchor.cumulative) / (head.timestamp - anchor.timestamp)
//! ```
//!
//! The ring has a fixed capacity allocated up front; once full, each new
//! observation silently overwrites the oldest. Division truncates, biasing
//! the average toward the lower price.

use ethnum::U256;
use tally_types::price::PriceObservation;
use tally_types::vault::TwapSnapshot;

use crate::TwapError;

/// Minimum number of observations for a valid TWAP.
pub const MIN_OBSERVATIONS: usize = 2;

/// Fixed-capacity circular buffer of price observations.
#[derive(Debug, Clone)]
pub struct TwapRingBuffer {
    slots: Vec<PriceObservation>,
    /// Index of the next write.
    cursor: usize,
    /// Observations retained, at most `slots.len()`.
    count: usize,
}

impl TwapRingBuffer {
    /// Allocate an empty ring with `capacity` slots.
    ///
    /// # Errors
    ///
    /// - [`TwapError::InvalidCapacity`] if `capacity < 2`
    pub fn new(capacity: usize) -> Result<Self, TwapError> {
        if capacity < MIN_OBSERVATIONS {
            return Err(TwapError::InvalidCapacity { capacity });
        }
        Ok(Self {
            slots: vec![PriceObservation::default(); capacity],
            cursor: 0,
            count: 0,
        })
    }

    /// Rebuild a ring from its chronological snapshot.
    ///
    /// # Errors
    ///
    /// - [`TwapError::InvalidCapacity`] if the snapshot capacity is below 2
    /// - [`TwapError::InvalidSnapshot`] if it holds more observations than
    ///   its capacity or timestamps are not strictly increasing
    pub fn from_snapshot(snapshot: &TwapSnapshot) -> Result<Self, TwapError> {
        let mut ring = Self::new(snapshot.capacity)?;
        if snapshot.observations.len() > snapshot.capacity {
            return Err(TwapError::InvalidSnapshot(format!(
                "{} observations exceed capacity {}",
                snapshot.observations.len(),
                snapshot.capacity
            )));
        }
        for pair in snapshot.observations.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(TwapError::InvalidSnapshot(format!(
                    "timestamp {} does not follow {}",
                    pair[1].timestamp, pair[0].timestamp
                )));
            }
        }
        for (slot, observation) in ring.slots.iter_mut().zip(&snapshot.observations) {
            *slot = *observation;
        }
        ring.count = snapshot.observations.len();
        ring.cursor = ring.count % ring.capacity();
        Ok(ring)
    }

    /// Record an accepted price at `now`.
    ///
    /// A second price in the same second is ignored: the first observation
    /// for a timestamp is kept, since recorded observations never change.
    ///
    /// # Errors
    ///
    /// - [`TwapError::NonMonotonicTimestamp`] if `now` precedes the newest observation
    pub fn record(&mut self, price: u128, now: u64) -> Result<(), TwapError> {
        let cumulative_price = match self.latest() {
            None => U256::ZERO,
            Some(last) if now < last.timestamp => {
                return Err(TwapError::NonMonotonicTimestamp {
                    new: now,
                    last: last.timestamp,
                });
            }
            Some(last) if now == last.timestamp => {
                tracing::trace!(now, "twap: observation for this timestamp already recorded");
                return Ok(());
            }
            Some(last) => {
                let elapsed = U256::from(now - last.timestamp);
                last.cumulative_price
                    .wrapping_add(U256::from(price).wrapping_mul(elapsed))
            }
        };

        let capacity = self.capacity();
        self.slots[self.cursor] = PriceObservation {
            timestamp: now,
            price,
            cumulative_price,
        };
        self.cursor = (self.cursor + 1) % capacity;
        self.count = (self.count + 1).min(capacity);
        Ok(())
    }

    /// Time-weighted average price over the trailing `window_seconds`.
    ///
    /// The anchor is the oldest retained observation, other than the head,
    /// recorded at or before `now - window_seconds`, so the average spans
    /// everything from there to the head. If no retained observation is that
    /// old the window cannot be covered and the call fails; it never falls
    /// back to a shorter window.
    ///
    /// # Errors
    ///
    /// - [`TwapError::InvalidWindow`] if `window_seconds == 0`
    /// - [`TwapError::InsufficientHistory`] with fewer than 2 observations or
    ///   no observation old enough to anchor the window
    /// - [`TwapError::Overflow`] if the average does not fit `u128`
    pub fn get_twap(&self, window_seconds: u64, now: u64) -> Result<u128, TwapError> {
        if window_seconds == 0 {
            return Err(TwapError::InvalidWindow);
        }
        let insufficient = TwapError::InsufficientHistory {
            available: self.count,
            window_seconds,
        };
        if self.count < MIN_OBSERVATIONS {
            return Err(insufficient);
        }
        let head = self.latest().ok_or_else(|| insufficient.clone())?;
        let target = now.checked_sub(window_seconds).ok_or_else(|| insufficient.clone())?;

        let anchor = self
            .iter()
            .take(self.count - 1)
            .find(|o| o.timestamp <= target)
            .ok_or(insufficient)?;

        // Timestamps are strictly increasing, so the span is non-zero.
        let span = head.timestamp - anchor.timestamp;
        let twap = head
            .cumulative_price
            .wrapping_sub(anchor.cumulative_price)
            / U256::from(span);

        let (high, low) = twap.into_words();
        if high != 0 {
            return Err(TwapError::Overflow);
        }
        Ok(low)
    }

    /// The newest observation.
    pub fn latest(&self) -> Option<&PriceObservation> {
        if self.count == 0 {
            return None;
        }
        let head = (self.cursor + self.capacity() - 1) % self.capacity();
        self.slots.get(head)
    }

    /// Retained observations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PriceObservation> + '_ {
        let capacity = self.capacity();
        let oldest = if self.count < capacity { 0 } else { self.cursor };
        (0..self.count).map(move |i| &self.slots[(oldest + i) % capacity])
    }

    /// Chronological snapshot for persistence.
    pub fn snapshot(&self) -> TwapSnapshot {
        TwapSnapshot {
            capacity: self.capacity(),
            observations: self.iter().copied().collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of retained observations.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
