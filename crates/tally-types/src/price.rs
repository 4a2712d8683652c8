//! Price feed readings, recorded observations and oracle configuration.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{
    BPS_DENOMINATOR, DEFAULT_MAX_DEVIATION_BPS, DEFAULT_MAX_STALENESS_SECS, PRICE_SCALE, U256,
};

/// One answer from an external price feed, before any validation.
///
/// Mirrors the round-based shape of aggregator feeds: a signed answer in
/// the feed's own decimal scale plus the round bookkeeping used to detect
/// carried-over answers.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedReading {
    /// Raw answer in the feed's scale. May be zero or negative on a broken feed.
    #[serde_as(as = "crate::codec::Decimal")]
    pub price: i128,
    /// Unix timestamp at which the feed last updated this answer.
    pub updated_at: u64,
    /// Round in which the answer was requested.
    pub round_id: u64,
    /// Round in which the answer was actually computed.
    pub answered_in_round: u64,
    /// Number of decimals in `price`.
    pub decimals: u8,
}

/// A validated price accepted into the TWAP history.
///
/// Immutable once recorded; only ring-buffer overwrite evicts it.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Unix timestamp at which the price was recorded.
    pub timestamp: u64,
    /// Price in canonical 18-decimal fixed point.
    #[serde_as(as = "crate::codec::Decimal")]
    pub price: u128,
    /// Running sum of `price * elapsed_seconds` since the first observation.
    #[serde_as(as = "crate::codec::WideDecimal")]
    pub cumulative_price: U256,
}

/// Oracle validation parameters.
///
/// Invariants: `min_price < max_price` and `max_deviation_bps <= 10_000`,
/// enforced by [`OracleConfig::validate`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum accepted age of a feed reading in seconds.
    #[serde(default = "default_max_staleness")]
    pub max_staleness_seconds: u64,
    /// Maximum relative move from the last accepted price, in basis points.
    #[serde(default = "default_max_deviation")]
    pub max_deviation_bps: u32,
    /// Lowest acceptable normalized price (inclusive).
    #[serde_as(as = "crate::codec::Decimal")]
    #[serde(default = "default_min_price")]
    pub min_price: u128,
    /// Highest acceptable normalized price (inclusive).
    #[serde_as(as = "crate::codec::Decimal")]
    #[serde(default = "default_max_price")]
    pub max_price: u128,
}

/// Reasons an [`OracleConfig`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The price bounds are empty or inverted.
    #[error("min price {min} must be below max price {max}")]
    InvertedBounds {
        /// Configured lower bound.
        min: u128,
        /// Configured upper bound.
        max: u128,
    },

    /// The deviation limit exceeds 100%.
    #[error("max deviation {bps} bps exceeds {limit} bps")]
    DeviationTooLarge {
        /// Configured deviation limit.
        bps: u32,
        /// The basis-point denominator.
        limit: u128,
    },
}

fn default_max_staleness() -> u64 {
    DEFAULT_MAX_STALENESS_SECS
}

fn default_max_deviation() -> u32 {
    DEFAULT_MAX_DEVIATION_BPS
}

fn default_min_price() -> u128 {
    1
}

fn default_max_price() -> u128 {
    // One trillion units of quote per unit of base.
    1_000_000_000_000 * PRICE_SCALE
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_staleness_seconds: default_max_staleness(),
            max_deviation_bps: default_max_deviation(),
            min_price: default_min_price(),
            max_price: default_max_price(),
        }
    }
}

impl OracleConfig {
    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvertedBounds`] if `min_price >= max_price`
    /// - [`ConfigError::DeviationTooLarge`] if `max_deviation_bps > 10_000`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_price >= self.max_price {
            return Err(ConfigError::InvertedBounds {
                min: self.min_price,
                max: self.max_price,
            });
        }
        if u128::from(self.max_deviation_bps) > BPS_DENOMINATOR {
            return Err(ConfigError::DeviationTooLarge {
                bps: self.max_deviation_bps,
                limit: BPS_DENOMINATOR,
            });
        }
        Ok(())
    }

    /// Age beyond which even the last-known-good cache is refused.
    pub fn extended_staleness_seconds(&self) -> u64 {
        self.max_staleness_seconds.saturating_mul(2)
    }
}

/// The last price any validation tier accepted.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastKnownGood {
    /// Accepted price in canonical fixed point; zero until the first acceptance.
    #[serde_as(as = "crate::codec::Decimal")]
    pub price: u128,
    /// Feed timestamp of the accepted reading. Never decreases.
    pub observed_at: u64,
}

impl LastKnownGood {
    /// Whether any price has ever been accepted.
    pub fn is_set(&self) -> bool {
        self.price > 0
    }
}
