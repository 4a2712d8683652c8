//! # tally-oracle
//!
//! Validated price feed for the vault engine.
//!
//! A primary feed reading is checked for staleness, sign, round completeness
//! and absolute bounds, then compared against the last accepted price. On
//! failure the aggregator retries once against a fallback feed and finally
//! serves the last-known-good cache within an extended staleness window.
//! Every accepted price is appended to a fixed-capacity TWAP ring.
//!
//! ## Modules
//!
//! - [`normalize`] — Fixed-point decimal rescaling
//! - [`validator`] — Single-reading validation and deviation math
//! - [`source`] — Price source interface and in-process sources
//! - [`cache`] — Last-known-good price slot
//! - [`twap`] — TWAP ring buffer
//! - [`aggregator`] — Primary / fallback / cache orchestration

pub mod aggregator;
pub mod cache;
pub mod normalize;
pub mod source;
pub mod twap;
pub mod validator;

pub use aggregator::{OracleAggregator, PriceTier, ValidatedPrice};
pub use source::PriceSource;
pub use twap::TwapRingBuffer;

use tally_types::price::ConfigError;

/// Failure to rescale a raw value into the canonical fixed-point scale.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The raw value is negative.
    #[error("cannot normalize negative value {value}")]
    Negative {
        /// The rejected raw value.
        value: i128,
    },

    /// Scaling up overflowed `u128`.
    #[error("scaling {value} from {source_decimals} to {target_decimals} decimals overflows")]
    Overflow {
        /// The raw value.
        value: i128,
        /// Decimals of the raw value.
        source_decimals: u8,
        /// Requested decimals.
        target_decimals: u8,
    },

    /// Scaling down truncated the value to zero.
    #[error("scaling {value} from {source_decimals} to {target_decimals} decimals truncates to zero")]
    Underflow {
        /// The raw value.
        value: i128,
        /// Decimals of the raw value.
        source_decimals: u8,
        /// Requested decimals.
        target_decimals: u8,
    },
}

/// A single feed reading failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// The reading is older than the staleness ceiling.
    #[error("stale price: age {age}s exceeds {max_staleness}s")]
    Stale {
        /// Seconds since the feed updated.
        age: u64,
        /// Configured ceiling.
        max_staleness: u64,
    },

    /// The reading claims to be from the future.
    #[error("price updated at {updated_at} is ahead of now {now}")]
    FutureTimestamp {
        /// Feed update timestamp.
        updated_at: u64,
        /// Caller-supplied current time.
        now: u64,
    },

    /// Zero, negative, or not representable in the canonical scale.
    #[error("invalid price: {price}")]
    InvalidPrice {
        /// The raw feed answer.
        price: i128,
    },

    /// The answer was carried over from an earlier round.
    #[error("incomplete round: answered in {answered_in_round}, requested in {round_id}")]
    IncompleteRound {
        /// Round in which the answer was requested.
        round_id: u64,
        /// Round in which the answer was computed.
        answered_in_round: u64,
    },

    /// The normalized price is outside the configured bounds.
    #[error("price {normalized} outside bounds [{min}, {max}]")]
    OutOfBounds {
        /// Normalized price.
        normalized: u128,
        /// Lower bound.
        min: u128,
        /// Upper bound.
        max: u128,
    },
}

impl PriceError {
    /// Whether a later reading may succeed without any configuration change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Stale { .. } | Self::FutureTimestamp { .. } | Self::IncompleteRound { .. }
        )
    }
}

/// A price source could not produce a reading at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The feed is unreachable or returned nothing.
    #[error("price source unavailable: {0}")]
    Unavailable(String),
}

/// TWAP ring buffer failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TwapError {
    /// Not enough history to cover the requested window.
    #[error("insufficient TWAP history: {available} observations, window {window_seconds}s")]
    InsufficientHistory {
        /// Observations currently retained.
        available: usize,
        /// Requested window.
        window_seconds: u64,
    },

    /// A zero-length window has no average.
    #[error("TWAP window must be non-zero")]
    InvalidWindow,

    /// The ring cannot hold two observations.
    #[error("TWAP capacity {capacity} is below the minimum of 2")]
    InvalidCapacity {
        /// Requested capacity.
        capacity: usize,
    },

    /// Observation timestamp moved backwards.
    #[error("non-monotonic timestamp: {new} < {last}")]
    NonMonotonicTimestamp {
        /// The rejected timestamp.
        new: u64,
        /// The newest recorded timestamp.
        last: u64,
    },

    /// A persisted ring failed validation on restore.
    #[error("invalid TWAP snapshot: {0}")]
    InvalidSnapshot(String),

    /// The average does not fit in `u128`.
    #[error("TWAP result overflows u128")]
    Overflow,
}

/// Why one validation tier did not produce a price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierFailure {
    /// The source returned no reading.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The reading failed validation.
    #[error(transparent)]
    Price(#[from] PriceError),

    /// The reading moved too far from the last accepted price.
    #[error("price {price} deviates {deviation_bps} bps from last accepted, limit {max_bps} bps")]
    Deviation {
        /// The validated but rejected price.
        price: u128,
        /// Measured deviation.
        deviation_bps: u128,
        /// Configured limit.
        max_bps: u32,
    },

    /// No source is configured for this tier.
    #[error("not configured")]
    NotConfigured,
}

/// Error types for oracle aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Primary and fallback failed and the cache is too old or empty.
    #[error("all price sources exhausted (primary: {primary}; fallback: {fallback})")]
    AllSourcesExhausted {
        /// Primary tier failure.
        primary: TierFailure,
        /// Fallback tier failure.
        fallback: TierFailure,
    },

    /// Only the last-known-good cache could answer.
    #[error("degraded price {price} observed at {observed_at}")]
    Degraded {
        /// Cached price.
        price: u128,
        /// When the cached price was observed.
        observed_at: u64,
    },

    /// A configuration update was rejected.
    #[error("invalid oracle config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// TWAP computation or restore failed.
    #[error("TWAP error: {0}")]
    Twap(#[from] TwapError),
}

impl OracleError {
    /// Whether retrying later may succeed ("try again") as opposed to a
    /// request or configuration that is fundamentally invalid.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AllSourcesExhausted { .. } | Self::Degraded { .. } => true,
            Self::Twap(TwapError::InsufficientHistory { .. }) => true,
            Self::InvalidConfig(_) | Self::Twap(_) => false,
        }
    }
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
