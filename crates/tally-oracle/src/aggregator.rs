//! Primary / fallback / cache price aggregation.
//!
//! ```text
//! primary ──validate──► deviation vs last-known-good ──► accept
//!    │ fail / deviated
//!    ▼
//! fallback ──validate──────────────────────────────────► accept
//!    │ fail
//!    ▼
//! last-known-good (age <= 2 * max_staleness) ──────────► degraded
//!    │ too old / empty
//!    ▼
//! AllSourcesExhausted
//! ```
//!
//! Accepting a price refreshes the last-known-good slot and appends the
//! price to the TWAP ring at the caller's `now`. A request makes at most two
//! source calls and one cache read.

use tally_types::price::{LastKnownGood, OracleConfig};
use tally_types::vault::TwapSnapshot;
use tally_types::DEFAULT_TWAP_CAPACITY;

use crate::cache::LastKnownGoodCache;
use crate::source::PriceSource;
use crate::twap::TwapRingBuffer;
use crate::validator::{deviation_bps, validate};
use crate::{OracleError, Result, TierFailure};

/// Which tier produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    /// Primary feed, within the deviation limit.
    Primary,
    /// Fallback feed.
    Fallback,
    /// Cached last-known-good price (degraded).
    LastKnownGood,
}

/// A price returned by [`OracleAggregator::get_validated_price`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPrice {
    /// Canonical 18-decimal price.
    pub price: u128,
    /// Tier that produced it.
    pub tier: PriceTier,
    /// Feed timestamp of the underlying reading.
    pub observed_at: u64,
}

impl ValidatedPrice {
    /// Served from the cache rather than a live feed.
    pub fn is_degraded(&self) -> bool {
        self.tier == PriceTier::LastKnownGood
    }

    /// The price if it came from a live feed.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Degraded`] if the price was served from the cache
    pub fn require_fresh(self) -> Result<u128> {
        if self.is_degraded() {
            return Err(OracleError::Degraded {
                price: self.price,
                observed_at: self.observed_at,
            });
        }
        Ok(self.price)
    }
}

/// Validated price feed with fallback, cache and TWAP history.
pub struct OracleAggregator {
    config: OracleConfig,
    primary: Box<dyn PriceSource>,
    fallback: Option<Box<dyn PriceSource>>,
    cache: LastKnownGoodCache,
    twap: TwapRingBuffer,
}

impl std::fmt::Debug for OracleAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleAggregator")
            .field("config", &self.config)
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|s| s.name().to_string()))
            .field("last_known_good", &self.cache.entry())
            .field("twap_len", &self.twap.len())
            .finish()
    }
}

impl OracleAggregator {
    /// Create an aggregator with the default TWAP capacity.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if `config` violates its invariants
    pub fn new(
        config: OracleConfig,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
    ) -> Result<Self> {
        Self::with_capacity(config, primary, fallback, DEFAULT_TWAP_CAPACITY)
    }

    /// Create an aggregator with a TWAP ring of `capacity` slots.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if `config` violates its invariants
    /// - [`OracleError::Twap`] if `capacity < 2`
    pub fn with_capacity(
        config: OracleConfig,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
        capacity: usize,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            primary,
            fallback,
            cache: LastKnownGoodCache::new(),
            twap: TwapRingBuffer::new(capacity)?,
        })
    }

    /// Rebuild an aggregator from persisted state and freshly wired sources.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if the persisted config is invalid
    /// - [`OracleError::Twap`] if the TWAP snapshot is malformed
    pub fn from_snapshot(
        config: OracleConfig,
        last_known_good: LastKnownGood,
        twap: &TwapSnapshot,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            primary,
            fallback,
            cache: LastKnownGoodCache::from_entry(last_known_good),
            twap: TwapRingBuffer::from_snapshot(twap)?,
        })
    }

    /// Produce a price through the primary, fallback and cache tiers.
    ///
    /// A degraded (cached) price is returned as `Ok` with
    /// [`PriceTier::LastKnownGood`]; callers that need a live price use
    /// [`ValidatedPrice::require_fresh`].
    ///
    /// # Errors
    ///
    /// - [`OracleError::AllSourcesExhausted`] if both feeds fail and the
    ///   cache is empty or older than `2 * max_staleness_seconds`
    pub fn get_validated_price(&mut self, now: u64) -> Result<ValidatedPrice> {
        let primary_failure = match self.read_tier(self.primary.as_ref(), now) {
            Ok((price, observed_at)) => {
                match deviation_bps(price, self.cache.price()) {
                    Some(bps) if bps > u128::from(self.config.max_deviation_bps) => {
                        tracing::warn!(
                            price,
                            reference = self.cache.price(),
                            deviation_bps = bps,
                            max_bps = self.config.max_deviation_bps,
                            "oracle: primary price deviates beyond limit"
                        );
                        TierFailure::Deviation {
                            price,
                            deviation_bps: bps,
                            max_bps: self.config.max_deviation_bps,
                        }
                    }
                    _ => return Ok(self.accept(price, observed_at, now, PriceTier::Primary)),
                }
            }
            Err(failure) => {
                tracing::warn!(
                    source = self.primary.name(),
                    error = %failure,
                    "oracle: primary source failed"
                );
                failure
            }
        };

        let fallback_failure = match self.fallback.as_deref() {
            None => TierFailure::NotConfigured,
            Some(fallback) => match self.read_tier(fallback, now) {
                Ok((price, observed_at)) => {
                    tracing::warn!(source = fallback.name(), price, "oracle: using fallback price");
                    return Ok(self.accept(price, observed_at, now, PriceTier::Fallback));
                }
                Err(failure) => {
                    tracing::warn!(
                        source = fallback.name(),
                        error = %failure,
                        "oracle: fallback source failed"
                    );
                    failure
                }
            },
        };

        match self.cache.serve(&self.config, now) {
            Some(entry) => {
                tracing::warn!(
                    price = entry.price,
                    observed_at = entry.observed_at,
                    "oracle: serving degraded last-known-good price"
                );
                Ok(ValidatedPrice {
                    price: entry.price,
                    tier: PriceTier::LastKnownGood,
                    observed_at: entry.observed_at,
                })
            }
            None => {
                tracing::error!("oracle: all price sources exhausted");
                Err(OracleError::AllSourcesExhausted {
                    primary: primary_failure,
                    fallback: fallback_failure,
                })
            }
        }
    }

    /// Time-weighted average over the trailing window.
    ///
    /// A successful average also refreshes the last-known-good slot, stamped
    /// with the newest observation's timestamp.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Twap`] if the ring cannot cover the window
    pub fn twap_price(&mut self, window_seconds: u64, now: u64) -> Result<u128> {
        let price = self.twap.get_twap(window_seconds, now)?;
        if let Some(head) = self.twap.latest() {
            self.cache.accept(price, head.timestamp);
        }
        Ok(price)
    }

    /// Replace the validation parameters.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidConfig`] if `config` violates its invariants;
    ///   the previous configuration stays active
    pub fn update_config(&mut self, config: OracleConfig) -> Result<()> {
        config.validate()?;
        tracing::info!(
            max_staleness = config.max_staleness_seconds,
            max_deviation_bps = config.max_deviation_bps,
            "oracle: config updated"
        );
        self.config = config;
        Ok(())
    }

    /// Replace both price sources. History and cache are kept.
    pub fn update_sources(
        &mut self,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
    ) {
        tracing::info!(
            primary = primary.name(),
            fallback = fallback.as_ref().map(|s| s.name()).unwrap_or("none"),
            "oracle: price sources updated"
        );
        self.primary = primary;
        self.fallback = fallback;
    }

    /// Active configuration.
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Last-known-good entry.
    pub fn last_known_good(&self) -> LastKnownGood {
        self.cache.entry()
    }

    /// TWAP history.
    pub fn twap(&self) -> &TwapRingBuffer {
        &self.twap
    }

    /// Whether a fallback source is wired.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    fn read_tier(
        &self,
        source: &dyn PriceSource,
        now: u64,
    ) -> std::result::Result<(u128, u64), TierFailure> {
        let reading = source.read(now)?;
        let price = validate(&reading, &self.config, now)?;
        Ok((price, reading.updated_at))
    }

    fn accept(&mut self, price: u128, observed_at: u64, now: u64, tier: PriceTier) -> ValidatedPrice {
        self.cache.accept(price, observed_at);
        if let Err(e) = self.twap.record(price, now) {
            tracing::warn!(error = %e, "oracle: price not recorded in TWAP history");
        }
        tracing::debug!(price, observed_at, ?tier, "oracle: price accepted");
        ValidatedPrice {
            price,
            tier,
            observed_at,
        }
    }
}
