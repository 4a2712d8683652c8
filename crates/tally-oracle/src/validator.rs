//! Single-reading price validation.
//!
//! [`validate`] is pure: given a reading, a configuration and the caller's
//! notion of "now" it always returns the same answer. Checks run in a fixed
//! order and the first failure wins:
//!
//! 1. staleness (`now - updated_at > max_staleness_seconds`)
//! 2. sign (`price <= 0`)
//! 3. round completeness (`answered_in_round < round_id`)
//! 4. normalization to 18 decimals
//! 5. absolute bounds (`[min_price, max_price]`, inclusive)

use ethnum::U256;
use tally_types::price::{OracleConfig, RawFeedReading};
use tally_types::BPS_DENOMINATOR;

use crate::normalize::to_canonical;
use crate::PriceError;

/// Validate one feed reading and return its canonical price.
///
/// A reading exactly `max_staleness_seconds` old is still accepted.
///
/// # Errors
///
/// - [`PriceError::FutureTimestamp`] if `updated_at > now`
/// - [`PriceError::Stale`] if the reading is too old
/// - [`PriceError::InvalidPrice`] if the answer is non-positive or cannot be normalized
/// - [`PriceError::IncompleteRound`] if the answer was carried from an earlier round
/// - [`PriceError::OutOfBounds`] if the normalized price is outside the configured range
pub fn validate(
    reading: &RawFeedReading,
    config: &OracleConfig,
    now: u64,
) -> Result<u128, PriceError> {
    let age = now
        .checked_sub(reading.updated_at)
        .ok_or(PriceError::FutureTimestamp {
            updated_at: reading.updated_at,
            now,
        })?;
    if age > config.max_staleness_seconds {
        return Err(PriceError::Stale {
            age,
            max_staleness: config.max_staleness_seconds,
        });
    }

    if reading.price <= 0 {
        return Err(PriceError::InvalidPrice {
            price: reading.price,
        });
    }

    if reading.answered_in_round < reading.round_id {
        return Err(PriceError::IncompleteRound {
            round_id: reading.round_id,
            answered_in_round: reading.answered_in_round,
        });
    }

    let normalized = to_canonical(reading.price, reading.decimals).map_err(|_| {
        PriceError::InvalidPrice {
            price: reading.price,
        }
    })?;

    if normalized < config.min_price || normalized > config.max_price {
        return Err(PriceError::OutOfBounds {
            normalized,
            min: config.min_price,
            max: config.max_price,
        });
    }

    Ok(normalized)
}

/// Relative move from `reference` to `price` in basis points.
///
/// `|price - reference| * 10_000 / reference`, truncated. Returns `None`
/// when there is no reference yet (`reference == 0`). Saturates at
/// `u128::MAX` for absurd moves.
pub fn deviation_bps(price: u128, reference: u128) -> Option<u128> {
    if reference == 0 {
        return None;
    }
    let diff = U256::from(price.abs_diff(reference));
    let bps = diff * U256::from(BPS_DENOMINATOR) / U256::from(reference);
    let (high, low) = bps.into_words();
    Some(if high == 0 { low } else { u128::MAX })
}
