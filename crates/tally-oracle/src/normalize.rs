//! Fixed-point decimal rescaling.
//!
//! Feeds report prices with their own decimal exponent (8 for most USD
//! aggregators, 18 for on-chain AMM quotes). The engine works in a single
//! canonical scale, [`CANONICAL_DECIMALS`].
//!
//! ```text
//! target >= source:  value * 10^(target - source)   (checked)
//! target <  source:  value / 10^(source - target)   (truncates, must stay >= 1)
//! ```
//!
//! Truncation only affects bounds checks, never share math.

use tally_types::CANONICAL_DECIMALS;

use crate::NormalizeError;

/// `10^exp`, or `None` if it does not fit in `u128`.
pub fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Rescale `raw_value` from `source_decimals` to `target_decimals`.
///
/// # Errors
///
/// - [`NormalizeError::Negative`] if `raw_value < 0`
/// - [`NormalizeError::Overflow`] if scaling up does not fit `u128`
/// - [`NormalizeError::Underflow`] if scaling down truncates to zero
///
/// # Examples
///
/// ```
/// use tally_oracle::normalize::normalize;
///
/// // 2,000.00000000 at 8 decimals becomes 2,000 * 10^18.
/// let price = normalize(2_000_00000000, 8, 18).unwrap();
/// assert_eq!(price, 2_000 * 10u128.pow(18));
/// ```
pub fn normalize(
    raw_value: i128,
    source_decimals: u8,
    target_decimals: u8,
) -> Result<u128, NormalizeError> {
    let value = u128::try_from(raw_value)
        .map_err(|_| NormalizeError::Negative { value: raw_value })?;

    if target_decimals >= source_decimals {
        let exp = u32::from(target_decimals - source_decimals);
        pow10(exp)
            .and_then(|factor| value.checked_mul(factor))
            .ok_or(NormalizeError::Overflow {
                value: raw_value,
                source_decimals,
                target_decimals,
            })
    } else {
        let exp = u32::from(source_decimals - target_decimals);
        // A divisor beyond u128 truncates every representable value to zero.
        let scaled = pow10(exp).map_or(0, |divisor| value / divisor);
        if scaled == 0 {
            return Err(NormalizeError::Underflow {
                value: raw_value,
                source_decimals,
                target_decimals,
            });
        }
        Ok(scaled)
    }
}

/// Rescale into the engine's canonical 18-decimal scale.
pub fn to_canonical(raw_value: i128, source_decimals: u8) -> Result<u128, NormalizeError> {
    normalize(raw_value, source_decimals, CANONICAL_DECIMALS)
}
