//! Share/asset conversions.
//!
//! Every conversion rounds in the vault's favor:
//!
//! | Operation  | Computes | Formula                       | Rounding |
//! |------------|----------|-------------------------------|----------|
//! | `deposit`  | shares   | `assets * TS / TA`            | down     |
//! | `mint`     | assets   | `shares * TA / TS`            | up       |
//! | `withdraw` | shares   | `assets * TS / TA`            | up       |
//! | `redeem`   | assets   | `shares * TA / TS`            | down     |
//!
//! An empty vault (`TA == TS == 0`) converts 1:1. Products are formed in
//! 256 bits so `u128` totals never overflow mid-computation; only a result
//! that itself exceeds `u128::MAX` is an error.

use ethnum::U256;
use tally_types::vault::VaultState;
use tally_types::PRICE_SCALE;

use crate::{Result, VaultError};

/// Rounding direction of a division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Away from zero.
    Up,
}

/// `a * b / denominator` with a 256-bit intermediate.
///
/// Returns `None` if `denominator == 0` or the quotient exceeds `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != U256::ZERO {
        quotient += U256::ONE;
    }
    let (high, low) = quotient.into_words();
    (high == 0).then_some(low)
}

fn convert(
    state: &VaultState,
    amount: u128,
    assets_to_shares: bool,
    rounding: Rounding,
) -> Result<u128> {
    if !state.is_consistent() {
        return Err(VaultError::CorruptState {
            total_assets: state.total_assets,
            total_shares: state.total_shares,
        });
    }
    if state.is_empty() {
        return Ok(amount);
    }
    let (numerator, denominator) = if assets_to_shares {
        (state.total_shares, state.total_assets)
    } else {
        (state.total_assets, state.total_shares)
    };
    mul_div(amount, numerator, denominator, rounding).ok_or(VaultError::Overflow)
}

/// Shares minted for depositing `assets` (rounds down).
///
/// # Errors
///
/// - [`VaultError::CorruptState`] if exactly one total is zero
/// - [`VaultError::Overflow`] if the result exceeds `u128`
pub fn shares_for_deposit(state: &VaultState, assets: u128) -> Result<u128> {
    convert(state, assets, true, Rounding::Down)
}

/// Assets required to mint exactly `shares` (rounds up).
///
/// # Errors
///
/// - [`VaultError::CorruptState`] if exactly one total is zero
/// - [`VaultError::Overflow`] if the result exceeds `u128`
pub fn assets_for_mint(state: &VaultState, shares: u128) -> Result<u128> {
    convert(state, shares, false, Rounding::Up)
}

/// Shares burned to withdraw exactly `assets` (rounds up).
///
/// # Errors
///
/// - [`VaultError::CorruptState`] if exactly one total is zero
/// - [`VaultError::Overflow`] if the result exceeds `u128`
pub fn shares_for_withdraw(state: &VaultState, assets: u128) -> Result<u128> {
    convert(state, assets, true, Rounding::Up)
}

/// Assets paid for redeeming `shares` (rounds down).
///
/// # Errors
///
/// - [`VaultError::CorruptState`] if exactly one total is zero
/// - [`VaultError::Overflow`] if the result exceeds `u128`
pub fn assets_for_redeem(state: &VaultState, shares: u128) -> Result<u128> {
    convert(state, shares, false, Rounding::Down)
}

/// Quote-currency value of `assets` at a canonical 18-decimal `price`.
///
/// `None` if the value does not fit in `u128`.
pub fn quote_value(assets: u128, price: u128) -> Option<u128> {
    mul_div(assets, price, PRICE_SCALE, Rounding::Down)
}
