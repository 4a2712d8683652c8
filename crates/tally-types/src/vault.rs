//! Vault totals and the persisted snapshot form.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::price::{LastKnownGood, OracleConfig, PriceObservation};

/// Authoritative internal accounting of a vault.
///
/// `total_assets` is never derived from a token balance: donations reach
/// it only through an explicit accounting operation.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Underlying assets attributed to share holders.
    #[serde_as(as = "crate::codec::Decimal")]
    pub total_assets: u128,
    /// Shares outstanding.
    #[serde_as(as = "crate::codec::Decimal")]
    pub total_shares: u128,
}

impl VaultState {
    /// Both totals are zero: the next deposit bootstraps at 1:1.
    pub fn is_empty(&self) -> bool {
        self.total_assets == 0 && self.total_shares == 0
    }

    /// `total_shares == 0` if and only if `total_assets == 0`.
    pub fn is_consistent(&self) -> bool {
        (self.total_shares == 0) == (self.total_assets == 0)
    }
}

/// TWAP ring contents in chronological order (oldest first).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapSnapshot {
    /// Ring capacity.
    pub capacity: usize,
    /// Retained observations, oldest first. Never longer than `capacity`.
    pub observations: Vec<PriceObservation>,
}

/// Everything a host must persist to rebuild a vault engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Asset and share totals.
    pub state: VaultState,
    /// Emergency shutdown flag.
    pub shutdown: bool,
    /// Active oracle configuration.
    pub oracle_config: OracleConfig,
    /// Last-known-good price cache.
    pub last_known_good: LastKnownGood,
    /// TWAP history.
    pub twap: TwapSnapshot,
}
