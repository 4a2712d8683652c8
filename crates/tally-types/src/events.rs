//! Events emitted by vault operations.
//!
//! The engine queues one event per successful state change; the host
//! drains the queue after each operation and forwards or persists it.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::price::OracleConfig;
use crate::AccountId;

/// Which reference price an exit was valued with.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum PricePath {
    /// Time-weighted average over the configured window.
    Twap {
        #[serde_as(as = "crate::codec::Decimal")]
        price: u128,
    },
    /// Spot price from the oracle aggregator; `degraded` when served from cache.
    Spot {
        #[serde_as(as = "crate::codec::Decimal")]
        price: u128,
        degraded: bool,
    },
    /// Last-known-good price used unconditionally by emergency exits.
    LastKnownGood {
        #[serde_as(as = "crate::codec::Decimal")]
        price: u128,
    },
    /// No oracle price available; only the pool's own ratio was used.
    InternalRatio,
}

impl PricePath {
    /// The reference price, if one was available.
    pub fn price(&self) -> Option<u128> {
        match self {
            Self::Twap { price } | Self::Spot { price, .. } | Self::LastKnownGood { price } => {
                Some(*price)
            }
            Self::InternalRatio => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Twap { .. } => "twap",
            Self::Spot { degraded: false, .. } => "spot",
            Self::Spot { degraded: true, .. } => "spot_degraded",
            Self::LastKnownGood { .. } => "last_known_good",
            Self::InternalRatio => "internal_ratio",
        }
    }
}

/// A state change recorded by the vault engine.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// Assets entered the vault in exchange for newly minted shares.
    Deposit {
        #[serde_as(as = "crate::codec::AccountHex")]
        caller: AccountId,
        #[serde_as(as = "crate::codec::AccountHex")]
        owner: AccountId,
        #[serde_as(as = "crate::codec::Decimal")]
        assets: u128,
        #[serde_as(as = "crate::codec::Decimal")]
        shares: u128,
        timestamp: u64,
    },
    /// Shares were burned and assets paid out.
    Withdraw {
        #[serde_as(as = "crate::codec::AccountHex")]
        caller: AccountId,
        #[serde_as(as = "crate::codec::AccountHex")]
        receiver: AccountId,
        #[serde_as(as = "crate::codec::AccountHex")]
        owner: AccountId,
        #[serde_as(as = "crate::codec::Decimal")]
        assets: u128,
        #[serde_as(as = "crate::codec::Decimal")]
        shares: u128,
        path: PricePath,
        timestamp: u64,
    },
    /// Assets were added without minting shares.
    Donation {
        #[serde_as(as = "crate::codec::AccountHex")]
        from: AccountId,
        #[serde_as(as = "crate::codec::Decimal")]
        assets: u128,
        timestamp: u64,
    },
    /// Shares were redeemed through the shutdown exit.
    EmergencyWithdraw {
        #[serde_as(as = "crate::codec::AccountHex")]
        owner: AccountId,
        #[serde_as(as = "crate::codec::AccountHex")]
        receiver: AccountId,
        #[serde_as(as = "crate::codec::Decimal")]
        assets: u128,
        #[serde_as(as = "crate::codec::Decimal")]
        shares: u128,
        #[serde_as(as = "crate::codec::Decimal")]
        reference_price: u128,
        timestamp: u64,
    },
    /// Emergency shutdown was switched on or off.
    ShutdownChanged {
        active: bool,
        #[serde_as(as = "crate::codec::AccountHex")]
        by: AccountId,
    },
    /// The oracle validation parameters changed.
    OracleConfigUpdated {
        config: OracleConfig,
        #[serde_as(as = "crate::codec::AccountHex")]
        by: AccountId,
    },
    /// The primary/fallback price sources were replaced.
    PriceSourcesUpdated {
        has_fallback: bool,
        #[serde_as(as = "crate::codec::AccountHex")]
        by: AccountId,
    },
    /// An operation proceeded on the last-known-good cache.
    PriceDegraded {
        #[serde_as(as = "crate::codec::Decimal")]
        price: u128,
        observed_at: u64,
        timestamp: u64,
    },
}

impl VaultEvent {
    /// Stable snake_case name of the event variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Donation { .. } => "donation",
            Self::EmergencyWithdraw { .. } => "emergency_withdraw",
            Self::ShutdownChanged { .. } => "shutdown_changed",
            Self::OracleConfigUpdated { .. } => "oracle_config_updated",
            Self::PriceSourcesUpdated { .. } => "price_sources_updated",
            Self::PriceDegraded { .. } => "price_degraded",
        }
    }
}
