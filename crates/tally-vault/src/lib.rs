//! # tally-vault
//!
//! Share accounting for a single-asset tokenized vault.
//!
//! Depositors exchange assets for shares at the pool's internal ratio
//! `total_assets / total_shares`, rounding every conversion in the vault's
//! favor. External prices never enter the share formula: deposits consult
//! the oracle only as a health gate, and exits record which reference
//! price (TWAP, spot, last-known-good, or none) valued them.
//!
//! ## Modules
//!
//! - [`shares`] — Wide-intermediate share/asset conversions
//! - [`collab`] — Asset transfer, share ledger and access control seams
//! - [`memory`] — In-memory collaborators for tests and simulation
//! - [`accounting`] — The vault engine

pub mod accounting;
pub mod collab;
pub mod memory;
pub mod shares;

pub use accounting::{DepositReceipt, ExitReceipt, VaultAccounting, VaultConfig};
pub use collab::{AccessControl, AssetTransfer, ShareLedger};

use tally_oracle::OracleError;

/// An asset movement was refused by the asset book.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The paying account holds fewer assets than requested.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount requested.
        required: u128,
        /// Amount held.
        available: u128,
    },

    /// The counterparty refused the transfer.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// A share ledger operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Burn exceeds the owner's balance.
    #[error("insufficient share balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Shares requested.
        required: u128,
        /// Shares held.
        available: u128,
    },

    /// Spend exceeds the granted allowance.
    #[error("insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance {
        /// Shares requested.
        required: u128,
        /// Shares approved.
        available: u128,
    },

    /// A balance or supply would exceed `u128::MAX`.
    #[error("share ledger overflow")]
    Overflow,
}

/// Error types for vault operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// The requested amount is zero.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// A deposit would mint zero shares.
    #[error("deposit of {assets} assets mints zero shares")]
    ZeroShares {
        /// Assets offered.
        assets: u128,
    },

    /// A redemption would pay out zero assets.
    #[error("redeeming {shares} shares yields zero assets")]
    ZeroAssets {
        /// Shares offered.
        shares: u128,
    },

    /// The owner holds fewer shares than the operation burns.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Shares the operation burns.
        required: u128,
        /// Shares available.
        available: u128,
    },

    /// The caller's allowance from the owner does not cover the burn.
    #[error("insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance {
        /// Shares the operation burns.
        required: u128,
        /// Shares approved to the caller.
        available: u128,
    },

    /// Deposits and mints are blocked by emergency shutdown.
    #[error("vault is in emergency shutdown")]
    ShutdownActive,

    /// Emergency withdrawal requires an active shutdown.
    #[error("vault is not in emergency shutdown")]
    ShutdownInactive,

    /// Donations need existing share holders to accrue to.
    #[error("vault has no shares outstanding")]
    EmptyVault,

    /// The caller lacks the administrative role.
    #[error("caller is not authorized")]
    Unauthorized,

    /// Exactly one of the totals is zero.
    #[error("corrupt vault state: total_assets {total_assets}, total_shares {total_shares}")]
    CorruptState {
        /// Recorded assets.
        total_assets: u128,
        /// Recorded shares.
        total_shares: u128,
    },

    /// A conversion or total does not fit in `u128`.
    #[error("arithmetic overflow")]
    Overflow,

    /// The oracle health gate failed.
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    /// The asset book refused a transfer.
    #[error("asset transfer: {0}")]
    Transfer(#[from] TransferError),

    /// The share ledger refused an operation.
    #[error("share ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl VaultError {
    /// Whether retrying later may succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Oracle(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_errors_transient() {
        let degraded = VaultError::from(OracleError::Degraded {
            price: 1,
            observed_at: 2,
        });
        assert!(degraded.is_transient());
        assert!(!VaultError::ShutdownActive.is_transient());
        assert!(!VaultError::ZeroShares { assets: 1 }.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = VaultError::InsufficientBalance {
            required: 10,
            available: 3,
        };
        assert_eq!(err.to_string(), "insufficient balance: required 10, available 3");
        let err = VaultError::from(TransferError::Rejected("frozen".into()));
        assert_eq!(err.to_string(), "asset transfer: transfer rejected: frozen");
    }
}
