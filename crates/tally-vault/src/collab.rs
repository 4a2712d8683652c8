//! Collaborator seams.
//!
//! The engine owns the accounting; moving tokens, tracking share balances
//! and deciding who is privileged belong to the host. Each concern is one
//! trait so a host can back it with a token contract, a database or the
//! in-memory types in [`crate::memory`].

use tally_types::AccountId;

use crate::{LedgerError, TransferError};

/// Moves underlying assets between accounts and the vault.
pub trait AssetTransfer {
    /// Pull `amount` from `from` into the vault.
    fn transfer_in(&mut self, from: AccountId, amount: u128) -> Result<(), TransferError>;

    /// Push `amount` from the vault to `to`.
    fn transfer_out(&mut self, to: AccountId, amount: u128) -> Result<(), TransferError>;
}

/// Share balances and allowances.
pub trait ShareLedger {
    /// Credit `amount` shares to `owner`.
    fn mint(&mut self, owner: AccountId, amount: u128) -> Result<(), LedgerError>;

    /// Debit `amount` shares from `owner`.
    fn burn(&mut self, owner: AccountId, amount: u128) -> Result<(), LedgerError>;

    /// Shares held by `owner`.
    fn balance_of(&self, owner: AccountId) -> u128;

    /// Shares `spender` may burn on behalf of `owner`.
    fn allowance(&self, owner: AccountId, spender: AccountId) -> u128;

    /// Set the allowance of `spender` over `owner`'s shares.
    fn approve(&mut self, owner: AccountId, spender: AccountId, amount: u128);

    /// Consume `amount` of `spender`'s allowance over `owner`'s shares.
    fn spend_allowance(
        &mut self,
        owner: AccountId,
        spender: AccountId,
        amount: u128,
    ) -> Result<(), LedgerError>;
}

/// Decides who may change vault configuration.
pub trait AccessControl {
    /// Whether `account` holds the administrative role.
    fn is_admin(&self, account: AccountId) -> bool;
}
