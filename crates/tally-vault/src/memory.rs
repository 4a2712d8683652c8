//! In-memory collaborators.
//!
//! Used by the simulation host and tests. Balances live in hash maps; the
//! vault's own asset holdings are a separate counter so a test can compare
//! them against `total_assets`.

use std::collections::{HashMap, HashSet};

use tally_types::AccountId;

use crate::collab::{AccessControl, AssetTransfer, ShareLedger};
use crate::{LedgerError, TransferError};

/// Asset balances of external accounts plus the vault's holdings.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetBook {
    balances: HashMap<AccountId, u128>,
    vault_balance: u128,
    frozen: HashSet<AccountId>,
}

impl MemoryAssetBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `account` additional assets out of thin air.
    pub fn fund(&mut self, account: AccountId, amount: u128) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Assets held by `account`.
    pub fn balance_of(&self, account: AccountId) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Assets held by the vault.
    pub fn vault_balance(&self) -> u128 {
        self.vault_balance
    }

    /// Set the vault's holdings directly, e.g. to `total_assets` of a
    /// restored snapshot.
    pub fn set_vault_balance(&mut self, amount: u128) {
        self.vault_balance = amount;
    }

    /// Refuse every transfer touching `account` until unfrozen.
    pub fn set_frozen(&mut self, account: AccountId, frozen: bool) {
        if frozen {
            self.frozen.insert(account);
        } else {
            self.frozen.remove(&account);
        }
    }

    fn check_frozen(&self, account: AccountId) -> Result<(), TransferError> {
        if self.frozen.contains(&account) {
            return Err(TransferError::Rejected(format!(
                "account {} is frozen",
                hex::encode(&account[..4])
            )));
        }
        Ok(())
    }
}

impl AssetTransfer for MemoryAssetBook {
    fn transfer_in(&mut self, from: AccountId, amount: u128) -> Result<(), TransferError> {
        self.check_frozen(from)?;
        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        let vault_balance = self
            .vault_balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("vault balance overflow".into()))?;
        self.balances.insert(from, available - amount);
        self.vault_balance = vault_balance;
        Ok(())
    }

    fn transfer_out(&mut self, to: AccountId, amount: u128) -> Result<(), TransferError> {
        self.check_frozen(to)?;
        if self.vault_balance < amount {
            return Err(TransferError::InsufficientFunds {
                required: amount,
                available: self.vault_balance,
            });
        }
        self.vault_balance -= amount;
        self.fund(to, amount);
        Ok(())
    }
}

/// Share balances, allowances and total supply.
///
/// An allowance of `u128::MAX` is unlimited and never decremented.
#[derive(Debug, Clone, Default)]
pub struct MemoryShareLedger {
    balances: HashMap<AccountId, u128>,
    allowances: HashMap<(AccountId, AccountId), u128>,
    total_supply: u128,
}

impl MemoryShareLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted balances. Allowances are not persisted.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] if the balances sum past `u128::MAX`
    pub fn from_balances(
        balances: impl IntoIterator<Item = (AccountId, u128)>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for (owner, amount) in balances {
            ledger.mint(owner, amount)?;
        }
        Ok(ledger)
    }

    /// Non-zero balances sorted by account.
    pub fn export_balances(&self) -> Vec<(AccountId, u128)> {
        let mut balances: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(owner, amount)| (*owner, *amount))
            .collect();
        balances.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        balances
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

impl ShareLedger for MemoryShareLedger {
    fn mint(&mut self, owner: AccountId, amount: u128) -> Result<(), LedgerError> {
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let balance = self.balance_of(owner);
        // Every balance is bounded by total supply.
        self.balances.insert(owner, balance + amount);
        self.total_supply = total_supply;
        Ok(())
    }

    fn burn(&mut self, owner: AccountId, amount: u128) -> Result<(), LedgerError> {
        let available = self.balance_of(owner);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        self.balances.insert(owner, available - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn balance_of(&self, owner: AccountId) -> u128 {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: AccountId, spender: AccountId) -> u128 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&mut self, owner: AccountId, spender: AccountId, amount: u128) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    fn spend_allowance(
        &mut self,
        owner: AccountId,
        spender: AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let available = self.allowance(owner, spender);
        if available == u128::MAX {
            return Ok(());
        }
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                required: amount,
                available,
            });
        }
        self.approve(owner, spender, available - amount);
        Ok(())
    }
}

/// A fixed set of administrator accounts.
#[derive(Debug, Clone, Default)]
pub struct AdminSet {
    admins: HashSet<AccountId>,
}

impl AdminSet {
    /// Create a set from the given administrators.
    pub fn new(admins: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    /// Grant the administrative role.
    pub fn add(&mut self, account: AccountId) {
        self.admins.insert(account);
    }

    /// Revoke the administrative role.
    pub fn remove(&mut self, account: AccountId) {
        self.admins.remove(&account);
    }
}

impl AccessControl for AdminSet {
    fn is_admin(&self, account: AccountId) -> bool {
        self.admins.contains(&account)
    }
}
