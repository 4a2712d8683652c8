//! Vault engine.
//!
//! [`VaultAccounting`] owns the authoritative totals, the oracle aggregator
//! and the three collaborators. Every operation validates its input and
//! computes the resulting totals before touching a collaborator; if a
//! collaborator then fails, earlier collaborator steps are undone so the
//! totals, ledger and asset book move together or not at all.
//!
//! ```text
//! deposit/mint   zero? ─ shutdown? ─ math ─ oracle gate ─ transfer_in ─ mint
//! withdraw/redeem zero? ─ math ─ balance/allowance ─ price path ─ spend ─ burn ─ transfer_out
//! ```

use serde::{Deserialize, Serialize};
use tally_oracle::{OracleAggregator, PriceSource, ValidatedPrice};
use tally_types::events::{PricePath, VaultEvent};
use tally_types::price::OracleConfig;
use tally_types::vault::{VaultSnapshot, VaultState};
use tally_types::{AccountId, DEFAULT_TWAP_CAPACITY};

use crate::collab::{AccessControl, AssetTransfer, ShareLedger};
use crate::shares;
use crate::{Result, VaultError};

/// Default TWAP window used to value exits (30 minutes).
pub const DEFAULT_TWAP_WINDOW_SECS: u64 = 1800;

/// Per-instance vault parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Trailing window for the exit reference price.
    pub twap_window_seconds: u64,
    /// Accept deposits while the oracle only serves its cache.
    pub allow_degraded_deposits: bool,
    /// Slots in the TWAP ring buffer.
    pub twap_capacity: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            twap_window_seconds: DEFAULT_TWAP_WINDOW_SECS,
            allow_degraded_deposits: false,
            twap_capacity: DEFAULT_TWAP_CAPACITY,
        }
    }
}

/// Result of a deposit or mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositReceipt {
    /// Assets pulled from the caller.
    pub assets: u128,
    /// Shares minted to the receiver.
    pub shares: u128,
    /// Price that passed the oracle health gate.
    pub gate_price: ValidatedPrice,
}

/// Result of a withdraw, redeem or emergency withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReceipt {
    /// Assets paid to the receiver.
    pub assets: u128,
    /// Shares burned from the owner.
    pub shares: u128,
    /// Reference price used to value the exit.
    pub path: PricePath,
    /// `assets * price / 10^18`, if a reference price existed and the
    /// value fits in `u128`.
    pub quote_value: Option<u128>,
}

impl ExitReceipt {
    fn new(assets: u128, shares: u128, path: PricePath) -> Self {
        Self {
            assets,
            shares,
            path,
            quote_value: path.price().and_then(|p| shares::quote_value(assets, p)),
        }
    }
}

/// Single-asset vault accounting engine.
#[derive(Debug)]
pub struct VaultAccounting<T, L, C> {
    config: VaultConfig,
    state: VaultState,
    shutdown: bool,
    oracle: OracleAggregator,
    assets: T,
    ledger: L,
    access: C,
    events: Vec<VaultEvent>,
}

impl<T, L, C> VaultAccounting<T, L, C>
where
    T: AssetTransfer,
    L: ShareLedger,
    C: AccessControl,
{
    /// Create an empty vault.
    pub fn new(
        config: VaultConfig,
        oracle: OracleAggregator,
        assets: T,
        ledger: L,
        access: C,
    ) -> Self {
        Self {
            config,
            state: VaultState::default(),
            shutdown: false,
            oracle,
            assets,
            ledger,
            access,
            events: Vec::new(),
        }
    }

    /// Rebuild a vault from a persisted snapshot.
    ///
    /// The collaborators must already reflect the balances that were live
    /// when the snapshot was taken.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] if the snapshot totals are one-sided
    /// - [`VaultError::Oracle`] if the oracle config or TWAP history is invalid
    pub fn restore(
        config: VaultConfig,
        snapshot: &VaultSnapshot,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
        assets: T,
        ledger: L,
        access: C,
    ) -> Result<Self> {
        if !snapshot.state.is_consistent() {
            return Err(VaultError::CorruptState {
                total_assets: snapshot.state.total_assets,
                total_shares: snapshot.state.total_shares,
            });
        }
        let oracle = OracleAggregator::from_snapshot(
            snapshot.oracle_config.clone(),
            snapshot.last_known_good,
            &snapshot.twap,
            primary,
            fallback,
        )?;
        tracing::info!(
            total_assets = snapshot.state.total_assets,
            total_shares = snapshot.state.total_shares,
            shutdown = snapshot.shutdown,
            "vault: restored from snapshot"
        );
        Ok(Self {
            config,
            state: snapshot.state,
            shutdown: snapshot.shutdown,
            oracle,
            assets,
            ledger,
            access,
            events: Vec::new(),
        })
    }

    /// Everything needed to rebuild this vault.
    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            state: self.state,
            shutdown: self.shutdown,
            oracle_config: self.oracle.config().clone(),
            last_known_good: self.oracle.last_known_good(),
            twap: self.oracle.twap().snapshot(),
        }
    }

    // ---- Deposits ----

    /// Deposit exactly `assets` from `caller`, minting shares to `receiver`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `assets == 0`
    /// - [`VaultError::ShutdownActive`] during emergency shutdown
    /// - [`VaultError::ZeroShares`] if the deposit is too small to mint a share
    /// - [`VaultError::Oracle`] if the health gate fails
    /// - [`VaultError::Transfer`] / [`VaultError::Ledger`] on collaborator failure
    pub fn deposit(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        assets: u128,
        now: u64,
    ) -> Result<DepositReceipt> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_open()?;
        let shares = shares::shares_for_deposit(&self.state, assets)?;
        if shares == 0 {
            return Err(VaultError::ZeroShares { assets });
        }
        self.execute_deposit(caller, receiver, assets, shares, now)
    }

    /// Mint exactly `shares` to `receiver`, pulling the required assets from
    /// `caller`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `shares == 0`
    /// - [`VaultError::ShutdownActive`] during emergency shutdown
    /// - [`VaultError::Oracle`] if the health gate fails
    /// - [`VaultError::Transfer`] / [`VaultError::Ledger`] on collaborator failure
    pub fn mint(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        shares: u128,
        now: u64,
    ) -> Result<DepositReceipt> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_open()?;
        let assets = shares::assets_for_mint(&self.state, shares)?;
        self.execute_deposit(caller, receiver, assets, shares, now)
    }

    fn execute_deposit(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        assets: u128,
        shares: u128,
        now: u64,
    ) -> Result<DepositReceipt> {
        let next = VaultState {
            total_assets: self
                .state
                .total_assets
                .checked_add(assets)
                .ok_or(VaultError::Overflow)?,
            total_shares: self
                .state
                .total_shares
                .checked_add(shares)
                .ok_or(VaultError::Overflow)?,
        };

        let gate_price = self.health_gate(now)?;

        self.assets.transfer_in(caller, assets)?;
        if let Err(e) = self.ledger.mint(receiver, shares) {
            self.refund(caller, assets);
            return Err(e.into());
        }

        self.state = next;
        self.events.push(VaultEvent::Deposit {
            caller,
            owner: receiver,
            assets,
            shares,
            timestamp: now,
        });
        tracing::info!(
            assets,
            shares,
            total_assets = self.state.total_assets,
            total_shares = self.state.total_shares,
            "vault: deposit accepted"
        );
        Ok(DepositReceipt {
            assets,
            shares,
            gate_price,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutdown {
            return Err(VaultError::ShutdownActive);
        }
        Ok(())
    }

    fn health_gate(&mut self, now: u64) -> Result<ValidatedPrice> {
        let price = self.oracle.get_validated_price(now)?;
        if price.is_degraded() {
            // Recorded even when the deposit is then refused.
            self.record_degraded(price, now);
            if !self.config.allow_degraded_deposits {
                price.require_fresh()?;
            }
        }
        Ok(price)
    }

    fn refund(&mut self, caller: AccountId, assets: u128) {
        if let Err(e) = self.assets.transfer_out(caller, assets) {
            tracing::error!(error = %e, assets, "vault: refund after failed mint did not complete");
        }
    }

    // ---- Exits ----

    /// Burn shares from `owner` to pay exactly `assets` to `receiver`.
    ///
    /// When the burn covers the entire supply the receiver gets all of
    /// `total_assets`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `assets == 0`
    /// - [`VaultError::InsufficientBalance`] if the owner's shares do not cover the burn
    /// - [`VaultError::InsufficientAllowance`] if `caller != owner` and the allowance is short
    /// - [`VaultError::Transfer`] / [`VaultError::Ledger`] on collaborator failure
    pub fn withdraw(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        owner: AccountId,
        assets: u128,
        now: u64,
    ) -> Result<ExitReceipt> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let shares = shares::shares_for_withdraw(&self.state, assets)?;
        let payout = if shares == self.state.total_shares {
            self.state.total_assets
        } else {
            assets
        };
        self.execute_exit(caller, receiver, owner, payout, shares, now)
    }

    /// Burn exactly `shares` from `owner`, paying the assets to `receiver`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `shares == 0`
    /// - [`VaultError::ZeroAssets`] if the shares are worth less than one asset unit
    /// - [`VaultError::InsufficientBalance`] if the owner's shares do not cover the burn
    /// - [`VaultError::InsufficientAllowance`] if `caller != owner` and the allowance is short
    /// - [`VaultError::Transfer`] / [`VaultError::Ledger`] on collaborator failure
    pub fn redeem(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        owner: AccountId,
        shares: u128,
        now: u64,
    ) -> Result<ExitReceipt> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let assets = shares::assets_for_redeem(&self.state, shares)?;
        if assets == 0 {
            return Err(VaultError::ZeroAssets { shares });
        }
        self.execute_exit(caller, receiver, owner, assets, shares, now)
    }

    fn execute_exit(
        &mut self,
        caller: AccountId,
        receiver: AccountId,
        owner: AccountId,
        assets: u128,
        shares: u128,
        now: u64,
    ) -> Result<ExitReceipt> {
        let next = self.state_after_exit(owner, assets, shares)?;
        let allowance = if caller == owner {
            None
        } else {
            let available = self.ledger.allowance(owner, caller);
            if available < shares {
                return Err(VaultError::InsufficientAllowance {
                    required: shares,
                    available,
                });
            }
            Some(available)
        };

        let path = self.resolve_exit_price(now);

        if let Some(previous) = allowance {
            self.ledger.spend_allowance(owner, caller, shares)?;
            if let Err(e) = self.burn_and_pay(owner, receiver, assets, shares) {
                self.ledger.approve(owner, caller, previous);
                return Err(e);
            }
        } else {
            self.burn_and_pay(owner, receiver, assets, shares)?;
        }

        self.state = next;
        self.events.push(VaultEvent::Withdraw {
            caller,
            receiver,
            owner,
            assets,
            shares,
            path,
            timestamp: now,
        });
        tracing::info!(
            assets,
            shares,
            path = path.label(),
            total_assets = self.state.total_assets,
            total_shares = self.state.total_shares,
            "vault: exit completed"
        );
        Ok(ExitReceipt::new(assets, shares, path))
    }

    /// Totals after burning `shares` from `owner` and paying `assets`.
    fn state_after_exit(&self, owner: AccountId, assets: u128, shares: u128) -> Result<VaultState> {
        let available = self.ledger.balance_of(owner);
        if available < shares || shares > self.state.total_shares {
            return Err(VaultError::InsufficientBalance {
                required: shares,
                available: available.min(self.state.total_shares),
            });
        }
        let next = VaultState {
            total_assets: self
                .state
                .total_assets
                .checked_sub(assets)
                .ok_or(VaultError::Overflow)?,
            total_shares: self.state.total_shares - shares,
        };
        if !next.is_consistent() {
            return Err(VaultError::CorruptState {
                total_assets: next.total_assets,
                total_shares: next.total_shares,
            });
        }
        Ok(next)
    }

    fn burn_and_pay(
        &mut self,
        owner: AccountId,
        receiver: AccountId,
        assets: u128,
        shares: u128,
    ) -> Result<()> {
        self.ledger.burn(owner, shares)?;
        if let Err(e) = self.assets.transfer_out(receiver, assets) {
            if let Err(remint) = self.ledger.mint(owner, shares) {
                tracing::error!(error = %remint, shares, "vault: re-mint after failed payout did not complete");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// TWAP, then validated spot (degraded accepted), then the internal
    /// ratio alone. Never fails.
    fn resolve_exit_price(&mut self, now: u64) -> PricePath {
        match self.oracle.twap_price(self.config.twap_window_seconds, now) {
            Ok(price) => return PricePath::Twap { price },
            Err(e) => tracing::debug!(error = %e, "vault: TWAP unavailable for exit"),
        }
        match self.oracle.get_validated_price(now) {
            Ok(price) => {
                let degraded = price.is_degraded();
                if degraded {
                    self.record_degraded(price, now);
                }
                PricePath::Spot {
                    price: price.price,
                    degraded,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "vault: no oracle price, exit valued at internal ratio");
                PricePath::InternalRatio
            }
        }
    }

    fn record_degraded(&mut self, price: ValidatedPrice, now: u64) {
        self.events.push(VaultEvent::PriceDegraded {
            price: price.price,
            observed_at: price.observed_at,
            timestamp: now,
        });
    }

    // ---- Emergency ----

    /// Redeem `shares` at the internal ratio while the vault is shut down.
    ///
    /// No price source is called. The exit is valued at the cached
    /// last-known-good price regardless of its age.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ShutdownInactive`] if shutdown is not active
    /// - [`VaultError::ZeroAmount`] if `shares == 0`
    /// - [`VaultError::ZeroAssets`] if the shares are worth less than one asset unit
    /// - [`VaultError::InsufficientBalance`] if the owner's shares do not cover the burn
    /// - [`VaultError::Transfer`] / [`VaultError::Ledger`] on collaborator failure
    pub fn emergency_withdraw(
        &mut self,
        owner: AccountId,
        receiver: AccountId,
        shares: u128,
        now: u64,
    ) -> Result<ExitReceipt> {
        if !self.shutdown {
            return Err(VaultError::ShutdownInactive);
        }
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let assets = shares::assets_for_redeem(&self.state, shares)?;
        if assets == 0 {
            return Err(VaultError::ZeroAssets { shares });
        }
        let next = self.state_after_exit(owner, assets, shares)?;

        let reference = self.oracle.last_known_good();
        let path = if reference.is_set() {
            PricePath::LastKnownGood {
                price: reference.price,
            }
        } else {
            PricePath::InternalRatio
        };

        self.burn_and_pay(owner, receiver, assets, shares)?;

        self.state = next;
        self.events.push(VaultEvent::EmergencyWithdraw {
            owner,
            receiver,
            assets,
            shares,
            reference_price: reference.price,
            timestamp: now,
        });
        tracing::warn!(
            assets,
            shares,
            reference_price = reference.price,
            "vault: emergency withdrawal"
        );
        Ok(ExitReceipt::new(assets, shares, path))
    }

    // ---- Donations ----

    /// Add `assets` to the pool without minting shares.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] if `assets == 0`
    /// - [`VaultError::EmptyVault`] if no shares are outstanding
    /// - [`VaultError::Transfer`] if the asset book refuses
    pub fn donate(&mut self, from: AccountId, assets: u128, now: u64) -> Result<()> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if self.state.total_shares == 0 {
            return Err(VaultError::EmptyVault);
        }
        let total_assets = self
            .state
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::Overflow)?;

        self.assets.transfer_in(from, assets)?;
        self.state.total_assets = total_assets;
        self.events.push(VaultEvent::Donation {
            from,
            assets,
            timestamp: now,
        });
        tracing::info!(assets, total_assets, "vault: donation received");
        Ok(())
    }

    // ---- Administration ----

    fn authorize(&self, caller: AccountId) -> Result<()> {
        if !self.access.is_admin(caller) {
            tracing::warn!(caller = %hex::encode(caller), "vault: unauthorized admin call");
            return Err(VaultError::Unauthorized);
        }
        Ok(())
    }

    /// Replace the oracle validation parameters.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] if `caller` is not an admin
    /// - [`VaultError::Oracle`] if the configuration is invalid
    pub fn update_oracle_config(&mut self, caller: AccountId, config: OracleConfig) -> Result<()> {
        self.authorize(caller)?;
        self.oracle.update_config(config.clone())?;
        self.events
            .push(VaultEvent::OracleConfigUpdated { config, by: caller });
        Ok(())
    }

    /// Switch emergency shutdown on or off.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] if `caller` is not an admin
    pub fn set_emergency_shutdown(&mut self, caller: AccountId, active: bool) -> Result<()> {
        self.authorize(caller)?;
        if self.shutdown != active {
            tracing::warn!(active, "vault: emergency shutdown toggled");
        }
        self.shutdown = active;
        self.events
            .push(VaultEvent::ShutdownChanged { active, by: caller });
        Ok(())
    }

    /// Replace the primary and fallback price sources.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] if `caller` is not an admin
    pub fn update_price_sources(
        &mut self,
        caller: AccountId,
        primary: Box<dyn PriceSource>,
        fallback: Option<Box<dyn PriceSource>>,
    ) -> Result<()> {
        self.authorize(caller)?;
        let has_fallback = fallback.is_some();
        self.oracle.update_sources(primary, fallback);
        self.events.push(VaultEvent::PriceSourcesUpdated {
            has_fallback,
            by: caller,
        });
        Ok(())
    }

    // ---- Previews and views ----

    /// Shares [`deposit`](Self::deposit) would mint right now.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn preview_deposit(&self, assets: u128) -> Result<u128> {
        shares::shares_for_deposit(&self.state, assets)
    }

    /// Assets [`mint`](Self::mint) would pull right now.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn preview_mint(&self, shares: u128) -> Result<u128> {
        shares::assets_for_mint(&self.state, shares)
    }

    /// Shares [`withdraw`](Self::withdraw) would burn right now.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn preview_withdraw(&self, assets: u128) -> Result<u128> {
        shares::shares_for_withdraw(&self.state, assets)
    }

    /// Assets [`redeem`](Self::redeem) would pay right now.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn preview_redeem(&self, shares: u128) -> Result<u128> {
        shares::assets_for_redeem(&self.state, shares)
    }

    /// Shares worth `assets` at the current ratio, rounded down.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn convert_to_shares(&self, assets: u128) -> Result<u128> {
        shares::shares_for_deposit(&self.state, assets)
    }

    /// Assets worth `shares` at the current ratio, rounded down.
    ///
    /// # Errors
    ///
    /// - [`VaultError::CorruptState`] / [`VaultError::Overflow`]
    pub fn convert_to_assets(&self, shares: u128) -> Result<u128> {
        shares::assets_for_redeem(&self.state, shares)
    }

    /// Largest deposit currently accepted.
    pub fn max_deposit(&self) -> u128 {
        if self.shutdown {
            return 0;
        }
        u128::MAX - self.state.total_assets
    }

    /// Largest mint currently accepted.
    pub fn max_mint(&self) -> u128 {
        if self.shutdown {
            return 0;
        }
        u128::MAX - self.state.total_shares
    }

    /// Assets `owner` can withdraw with their whole balance.
    pub fn max_withdraw(&self, owner: AccountId) -> u128 {
        let balance = self.max_redeem(owner);
        if balance == self.state.total_shares {
            return self.state.total_assets;
        }
        shares::assets_for_redeem(&self.state, balance).unwrap_or(0)
    }

    /// Shares `owner` can redeem.
    pub fn max_redeem(&self, owner: AccountId) -> u128 {
        self.ledger.balance_of(owner).min(self.state.total_shares)
    }

    /// Underlying assets under management.
    pub fn total_assets(&self) -> u128 {
        self.state.total_assets
    }

    /// Shares outstanding.
    pub fn total_shares(&self) -> u128 {
        self.state.total_shares
    }

    /// Both totals.
    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Whether emergency shutdown is active.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Vault parameters.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The price oracle.
    pub fn oracle(&self) -> &OracleAggregator {
        &self.oracle
    }

    /// Query the oracle tiers directly.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Oracle`] if every tier fails
    pub fn spot_price(&mut self, now: u64) -> Result<ValidatedPrice> {
        Ok(self.oracle.get_validated_price(now)?)
    }

    /// TWAP over the configured exit window.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Oracle`] if history does not cover the window
    pub fn twap_price(&mut self, now: u64) -> Result<u128> {
        Ok(self
            .oracle
            .twap_price(self.config.twap_window_seconds, now)?)
    }

    /// The asset book.
    pub fn assets(&self) -> &T {
        &self.assets
    }

    /// Mutable access to the asset book.
    pub fn assets_mut(&mut self) -> &mut T {
        &mut self.assets
    }

    /// The share ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable access to the share ledger, e.g. to grant allowances.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Take all events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }
}
