//! Scenario replay.
//!
//! Steps are applied strictly in order, each under the vault lock. A failed
//! step is logged and recorded in the summary; replay continues with the
//! next step.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_with::serde_as;
use tally_types::account_from_label;
use tally_types::codec;
use tally_vault::VaultError;

use crate::config::Step;
use crate::host::{SharedVault, SimVault, StepSink};

/// A step that returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    /// Position in the scenario.
    pub index: usize,
    /// Step action.
    pub action: String,
    /// Rendered error.
    pub error: String,
    /// Whether retrying later could succeed.
    pub transient: bool,
}

/// Outcome of a replay, printed as JSON.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Steps attempted.
    pub steps: usize,
    /// Steps that succeeded.
    pub succeeded: usize,
    /// Steps that failed.
    pub failed: Vec<FailedStep>,
    /// Exit valuations by price path label.
    pub price_paths: BTreeMap<String, u64>,
    /// Events emitted.
    pub events: usize,
    /// Final asset total.
    #[serde_as(as = "codec::Decimal")]
    pub total_assets: u128,
    /// Final share total.
    #[serde_as(as = "codec::Decimal")]
    pub total_shares: u128,
    /// Final shutdown flag.
    pub shutdown: bool,
}

/// What a successful step produced, for the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Plain,
    Exit(&'static str),
}

fn apply(vault: &mut SimVault, step: &Step) -> Result<Applied, VaultError> {
    match step {
        Step::Deposit {
            at,
            caller,
            receiver,
            assets,
        } => {
            let caller = account_from_label(caller);
            let receiver = receiver.as_deref().map_or(caller, account_from_label);
            vault.deposit(caller, receiver, *assets, *at)?;
            Ok(Applied::Plain)
        }
        Step::Mint {
            at,
            caller,
            receiver,
            shares,
        } => {
            let caller = account_from_label(caller);
            let receiver = receiver.as_deref().map_or(caller, account_from_label);
            vault.mint(caller, receiver, *shares, *at)?;
            Ok(Applied::Plain)
        }
        Step::Withdraw {
            at,
            caller,
            owner,
            receiver,
            assets,
        } => {
            let caller = account_from_label(caller);
            let owner = owner.as_deref().map_or(caller, account_from_label);
            let receiver = receiver.as_deref().map_or(caller, account_from_label);
            let receipt = vault.withdraw(caller, receiver, owner, *assets, *at)?;
            Ok(Applied::Exit(receipt.path.label()))
        }
        Step::Redeem {
            at,
            caller,
            owner,
            receiver,
            shares,
        } => {
            let caller = account_from_label(caller);
            let owner = owner.as_deref().map_or(caller, account_from_label);
            let receiver = receiver.as_deref().map_or(caller, account_from_label);
            let receipt = vault.redeem(caller, receiver, owner, *shares, *at)?;
            Ok(Applied::Exit(receipt.path.label()))
        }
        Step::Donate { at, from, assets } => {
            vault.donate(account_from_label(from), *assets, *at)?;
            Ok(Applied::Plain)
        }
        Step::Shutdown { caller, active, .. } => {
            vault.set_emergency_shutdown(account_from_label(caller), *active)?;
            Ok(Applied::Plain)
        }
        Step::EmergencyWithdraw {
            at,
            owner,
            receiver,
            shares,
        } => {
            let owner = account_from_label(owner);
            let receiver = receiver.as_deref().map_or(owner, account_from_label);
            let receipt = vault.emergency_withdraw(owner, receiver, *shares, *at)?;
            Ok(Applied::Exit(receipt.path.label()))
        }
        Step::Price { at } => {
            let price = vault.spot_price(*at)?;
            tracing::info!(
                price = price.price,
                tier = ?price.tier,
                observed_at = price.observed_at,
                "sim: oracle price"
            );
            Ok(Applied::Plain)
        }
    }
}

/// Replay `steps` against `vault`, handing each step's effects to `sink`.
///
/// # Errors
///
/// Only sink failures abort the replay; step failures are collected in the
/// summary.
pub async fn run(
    vault: &SharedVault,
    steps: &[Step],
    sink: &mut dyn StepSink,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();

    for (index, step) in steps.iter().enumerate() {
        let mut guard = vault.lock().await;
        summary.steps += 1;

        match apply(&mut guard, step) {
            Ok(applied) => {
                summary.succeeded += 1;
                if let Applied::Exit(label) = applied {
                    *summary.price_paths.entry(label.to_string()).or_default() += 1;
                }
                tracing::debug!(index, action = step.action(), "sim: step applied");
            }
            Err(e) => {
                tracing::warn!(index, action = step.action(), error = %e, "sim: step failed");
                summary.failed.push(FailedStep {
                    index,
                    action: step.action().to_string(),
                    error: e.to_string(),
                    transient: e.is_transient(),
                });
            }
        }

        let events = guard.drain_events();
        summary.events += events.len();
        sink.record(
            step.at(),
            &events,
            &guard.snapshot(),
            &guard.ledger().export_balances(),
        )?;
    }

    let guard = vault.lock().await;
    summary.total_assets = guard.total_assets();
    summary.total_shares = guard.total_shares();
    summary.shutdown = guard.is_shutdown();
    if guard.ledger().total_supply() != guard.total_shares() {
        tracing::error!(
            ledger = guard.ledger().total_supply(),
            total_shares = guard.total_shares(),
            "sim: share ledger out of sync with vault totals"
        );
    }
    Ok(summary)
}
