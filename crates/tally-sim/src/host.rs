//! Vault construction and persistence for the simulation host.

use std::sync::Arc;

use anyhow::Context;
use rusqlite::Connection;
use tally_oracle::{OracleAggregator, PriceSource};
use tally_types::events::VaultEvent;
use tally_types::vault::VaultSnapshot;
use tally_types::{account_from_label, AccountId};
use tally_vault::memory::{AdminSet, MemoryAssetBook, MemoryShareLedger};
use tally_vault::VaultAccounting;
use tokio::sync::Mutex;

use crate::config::SimConfig;
use crate::feed::ScheduledSource;

/// The engine wired to in-memory collaborators.
pub type SimVault = VaultAccounting<MemoryAssetBook, MemoryShareLedger, AdminSet>;

/// One vault behind one lock; every step runs under it.
pub type SharedVault = Arc<Mutex<SimVault>>;

/// Receives the effects of each applied step.
pub trait StepSink {
    /// Persist or forward the state after a step at `at`.
    fn record(
        &mut self,
        at: u64,
        events: &[VaultEvent],
        snapshot: &VaultSnapshot,
        balances: &[(AccountId, u128)],
    ) -> anyhow::Result<()>;
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl StepSink for NullSink {
    fn record(
        &mut self,
        _at: u64,
        _events: &[VaultEvent],
        _snapshot: &VaultSnapshot,
        _balances: &[(AccountId, u128)],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes events, snapshot and balances to the vault database, one
/// transaction per step.
pub struct DbSink {
    conn: Connection,
}

impl DbSink {
    /// Wrap an open connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl StepSink for DbSink {
    fn record(
        &mut self,
        at: u64,
        events: &[VaultEvent],
        snapshot: &VaultSnapshot,
        balances: &[(AccountId, u128)],
    ) -> anyhow::Result<()> {
        tally_db::queries::record_step(&mut self.conn, at, events, snapshot, balances)
            .with_context(|| format!("persisting step at {at}"))?;
        Ok(())
    }
}

fn sources(config: &SimConfig) -> (Box<dyn PriceSource>, Option<Box<dyn PriceSource>>) {
    let primary: Box<dyn PriceSource> =
        Box::new(ScheduledSource::new("primary", config.feed.primary.clone()));
    let fallback = ScheduledSource::new("fallback", config.feed.fallback.clone());
    let fallback: Option<Box<dyn PriceSource>> = if fallback.is_empty() {
        None
    } else {
        Some(Box::new(fallback))
    };
    (primary, fallback)
}

fn admins(config: &SimConfig) -> AdminSet {
    AdminSet::new(config.access.admins.iter().map(|name| account_from_label(name)))
}

fn funded_book(config: &SimConfig) -> MemoryAssetBook {
    let mut book = MemoryAssetBook::new();
    for account in &config.accounts {
        book.fund(account_from_label(&account.name), account.balance);
    }
    book
}

/// Build a fresh, empty vault from configuration.
pub fn build_vault(config: &SimConfig) -> anyhow::Result<SimVault> {
    let (primary, fallback) = sources(config);
    let oracle = OracleAggregator::with_capacity(
        config.oracle.clone(),
        primary,
        fallback,
        config.vault.twap_capacity,
    )?;
    Ok(VaultAccounting::new(
        config.vault.clone(),
        oracle,
        funded_book(config),
        MemoryShareLedger::new(),
        admins(config),
    ))
}

/// Rebuild a vault from a stored snapshot and share balances.
///
/// External account balances are not persisted; they restart from the
/// configured funding.
pub fn restore_vault(
    config: &SimConfig,
    snapshot: &VaultSnapshot,
    balances: Vec<(AccountId, u128)>,
) -> anyhow::Result<SimVault> {
    let (primary, fallback) = sources(config);
    let ledger = MemoryShareLedger::from_balances(balances)?;
    if ledger.total_supply() != snapshot.state.total_shares {
        anyhow::bail!(
            "stored balances sum to {} shares but the snapshot records {}",
            ledger.total_supply(),
            snapshot.state.total_shares
        );
    }
    let mut book = funded_book(config);
    book.set_vault_balance(snapshot.state.total_assets);
    Ok(VaultAccounting::restore(
        config.vault.clone(),
        snapshot,
        primary,
        fallback,
        book,
        ledger,
        admins(config),
    )?)
}

/// Restore the vault stored in `conn`, or build a fresh one.
pub fn open_vault(config: &SimConfig, conn: &Connection) -> anyhow::Result<SimVault> {
    match tally_db::queries::snapshot::load(conn).context("loading snapshot")? {
        Some(snapshot) => {
            let balances =
                tally_db::queries::balances::load_all(conn).context("loading balances")?;
            restore_vault(config, &snapshot, balances)
        }
        None => {
            tracing::info!("sim: no stored snapshot, starting empty vault");
            build_vault(config)
        }
    }
}

/// Wrap a vault in the shared handle.
pub fn share(vault: SimVault) -> SharedVault {
    Arc::new(Mutex::new(vault))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_vault::ShareLedger;

    fn config() -> SimConfig {
        SimConfig::parse(
            r#"
            [access]
            admins = ["admin"]

            [[account]]
            name = "alice"
            balance = 5000

            [[feed.primary]]
            at = 100
            price = 2000_00000000
            "#,
        )
        .expect("config")
    }

    #[test]
    fn test_build_vault_funds_accounts() {
        let vault = build_vault(&config()).expect("build");
        assert_eq!(vault.assets().balance_of(account_from_label("alice")), 5000);
        assert!(!vault.oracle().has_fallback());
        assert!(vault.state().is_empty());
    }

    #[test]
    fn test_db_roundtrip() {
        let config = config();
        let alice = account_from_label("alice");
        let mut vault = build_vault(&config).expect("build");
        vault.deposit(alice, alice, 1_000, 100).expect("deposit");

        let mut sink = DbSink::new(tally_db::open_memory().expect("db"));
        let events = vault.drain_events();
        sink.record(100, &events, &vault.snapshot(), &vault.ledger().export_balances())
            .expect("record");

        let restored = open_vault(&config, sink.connection()).expect("restore");
        assert_eq!(restored.state(), vault.state());
        assert_eq!(restored.ledger().balance_of(alice), 1_000);
        assert_eq!(restored.assets().vault_balance(), 1_000);
        let stored = tally_db::queries::events::recent(sink.connection(), 10).expect("events");
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_failed_persist_keeps_database_reopenable() {
        let config = config();
        let alice = account_from_label("alice");
        let mut vault = build_vault(&config).expect("build");
        let mut sink = DbSink::new(tally_db::open_memory().expect("db"));

        vault.deposit(alice, alice, 1_000, 100).expect("deposit");
        let events = vault.drain_events();
        sink.record(100, &events, &vault.snapshot(), &vault.ledger().export_balances())
            .expect("record");

        // Share balance writes start failing after the first step.
        sink.connection()
            .execute_batch(
                "CREATE TRIGGER fail_balances BEFORE INSERT ON share_balances
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .expect("trigger");
        vault.deposit(alice, alice, 500, 100).expect("second deposit");
        let events = vault.drain_events();
        assert!(sink
            .record(100, &events, &vault.snapshot(), &vault.ledger().export_balances())
            .is_err());

        let restored = open_vault(&config, sink.connection()).expect("still restorable");
        assert_eq!(restored.total_shares(), 1_000);
        assert_eq!(restored.ledger().balance_of(alice), 1_000);
        let stored = tally_db::queries::events::recent(sink.connection(), 10).expect("events");
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_restore_rejects_mismatched_balances() {
        let config = config();
        let mut vault = build_vault(&config).expect("build");
        let alice = account_from_label("alice");
        vault.deposit(alice, alice, 1_000, 100).expect("deposit");
        let err = restore_vault(&config, &vault.snapshot(), vec![(alice, 999)]);
        assert!(err.is_err());
    }
}
