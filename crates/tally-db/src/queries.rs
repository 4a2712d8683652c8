//! Database query functions organized by domain.

pub mod balances;
pub mod events;
pub mod snapshot;

use rusqlite::Connection;
use tally_types::events::VaultEvent;
use tally_types::vault::VaultSnapshot;
use tally_types::AccountId;

use crate::Result;

/// Persist the outcome of one vault operation: its events, the vault
/// snapshot and the full share ledger, committed together or not at all.
///
/// The snapshot's `total_shares` and the stored balances therefore always
/// agree, whichever step a crash interrupts.
pub fn record_step(
    conn: &mut Connection,
    at: u64,
    emitted: &[VaultEvent],
    snapshot: &VaultSnapshot,
    balances: &[(AccountId, u128)],
) -> Result<()> {
    let tx = conn.transaction()?;
    for event in emitted {
        events::append(&tx, event, at)?;
    }
    snapshot::save(&tx, snapshot, at)?;
    balances::save_all(&tx, balances)?;
    tx.commit()?;
    Ok(())
}
