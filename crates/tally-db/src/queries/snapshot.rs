//! Vault snapshot persistence.
//!
//! A snapshot spans four tables. [`save`] does not open a transaction of
//! its own; [`crate::queries::record_step`] writes it together with the
//! share balances and events so a crash mid-save leaves the previous
//! state intact.

use rusqlite::{Connection, OptionalExtension};
use tally_types::codec::parse_wide;
use tally_types::price::{LastKnownGood, OracleConfig, PriceObservation};
use tally_types::vault::{TwapSnapshot, VaultSnapshot, VaultState};

use crate::{parse_amount, DbError, Result};

/// Replace the stored snapshot. Run inside the caller's transaction.
pub fn save(tx: &Connection, snapshot: &VaultSnapshot, saved_at: u64) -> Result<()> {
    tx.execute(
        "INSERT INTO vault_state (id, total_assets, total_shares, shutdown, twap_capacity, saved_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             total_assets = excluded.total_assets,
             total_shares = excluded.total_shares,
             shutdown = excluded.shutdown,
             twap_capacity = excluded.twap_capacity,
             saved_at = excluded.saved_at",
        rusqlite::params![
            snapshot.state.total_assets.to_string(),
            snapshot.state.total_shares.to_string(),
            snapshot.shutdown,
            snapshot.twap.capacity as i64,
            saved_at as i64,
        ],
    )?;

    let config = &snapshot.oracle_config;
    tx.execute(
        "INSERT INTO oracle_config (id, max_staleness_seconds, max_deviation_bps, min_price, max_price)
         VALUES (1, ?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             max_staleness_seconds = excluded.max_staleness_seconds,
             max_deviation_bps = excluded.max_deviation_bps,
             min_price = excluded.min_price,
             max_price = excluded.max_price",
        rusqlite::params![
            config.max_staleness_seconds as i64,
            config.max_deviation_bps,
            config.min_price.to_string(),
            config.max_price.to_string(),
        ],
    )?;

    tx.execute(
        "INSERT INTO last_known_good (id, price, observed_at)
         VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET
             price = excluded.price,
             observed_at = excluded.observed_at",
        rusqlite::params![
            snapshot.last_known_good.price.to_string(),
            snapshot.last_known_good.observed_at as i64,
        ],
    )?;

    tx.execute("DELETE FROM twap_observations", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO twap_observations (seq, timestamp, price, cumulative_price)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (seq, obs) in snapshot.twap.observations.iter().enumerate() {
            stmt.execute(rusqlite::params![
                seq as i64,
                obs.timestamp as i64,
                obs.price.to_string(),
                obs.cumulative_price.to_string(),
            ])?;
        }
    }

    tracing::debug!(
        total_assets = snapshot.state.total_assets,
        total_shares = snapshot.state.total_shares,
        observations = snapshot.twap.observations.len(),
        "db: snapshot saved"
    );
    Ok(())
}

/// Load the stored snapshot, `None` if nothing was ever saved.
pub fn load(conn: &Connection) -> Result<Option<VaultSnapshot>> {
    let row = conn
        .query_row(
            "SELECT total_assets, total_shares, shutdown, twap_capacity FROM vault_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((total_assets, total_shares, shutdown, capacity)) = row else {
        return Ok(None);
    };

    let state = VaultState {
        total_assets: parse_amount("total_assets", &total_assets)?,
        total_shares: parse_amount("total_shares", &total_shares)?,
    };

    let oracle_config = conn
        .query_row(
            "SELECT max_staleness_seconds, max_deviation_bps, min_price, max_price
             FROM oracle_config WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound("oracle_config row".into()))?;
    let oracle_config = OracleConfig {
        max_staleness_seconds: oracle_config.0 as u64,
        max_deviation_bps: oracle_config.1,
        min_price: parse_amount("min_price", &oracle_config.2)?,
        max_price: parse_amount("max_price", &oracle_config.3)?,
    };

    let last_known_good = conn
        .query_row(
            "SELECT price, observed_at FROM last_known_good WHERE id = 1",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?
        .map(|(price, observed_at)| -> Result<LastKnownGood> {
            Ok(LastKnownGood {
                price: parse_amount("last_known_good.price", &price)?,
                observed_at: observed_at as u64,
            })
        })
        .transpose()?
        .unwrap_or_default();

    let mut stmt = conn.prepare(
        "SELECT timestamp, price, cumulative_price FROM twap_observations ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let observations = rows
        .into_iter()
        .map(|(timestamp, price, cumulative)| {
            Ok(PriceObservation {
                timestamp: timestamp as u64,
                price: parse_amount("twap.price", &price)?,
                cumulative_price: parse_wide(&cumulative).ok_or_else(|| {
                    DbError::Serialization(format!("twap.cumulative_price {cumulative:?}"))
                })?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(VaultSnapshot {
        state,
        shutdown,
        oracle_config,
        last_known_good,
        twap: TwapSnapshot {
            capacity: usize::try_from(capacity)
                .map_err(|_| DbError::Serialization(format!("twap_capacity {capacity}")))?,
            observations,
        },
    }))
}
