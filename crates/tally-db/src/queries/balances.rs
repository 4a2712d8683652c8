//! Share balance persistence.

use rusqlite::Connection;
use tally_types::AccountId;

use crate::{parse_amount, DbError, Result};

/// Replace every stored balance with `balances`. Zero balances are not
/// stored. Run inside the caller's transaction.
pub fn save_all(tx: &Connection, balances: &[(AccountId, u128)]) -> Result<()> {
    tx.execute("DELETE FROM share_balances", [])?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO share_balances (account, shares) VALUES (?1, ?2)")?;
        for (account, shares) in balances.iter().filter(|(_, shares)| *shares > 0) {
            stmt.execute(rusqlite::params![account.as_slice(), shares.to_string()])?;
        }
    }
    Ok(())
}

/// All stored balances, ordered by account.
pub fn load_all(conn: &Connection) -> Result<Vec<(AccountId, u128)>> {
    let mut stmt = conn.prepare("SELECT account, shares FROM share_balances ORDER BY account")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(account, shares)| {
            let account: AccountId = account.as_slice().try_into().map_err(|_| {
                DbError::Serialization(format!("account of length {}", account.len()))
            })?;
            Ok((account, parse_amount("shares", &shares)?))
        })
        .collect()
}
