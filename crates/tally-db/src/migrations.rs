//! Forward-only schema migrations.
//!
//! Each entry in [`STEPS`] produces exactly one schema version and runs in
//! its own transaction together with the `user_version` bump, so a crash
//! mid-upgrade leaves the file at the last completed version.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Migration steps, ordered by the version each one produces.
const STEPS: &[(u32, &str)] = &[(1, schema::SCHEMA_V1)];

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn run(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "file is at schema v{found}, this build only understands up to v{SCHEMA_VERSION}"
        )));
    }

    for &(version, sql) in STEPS.iter().filter(|(v, _)| *v > found) {
        tracing::info!(from = found, to = version, "db: applying schema step");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}
