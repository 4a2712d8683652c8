//! Vault event log.

use rusqlite::Connection;
use tally_types::events::VaultEvent;

use crate::Result;

/// A stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    /// Insertion order.
    pub id: i64,
    /// The event.
    pub event: VaultEvent,
    /// When the host recorded it.
    pub recorded_at: u64,
}

/// Append an event and return its id.
pub fn append(conn: &Connection, event: &VaultEvent, recorded_at: u64) -> Result<i64> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO event_log (event_type, payload, recorded_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![event.event_type(), payload, recorded_at as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The most recent `limit` events, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, payload, recorded_at FROM event_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, payload, recorded_at)| {
            Ok(EventRow {
                id,
                event: serde_json::from_str(&payload)?,
                recorded_at: recorded_at as u64,
            })
        })
        .collect()
}

/// Number of stored events of one type.
pub fn count_by_type(conn: &Connection, event_type: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
        [event_type],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
