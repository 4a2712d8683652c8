//! # tally-db
//!
//! SQLite persistence for the vault engine.
//! One database file per vault at `$TALLY_DATA_DIR/tally.db`.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Timestamps are Unix epoch seconds
//! - `u128` and `U256` values are stored as base-10 `TEXT`
//! - Schema version stored in `PRAGMA user_version`

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The file's schema cannot be brought to [`SCHEMA_VERSION`].
    #[error("schema migration: {0}")]
    Migration(String),

    /// A row the snapshot requires is absent.
    #[error("missing row: {0}")]
    NotFound(String),

    /// A stored value does not decode into its domain type.
    #[error("corrupt value: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open (creating if absent) the vault database at `path` and bring its
/// schema up to date.
pub fn open(path: &Path) -> Result<Connection> {
    tracing::debug!(path = %path.display(), "db: opening");
    prepare(Connection::open(path)?)
}

/// In-memory database with the full schema, for tests and dry runs.
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    // journal_mode cannot change inside a transaction, so it runs before
    // any migration step.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Parse a base-10 `TEXT` column value into `u128`.
pub(crate) fn parse_amount(column: &str, value: &str) -> Result<u128> {
    value
        .parse()
        .map_err(|e| DbError::Serialization(format!("{column} {value:?}: {e}")))
}
