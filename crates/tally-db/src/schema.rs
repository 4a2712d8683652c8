//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Vault totals and oracle state (single-row tables)
-- ============================================================

CREATE TABLE IF NOT EXISTS vault_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_assets TEXT NOT NULL,
    total_shares TEXT NOT NULL,
    shutdown INTEGER NOT NULL DEFAULT 0,
    twap_capacity INTEGER NOT NULL,
    saved_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS oracle_config (
    id INTEGER PRIMARY KEY CHECK (id = 1) REFERENCES vault_state(id) ON DELETE CASCADE,
    max_staleness_seconds INTEGER NOT NULL,
    max_deviation_bps INTEGER NOT NULL,
    min_price TEXT NOT NULL,
    max_price TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS last_known_good (
    id INTEGER PRIMARY KEY CHECK (id = 1) REFERENCES vault_state(id) ON DELETE CASCADE,
    price TEXT NOT NULL,
    observed_at INTEGER NOT NULL
);

-- Oldest first by seq.
CREATE TABLE IF NOT EXISTS twap_observations (
    seq INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL UNIQUE,
    price TEXT NOT NULL,
    cumulative_price TEXT NOT NULL
);

-- ============================================================
-- Share ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS share_balances (
    account BLOB PRIMARY KEY CHECK (length(account) = 32),
    shares TEXT NOT NULL
);

-- ============================================================
-- Event log
-- ============================================================

CREATE TABLE IF NOT EXISTS event_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_log_type ON event_log(event_type);
"#;
