//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identities (
    identity_id      TEXT PRIMARY KEY,
    platform         TEXT NOT NULL,   -- Platform, lowercase
    platform_id      TEXT NOT NULL,
    username         TEXT NOT NULL,
    display_name     TEXT,
    created_at       TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    -- Folded search keys, maintained alongside username/display_name.
    search_username  TEXT NOT NULL,
    search_user_key  TEXT NOT NULL,
    search_display   TEXT NOT NULL,
    search_disp_key  TEXT NOT NULL,
    UNIQUE (platform, platform_id)
);

-- One row per identity per calendar day.
-- No CHECK on the metrics: the sweeper has to be able to find bad rows.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id  TEXT PRIMARY KEY,
    identity_id  TEXT NOT NULL REFERENCES identities(identity_id),
    recorded_at  TEXT NOT NULL,       -- YYYY-MM-DD in the operating zone
    subscribers  INTEGER,
    total_views  INTEGER,
    total_posts  INTEGER,
    ingested_at  TEXT NOT NULL,       -- ISO 8601 UTC; server-assigned
    UNIQUE (identity_id, recorded_at)
);

-- Named leases shared by every process using this file.
CREATE TABLE IF NOT EXISTS leases (
    name        TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    expires_at  INTEGER NOT NULL      -- unix milliseconds
);

CREATE INDEX IF NOT EXISTS identities_username_idx ON identities(platform, username);
CREATE INDEX IF NOT EXISTS identities_created_idx  ON identities(created_at);

PRAGMA user_version = 2;
";
