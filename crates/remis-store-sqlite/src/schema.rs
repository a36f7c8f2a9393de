//! SQL schema for the Remis SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Exactly one row: the latest full-state document.
CREATE TABLE IF NOT EXISTS snapshot (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    document    TEXT NOT NULL,   -- JSON, see remis_core::snapshot::Snapshot
    written_at  TEXT NOT NULL    -- RFC 3339 UTC
);
";
