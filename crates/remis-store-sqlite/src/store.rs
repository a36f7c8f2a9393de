//! [`SqliteStore`], the SQLite implementation of [`SnapshotStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use remis_core::snapshot::{Snapshot, SnapshotStore};

use crate::{Error, Result, schema::SCHEMA};

/// Snapshot storage in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// When the current snapshot was written, if there is one.
  pub async fn written_at(&self) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row("SELECT written_at FROM snapshot WHERE id = 1", [], |row| row.get(0))
            .optional()?,
        )
      })
      .await?;
    raw.map(|s| decode_dt(&s)).transpose()
  }
}

fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s}: {e}")))
}

// ─── SnapshotStore impl ──────────────────────────────────────────────────────

impl SnapshotStore for SqliteStore {
  type Error = Error;

  async fn load(&self) -> Result<Option<Snapshot>> {
    let document: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row("SELECT document FROM snapshot WHERE id = 1", [], |row| row.get(0))
            .optional()?,
        )
      })
      .await?;
    document
      .map(|doc| serde_json::from_str(&doc).map_err(Error::from))
      .transpose()
  }

  async fn save(&self, snapshot: &Snapshot) -> Result<()> {
    let document = serde_json::to_string(snapshot)?;
    let written_at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO snapshot (id, document, written_at) VALUES (1, ?1, ?2)
           ON CONFLICT(id) DO UPDATE SET
             document = excluded.document,
             written_at = excluded.written_at",
          rusqlite::params![document, written_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

#[cfg(test)]
impl SqliteStore {
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }
}
