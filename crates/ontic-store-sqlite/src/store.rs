//! [`SqliteStore`], the SQLite implementation of the Ontic store traits.
//!
//! The trait impls live next to their domain: `ontology.rs`, `workflow.rs`,
//! `question.rs` and `change.rs`. This module owns the connection and the
//! small lookups they share.

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{Result, encode::encode_uuid, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Ontic store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    tracing::debug!(path = %path.display(), "opening sqlite store");
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
}

// ─── Shared lookups ──────────────────────────────────────────────────────────
//
// These run inside `Connection::call` closures, usually within a transaction,
// so they take a plain `rusqlite::Connection` (a `Transaction` derefs to one).

/// Whether `ontology_id` exists and belongs to `project_id`.
pub(crate) fn ontology_in_project(
  conn: &rusqlite::Connection,
  ontology_id: Uuid,
  project_id: Uuid,
) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM ontologies WHERE ontology_id = ?1 AND project_id = ?2",
        rusqlite::params![encode_uuid(ontology_id), encode_uuid(project_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Whether `entity_id` exists (live or soft-deleted) in `project_id`.
pub(crate) fn entity_in_project(
  conn: &rusqlite::Connection,
  entity_id: Uuid,
  project_id: Uuid,
) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM entities WHERE entity_id = ?1 AND project_id = ?2",
        rusqlite::params![encode_uuid(entity_id), encode_uuid(project_id)],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}
