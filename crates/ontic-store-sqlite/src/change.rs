//! [`PendingChangeStore`] for [`SqliteStore`].

use chrono::{DateTime, Utc};
use ontic_core::{
  RequestContext,
  change::{ChangeStatus, ChangeStatusCounts, ChangeType, NewPendingChange, PendingChange},
  store::PendingChangeStore,
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{CHANGE_COLUMNS, RawChange, decode_enum, encode_dt, encode_json, encode_uuid},
  store::SqliteStore,
};

fn select_changes(
  conn: &rusqlite::Connection,
  filter: &str,
  limit: Option<usize>,
  params: impl rusqlite::Params,
) -> Result<Vec<PendingChange>> {
  // SQLite treats a negative LIMIT as "no limit".
  let limit = limit.map_or(-1, |n| n as i64);
  let mut stmt = conn.prepare(&format!(
    "SELECT {CHANGE_COLUMNS} FROM pending_changes WHERE {filter}
     ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
  ))?;
  let raws = stmt
    .query_map(params, RawChange::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawChange::into_change).collect()
}

fn select_change(
  conn: &rusqlite::Connection,
  change_id: &str,
  project_id: &str,
) -> Result<Option<PendingChange>> {
  let mut found = select_changes(
    conn,
    "change_id = ?1 AND project_id = ?2",
    None,
    rusqlite::params![change_id, project_id],
  )?;
  Ok(found.pop())
}

fn insert_change(
  conn: &rusqlite::Connection,
  project_id: Uuid,
  input: NewPendingChange,
  now: DateTime<Utc>,
) -> Result<PendingChange> {
  let change = PendingChange {
    change_id: Uuid::new_v4(),
    project_id,
    change_type: input.change_type,
    change_source: input.change_source,
    table_name: input.table_name,
    column_name: input.column_name,
    old_value: input.old_value,
    new_value: input.new_value,
    suggested_action: input.suggested_action,
    suggested_payload: input.suggested_payload,
    status: ChangeStatus::Pending,
    reviewed_by: None,
    reviewed_at: None,
    created_at: now,
  };

  conn.execute(
    "INSERT INTO pending_changes (
       change_id, project_id, change_type, change_source, table_name, column_name,
       old_value, new_value, suggested_action, suggested_payload, status, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11)",
    rusqlite::params![
      encode_uuid(change.change_id),
      encode_uuid(project_id),
      change.change_type.as_ref(),
      change.change_source.as_ref(),
      change.table_name,
      change.column_name,
      encode_json(change.old_value.as_ref()),
      encode_json(change.new_value.as_ref()),
      change.suggested_action.map(|a| a.to_string()),
      encode_json(change.suggested_payload.as_ref()),
      encode_dt(now),
    ],
  )?;

  Ok(change)
}

fn insert_changes(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  inputs: Vec<NewPendingChange>,
) -> Result<Vec<PendingChange>> {
  let tx = conn.transaction()?;
  let now = Utc::now();
  let created = inputs
    .into_iter()
    .map(|input| insert_change(&tx, project_id, input, now))
    .collect::<Result<Vec<_>>>()?;
  tx.commit()?;
  Ok(created)
}

/// One-way transition out of `pending`.
fn review(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  change_id: Uuid,
  status: ChangeStatus,
  reviewed_by: String,
) -> Result<PendingChange> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let id_str = encode_uuid(change_id);
  let project_str = encode_uuid(project_id);

  let current: Option<String> = tx
    .query_row(
      "SELECT status FROM pending_changes WHERE change_id = ?1 AND project_id = ?2",
      rusqlite::params![id_str, project_str],
      |r| r.get(0),
    )
    .optional()?;
  let current: ChangeStatus = match current {
    Some(s) => decode_enum("change status", &s)?,
    None => return Err(ontic_core::Error::PendingChangeNotFound(change_id).into()),
  };
  if current != ChangeStatus::Pending {
    return Err(ontic_core::Error::AlreadyReviewed(change_id).into());
  }

  tx.execute(
    "UPDATE pending_changes SET status = ?1, reviewed_by = ?2, reviewed_at = ?3
     WHERE change_id = ?4",
    rusqlite::params![status.as_ref(), reviewed_by, encode_dt(Utc::now()), id_str],
  )?;

  let change = select_change(&tx, &id_str, &project_str)?
    .ok_or(ontic_core::Error::PendingChangeNotFound(change_id))?;
  tx.commit()?;
  Ok(change)
}

impl PendingChangeStore for SqliteStore {
  type Error = Error;

  async fn create_change(
    &self,
    ctx: &RequestContext,
    input: NewPendingChange,
  ) -> Result<PendingChange> {
    let project_id = ctx.project_id()?;
    let change = self
      .conn
      .call(move |conn| Ok(insert_change(conn, project_id, input, Utc::now())))
      .await??;

    tracing::debug!(
      change_id = %change.change_id,
      change_type = %change.change_type,
      "recorded pending change"
    );
    Ok(change)
  }

  async fn create_changes(
    &self,
    ctx: &RequestContext,
    inputs: Vec<NewPendingChange>,
  ) -> Result<Vec<PendingChange>> {
    let project_id = ctx.project_id()?;
    if inputs.is_empty() {
      return Ok(Vec::new());
    }

    let created = self
      .conn
      .call(move |conn| Ok(insert_changes(conn, project_id, inputs)))
      .await??;

    tracing::debug!(%project_id, count = created.len(), "recorded pending changes");
    Ok(created)
  }

  async fn get_change(
    &self,
    ctx: &RequestContext,
    change_id: Uuid,
  ) -> Result<Option<PendingChange>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(change_id);

    self
      .conn
      .call(move |conn| Ok(select_change(conn, &id_str, &project_str)))
      .await?
  }

  async fn list_changes(
    &self,
    ctx: &RequestContext,
    status: Option<ChangeStatus>,
    limit: Option<usize>,
  ) -> Result<Vec<PendingChange>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let status_str = status.map(|s| s.as_ref().to_owned());

    self
      .conn
      .call(move |conn| {
        Ok(select_changes(
          conn,
          "project_id = ?1 AND (?2 IS NULL OR status = ?2)",
          limit,
          rusqlite::params![project_str, status_str],
        ))
      })
      .await?
  }

  async fn list_changes_by_type(
    &self,
    ctx: &RequestContext,
    change_type: ChangeType,
    limit: Option<usize>,
  ) -> Result<Vec<PendingChange>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let type_str = change_type.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        Ok(select_changes(
          conn,
          "project_id = ?1 AND change_type = ?2",
          limit,
          rusqlite::params![project_str, type_str],
        ))
      })
      .await?
  }

  async fn review_change(
    &self,
    ctx: &RequestContext,
    change_id: Uuid,
    status: ChangeStatus,
    reviewed_by: String,
  ) -> Result<PendingChange> {
    let project_id = ctx.project_id()?;
    if !status.is_review_outcome() {
      return Err(ontic_core::Error::InvalidReviewStatus(status.to_string()).into());
    }

    let change = self
      .conn
      .call(move |conn| Ok(review(conn, project_id, change_id, status, reviewed_by)))
      .await??;

    tracing::info!(
      %change_id,
      %status,
      reviewed_by = change.reviewed_by.as_deref().unwrap_or(""),
      "reviewed pending change"
    );
    Ok(change)
  }

  async fn count_changes_by_status(&self, ctx: &RequestContext) -> Result<ChangeStatusCounts> {
    let project_str = encode_uuid(ctx.project_id()?);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT status, COUNT(*) FROM pending_changes WHERE project_id = ?1 GROUP BY status",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![project_str], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = ChangeStatusCounts::default();
    for (status, n) in rows {
      let n = n as u64;
      match decode_enum::<ChangeStatus>("change status", &status)? {
        ChangeStatus::Pending => counts.pending = n,
        ChangeStatus::Approved => counts.approved = n,
        ChangeStatus::Rejected => counts.rejected = n,
      }
    }
    Ok(counts)
  }

  async fn delete_changes_by_project(&self, ctx: &RequestContext) -> Result<u64> {
    let project_id = ctx.project_id()?;
    let project_str = encode_uuid(project_id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM pending_changes WHERE project_id = ?1",
          rusqlite::params![project_str],
        )?)
      })
      .await?;

    tracing::info!(%project_id, deleted, "deleted pending changes");
    Ok(deleted as u64)
  }
}
