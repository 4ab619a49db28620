//! [`WorkflowStateStore`] for [`SqliteStore`].
//!
//! Questions and answers live inside the `state_data` JSON document. Every
//! mutation of those lists is a read-modify-write inside one IMMEDIATE
//! transaction, so two writers on the same row serialise instead of losing
//! each other's edits.

use chrono::{DateTime, Utc};
use ontic_core::{
  RequestContext,
  store::WorkflowStateStore,
  workflow::{
    EntityKey, NewWorkflowEntityState, PendingCounts, PendingQuestion, QuestionStatus, StateData,
    WorkflowAnswer, WorkflowEntityState, WorkflowQuestion, WorkflowStatus, next_pending_question,
    pending_counts,
  },
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawState, STATE_COLUMNS, conflict_or, encode_dt, encode_uuid},
  store::SqliteStore,
};

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn select_states(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<WorkflowEntityState>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {STATE_COLUMNS} FROM workflow_entity_states WHERE {filter}
     ORDER BY entity_key, entity_type"
  ))?;
  let raws = stmt
    .query_map(params, RawState::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawState::into_state).collect()
}

fn insert_state(
  conn: &rusqlite::Connection,
  project_id: Uuid,
  input: NewWorkflowEntityState,
  now: DateTime<Utc>,
) -> Result<WorkflowEntityState> {
  let state = WorkflowEntityState {
    state_id: Uuid::new_v4(),
    project_id,
    ontology_id: input.ontology_id,
    workflow_id: input.workflow_id,
    key: input.key,
    status: input.status,
    state_data: input.state_data,
    retry_count: 0,
    last_error: None,
    created_at: now,
    updated_at: now,
  };
  let entity_type = state.key.entity_type();
  let entity_key = state.key.encode();

  conn
    .execute(
      "INSERT INTO workflow_entity_states (
         state_id, project_id, ontology_id, workflow_id, entity_type, entity_key,
         status, state_data, retry_count, last_error, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL, ?9, ?9)",
      rusqlite::params![
        encode_uuid(state.state_id),
        encode_uuid(project_id),
        encode_uuid(state.ontology_id),
        encode_uuid(state.workflow_id),
        entity_type.as_ref(),
        entity_key,
        state.status.as_ref(),
        serde_json::to_string(&state.state_data)?,
        encode_dt(now),
      ],
    )
    .map_err(|e| {
      conflict_or(e, || {
        format!("{entity_type} {entity_key:?} already registered in workflow {}", state.workflow_id)
      })
    })?;

  Ok(state)
}

/// All-or-nothing: one failing insert rolls back the batch.
fn insert_states(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  inputs: Vec<NewWorkflowEntityState>,
) -> Result<Vec<WorkflowEntityState>> {
  let tx = conn.transaction()?;
  let now = Utc::now();
  let created = inputs
    .into_iter()
    .map(|input| insert_state(&tx, project_id, input, now))
    .collect::<Result<Vec<_>>>()?;
  tx.commit()?;
  Ok(created)
}

/// Load `state_data`, apply `f`, and write the document back, all under one
/// write lock. `f` returning an error rolls the whole thing back.
fn mutate_state_data<T>(
  conn: &mut rusqlite::Connection,
  state_id: Uuid,
  project_id: Uuid,
  f: impl FnOnce(&mut StateData) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let id_str = encode_uuid(state_id);
  let project_str = encode_uuid(project_id);

  let raw: Option<String> = tx
    .query_row(
      "SELECT state_data FROM workflow_entity_states WHERE state_id = ?1 AND project_id = ?2",
      rusqlite::params![id_str, project_str],
      |r| r.get(0),
    )
    .optional()?;
  let raw = raw.ok_or(ontic_core::Error::WorkflowStateNotFound(state_id))?;

  let mut data: StateData = serde_json::from_str(&raw)?;
  let out = f(&mut data)?;

  tx.execute(
    "UPDATE workflow_entity_states SET state_data = ?1, updated_at = ?2 WHERE state_id = ?3",
    rusqlite::params![serde_json::to_string(&data)?, encode_dt(Utc::now()), id_str],
  )?;
  tx.commit()?;
  Ok(out)
}

// ─── WorkflowStateStore impl ─────────────────────────────────────────────────

impl WorkflowStateStore for SqliteStore {
  type Error = Error;

  async fn create_state(
    &self,
    ctx: &RequestContext,
    input: NewWorkflowEntityState,
  ) -> Result<WorkflowEntityState> {
    let project_id = ctx.project_id()?;
    let state = self
      .conn
      .call(move |conn| Ok(insert_state(conn, project_id, input, Utc::now())))
      .await??;

    tracing::debug!(state_id = %state.state_id, key = %state.key, "registered workflow entity state");
    Ok(state)
  }

  async fn create_states(
    &self,
    ctx: &RequestContext,
    inputs: Vec<NewWorkflowEntityState>,
  ) -> Result<Vec<WorkflowEntityState>> {
    let project_id = ctx.project_id()?;
    if inputs.is_empty() {
      return Ok(Vec::new());
    }

    let created = self
      .conn
      .call(move |conn| Ok(insert_states(conn, project_id, inputs)))
      .await??;

    tracing::debug!(%project_id, count = created.len(), "registered workflow entity states");
    Ok(created)
  }

  async fn get_state(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
  ) -> Result<Option<WorkflowEntityState>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(state_id);

    let mut found = self
      .conn
      .call(move |conn| {
        Ok(select_states(
          conn,
          "state_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        ))
      })
      .await??;

    Ok(found.pop())
  }

  async fn get_state_by_key(
    &self,
    ctx: &RequestContext,
    workflow_id: Uuid,
    key: &EntityKey,
  ) -> Result<Option<WorkflowEntityState>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let workflow_str = encode_uuid(workflow_id);
    let type_str = key.entity_type().as_ref().to_owned();
    let key_str = key.encode();

    let mut found = self
      .conn
      .call(move |conn| {
        Ok(select_states(
          conn,
          "project_id = ?1 AND workflow_id = ?2 AND entity_type = ?3 AND entity_key = ?4",
          rusqlite::params![project_str, workflow_str, type_str, key_str],
        ))
      })
      .await??;

    Ok(found.pop())
  }

  async fn list_states(
    &self,
    ctx: &RequestContext,
    workflow_id: Uuid,
  ) -> Result<Vec<WorkflowEntityState>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let workflow_str = encode_uuid(workflow_id);

    self
      .conn
      .call(move |conn| {
        Ok(select_states(
          conn,
          "project_id = ?1 AND workflow_id = ?2",
          rusqlite::params![project_str, workflow_str],
        ))
      })
      .await?
  }

  async fn list_states_by_status(
    &self,
    ctx: &RequestContext,
    workflow_id: Uuid,
    status: WorkflowStatus,
  ) -> Result<Vec<WorkflowEntityState>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let workflow_str = encode_uuid(workflow_id);
    let status_str = status.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        Ok(select_states(
          conn,
          "project_id = ?1 AND workflow_id = ?2 AND status = ?3",
          rusqlite::params![project_str, workflow_str, status_str],
        ))
      })
      .await?
  }

  async fn update_status(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
    status: WorkflowStatus,
    error: Option<String>,
  ) -> Result<()> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(state_id);
    let status_str = status.as_ref().to_owned();
    let at_str = encode_dt(Utc::now());
    let error_text = error.clone();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE workflow_entity_states
           SET status = ?1, last_error = ?2, updated_at = ?3
           WHERE state_id = ?4 AND project_id = ?5",
          rusqlite::params![status_str, error_text, at_str, id_str, project_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(ontic_core::Error::WorkflowStateNotFound(state_id).into());
    }

    if status == WorkflowStatus::Failed {
      tracing::warn!(%state_id, error = error.as_deref().unwrap_or(""), "workflow entity failed");
    } else {
      tracing::info!(%state_id, %status, "workflow entity status changed");
    }
    Ok(())
  }

  async fn update_state_data(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
    data: StateData,
  ) -> Result<()> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(state_id);
    let data_json = serde_json::to_string(&data)?;
    let at_str = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE workflow_entity_states SET state_data = ?1, updated_at = ?2
           WHERE state_id = ?3 AND project_id = ?4",
          rusqlite::params![data_json, at_str, id_str, project_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(ontic_core::Error::WorkflowStateNotFound(state_id).into());
    }
    Ok(())
  }

  async fn increment_retry_count(&self, ctx: &RequestContext, state_id: Uuid) -> Result<u32> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(state_id);
    let at_str = encode_dt(Utc::now());

    let retries: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "UPDATE workflow_entity_states
               SET retry_count = retry_count + 1, updated_at = ?1
               WHERE state_id = ?2 AND project_id = ?3
               RETURNING retry_count",
              rusqlite::params![at_str, id_str, project_str],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    let retries = retries.ok_or(ontic_core::Error::WorkflowStateNotFound(state_id))?;
    tracing::debug!(%state_id, retries, "incremented retry count");
    Ok(retries as u32)
  }

  async fn add_questions_to_entity(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
    questions: Vec<WorkflowQuestion>,
  ) -> Result<usize> {
    let project_id = ctx.project_id()?;
    if questions.is_empty() {
      return Ok(0);
    }

    let added = self
      .conn
      .call(move |conn| {
        Ok(mutate_state_data(conn, state_id, project_id, |data| Ok(data.add_questions(questions))))
      })
      .await??;

    tracing::debug!(%state_id, added, "added questions to entity");
    Ok(added)
  }

  async fn update_question_in_entity(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
    question_id: Uuid,
    status: QuestionStatus,
    answer: Option<String>,
  ) -> Result<()> {
    let project_id = ctx.project_id()?;

    self
      .conn
      .call(move |conn| {
        Ok(mutate_state_data(conn, state_id, project_id, |data| {
          if data.update_question(question_id, status, answer, Utc::now()) {
            Ok(())
          } else {
            Err(ontic_core::Error::QuestionNotFound { state_id, question_id }.into())
          }
        }))
      })
      .await?
  }

  async fn record_answer_in_entity(
    &self,
    ctx: &RequestContext,
    state_id: Uuid,
    answer: WorkflowAnswer,
  ) -> Result<()> {
    let project_id = ctx.project_id()?;

    self
      .conn
      .call(move |conn| {
        Ok(mutate_state_data(conn, state_id, project_id, |data| {
          data.record_answer(answer);
          Ok(())
        }))
      })
      .await?
  }

  async fn get_next_pending_question(
    &self,
    ctx: &RequestContext,
    workflow_id: Uuid,
  ) -> Result<Option<PendingQuestion>> {
    let states = self.list_states(ctx, workflow_id).await?;
    Ok(next_pending_question(&states))
  }

  async fn get_pending_questions_count(
    &self,
    ctx: &RequestContext,
    workflow_id: Uuid,
  ) -> Result<PendingCounts> {
    let states = self.list_states(ctx, workflow_id).await?;
    Ok(pending_counts(&states))
  }

  async fn delete_workflow_states(&self, ctx: &RequestContext, workflow_id: Uuid) -> Result<u64> {
    let project_str = encode_uuid(ctx.project_id()?);
    let workflow_str = encode_uuid(workflow_id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM workflow_entity_states WHERE project_id = ?1 AND workflow_id = ?2",
          rusqlite::params![project_str, workflow_str],
        )?)
      })
      .await?;

    tracing::info!(%workflow_id, deleted, "deleted workflow states");
    Ok(deleted as u64)
  }
}
