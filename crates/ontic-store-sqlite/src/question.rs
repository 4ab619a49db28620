//! [`QuestionStore`] for [`SqliteStore`].

use chrono::Utc;
use ontic_core::{
  RequestContext,
  question::{NewOntologyQuestion, OntologyQuestion, OntologyQuestionStatus},
  store::QuestionStore,
  workflow::PendingCounts,
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{QUESTION_COLUMNS, RawQuestion, encode_dt, encode_uuid},
  store::{SqliteStore, ontology_in_project},
};

fn select_questions(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<OntologyQuestion>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {QUESTION_COLUMNS} FROM ontology_questions WHERE {filter}
     ORDER BY priority, created_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params, RawQuestion::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawQuestion::into_question).collect()
}

/// Insert the batch in one transaction. A content hash already in the
/// ontology, or seen earlier in the batch, is skipped by `ON CONFLICT`.
fn insert_questions(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  ontology_id: Uuid,
  questions: Vec<NewOntologyQuestion>,
) -> Result<Vec<OntologyQuestion>> {
  let tx = conn.transaction()?;
  if !ontology_in_project(&tx, ontology_id, project_id)? {
    return Err(ontic_core::Error::OntologyNotFound(ontology_id).into());
  }

  let now = Utc::now();
  let project_str = encode_uuid(project_id);
  let ontology_str = encode_uuid(ontology_id);
  let at_str = encode_dt(now);

  let mut inserted = Vec::new();
  {
    let mut stmt = tx.prepare(
      "INSERT INTO ontology_questions (
         question_id, project_id, ontology_id, text, reasoning, category,
         priority, is_required, content_hash, status, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)
       ON CONFLICT (ontology_id, content_hash) DO NOTHING",
    )?;

    for input in questions {
      let question = OntologyQuestion {
        question_id: Uuid::new_v4(),
        project_id,
        ontology_id,
        content_hash: input.content_hash(),
        text: input.text,
        reasoning: input.reasoning,
        category: input.category,
        priority: input.priority,
        is_required: input.is_required,
        status: OntologyQuestionStatus::Pending,
        answer: None,
        answered_by: None,
        answered_at: None,
        created_at: now,
      };

      let changed = stmt.execute(rusqlite::params![
        encode_uuid(question.question_id),
        project_str,
        ontology_str,
        question.text,
        question.reasoning,
        question.category,
        question.priority,
        question.is_required,
        question.content_hash,
        at_str,
      ])?;
      if changed == 1 {
        inserted.push(question);
      }
    }
  }

  tx.commit()?;
  Ok(inserted)
}

impl QuestionStore for SqliteStore {
  type Error = Error;

  async fn create_questions(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
    questions: Vec<NewOntologyQuestion>,
  ) -> Result<Vec<OntologyQuestion>> {
    let project_id = ctx.project_id()?;
    let offered = questions.len();

    let inserted = self
      .conn
      .call(move |conn| Ok(insert_questions(conn, project_id, ontology_id, questions)))
      .await??;

    tracing::debug!(%ontology_id, offered, inserted = inserted.len(), "created ontology questions");
    Ok(inserted)
  }

  async fn get_question(
    &self,
    ctx: &RequestContext,
    question_id: Uuid,
  ) -> Result<Option<OntologyQuestion>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(question_id);

    let mut found = self
      .conn
      .call(move |conn| {
        Ok(select_questions(
          conn,
          "question_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        ))
      })
      .await??;

    Ok(found.pop())
  }

  async fn list_questions(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
    status: Option<OntologyQuestionStatus>,
  ) -> Result<Vec<OntologyQuestion>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);
    let status_str = status.map(|s| s.as_ref().to_owned());

    self
      .conn
      .call(move |conn| {
        Ok(select_questions(
          conn,
          "project_id = ?1 AND ontology_id = ?2 AND (?3 IS NULL OR status = ?3)",
          rusqlite::params![project_str, ontology_str, status_str],
        ))
      })
      .await?
  }

  async fn next_pending_question(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<Option<OntologyQuestion>> {
    let pending = self
      .list_questions(ctx, ontology_id, Some(OntologyQuestionStatus::Pending))
      .await?;
    Ok(pending.into_iter().next())
  }

  async fn pending_question_counts(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<PendingCounts> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    let (required, optional): (i64, i64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(SUM(is_required), 0), COALESCE(SUM(1 - is_required), 0)
           FROM ontology_questions
           WHERE project_id = ?1 AND ontology_id = ?2 AND status = 'pending'",
          rusqlite::params![project_str, ontology_str],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
      })
      .await?;

    Ok(PendingCounts { required: required as u32, optional: optional as u32 })
  }

  async fn answer_question(
    &self,
    ctx: &RequestContext,
    question_id: Uuid,
    answer: String,
  ) -> Result<OntologyQuestion> {
    let (project_id, provenance) = ctx.write_scope()?;
    let answered_by = provenance.user_id.map(encode_uuid);

    self
      .set_question_status(
        project_id,
        question_id,
        OntologyQuestionStatus::Answered,
        Some(answer),
        answered_by,
      )
      .await
  }

  async fn skip_question(
    &self,
    ctx: &RequestContext,
    question_id: Uuid,
  ) -> Result<OntologyQuestion> {
    let project_id = ctx.project_id()?;
    self
      .set_question_status(project_id, question_id, OntologyQuestionStatus::Skipped, None, None)
      .await
  }
}

impl SqliteStore {
  async fn set_question_status(
    &self,
    project_id: Uuid,
    question_id: Uuid,
    status: OntologyQuestionStatus,
    answer: Option<String>,
    answered_by: Option<String>,
  ) -> Result<OntologyQuestion> {
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(question_id);
    let status_str = status.as_ref().to_owned();
    let at_str = encode_dt(Utc::now());

    let mut found = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE ontology_questions
           SET status = ?1, answer = ?2, answered_by = ?3, answered_at = ?4
           WHERE question_id = ?5 AND project_id = ?6",
          rusqlite::params![status_str, answer, answered_by, at_str, id_str, project_str],
        )?;
        if updated == 0 {
          return Ok(Ok(Vec::new()));
        }
        Ok(select_questions(
          conn,
          "question_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        ))
      })
      .await??;

    let question =
      found.pop().ok_or(ontic_core::Error::OntologyQuestionNotFound(question_id))?;
    tracing::debug!(%question_id, %status, "resolved ontology question");
    Ok(question)
  }
}
