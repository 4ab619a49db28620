//! Workflow entity state: the per-table / per-column record a discovery run
//! keeps while it scans, analyses and asks for clarification.
//!
//! Questions and answers live inside each state's `state_data` document
//! rather than in their own table. The mutation helpers on [`StateData`] and
//! the selection functions at the bottom of this module are the single source
//! of truth for how that embedded queue behaves; storage backends only load
//! and persist the document around them.

use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, question::content_hash};

// ─── Entity key ──────────────────────────────────────────────────────────────

/// Granularity of a workflow entity state. Declaration order is the
/// tie-break order used by [`next_pending_question`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Global,
  Table,
  Column,
}

/// Workflow-scoped identity of the thing a state tracks.
///
/// Encoded as `""` (global), `"<table>"` or `"<table>.<column>"`. Column keys
/// split at the last `.`, so schema-qualified table names survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityKey {
  Global,
  Table { table: String },
  Column { table: String, column: String },
}

impl EntityKey {
  pub fn table(table: impl Into<String>) -> Self { Self::Table { table: table.into() } }

  pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
    Self::Column { table: table.into(), column: column.into() }
  }

  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::Global => EntityType::Global,
      Self::Table { .. } => EntityType::Table,
      Self::Column { .. } => EntityType::Column,
    }
  }

  /// The string stored in the `entity_key` column.
  pub fn encode(&self) -> String {
    match self {
      Self::Global => String::new(),
      Self::Table { table } => table.clone(),
      Self::Column { table, column } => format!("{table}.{column}"),
    }
  }

  /// Parse a stored key back into its parts, checking it matches `entity_type`.
  pub fn parse(entity_type: EntityType, key: &str) -> Result<Self> {
    let invalid = || Error::InvalidEntityKey {
      entity_type: entity_type.to_string(),
      key:         key.to_owned(),
    };

    match entity_type {
      EntityType::Global if key.is_empty() => Ok(Self::Global),
      EntityType::Global => Err(invalid()),
      EntityType::Table if key.is_empty() => Err(invalid()),
      EntityType::Table => Ok(Self::table(key)),
      EntityType::Column => match key.rsplit_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => {
          Ok(Self::column(table, column))
        }
        _ => Err(invalid()),
      },
    }
  }

  pub fn table_name(&self) -> Option<&str> {
    match self {
      Self::Global => None,
      Self::Table { table } | Self::Column { table, .. } => Some(table),
    }
  }

  pub fn column_name(&self) -> Option<&str> {
    match self {
      Self::Column { column, .. } => Some(column),
      _ => None,
    }
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Global => f.write_str("<global>"),
      other => f.write_str(&other.encode()),
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of one workflow entity state.
///
/// ```text
/// pending → scanning → scanned → analyzing → { needs_input, complete, failed }
///                                 needs_input → analyzing
/// ```
///
/// Every non-terminal status may also move straight to `failed`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
  #[default]
  Pending,
  Scanning,
  Scanned,
  Analyzing,
  NeedsInput,
  Complete,
  Failed,
}

impl WorkflowStatus {
  pub const ALL: [Self; 7] = [
    Self::Pending,
    Self::Scanning,
    Self::Scanned,
    Self::Analyzing,
    Self::NeedsInput,
    Self::Complete,
    Self::Failed,
  ];

  pub fn is_terminal(self) -> bool { matches!(self, Self::Complete | Self::Failed) }

  /// Whether the lifecycle allows moving from `self` to `next`.
  ///
  /// Advisory only: [`crate::store::WorkflowStateStore::update_status`] sets
  /// whatever it is given.
  pub fn can_transition_to(self, next: Self) -> bool {
    use WorkflowStatus::*;

    if self.is_terminal() {
      return false;
    }
    if next == Failed {
      return true;
    }
    matches!(
      (self, next),
      (Pending, Scanning)
        | (Scanning, Scanned)
        | (Scanned, Analyzing)
        | (Analyzing, NeedsInput)
        | (Analyzing, Complete)
        | (NeedsInput, Analyzing)
    )
  }
}

// ─── Embedded questions & answers ────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestionStatus {
  #[default]
  Pending,
  Answered,
}

/// A clarification request attached to one entity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQuestion {
  pub id:           Uuid,
  pub text:         String,
  /// Lower is more urgent.
  pub priority:     i32,
  pub is_required:  bool,
  pub category:     String,
  #[serde(default)]
  pub content_hash: String,
  #[serde(default)]
  pub status:       QuestionStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub answer:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub answered_at:  Option<DateTime<Utc>>,
  /// Fields written by other producers (e.g. `reasoning`, `affects`).
  #[serde(flatten)]
  pub extra:        Map<String, Value>,
}

impl WorkflowQuestion {
  pub fn new(
    category: impl Into<String>,
    text: impl Into<String>,
    priority: i32,
    is_required: bool,
  ) -> Self {
    let category = category.into();
    let text = text.into();
    Self {
      id: Uuid::new_v4(),
      content_hash: content_hash(&category, &text),
      text,
      priority,
      is_required,
      category,
      status: QuestionStatus::Pending,
      answer: None,
      answered_at: None,
      extra: Map::new(),
    }
  }

  pub fn is_pending(&self) -> bool { self.status == QuestionStatus::Pending }
}

/// A change to an ontology entity that an answer implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
  pub entity: String,
  pub field:  String,
  pub value:  Value,
}

/// A piece of domain knowledge learnt from an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFact {
  pub fact_type: String,
  pub key:       String,
  pub value:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context:   Option<String>,
}

/// Audit-trail entry for an answer. Appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAnswer {
  pub question_id:     Uuid,
  pub answer:          String,
  pub answered_by:     Option<Uuid>,
  pub answered_at:     DateTime<Utc>,
  #[serde(default)]
  pub entity_updates:  Vec<EntityUpdate>,
  #[serde(default)]
  pub knowledge_facts: Vec<KnowledgeFact>,
}

impl WorkflowAnswer {
  pub fn new(question_id: Uuid, answer: impl Into<String>, answered_by: Option<Uuid>) -> Self {
    Self {
      question_id,
      answer: answer.into(),
      answered_by,
      answered_at: Utc::now(),
      entity_updates: Vec::new(),
      knowledge_facts: Vec::new(),
    }
  }
}

// ─── State data ──────────────────────────────────────────────────────────────

/// The structured payload of a workflow entity state.
///
/// Only `questions` and `answers` are interpreted here. Everything else
/// (gathered statistics, LLM analysis, ...) is kept in `extra` and written
/// back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
  #[serde(default)]
  pub questions: Vec<WorkflowQuestion>,
  #[serde(default)]
  pub answers:   Vec<WorkflowAnswer>,
  #[serde(flatten)]
  pub extra:     Map<String, Value>,
}

impl StateData {
  /// Append `incoming`, dropping any whose content hash is already present
  /// (including duplicates inside `incoming`). Returns how many were added.
  ///
  /// The check is local to this state: the same `(category, text)` asked
  /// about two different tables is kept once on each.
  pub fn add_questions(&mut self, incoming: Vec<WorkflowQuestion>) -> usize {
    let mut seen: HashSet<String> = self
      .questions
      .iter()
      .map(|q| content_hash(&q.category, &q.text))
      .collect();

    let before = self.questions.len();
    for mut question in incoming {
      let hash = content_hash(&question.category, &question.text);
      if seen.insert(hash.clone()) {
        question.content_hash = hash;
        self.questions.push(question);
      }
    }
    self.questions.len() - before
  }

  /// Set status and answer on the question with `question_id`.
  ///
  /// Returns `false` if no such question exists; nothing is created.
  pub fn update_question(
    &mut self,
    question_id: Uuid,
    status: QuestionStatus,
    answer: Option<String>,
    at: DateTime<Utc>,
  ) -> bool {
    let Some(question) = self.questions.iter_mut().find(|q| q.id == question_id) else {
      return false;
    };
    question.status = status;
    question.answer = answer;
    question.answered_at = match status {
      QuestionStatus::Answered => Some(at),
      QuestionStatus::Pending => None,
    };
    true
  }

  pub fn record_answer(&mut self, answer: WorkflowAnswer) { self.answers.push(answer); }

  pub fn pending_questions(&self) -> impl Iterator<Item = &WorkflowQuestion> {
    self.questions.iter().filter(|q| q.is_pending())
  }
}

// ─── Workflow entity state ───────────────────────────────────────────────────

/// One row per `(workflow_id, entity_type, entity_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEntityState {
  pub state_id:    Uuid,
  pub project_id:  Uuid,
  pub ontology_id: Uuid,
  pub workflow_id: Uuid,
  pub key:         EntityKey,
  pub status:      WorkflowStatus,
  pub state_data:  StateData,
  pub retry_count: u32,
  pub last_error:  Option<String>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

/// Input to [`crate::store::WorkflowStateStore::create_state`].
#[derive(Debug, Clone)]
pub struct NewWorkflowEntityState {
  pub ontology_id: Uuid,
  pub workflow_id: Uuid,
  pub key:         EntityKey,
  pub status:      WorkflowStatus,
  pub state_data:  StateData,
}

impl NewWorkflowEntityState {
  pub fn new(ontology_id: Uuid, workflow_id: Uuid, key: EntityKey) -> Self {
    Self {
      ontology_id,
      workflow_id,
      key,
      status: WorkflowStatus::Pending,
      state_data: StateData::default(),
    }
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The most urgent pending question in a workflow, with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
  pub state_id: Uuid,
  pub key:      EntityKey,
  pub question: WorkflowQuestion,
}

/// Pending question counts, split by whether an answer is required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
  pub required: u32,
  pub optional: u32,
}

impl PendingCounts {
  pub fn total(&self) -> u32 { self.required + self.optional }

  /// Whether the workflow can move past `needs_input`.
  pub fn can_proceed(&self) -> bool { self.required == 0 }
}

/// Pick the pending question with the lowest priority value.
///
/// Ties break on `(entity_key, entity_type, position in the entity's list)`,
/// so the answer never depends on the order `states` arrived in.
/// `is_required` plays no part in ordering.
pub fn next_pending_question(states: &[WorkflowEntityState]) -> Option<PendingQuestion> {
  states
    .iter()
    .flat_map(|state| {
      let key = state.key.encode();
      state
        .state_data
        .questions
        .iter()
        .enumerate()
        .filter(|(_, q)| q.is_pending())
        .map(move |(index, q)| ((q.priority, key.clone(), state.key.entity_type(), index), state, q))
    })
    .min_by(|(a, ..), (b, ..)| a.cmp(b))
    .map(|(_, state, question)| PendingQuestion {
      state_id: state.state_id,
      key:      state.key.clone(),
      question: question.clone(),
    })
}

/// Sum pending questions across `states`.
pub fn pending_counts(states: &[WorkflowEntityState]) -> PendingCounts {
  states
    .iter()
    .flat_map(|s| s.state_data.pending_questions())
    .fold(PendingCounts::default(), |mut counts, q| {
      if q.is_required {
        counts.required += 1;
      } else {
        counts.optional += 1;
      }
      counts
    })
}
