//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, enums
//! their `strum` snake_case names and structured documents compact JSON.
//! Each `Raw*` struct mirrors one table's column list (`*_COLUMNS`) so that
//! every query selecting those columns can share one row reader.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use ontic_core::{
  Source,
  change::PendingChange,
  ontology::{Entity, EntityAlias, Ontology, PrimaryKeyLocator, Relationship},
  question::OntologyQuestion,
  workflow::{EntityKey, StateData, WorkflowEntityState},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Parse a `strum`-encoded enum column.
pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(ontic_core::Error::UnknownVariant { kind, value: s.to_owned() })
  })
}

pub fn decode_json(s: Option<String>) -> Result<Option<serde_json::Value>> {
  Ok(s.as_deref().map(serde_json::from_str).transpose()?)
}

pub fn encode_json(v: Option<&serde_json::Value>) -> Option<String> {
  v.map(serde_json::Value::to_string)
}

/// Map a SQLite constraint violation to a domain conflict carrying `what`;
/// pass every other error through.
pub fn conflict_or(err: rusqlite::Error, what: impl FnOnce() -> String) -> Error {
  match err.sqlite_error_code() {
    Some(rusqlite::ErrorCode::ConstraintViolation) => {
      Error::Core(ontic_core::Error::Conflict(what()))
    }
    _ => Error::Sqlite(err),
  }
}

// ─── Ontology ────────────────────────────────────────────────────────────────

pub const ONTOLOGY_COLUMNS: &str = "ontology_id, project_id, version, is_active, created_at";

pub struct RawOntology {
  pub ontology_id: String,
  pub project_id:  String,
  pub version:     i64,
  pub is_active:   bool,
  pub created_at:  String,
}

impl RawOntology {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ontology_id: row.get(0)?,
      project_id:  row.get(1)?,
      version:     row.get(2)?,
      is_active:   row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_ontology(self) -> Result<Ontology> {
    Ok(Ontology {
      ontology_id: decode_uuid(&self.ontology_id)?,
      project_id:  decode_uuid(&self.project_id)?,
      version:     self.version as u32,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

pub const ENTITY_COLUMNS: &str = "entity_id, project_id, ontology_id, name, description,
  primary_schema, primary_table, primary_column, source, last_edit_source,
  created_by, updated_by, is_stale, is_deleted, deletion_reason, created_at, updated_at";

pub struct RawEntity {
  pub entity_id:        String,
  pub project_id:       String,
  pub ontology_id:      String,
  pub name:             String,
  pub description:      String,
  pub primary_schema:   String,
  pub primary_table:    String,
  pub primary_column:   String,
  pub source:           String,
  pub last_edit_source: Option<String>,
  pub created_by:       Option<String>,
  pub updated_by:       Option<String>,
  pub is_stale:         bool,
  pub is_deleted:       bool,
  pub deletion_reason:  Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawEntity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:        row.get(0)?,
      project_id:       row.get(1)?,
      ontology_id:      row.get(2)?,
      name:             row.get(3)?,
      description:      row.get(4)?,
      primary_schema:   row.get(5)?,
      primary_table:    row.get(6)?,
      primary_column:   row.get(7)?,
      source:           row.get(8)?,
      last_edit_source: row.get(9)?,
      created_by:       row.get(10)?,
      updated_by:       row.get(11)?,
      is_stale:         row.get(12)?,
      is_deleted:       row.get(13)?,
      deletion_reason:  row.get(14)?,
      created_at:       row.get(15)?,
      updated_at:       row.get(16)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      entity_id:        decode_uuid(&self.entity_id)?,
      project_id:       decode_uuid(&self.project_id)?,
      ontology_id:      decode_uuid(&self.ontology_id)?,
      name:             self.name,
      description:      self.description,
      primary_key:      PrimaryKeyLocator {
        schema: self.primary_schema,
        table:  self.primary_table,
        column: self.primary_column,
      },
      source:           decode_enum::<Source>("source", &self.source)?,
      last_edit_source: self
        .last_edit_source
        .as_deref()
        .map(|s| decode_enum::<Source>("source", s))
        .transpose()?,
      created_by:       decode_opt_uuid(self.created_by)?,
      updated_by:       decode_opt_uuid(self.updated_by)?,
      is_stale:         self.is_stale,
      is_deleted:       self.is_deleted,
      deletion_reason:  self.deletion_reason,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

pub const ALIAS_COLUMNS: &str = "alias_id, entity_id, alias, source, created_at";

pub struct RawAlias {
  pub alias_id:   String,
  pub entity_id:  String,
  pub alias:      String,
  pub source:     String,
  pub created_at: String,
}

impl RawAlias {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alias_id:   row.get(0)?,
      entity_id:  row.get(1)?,
      alias:      row.get(2)?,
      source:     row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_alias(self) -> Result<EntityAlias> {
    Ok(EntityAlias {
      alias_id:   decode_uuid(&self.alias_id)?,
      entity_id:  decode_uuid(&self.entity_id)?,
      alias:      self.alias,
      source:     decode_enum("source", &self.source)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Relationship ────────────────────────────────────────────────────────────

pub const RELATIONSHIP_COLUMNS: &str = "relationship_id, project_id, ontology_id,
  source_entity_id, target_entity_id, source_column_id, target_column_id,
  detection_method, confidence, cardinality, status, description, association,
  source, last_edit_source, created_by, updated_by, is_stale, created_at, updated_at";

pub struct RawRelationship {
  pub relationship_id:  String,
  pub project_id:       String,
  pub ontology_id:      String,
  pub source_entity_id: String,
  pub target_entity_id: String,
  pub source_column_id: String,
  pub target_column_id: String,
  pub detection_method: String,
  pub confidence:       f64,
  pub cardinality:      String,
  pub status:           String,
  pub description:      Option<String>,
  pub association:      Option<String>,
  pub source:           String,
  pub last_edit_source: Option<String>,
  pub created_by:       Option<String>,
  pub updated_by:       Option<String>,
  pub is_stale:         bool,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawRelationship {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      relationship_id:  row.get(0)?,
      project_id:       row.get(1)?,
      ontology_id:      row.get(2)?,
      source_entity_id: row.get(3)?,
      target_entity_id: row.get(4)?,
      source_column_id: row.get(5)?,
      target_column_id: row.get(6)?,
      detection_method: row.get(7)?,
      confidence:       row.get(8)?,
      cardinality:      row.get(9)?,
      status:           row.get(10)?,
      description:      row.get(11)?,
      association:      row.get(12)?,
      source:           row.get(13)?,
      last_edit_source: row.get(14)?,
      created_by:       row.get(15)?,
      updated_by:       row.get(16)?,
      is_stale:         row.get(17)?,
      created_at:       row.get(18)?,
      updated_at:       row.get(19)?,
    })
  }

  pub fn into_relationship(self) -> Result<Relationship> {
    Ok(Relationship {
      relationship_id:  decode_uuid(&self.relationship_id)?,
      project_id:       decode_uuid(&self.project_id)?,
      ontology_id:      decode_uuid(&self.ontology_id)?,
      source_entity_id: decode_uuid(&self.source_entity_id)?,
      target_entity_id: decode_uuid(&self.target_entity_id)?,
      source_column_id: decode_uuid(&self.source_column_id)?,
      target_column_id: decode_uuid(&self.target_column_id)?,
      detection_method: self.detection_method,
      confidence:       self.confidence,
      cardinality:      decode_enum("cardinality", &self.cardinality)?,
      status:           decode_enum("relationship status", &self.status)?,
      description:      self.description,
      association:      self.association,
      source:           decode_enum("source", &self.source)?,
      last_edit_source: self
        .last_edit_source
        .as_deref()
        .map(|s| decode_enum("source", s))
        .transpose()?,
      created_by:       decode_opt_uuid(self.created_by)?,
      updated_by:       decode_opt_uuid(self.updated_by)?,
      is_stale:         self.is_stale,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Ontology question ───────────────────────────────────────────────────────

pub const QUESTION_COLUMNS: &str = "question_id, project_id, ontology_id, text, reasoning,
  category, priority, is_required, content_hash, status, answer, answered_by,
  answered_at, created_at";

pub struct RawQuestion {
  pub question_id:  String,
  pub project_id:   String,
  pub ontology_id:  String,
  pub text:         String,
  pub reasoning:    Option<String>,
  pub category:     String,
  pub priority:     i64,
  pub is_required:  bool,
  pub content_hash: String,
  pub status:       String,
  pub answer:       Option<String>,
  pub answered_by:  Option<String>,
  pub answered_at:  Option<String>,
  pub created_at:   String,
}

impl RawQuestion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      question_id:  row.get(0)?,
      project_id:   row.get(1)?,
      ontology_id:  row.get(2)?,
      text:         row.get(3)?,
      reasoning:    row.get(4)?,
      category:     row.get(5)?,
      priority:     row.get(6)?,
      is_required:  row.get(7)?,
      content_hash: row.get(8)?,
      status:       row.get(9)?,
      answer:       row.get(10)?,
      answered_by:  row.get(11)?,
      answered_at:  row.get(12)?,
      created_at:   row.get(13)?,
    })
  }

  pub fn into_question(self) -> Result<OntologyQuestion> {
    Ok(OntologyQuestion {
      question_id:  decode_uuid(&self.question_id)?,
      project_id:   decode_uuid(&self.project_id)?,
      ontology_id:  decode_uuid(&self.ontology_id)?,
      text:         self.text,
      reasoning:    self.reasoning,
      category:     self.category,
      priority:     self.priority as i32,
      is_required:  self.is_required,
      content_hash: self.content_hash,
      status:       decode_enum("question status", &self.status)?,
      answer:       self.answer,
      answered_by:  decode_opt_uuid(self.answered_by)?,
      answered_at:  decode_opt_dt(self.answered_at)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Workflow entity state ───────────────────────────────────────────────────

pub const STATE_COLUMNS: &str = "state_id, project_id, ontology_id, workflow_id,
  entity_type, entity_key, status, state_data, retry_count, last_error,
  created_at, updated_at";

pub struct RawState {
  pub state_id:    String,
  pub project_id:  String,
  pub ontology_id: String,
  pub workflow_id: String,
  pub entity_type: String,
  pub entity_key:  String,
  pub status:      String,
  pub state_data:  String,
  pub retry_count: i64,
  pub last_error:  Option<String>,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawState {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      state_id:    row.get(0)?,
      project_id:  row.get(1)?,
      ontology_id: row.get(2)?,
      workflow_id: row.get(3)?,
      entity_type: row.get(4)?,
      entity_key:  row.get(5)?,
      status:      row.get(6)?,
      state_data:  row.get(7)?,
      retry_count: row.get(8)?,
      last_error:  row.get(9)?,
      created_at:  row.get(10)?,
      updated_at:  row.get(11)?,
    })
  }

  pub fn into_state(self) -> Result<WorkflowEntityState> {
    let entity_type = decode_enum("entity type", &self.entity_type)?;
    let state_data: StateData = serde_json::from_str(&self.state_data)?;

    Ok(WorkflowEntityState {
      state_id: decode_uuid(&self.state_id)?,
      project_id: decode_uuid(&self.project_id)?,
      ontology_id: decode_uuid(&self.ontology_id)?,
      workflow_id: decode_uuid(&self.workflow_id)?,
      key: EntityKey::parse(entity_type, &self.entity_key)?,
      status: decode_enum("workflow status", &self.status)?,
      state_data,
      retry_count: self.retry_count as u32,
      last_error: self.last_error,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Pending change ──────────────────────────────────────────────────────────

pub const CHANGE_COLUMNS: &str = "change_id, project_id, change_type, change_source,
  table_name, column_name, old_value, new_value, suggested_action, suggested_payload,
  status, reviewed_by, reviewed_at, created_at";

pub struct RawChange {
  pub change_id:         String,
  pub project_id:        String,
  pub change_type:       String,
  pub change_source:     String,
  pub table_name:        Option<String>,
  pub column_name:       Option<String>,
  pub old_value:         Option<String>,
  pub new_value:         Option<String>,
  pub suggested_action:  Option<String>,
  pub suggested_payload: Option<String>,
  pub status:            String,
  pub reviewed_by:       Option<String>,
  pub reviewed_at:       Option<String>,
  pub created_at:        String,
}

impl RawChange {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      change_id:         row.get(0)?,
      project_id:        row.get(1)?,
      change_type:       row.get(2)?,
      change_source:     row.get(3)?,
      table_name:        row.get(4)?,
      column_name:       row.get(5)?,
      old_value:         row.get(6)?,
      new_value:         row.get(7)?,
      suggested_action:  row.get(8)?,
      suggested_payload: row.get(9)?,
      status:            row.get(10)?,
      reviewed_by:       row.get(11)?,
      reviewed_at:       row.get(12)?,
      created_at:        row.get(13)?,
    })
  }

  pub fn into_change(self) -> Result<PendingChange> {
    Ok(PendingChange {
      change_id:         decode_uuid(&self.change_id)?,
      project_id:        decode_uuid(&self.project_id)?,
      change_type:       decode_enum("change type", &self.change_type)?,
      change_source:     decode_enum("change source", &self.change_source)?,
      table_name:        self.table_name,
      column_name:       self.column_name,
      old_value:         decode_json(self.old_value)?,
      new_value:         decode_json(self.new_value)?,
      suggested_action:  self
        .suggested_action
        .as_deref()
        .map(|s| decode_enum("suggested action", s))
        .transpose()?,
      suggested_payload: decode_json(self.suggested_payload)?,
      status:            decode_enum("change status", &self.status)?,
      reviewed_by:       self.reviewed_by,
      reviewed_at:       decode_opt_dt(self.reviewed_at)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}
