//! Error types for `ontic-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  // ── Preconditions ───────────────────────────────────────────────────────
  #[error("operation requires a project scope")]
  TenantScopeRequired,

  #[error("operation requires a provenance context")]
  ProvenanceRequired,

  // ── Not found ───────────────────────────────────────────────────────────
  #[error("ontology not found: {0}")]
  OntologyNotFound(Uuid),

  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("relationship not found: {0}")]
  RelationshipNotFound(Uuid),

  #[error("workflow entity state not found: {0}")]
  WorkflowStateNotFound(Uuid),

  #[error("question {question_id} not found in workflow entity state {state_id}")]
  QuestionNotFound { state_id: Uuid, question_id: Uuid },

  #[error("ontology question not found: {0}")]
  OntologyQuestionNotFound(Uuid),

  #[error("pending change not found: {0}")]
  PendingChangeNotFound(Uuid),

  // ── Conflicts ───────────────────────────────────────────────────────────
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("pending change {0} has already been reviewed")]
  AlreadyReviewed(Uuid),

  // ── Validation ──────────────────────────────────────────────────────────
  #[error("pending changes can only be reviewed as approved or rejected, not {0}")]
  InvalidReviewStatus(String),

  #[error("invalid {entity_type} entity key: {key:?}")]
  InvalidEntityKey { entity_type: String, key: String },

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Missing tenant scope or provenance; never worth retrying.
  pub fn is_precondition(&self) -> bool {
    matches!(self, Self::TenantScopeRequired | Self::ProvenanceRequired)
  }

  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::OntologyNotFound(_)
        | Self::EntityNotFound(_)
        | Self::RelationshipNotFound(_)
        | Self::WorkflowStateNotFound(_)
        | Self::QuestionNotFound { .. }
        | Self::OntologyQuestionNotFound(_)
        | Self::PendingChangeNotFound(_)
    )
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::Conflict(_) | Self::AlreadyReviewed(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
