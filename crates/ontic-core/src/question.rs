//! Clarification questions scoped to an ontology, and the content hash that
//! deduplicates them.
//!
//! Re-running analysis tends to ask the same thing twice. Each question gets
//! a content hash over `(category, text)` at creation time; a second question
//! with the same hash in the same container is dropped and the first one
//! wins. Workflow-embedded questions (see [`crate::workflow`]) use the same
//! hash, scoped to their owning entity state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// SHA-256 over the category and text, hex encoded. Not a security boundary.
pub fn content_hash(category: &str, text: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(category.as_bytes());
  // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
  hasher.update([0x1f]);
  hasher.update(text.as_bytes());
  hex::encode(hasher.finalize())
}

// ─── Status ──────────────────────────────────────────────────────────────────

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
pub enum OntologyQuestionStatus {
  #[default]
  Pending,
  Answered,
  Skipped,
}

// ─── Question ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyQuestion {
  pub question_id:  Uuid,
  pub project_id:   Uuid,
  pub ontology_id:  Uuid,
  pub text:         String,
  /// Why the analyser is asking.
  pub reasoning:    Option<String>,
  pub category:     String,
  /// Lower is more urgent.
  pub priority:     i32,
  pub is_required:  bool,
  pub content_hash: String,
  pub status:       OntologyQuestionStatus,
  pub answer:       Option<String>,
  pub answered_by:  Option<Uuid>,
  pub answered_at:  Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::QuestionStore::create_questions`].
#[derive(Debug, Clone)]
pub struct NewOntologyQuestion {
  pub text:        String,
  pub reasoning:   Option<String>,
  pub category:    String,
  pub priority:    i32,
  pub is_required: bool,
}

impl NewOntologyQuestion {
  pub fn new(
    category: impl Into<String>,
    text: impl Into<String>,
    priority: i32,
    is_required: bool,
  ) -> Self {
    Self {
      text: text.into(),
      reasoning: None,
      category: category.into(),
      priority,
      is_required,
    }
  }

  pub fn content_hash(&self) -> String { content_hash(&self.category, &self.text) }
}
