//! Ontology types: the container, its entities, aliases and relationships.
//!
//! Entities and relationships carry their creation provenance (`source`), the
//! provenance of the last write to touch them (`last_edit_source`) and an
//! `is_stale` flag. Staleness only ever applies to rows whose `source` is
//! [`Source::Inference`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::context::Source;

// ─── Ontology ────────────────────────────────────────────────────────────────

/// A versioned container of entities and relationships for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
  pub ontology_id: Uuid,
  pub project_id:  Uuid,
  /// Monotonic per project, starting at 1.
  pub version:     u32,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// Where an entity's primary key lives in the source schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyLocator {
  pub schema: String,
  pub table:  String,
  pub column: String,
}

/// A node in the ontology. Unique by `(ontology_id, name)` among rows that
/// are not soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:        Uuid,
  pub project_id:       Uuid,
  pub ontology_id:      Uuid,
  pub name:             String,
  /// Empty when no description has been written yet.
  pub description:      String,
  pub primary_key:      PrimaryKeyLocator,
  /// Provenance at creation; never changes afterwards.
  pub source:           Source,
  pub last_edit_source: Option<Source>,
  pub created_by:       Option<Uuid>,
  pub updated_by:       Option<Uuid>,
  pub is_stale:         bool,
  pub is_deleted:       bool,
  pub deletion_reason:  Option<String>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// Input to entity create/upsert. Provenance comes from the call's
/// [`RequestContext`](crate::context::RequestContext), not from here.
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub ontology_id: Uuid,
  pub name:        String,
  pub description: String,
  pub primary_key: PrimaryKeyLocator,
}

impl NewEntity {
  pub fn new(ontology_id: Uuid, name: impl Into<String>) -> Self {
    Self {
      ontology_id,
      name: name.into(),
      description: String::new(),
      primary_key: PrimaryKeyLocator::default(),
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn with_primary_key(
    mut self,
    schema: impl Into<String>,
    table: impl Into<String>,
    column: impl Into<String>,
  ) -> Self {
    self.primary_key = PrimaryKeyLocator {
      schema: schema.into(),
      table:  table.into(),
      column: column.into(),
    };
    self
  }
}

/// An alternative name for an entity. Unique per entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityAlias {
  pub alias_id:   Uuid,
  pub entity_id:  Uuid,
  pub alias:      String,
  pub source:     Source,
  pub created_at: DateTime<Utc>,
}

// ─── Relationship ────────────────────────────────────────────────────────────

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
pub enum Cardinality {
  #[serde(rename = "1:1")]
  #[strum(serialize = "1:1")]
  OneToOne,
  #[serde(rename = "1:N")]
  #[strum(serialize = "1:N")]
  OneToMany,
  #[serde(rename = "N:1")]
  #[strum(serialize = "N:1")]
  ManyToOne,
  #[serde(rename = "N:M")]
  #[strum(serialize = "N:M")]
  ManyToMany,
  #[default]
  #[serde(rename = "unknown")]
  #[strum(serialize = "unknown")]
  Unknown,
}

/// Review status of a relationship. Re-inference never overwrites it.
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
pub enum RelationshipStatus {
  #[default]
  Pending,
  Confirmed,
  /// Treated as removed: excluded from stale-marking.
  Rejected,
}

/// A directed edge between two entities, keyed by the column pair it was
/// derived from. The reverse edge is a separate row with the columns swapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
  pub relationship_id:  Uuid,
  pub project_id:       Uuid,
  pub ontology_id:      Uuid,
  pub source_entity_id: Uuid,
  pub target_entity_id: Uuid,
  pub source_column_id: Uuid,
  pub target_column_id: Uuid,
  /// Free-form label of the detector, e.g. `"foreign_key"` or `"pk_match"`.
  pub detection_method: String,
  pub confidence:       f64,
  pub cardinality:      Cardinality,
  pub status:           RelationshipStatus,
  pub description:      Option<String>,
  /// Business-language verb phrase, e.g. "places" for customer → order.
  pub association:      Option<String>,
  pub source:           Source,
  pub last_edit_source: Option<Source>,
  pub created_by:       Option<Uuid>,
  pub updated_by:       Option<Uuid>,
  pub is_stale:         bool,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// Input to relationship create/upsert.
#[derive(Debug, Clone)]
pub struct NewRelationship {
  pub ontology_id:      Uuid,
  pub source_entity_id: Uuid,
  pub target_entity_id: Uuid,
  pub source_column_id: Uuid,
  pub target_column_id: Uuid,
  pub detection_method: String,
  pub confidence:       f64,
  pub cardinality:      Cardinality,
  pub description:      Option<String>,
  pub association:      Option<String>,
}

impl NewRelationship {
  /// The same edge pointing the other way: entities and columns swapped,
  /// cardinality mirrored, association dropped (it reads one way only).
  pub fn reversed(&self) -> Self {
    Self {
      ontology_id:      self.ontology_id,
      source_entity_id: self.target_entity_id,
      target_entity_id: self.source_entity_id,
      source_column_id: self.target_column_id,
      target_column_id: self.source_column_id,
      detection_method: self.detection_method.clone(),
      confidence:       self.confidence,
      cardinality:      self.cardinality.reversed(),
      description:      self.description.clone(),
      association:      None,
    }
  }
}

impl Cardinality {
  pub fn reversed(self) -> Self {
    match self {
      Self::OneToMany => Self::ManyToOne,
      Self::ManyToOne => Self::OneToMany,
      other => other,
    }
  }
}
