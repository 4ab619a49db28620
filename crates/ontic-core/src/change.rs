//! Pending changes: schema-level proposals awaiting operator review.
//!
//! The ledger is independent of entities, relationships and workflows. A
//! change is created `pending` and reviewed exactly once, to `approved` or
//! `rejected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
  NewTable,
  DroppedTable,
  NewColumn,
  DroppedColumn,
  ModifiedColumn,
  NewEnumValue,
  CardinalityChange,
  NewFkPattern,
}

/// What noticed the change.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeSource {
  SchemaRefresh,
  DataScan,
  Manual,
}

/// What approving the change would do to the ontology.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestedAction {
  CreateEntity,
  UpdateEntity,
  DeleteEntity,
  CreateRelationship,
  UpdateRelationship,
  UpdateColumnMetadata,
  ReviewOnly,
}

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
pub enum ChangeStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

impl ChangeStatus {
  /// Statuses a review may set.
  pub fn is_review_outcome(self) -> bool { matches!(self, Self::Approved | Self::Rejected) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
  pub change_id:         Uuid,
  pub project_id:        Uuid,
  pub change_type:       ChangeType,
  pub change_source:     ChangeSource,
  pub table_name:        Option<String>,
  pub column_name:       Option<String>,
  pub old_value:         Option<Value>,
  pub new_value:         Option<Value>,
  pub suggested_action:  Option<SuggestedAction>,
  pub suggested_payload: Option<Value>,
  pub status:            ChangeStatus,
  pub reviewed_by:       Option<String>,
  pub reviewed_at:       Option<DateTime<Utc>>,
  pub created_at:        DateTime<Utc>,
}

/// Input to [`crate::store::PendingChangeStore::create_change`]. Status is always
/// `pending` on insert.
#[derive(Debug, Clone)]
pub struct NewPendingChange {
  pub change_type:       ChangeType,
  pub change_source:     ChangeSource,
  pub table_name:        Option<String>,
  pub column_name:       Option<String>,
  pub old_value:         Option<Value>,
  pub new_value:         Option<Value>,
  pub suggested_action:  Option<SuggestedAction>,
  pub suggested_payload: Option<Value>,
}

impl NewPendingChange {
  pub fn new(change_type: ChangeType, change_source: ChangeSource) -> Self {
    Self {
      change_type,
      change_source,
      table_name: None,
      column_name: None,
      old_value: None,
      new_value: None,
      suggested_action: None,
      suggested_payload: None,
    }
  }

  pub fn on_table(mut self, table: impl Into<String>) -> Self {
    self.table_name = Some(table.into());
    self
  }

  pub fn on_column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
    self.table_name = Some(table.into());
    self.column_name = Some(column.into());
    self
  }

  pub fn suggesting(mut self, action: SuggestedAction, payload: Option<Value>) -> Self {
    self.suggested_action = Some(action);
    self.suggested_payload = payload;
    self
  }
}

/// Number of changes in each status for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatusCounts {
  pub pending:  u64,
  pub approved: u64,
  pub rejected: u64,
}
