//! Store traits implemented by storage backends (e.g. `ontic-store-sqlite`).
//!
//! Every method takes a [`RequestContext`]. Operations fail with
//! [`Error::TenantScopeRequired`](crate::Error::TenantScopeRequired) when it
//! carries no project, and mutating ontology operations additionally fail
//! with [`Error::ProvenanceRequired`](crate::Error::ProvenanceRequired) when
//! it carries no provenance.
//!
//! `get_*` methods return `Ok(None)` for a missing row; updates of a missing
//! row are errors.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use uuid::Uuid;

use crate::{
  change::{ChangeStatus, ChangeStatusCounts, ChangeType, NewPendingChange, PendingChange},
  context::{RequestContext, Source},
  ontology::{
    Entity, EntityAlias, NewEntity, NewRelationship, Ontology, Relationship, RelationshipStatus,
  },
  question::{NewOntologyQuestion, OntologyQuestion, OntologyQuestionStatus},
  workflow::{
    EntityKey, NewWorkflowEntityState, PendingCounts, PendingQuestion, QuestionStatus,
    StateData, WorkflowAnswer, WorkflowEntityState, WorkflowQuestion, WorkflowStatus,
  },
};

// ─── Reconciliation summaries ────────────────────────────────────────────────

/// Rows touched by [`OntologyStore::mark_inference_stale`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleCounts {
  pub entities:      u64,
  pub relationships: u64,
}

/// What a refresh cycle failed to rediscover.
#[derive(Debug, Clone, Default)]
pub struct StaleSet {
  pub entities:      Vec<Entity>,
  pub relationships: Vec<Relationship>,
}

impl StaleSet {
  pub fn is_empty(&self) -> bool { self.entities.is_empty() && self.relationships.is_empty() }
}

// ─── Ontology ────────────────────────────────────────────────────────────────

/// Entities, relationships and their staleness bookkeeping.
///
/// A refresh cycle is `mark_inference_stale` → many `upsert_*` calls →
/// `get_stale`. Callers serialise cycles per ontology; nothing here locks
/// across calls.
pub trait OntologyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ontologies ────────────────────────────────────────────────────────

  /// Create the next ontology version for the project and make it the
  /// active one.
  fn create_ontology<'a>(
    &'a self,
    ctx: &'a RequestContext,
  ) -> impl Future<Output = Result<Ontology, Self::Error>> + Send + 'a;

  fn get_active_ontology<'a>(
    &'a self,
    ctx: &'a RequestContext,
  ) -> impl Future<Output = Result<Option<Ontology>, Self::Error>> + Send + 'a;

  /// Hard-delete an ontology and everything in it. The only path that
  /// removes manual and MCP rows wholesale.
  fn delete_ontology<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Insert a new entity. A live entity with the same name is a conflict.
  fn create_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewEntity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + 'a;

  /// Insert, or update the live entity with the same `(ontology_id, name)`.
  ///
  /// On update: an empty incoming description keeps the stored one, the
  /// primary-key locator is overwritten, `is_stale` is cleared and
  /// `last_edit_source`/`updated_by` come from `ctx`. The returned entity
  /// keeps its original id, `source` and `created_by`.
  fn upsert_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewEntity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + 'a;

  /// Fetch by id, soft-deleted rows included.
  fn get_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + 'a;

  fn get_entity_by_name<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + 'a;

  /// Live entities of an ontology, ordered by name.
  fn list_entities<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Replace the description. Clears `is_stale`.
  fn update_entity_description<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
    description: String,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + 'a;

  fn soft_delete_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Add an alias. A duplicate alias on the same entity is a conflict.
  fn add_entity_alias<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
    alias: String,
  ) -> impl Future<Output = Result<EntityAlias, Self::Error>> + Send + 'a;

  fn list_entity_aliases<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EntityAlias>, Self::Error>> + Send + 'a;

  /// Flag every live inference entity in the ontology as stale. Returns the
  /// number of rows matched.
  fn mark_entities_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  fn clear_entity_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn list_stale_entities<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Hard-delete every entity created with exactly `source`, together with
  /// its aliases and relationships of the same provenance. An entity that a
  /// relationship or alias of another provenance still references is kept.
  fn delete_entities_by_source<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
    source: Source,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Relationships ─────────────────────────────────────────────────────

  /// Insert a new relationship. An existing column pair is a conflict.
  fn create_relationship<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewRelationship,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + 'a;

  /// Insert, or update the relationship with the same column pair.
  ///
  /// On update: detection fields are overwritten, an absent description or
  /// association keeps the stored one, status is never touched and
  /// `is_stale` is cleared.
  fn upsert_relationship<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewRelationship,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + 'a;

  fn get_relationship<'a>(
    &'a self,
    ctx: &'a RequestContext,
    relationship_id: Uuid,
  ) -> impl Future<Output = Result<Option<Relationship>, Self::Error>> + Send + 'a;

  fn list_relationships<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + 'a;

  /// Replace the description. Clears `is_stale`.
  fn update_relationship_description<'a>(
    &'a self,
    ctx: &'a RequestContext,
    relationship_id: Uuid,
    description: String,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + 'a;

  /// Replace description and association together. Clears `is_stale`.
  fn update_relationship_description_and_association<'a>(
    &'a self,
    ctx: &'a RequestContext,
    relationship_id: Uuid,
    description: String,
    association: String,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + 'a;

  /// Record a review outcome. Upserts never touch it afterwards.
  fn update_relationship_status<'a>(
    &'a self,
    ctx: &'a RequestContext,
    relationship_id: Uuid,
    status: RelationshipStatus,
  ) -> impl Future<Output = Result<Relationship, Self::Error>> + Send + 'a;

  /// Flag every inference relationship that is not rejected as stale.
  fn mark_relationships_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  fn clear_relationship_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    relationship_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn list_stale_relationships<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + 'a;

  fn delete_relationships_by_source<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
    source: Source,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Refresh cycle ─────────────────────────────────────────────────────

  /// Start of a refresh cycle: mark inference entities and relationships.
  fn mark_inference_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<StaleCounts, Self::Error>> + Send + 'a {
    async move {
      let entities = self.mark_entities_stale(ctx, ontology_id).await?;
      let relationships = self.mark_relationships_stale(ctx, ontology_id).await?;
      Ok(StaleCounts { entities, relationships })
    }
  }

  /// End of a refresh cycle: everything still stale.
  fn get_stale<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<StaleSet, Self::Error>> + Send + 'a {
    async move {
      let entities = self.list_stale_entities(ctx, ontology_id).await?;
      let relationships = self.list_stale_relationships(ctx, ontology_id).await?;
      Ok(StaleSet { entities, relationships })
    }
  }
}

// ─── Workflow state ──────────────────────────────────────────────────────────

/// Per-entity workflow state and the question queue embedded in it.
pub trait WorkflowStateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Register one entity. A second registration of the same
  /// `(workflow_id, key)` is a conflict, not a silent no-op.
  fn create_state<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewWorkflowEntityState,
  ) -> impl Future<Output = Result<WorkflowEntityState, Self::Error>> + Send + 'a;

  /// Register many entities atomically: all or nothing.
  fn create_states<'a>(
    &'a self,
    ctx: &'a RequestContext,
    inputs: Vec<NewWorkflowEntityState>,
  ) -> impl Future<Output = Result<Vec<WorkflowEntityState>, Self::Error>> + Send + 'a;

  fn get_state<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
  ) -> impl Future<Output = Result<Option<WorkflowEntityState>, Self::Error>> + Send + 'a;

  fn get_state_by_key<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
    key: &'a EntityKey,
  ) -> impl Future<Output = Result<Option<WorkflowEntityState>, Self::Error>> + Send + 'a;

  /// All states of a workflow, ordered by `(entity_key, entity_type)`.
  fn list_states<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<Vec<WorkflowEntityState>, Self::Error>> + Send + 'a;

  fn list_states_by_status<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
    status: WorkflowStatus,
  ) -> impl Future<Output = Result<Vec<WorkflowEntityState>, Self::Error>> + Send + 'a;

  /// Set the status and `last_error` unconditionally. `retry_count` is left
  /// alone.
  fn update_status<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
    status: WorkflowStatus,
    error: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the whole `state_data` document.
  fn update_state_data<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
    data: StateData,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Atomically add one to `retry_count` and return the new value.
  fn increment_retry_count<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + 'a;

  /// Append questions, skipping content-hash duplicates. Returns how many
  /// were added.
  fn add_questions_to_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
    questions: Vec<WorkflowQuestion>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Set status/answer on an embedded question. The question must exist.
  fn update_question_in_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
    question_id: Uuid,
    status: QuestionStatus,
    answer: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Append to the answer audit trail. Question status is not touched.
  fn record_answer_in_entity<'a>(
    &'a self,
    ctx: &'a RequestContext,
    state_id: Uuid,
    answer: WorkflowAnswer,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The lowest-priority-value pending question across the workflow.
  fn get_next_pending_question<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<Option<PendingQuestion>, Self::Error>> + Send + 'a;

  fn get_pending_questions_count<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<PendingCounts, Self::Error>> + Send + 'a;

  /// Tear down every state of a workflow.
  fn delete_workflow_states<'a>(
    &'a self,
    ctx: &'a RequestContext,
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

// ─── Ontology questions ──────────────────────────────────────────────────────

/// The ontology-wide clarification queue, deduplicated by content hash.
pub trait QuestionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert questions, silently dropping any whose content hash already
  /// exists in the ontology (or earlier in the same batch). Returns only the
  /// rows actually inserted.
  fn create_questions<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
    questions: Vec<NewOntologyQuestion>,
  ) -> impl Future<Output = Result<Vec<OntologyQuestion>, Self::Error>> + Send + 'a;

  fn get_question<'a>(
    &'a self,
    ctx: &'a RequestContext,
    question_id: Uuid,
  ) -> impl Future<Output = Result<Option<OntologyQuestion>, Self::Error>> + Send + 'a;

  fn list_questions<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
    status: Option<OntologyQuestionStatus>,
  ) -> impl Future<Output = Result<Vec<OntologyQuestion>, Self::Error>> + Send + 'a;

  /// Lowest priority value first, then oldest.
  fn next_pending_question<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<Option<OntologyQuestion>, Self::Error>> + Send + 'a;

  fn pending_question_counts<'a>(
    &'a self,
    ctx: &'a RequestContext,
    ontology_id: Uuid,
  ) -> impl Future<Output = Result<PendingCounts, Self::Error>> + Send + 'a;

  /// Record an answer; `answered_by` comes from the provenance in `ctx`.
  fn answer_question<'a>(
    &'a self,
    ctx: &'a RequestContext,
    question_id: Uuid,
    answer: String,
  ) -> impl Future<Output = Result<OntologyQuestion, Self::Error>> + Send + 'a;

  fn skip_question<'a>(
    &'a self,
    ctx: &'a RequestContext,
    question_id: Uuid,
  ) -> impl Future<Output = Result<OntologyQuestion, Self::Error>> + Send + 'a;
}

// ─── Pending changes ─────────────────────────────────────────────────────────

/// The append-only proposal queue behind the approval gate.
pub trait PendingChangeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_change<'a>(
    &'a self,
    ctx: &'a RequestContext,
    input: NewPendingChange,
  ) -> impl Future<Output = Result<PendingChange, Self::Error>> + Send + 'a;

  /// Insert many changes atomically: all or nothing.
  fn create_changes<'a>(
    &'a self,
    ctx: &'a RequestContext,
    inputs: Vec<NewPendingChange>,
  ) -> impl Future<Output = Result<Vec<PendingChange>, Self::Error>> + Send + 'a;

  fn get_change<'a>(
    &'a self,
    ctx: &'a RequestContext,
    change_id: Uuid,
  ) -> impl Future<Output = Result<Option<PendingChange>, Self::Error>> + Send + 'a;

  /// Newest first, optionally filtered by status.
  fn list_changes<'a>(
    &'a self,
    ctx: &'a RequestContext,
    status: Option<ChangeStatus>,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<PendingChange>, Self::Error>> + Send + 'a;

  fn list_changes_by_type<'a>(
    &'a self,
    ctx: &'a RequestContext,
    change_type: ChangeType,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<PendingChange>, Self::Error>> + Send + 'a;

  /// Review a pending change as approved or rejected, stamping reviewer and
  /// time. A change is reviewed at most once.
  fn review_change<'a>(
    &'a self,
    ctx: &'a RequestContext,
    change_id: Uuid,
    status: ChangeStatus,
    reviewed_by: String,
  ) -> impl Future<Output = Result<PendingChange, Self::Error>> + Send + 'a;

  fn count_changes_by_status<'a>(
    &'a self,
    ctx: &'a RequestContext,
  ) -> impl Future<Output = Result<ChangeStatusCounts, Self::Error>> + Send + 'a;

  /// Drop every change for the project.
  fn delete_changes_by_project<'a>(
    &'a self,
    ctx: &'a RequestContext,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}
