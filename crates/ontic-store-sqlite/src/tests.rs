//! Integration tests for `SqliteStore` against an in-memory database.

use ontic_core::{
  RequestContext, Source,
  change::{ChangeSource, ChangeStatus, ChangeType, NewPendingChange, SuggestedAction},
  ontology::{Cardinality, NewEntity, NewRelationship, RelationshipStatus},
  question::{NewOntologyQuestion, OntologyQuestionStatus},
  store::{OntologyStore, PendingChangeStore, QuestionStore, WorkflowStateStore},
  workflow::{
    EntityKey, NewWorkflowEntityState, QuestionStatus, StateData, WorkflowAnswer,
    WorkflowQuestion, WorkflowStatus,
  },
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A fresh project with one active ontology, plus an inference context.
async fn project(s: &SqliteStore) -> (RequestContext, Uuid) {
  let ctx = RequestContext::inference(Uuid::new_v4());
  let ontology = s.create_ontology(&ctx).await.unwrap();
  (ctx, ontology.ontology_id)
}

fn manual(ctx: &RequestContext) -> RequestContext {
  RequestContext::manual(ctx.project_id().unwrap(), Uuid::new_v4())
}

fn edge(ontology_id: Uuid, source: Uuid, target: Uuid) -> NewRelationship {
  NewRelationship {
    ontology_id,
    source_entity_id: source,
    target_entity_id: target,
    source_column_id: Uuid::new_v4(),
    target_column_id: Uuid::new_v4(),
    detection_method: "foreign_key".into(),
    confidence: 1.0,
    cardinality: Cardinality::ManyToOne,
    description: None,
    association: None,
  }
}

// ─── Ontologies ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_ontology_bumps_version_and_switches_active() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());

  let first = s.create_ontology(&ctx).await.unwrap();
  let second = s.create_ontology(&ctx).await.unwrap();
  assert_eq!(first.version, 1);
  assert_eq!(second.version, 2);

  let active = s.get_active_ontology(&ctx).await.unwrap().unwrap();
  assert_eq!(active.ontology_id, second.ontology_id);
}

#[tokio::test]
async fn get_active_ontology_none_for_new_project() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());
  assert!(s.get_active_ontology(&ctx).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_ontology_cascades_to_entities() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();

  s.delete_ontology(&ctx, ontology_id).await.unwrap();

  assert!(s.get_entity(&ctx, orders.entity_id).await.unwrap().is_none());
  let err = s.delete_ontology(&ctx, ontology_id).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Preconditions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unscoped_context_is_a_precondition_failure() {
  let s = store().await;
  let ctx = RequestContext::unscoped();

  let err = s.mark_entities_stale(&ctx, Uuid::new_v4()).await.unwrap_err();
  assert!(err.is_precondition());
  assert!(matches!(err.as_core(), Some(ontic_core::Error::TenantScopeRequired)));

  let err = s.list_changes(&ctx, None, None).await.unwrap_err();
  assert!(err.is_precondition());
}

#[tokio::test]
async fn entity_write_without_provenance_is_rejected() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let bare = RequestContext::new(ctx.project_id().unwrap());

  let err = s.upsert_entity(&bare, NewEntity::new(ontology_id, "orders")).await.unwrap_err();
  assert!(matches!(err.as_core(), Some(ontic_core::Error::ProvenanceRequired)));

  // Reads and stale bookkeeping need only the tenant scope.
  assert!(s.list_entities(&bare, ontology_id).await.unwrap().is_empty());
  assert_eq!(s.mark_entities_stale(&bare, ontology_id).await.unwrap(), 0);
}

#[tokio::test]
async fn entity_in_foreign_ontology_is_not_found() {
  let s = store().await;
  let (_, foreign_ontology) = project(&s).await;
  let ctx = RequestContext::inference(Uuid::new_v4());

  let err = s.create_entity(&ctx, NewEntity::new(foreign_ontology, "orders")).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_entity() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  let input = NewEntity::new(ontology_id, "orders")
    .with_description("Customer orders")
    .with_primary_key("public", "orders", "id");
  let created = s.create_entity(&ctx, input).await.unwrap();

  assert_eq!(created.source, Source::Inference);
  assert_eq!(created.last_edit_source, Some(Source::Inference));
  assert!(!created.is_stale);
  assert_eq!(created.primary_key.table, "orders");

  let by_id = s.get_entity(&ctx, created.entity_id).await.unwrap().unwrap();
  assert_eq!(by_id.name, "orders");
  let by_name = s.get_entity_by_name(&ctx, ontology_id, "orders").await.unwrap().unwrap();
  assert_eq!(by_name.entity_id, created.entity_id);
}

#[tokio::test]
async fn get_entity_missing_returns_none_but_update_is_not_found() {
  let s = store().await;
  let (ctx, _) = project(&s).await;
  let missing = Uuid::new_v4();

  assert!(s.get_entity(&ctx, missing).await.unwrap().is_none());
  let err = s.update_entity_description(&ctx, missing, "x".into()).await.unwrap_err();
  assert!(err.is_not_found());
  let err = s.clear_entity_stale(&ctx, missing).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let err = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap_err();
  assert!(err.is_conflict());
}

#[tokio::test]
async fn soft_deleted_entity_frees_its_name() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  let old = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  s.soft_delete_entity(&ctx, old.entity_id, Some("table dropped".into())).await.unwrap();

  let new = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  assert_ne!(new.entity_id, old.entity_id);

  let old = s.get_entity(&ctx, old.entity_id).await.unwrap().unwrap();
  assert!(old.is_deleted);
  assert_eq!(old.deletion_reason.as_deref(), Some("table dropped"));

  let live = s.list_entities(&ctx, ontology_id).await.unwrap();
  assert_eq!(live.len(), 1);
  assert_eq!(live[0].entity_id, new.entity_id);
}

#[tokio::test]
async fn manual_edit_records_last_edit_source_and_keeps_origin() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let edited = s
    .update_entity_description(&human, orders.entity_id, "Placed orders".into())
    .await
    .unwrap();

  assert_eq!(edited.description, "Placed orders");
  assert_eq!(edited.source, Source::Inference);
  assert_eq!(edited.last_edit_source, Some(Source::Manual));
  assert_eq!(edited.updated_by, human.provenance().unwrap().user_id);
}

// ─── Aliases ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn aliases_are_unique_per_entity() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();

  s.add_entity_alias(&ctx, orders.entity_id, "purchases".into()).await.unwrap();
  s.add_entity_alias(&ctx, orders.entity_id, "sales".into()).await.unwrap();
  let err = s.add_entity_alias(&ctx, orders.entity_id, "sales".into()).await.unwrap_err();
  assert!(err.is_conflict());

  let aliases = s.list_entity_aliases(&ctx, orders.entity_id).await.unwrap();
  let names: Vec<_> = aliases.iter().map(|a| a.alias.as_str()).collect();
  assert_eq!(names, ["purchases", "sales"]);
}

#[tokio::test]
async fn alias_on_missing_entity_is_not_found() {
  let s = store().await;
  let (ctx, _) = project(&s).await;
  let err = s.add_entity_alias(&ctx, Uuid::new_v4(), "x".into()).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Staleness ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mark_stale_is_idempotent() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();

  let first = s.mark_inference_stale(&ctx, ontology_id).await.unwrap();
  let stale_once = s.get_stale(&ctx, ontology_id).await.unwrap();
  let second = s.mark_inference_stale(&ctx, ontology_id).await.unwrap();
  let stale_twice = s.get_stale(&ctx, ontology_id).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(first.entities, 2);
  let ids = |set: &ontic_core::store::StaleSet| {
    set.entities.iter().map(|e| e.entity_id).collect::<Vec<_>>()
  };
  assert_eq!(ids(&stale_once), ids(&stale_twice));
}

#[tokio::test]
async fn mark_stale_with_nothing_to_mark_is_a_no_op() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let counts = s.mark_inference_stale(&ctx, ontology_id).await.unwrap();
  assert_eq!(counts.entities + counts.relationships, 0);
  assert!(s.get_stale(&ctx, ontology_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn staleness_never_touches_manual_or_mcp_rows() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);
  let agent = RequestContext::mcp(ctx.project_id().unwrap(), None);

  let inferred = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let by_hand = s.create_entity(&human, NewEntity::new(ontology_id, "refunds")).await.unwrap();
  let by_agent = s.create_entity(&agent, NewEntity::new(ontology_id, "vip")).await.unwrap();

  assert_eq!(s.mark_entities_stale(&ctx, ontology_id).await.unwrap(), 1);

  let stale = s.list_stale_entities(&ctx, ontology_id).await.unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0].entity_id, inferred.entity_id);
  for id in [by_hand.entity_id, by_agent.entity_id] {
    assert!(!s.get_entity(&ctx, id).await.unwrap().unwrap().is_stale);
  }

  let deleted = s.delete_entities_by_source(&ctx, ontology_id, Source::Inference).await.unwrap();
  assert_eq!(deleted, 1);
  let left: Vec<_> =
    s.list_entities(&ctx, ontology_id).await.unwrap().into_iter().map(|e| e.entity_id).collect();
  assert_eq!(left.len(), 2);
  assert!(left.contains(&by_hand.entity_id));
  assert!(left.contains(&by_agent.entity_id));
}

#[tokio::test]
async fn rediscovery_of_orders_keeps_id_and_description() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  let orders = s
    .create_entity(&ctx, NewEntity::new(ontology_id, "orders").with_description("Customer orders"))
    .await
    .unwrap();
  s.mark_inference_stale(&ctx, ontology_id).await.unwrap();
  assert!(s.get_entity(&ctx, orders.entity_id).await.unwrap().unwrap().is_stale);

  let rediscovered = s.upsert_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();

  assert_eq!(rediscovered.entity_id, orders.entity_id);
  assert!(!rediscovered.is_stale);
  assert_eq!(rediscovered.description, "Customer orders");
  assert!(s.get_stale(&ctx, ontology_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_with_description_overwrites() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  s.upsert_entity(&ctx, NewEntity::new(ontology_id, "orders").with_description("old"))
    .await
    .unwrap();
  let updated = s
    .upsert_entity(&ctx, NewEntity::new(ontology_id, "orders").with_description("new"))
    .await
    .unwrap();
  assert_eq!(updated.description, "new");
}

#[tokio::test]
async fn upsert_overwrites_locator_and_takes_callers_provenance() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  let first = s
    .upsert_entity(
      &human,
      NewEntity::new(ontology_id, "orders")
        .with_description("Customer orders")
        .with_primary_key("public", "orders", "id"),
    )
    .await
    .unwrap();
  assert_eq!(first.updated_by, human.provenance().unwrap().user_id);

  let second = s
    .upsert_entity(
      &ctx,
      NewEntity::new(ontology_id, "orders").with_primary_key("sales", "order_header", "order_id"),
    )
    .await
    .unwrap();

  assert_eq!(second.entity_id, first.entity_id);
  assert_eq!(second.primary_key.schema, "sales");
  assert_eq!(second.primary_key.table, "order_header");
  assert_eq!(second.primary_key.column, "order_id");
  assert_eq!(second.description, "Customer orders");
  assert_eq!(second.last_edit_source, Some(Source::Inference));
  assert_eq!(second.updated_by, None);
  assert_eq!(second.source, Source::Manual);
  assert_eq!(second.created_by, first.created_by);
}

#[tokio::test]
async fn manual_upsert_clears_stale_but_keeps_inference_origin() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  s.mark_entities_stale(&ctx, ontology_id).await.unwrap();

  let touched = s.upsert_entity(&human, NewEntity::new(ontology_id, "orders")).await.unwrap();
  assert_eq!(touched.entity_id, orders.entity_id);
  assert!(!touched.is_stale);
  assert_eq!(touched.source, Source::Inference);
  assert_eq!(touched.last_edit_source, Some(Source::Manual));
  assert_eq!(touched.created_by, orders.created_by);
}

#[tokio::test]
async fn clear_entity_stale_is_targeted() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();
  s.mark_entities_stale(&ctx, ontology_id).await.unwrap();

  s.clear_entity_stale(&ctx, orders.entity_id).await.unwrap();

  let stale = s.list_stale_entities(&ctx, ontology_id).await.unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0].name, "customers");
}

#[tokio::test]
async fn delete_by_source_cascades_only_within_its_provenance() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let payments = s.create_entity(&ctx, NewEntity::new(ontology_id, "payments")).await.unwrap();
  let customers = s.create_entity(&human, NewEntity::new(ontology_id, "customers")).await.unwrap();
  s.add_entity_alias(&ctx, payments.entity_id, "charges".into()).await.unwrap();
  let confirmed = s
    .create_relationship(&human, edge(ontology_id, orders.entity_id, customers.entity_id))
    .await
    .unwrap();
  s.create_relationship(&ctx, edge(ontology_id, payments.entity_id, customers.entity_id))
    .await
    .unwrap();

  let deleted = s.delete_entities_by_source(&ctx, ontology_id, Source::Inference).await.unwrap();
  assert_eq!(deleted, 1);

  // The inferred edge and alias go with "payments".
  assert!(s.get_entity(&ctx, payments.entity_id).await.unwrap().is_none());
  assert!(s.list_entity_aliases(&ctx, payments.entity_id).await.unwrap().is_empty());

  // The manual edge survives, and so does the entity it points from.
  let left = s.list_relationships(&ctx, ontology_id).await.unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].relationship_id, confirmed.relationship_id);
  assert!(s.get_relationship(&ctx, confirmed.relationship_id).await.unwrap().is_some());
  assert!(s.get_entity(&ctx, orders.entity_id).await.unwrap().is_some());
  assert!(s.get_entity(&ctx, customers.entity_id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_by_source_keeps_entity_with_manual_alias() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  s.add_entity_alias(&human, orders.entity_id, "purchases".into()).await.unwrap();

  let deleted = s.delete_entities_by_source(&ctx, ontology_id, Source::Inference).await.unwrap();
  assert_eq!(deleted, 0);
  let aliases = s.list_entity_aliases(&ctx, orders.entity_id).await.unwrap();
  assert_eq!(aliases.len(), 1);
  assert_eq!(aliases[0].source, Source::Manual);
}

// ─── Relationships ───────────────────────────────────────────────────────────

#[tokio::test]
async fn relationship_upsert_merges_and_clears_stale() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();

  let mut input = edge(ontology_id, orders.entity_id, customers.entity_id);
  input.description = Some("Each order belongs to a customer".into());
  input.association = Some("placed by".into());
  let first = s.upsert_relationship(&ctx, input.clone()).await.unwrap();
  assert_eq!(first.status, RelationshipStatus::Pending);

  s.mark_inference_stale(&ctx, ontology_id).await.unwrap();
  assert_eq!(s.list_stale_relationships(&ctx, ontology_id).await.unwrap().len(), 1);

  input.description = None;
  input.association = None;
  input.confidence = 0.7;
  let again = s.upsert_relationship(&ctx, input).await.unwrap();

  assert_eq!(again.relationship_id, first.relationship_id);
  assert!(!again.is_stale);
  assert_eq!(again.confidence, 0.7);
  assert_eq!(again.description.as_deref(), Some("Each order belongs to a customer"));
  assert_eq!(again.association.as_deref(), Some("placed by"));
}

#[tokio::test]
async fn forward_and_reverse_rows_reconcile_independently() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();

  let forward = edge(ontology_id, orders.entity_id, customers.entity_id);
  let reverse = forward.reversed();
  let fwd = s.upsert_relationship(&ctx, forward.clone()).await.unwrap();
  let rev = s.upsert_relationship(&ctx, reverse).await.unwrap();
  assert_ne!(fwd.relationship_id, rev.relationship_id);
  assert_eq!(rev.cardinality, Cardinality::OneToMany);

  s.mark_relationships_stale(&ctx, ontology_id).await.unwrap();
  s.upsert_relationship(&ctx, forward).await.unwrap();

  let stale = s.list_stale_relationships(&ctx, ontology_id).await.unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0].relationship_id, rev.relationship_id);
}

#[tokio::test]
async fn reviewed_status_survives_upsert_and_rejected_is_never_stale() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();

  let rejected_input = edge(ontology_id, orders.entity_id, customers.entity_id);
  let confirmed_input = edge(ontology_id, customers.entity_id, orders.entity_id);
  let rejected = s.upsert_relationship(&ctx, rejected_input.clone()).await.unwrap();
  let confirmed = s.upsert_relationship(&ctx, confirmed_input.clone()).await.unwrap();

  s.update_relationship_status(&human, rejected.relationship_id, RelationshipStatus::Rejected)
    .await
    .unwrap();
  s.update_relationship_status(&human, confirmed.relationship_id, RelationshipStatus::Confirmed)
    .await
    .unwrap();

  assert_eq!(s.mark_relationships_stale(&ctx, ontology_id).await.unwrap(), 1);
  let stale = s.list_stale_relationships(&ctx, ontology_id).await.unwrap();
  assert_eq!(stale.len(), 1);
  assert_eq!(stale[0].relationship_id, confirmed.relationship_id);

  let again = s.upsert_relationship(&ctx, rejected_input).await.unwrap();
  assert_eq!(again.status, RelationshipStatus::Rejected);
  let again = s.upsert_relationship(&ctx, confirmed_input).await.unwrap();
  assert_eq!(again.status, RelationshipStatus::Confirmed);
  assert!(!again.is_stale);
}

#[tokio::test]
async fn relationship_description_and_association_edit() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();
  let rel = s
    .create_relationship(&ctx, edge(ontology_id, orders.entity_id, customers.entity_id))
    .await
    .unwrap();

  let edited = s
    .update_relationship_description_and_association(
      &human,
      rel.relationship_id,
      "Orders reference their buyer".into(),
      "bought by".into(),
    )
    .await
    .unwrap();
  assert_eq!(edited.association.as_deref(), Some("bought by"));
  assert_eq!(edited.last_edit_source, Some(Source::Manual));

  let edited = s
    .update_relationship_description(&human, rel.relationship_id, "Buyer of the order".into())
    .await
    .unwrap();
  assert_eq!(edited.description.as_deref(), Some("Buyer of the order"));
  assert_eq!(edited.association.as_deref(), Some("bought by"));

  let err = s
    .update_relationship_description(&human, Uuid::new_v4(), "x".into())
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn duplicate_relationship_create_is_a_conflict() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();
  let input = edge(ontology_id, orders.entity_id, customers.entity_id);

  s.create_relationship(&ctx, input.clone()).await.unwrap();
  let err = s.create_relationship(&ctx, input).await.unwrap_err();
  assert!(err.is_conflict());
}

#[tokio::test]
async fn delete_relationships_by_source_spares_manual() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);
  let orders = s.create_entity(&ctx, NewEntity::new(ontology_id, "orders")).await.unwrap();
  let customers = s.create_entity(&ctx, NewEntity::new(ontology_id, "customers")).await.unwrap();

  s.create_relationship(&ctx, edge(ontology_id, orders.entity_id, customers.entity_id))
    .await
    .unwrap();
  let kept = s
    .create_relationship(&human, edge(ontology_id, customers.entity_id, orders.entity_id))
    .await
    .unwrap();

  let deleted =
    s.delete_relationships_by_source(&ctx, ontology_id, Source::Inference).await.unwrap();
  assert_eq!(deleted, 1);
  let left = s.list_relationships(&ctx, ontology_id).await.unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].relationship_id, kept.relationship_id);
}

// ─── Ontology questions ──────────────────────────────────────────────────────

#[tokio::test]
async fn question_dedup_keeps_first_writer() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  let first = s
    .create_questions(&ctx, ontology_id, vec![NewOntologyQuestion::new(
      "business_rules",
      "What does status 3 mean?",
      2,
      true,
    )])
    .await
    .unwrap();
  assert_eq!(first.len(), 1);

  let second = s
    .create_questions(&ctx, ontology_id, vec![NewOntologyQuestion::new(
      "business_rules",
      "What does status 3 mean?",
      1,
      false,
    )])
    .await
    .unwrap();
  assert!(second.is_empty());

  let all = s.list_questions(&ctx, ontology_id, None).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].question_id, first[0].question_id);
  assert_eq!(all[0].priority, 2);
}

#[tokio::test]
async fn question_batch_with_internal_duplicate_collapses() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;

  let inserted = s
    .create_questions(&ctx, ontology_id, vec![
      NewOntologyQuestion::new("terminology", "What is a SKU?", 3, false),
      NewOntologyQuestion::new("terminology", "What is a SKU?", 1, true),
      NewOntologyQuestion::new("relationships", "What is a SKU?", 3, false),
    ])
    .await
    .unwrap();

  assert_eq!(inserted.len(), 2);
  assert_eq!(s.list_questions(&ctx, ontology_id, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn next_ontology_question_by_priority_then_age() {
  let s = store().await;
  let (ctx, ontology_id) = project(&s).await;
  let human = manual(&ctx);

  s.create_questions(&ctx, ontology_id, vec![
    NewOntologyQuestion::new("a", "low priority", 5, false),
    NewOntologyQuestion::new("a", "urgent one", 1, true),
    NewOntologyQuestion::new("a", "urgent two", 1, false),
  ])
  .await
  .unwrap();

  let next = s.next_pending_question(&ctx, ontology_id).await.unwrap().unwrap();
  assert_eq!(next.text, "urgent one");

  let answered = s.answer_question(&human, next.question_id, "yes".into()).await.unwrap();
  assert_eq!(answered.status, OntologyQuestionStatus::Answered);
  assert_eq!(answered.answered_by, human.provenance().unwrap().user_id);
  assert!(answered.answered_at.is_some());

  let next = s.next_pending_question(&ctx, ontology_id).await.unwrap().unwrap();
  assert_eq!(next.text, "urgent two");
  s.skip_question(&ctx, next.question_id).await.unwrap();

  let counts = s.pending_question_counts(&ctx, ontology_id).await.unwrap();
  assert_eq!((counts.required, counts.optional), (0, 1));

  let pending = s
    .list_questions(&ctx, ontology_id, Some(OntologyQuestionStatus::Pending))
    .await
    .unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].text, "low priority");
}

#[tokio::test]
async fn answering_missing_question_is_not_found() {
  let s = store().await;
  let (ctx, _) = project(&s).await;
  assert!(s.get_question(&ctx, Uuid::new_v4()).await.unwrap().is_none());
  let err = s.answer_question(&ctx, Uuid::new_v4(), "x".into()).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Workflow state ──────────────────────────────────────────────────────────

async fn workflow(s: &SqliteStore) -> (RequestContext, Uuid, Uuid) {
  let (ctx, ontology_id) = project(s).await;
  (ctx, ontology_id, Uuid::new_v4())
}

#[tokio::test]
async fn create_and_lookup_state_by_key() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;

  let key = EntityKey::column("orders", "status");
  let state = s
    .create_state(&ctx, NewWorkflowEntityState::new(ontology_id, workflow_id, key.clone()))
    .await
    .unwrap();
  assert_eq!(state.status, WorkflowStatus::Pending);
  assert_eq!(state.retry_count, 0);

  let found = s.get_state_by_key(&ctx, workflow_id, &key).await.unwrap().unwrap();
  assert_eq!(found.state_id, state.state_id);
  assert_eq!(found.key, key);

  let other = EntityKey::table("orders");
  assert!(s.get_state_by_key(&ctx, workflow_id, &other).await.unwrap().is_none());
}

#[tokio::test]
async fn registering_an_entity_twice_is_a_conflict() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let input = NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders"));

  s.create_state(&ctx, input.clone()).await.unwrap();
  let err = s.create_state(&ctx, input).await.unwrap_err();
  assert!(err.is_conflict());
}

#[tokio::test]
async fn create_states_is_all_or_nothing() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let new = |key| NewWorkflowEntityState::new(ontology_id, workflow_id, key);

  let err = s
    .create_states(&ctx, vec![
      new(EntityKey::Global),
      new(EntityKey::table("orders")),
      new(EntityKey::table("orders")),
    ])
    .await
    .unwrap_err();
  assert!(err.is_conflict());
  assert!(s.list_states(&ctx, workflow_id).await.unwrap().is_empty());

  let created = s
    .create_states(&ctx, vec![new(EntityKey::Global), new(EntityKey::table("orders"))])
    .await
    .unwrap();
  assert_eq!(created.len(), 2);
}

#[tokio::test]
async fn list_states_orders_by_key_then_type() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let new = |key| NewWorkflowEntityState::new(ontology_id, workflow_id, key);

  s.create_states(&ctx, vec![
    new(EntityKey::column("orders", "id")),
    new(EntityKey::table("customers")),
    new(EntityKey::Global),
    new(EntityKey::table("orders")),
  ])
  .await
  .unwrap();

  let keys: Vec<_> = s
    .list_states(&ctx, workflow_id)
    .await
    .unwrap()
    .into_iter()
    .map(|st| st.key.encode())
    .collect();
  assert_eq!(keys, ["", "customers", "orders", "orders.id"]);
}

#[tokio::test]
async fn update_status_and_failure_leave_retry_count_alone() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();

  s.update_status(&ctx, state.state_id, WorkflowStatus::Scanning, None).await.unwrap();
  s.increment_retry_count(&ctx, state.state_id).await.unwrap();
  s.update_status(&ctx, state.state_id, WorkflowStatus::Failed, Some("timeout".into()))
    .await
    .unwrap();

  let failed = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  assert_eq!(failed.status, WorkflowStatus::Failed);
  assert_eq!(failed.last_error.as_deref(), Some("timeout"));
  assert_eq!(failed.retry_count, 1);

  let scanning = s
    .list_states_by_status(&ctx, workflow_id, WorkflowStatus::Scanning)
    .await
    .unwrap();
  assert!(scanning.is_empty());
}

#[tokio::test]
async fn update_status_of_missing_state_is_not_found() {
  let s = store().await;
  let (ctx, _, _) = workflow(&s).await;
  let missing = Uuid::new_v4();

  assert!(s.get_state(&ctx, missing).await.unwrap().is_none());
  let err = s.update_status(&ctx, missing, WorkflowStatus::Scanning, None).await.unwrap_err();
  assert!(err.is_not_found());
  let err = s.increment_retry_count(&ctx, missing).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn retry_count_is_monotonic() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();

  let mut last = 0;
  for _ in 0..5 {
    let n = s.increment_retry_count(&ctx, state.state_id).await.unwrap();
    assert_eq!(n, last + 1);
    last = n;
  }
  let state = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  assert_eq!(state.retry_count, 5);
}

#[tokio::test]
async fn state_data_replace_keeps_unknown_fields() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();

  let data: StateData = serde_json::from_value(json!({
    "row_count": 1200,
    "gathered": { "distinct": 4 },
  }))
  .unwrap();
  s.update_state_data(&ctx, state.state_id, data).await.unwrap();
  s.add_questions_to_entity(&ctx, state.state_id, vec![WorkflowQuestion::new(
    "data_quality",
    "Are nulls expected?",
    3,
    false,
  )])
  .await
  .unwrap();

  let state = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  assert_eq!(state.state_data.extra["row_count"], json!(1200));
  assert_eq!(state.state_data.extra["gathered"]["distinct"], json!(4));
  assert_eq!(state.state_data.questions.len(), 1);
}

#[tokio::test]
async fn add_questions_appends_and_dedups() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();

  let q = |text: &str| WorkflowQuestion::new("enumeration", text, 2, true);
  assert_eq!(s.add_questions_to_entity(&ctx, state.state_id, vec![q("A?"), q("B?")]).await.unwrap(), 2);
  assert_eq!(s.add_questions_to_entity(&ctx, state.state_id, vec![q("B?"), q("C?")]).await.unwrap(), 1);
  assert_eq!(s.add_questions_to_entity(&ctx, state.state_id, vec![]).await.unwrap(), 0);

  let state = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  let texts: Vec<_> = state.state_data.questions.iter().map(|q| q.text.as_str()).collect();
  assert_eq!(texts, ["A?", "B?", "C?"]);
}

#[tokio::test]
async fn question_dedup_is_per_entity_state() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let new = |key| NewWorkflowEntityState::new(ontology_id, workflow_id, key);
  let states = s
    .create_states(&ctx, vec![new(EntityKey::table("orders")), new(EntityKey::table("invoices"))])
    .await
    .unwrap();

  let q = || WorkflowQuestion::new("naming", "What does status=3 mean?", 2, true);
  for state in &states {
    assert_eq!(s.add_questions_to_entity(&ctx, state.state_id, vec![q()]).await.unwrap(), 1);
  }

  let counts = s.get_pending_questions_count(&ctx, workflow_id).await.unwrap();
  assert_eq!(counts.required, 2);
}

#[tokio::test]
async fn add_questions_to_missing_state_is_not_found() {
  let s = store().await;
  let (ctx, _, _) = workflow(&s).await;
  let err = s
    .add_questions_to_entity(&ctx, Uuid::new_v4(), vec![WorkflowQuestion::new("c", "t", 1, true)])
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn update_unknown_question_is_not_found_and_creates_nothing() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();

  let err = s
    .update_question_in_entity(
      &ctx,
      state.state_id,
      Uuid::new_v4(),
      QuestionStatus::Answered,
      Some("x".into()),
    )
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(ontic_core::Error::QuestionNotFound { .. })));

  let state = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  assert!(state.state_data.questions.is_empty());
}

#[tokio::test]
async fn recording_an_answer_does_not_change_question_status() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(
      &ctx,
      NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::table("orders")),
    )
    .await
    .unwrap();
  let question = WorkflowQuestion::new("business_rules", "Is 'void' terminal?", 1, true);
  let question_id = question.id;
  s.add_questions_to_entity(&ctx, state.state_id, vec![question]).await.unwrap();

  s.record_answer_in_entity(&ctx, state.state_id, WorkflowAnswer::new(question_id, "yes", None))
    .await
    .unwrap();
  let reloaded = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  assert_eq!(reloaded.state_data.answers.len(), 1);
  assert!(reloaded.state_data.questions[0].is_pending());

  s.update_question_in_entity(
    &ctx,
    state.state_id,
    question_id,
    QuestionStatus::Answered,
    Some("yes".into()),
  )
  .await
  .unwrap();
  let reloaded = s.get_state(&ctx, state.state_id).await.unwrap().unwrap();
  let q = &reloaded.state_data.questions[0];
  assert_eq!(q.status, QuestionStatus::Answered);
  assert_eq!(q.answer.as_deref(), Some("yes"));
  assert!(q.answered_at.is_some());
}

#[tokio::test]
async fn next_pending_question_prefers_priority_over_required() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let new = |key| NewWorkflowEntityState::new(ontology_id, workflow_id, key);
  let states = s
    .create_states(&ctx, vec![new(EntityKey::table("a")), new(EntityKey::table("b"))])
    .await
    .unwrap();
  let (a, b) = (states[0].state_id, states[1].state_id);

  let q1 = WorkflowQuestion::new("c", "Q1", 5, false);
  let q2 = WorkflowQuestion::new("c", "Q2", 1, true);
  let (q1_id, q2_id) = (q1.id, q2.id);
  s.add_questions_to_entity(&ctx, a, vec![q1]).await.unwrap();
  s.add_questions_to_entity(&ctx, b, vec![q2]).await.unwrap();

  let next = s.get_next_pending_question(&ctx, workflow_id).await.unwrap().unwrap();
  assert_eq!(next.question.id, q2_id);
  assert_eq!(next.state_id, b);

  let counts = s.get_pending_questions_count(&ctx, workflow_id).await.unwrap();
  assert_eq!((counts.required, counts.optional), (1, 1));
  assert!(!counts.can_proceed());

  s.update_question_in_entity(&ctx, b, q2_id, QuestionStatus::Answered, Some("ok".into()))
    .await
    .unwrap();

  let next = s.get_next_pending_question(&ctx, workflow_id).await.unwrap().unwrap();
  assert_eq!(next.question.id, q1_id);
  assert_eq!(next.state_id, a);
  assert!(s.get_pending_questions_count(&ctx, workflow_id).await.unwrap().can_proceed());

  s.update_question_in_entity(&ctx, a, q1_id, QuestionStatus::Answered, None).await.unwrap();
  assert!(s.get_next_pending_question(&ctx, workflow_id).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_workflow_states_spares_other_workflows() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let other = Uuid::new_v4();

  s.create_state(&ctx, NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::Global))
    .await
    .unwrap();
  s.create_state(&ctx, NewWorkflowEntityState::new(ontology_id, other, EntityKey::Global))
    .await
    .unwrap();

  assert_eq!(s.delete_workflow_states(&ctx, workflow_id).await.unwrap(), 1);
  assert!(s.list_states(&ctx, workflow_id).await.unwrap().is_empty());
  assert_eq!(s.list_states(&ctx, other).await.unwrap().len(), 1);
}

#[tokio::test]
async fn states_are_invisible_across_projects() {
  let s = store().await;
  let (ctx, ontology_id, workflow_id) = workflow(&s).await;
  let state = s
    .create_state(&ctx, NewWorkflowEntityState::new(ontology_id, workflow_id, EntityKey::Global))
    .await
    .unwrap();

  let stranger = RequestContext::new(Uuid::new_v4());
  assert!(s.get_state(&stranger, state.state_id).await.unwrap().is_none());
  let err = s.increment_retry_count(&stranger, state.state_id).await.unwrap_err();
  assert!(err.is_not_found());
}

// ─── Pending changes ─────────────────────────────────────────────────────────

fn new_column(table: &str, column: &str) -> NewPendingChange {
  NewPendingChange::new(ChangeType::NewColumn, ChangeSource::SchemaRefresh)
    .on_column(table, column)
    .suggesting(SuggestedAction::UpdateEntity, Some(json!({ "column": column })))
}

#[tokio::test]
async fn create_and_get_change_keeps_documents() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());

  let mut input = new_column("orders", "discount");
  input.new_value = Some(json!({ "type": "numeric", "nullable": true, "extra": [1, 2] }));
  let created = s.create_change(&ctx, input).await.unwrap();
  assert_eq!(created.status, ChangeStatus::Pending);

  let fetched = s.get_change(&ctx, created.change_id).await.unwrap().unwrap();
  assert_eq!(fetched.column_name.as_deref(), Some("discount"));
  assert_eq!(fetched.suggested_action, Some(SuggestedAction::UpdateEntity));
  assert_eq!(fetched.new_value.unwrap()["extra"], json!([1, 2]));
  assert_eq!(fetched.suggested_payload, Some(json!({ "column": "discount" })));
}

#[tokio::test]
async fn list_changes_newest_first_with_filters() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());

  s.create_changes(&ctx, vec![
    new_column("orders", "a"),
    NewPendingChange::new(ChangeType::DroppedTable, ChangeSource::SchemaRefresh).on_table("legacy"),
    new_column("orders", "b"),
  ])
  .await
  .unwrap();

  let all = s.list_changes(&ctx, None, None).await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].column_name.as_deref(), Some("b"));

  let limited = s.list_changes(&ctx, Some(ChangeStatus::Pending), Some(2)).await.unwrap();
  assert_eq!(limited.len(), 2);

  let dropped = s.list_changes_by_type(&ctx, ChangeType::DroppedTable, None).await.unwrap();
  assert_eq!(dropped.len(), 1);
  assert_eq!(dropped[0].table_name.as_deref(), Some("legacy"));
}

#[tokio::test]
async fn review_is_one_way() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());
  let change = s.create_change(&ctx, new_column("orders", "discount")).await.unwrap();

  let err = s
    .review_change(&ctx, change.change_id, ChangeStatus::Pending, "alice".into())
    .await
    .unwrap_err();
  assert!(matches!(err.as_core(), Some(ontic_core::Error::InvalidReviewStatus(_))));

  let reviewed = s
    .review_change(&ctx, change.change_id, ChangeStatus::Approved, "alice".into())
    .await
    .unwrap();
  assert_eq!(reviewed.status, ChangeStatus::Approved);
  assert_eq!(reviewed.reviewed_by.as_deref(), Some("alice"));
  assert!(reviewed.reviewed_at.is_some());

  let err = s
    .review_change(&ctx, change.change_id, ChangeStatus::Rejected, "bob".into())
    .await
    .unwrap_err();
  assert!(err.is_conflict());

  let err = s
    .review_change(&ctx, Uuid::new_v4(), ChangeStatus::Rejected, "bob".into())
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn count_and_delete_changes_by_project() {
  let s = store().await;
  let ctx = RequestContext::new(Uuid::new_v4());
  let other = RequestContext::new(Uuid::new_v4());

  let changes = s
    .create_changes(&ctx, vec![
      new_column("orders", "a"),
      new_column("orders", "b"),
      new_column("orders", "c"),
    ])
    .await
    .unwrap();
  s.create_change(&other, new_column("users", "email")).await.unwrap();

  s.review_change(&ctx, changes[0].change_id, ChangeStatus::Approved, "alice".into())
    .await
    .unwrap();
  s.review_change(&ctx, changes[1].change_id, ChangeStatus::Rejected, "alice".into())
    .await
    .unwrap();

  let counts = s.count_changes_by_status(&ctx).await.unwrap();
  assert_eq!((counts.pending, counts.approved, counts.rejected), (1, 1, 1));

  assert_eq!(s.delete_changes_by_project(&ctx).await.unwrap(), 3);
  assert!(s.list_changes(&ctx, None, None).await.unwrap().is_empty());
  assert_eq!(s.list_changes(&other, None, None).await.unwrap().len(), 1);
}
