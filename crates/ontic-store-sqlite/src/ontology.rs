//! [`OntologyStore`] for [`SqliteStore`]: entities, relationships and the
//! staleness protocol.
//!
//! Only rows with `source = 'inference'` are ever marked stale. Every upsert
//! that lands on an existing natural key clears `is_stale` whatever the
//! caller's provenance, and so does every content edit.

use chrono::Utc;
use ontic_core::{
  Provenance, RequestContext, Source,
  ontology::{
    Entity, EntityAlias, NewEntity, NewRelationship, Ontology, Relationship, RelationshipStatus,
  },
  store::OntologyStore,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ALIAS_COLUMNS, ENTITY_COLUMNS, ONTOLOGY_COLUMNS, RELATIONSHIP_COLUMNS, RawAlias, RawEntity,
    RawOntology, RawRelationship, conflict_or, encode_dt, encode_uuid,
  },
  store::{SqliteStore, entity_in_project, ontology_in_project},
};

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn select_entity(
  conn: &rusqlite::Connection,
  entity_id: &str,
  project_id: &str,
) -> Result<Option<Entity>> {
  let raw = conn
    .query_row(
      &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1 AND project_id = ?2"),
      rusqlite::params![entity_id, project_id],
      RawEntity::from_row,
    )
    .optional()?;
  raw.map(RawEntity::into_entity).transpose()
}

fn select_entities(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<Entity>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE {filter} ORDER BY name"))?;
  let raws = stmt
    .query_map(params, RawEntity::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEntity::into_entity).collect()
}

fn select_relationship(
  conn: &rusqlite::Connection,
  relationship_id: &str,
  project_id: &str,
) -> Result<Option<Relationship>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
         WHERE relationship_id = ?1 AND project_id = ?2"
      ),
      rusqlite::params![relationship_id, project_id],
      RawRelationship::from_row,
    )
    .optional()?;
  raw.map(RawRelationship::into_relationship).transpose()
}

fn select_relationships(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<Relationship>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE {filter}
     ORDER BY source_entity_id, target_entity_id, created_at"
  ))?;
  let raws = stmt
    .query_map(params, RawRelationship::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRelationship::into_relationship).collect()
}

/// Provenance columns written by every mutation: `(source, user_id)`.
fn edit_columns(provenance: Provenance) -> (String, Option<String>) {
  (provenance.source.as_ref().to_owned(), provenance.user_id.map(encode_uuid))
}

// ─── Entity writes ───────────────────────────────────────────────────────────

const INSERT_ENTITY: &str = "INSERT INTO entities (
    entity_id, project_id, ontology_id, name, description,
    primary_schema, primary_table, primary_column,
    source, last_edit_source, created_by, updated_by,
    is_stale, is_deleted, created_at, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?10, 0, 0, ?11, ?11)";

/// Conflict branch of the entity upsert. `source` and `created_by` are never
/// touched; an empty incoming description keeps the stored one.
const UPSERT_ENTITY_CONFLICT: &str = "
  ON CONFLICT (ontology_id, name) WHERE is_deleted = 0 DO UPDATE SET
    description      = CASE WHEN excluded.description = ''
                            THEN entities.description
                            ELSE excluded.description END,
    primary_schema   = excluded.primary_schema,
    primary_table    = excluded.primary_table,
    primary_column   = excluded.primary_column,
    last_edit_source = excluded.last_edit_source,
    updated_by       = excluded.updated_by,
    is_stale         = 0,
    updated_at       = excluded.updated_at
  RETURNING entity_id";

/// Entities with `source` that a relationship or alias of some other
/// provenance still points at. They survive a delete by provenance.
const REFERENCED_ELSEWHERE: &str = "(
    EXISTS (SELECT 1 FROM relationships r
            WHERE (r.source_entity_id = entities.entity_id
                   OR r.target_entity_id = entities.entity_id)
              AND r.source != ?3)
    OR EXISTS (SELECT 1 FROM entity_aliases a
               WHERE a.entity_id = entities.entity_id AND a.source != ?3)
  )";

/// Delete the entities created with `source`, leaving those another
/// provenance still references. Same-provenance aliases and relationships
/// cascade. Returns `(deleted, kept)`.
fn delete_entities_with_source(
  conn: &mut rusqlite::Connection,
  project_id: &str,
  ontology_id: &str,
  source: &str,
) -> rusqlite::Result<(usize, usize)> {
  let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
  let kept: usize = tx.query_row(
    &format!(
      "SELECT COUNT(*) FROM entities
       WHERE project_id = ?1 AND ontology_id = ?2 AND source = ?3
         AND {REFERENCED_ELSEWHERE}"
    ),
    rusqlite::params![project_id, ontology_id, source],
    |r| r.get(0),
  )?;
  let deleted = tx.execute(
    &format!(
      "DELETE FROM entities
       WHERE project_id = ?1 AND ontology_id = ?2 AND source = ?3
         AND NOT {REFERENCED_ELSEWHERE}"
    ),
    rusqlite::params![project_id, ontology_id, source],
  )?;
  tx.commit()?;
  Ok((deleted, kept))
}

/// Insert (or, with `upsert`, insert-or-merge) an entity and read it back.
fn write_entity(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  provenance: Provenance,
  input: NewEntity,
  upsert: bool,
) -> Result<Entity> {
  let tx = conn.transaction()?;

  if !ontology_in_project(&tx, input.ontology_id, project_id)? {
    return Err(ontic_core::Error::OntologyNotFound(input.ontology_id).into());
  }

  let new_id = Uuid::new_v4();
  let id_str = encode_uuid(new_id);
  let project_str = encode_uuid(project_id);
  let ontology_str = encode_uuid(input.ontology_id);
  let (source, user) = edit_columns(provenance);
  let at_str = encode_dt(Utc::now());
  let params = rusqlite::params![
    id_str,
    project_str,
    ontology_str,
    input.name,
    input.description,
    input.primary_key.schema,
    input.primary_key.table,
    input.primary_key.column,
    source,
    user,
    at_str,
  ];

  let entity_id: String = if upsert {
    tx.query_row(&format!("{INSERT_ENTITY} {UPSERT_ENTITY_CONFLICT}"), params, |r| r.get(0))?
  } else {
    tx.execute(INSERT_ENTITY, params).map_err(|e| {
      conflict_or(e, || {
        format!("entity {:?} already exists in ontology {}", input.name, input.ontology_id)
      })
    })?;
    id_str.clone()
  };

  let entity = select_entity(&tx, &entity_id, &project_str)?
    .ok_or(ontic_core::Error::EntityNotFound(new_id))?;
  tx.commit()?;
  Ok(entity)
}

fn insert_alias(conn: &rusqlite::Connection, project_id: Uuid, alias: &EntityAlias) -> Result<()> {
  if !entity_in_project(conn, alias.entity_id, project_id)? {
    return Err(ontic_core::Error::EntityNotFound(alias.entity_id).into());
  }
  conn
    .execute(
      "INSERT INTO entity_aliases (alias_id, entity_id, alias, source, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      rusqlite::params![
        encode_uuid(alias.alias_id),
        encode_uuid(alias.entity_id),
        alias.alias,
        alias.source.as_ref(),
        encode_dt(alias.created_at),
      ],
    )
    .map_err(|e| {
      conflict_or(e, || format!("alias {:?} already exists on entity {}", alias.alias, alias.entity_id))
    })?;
  Ok(())
}

// ─── Relationship writes ─────────────────────────────────────────────────────

const INSERT_RELATIONSHIP: &str = "INSERT INTO relationships (
    relationship_id, project_id, ontology_id,
    source_entity_id, target_entity_id, source_column_id, target_column_id,
    detection_method, confidence, cardinality, status, description, association,
    source, last_edit_source, created_by, updated_by, is_stale, created_at, updated_at
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11, ?12,
            ?13, ?13, ?14, ?14, 0, ?15, ?15)";

/// Conflict branch of the relationship upsert. Status is a review outcome
/// and survives re-inference; absent description/association keep theirs.
const UPSERT_RELATIONSHIP_CONFLICT: &str = "
  ON CONFLICT (ontology_id, source_column_id, target_column_id) DO UPDATE SET
    source_entity_id = excluded.source_entity_id,
    target_entity_id = excluded.target_entity_id,
    detection_method = excluded.detection_method,
    confidence       = excluded.confidence,
    cardinality      = excluded.cardinality,
    description      = COALESCE(NULLIF(excluded.description, ''), relationships.description),
    association      = COALESCE(NULLIF(excluded.association, ''), relationships.association),
    last_edit_source = excluded.last_edit_source,
    updated_by       = excluded.updated_by,
    is_stale         = 0,
    updated_at       = excluded.updated_at
  RETURNING relationship_id";

fn write_relationship(
  conn: &mut rusqlite::Connection,
  project_id: Uuid,
  provenance: Provenance,
  input: NewRelationship,
  upsert: bool,
) -> Result<Relationship> {
  let tx = conn.transaction()?;

  if !ontology_in_project(&tx, input.ontology_id, project_id)? {
    return Err(ontic_core::Error::OntologyNotFound(input.ontology_id).into());
  }
  for entity_id in [input.source_entity_id, input.target_entity_id] {
    if !entity_in_project(&tx, entity_id, project_id)? {
      return Err(ontic_core::Error::EntityNotFound(entity_id).into());
    }
  }

  let new_id = Uuid::new_v4();
  let id_str = encode_uuid(new_id);
  let project_str = encode_uuid(project_id);
  let ontology_str = encode_uuid(input.ontology_id);
  let source_entity = encode_uuid(input.source_entity_id);
  let target_entity = encode_uuid(input.target_entity_id);
  let source_column = encode_uuid(input.source_column_id);
  let target_column = encode_uuid(input.target_column_id);
  let cardinality = input.cardinality.as_ref();
  let (source, user) = edit_columns(provenance);
  let at_str = encode_dt(Utc::now());
  let params = rusqlite::params![
    id_str,
    project_str,
    ontology_str,
    source_entity,
    target_entity,
    source_column,
    target_column,
    input.detection_method,
    input.confidence,
    cardinality,
    input.description,
    input.association,
    source,
    user,
    at_str,
  ];

  let relationship_id: String = if upsert {
    tx.query_row(
      &format!("{INSERT_RELATIONSHIP} {UPSERT_RELATIONSHIP_CONFLICT}"),
      params,
      |r| r.get(0),
    )?
  } else {
    tx.execute(INSERT_RELATIONSHIP, params).map_err(|e| {
      conflict_or(e, || {
        format!(
          "relationship {} -> {} already exists in ontology {}",
          input.source_column_id, input.target_column_id, input.ontology_id
        )
      })
    })?;
    id_str.clone()
  };

  let relationship = select_relationship(&tx, &relationship_id, &project_str)?
    .ok_or(ontic_core::Error::RelationshipNotFound(new_id))?;
  tx.commit()?;
  Ok(relationship)
}

// ─── OntologyStore impl ──────────────────────────────────────────────────────

impl OntologyStore for SqliteStore {
  type Error = Error;

  // ── Ontologies ────────────────────────────────────────────────────────────

  async fn create_ontology(&self, ctx: &RequestContext) -> Result<Ontology> {
    let project_id = ctx.project_id()?;
    let project_str = encode_uuid(project_id);
    let ontology_id = Uuid::new_v4();
    let id_str = encode_uuid(ontology_id);
    let now = Utc::now();
    let at_str = encode_dt(now);

    let version: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let version: i64 = tx.query_row(
          "SELECT COALESCE(MAX(version), 0) + 1 FROM ontologies WHERE project_id = ?1",
          rusqlite::params![project_str],
          |r| r.get(0),
        )?;
        tx.execute(
          "UPDATE ontologies SET is_active = 0 WHERE project_id = ?1",
          rusqlite::params![project_str],
        )?;
        tx.execute(
          "INSERT INTO ontologies (ontology_id, project_id, version, is_active, created_at)
           VALUES (?1, ?2, ?3, 1, ?4)",
          rusqlite::params![id_str, project_str, version, at_str],
        )?;
        tx.commit()?;
        Ok(version)
      })
      .await?;

    tracing::info!(%project_id, %ontology_id, version, "created ontology");
    Ok(Ontology {
      ontology_id,
      project_id,
      version: version as u32,
      is_active: true,
      created_at: now,
    })
  }

  async fn get_active_ontology(&self, ctx: &RequestContext) -> Result<Option<Ontology>> {
    let project_str = encode_uuid(ctx.project_id()?);

    let raw: Option<RawOntology> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ONTOLOGY_COLUMNS} FROM ontologies
                 WHERE project_id = ?1 AND is_active = 1"
              ),
              rusqlite::params![project_str],
              RawOntology::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawOntology::into_ontology).transpose()
  }

  async fn delete_ontology(&self, ctx: &RequestContext, ontology_id: Uuid) -> Result<()> {
    let project_id = ctx.project_id()?;
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(ontology_id);

    // Entities, aliases, relationships and questions go with it via
    // ON DELETE CASCADE.
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM ontologies WHERE ontology_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        )?)
      })
      .await?;

    if deleted == 0 {
      return Err(ontic_core::Error::OntologyNotFound(ontology_id).into());
    }
    tracing::info!(%project_id, %ontology_id, "deleted ontology");
    Ok(())
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, ctx: &RequestContext, input: NewEntity) -> Result<Entity> {
    let (project_id, provenance) = ctx.write_scope()?;
    let entity = self
      .conn
      .call(move |conn| Ok(write_entity(conn, project_id, provenance, input, false)))
      .await??;

    tracing::debug!(entity_id = %entity.entity_id, name = %entity.name, source = %provenance.source, "created entity");
    Ok(entity)
  }

  async fn upsert_entity(&self, ctx: &RequestContext, input: NewEntity) -> Result<Entity> {
    let (project_id, provenance) = ctx.write_scope()?;
    let entity = self
      .conn
      .call(move |conn| Ok(write_entity(conn, project_id, provenance, input, true)))
      .await??;

    tracing::debug!(
      entity_id = %entity.entity_id,
      name = %entity.name,
      source = %provenance.source,
      "upserted entity"
    );
    Ok(entity)
  }

  async fn get_entity(&self, ctx: &RequestContext, entity_id: Uuid) -> Result<Option<Entity>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(entity_id);

    self
      .conn
      .call(move |conn| Ok(select_entity(conn, &id_str, &project_str)))
      .await?
  }

  async fn get_entity_by_name(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
    name: &str,
  ) -> Result<Option<Entity>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);
    let name = name.to_owned();

    let mut found = self
      .conn
      .call(move |conn| {
        Ok(select_entities(
          conn,
          "project_id = ?1 AND ontology_id = ?2 AND name = ?3 AND is_deleted = 0",
          rusqlite::params![project_str, ontology_str, name],
        ))
      })
      .await??;

    Ok(found.pop())
  }

  async fn list_entities(&self, ctx: &RequestContext, ontology_id: Uuid) -> Result<Vec<Entity>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    self
      .conn
      .call(move |conn| {
        Ok(select_entities(
          conn,
          "project_id = ?1 AND ontology_id = ?2 AND is_deleted = 0",
          rusqlite::params![project_str, ontology_str],
        ))
      })
      .await?
  }

  async fn update_entity_description(
    &self,
    ctx: &RequestContext,
    entity_id: Uuid,
    description: String,
  ) -> Result<Entity> {
    let (project_id, provenance) = ctx.write_scope()?;
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(entity_id);
    let (source, user) = edit_columns(provenance);
    let at_str = encode_dt(Utc::now());

    let entity = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE entities
           SET description = ?1, last_edit_source = ?2, updated_by = ?3,
               is_stale = 0, updated_at = ?4
           WHERE entity_id = ?5 AND project_id = ?6",
          rusqlite::params![description, source, user, at_str, id_str, project_str],
        )?;
        if updated == 0 {
          return Ok(Ok(None));
        }
        Ok(select_entity(conn, &id_str, &project_str))
      })
      .await??;

    entity.ok_or_else(|| ontic_core::Error::EntityNotFound(entity_id).into())
  }

  async fn soft_delete_entity(
    &self,
    ctx: &RequestContext,
    entity_id: Uuid,
    reason: Option<String>,
  ) -> Result<()> {
    let (project_id, provenance) = ctx.write_scope()?;
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(entity_id);
    let (source, user) = edit_columns(provenance);
    let at_str = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities
           SET is_deleted = 1, deletion_reason = ?1, last_edit_source = ?2,
               updated_by = ?3, updated_at = ?4
           WHERE entity_id = ?5 AND project_id = ?6",
          rusqlite::params![reason, source, user, at_str, id_str, project_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(ontic_core::Error::EntityNotFound(entity_id).into());
    }
    tracing::debug!(%entity_id, "soft-deleted entity");
    Ok(())
  }

  async fn add_entity_alias(
    &self,
    ctx: &RequestContext,
    entity_id: Uuid,
    alias: String,
  ) -> Result<EntityAlias> {
    let (project_id, provenance) = ctx.write_scope()?;
    let record = EntityAlias {
      alias_id: Uuid::new_v4(),
      entity_id,
      alias,
      source: provenance.source,
      created_at: Utc::now(),
    };

    let row = record.clone();
    self
      .conn
      .call(move |conn| Ok(insert_alias(conn, project_id, &row)))
      .await??;

    Ok(record)
  }

  async fn list_entity_aliases(
    &self,
    ctx: &RequestContext,
    entity_id: Uuid,
  ) -> Result<Vec<EntityAlias>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let entity_str = encode_uuid(entity_id);

    let raws: Vec<RawAlias> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ALIAS_COLUMNS} FROM entity_aliases
           WHERE entity_id = ?1
             AND entity_id IN (SELECT entity_id FROM entities WHERE project_id = ?2)
           ORDER BY alias"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![entity_str, project_str], RawAlias::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlias::into_alias).collect()
  }

  async fn mark_entities_stale(&self, ctx: &RequestContext, ontology_id: Uuid) -> Result<u64> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    let marked = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET is_stale = 1
           WHERE project_id = ?1 AND ontology_id = ?2
             AND source = 'inference' AND is_deleted = 0",
          rusqlite::params![project_str, ontology_str],
        )?)
      })
      .await?;

    tracing::info!(%ontology_id, marked, "marked inference entities stale");
    Ok(marked as u64)
  }

  async fn clear_entity_stale(&self, ctx: &RequestContext, entity_id: Uuid) -> Result<()> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(entity_id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET is_stale = 0 WHERE entity_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(ontic_core::Error::EntityNotFound(entity_id).into());
    }
    Ok(())
  }

  async fn list_stale_entities(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<Vec<Entity>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    self
      .conn
      .call(move |conn| {
        Ok(select_entities(
          conn,
          "project_id = ?1 AND ontology_id = ?2 AND is_stale = 1 AND is_deleted = 0",
          rusqlite::params![project_str, ontology_str],
        ))
      })
      .await?
  }

  async fn delete_entities_by_source(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
    source: Source,
  ) -> Result<u64> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);
    let source_str = source.as_ref().to_owned();

    let (deleted, kept) = self
      .conn
      .call(move |conn| {
        Ok(delete_entities_with_source(conn, &project_str, &ontology_str, &source_str)?)
      })
      .await?;

    if kept > 0 {
      tracing::warn!(
        %ontology_id,
        %source,
        kept,
        "kept entities still referenced by other provenance"
      );
    }
    tracing::info!(%ontology_id, %source, deleted, "deleted entities by provenance");
    Ok(deleted as u64)
  }

  // ── Relationships ─────────────────────────────────────────────────────────

  async fn create_relationship(
    &self,
    ctx: &RequestContext,
    input: NewRelationship,
  ) -> Result<Relationship> {
    let (project_id, provenance) = ctx.write_scope()?;
    let relationship = self
      .conn
      .call(move |conn| Ok(write_relationship(conn, project_id, provenance, input, false)))
      .await??;

    tracing::debug!(relationship_id = %relationship.relationship_id, "created relationship");
    Ok(relationship)
  }

  async fn upsert_relationship(
    &self,
    ctx: &RequestContext,
    input: NewRelationship,
  ) -> Result<Relationship> {
    let (project_id, provenance) = ctx.write_scope()?;
    let relationship = self
      .conn
      .call(move |conn| Ok(write_relationship(conn, project_id, provenance, input, true)))
      .await??;

    tracing::debug!(
      relationship_id = %relationship.relationship_id,
      source = %provenance.source,
      "upserted relationship"
    );
    Ok(relationship)
  }

  async fn get_relationship(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
  ) -> Result<Option<Relationship>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(relationship_id);

    self
      .conn
      .call(move |conn| Ok(select_relationship(conn, &id_str, &project_str)))
      .await?
  }

  async fn list_relationships(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<Vec<Relationship>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    self
      .conn
      .call(move |conn| {
        Ok(select_relationships(
          conn,
          "project_id = ?1 AND ontology_id = ?2",
          rusqlite::params![project_str, ontology_str],
        ))
      })
      .await?
  }

  async fn update_relationship_description(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
    description: String,
  ) -> Result<Relationship> {
    self.edit_relationship(ctx, relationship_id, description, None).await
  }

  async fn update_relationship_description_and_association(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
    description: String,
    association: String,
  ) -> Result<Relationship> {
    self.edit_relationship(ctx, relationship_id, description, Some(association)).await
  }

  async fn update_relationship_status(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
    status: RelationshipStatus,
  ) -> Result<Relationship> {
    let (project_id, provenance) = ctx.write_scope()?;
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(relationship_id);
    let status_str = status.as_ref().to_owned();
    let (source, user) = edit_columns(provenance);
    let at_str = encode_dt(Utc::now());

    let relationship = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE relationships
           SET status = ?1, last_edit_source = ?2, updated_by = ?3, updated_at = ?4
           WHERE relationship_id = ?5 AND project_id = ?6",
          rusqlite::params![status_str, source, user, at_str, id_str, project_str],
        )?;
        if updated == 0 {
          return Ok(Ok(None));
        }
        Ok(select_relationship(conn, &id_str, &project_str))
      })
      .await??;

    tracing::info!(%relationship_id, %status, "reviewed relationship");
    relationship.ok_or_else(|| ontic_core::Error::RelationshipNotFound(relationship_id).into())
  }

  async fn mark_relationships_stale(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<u64> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    let marked = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE relationships SET is_stale = 1
           WHERE project_id = ?1 AND ontology_id = ?2
             AND source = 'inference' AND status != 'rejected'",
          rusqlite::params![project_str, ontology_str],
        )?)
      })
      .await?;

    tracing::info!(%ontology_id, marked, "marked inference relationships stale");
    Ok(marked as u64)
  }

  async fn clear_relationship_stale(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
  ) -> Result<()> {
    let project_str = encode_uuid(ctx.project_id()?);
    let id_str = encode_uuid(relationship_id);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE relationships SET is_stale = 0
           WHERE relationship_id = ?1 AND project_id = ?2",
          rusqlite::params![id_str, project_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(ontic_core::Error::RelationshipNotFound(relationship_id).into());
    }
    Ok(())
  }

  async fn list_stale_relationships(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
  ) -> Result<Vec<Relationship>> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);

    self
      .conn
      .call(move |conn| {
        Ok(select_relationships(
          conn,
          "project_id = ?1 AND ontology_id = ?2 AND is_stale = 1",
          rusqlite::params![project_str, ontology_str],
        ))
      })
      .await?
  }

  async fn delete_relationships_by_source(
    &self,
    ctx: &RequestContext,
    ontology_id: Uuid,
    source: Source,
  ) -> Result<u64> {
    let project_str = encode_uuid(ctx.project_id()?);
    let ontology_str = encode_uuid(ontology_id);
    let source_str = source.as_ref().to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM relationships WHERE project_id = ?1 AND ontology_id = ?2 AND source = ?3",
          rusqlite::params![project_str, ontology_str, source_str],
        )?)
      })
      .await?;

    tracing::info!(%ontology_id, %source, deleted, "deleted relationships by provenance");
    Ok(deleted as u64)
  }
}

impl SqliteStore {
  /// Content edit of a relationship. `association: None` leaves the stored
  /// association alone.
  async fn edit_relationship(
    &self,
    ctx: &RequestContext,
    relationship_id: Uuid,
    description: String,
    association: Option<String>,
  ) -> Result<Relationship> {
    let (project_id, provenance) = ctx.write_scope()?;
    let project_str = encode_uuid(project_id);
    let id_str = encode_uuid(relationship_id);
    let (source, user) = edit_columns(provenance);
    let at_str = encode_dt(Utc::now());

    let relationship = self
      .conn
      .call(move |conn| {
        let updated = conn.execute(
          "UPDATE relationships
           SET description = ?1, association = COALESCE(?2, association),
               last_edit_source = ?3, updated_by = ?4, is_stale = 0, updated_at = ?5
           WHERE relationship_id = ?6 AND project_id = ?7",
          rusqlite::params![description, association, source, user, at_str, id_str, project_str],
        )?;
        if updated == 0 {
          return Ok(Ok(None));
        }
        Ok(select_relationship(conn, &id_str, &project_str))
      })
      .await??;

    relationship.ok_or_else(|| ontic_core::Error::RelationshipNotFound(relationship_id).into())
  }
}
