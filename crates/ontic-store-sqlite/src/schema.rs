//! SQL schema for the Ontic SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ontologies (
    ontology_id TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    version     INTEGER NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    UNIQUE (project_id, version)
);

CREATE TABLE IF NOT EXISTS entities (
    entity_id        TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL,
    ontology_id      TEXT NOT NULL REFERENCES ontologies(ontology_id) ON DELETE CASCADE,
    name             TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    primary_schema   TEXT NOT NULL DEFAULT '',
    primary_table    TEXT NOT NULL DEFAULT '',
    primary_column   TEXT NOT NULL DEFAULT '',
    source           TEXT NOT NULL,   -- 'inference' | 'manual' | 'mcp'; set once
    last_edit_source TEXT,
    created_by       TEXT,
    updated_by       TEXT,
    is_stale         INTEGER NOT NULL DEFAULT 0,
    is_deleted       INTEGER NOT NULL DEFAULT 0,
    deletion_reason  TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- Soft-deleted rows do not block re-creating the same name.
CREATE UNIQUE INDEX IF NOT EXISTS entities_live_name_idx
    ON entities(ontology_id, name) WHERE is_deleted = 0;

CREATE TABLE IF NOT EXISTS entity_aliases (
    alias_id   TEXT PRIMARY KEY,
    entity_id  TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    alias      TEXT NOT NULL,
    source     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (entity_id, alias)
);

-- One row per direction; the reverse edge has its columns swapped.
CREATE TABLE IF NOT EXISTS relationships (
    relationship_id  TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL,
    ontology_id      TEXT NOT NULL REFERENCES ontologies(ontology_id) ON DELETE CASCADE,
    source_entity_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    target_entity_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    source_column_id TEXT NOT NULL,
    target_column_id TEXT NOT NULL,
    detection_method TEXT NOT NULL,
    confidence       REAL NOT NULL,
    cardinality      TEXT NOT NULL DEFAULT 'unknown',
    status           TEXT NOT NULL DEFAULT 'pending',
    description      TEXT,
    association      TEXT,
    source           TEXT NOT NULL,
    last_edit_source TEXT,
    created_by       TEXT,
    updated_by       TEXT,
    is_stale         INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (ontology_id, source_column_id, target_column_id)
);

CREATE TABLE IF NOT EXISTS ontology_questions (
    question_id  TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL,
    ontology_id  TEXT NOT NULL REFERENCES ontologies(ontology_id) ON DELETE CASCADE,
    text         TEXT NOT NULL,
    reasoning    TEXT,
    category     TEXT NOT NULL,
    priority     INTEGER NOT NULL,
    is_required  INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    answer       TEXT,
    answered_by  TEXT,
    answered_at  TEXT,
    created_at   TEXT NOT NULL,
    UNIQUE (ontology_id, content_hash)
);

-- Questions and answers live inside state_data (JSON).
CREATE TABLE IF NOT EXISTS workflow_entity_states (
    state_id    TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    ontology_id TEXT NOT NULL,
    workflow_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,   -- 'global' | 'table' | 'column'
    entity_key  TEXT NOT NULL,   -- '' | '<table>' | '<table>.<column>'
    status      TEXT NOT NULL DEFAULT 'pending',
    state_data  TEXT NOT NULL DEFAULT '{}',
    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    last_error  TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (workflow_id, entity_type, entity_key)
);

CREATE TABLE IF NOT EXISTS pending_changes (
    change_id         TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL,
    change_type       TEXT NOT NULL,
    change_source     TEXT NOT NULL,
    table_name        TEXT,
    column_name       TEXT,
    old_value         TEXT,   -- JSON
    new_value         TEXT,   -- JSON
    suggested_action  TEXT,
    suggested_payload TEXT,   -- JSON
    status            TEXT NOT NULL DEFAULT 'pending',
    reviewed_by       TEXT,
    reviewed_at       TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entities_ontology_idx      ON entities(ontology_id);
CREATE INDEX IF NOT EXISTS relationships_ontology_idx ON relationships(ontology_id);
CREATE INDEX IF NOT EXISTS questions_ontology_idx     ON ontology_questions(ontology_id, status);
CREATE INDEX IF NOT EXISTS states_workflow_idx        ON workflow_entity_states(workflow_id);
CREATE INDEX IF NOT EXISTS changes_project_idx        ON pending_changes(project_id, status);

PRAGMA user_version = 1;
";
