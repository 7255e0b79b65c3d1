//! SQLite schema for a persisted lix history.
//!
//! Every history table is append-only:
//! - `snapshots` is keyed by content hash, so identical content is stored once
//! - `commits` and `commit_parents` form the commit graph
//! - `changes` is the change log; the entity and commit indexes serve the
//!   resolver's two access patterns
//! - `branches` and `active_branch` are the only mutable rows
//! - `lix_meta` tracks the schema version
//!
//! Update triggers reject edits to history rows at the storage layer.

/// Migration v1: history tables, branches, and immutability triggers.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    CHECK (id LIKE 'blake3:%')
);

CREATE TABLE IF NOT EXISTS commits (
    id TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS commit_parents (
    commit_id TEXT NOT NULL REFERENCES commits(id),
    parent_id TEXT NOT NULL REFERENCES commits(id),
    position INTEGER NOT NULL,
    PRIMARY KEY (commit_id, parent_id),
    CHECK (commit_id <> parent_id)
);

CREATE TABLE IF NOT EXISTS changes (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    snapshot_id TEXT REFERENCES snapshots(id),
    commit_id TEXT NOT NULL REFERENCES commits(id),
    author TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS branches (
    name TEXT PRIMARY KEY CHECK (length(trim(name)) > 0),
    head_commit_id TEXT REFERENCES commits(id)
);

CREATE TABLE IF NOT EXISTS active_branch (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    name TEXT NOT NULL REFERENCES branches(name)
);

CREATE TABLE IF NOT EXISTS lix_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO branches (name, head_commit_id) VALUES ('main', NULL);
INSERT OR IGNORE INTO active_branch (id, name) VALUES (1, 'main');
INSERT OR IGNORE INTO lix_meta (id, schema_version) VALUES (1, 1);

CREATE INDEX IF NOT EXISTS idx_changes_entity
    ON changes(entity_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_changes_commit
    ON changes(commit_id, created_at_us);

CREATE INDEX IF NOT EXISTS idx_commit_parents_parent
    ON commit_parents(parent_id);

CREATE TRIGGER IF NOT EXISTS snapshots_immutable
BEFORE UPDATE ON snapshots
BEGIN
    SELECT RAISE(ABORT, 'snapshots are immutable');
END;

CREATE TRIGGER IF NOT EXISTS commits_immutable
BEFORE UPDATE ON commits
BEGIN
    SELECT RAISE(ABORT, 'commits are immutable');
END;

CREATE TRIGGER IF NOT EXISTS changes_immutable
BEFORE UPDATE ON changes
BEGIN
    SELECT RAISE(ABORT, 'changes are immutable');
END;
"#;

/// Migration v2: recorded conflicts and accounts.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conflicts (
    change_id TEXT NOT NULL,
    conflicting_change_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    metadata TEXT,
    resolved_change_id TEXT,
    PRIMARY KEY (change_id, conflicting_change_id)
);

CREATE TRIGGER IF NOT EXISTS conflicts_resolution_only
BEFORE UPDATE ON conflicts
WHEN new.change_id IS NOT old.change_id
  OR new.conflicting_change_id IS NOT old.conflicting_change_id
  OR new.reason IS NOT old.reason
  OR new.metadata IS NOT old.metadata
BEGIN
    SELECT RAISE(ABORT, 'only conflict resolution may be updated');
END;

CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0)
);

CREATE TABLE IF NOT EXISTS active_account (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    account_id TEXT NOT NULL REFERENCES accounts(id)
);

INSERT OR IGNORE INTO accounts (id, name) VALUES ('anonymous', 'anonymous');
INSERT OR IGNORE INTO active_account (id, account_id) VALUES (1, 'anonymous');

CREATE INDEX IF NOT EXISTS idx_conflicts_conflicting
    ON conflicts(conflicting_change_id);
"#;

/// Indexes every migrated database is expected to carry.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_changes_entity",
    "idx_changes_commit",
    "idx_commit_parents_parent",
    "idx_conflicts_conflicting",
];
