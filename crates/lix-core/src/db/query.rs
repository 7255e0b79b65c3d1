//! Query and insert helpers for the history database.
//!
//! All functions take a shared `&Connection`, so they run equally against a
//! plain connection or an open transaction (which derefs to one). Rows are
//! always mapped into the typed model records, never returned raw.

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::account::Account;
use crate::error::{LixError, RecordKind, Result};
use crate::model::{Branch, Change, ChangeId, Commit, CommitId, Conflict, SnapshotId};
use crate::snapshot::Snapshot;

const CHANGE_COLUMNS: &str =
    "id, entity_type, entity_id, snapshot_id, commit_id, author, created_at_us";

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<Change> {
    Ok(Change {
        id: ChangeId::new(row.get::<_, String>(0)?),
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        snapshot_id: row.get::<_, Option<String>>(3)?.map(SnapshotId::new),
        commit_id: CommitId::new(row.get::<_, String>(4)?),
        author: row.get(5)?,
        created_at_us: row.get(6)?,
    })
}

fn query_changes(conn: &Connection, sql: &str, key: &str) -> Result<Vec<Change>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![key], row_to_change)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch a snapshot by id.
///
/// # Errors
///
/// Returns an error if the query fails or the stored content is not JSON.
pub fn get_snapshot(conn: &Connection, id: &SnapshotId) -> Result<Option<Snapshot>> {
    let content: Option<String> = conn
        .query_row(
            "SELECT content FROM snapshots WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    content
        .map(|raw| {
            Ok(Snapshot {
                id: id.clone(),
                content: serde_json::from_str(&raw)?,
            })
        })
        .transpose()
}

/// Fetch a change by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_change(conn: &Connection, id: &ChangeId) -> Result<Option<Change>> {
    let sql = format!("SELECT {CHANGE_COLUMNS} FROM changes WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id.as_str()], row_to_change)
        .optional()?)
}

/// `true` if a change with this id is stored.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn change_exists(conn: &Connection, id: &ChangeId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM changes WHERE id = ?1)",
        params![id.as_str()],
        |row| row.get(0),
    )?)
}

/// `true` if a commit with this id is stored.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn commit_exists(conn: &Connection, id: &CommitId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM commits WHERE id = ?1)",
        params![id.as_str()],
        |row| row.get(0),
    )?)
}

fn parents_of(conn: &Connection, id: &CommitId) -> Result<Vec<CommitId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_id FROM commit_parents WHERE commit_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![id.as_str()], |row| {
        row.get::<_, String>(0).map(CommitId::new)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Fetch a commit with its ordered parent list.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_commit(conn: &Connection, id: &CommitId) -> Result<Option<Commit>> {
    let row = conn
        .query_row(
            "SELECT author, description, created_at_us FROM commits WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((author, description, created_at_us)) = row else {
        return Ok(None);
    };
    Ok(Some(Commit {
        id: id.clone(),
        parent_ids: parents_of(conn, id)?,
        author,
        description,
        created_at_us,
    }))
}

/// All commits with their parents, ordered by `(created_at_us, id)`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_commits(conn: &Connection) -> Result<Vec<Commit>> {
    let mut parents: HashMap<String, Vec<CommitId>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT commit_id, parent_id FROM commit_parents ORDER BY commit_id, position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (commit_id, parent_id) = row?;
            parents
                .entry(commit_id)
                .or_default()
                .push(CommitId::new(parent_id));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, author, description, created_at_us FROM commits \
         ORDER BY created_at_us, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut commits = Vec::new();
    for row in rows {
        let (id, author, description, created_at_us) = row?;
        let parent_ids = parents.remove(&id).unwrap_or_default();
        commits.push(Commit {
            id: CommitId::new(id),
            parent_ids,
            author,
            description,
            created_at_us,
        });
    }
    Ok(commits)
}

/// Transitive parents of `id` via a recursive query, excluding `id`.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if `id` is not stored.
pub fn ancestors_of(conn: &Connection, id: &CommitId) -> Result<HashSet<CommitId>> {
    if !commit_exists(conn, id)? {
        return Err(LixError::not_found(RecordKind::Commit, id));
    }
    let mut stmt = conn.prepare_cached(
        "WITH RECURSIVE ancestry(id) AS (
             SELECT parent_id FROM commit_parents WHERE commit_id = ?1
             UNION
             SELECT cp.parent_id
             FROM commit_parents cp
             JOIN ancestry a ON cp.commit_id = a.id
         )
         SELECT id FROM ancestry",
    )?;
    let rows = stmt.query_map(params![id.as_str()], |row| {
        row.get::<_, String>(0).map(CommitId::new)
    })?;
    Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
}

/// Every change for `entity_id`, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn changes_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<Change>> {
    let sql = format!(
        "SELECT {CHANGE_COLUMNS} FROM changes WHERE entity_id = ?1 \
         ORDER BY created_at_us DESC, id DESC"
    );
    query_changes(conn, &sql, entity_id)
}

/// Changes of one commit ordered by `(created_at_us, id)`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn changes_in_commit(conn: &Connection, commit_id: &CommitId) -> Result<Vec<Change>> {
    let sql = format!(
        "SELECT {CHANGE_COLUMNS} FROM changes WHERE commit_id = ?1 \
         ORDER BY created_at_us, id"
    );
    query_changes(conn, &sql, commit_id.as_str())
}

/// Distinct entity ids, sorted.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn entity_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT entity_id FROM changes ORDER BY entity_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn row_to_branch(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        name: row.get(0)?,
        head: row.get::<_, Option<String>>(1)?.map(CommitId::new),
    })
}

/// Fetch one branch by name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_branch(conn: &Connection, name: &str) -> Result<Option<Branch>> {
    Ok(conn
        .query_row(
            "SELECT name, head_commit_id FROM branches WHERE name = ?1",
            params![name],
            row_to_branch,
        )
        .optional()?)
}

/// The active branch.
///
/// # Errors
///
/// Returns [`LixError::IntegrityViolation`] if the active branch row is
/// missing.
pub fn active_branch(conn: &Connection) -> Result<Branch> {
    conn.query_row(
        "SELECT b.name, b.head_commit_id
         FROM active_branch a JOIN branches b ON b.name = a.name
         WHERE a.id = 1",
        [],
        row_to_branch,
    )
    .optional()?
    .ok_or_else(|| LixError::IntegrityViolation("no active branch recorded".to_string()))
}

/// All branches, sorted by name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_branches(conn: &Connection) -> Result<Vec<Branch>> {
    let mut stmt = conn.prepare("SELECT name, head_commit_id FROM branches ORDER BY name")?;
    let rows = stmt.query_map([], row_to_branch)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Recorded conflicts ordered by `(change_id, conflicting_change_id)`.
///
/// # Errors
///
/// Returns an error if the query fails or stored metadata is not JSON.
pub fn list_conflicts(conn: &Connection) -> Result<Vec<Conflict>> {
    let mut stmt = conn.prepare(
        "SELECT change_id, conflicting_change_id, reason, metadata, resolved_change_id
         FROM conflicts ORDER BY change_id, conflicting_change_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut conflicts = Vec::new();
    for row in rows {
        let (change_id, conflicting, reason, metadata, resolved) = row?;
        conflicts.push(Conflict {
            change_id: ChangeId::new(change_id),
            conflicting_change_id: ChangeId::new(conflicting),
            reason,
            metadata: metadata
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
            resolved_change_id: resolved.map(ChangeId::new),
        });
    }
    Ok(conflicts)
}

/// All known accounts, sorted by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT id, name FROM accounts ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Account {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// The active account.
///
/// # Errors
///
/// Returns [`LixError::IntegrityViolation`] if no active account is recorded.
pub fn active_account(conn: &Connection) -> Result<Account> {
    conn.query_row(
        "SELECT acc.id, acc.name
         FROM active_account a JOIN accounts acc ON acc.id = a.account_id
         WHERE a.id = 1",
        [],
        |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LixError::IntegrityViolation("no active account recorded".to_string()))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a snapshot unless its content hash is already stored.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    conn.prepare_cached("INSERT OR IGNORE INTO snapshots (id, content) VALUES (?1, ?2)")?
        .execute(params![
            snapshot.id.as_str(),
            serde_json::to_string(&snapshot.content)?
        ])?;
    Ok(())
}

/// Insert a commit and its parent links.
///
/// # Errors
///
/// Returns [`LixError::DanglingParent`] if a parent is not stored.
pub fn insert_commit(conn: &Connection, commit: &Commit) -> Result<()> {
    for parent in &commit.parent_ids {
        if !commit_exists(conn, parent)? {
            return Err(LixError::DanglingParent {
                commit: commit.id.clone(),
                parent: parent.clone(),
            });
        }
    }

    conn.prepare_cached(
        "INSERT INTO commits (id, author, description, created_at_us) VALUES (?1, ?2, ?3, ?4)",
    )?
    .execute(params![
        commit.id.as_str(),
        commit.author,
        commit.description,
        commit.created_at_us
    ])?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO commit_parents (commit_id, parent_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, parent) in (0_i64..).zip(&commit.parent_ids) {
        stmt.execute(params![commit.id.as_str(), parent.as_str(), position])?;
    }
    Ok(())
}

/// Insert a change unless one with the same id is already stored.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_change(conn: &Connection, change: &Change) -> Result<()> {
    conn.prepare_cached(
        "INSERT OR IGNORE INTO changes
            (id, entity_type, entity_id, snapshot_id, commit_id, author, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        change.id.as_str(),
        change.entity_type,
        change.entity_id,
        change.snapshot_id.as_ref().map(SnapshotId::as_str),
        change.commit_id.as_str(),
        change.author,
        change.created_at_us
    ])?;
    Ok(())
}

/// Create a branch or move its head.
///
/// # Errors
///
/// Returns an error if the upsert fails.
pub fn upsert_branch(conn: &Connection, branch: &Branch) -> Result<()> {
    conn.execute(
        "INSERT INTO branches (name, head_commit_id) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET head_commit_id = excluded.head_commit_id",
        params![branch.name, branch.head.as_ref().map(CommitId::as_str)],
    )?;
    Ok(())
}

/// Point the active branch row at `name`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_active_branch(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO active_branch (id, name) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![name],
    )?;
    Ok(())
}

/// Insert a conflict, returning `true` if it was not recorded before.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_conflict(conn: &Connection, conflict: &Conflict) -> Result<bool> {
    let metadata = conflict
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let inserted = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO conflicts
                (change_id, conflicting_change_id, reason, metadata, resolved_change_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![
            conflict.change_id.as_str(),
            conflict.conflicting_change_id.as_str(),
            conflict.reason,
            metadata,
            conflict.resolved_change_id.as_ref().map(ChangeId::as_str)
        ])?;
    Ok(inserted > 0)
}

/// Set the resolution of a recorded conflict. Returns `false` if no such
/// conflict exists.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_conflict_resolution(
    conn: &Connection,
    change_id: &ChangeId,
    conflicting_change_id: &ChangeId,
    resolved_change_id: &ChangeId,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE conflicts SET resolved_change_id = ?3
         WHERE change_id = ?1 AND conflicting_change_id = ?2",
        params![
            change_id.as_str(),
            conflicting_change_id.as_str(),
            resolved_change_id.as_str()
        ],
    )?;
    Ok(updated > 0)
}

/// Insert an account if missing and make it the active one.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_active_account(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "INSERT INTO accounts (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![account.id, account.name],
    )?;
    conn.execute(
        "INSERT INTO active_account (id, account_id) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET account_id = excluded.account_id",
        params![account.id],
    )?;
    Ok(())
}
