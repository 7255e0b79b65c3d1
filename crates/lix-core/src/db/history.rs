//! [`History`] and [`HistoryStore`] backed by a SQLite database file.
//!
//! Every write runs inside one `IMMEDIATE` transaction while holding the
//! writer lock next to the database file, so a commit and its changes become
//! visible together or not at all. Reads go through [`SqliteReadView`] when
//! they must observe a single consistent state across several queries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::Value;
use tracing::debug;

use super::{configure_connection, migrations, query};
use crate::account::Account;
use crate::config::StorageConfig;
use crate::error::{LixError, RecordKind, Result};
use crate::history::{History, HistoryStore, materialize_change};
use crate::lock::{WriterLock, lock_path_for};
use crate::model::{
    Branch, Change, ChangeId, Commit, CommitId, Conflict, NewChange, NewCommit, SnapshotId,
};
use crate::snapshot::Snapshot;

/// A persisted history.
#[derive(Debug)]
pub struct SqliteHistory {
    conn: Connection,
    path: Option<PathBuf>,
    lock_timeout: Duration,
}

/// A consistent read-only view over a [`SqliteHistory`].
///
/// Holds a deferred transaction: every query through the view sees the
/// database as of its first read, regardless of concurrent writers. The
/// transaction is rolled back on drop.
#[derive(Debug)]
pub struct SqliteReadView<'conn> {
    tx: Transaction<'conn>,
}

impl SqliteHistory {
    /// Open (or create) the history at `path` with default storage settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StorageConfig::default())
    }

    /// Open (or create) the history at `path`, apply pragmas, and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_with(path: &Path, config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        configure_connection(&conn, config.busy_timeout())?;
        let version = migrations::migrate(&mut conn)?;
        debug!(path = %path.display(), schema_version = version, "history opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            lock_timeout: config.lock_timeout(),
        })
    }

    /// A private in-memory database. No writer lock is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn,
            path: None,
            lock_timeout: StorageConfig::default().lock_timeout(),
        })
    }

    /// Database file path, `None` for in-memory histories.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection, for ad-hoc inspection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a consistent read view.
    ///
    /// A connection holds at most one view at a time. Compare a history with
    /// itself through a single view.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::InvalidInput`] if a view is already open on this
    /// connection, or a storage error if the transaction cannot be started.
    pub fn read_view(&self) -> Result<SqliteReadView<'_>> {
        if !self.conn.is_autocommit() {
            return Err(LixError::InvalidInput(
                "a read view is already open on this history".into(),
            ));
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        Ok(SqliteReadView { tx })
    }

    /// Known accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn accounts(&self) -> Result<Vec<Account>> {
        query::list_accounts(&self.conn)
    }

    /// The account new commits are attributed to when nothing else is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active_account(&self) -> Result<Account> {
        query::active_account(&self.conn)
    }

    /// Store `account` and make it active.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::InvalidInput`] for a blank name, or a storage error.
    pub fn set_active_account(&mut self, account: &Account) -> Result<()> {
        if account.name.trim().is_empty() {
            return Err(LixError::InvalidInput("account name must not be empty".into()));
        }
        self.write(|tx| query::upsert_active_account(tx, account))
    }

    /// Run `f` inside one immediate transaction while holding the writer lock.
    fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let _guard = match &self.path {
            Some(path) => Some(WriterLock::acquire(&lock_path_for(path), self.lock_timeout)?),
            None => None,
        };
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn advance_active_head(conn: &Connection, head: &CommitId) -> Result<()> {
    let mut active = query::active_branch(conn)?;
    active.head = Some(head.clone());
    query::upsert_branch(conn, &active)
}

fn write_changes(conn: &Connection, commit_id: &CommitId, changes: Vec<NewChange>) -> Result<Vec<Change>> {
    let mut written = Vec::with_capacity(changes.len());
    for input in changes {
        let (change, snapshot) = materialize_change(commit_id, input);
        if let Some(snapshot) = &snapshot {
            query::insert_snapshot(conn, snapshot)?;
        }
        query::insert_change(conn, &change)?;
        written.push(change);
    }
    Ok(written)
}

macro_rules! sqlite_reads {
    ($ty:ty, $this:ident => $conn:expr) => {
        impl History for $ty {
            fn snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
                let $this = self;
                query::get_snapshot($conn, id)?
                    .ok_or_else(|| LixError::not_found(RecordKind::Snapshot, id))
            }

            fn change(&self, id: &ChangeId) -> Result<Option<Change>> {
                let $this = self;
                query::get_change($conn, id)
            }

            fn commit(&self, id: &CommitId) -> Result<Option<Commit>> {
                let $this = self;
                query::get_commit($conn, id)
            }

            fn commits(&self) -> Result<Vec<Commit>> {
                let $this = self;
                query::list_commits($conn)
            }

            fn changes_for_entity(&self, entity_id: &str) -> Result<Vec<Change>> {
                let $this = self;
                query::changes_for_entity($conn, entity_id)
            }

            fn changes_in_commit(&self, commit_id: &CommitId) -> Result<Vec<Change>> {
                let $this = self;
                query::changes_in_commit($conn, commit_id)
            }

            fn entity_ids(&self) -> Result<Vec<String>> {
                let $this = self;
                query::entity_ids($conn)
            }

            fn active_branch(&self) -> Result<Branch> {
                let $this = self;
                query::active_branch($conn)
            }

            fn branches(&self) -> Result<Vec<Branch>> {
                let $this = self;
                query::list_branches($conn)
            }

            fn conflicts(&self) -> Result<Vec<Conflict>> {
                let $this = self;
                query::list_conflicts($conn)
            }

            fn contains_change(&self, id: &ChangeId) -> Result<bool> {
                let $this = self;
                query::change_exists($conn, id)
            }

            fn ancestors_of(&self, commit_id: &CommitId) -> Result<HashSet<CommitId>> {
                let $this = self;
                query::ancestors_of($conn, commit_id)
            }
        }
    };
}

sqlite_reads!(SqliteHistory, this => &this.conn);
sqlite_reads!(SqliteReadView<'_>, this => &this.tx);

impl HistoryStore for SqliteHistory {
    fn put_snapshot(&mut self, content: Value) -> Result<SnapshotId> {
        let snapshot = Snapshot::new(content);
        self.write(|tx| query::insert_snapshot(tx, &snapshot))?;
        Ok(snapshot.id)
    }

    fn add_commit(&mut self, commit: NewCommit) -> Result<CommitId> {
        let commit = commit.into_commit();
        self.write(|tx| {
            query::insert_commit(tx, &commit)?;
            advance_active_head(tx, &commit.id)
        })?;
        debug!(commit = %commit.id, "commit added");
        Ok(commit.id)
    }

    fn append_change(&mut self, commit_id: &CommitId, change: NewChange) -> Result<ChangeId> {
        let written = self.write(|tx| {
            if !query::commit_exists(tx, commit_id)? {
                return Err(LixError::not_found(RecordKind::Commit, commit_id));
            }
            write_changes(tx, commit_id, vec![change])
        })?;
        written
            .into_iter()
            .next()
            .map(|change| change.id)
            .ok_or_else(|| LixError::IntegrityViolation("change was not written".into()))
    }

    fn write_commit(
        &mut self,
        commit: NewCommit,
        changes: Vec<NewChange>,
    ) -> Result<(Commit, Vec<Change>)> {
        let commit = commit.into_commit();
        let written = self.write(|tx| {
            query::insert_commit(tx, &commit)?;
            let written = write_changes(tx, &commit.id, changes)?;
            advance_active_head(tx, &commit.id)?;
            Ok(written)
        })?;
        debug!(commit = %commit.id, changes = written.len(), "commit written");
        Ok((commit, written))
    }

    fn import_commit(
        &mut self,
        commit: Commit,
        changes: Vec<Change>,
        snapshots: Vec<Snapshot>,
    ) -> Result<()> {
        self.write(|tx| {
            if query::commit_exists(tx, &commit.id)? {
                return Ok(());
            }
            for snapshot in &snapshots {
                query::insert_snapshot(tx, snapshot)?;
            }
            query::insert_commit(tx, &commit)?;
            for change in &changes {
                if change.commit_id != commit.id {
                    return Err(LixError::missing_commit(&change.id, &change.commit_id));
                }
                if let Some(snapshot_id) = &change.snapshot_id {
                    if query::get_snapshot(tx, snapshot_id)?.is_none() {
                        return Err(LixError::missing_snapshot(&change.id, snapshot_id));
                    }
                }
                query::insert_change(tx, change)?;
            }
            Ok(())
        })
    }

    fn set_branch(&mut self, branch: Branch) -> Result<()> {
        self.write(|tx| {
            if let Some(head) = &branch.head {
                if !query::commit_exists(tx, head)? {
                    return Err(LixError::not_found(RecordKind::Commit, head));
                }
            }
            query::upsert_branch(tx, &branch)
        })
    }

    fn switch_branch(&mut self, name: &str) -> Result<Branch> {
        self.write(|tx| {
            let branch = query::get_branch(tx, name)?
                .ok_or_else(|| LixError::not_found(RecordKind::Branch, name))?;
            query::set_active_branch(tx, name)?;
            Ok(branch)
        })
    }

    fn record_conflicts(&mut self, conflicts: &[Conflict]) -> Result<usize> {
        self.write(|tx| {
            let mut added = 0;
            for conflict in conflicts {
                if query::insert_conflict(tx, conflict)? {
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    fn resolve_conflict(
        &mut self,
        change_id: &ChangeId,
        conflicting_change_id: &ChangeId,
        resolved_change_id: &ChangeId,
    ) -> Result<()> {
        self.write(|tx| {
            if query::set_conflict_resolution(tx, change_id, conflicting_change_id, resolved_change_id)? {
                Ok(())
            } else {
                Err(LixError::not_found(
                    RecordKind::Conflict,
                    format!("{change_id}/{conflicting_change_id}"),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::copy_history;
    use crate::history::MemoryHistory;
    use serde_json::json;

    fn temp_history() -> (tempfile::TempDir, SqliteHistory) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let history = SqliteHistory::open(&dir.path().join("lix.db")).expect("open history");
        (dir, history)
    }

    fn set(entity: &str, content: Value, ts: i64) -> NewChange {
        NewChange::set("variant", entity, content, "anna", ts)
    }

    #[test]
    fn open_sets_wal_and_foreign_keys() {
        let (_dir, history) = temp_history();
        let journal_mode: String = history
            .connection()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");
        let foreign_keys: i64 = history
            .connection()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn write_commit_round_trips_through_reads() {
        let (_dir, mut history) = temp_history();
        let (commit, changes) = history
            .write_commit(
                NewCommit::new(vec![], "anna", "init", 10),
                vec![set("e1", json!({"text": "hello"}), 10), NewChange::delete("variant", "e2", "anna", 11)],
            )
            .expect("write commit");

        let stored = history.commit(&commit.id).expect("read").expect("commit");
        assert_eq!(stored, commit);
        assert_eq!(history.changes_in_commit(&commit.id).expect("read"), changes);
        assert_eq!(
            history.active_branch().expect("branch").head,
            Some(commit.id.clone())
        );

        let snapshot_id = changes[0].snapshot_id.clone().expect("snapshot");
        assert_eq!(
            history.snapshot(&snapshot_id).expect("snapshot").content,
            json!({"text": "hello"})
        );
        assert!(changes[1].is_tombstone());
    }

    #[test]
    fn dangling_parent_writes_nothing() {
        let (_dir, mut history) = temp_history();
        let err = history
            .write_commit(
                NewCommit::new(vec![CommitId::new("ghost")], "anna", "x", 1),
                vec![set("e1", json!(1), 1)],
            )
            .unwrap_err();
        assert!(matches!(err, LixError::DanglingParent { .. }));
        assert!(history.commits().expect("commits").is_empty());
        assert!(history.entity_ids().expect("entities").is_empty());
    }

    #[test]
    fn identical_content_is_stored_once() {
        let (_dir, mut history) = temp_history();
        let a = history.put_snapshot(json!({"a": 1, "b": 2})).expect("put");
        let b = history.put_snapshot(json!({"b": 2, "a": 1})).expect("put");
        assert_eq!(a, b);
        let count: i64 = history
            .connection()
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn ancestors_follow_merge_parents() {
        let (_dir, mut history) = temp_history();
        let c0 = history.add_commit(NewCommit::new(vec![], "anna", "c0", 0)).expect("c0");
        let c1 = history
            .add_commit(NewCommit::new(vec![c0.clone()], "anna", "c1", 1))
            .expect("c1");
        let c2 = history
            .add_commit(NewCommit::new(vec![c0.clone()], "anna", "c2", 2))
            .expect("c2");
        let m = history
            .add_commit(NewCommit::new(vec![c1.clone(), c2.clone()], "anna", "m", 3))
            .expect("m");

        let ancestors = history.ancestors_of(&m).expect("ancestors");
        assert_eq!(ancestors, HashSet::from([c0, c1, c2]));
        assert!(history.ancestors_of(&CommitId::new("ghost")).unwrap_err().is_not_found());
    }

    #[test]
    fn reopen_preserves_history_and_branches() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("lix.db");
        let head = {
            let mut history = SqliteHistory::open(&path).expect("open");
            let (commit, _) = history
                .write_commit(NewCommit::new(vec![], "anna", "init", 1), vec![set("e1", json!("x"), 1)])
                .expect("write");
            history
                .set_branch(Branch::new("feature", Some(commit.id.clone())))
                .expect("branch");
            history.switch_branch("feature").expect("switch");
            commit.id
        };

        let history = SqliteHistory::open(&path).expect("reopen");
        let active = history.active_branch().expect("active");
        assert_eq!(active.name, "feature");
        assert_eq!(active.head, Some(head));
        assert_eq!(history.branches().expect("branches").len(), 2);
    }

    #[test]
    fn read_view_sees_committed_state() {
        let (_dir, mut history) = temp_history();
        let (commit, _) = history
            .write_commit(NewCommit::new(vec![], "anna", "init", 1), vec![set("e1", json!("x"), 1)])
            .expect("write");
        let view = history.read_view().expect("view");
        assert!(view.commit(&commit.id).expect("read").is_some());
        assert_eq!(view.entity_ids().expect("entities"), vec!["e1".to_string()]);
    }

    #[test]
    fn read_view_is_isolated_from_other_writers() {
        let (dir, mut history) = temp_history();
        history
            .write_commit(NewCommit::new(vec![], "anna", "init", 1), vec![set("e1", json!("x"), 1)])
            .expect("write");

        let view = history.read_view().expect("view");
        assert_eq!(view.commits().expect("commits").len(), 1);

        let mut other = SqliteHistory::open(&dir.path().join("lix.db")).expect("second connection");
        let head = other.active_branch().expect("branch").head;
        other
            .write_commit(
                NewCommit::new(head.into_iter().collect(), "bob", "more", 2),
                vec![set("e2", json!("y"), 2)],
            )
            .expect("concurrent write");

        assert_eq!(view.commits().expect("commits").len(), 1);
        assert_eq!(view.entity_ids().expect("entities"), vec!["e1".to_string()]);
        drop(view);
        assert_eq!(history.commits().expect("commits").len(), 2);
    }

    #[test]
    fn second_read_view_is_rejected() {
        let (_dir, history) = temp_history();
        let view = history.read_view().expect("view");
        let err = history.read_view().unwrap_err();
        assert!(matches!(err, LixError::InvalidInput(_)));
        drop(view);
        assert!(history.read_view().is_ok());
    }

    #[test]
    fn conflicts_are_idempotent_and_resolvable() {
        let (_dir, mut history) = temp_history();
        let conflict = Conflict::divergent(ChangeId::new("t"), ChangeId::new("s"));
        assert_eq!(history.record_conflicts(&[conflict.clone()]).expect("record"), 1);
        assert_eq!(history.record_conflicts(&[conflict]).expect("record"), 0);
        history
            .resolve_conflict(&ChangeId::new("t"), &ChangeId::new("s"), &ChangeId::new("r"))
            .expect("resolve");
        let stored = history.conflicts().expect("conflicts");
        assert_eq!(stored[0].resolved_change_id, Some(ChangeId::new("r")));
        assert!(
            history
                .resolve_conflict(&ChangeId::new("x"), &ChangeId::new("y"), &ChangeId::new("r"))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn active_account_defaults_to_anonymous() {
        let (_dir, mut history) = temp_history();
        assert_eq!(history.active_account().expect("account").name, "anonymous");
        history
            .set_active_account(&Account::new("anna"))
            .expect("set account");
        assert_eq!(history.active_account().expect("account").name, "anna");
        assert_eq!(history.accounts().expect("accounts").len(), 2);
    }

    #[test]
    fn copy_from_memory_preserves_ids() {
        let mut memory = MemoryHistory::new();
        let (commit, changes) = memory
            .write_commit(NewCommit::new(vec![], "anna", "init", 1), vec![set("e1", json!("x"), 1)])
            .expect("write");
        let (_dir, mut history) = temp_history();

        let report = copy_history(&memory, &mut history).expect("copy");
        assert_eq!(report.commits_copied, 1);
        assert_eq!(history.changes_in_commit(&commit.id).expect("read"), changes);
        assert_eq!(history.active_branch().expect("branch").head, Some(commit.id));

        let again = copy_history(&memory, &mut history).expect("copy again");
        assert_eq!(again.commits_copied, 0);
        assert_eq!(again.commits_skipped, 1);
    }
}
