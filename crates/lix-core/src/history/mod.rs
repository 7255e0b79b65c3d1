//! The read and write contracts every lix history implements.
//!
//! Resolvers and the conflict detector are generic over [`History`], so they
//! run unchanged against two in-memory histories, two persisted ones, or one
//! of each.
//!
//! - [`History`]: point-in-time reads of snapshots, changes, commits,
//!   branches, and recorded conflicts. Side-effect free and cheap enough to
//!   poll.
//! - [`HistoryStore`]: append-only writes. A change is never visible without
//!   its owning commit.
//!
//! Implementations: [`memory::MemoryHistory`] and
//! [`crate::db::SqliteHistory`].

pub mod memory;

use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use tracing::debug;

use crate::dag::CommitGraph;
use crate::error::{LixError, RecordKind, Result};
use crate::model::{
    Branch, Change, ChangeId, Commit, CommitId, Conflict, NewChange, NewCommit, SnapshotId,
};
use crate::snapshot::Snapshot;

pub use memory::MemoryHistory;

/// Read contract of a history.
pub trait History {
    /// Fetch a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if no snapshot has that id.
    fn snapshot(&self, id: &SnapshotId) -> Result<Snapshot>;

    /// Fetch a change by id, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn change(&self, id: &ChangeId) -> Result<Option<Change>>;

    /// Fetch a commit by id, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn commit(&self, id: &CommitId) -> Result<Option<Commit>>;

    /// All commits, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn commits(&self) -> Result<Vec<Commit>>;

    /// Every change ever written for `entity_id`, across all commits.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn changes_for_entity(&self, entity_id: &str) -> Result<Vec<Change>>;

    /// Changes belonging to one commit, ordered by `(created_at_us, id)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn changes_in_commit(&self, commit_id: &CommitId) -> Result<Vec<Change>>;

    /// Distinct entity ids touched by any change, sorted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn entity_ids(&self) -> Result<Vec<String>>;

    /// The branch whose head scopes "current" views.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn active_branch(&self) -> Result<Branch>;

    /// All branches, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn branches(&self) -> Result<Vec<Branch>>;

    /// Conflicts recorded in this history, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn conflicts(&self) -> Result<Vec<Conflict>>;

    /// `true` if a change with this id exists anywhere in the log.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn contains_change(&self, id: &ChangeId) -> Result<bool> {
        Ok(self.change(id)?.is_some())
    }

    /// Transitive parents of `commit_id`, excluding the commit itself.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if `commit_id` is unknown, or
    /// [`LixError::IntegrityViolation`] if a parent link points nowhere.
    fn ancestors_of(&self, commit_id: &CommitId) -> Result<HashSet<CommitId>> {
        let start = self
            .commit(commit_id)?
            .ok_or_else(|| LixError::not_found(RecordKind::Commit, commit_id))?;

        let mut visited = HashSet::new();
        let mut queue: VecDeque<CommitId> = start.parent_ids.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if visited.contains(&current) {
                continue;
            }
            let commit = self.commit(&current)?.ok_or_else(|| {
                LixError::IntegrityViolation(format!(
                    "commit graph references missing commit {current}"
                ))
            })?;
            visited.insert(current);
            queue.extend(
                commit
                    .parent_ids
                    .into_iter()
                    .filter(|parent| !visited.contains(parent)),
            );
        }
        Ok(visited)
    }

    /// `true` if `a` is a strict ancestor of `b`.
    ///
    /// # Errors
    ///
    /// Same as [`History::ancestors_of`] for `b`.
    fn is_ancestor(&self, a: &CommitId, b: &CommitId) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        Ok(self.ancestors_of(b)?.contains(a))
    }

    /// Build the full in-memory commit graph.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    fn commit_graph(&self) -> Result<CommitGraph> {
        Ok(CommitGraph::from_commits(&self.commits()?))
    }
}

/// Write contract of a history. All writes are append-only.
pub trait HistoryStore: History {
    /// Store `content`, returning the existing id when identical content is
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    fn put_snapshot(&mut self, content: Value) -> Result<SnapshotId>;

    /// Add a commit and advance the active branch head to it.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::DanglingParent`] if any parent is unknown.
    fn add_commit(&mut self, commit: NewCommit) -> Result<CommitId>;

    /// Append one change to an existing commit.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the commit does not exist.
    fn append_change(&mut self, commit_id: &CommitId, change: NewChange) -> Result<ChangeId>;

    /// Write a commit together with its changes atomically and advance the
    /// active branch head. Either everything becomes visible or nothing does.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::DanglingParent`] if any parent is unknown, or a
    /// storage error if the write fails (in which case nothing was written).
    fn write_commit(
        &mut self,
        commit: NewCommit,
        changes: Vec<NewChange>,
    ) -> Result<(Commit, Vec<Change>)>;

    /// Insert existing records verbatim, preserving their ids. Used to fork
    /// one history into another. Does not move branch heads.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::DanglingParent`] for unknown parents, or
    /// [`LixError::IntegrityViolation`] if a change references a snapshot
    /// that is neither stored nor supplied, or a commit other than `commit`.
    fn import_commit(
        &mut self,
        commit: Commit,
        changes: Vec<Change>,
        snapshots: Vec<Snapshot>,
    ) -> Result<()>;

    /// Create or move a branch.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the head commit does not exist.
    fn set_branch(&mut self, branch: Branch) -> Result<()>;

    /// Make `name` the active branch.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the branch does not exist.
    fn switch_branch(&mut self, name: &str) -> Result<Branch>;

    /// Persist conflicts, ignoring ones already recorded. Returns how many
    /// were new.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    fn record_conflicts(&mut self, conflicts: &[Conflict]) -> Result<usize>;

    /// Fill in `resolved_change_id` for a recorded conflict.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the conflict is not recorded.
    fn resolve_conflict(
        &mut self,
        change_id: &ChangeId,
        conflicting_change_id: &ChangeId,
        resolved_change_id: &ChangeId,
    ) -> Result<()>;
}

/// Build the stored change for `input`, returning it with the snapshot it
/// needs (if any).
pub(crate) fn materialize_change(
    commit_id: &CommitId,
    input: NewChange,
) -> (Change, Option<Snapshot>) {
    let snapshot = input.content.map(Snapshot::new);
    let change = Change {
        id: ChangeId::generate(),
        entity_type: input.entity_type,
        entity_id: input.entity_id,
        snapshot_id: snapshot.as_ref().map(|s| s.id.clone()),
        commit_id: commit_id.clone(),
        author: input.author,
        created_at_us: input.created_at_us,
    };
    (change, snapshot)
}

/// Summary of a [`copy_history`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyReport {
    pub commits_copied: usize,
    pub commits_skipped: usize,
    pub changes_copied: usize,
}

/// Copy every commit, change, snapshot, and branch of `src` into `dst`,
/// preserving ids. Commits already present in `dst` are skipped, so the copy
/// can be repeated to pull in new commits.
///
/// # Errors
///
/// Propagates read errors from `src` and write errors from `dst`. A change
/// in `src` referencing a missing snapshot is an
/// [`LixError::IntegrityViolation`].
pub fn copy_history<S, D>(src: &S, dst: &mut D) -> Result<CopyReport>
where
    S: History + ?Sized,
    D: HistoryStore + ?Sized,
{
    let graph = src.commit_graph()?;
    let mut report = CopyReport::default();

    for commit in graph.topological_order() {
        if dst.commit(&commit.id)?.is_some() {
            report.commits_skipped += 1;
            continue;
        }

        let changes = src.changes_in_commit(&commit.id)?;
        let mut snapshots = Vec::new();
        let mut seen = HashSet::new();
        for change in &changes {
            if let Some(snapshot_id) = &change.snapshot_id {
                if seen.insert(snapshot_id.clone()) {
                    let snapshot = src.snapshot(snapshot_id).map_err(|err| {
                        if err.is_not_found() {
                            LixError::missing_snapshot(&change.id, snapshot_id)
                        } else {
                            err
                        }
                    })?;
                    snapshots.push(snapshot);
                }
            }
        }

        report.changes_copied += changes.len();
        report.commits_copied += 1;
        dst.import_commit(commit.clone(), changes, snapshots)?;
    }

    for branch in src.branches()? {
        dst.set_branch(branch)?;
    }
    let active = src.active_branch()?;
    dst.switch_branch(&active.name)?;

    debug!(
        commits_copied = report.commits_copied,
        commits_skipped = report.commits_skipped,
        changes_copied = report.changes_copied,
        "history copied"
    );
    Ok(report)
}
