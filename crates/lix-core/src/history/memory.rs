//! In-memory history.
//!
//! Holds every record in hash maps with secondary indexes by entity and by
//! commit. Cloning a [`MemoryHistory`] forks it: the clone shares the past
//! but evolves independently from then on.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use super::{History, HistoryStore, materialize_change};
use crate::error::{LixError, RecordKind, Result};
use crate::model::{
    Branch, Change, ChangeId, Commit, CommitId, Conflict, DEFAULT_BRANCH, NewChange, NewCommit,
    SnapshotId,
};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone)]
pub struct MemoryHistory {
    snapshots: HashMap<SnapshotId, Snapshot>,
    commits: HashMap<CommitId, Commit>,
    changes: HashMap<ChangeId, Change>,
    by_entity: HashMap<String, Vec<ChangeId>>,
    by_commit: HashMap<CommitId, Vec<ChangeId>>,
    branches: BTreeMap<String, Branch>,
    active_branch: String,
    conflicts: BTreeMap<(ChangeId, ChangeId), Conflict>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistory {
    /// An empty history with the default branch active.
    #[must_use]
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), Branch::default_branch());
        Self {
            snapshots: HashMap::new(),
            commits: HashMap::new(),
            changes: HashMap::new(),
            by_entity: HashMap::new(),
            by_commit: HashMap::new(),
            branches,
            active_branch: DEFAULT_BRANCH.to_string(),
            conflicts: BTreeMap::new(),
        }
    }

    /// Number of distinct snapshots stored.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Number of changes stored.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    fn check_parents(&self, commit: &Commit) -> Result<()> {
        for parent in &commit.parent_ids {
            if !self.commits.contains_key(parent) {
                return Err(LixError::DanglingParent {
                    commit: commit.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
        Ok(())
    }

    fn insert_change(&mut self, change: Change) {
        self.by_entity
            .entry(change.entity_id.clone())
            .or_default()
            .push(change.id.clone());
        self.by_commit
            .entry(change.commit_id.clone())
            .or_default()
            .push(change.id.clone());
        self.changes.insert(change.id.clone(), change);
    }

    fn insert_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshots.entry(snapshot.id.clone()).or_insert(snapshot);
    }

    fn advance_active_head(&mut self, head: &CommitId) {
        let name = self.active_branch.clone();
        self.branches
            .entry(name.clone())
            .or_insert_with(|| Branch::new(name, None))
            .head = Some(head.clone());
    }

    fn collect(&self, ids: Option<&Vec<ChangeId>>) -> Vec<Change> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.changes.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

impl History for MemoryHistory {
    fn snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| LixError::not_found(RecordKind::Snapshot, id))
    }

    fn change(&self, id: &ChangeId) -> Result<Option<Change>> {
        Ok(self.changes.get(id).cloned())
    }

    fn commit(&self, id: &CommitId) -> Result<Option<Commit>> {
        Ok(self.commits.get(id).cloned())
    }

    fn commits(&self) -> Result<Vec<Commit>> {
        Ok(self.commits.values().cloned().collect())
    }

    fn changes_for_entity(&self, entity_id: &str) -> Result<Vec<Change>> {
        Ok(self.collect(self.by_entity.get(entity_id)))
    }

    fn changes_in_commit(&self, commit_id: &CommitId) -> Result<Vec<Change>> {
        let mut changes = self.collect(self.by_commit.get(commit_id));
        changes.sort_by(|a, b| a.leaf_key().cmp(&b.leaf_key()));
        Ok(changes)
    }

    fn entity_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.by_entity.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn active_branch(&self) -> Result<Branch> {
        self.branches
            .get(&self.active_branch)
            .cloned()
            .ok_or_else(|| LixError::not_found(RecordKind::Branch, &self.active_branch))
    }

    fn branches(&self) -> Result<Vec<Branch>> {
        Ok(self.branches.values().cloned().collect())
    }

    fn conflicts(&self) -> Result<Vec<Conflict>> {
        Ok(self.conflicts.values().cloned().collect())
    }

    fn contains_change(&self, id: &ChangeId) -> Result<bool> {
        Ok(self.changes.contains_key(id))
    }
}

impl HistoryStore for MemoryHistory {
    fn put_snapshot(&mut self, content: Value) -> Result<SnapshotId> {
        let snapshot = Snapshot::new(content);
        let id = snapshot.id.clone();
        self.insert_snapshot(snapshot);
        Ok(id)
    }

    fn add_commit(&mut self, commit: NewCommit) -> Result<CommitId> {
        let commit = commit.into_commit();
        self.check_parents(&commit)?;
        let id = commit.id.clone();
        self.commits.insert(id.clone(), commit);
        self.advance_active_head(&id);
        debug!(commit = %id, "commit added");
        Ok(id)
    }

    fn append_change(&mut self, commit_id: &CommitId, change: NewChange) -> Result<ChangeId> {
        if !self.commits.contains_key(commit_id) {
            return Err(LixError::not_found(RecordKind::Commit, commit_id));
        }
        let (change, snapshot) = materialize_change(commit_id, change);
        if let Some(snapshot) = snapshot {
            self.insert_snapshot(snapshot);
        }
        let id = change.id.clone();
        self.insert_change(change);
        Ok(id)
    }

    fn write_commit(
        &mut self,
        commit: NewCommit,
        changes: Vec<NewChange>,
    ) -> Result<(Commit, Vec<Change>)> {
        let commit = commit.into_commit();
        // Validate before touching any state so a failure leaves nothing behind.
        self.check_parents(&commit)?;

        let mut written = Vec::with_capacity(changes.len());
        self.commits.insert(commit.id.clone(), commit.clone());
        for input in changes {
            let (change, snapshot) = materialize_change(&commit.id, input);
            if let Some(snapshot) = snapshot {
                self.insert_snapshot(snapshot);
            }
            written.push(change.clone());
            self.insert_change(change);
        }
        self.advance_active_head(&commit.id);
        debug!(commit = %commit.id, changes = written.len(), "commit written");
        Ok((commit, written))
    }

    fn import_commit(
        &mut self,
        commit: Commit,
        changes: Vec<Change>,
        snapshots: Vec<Snapshot>,
    ) -> Result<()> {
        if self.commits.contains_key(&commit.id) {
            return Ok(());
        }
        self.check_parents(&commit)?;

        let supplied: HashMap<&SnapshotId, &Snapshot> =
            snapshots.iter().map(|s| (&s.id, s)).collect();
        for change in &changes {
            if change.commit_id != commit.id {
                return Err(LixError::missing_commit(&change.id, &change.commit_id));
            }
            if let Some(snapshot_id) = &change.snapshot_id {
                if !supplied.contains_key(snapshot_id) && !self.snapshots.contains_key(snapshot_id)
                {
                    return Err(LixError::missing_snapshot(&change.id, snapshot_id));
                }
            }
        }

        for snapshot in snapshots {
            self.insert_snapshot(snapshot);
        }
        self.commits.insert(commit.id.clone(), commit);
        for change in changes {
            if !self.changes.contains_key(&change.id) {
                self.insert_change(change);
            }
        }
        Ok(())
    }

    fn set_branch(&mut self, branch: Branch) -> Result<()> {
        if let Some(head) = &branch.head {
            if !self.commits.contains_key(head) {
                return Err(LixError::not_found(RecordKind::Commit, head));
            }
        }
        self.branches.insert(branch.name.clone(), branch);
        Ok(())
    }

    fn switch_branch(&mut self, name: &str) -> Result<Branch> {
        let branch = self
            .branches
            .get(name)
            .cloned()
            .ok_or_else(|| LixError::not_found(RecordKind::Branch, name))?;
        self.active_branch = name.to_string();
        Ok(branch)
    }

    fn record_conflicts(&mut self, conflicts: &[Conflict]) -> Result<usize> {
        let mut added = 0;
        for conflict in conflicts {
            let key = (
                conflict.change_id.clone(),
                conflict.conflicting_change_id.clone(),
            );
            if !self.conflicts.contains_key(&key) {
                self.conflicts.insert(key, conflict.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn resolve_conflict(
        &mut self,
        change_id: &ChangeId,
        conflicting_change_id: &ChangeId,
        resolved_change_id: &ChangeId,
    ) -> Result<()> {
        let key = (change_id.clone(), conflicting_change_id.clone());
        let conflict = self.conflicts.get_mut(&key).ok_or_else(|| {
            LixError::not_found(
                RecordKind::Conflict,
                format!("{change_id}/{conflicting_change_id}"),
            )
        })?;
        conflict.resolved_change_id = Some(resolved_change_id.clone());
        Ok(())
    }
}
