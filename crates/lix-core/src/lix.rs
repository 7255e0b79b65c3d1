//! The [`Lix`] facade: one history plus the clock, author, and exporters
//! that surround every write.
//!
//! A commit is written atomically through [`HistoryStore::write_commit`];
//! exporters run afterwards, outside that transaction, and their failures
//! only show up in the returned [`ExportReport`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::account::resolve_author;
use crate::branch::BranchView;
use crate::clock::{Clock, SystemClock};
use crate::config::{DB_FILE, LixConfig, lix_dir, resolve_config, write_default_config};
use crate::dag::merge_base;
use crate::db::SqliteHistory;
use crate::error::{LixError, RecordKind, Result};
use crate::export::{
    ExportBatch, ExportPipeline, ExportReport, ExportedChange, Exporter, FileMirrorExporter,
    JsonlExporter,
};
use crate::history::{CopyReport, History, HistoryStore, MemoryHistory, copy_history};
use crate::merge::{ConflictReport, detect_conflicts_in};
use crate::model::{Branch, Change, ChangeId, Commit, CommitId, Conflict, NewChange, NewCommit};
use crate::resolve::{self, ChangePair};

/// One requested mutation in a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Set {
        entity_type: String,
        entity_id: String,
        content: Value,
    },
    Delete {
        entity_type: String,
        entity_id: String,
    },
}

impl Edit {
    #[must_use]
    pub fn set(entity_type: impl Into<String>, entity_id: impl Into<String>, content: Value) -> Self {
        Self::Set {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            content,
        }
    }

    #[must_use]
    pub fn delete(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::Delete {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    fn entity(&self) -> (&str, &str) {
        match self {
            Self::Set {
                entity_type,
                entity_id,
                ..
            }
            | Self::Delete {
                entity_type,
                entity_id,
            } => (entity_type, entity_id),
        }
    }

    fn content(&self) -> Option<&Value> {
        match self {
            Self::Set { content, .. } => Some(content),
            Self::Delete { .. } => None,
        }
    }

    fn into_new_change(self, author: &str, ts: i64) -> NewChange {
        match self {
            Self::Set {
                entity_type,
                entity_id,
                content,
            } => NewChange::set(entity_type, entity_id, content, author, ts),
            Self::Delete {
                entity_type,
                entity_id,
            } => NewChange::delete(entity_type, entity_id, author, ts),
        }
    }
}

/// What a successful [`Lix::commit`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitOutcome {
    pub commit: Commit,
    pub changes: Vec<Change>,
    pub export: ExportReport,
}

/// Before and after content of one change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDiff {
    pub change: Change,
    pub previous_change_id: Option<ChangeId>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

pub struct Lix<H = SqliteHistory> {
    history: H,
    clock: Box<dyn Clock>,
    exporters: ExportPipeline,
    author: String,
    root: Option<PathBuf>,
}

impl<H> std::fmt::Debug for Lix<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lix")
            .field("author", &self.author)
            .field("root", &self.root)
            .field("exporters", &self.exporters)
            .finish_non_exhaustive()
    }
}

impl Lix<SqliteHistory> {
    /// Create `.lix/` under `root` with a default config and an empty
    /// history, then open it. Opening an existing lix directory is allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn init(root: &Path) -> Result<Self> {
        write_default_config(root)?;
        let lix = Self::open(root)?;
        info!(root = %root.display(), "lix initialized");
        Ok(lix)
    }

    /// Open the lix directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotInitialized`] if `root` has no history.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_as(root, None)
    }

    /// Open with an explicit author taking precedence over every other
    /// source.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotInitialized`] if `root` has no history, or
    /// [`LixError::Config`] if the config is malformed.
    pub fn open_as(root: &Path, explicit_author: Option<&str>) -> Result<Self> {
        let dir = lix_dir(root);
        if !dir.is_dir() {
            return Err(LixError::NotInitialized(root.to_path_buf()));
        }
        let db_path = dir.join(DB_FILE);
        let config = resolve_config(root)?;
        let history = SqliteHistory::open_with(&db_path, &config.storage)?;
        let stored = history.active_account()?;
        let author = resolve_author(explicit_author, config.author.name.as_deref(), Some(&stored));

        let mut lix = Self::from_history(history, author);
        lix.root = Some(root.to_path_buf());
        lix.register_configured_exporters(&config, root);
        Ok(lix)
    }

    /// Detect conflicts from `source` into this history, each side read
    /// through one consistent read view.
    ///
    /// # Errors
    ///
    /// Propagates read and integrity errors.
    pub fn detect_conflicts_from(&self, source: &SqliteHistory) -> Result<ConflictReport> {
        let target = self.history.read_view()?;
        let target_view = BranchView::active(&target)?;
        if std::ptr::eq(source, &self.history) {
            return detect_conflicts_in(&target, &target_view, &target, &target_view);
        }
        let source = source.read_view()?;
        let source_view = BranchView::active(&source)?;
        detect_conflicts_in(&source, &source_view, &target, &target_view)
    }

    /// Copy this history into a new lix directory at `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::InvalidInput`] if `dest` already holds commits.
    pub fn fork_to(&self, dest: &Path) -> Result<(Lix<SqliteHistory>, CopyReport)> {
        let mut fork = Self::init(dest)?;
        if !fork.history.commits()?.is_empty() {
            return Err(LixError::InvalidInput(format!(
                "{} already has history",
                dest.display()
            )));
        }
        let view = self.history.read_view()?;
        let report = copy_history(&view, &mut fork.history)?;
        info!(dest = %dest.display(), commits = report.commits_copied, "history forked");
        Ok((fork, report))
    }
}

impl Lix<MemoryHistory> {
    /// A throwaway history that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_history(MemoryHistory::new(), crate::account::ANONYMOUS)
    }
}

impl<H: HistoryStore> Lix<H> {
    /// Wrap an existing history.
    pub fn from_history(history: H, author: impl Into<String>) -> Self {
        Self {
            history,
            clock: Box::new(SystemClock),
            exporters: ExportPipeline::new(),
            author: author.into(),
            root: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporters.register(exporter);
        self
    }

    fn register_configured_exporters(&mut self, config: &LixConfig, root: &Path) {
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            }
        };
        if let Some(path) = &config.export.jsonl {
            self.exporters.register(Box::new(JsonlExporter::new(resolve(path))));
        }
        if let Some(dir) = &config.export.files {
            self.exporters.register(Box::new(FileMirrorExporter::new(resolve(dir))));
        }
    }

    pub const fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    pub fn into_history(self) -> H {
        self.history
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    /// Project root, `None` for histories not opened from a directory.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Write `edits` as one commit on top of the active branch head.
    ///
    /// The commit timestamp never goes backwards: a clock reading older
    /// than the head commit is clamped to the head's time.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::InvalidInput`] for an empty edit list or blank
    /// entity identity; storage errors leave nothing written.
    pub fn commit(&mut self, description: &str, edits: Vec<Edit>) -> Result<CommitOutcome> {
        if edits.is_empty() {
            return Err(LixError::InvalidInput("nothing to commit".into()));
        }
        for edit in &edits {
            let (entity_type, entity_id) = edit.entity();
            if entity_type.trim().is_empty() || entity_id.trim().is_empty() {
                return Err(LixError::InvalidInput(
                    "entity type and entity id must not be empty".into(),
                ));
            }
        }

        let head = self.history.active_branch()?.head;
        let now = self.clock.now_us();
        let ts = match &head {
            Some(head_id) => {
                let head_ts = self
                    .history
                    .commit(head_id)?
                    .ok_or_else(|| LixError::not_found(RecordKind::Commit, head_id))?
                    .created_at_us;
                if now < head_ts {
                    warn!(now, head_ts, "clock behind branch head, clamping commit time");
                }
                now.max(head_ts)
            }
            None => now,
        };

        let contents: Vec<Option<Value>> = edits.iter().map(|e| e.content().cloned()).collect();
        let new_changes = edits
            .into_iter()
            .map(|edit| edit.into_new_change(&self.author, ts))
            .collect();
        let parents = head.into_iter().collect();
        let (commit, changes) = self.history.write_commit(
            NewCommit::new(parents, self.author.clone(), description, ts),
            new_changes,
        )?;
        info!(commit = %commit.id, changes = changes.len(), author = %self.author, "committed");

        let export = if self.exporters.is_empty() {
            ExportReport::default()
        } else {
            let batch = ExportBatch {
                commit: commit.clone(),
                changes: changes
                    .iter()
                    .cloned()
                    .zip(contents)
                    .map(|(change, content)| ExportedChange { change, content })
                    .collect(),
            };
            self.exporters.run(&batch)
        };

        Ok(CommitOutcome {
            commit,
            changes,
            export,
        })
    }

    /// Current value of an entity on the active branch.
    ///
    /// # Errors
    ///
    /// Propagates read and integrity errors.
    pub fn current_value(&self, entity_id: &str) -> Result<Option<Value>> {
        resolve::current_value(&self.history, entity_id)
    }

    /// Every change to an entity on the active branch, newest first.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn entity_history(&self, entity_id: &str) -> Result<Vec<Change>> {
        let view = BranchView::active(&self.history)?;
        resolve::entity_history(&self.history, entity_id, &view)
    }

    /// Leaf change of every entity on the active branch, tombstones included.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn leaves(&self) -> Result<Vec<Change>> {
        let view = BranchView::active(&self.history)?;
        resolve::leaf_changes(&self.history, &view)
    }

    /// Commits on the active branch, newest first.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn log(&self) -> Result<Vec<Commit>> {
        let view = BranchView::active(&self.history)?;
        resolve::commits_in_view(&self.history, &view)
    }

    /// Before/after pairs for the changes of one commit.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the commit is unknown.
    pub fn change_pairs(&self, commit_id: &CommitId) -> Result<Vec<ChangePair>> {
        resolve::change_pairs_for_commit(&self.history, commit_id)
    }

    /// Before/after content for the changes of one commit.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the commit is unknown, or
    /// [`LixError::IntegrityViolation`] if a snapshot is missing.
    pub fn diff(&self, commit_id: &CommitId) -> Result<Vec<EntityDiff>> {
        self.change_pairs(commit_id)?
            .into_iter()
            .map(|pair| {
                let before = match &pair.previous {
                    Some(previous) => resolve::content_of(&self.history, previous)?,
                    None => None,
                };
                let after = resolve::content_of(&self.history, &pair.current)?;
                Ok(EntityDiff {
                    previous_change_id: pair.previous.map(|p| p.id),
                    change: pair.current,
                    before,
                    after,
                })
            })
            .collect()
    }

    /// All branches, sorted by name.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn branches(&self) -> Result<Vec<Branch>> {
        self.history.branches()
    }

    /// Create a branch at `from`, or at the active head when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::InvalidInput`] if the name is blank or taken, or
    /// [`LixError::NotFound`] if `from` is unknown.
    pub fn create_branch(&mut self, name: &str, from: Option<&CommitId>) -> Result<Branch> {
        if name.trim().is_empty() {
            return Err(LixError::InvalidInput("branch name must not be empty".into()));
        }
        if self.history.branches()?.iter().any(|b| b.name == name) {
            return Err(LixError::InvalidInput(format!("branch {name} already exists")));
        }
        let head = match from {
            Some(id) => Some(id.clone()),
            None => self.history.active_branch()?.head,
        };
        let branch = Branch::new(name, head);
        self.history.set_branch(branch.clone())?;
        info!(branch = name, "branch created");
        Ok(branch)
    }

    /// Make `name` the active branch.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if no such branch exists.
    pub fn switch_branch(&mut self, name: &str) -> Result<Branch> {
        let branch = self.history.switch_branch(name)?;
        info!(branch = name, "switched branch");
        Ok(branch)
    }

    /// Merge base of two branch heads. `None` if either branch is empty or
    /// they share no commit.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] for an unknown branch name.
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<CommitId>> {
        let branches = self.history.branches()?;
        let head_of = |name: &str| {
            branches
                .iter()
                .find(|branch| branch.name == name)
                .map(|branch| branch.head.clone())
                .ok_or_else(|| LixError::not_found(RecordKind::Branch, name))
        };
        let (Some(head_a), Some(head_b)) = (head_of(a)?, head_of(b)?) else {
            return Ok(None);
        };
        merge_base(&self.history.commit_graph()?, &head_a, &head_b)
    }

    /// Detect conflicts from `source` into this history.
    ///
    /// # Errors
    ///
    /// Propagates read and integrity errors.
    pub fn detect_conflicts<S: History + ?Sized>(&self, source: &S) -> Result<ConflictReport> {
        let source_view = BranchView::active(source)?;
        let target_view = BranchView::active(&self.history)?;
        detect_conflicts_in(source, &source_view, &self.history, &target_view)
    }

    /// Persist detected conflicts. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn record_conflicts(&mut self, conflicts: &[Conflict]) -> Result<usize> {
        let added = self.history.record_conflicts(conflicts)?;
        info!(added, total = conflicts.len(), "conflicts recorded");
        Ok(added)
    }

    /// Conflicts recorded in this history.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn conflicts(&self) -> Result<Vec<Conflict>> {
        self.history.conflicts()
    }

    /// Mark a recorded conflict resolved by `resolved_change_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if the conflict or the resolving change
    /// does not exist.
    pub fn resolve_conflict(
        &mut self,
        change_id: &ChangeId,
        conflicting_change_id: &ChangeId,
        resolved_change_id: &ChangeId,
    ) -> Result<()> {
        if !self.history.contains_change(resolved_change_id)? {
            return Err(LixError::not_found(RecordKind::Change, resolved_change_id));
        }
        self.history
            .resolve_conflict(change_id, conflicting_change_id, resolved_change_id)
    }

    /// Copy this history into `dst`, preserving ids.
    ///
    /// # Errors
    ///
    /// Propagates read and write errors.
    pub fn fork_into<D: HistoryStore + ?Sized>(&self, dst: &mut D) -> Result<CopyReport> {
        copy_history(&self.history, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::export::{ExportCapabilities, ExportError};
    use serde_json::json;

    fn lix_at(start: i64) -> Lix<MemoryHistory> {
        Lix::in_memory().with_clock(Box::new(ManualClock::new(start)))
    }

    #[test]
    fn commit_advances_head_and_sets_value() {
        let mut lix = lix_at(10);
        let outcome = lix
            .commit("init", vec![Edit::set("variant", "e1", json!("hello"))])
            .unwrap();
        assert_eq!(outcome.commit.created_at_us, 10);
        assert_eq!(outcome.changes[0].author, "anonymous");
        assert_eq!(
            lix.history().active_branch().unwrap().head,
            Some(outcome.commit.id)
        );
        assert_eq!(lix.current_value("e1").unwrap(), Some(json!("hello")));
    }

    #[test]
    fn empty_commit_is_rejected() {
        let mut lix = lix_at(1);
        assert!(matches!(
            lix.commit("noop", vec![]).unwrap_err(),
            LixError::InvalidInput(_)
        ));
        assert!(matches!(
            lix.commit("blank", vec![Edit::set("variant", " ", json!(1))])
                .unwrap_err(),
            LixError::InvalidInput(_)
        ));
    }

    #[test]
    fn clock_regression_is_clamped() {
        let clock = std::sync::Arc::new(ManualClock::new(100));
        let mut lix = Lix::in_memory().with_clock(Box::new(clock.clone()));
        lix.commit("a", vec![Edit::set("t", "e1", json!(1))]).unwrap();
        clock.set(50);
        let second = lix.commit("b", vec![Edit::set("t", "e1", json!(2))]).unwrap();
        assert_eq!(second.commit.created_at_us, 100);
        assert_eq!(lix.current_value("e1").unwrap(), Some(json!(2)));
    }

    #[test]
    fn diff_shows_before_and_after() {
        let mut lix = lix_at(1);
        lix.commit("a", vec![Edit::set("t", "e1", json!("old"))]).unwrap();
        let second = lix
            .commit("b", vec![Edit::set("t", "e1", json!("new")), Edit::delete("t", "e2")])
            .unwrap();

        let diff = lix.diff(&second.commit.id).unwrap();
        assert_eq!(diff.len(), 2);
        let e1 = diff.iter().find(|d| d.change.entity_id == "e1").unwrap();
        assert_eq!(e1.before, Some(json!("old")));
        assert_eq!(e1.after, Some(json!("new")));
        let e2 = diff.iter().find(|d| d.change.entity_id == "e2").unwrap();
        assert_eq!((e2.before.clone(), e2.after.clone()), (None, None));
    }

    #[test]
    fn branches_isolate_history() {
        let mut lix = lix_at(1);
        lix.commit("a", vec![Edit::set("t", "e1", json!("base"))]).unwrap();
        lix.create_branch("feature", None).unwrap();
        lix.switch_branch("feature").unwrap();
        lix.commit("b", vec![Edit::set("t", "e1", json!("feature"))]).unwrap();
        assert_eq!(lix.current_value("e1").unwrap(), Some(json!("feature")));

        lix.switch_branch("main").unwrap();
        assert_eq!(lix.current_value("e1").unwrap(), Some(json!("base")));
        assert_eq!(lix.log().unwrap().len(), 1);

        let base = lix.merge_base("main", "feature").unwrap();
        assert_eq!(base, lix.history().active_branch().unwrap().head);
        assert!(matches!(
            lix.create_branch("feature", None).unwrap_err(),
            LixError::InvalidInput(_)
        ));
    }

    #[test]
    fn resolve_requires_existing_change() {
        let mut lix = lix_at(1);
        let first = lix.commit("a", vec![Edit::set("t", "e1", json!(1))]).unwrap();
        let conflict = Conflict::divergent(ChangeId::new("t"), ChangeId::new("s"));
        assert_eq!(lix.record_conflicts(&[conflict]).unwrap(), 1);

        let missing = lix.resolve_conflict(&ChangeId::new("t"), &ChangeId::new("s"), &ChangeId::new("nope"));
        assert!(missing.unwrap_err().is_not_found());

        lix.resolve_conflict(&ChangeId::new("t"), &ChangeId::new("s"), &first.changes[0].id)
            .unwrap();
        assert!(lix.conflicts().unwrap()[0].is_resolved());
    }

    struct Broken;

    impl Exporter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn capabilities(&self) -> ExportCapabilities {
            ExportCapabilities {
                files: false,
                messages: true,
            }
        }

        fn save_messages(&mut self, _: &ExportBatch) -> std::result::Result<(), ExportError> {
            Err(ExportError::Rejected("offline".into()))
        }
    }

    #[test]
    fn exporter_failure_does_not_undo_commit() {
        let mut lix = lix_at(1).with_exporter(Box::new(Broken));
        let outcome = lix.commit("a", vec![Edit::set("t", "e1", json!(1))]).unwrap();
        assert_eq!(outcome.export.failed.len(), 1);
        assert_eq!(lix.current_value("e1").unwrap(), Some(json!(1)));
    }
}
