//! Branch views: the set of commits reachable from a head.
//!
//! A [`BranchView`] is `{head} ∪ ancestors_of(head)`, captured together with
//! each commit's timestamp so resolvers can order changes by their owning
//! commit without re-reading it. Every "current state" query is scoped by a
//! view, so commits on other lines of history never leak in.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{LixError, RecordKind, Result};
use crate::history::History;
use crate::model::{CommitId, Timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchView {
    head: Option<CommitId>,
    commits: HashMap<CommitId, Timestamp>,
}

impl BranchView {
    /// A view of a branch with no commits yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The view rooted at `head`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if `head` is unknown, or
    /// [`LixError::IntegrityViolation`] if an ancestor is missing.
    pub fn from_head<H: History + ?Sized>(history: &H, head: &CommitId) -> Result<Self> {
        let head_commit = history
            .commit(head)?
            .ok_or_else(|| LixError::not_found(RecordKind::Commit, head))?;

        let ancestors = history.ancestors_of(head)?;
        let mut commits = HashMap::with_capacity(ancestors.len() + 1);
        commits.insert(head.clone(), head_commit.created_at_us);
        for id in ancestors {
            let commit = history.commit(&id)?.ok_or_else(|| {
                LixError::IntegrityViolation(format!("ancestor commit {id} of {head} is missing"))
            })?;
            commits.insert(id, commit.created_at_us);
        }

        debug!(head = %head, commits = commits.len(), "branch view built");
        Ok(Self {
            head: Some(head.clone()),
            commits,
        })
    }

    /// The view of the active branch; empty if it has no head yet.
    ///
    /// # Errors
    ///
    /// Propagates read errors from [`BranchView::from_head`].
    pub fn active<H: History + ?Sized>(history: &H) -> Result<Self> {
        match history.active_branch()?.head {
            Some(head) => Self::from_head(history, &head),
            None => Ok(Self::empty()),
        }
    }

    /// The view of the branch called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LixError::NotFound`] if no such branch exists.
    pub fn for_branch<H: History + ?Sized>(history: &H, name: &str) -> Result<Self> {
        let branch = history
            .branches()?
            .into_iter()
            .find(|branch| branch.name == name)
            .ok_or_else(|| LixError::not_found(RecordKind::Branch, name))?;
        match branch.head {
            Some(head) => Self::from_head(history, &head),
            None => Ok(Self::empty()),
        }
    }

    #[must_use]
    pub const fn head(&self) -> Option<&CommitId> {
        self.head.as_ref()
    }

    #[must_use]
    pub fn contains(&self, commit_id: &CommitId) -> bool {
        self.commits.contains_key(commit_id)
    }

    /// Creation time of a commit in the view.
    #[must_use]
    pub fn commit_time(&self, commit_id: &CommitId) -> Option<Timestamp> {
        self.commits.get(commit_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommitId> {
        self.commits.keys()
    }
}

/// `{head} ∪ ancestors_of(head)`.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if `head` is unknown.
pub fn active_set<H: History + ?Sized>(history: &H, head: &CommitId) -> Result<HashSet<CommitId>> {
    Ok(BranchView::from_head(history, head)?
        .commits
        .into_keys()
        .collect())
}
