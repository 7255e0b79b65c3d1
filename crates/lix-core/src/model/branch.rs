use serde::{Deserialize, Serialize};

use super::CommitId;

/// Name of the branch every new history starts on.
pub const DEFAULT_BRANCH: &str = "main";

/// A named, mutable reference to a head commit.
///
/// `head` is `None` until the first commit lands on the branch. The commits
/// visible "on" a branch are derived from the head, see
/// [`crate::branch::BranchView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub head: Option<CommitId>,
}

impl Branch {
    #[must_use]
    pub fn new(name: impl Into<String>, head: Option<CommitId>) -> Self {
        Self {
            name: name.into(),
            head,
        }
    }

    /// The empty default branch of a fresh history.
    #[must_use]
    pub fn default_branch() -> Self {
        Self::new(DEFAULT_BRANCH, None)
    }
}
