use serde::{Deserialize, Serialize};

use super::{CommitId, Timestamp};

/// An immutable grouping of changes.
///
/// Zero parents marks a root. The linear history model produces exactly one
/// parent; multiple parents are reserved for merges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub author: String,
    pub description: String,
    pub created_at_us: Timestamp,
}

/// Input for adding a commit to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub parent_ids: Vec<CommitId>,
    pub author: String,
    pub description: String,
    pub created_at_us: Timestamp,
}

impl NewCommit {
    #[must_use]
    pub fn new(
        parent_ids: Vec<CommitId>,
        author: impl Into<String>,
        description: impl Into<String>,
        created_at_us: Timestamp,
    ) -> Self {
        Self {
            parent_ids,
            author: author.into(),
            description: description.into(),
            created_at_us,
        }
    }

    /// Assign a fresh id, producing the stored record.
    #[must_use]
    pub fn into_commit(self) -> Commit {
        Commit {
            id: CommitId::generate(),
            parent_ids: self.parent_ids,
            author: self.author,
            description: self.description,
            created_at_us: self.created_at_us,
        }
    }
}
