use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChangeId, CommitId, SnapshotId, Timestamp};

/// An immutable record of one entity's value at one point in history.
///
/// `snapshot_id` is `None` for a tombstone (the entity was deleted). The
/// predecessor of a change is never stored; it is recomputed from ordering
/// (see [`crate::resolve::value_at`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    /// What kind of thing changed, e.g. a specific field class.
    pub entity_type: String,
    /// Stable identity of the entity, constant across its lifetime.
    pub entity_id: String,
    pub snapshot_id: Option<SnapshotId>,
    pub commit_id: CommitId,
    pub author: String,
    pub created_at_us: Timestamp,
}

impl Change {
    /// `true` when this change records a deletion.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.snapshot_id.is_none()
    }

    /// Leaf ordering key: latest `created_at_us`, ties broken by id.
    #[must_use]
    pub fn leaf_key(&self) -> (Timestamp, &ChangeId) {
        (self.created_at_us, &self.id)
    }
}

/// Input for appending a change to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub entity_type: String,
    pub entity_id: String,
    /// `None` writes a tombstone.
    pub content: Option<Value>,
    pub author: String,
    pub created_at_us: Timestamp,
}

impl NewChange {
    /// A change that sets `entity_id` to `content`.
    #[must_use]
    pub fn set(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        content: Value,
        author: impl Into<String>,
        created_at_us: Timestamp,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            content: Some(content),
            author: author.into(),
            created_at_us,
        }
    }

    /// A tombstone for `entity_id`.
    #[must_use]
    pub fn delete(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        author: impl Into<String>,
        created_at_us: Timestamp,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            content: None,
            author: author.into(),
            created_at_us,
        }
    }
}
