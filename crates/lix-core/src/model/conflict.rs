use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChangeId;

/// Classification attached to every conflict the detector emits.
pub const DIVERGENT_CONTENT_REASON: &str =
    "divergent-content: source and target leaf changes carry different snapshots";

/// A detected, unresolved divergence between a source leaf change and a
/// target leaf change for the same entity.
///
/// Immutable once created except for `resolved_change_id`, which a
/// resolution layer outside this crate fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The change in the target considered current.
    pub change_id: ChangeId,
    /// The divergent change from the source.
    pub conflicting_change_id: ChangeId,
    pub reason: String,
    pub metadata: Option<Value>,
    pub resolved_change_id: Option<ChangeId>,
}

impl Conflict {
    /// A fresh, unresolved conflict with the standard reason.
    #[must_use]
    pub fn divergent(change_id: ChangeId, conflicting_change_id: ChangeId) -> Self {
        Self {
            change_id,
            conflicting_change_id,
            reason: DIVERGENT_CONTENT_REASON.to_string(),
            metadata: None,
            resolved_change_id: None,
        }
    }

    /// Identity of the conflict: `(change_id, conflicting_change_id)`.
    #[must_use]
    pub const fn key(&self) -> (&ChangeId, &ChangeId) {
        (&self.change_id, &self.conflicting_change_id)
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_change_id.is_some()
    }
}
