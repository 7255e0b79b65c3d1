//! Content-addressed snapshot payloads.
//!
//! A snapshot id is the BLAKE3 hash of the canonical JSON encoding of the
//! content, in `blake3:<hex>` form. Two changes carrying structurally equal
//! content therefore share one snapshot, and storage grows with distinct
//! content rather than with change count.

pub mod canonical;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::SnapshotId;

use self::canonical::canonicalize_json;

/// An immutable payload referenced by one or more changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub content: Value,
}

impl Snapshot {
    /// Build a snapshot, deriving its id from `content`.
    #[must_use]
    pub fn new(content: Value) -> Self {
        Self {
            id: content_id(&content),
            content,
        }
    }
}

/// Compute the content-addressed id for `content`.
#[must_use]
pub fn content_id(content: &Value) -> SnapshotId {
    let canonical = canonicalize_json(content);
    let hash = blake3::hash(canonical.as_bytes());
    SnapshotId::new(format!("blake3:{hash}"))
}
