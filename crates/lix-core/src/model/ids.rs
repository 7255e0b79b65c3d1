//! String-backed identifiers for snapshots, changes, and commits.
//!
//! Change and commit ids are UUIDv7 strings: globally unique and
//! lexicographically sortable by creation time. Snapshot ids are content
//! hashes (`blake3:<hex>`), see [`crate::snapshot::content_id`].

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id string without validation.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identity of a [`crate::model::Change`].
    ChangeId
);

string_id!(
    /// Identity of a [`crate::model::Commit`].
    CommitId
);

string_id!(
    /// Content hash identifying a [`crate::snapshot::Snapshot`].
    SnapshotId
);

impl ChangeId {
    /// Generate a fresh, time-sortable change id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl CommitId {
    /// Generate a fresh, time-sortable commit id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn generated_ids_are_unique_and_sortable() {
        let ids: Vec<ChangeId> = (0..64).map(|_| ChangeId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "UUIDv7 ids should sort in generation order");

        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn ids_borrow_as_str_for_map_lookup() {
        let mut map = HashMap::new();
        map.insert(CommitId::new("c1"), 1);
        assert_eq!(map.get("c1"), Some(&1));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = SnapshotId::new("blake3:abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"blake3:abc\"");
        let back: SnapshotId = serde_json::from_str("\"blake3:abc\"").unwrap();
        assert_eq!(back, id);
    }
}
