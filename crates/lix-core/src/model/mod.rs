//! Record types of a lix history.
//!
//! - [`Change`]: one entity's value at one point in history. Immutable.
//! - [`Commit`]: an immutable grouping of changes with parent links.
//! - [`Branch`]: a named pointer to a head commit.
//! - [`Conflict`]: a detected divergence between two histories.
//!
//! Snapshots (the payloads changes point at) live in [`crate::snapshot`].

pub mod branch;
pub mod change;
pub mod commit;
pub mod conflict;
pub mod ids;

pub use branch::{Branch, DEFAULT_BRANCH};
pub use change::{Change, NewChange};
pub use commit::{Commit, NewCommit};
pub use conflict::{Conflict, DIVERGENT_CONTENT_REASON};
pub use ids::{ChangeId, CommitId, SnapshotId};

/// Microseconds since the Unix epoch, supplied by an external clock.
pub type Timestamp = i64;
