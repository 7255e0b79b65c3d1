//! lix-core library.
//!
//! An embedded change-tracking engine: entity values are recorded as
//! immutable changes grouped into commits, branches name lines of commits,
//! and two histories that forked can be compared for conflicting edits.
//!
//! # Conventions
//!
//! - **Errors**: library functions return [`Result`] with [`LixError`].
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Time**: microseconds since the Unix epoch, from a [`clock::Clock`].

pub mod account;
pub mod branch;
pub mod clock;
pub mod config;
pub mod dag;
pub mod db;
pub mod error;
pub mod export;
pub mod history;
pub mod lix;
pub mod lock;
pub mod merge;
pub mod model;
pub mod resolve;
pub mod snapshot;

pub use error::{ErrorCode, LixError, RecordKind, Result};
pub use history::{History, HistoryStore, MemoryHistory};
pub use lix::{CommitOutcome, Edit, EntityDiff, Lix};
pub use merge::{ConflictReport, detect_conflicts};
pub use model::{Branch, Change, ChangeId, Commit, CommitId, Conflict, SnapshotId};
