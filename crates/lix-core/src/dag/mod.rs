//! Commit DAG.
//!
//! Commits form a directed acyclic graph through their parent links. The
//! graph is append-only and acyclic by construction: a commit can only name
//! parents that already exist.
//!
//! # Sub-modules
//!
//! - [`graph`]: In-memory DAG with ancestor/descendant traversal and
//!   topological iteration. ([`CommitGraph`], [`CommitNode`])
//! - [`merge_base`]: where two lines of commits diverged.
//!
//! # Related Modules
//!
//! - [`crate::branch`]: derives the active line of history from a head.
//! - [`crate::merge::lca`]: nearest shared change across two histories.

pub mod graph;
pub mod merge_base;

pub use graph::{CommitGraph, CommitNode};
pub use merge_base::{all_merge_bases, merge_base};
