//! Comparing two histories that forked from a common point.
//!
//! # Sub-modules
//!
//! - [`lca`]: source-only leaves and their nearest shared change in the
//!   target.
//! - [`conflict`]: classification of each candidate into insert, unchanged,
//!   convergent, or conflict.
//!
//! Both work against any pair of [`crate::history::History`]
//! implementations, so source and target may be different store types.

pub mod conflict;
pub mod lca;

pub use conflict::{
    ConflictReport, Outcome, classify, detect_conflicts, detect_conflicts_in,
    detect_conflicts_with_report,
};
pub use lca::{leaf_change_of, leaf_changes_only_in_source, lowest_common_ancestor};
