//! Three-way conflict detection between a source and a target history.
//!
//! Each source-only leaf (see [`super::lca::leaf_changes_only_in_source`])
//! lands in exactly one terminal [`Outcome`]:
//!
//! | Condition | Outcome |
//! |---|---|
//! | no shared ancestor | [`Outcome::Insert`] |
//! | target leaf is the ancestor, or absent | [`Outcome::TargetUnchanged`] |
//! | target leaf content equals candidate content | [`Outcome::Convergent`] |
//! | otherwise | [`Outcome::Conflict`] |
//!
//! Detection only reads. Conflicts are gathered into one vector and returned
//! whole; nothing is persisted here.

use serde::Serialize;
use tracing::info;

use super::lca::{leaf_change_of, leaf_changes_only_in_source, lowest_common_ancestor};
use crate::branch::BranchView;
use crate::error::Result;
use crate::history::History;
use crate::model::{Change, Conflict};
use crate::resolve::content_of;

/// Terminal classification of one candidate change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The entity has no shared origin with the target.
    Insert,
    /// The target has not moved past the fork point.
    TargetUnchanged,
    /// Both sides arrived at the same content independently.
    Convergent,
    Conflict(Conflict),
}

/// Result of a detection pass with per-outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub candidates: usize,
    pub inserts: usize,
    pub unchanged: usize,
    pub convergent: usize,
}

/// Classify one candidate.
///
/// # Errors
///
/// Returns [`crate::LixError::IntegrityViolation`] if a snapshot referenced by
/// either leaf is missing.
pub fn classify<S, T>(
    candidate: &Change,
    source: &S,
    source_view: &BranchView,
    target: &T,
    target_view: &BranchView,
) -> Result<Outcome>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    let Some(ancestor) = lowest_common_ancestor(candidate, source, source_view, target)? else {
        return Ok(Outcome::Insert);
    };
    let Some(leaf_in_target) = leaf_change_of(&ancestor, target, target_view)? else {
        return Ok(Outcome::TargetUnchanged);
    };
    if leaf_in_target.id == ancestor.id {
        return Ok(Outcome::TargetUnchanged);
    }
    if content_of(target, &leaf_in_target)? == content_of(source, candidate)? {
        return Ok(Outcome::Convergent);
    }
    Ok(Outcome::Conflict(Conflict::divergent(
        leaf_in_target.id,
        candidate.id.clone(),
    )))
}

/// Detect conflicts between the given views of `source` and `target`.
///
/// # Errors
///
/// Propagates read and integrity errors; no partial result is returned.
pub fn detect_conflicts_in<S, T>(
    source: &S,
    source_view: &BranchView,
    target: &T,
    target_view: &BranchView,
) -> Result<ConflictReport>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    let candidates = leaf_changes_only_in_source(source, source_view, target, target_view)?;
    let mut report = ConflictReport {
        candidates: candidates.len(),
        ..ConflictReport::default()
    };

    for candidate in &candidates {
        match classify(candidate, source, source_view, target, target_view)? {
            Outcome::Insert => report.inserts += 1,
            Outcome::TargetUnchanged => report.unchanged += 1,
            Outcome::Convergent => report.convergent += 1,
            Outcome::Conflict(conflict) => report.conflicts.push(conflict),
        }
    }

    info!(
        candidates = report.candidates,
        conflicts = report.conflicts.len(),
        inserts = report.inserts,
        unchanged = report.unchanged,
        convergent = report.convergent,
        "conflict detection finished"
    );
    Ok(report)
}

/// Detect conflicts between the active branches of `source` and `target`,
/// with per-outcome counts.
///
/// # Errors
///
/// Propagates read and integrity errors.
pub fn detect_conflicts_with_report<S, T>(source: &S, target: &T) -> Result<ConflictReport>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    let source_view = BranchView::active(source)?;
    let target_view = BranchView::active(target)?;
    detect_conflicts_in(source, &source_view, target, &target_view)
}

/// Detect conflicts between the active branches of `source` and `target`.
///
/// For consistent results against a persisted history, pass a read view
/// (e.g. [`crate::db::SqliteHistory::read_view`]) rather than the history
/// itself.
///
/// # Errors
///
/// Propagates read and integrity errors.
pub fn detect_conflicts<S, T>(source: &S, target: &T) -> Result<Vec<Conflict>>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    Ok(detect_conflicts_with_report(source, target)?.conflicts)
}
