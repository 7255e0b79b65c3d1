//! Nearest shared change between two independently evolved histories.
//!
//! Source and target are separate stores that forked from a common point.
//! Change ids are global, so a change present in both logs is one both
//! histories share. For an entity that diverged, walking its source history
//! backward until a change also present in the target finds the fork point
//! for that entity.
//!
//! # Determinism
//!
//! Leaves are picked by `(created_at_us, id)` and the backward walk follows
//! the total history order of [`crate::resolve`], so every step moves
//! strictly backward and the walk terminates.

use tracing::debug;

use crate::branch::BranchView;
use crate::error::Result;
use crate::history::History;
use crate::model::Change;
use crate::resolve::{entity_history, leaf_change};

/// Source leaves that the target does not already have.
///
/// For every entity touched in `source`, take its leaf in `source_view`. A
/// leaf is dropped when the target already holds that exact change, or when
/// the target's leaf for the entity carries the same snapshot (including
/// both being tombstones). The rest are candidates, sorted by entity id.
///
/// # Errors
///
/// Propagates read errors from either history.
pub fn leaf_changes_only_in_source<S, T>(
    source: &S,
    source_view: &BranchView,
    target: &T,
    target_view: &BranchView,
) -> Result<Vec<Change>>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    let mut candidates = Vec::new();
    for entity_id in source.entity_ids()? {
        let Some(leaf) = leaf_change(source, &entity_id, source_view)? else {
            continue;
        };
        if target.contains_change(&leaf.id)? {
            continue;
        }
        if let Some(target_leaf) = leaf_change(target, &entity_id, target_view)? {
            if target_leaf.snapshot_id == leaf.snapshot_id {
                continue;
            }
        }
        candidates.push(leaf);
    }
    debug!(candidates = candidates.len(), "source-only leaves collected");
    Ok(candidates)
}

/// Walk `candidate`'s entity history in `source` backward, starting at the
/// candidate itself, and return the first change `target` also holds.
/// `None` means the entity has no shared origin: a pure insertion.
///
/// # Errors
///
/// Propagates read errors from either history.
pub fn lowest_common_ancestor<S, T>(
    candidate: &Change,
    source: &S,
    source_view: &BranchView,
    target: &T,
) -> Result<Option<Change>>
where
    S: History + ?Sized,
    T: History + ?Sized,
{
    let history = entity_history(source, &candidate.entity_id, source_view)?;
    let Some(start) = history.iter().position(|change| change.id == candidate.id) else {
        // The candidate is outside the view: only itself can be shared.
        return Ok(if target.contains_change(&candidate.id)? {
            Some(candidate.clone())
        } else {
            None
        });
    };

    for change in &history[start..] {
        if target.contains_change(&change.id)? {
            debug!(candidate = %candidate.id, ancestor = %change.id, "common ancestor found");
            return Ok(Some(change.clone()));
        }
    }
    Ok(None)
}

/// The leaf change for `ancestor`'s entity in the target view.
///
/// # Errors
///
/// Propagates read errors from `target`.
pub fn leaf_change_of<T: History + ?Sized>(
    ancestor: &Change,
    target: &T,
    target_view: &BranchView,
) -> Result<Option<Change>> {
    leaf_change(target, &ancestor.entity_id, target_view)
}
