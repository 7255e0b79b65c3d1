//! Entity history resolution.
//!
//! Changes carry no pointer to their predecessor. The previous value of an
//! entity is recomputed from ordering within a [`BranchView`]:
//!
//! - history order: owning commit `created_at_us`, then change
//!   `created_at_us`, then change id, newest first
//! - leaf order: change `created_at_us`, then id
//!
//! Both orders are total, so equal timestamps still resolve the same way on
//! every run.

use std::cmp::Reverse;

use serde::Serialize;
use serde_json::Value;

use crate::branch::BranchView;
use crate::error::{LixError, RecordKind, Result};
use crate::history::History;
use crate::model::{Change, ChangeId, CommitId, Timestamp};

type HistoryKey<'a> = (Timestamp, Timestamp, &'a ChangeId);

fn history_key<'a>(view: &BranchView, change: &'a Change) -> HistoryKey<'a> {
    (
        view.commit_time(&change.commit_id).unwrap_or(Timestamp::MIN),
        change.created_at_us,
        &change.id,
    )
}

/// Changes to `entity_id` whose commit lies in `view`, newest first.
///
/// # Errors
///
/// Propagates read errors from `history`.
pub fn entity_history<H: History + ?Sized>(
    history: &H,
    entity_id: &str,
    view: &BranchView,
) -> Result<Vec<Change>> {
    let mut changes: Vec<Change> = history
        .changes_for_entity(entity_id)?
        .into_iter()
        .filter(|change| view.contains(&change.commit_id))
        .collect();
    changes.sort_by(|a, b| history_key(view, b).cmp(&history_key(view, a)));
    Ok(changes)
}

/// The latest change to `entity_id` created strictly before `before_us`
/// within `view`.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if no change falls in that window.
pub fn query_by_entity<H: History + ?Sized>(
    history: &H,
    entity_id: &str,
    before_us: Timestamp,
    view: &BranchView,
) -> Result<Change> {
    entity_history(history, entity_id, view)?
        .into_iter()
        .find(|change| change.created_at_us < before_us)
        .ok_or_else(|| LixError::not_found(RecordKind::Entity, entity_id))
}

/// The change to `entity_id` immediately before `before_change`, scoped to
/// the branch view of `before_change`'s commit. `None` when `before_change`
/// is the first change to the entity.
///
/// # Errors
///
/// Returns [`LixError::IntegrityViolation`] if `before_change` points at a
/// commit that does not exist.
pub fn value_at<H: History + ?Sized>(
    history: &H,
    entity_id: &str,
    before_change: &Change,
) -> Result<Option<Change>> {
    let view = BranchView::from_head(history, &before_change.commit_id).map_err(|err| {
        if err.is_not_found() {
            LixError::missing_commit(&before_change.id, &before_change.commit_id)
        } else {
            err
        }
    })?;
    let bound = history_key(&view, before_change);
    Ok(entity_history(history, entity_id, &view)?
        .into_iter()
        .find(|change| history_key(&view, change) < bound))
}

/// The leaf change of `entity_id` in `view`: latest `created_at_us`, ties
/// broken by id.
///
/// # Errors
///
/// Propagates read errors from `history`.
pub fn leaf_change<H: History + ?Sized>(
    history: &H,
    entity_id: &str,
    view: &BranchView,
) -> Result<Option<Change>> {
    Ok(history
        .changes_for_entity(entity_id)?
        .into_iter()
        .filter(|change| view.contains(&change.commit_id))
        .max_by(|a, b| a.leaf_key().cmp(&b.leaf_key())))
}

/// Content carried by `change`, `None` for a tombstone.
///
/// # Errors
///
/// Returns [`LixError::IntegrityViolation`] if the snapshot is missing.
pub fn content_of<H: History + ?Sized>(history: &H, change: &Change) -> Result<Option<Value>> {
    let Some(snapshot_id) = &change.snapshot_id else {
        return Ok(None);
    };
    match history.snapshot(snapshot_id) {
        Ok(snapshot) => Ok(Some(snapshot.content)),
        Err(err) if err.is_not_found() => Err(LixError::missing_snapshot(&change.id, snapshot_id)),
        Err(err) => Err(err),
    }
}

/// Current value of `entity_id` on the active branch. `None` if the entity
/// was never written there or its leaf is a tombstone.
///
/// # Errors
///
/// Propagates read and integrity errors.
pub fn current_value<H: History + ?Sized>(history: &H, entity_id: &str) -> Result<Option<Value>> {
    let view = BranchView::active(history)?;
    match leaf_change(history, entity_id, &view)? {
        Some(leaf) => content_of(history, &leaf),
        None => Ok(None),
    }
}

/// Leaf changes of every entity visible in `view`, sorted by entity id.
///
/// # Errors
///
/// Propagates read errors from `history`.
pub fn leaf_changes<H: History + ?Sized>(history: &H, view: &BranchView) -> Result<Vec<Change>> {
    let mut leaves = Vec::new();
    for entity_id in history.entity_ids()? {
        if let Some(leaf) = leaf_change(history, &entity_id, view)? {
            leaves.push(leaf);
        }
    }
    Ok(leaves)
}

/// A change together with the one it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangePair {
    pub current: Change,
    pub previous: Option<Change>,
}

/// Before/after pairs for every change in `commit_id`, in commit order.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if the commit does not exist.
pub fn change_pairs_for_commit<H: History + ?Sized>(
    history: &H,
    commit_id: &CommitId,
) -> Result<Vec<ChangePair>> {
    if history.commit(commit_id)?.is_none() {
        return Err(LixError::not_found(RecordKind::Commit, commit_id));
    }
    history
        .changes_in_commit(commit_id)?
        .into_iter()
        .map(|current| {
            let previous = value_at(history, &current.entity_id, &current)?;
            Ok(ChangePair { current, previous })
        })
        .collect()
}

/// Commits of `view`, newest first by `(created_at_us, id)`.
///
/// # Errors
///
/// Returns [`LixError::IntegrityViolation`] if a commit in the view vanished.
pub fn commits_in_view<H: History + ?Sized>(
    history: &H,
    view: &BranchView,
) -> Result<Vec<crate::model::Commit>> {
    let mut ids: Vec<(Timestamp, &CommitId)> = view
        .iter()
        .map(|id| (view.commit_time(id).unwrap_or(Timestamp::MIN), id))
        .collect();
    ids.sort_by_key(|&(ts, id)| Reverse((ts, id)));
    ids.into_iter()
        .map(|(_, id)| {
            history.commit(id)?.ok_or_else(|| {
                LixError::IntegrityViolation(format!("commit {id} vanished from the history"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryStore, MemoryHistory};
    use crate::model::{NewChange, NewCommit};
    use serde_json::json;

    fn commit_with(
        history: &mut MemoryHistory,
        parents: Vec<CommitId>,
        ts: Timestamp,
        changes: Vec<NewChange>,
    ) -> (CommitId, Vec<Change>) {
        let (commit, changes) = history
            .write_commit(NewCommit::new(parents, "anna", "edit", ts), changes)
            .unwrap();
        (commit.id, changes)
    }

    fn set(entity: &str, content: Value, ts: Timestamp) -> NewChange {
        NewChange::set("variant", entity, content, "anna", ts)
    }

    #[test]
    fn first_change_has_no_predecessor() {
        let mut history = MemoryHistory::new();
        let (_, changes) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        assert_eq!(value_at(&history, "e1", &changes[0]).unwrap(), None);
    }

    #[test]
    fn value_at_returns_immediate_predecessor() {
        let mut history = MemoryHistory::new();
        let (c0, first) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        let (c1, second) =
            commit_with(&mut history, vec![c0], 2, vec![set("e1", json!("b"), 2)]);
        let (_, third) = commit_with(&mut history, vec![c1], 3, vec![set("e1", json!("c"), 3)]);

        assert_eq!(value_at(&history, "e1", &third[0]).unwrap(), Some(second[0].clone()));
        assert_eq!(value_at(&history, "e1", &second[0]).unwrap(), Some(first[0].clone()));
    }

    #[test]
    fn value_at_ignores_other_lines() {
        let mut history = MemoryHistory::new();
        let (c0, first) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        commit_with(&mut history, vec![c0.clone()], 2, vec![set("e1", json!("side"), 2)]);
        let (_, main) = commit_with(&mut history, vec![c0], 3, vec![set("e1", json!("main"), 3)]);

        assert_eq!(value_at(&history, "e1", &main[0]).unwrap(), Some(first[0].clone()));
    }

    #[test]
    fn value_at_with_missing_commit_is_integrity_violation() {
        let history = MemoryHistory::new();
        let orphan = Change {
            id: ChangeId::new("x"),
            entity_type: "variant".into(),
            entity_id: "e1".into(),
            snapshot_id: None,
            commit_id: CommitId::new("ghost"),
            author: "anna".into(),
            created_at_us: 1,
        };
        let err = value_at(&history, "e1", &orphan).unwrap_err();
        assert!(matches!(err, LixError::IntegrityViolation(_)));
    }

    #[test]
    fn same_timestamp_changes_order_by_id() {
        let mut history = MemoryHistory::new();
        let (_, changes) = commit_with(
            &mut history,
            vec![],
            5,
            vec![set("e1", json!("a"), 5), set("e1", json!("b"), 5)],
        );
        let (low, high) = if changes[0].id < changes[1].id {
            (&changes[0], &changes[1])
        } else {
            (&changes[1], &changes[0])
        };

        assert_eq!(value_at(&history, "e1", high).unwrap().as_ref(), Some(low));
        assert_eq!(value_at(&history, "e1", low).unwrap(), None);
        let view = BranchView::active(&history).unwrap();
        assert_eq!(leaf_change(&history, "e1", &view).unwrap().as_ref(), Some(high));
    }

    #[test]
    fn query_by_entity_respects_window() {
        let mut history = MemoryHistory::new();
        let (c0, first) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        commit_with(&mut history, vec![c0], 5, vec![set("e1", json!("b"), 5)]);
        let view = BranchView::active(&history).unwrap();

        assert_eq!(query_by_entity(&history, "e1", 5, &view).unwrap(), first[0]);
        assert!(query_by_entity(&history, "e1", 1, &view).unwrap_err().is_not_found());
        assert!(query_by_entity(&history, "e9", 99, &view).unwrap_err().is_not_found());
    }

    #[test]
    fn tombstone_clears_current_value() {
        let mut history = MemoryHistory::new();
        let (c0, _) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        assert_eq!(current_value(&history, "e1").unwrap(), Some(json!("a")));
        commit_with(
            &mut history,
            vec![c0],
            2,
            vec![NewChange::delete("variant", "e1", "anna", 2)],
        );
        assert_eq!(current_value(&history, "e1").unwrap(), None);
    }

    #[test]
    fn change_pairs_show_before_and_after() {
        let mut history = MemoryHistory::new();
        let (c0, first) = commit_with(&mut history, vec![], 1, vec![set("e1", json!("a"), 1)]);
        let (c1, _) = commit_with(
            &mut history,
            vec![c0],
            2,
            vec![set("e1", json!("b"), 2), set("e2", json!("new"), 2)],
        );

        let pairs = change_pairs_for_commit(&history, &c1).unwrap();
        assert_eq!(pairs.len(), 2);
        let e1 = pairs.iter().find(|p| p.current.entity_id == "e1").unwrap();
        assert_eq!(e1.previous.as_ref(), Some(&first[0]));
        let e2 = pairs.iter().find(|p| p.current.entity_id == "e2").unwrap();
        assert!(e2.previous.is_none());

        assert!(
            change_pairs_for_commit(&history, &CommitId::new("ghost"))
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn commits_in_view_are_newest_first() {
        let mut history = MemoryHistory::new();
        let (c0, _) = commit_with(&mut history, vec![], 1, vec![]);
        let (c1, _) = commit_with(&mut history, vec![c0.clone()], 2, vec![]);
        let view = BranchView::active(&history).unwrap();
        let ids: Vec<CommitId> = commits_in_view(&history, &view)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![c1, c0]);
    }
}
