//! Merge-base finding on the commit graph.
//!
//! The merge base of two commits is the most recent commit that is an
//! ancestor of both (a commit counts as its own ancestor here). It is where
//! two branches diverged.
//!
//! # Algorithm
//!
//! Collect the common ancestors of both commits and keep those with no
//! common descendant ([`all_merge_bases`]). When merges leave several such
//! bases, the newest by `(created_at_us, id)` is the merge base.
//!
//! # Edge Cases
//!
//! - If one commit is an ancestor of the other, that ancestor is the base.
//! - If both commits are the same, it is its own base.
//! - Commits with disjoint roots have no base.

use std::collections::HashSet;

use super::graph::CommitGraph;
use crate::error::{LixError, RecordKind, Result};
use crate::model::CommitId;

fn require(graph: &CommitGraph, id: &CommitId) -> Result<()> {
    if graph.contains(id.as_str()) {
        Ok(())
    } else {
        Err(LixError::not_found(RecordKind::Commit, id))
    }
}

/// Find the merge base of `a` and `b`: the newest commit that is an
/// ancestor of both.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if either commit is not in the graph.
pub fn merge_base(graph: &CommitGraph, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>> {
    let bases = all_merge_bases(graph, a, b)?;
    Ok(bases.into_iter().max_by_key(|id| {
        let created_at_us = graph.commit(id.as_str()).map_or(i64::MIN, |c| c.created_at_us);
        (created_at_us, id.clone())
    }))
}

/// Every merge base of `a` and `b`: common ancestors with no common
/// descendant. Criss-cross merges can produce more than one. Sorted.
///
/// # Errors
///
/// Returns [`LixError::NotFound`] if either commit is not in the graph.
pub fn all_merge_bases(graph: &CommitGraph, a: &CommitId, b: &CommitId) -> Result<Vec<CommitId>> {
    require(graph, a)?;
    require(graph, b)?;

    if a == b {
        return Ok(vec![a.clone()]);
    }

    let mut ancestors_a = graph.ancestors(a.as_str());
    ancestors_a.insert(a.clone());
    let mut ancestors_b = graph.ancestors(b.as_str());
    ancestors_b.insert(b.clone());

    let common: HashSet<&CommitId> = ancestors_a.intersection(&ancestors_b).collect();
    let mut bases: Vec<CommitId> = common
        .iter()
        .filter(|candidate| {
            !graph
                .descendants(candidate.as_str())
                .iter()
                .any(|d| common.contains(d))
        })
        .map(|candidate| (*candidate).clone())
        .collect();
    bases.sort();
    Ok(bases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Commit;

    fn commit(id: &str, parents: &[&str], ts: i64) -> Commit {
        Commit {
            id: CommitId::new(id),
            parent_ids: parents.iter().map(|p| CommitId::new(*p)).collect(),
            author: "anna".into(),
            description: String::new(),
            created_at_us: ts,
        }
    }

    fn id(raw: &str) -> CommitId {
        CommitId::new(raw)
    }

    #[test]
    fn same_commit_is_its_own_base() {
        let graph = CommitGraph::from_commits(&[commit("c0", &[], 0)]);
        assert_eq!(merge_base(&graph, &id("c0"), &id("c0")).unwrap(), Some(id("c0")));
    }

    #[test]
    fn unknown_commit_is_not_found() {
        let graph = CommitGraph::from_commits(&[commit("c0", &[], 0)]);
        assert!(merge_base(&graph, &id("c0"), &id("x")).unwrap_err().is_not_found());
    }

    #[test]
    fn ancestor_is_the_base() {
        let graph =
            CommitGraph::from_commits(&[commit("c0", &[], 0), commit("c1", &["c0"], 1)]);
        assert_eq!(merge_base(&graph, &id("c0"), &id("c1")).unwrap(), Some(id("c0")));
        assert_eq!(merge_base(&graph, &id("c1"), &id("c0")).unwrap(), Some(id("c0")));
    }

    #[test]
    fn simple_fork() {
        let graph = CommitGraph::from_commits(&[
            commit("c0", &[], 0),
            commit("c1", &["c0"], 1),
            commit("a", &["c1"], 2),
            commit("b1", &["c1"], 3),
            commit("b2", &["b1"], 4),
        ]);
        assert_eq!(merge_base(&graph, &id("a"), &id("b2")).unwrap(), Some(id("c1")));
        assert_eq!(merge_base(&graph, &id("b2"), &id("a")).unwrap(), Some(id("c1")));
    }

    #[test]
    fn disjoint_roots_have_no_base() {
        let graph = CommitGraph::from_commits(&[commit("r1", &[], 0), commit("r2", &[], 1)]);
        assert_eq!(merge_base(&graph, &id("r1"), &id("r2")).unwrap(), None);
        assert!(all_merge_bases(&graph, &id("r1"), &id("r2")).unwrap().is_empty());
    }

    #[test]
    fn merge_parent_does_not_hide_newer_base() {
        // r -> p -> {y, z}; a = [r, y], b = [r, z]. Both tips name r directly,
        // but p is a newer common ancestor.
        let graph = CommitGraph::from_commits(&[
            commit("r", &[], 0),
            commit("p", &["r"], 1),
            commit("y", &["p"], 2),
            commit("z", &["p"], 3),
            commit("a", &["r", "y"], 4),
            commit("b", &["r", "z"], 5),
        ]);
        assert_eq!(all_merge_bases(&graph, &id("a"), &id("b")).unwrap(), vec![id("p")]);
        assert_eq!(merge_base(&graph, &id("a"), &id("b")).unwrap(), Some(id("p")));
        assert_eq!(merge_base(&graph, &id("b"), &id("a")).unwrap(), Some(id("p")));
    }

    #[test]
    fn criss_cross_picks_newest_base() {
        let graph = CommitGraph::from_commits(&[
            commit("c0", &[], 0),
            commit("a", &["c0"], 1),
            commit("b", &["c0"], 2),
            commit("m1", &["a", "b"], 3),
            commit("m2", &["b", "a"], 4),
        ]);
        assert_eq!(merge_base(&graph, &id("m1"), &id("m2")).unwrap(), Some(id("b")));
    }

    #[test]
    fn criss_cross_has_two_bases() {
        let graph = CommitGraph::from_commits(&[
            commit("c0", &[], 0),
            commit("a", &["c0"], 1),
            commit("b", &["c0"], 2),
            commit("m1", &["a", "b"], 3),
            commit("m2", &["b", "a"], 4),
        ]);
        assert_eq!(
            all_merge_bases(&graph, &id("m1"), &id("m2")).unwrap(),
            vec![id("a"), id("b")]
        );
    }
}
