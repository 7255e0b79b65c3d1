//! In-memory commit graph with parent/descendant traversal.
//!
//! The [`CommitGraph`] indexes commits by id for parent lookup, descendant
//! traversal, and topological iteration.
//!
//! # Construction
//!
//! Commits can be inserted in any order; parent/child links are resolved as
//! commits arrive. Stores reject dangling parents on write, so a graph built
//! from a store is always closed under parent links.
//!
//! # Deduplication
//!
//! Inserting a commit whose id is already present is a no-op. Commits are
//! immutable, so the same id always carries the same record.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{Commit, CommitId};

// ---------------------------------------------------------------------------
// CommitNode
// ---------------------------------------------------------------------------

/// A node in the commit graph, storing the commit and its child links.
#[derive(Debug, Clone)]
pub struct CommitNode {
    pub commit: Commit,
    /// Ids of commits that list this one as a parent.
    pub children: Vec<CommitId>,
}

// ---------------------------------------------------------------------------
// CommitGraph
// ---------------------------------------------------------------------------

/// An in-memory DAG of commits, indexed by commit id.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    nodes: HashMap<CommitId, CommitNode>,
}

impl CommitGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a slice of commits.
    #[must_use]
    pub fn from_commits(commits: &[Commit]) -> Self {
        let mut graph = Self {
            nodes: HashMap::with_capacity(commits.len()),
        };
        for commit in commits {
            graph.insert(commit.clone());
        }
        graph
    }

    /// Insert a commit.
    ///
    /// Links the commit as a child of any parents already present, and adopts
    /// any already-present commits that list it as a parent.
    pub fn insert(&mut self, commit: Commit) {
        let id = commit.id.clone();
        if self.nodes.contains_key(&id) {
            return;
        }

        for parent in &commit.parent_ids {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.push(id.clone());
            }
        }

        // Out-of-order insertion: children that arrived first.
        let early_children: Vec<CommitId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.commit.parent_ids.contains(&id))
            .map(|(child, _)| child.clone())
            .collect();

        self.nodes.insert(
            id,
            CommitNode {
                commit,
                children: early_children,
            },
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CommitNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn commit(&self, id: &str) -> Option<&Commit> {
        self.nodes.get(id).map(|node| &node.commit)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All transitive parents of `id`, excluding `id` itself.
    ///
    /// BFS over parent links. Terminates because the graph is acyclic and
    /// every commit is visited at most once.
    #[must_use]
    pub fn ancestors(&self, id: &str) -> HashSet<CommitId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(node) = self.nodes.get(id) {
            queue.extend(node.commit.parent_ids.iter().cloned());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for parent in &node.commit.parent_ids {
                    if !visited.contains(parent) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }

        visited
    }

    /// All transitive children of `id`, excluding `id` itself.
    #[must_use]
    pub fn descendants(&self, id: &str) -> HashSet<CommitId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(node) = self.nodes.get(id) {
            queue.extend(node.children.iter().cloned());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for child in &node.children {
                    if !visited.contains(child) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }

        visited
    }

    /// Commits in causal order via Kahn's algorithm.
    ///
    /// Parents always precede children. Among commits that are ready at the
    /// same time, the earliest `(created_at_us, id)` goes first.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&Commit> {
        let mut in_degree: HashMap<&CommitId, usize> = HashMap::with_capacity(self.nodes.len());
        for (id, node) in &self.nodes {
            let parents_present = node
                .commit
                .parent_ids
                .iter()
                .filter(|p| self.nodes.contains_key(*p))
                .count();
            in_degree.insert(id, parents_present);
        }

        let order_key = |id: &CommitId| {
            self.nodes
                .get(id)
                .map(|node| (node.commit.created_at_us, id.clone()))
        };

        let mut ready: Vec<&CommitId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while !ready.is_empty() {
            // Keep `ready` sorted descending so the smallest key pops last.
            ready.sort_by_key(|id| std::cmp::Reverse(order_key(*id)));
            let Some(current) = ready.pop() else {
                break;
            };
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            result.push(&node.commit);

            for child in &node.children {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(child);
                    }
                }
            }
        }

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, parents: &[&str], ts: i64) -> Commit {
        Commit {
            id: CommitId::new(id),
            parent_ids: parents.iter().map(|p| CommitId::new(*p)).collect(),
            author: "anna".into(),
            description: format!("commit {id}"),
            created_at_us: ts,
        }
    }

    /// c0 → c1 → c2, plus c1 → c3 (a second line off c1).
    fn forked() -> CommitGraph {
        CommitGraph::from_commits(&[
            commit("c0", &[], 0),
            commit("c1", &["c0"], 1),
            commit("c2", &["c1"], 2),
            commit("c3", &["c1"], 3),
        ])
    }

    #[test]
    fn empty_graph() {
        let graph = CommitGraph::new();
        assert!(graph.is_empty());
        assert!(graph.ancestors("nope").is_empty());
    }

    #[test]
    fn ancestors_are_transitive_and_exclude_self() {
        let graph = forked();
        let ancestors = graph.ancestors("c2");
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains("c0"));
        assert!(ancestors.contains("c1"));
        assert!(!ancestors.contains("c2"));
        assert!(!ancestors.contains("c3"));
    }

    #[test]
    fn descendants_cover_both_lines() {
        let graph = forked();
        let desc = graph.descendants("c1");
        assert_eq!(desc.len(), 2);
        assert!(desc.contains("c2") && desc.contains("c3"));
    }

    #[test]
    fn merge_commit_reaches_both_parents() {
        let mut graph = forked();
        graph.insert(commit("m", &["c2", "c3"], 4));
        let ancestors = graph.ancestors("m");
        assert_eq!(ancestors.len(), 4);
    }

    #[test]
    fn out_of_order_insert_links_children() {
        let mut graph = CommitGraph::new();
        graph.insert(commit("c1", &["c0"], 1));
        graph.insert(commit("c0", &[], 0));
        assert_eq!(graph.get("c0").unwrap().children, vec![CommitId::new("c1")]);
        assert_eq!(graph.descendants("c0"), HashSet::from([CommitId::new("c1")]));
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let graph = CommitGraph::from_commits(&[
            commit("c3", &["c1"], 3),
            commit("c2", &["c1"], 2),
            commit("c1", &["c0"], 1),
            commit("c0", &[], 0),
        ]);
        let order: Vec<&str> = graph
            .topological_order()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(order, vec!["c0", "c1", "c2", "c3"]);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut graph = forked();
        graph.insert(commit("c1", &["c0"], 1));
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.get("c0").unwrap().children.len(), 1);
    }
}
