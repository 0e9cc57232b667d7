//! Working set of the cost-model search.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::artifact::{Artifact, NodeId};
use crate::error::{MatchError, MatchResult};
use crate::rng::Rng;

/// A (lower, upper) estimate of a candidate's cost, ordered by lower bound
/// first and upper bound second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    lower: f32,
    upper: f32,
}

impl Bounds {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    pub fn lower(&self) -> f32 {
        self.lower
    }

    pub fn upper(&self) -> f32 {
        self.upper
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.lower
            .total_cmp(&other.lower)
            .then_with(|| self.upper.total_cmp(&other.upper))
    }
}

impl PartialOrd for Bounds {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.total_cmp(other))
    }
}

/// Identity of a candidate pair.
pub type PairKey = (Option<NodeId>, Option<NodeId>);

/// A candidate pairing of a left node `m` with a right node `n`. A missing
/// side stands for "no match".
pub struct CmMatching<'t, T> {
    pub m: Option<Artifact<'t, T>>,
    pub n: Option<Artifact<'t, T>>,
    exact_cost: f32,
    bounds: Bounds,
}

impl<T> Clone for CmMatching<'_, T> {
    fn clone(&self) -> Self {
        Self {
            m: self.m,
            n: self.n,
            exact_cost: self.exact_cost,
            bounds: self.bounds,
        }
    }
}

impl<'t, T> CmMatching<'t, T> {
    pub fn new(m: Option<Artifact<'t, T>>, n: Option<Artifact<'t, T>>) -> Self {
        Self {
            m,
            n,
            exact_cost: 0.0,
            bounds: Bounds::default(),
        }
    }

    pub fn pair(m: Artifact<'t, T>, n: Artifact<'t, T>) -> Self {
        Self::new(Some(m), Some(n))
    }

    pub fn key(&self) -> PairKey {
        (self.m.map(|a| a.id()), self.n.map(|a| a.id()))
    }

    pub fn is_no_match(&self) -> bool {
        self.m.is_none() || self.n.is_none()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.m.is_some_and(|a| a.id() == node) || self.n.is_some_and(|a| a.id() == node)
    }

    /// The partner of `node`, `None` if it is paired with "no match" (or is
    /// not part of this candidate).
    pub fn other(&self, node: NodeId) -> Option<Artifact<'t, T>> {
        if self.m.is_some_and(|a| a.id() == node) {
            self.n
        } else if self.n.is_some_and(|a| a.id() == node) {
            self.m
        } else {
            None
        }
    }

    /// Whether `self` and `other` share a real node on the same side.
    pub fn conflicts_with(&self, other: &CmMatching<'_, T>) -> bool {
        let (m, n) = self.key();
        let (om, on) = other.key();
        (m.is_some() && m == om) || (n.is_some() && n == on)
    }

    pub fn exact_cost(&self) -> f32 {
        self.exact_cost
    }

    pub fn set_exact_cost(&mut self, cost: f32) {
        self.exact_cost = cost;
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }
}

impl<T> PartialEq for CmMatching<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<T> Eq for CmMatching<'_, T> {}

impl<T> fmt::Debug for CmMatching<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (m, n) = self.key();
        let side = |id: Option<NodeId>| id.map_or_else(|| "-".to_string(), |id| id.to_string());
        write!(f, "({}, {})", side(m), side(n))
    }
}

/// Candidate pairs over the subtrees rooted at `left` and `right`.
pub struct CmMatchings<'t, T> {
    pub left: Artifact<'t, T>,
    pub right: Artifact<'t, T>,
    entries: Vec<CmMatching<'t, T>>,
}

impl<T> Clone for CmMatchings<'_, T> {
    fn clone(&self) -> Self {
        Self {
            left: self.left,
            right: self.right,
            entries: self.entries.clone(),
        }
    }
}

impl<T> fmt::Debug for CmMatchings<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

impl<'t, T> CmMatchings<'t, T> {
    pub fn new(left: Artifact<'t, T>, right: Artifact<'t, T>) -> Self {
        Self {
            left,
            right,
            entries: Vec::new(),
        }
    }

    pub fn with_entries(left: Artifact<'t, T>, right: Artifact<'t, T>, entries: Vec<CmMatching<'t, T>>) -> Self {
        Self { left, right, entries }
    }

    /// Every left node times every right node, plus each node paired with
    /// "no match", in random order.
    pub fn complete_bipartite(left: Artifact<'t, T>, right: Artifact<'t, T>, rng: &mut Rng) -> Self {
        let left_nodes: Vec<_> = left.bfs().into_iter().map(Some).chain([None]).collect();
        let right_nodes: Vec<_> = right.bfs().into_iter().map(Some).chain([None]).collect();

        let mut entries = Vec::with_capacity(left_nodes.len() * right_nodes.len());
        for &m in &left_nodes {
            for &n in &right_nodes {
                if m.is_some() || n.is_some() {
                    entries.push(CmMatching::new(m, n));
                }
            }
        }

        rng.shuffle(&mut entries);
        Self::with_entries(left, right, entries)
    }

    pub fn push(&mut self, matching: CmMatching<'t, T>) {
        self.entries.push(matching);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CmMatching<'t, T>> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CmMatching<'t, T>> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, CmMatching<'t, T>> {
        self.entries.iter_mut()
    }

    pub fn as_slice(&self) -> &[CmMatching<'t, T>] {
        &self.entries
    }

    pub fn keys(&self) -> HashSet<PairKey> {
        self.entries.iter().map(CmMatching::key).collect()
    }

    pub fn sort_by_bounds(&mut self) {
        self.entries.sort_by(|a, b| a.bounds.total_cmp(&b.bounds));
    }

    /// Removes every candidate that shares a real node with `matching`,
    /// except `matching` itself.
    pub fn prune(&mut self, matching: &CmMatching<'t, T>) {
        self.entries.retain(|c| c == matching || !c.conflicts_with(matching));
    }

    /// Left-to-right image of every real pair.
    pub fn as_map(&self) -> HashMap<NodeId, NodeId> {
        self.entries
            .iter()
            .filter_map(|c| Some((c.m?.id(), c.n?.id())))
            .collect()
    }

    pub fn is_sane(&self) -> bool {
        self.check_sane().is_ok()
    }

    /// Verifies that every node of both subtrees occurs in exactly one
    /// candidate and that no candidate references a foreign node.
    pub fn check_sane(&self) -> MatchResult<()> {
        let malformed = |reason: String| Err(MatchError::MalformedWorkingSet(reason));
        let mut seen_left = HashSet::new();
        let mut seen_right = HashSet::new();

        for candidate in &self.entries {
            if candidate.m.is_none() && candidate.n.is_none() {
                return malformed("candidate without any node".to_string());
            }
            if let Some(m) = candidate.m {
                if !self.left.subtree_contains(&m) {
                    return malformed(format!("{} is not part of the left tree", m.id()));
                }
                if !seen_left.insert(m.id()) {
                    return malformed(format!("{} occurs more than once", m.id()));
                }
            }
            if let Some(n) = candidate.n {
                if !self.right.subtree_contains(&n) {
                    return malformed(format!("{} is not part of the right tree", n.id()));
                }
                if !seen_right.insert(n.id()) {
                    return malformed(format!("{} occurs more than once", n.id()));
                }
            }
        }

        if seen_left.len() != self.left.tree_size() || seen_right.len() != self.right.tree_size() {
            return malformed(format!(
                "{} of {} left and {} of {} right nodes are covered",
                seen_left.len(),
                self.left.tree_size(),
                seen_right.len(),
                self.right.tree_size()
            ));
        }

        Ok(())
    }
}

impl<'a, 't, T> IntoIterator for &'a CmMatchings<'t, T> {
    type Item = &'a CmMatching<'t, T>;
    type IntoIter = std::slice::Iter<'a, CmMatching<'t, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactNode, Tree};

    fn pair_trees() -> (Tree<&'static str>, Tree<&'static str>) {
        let left = Tree::new(ArtifactNode::new("A", vec![ArtifactNode::leaf("B")]));
        let right = Tree::new(ArtifactNode::new("A", vec![ArtifactNode::leaf("C"), ArtifactNode::leaf("B")]));
        (left, right)
    }

    #[test]
    fn test_bounds_order_lower_then_upper() {
        let mut bounds = vec![Bounds::new(1.0, 2.0), Bounds::new(0.5, 3.0), Bounds::new(1.0, 1.5)];
        bounds.sort_by(Bounds::total_cmp);
        assert_eq!(bounds, vec![Bounds::new(0.5, 3.0), Bounds::new(1.0, 1.5), Bounds::new(1.0, 2.0)]);
        assert!(Bounds::new(0.0, 9.0) < Bounds::new(0.1, 0.0));
    }

    #[test]
    fn test_complete_bipartite_graph_size() {
        let (left, right) = pair_trees();
        let mut rng = Rng::seed_from(5);
        let graph = CmMatchings::complete_bipartite(left.root(), right.root(), &mut rng);

        // (2 + 1) * (3 + 1) - 1 candidates, without the empty pair.
        assert_eq!(graph.len(), 11);
        assert!(graph.iter().all(|c| c.m.is_some() || c.n.is_some()));
        assert_eq!(graph.keys().len(), 11);
    }

    #[test]
    fn test_prune_removes_conflicting_candidates() {
        let (left, right) = pair_trees();
        let mut rng = Rng::seed_from(5);
        let mut graph = CmMatchings::complete_bipartite(left.root(), right.root(), &mut rng);

        let chosen = CmMatching::pair(left.root(), right.root());
        graph.prune(&chosen);

        assert!(graph.iter().any(|c| *c == chosen));
        assert!(graph.iter().filter(|c| **c != chosen).all(|c| !c.contains(left.root().id())));
        assert!(graph.iter().filter(|c| **c != chosen).all(|c| !c.contains(right.root().id())));
        // 2 * 3 - 1 remaining combinations of the other nodes, plus the chosen pair.
        assert_eq!(graph.len(), 6);
    }

    #[test]
    fn test_sanity_check() {
        let (left, right) = pair_trees();
        let (l, r) = (left.root(), right.root());
        let (lb, rc, rb) = (l.child(0).unwrap(), r.child(0).unwrap(), r.child(1).unwrap());

        let mut cover = CmMatchings::new(l, r);
        cover.push(CmMatching::pair(l, r));
        cover.push(CmMatching::pair(lb, rb));
        assert!(matches!(cover.check_sane(), Err(MatchError::MalformedWorkingSet(_))));

        cover.push(CmMatching::new(None, Some(rc)));
        assert!(cover.is_sane());
        assert_eq!(cover.as_map().get(&lb.id()), Some(&rb.id()));

        cover.push(CmMatching::new(Some(lb), None));
        assert!(!cover.is_sane());

        let mut foreign = CmMatchings::new(l, r);
        foreign.push(CmMatching::pair(r, l));
        assert!(!foreign.is_sane());
    }

    #[test]
    fn test_other_and_no_match() {
        let (left, right) = pair_trees();
        let (l, r) = (left.root(), right.root());
        let pair = CmMatching::pair(l, r);
        let alone = CmMatching::new(Some(l), None);

        assert_eq!(pair.other(l.id()), Some(r));
        assert_eq!(pair.other(r.id()), Some(l));
        assert!(!pair.is_no_match());
        assert!(alone.is_no_match());
        assert_eq!(alone.other(l.id()), None);
    }
}
