//! Unordered child matching.
//!
//! Children are paired as sets: every left child is compared with every
//! right child through the parent matcher, and the pairing maximizing the
//! summed child scores is found with the assignment solver. Only pairs with
//! a positive score contribute. The pair itself adds 1 if the two roots
//! match.

use std::time::Instant;

use tracing::trace;

use crate::artifact::{Artifact, Label};
use crate::assignment;
use crate::error::{MatchError, MatchResult};
use crate::matcher::MatcherInterface;
use crate::matching::{Algorithm, Matching, Matchings};

#[derive(Debug, Clone, Copy, Default)]
pub struct UnorderedMatcher;

impl UnorderedMatcher {
    /// Matches `left` and `right`, pairing their children as sets. Child
    /// pairs are matched through `parent`.
    ///
    /// Fails with [`MatchError::Unsolvable`] if the assignment solver does not
    /// produce a complete assignment.
    pub fn match_with<T, M>(&self, parent: &mut M, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings>
    where
        T: Label,
        M: MatcherInterface<T> + ?Sized,
    {
        let start = Instant::now();
        let (l_id, r_id) = (left.id(), right.id());

        // Differing roots still pair their children; the pair itself then
        // adds nothing to the score.
        let root = usize::from(left.matches(&right));

        if left.is_leaf() || right.is_leaf() {
            return Ok(Matchings::of(
                Matching::new(l_id, r_id, root, Algorithm::Unordered).with_runtime(start.elapsed()),
            ));
        }

        let mut cells: Vec<Vec<Option<Matchings>>> = Vec::with_capacity(left.num_children());
        let mut weights = Vec::with_capacity(left.num_children());

        for lc in left.children() {
            let mut cell_row = Vec::with_capacity(right.num_children());
            let mut weight_row = Vec::with_capacity(right.num_children());

            for rc in right.children() {
                let child = parent.match_nodes(lc, rc)?;
                weight_row.push(child.get(lc.id(), rc.id()).map_or(0, Matching::score));
                cell_row.push(Some(child));
            }

            cells.push(cell_row);
            weights.push(weight_row);
        }

        let solution = assignment::solve_max(&weights).map_err(|e| MatchError::Unsolvable {
            left: l_id,
            right: r_id,
            reason: e.to_string(),
        })?;

        let left_children: Vec<_> = left.children().collect();
        let right_children: Vec<_> = right.children().collect();
        let mut direct_children = Vec::new();
        let mut picked = Vec::new();

        for &(i, j) in &solution.pairs {
            if weights[i][j] == 0 {
                continue;
            }
            if let Some(child) = cells[i][j].take() {
                if let Some(direct) = child.get(left_children[i].id(), right_children[j].id()) {
                    direct_children.push(direct.shallow());
                }
                picked.push(child);
            }
        }

        let score = solution.objective + root;
        trace!(left = %l_id, right = %r_id, score, "Unordered match");

        let mut matchings = Matchings::of(
            Matching::new(l_id, r_id, score, Algorithm::Unordered)
                .with_children(direct_children)
                .with_runtime(start.elapsed()),
        );
        for child in picked {
            matchings.add_all(child);
        }

        Ok(matchings)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::artifact::{ArtifactNode, NodeId, Tree};
    use crate::matcher::Matcher;

    type Node = ArtifactNode<&'static str>;

    fn leaves(labels: &[&'static str]) -> Vec<Node> {
        labels.iter().map(|&l| ArtifactNode::leaf(l)).collect()
    }

    /// Answers child comparisons from a fixed table keyed by child positions.
    struct Scripted {
        left: Vec<NodeId>,
        right: Vec<NodeId>,
        scores: HashMap<(usize, usize), usize>,
    }

    impl<T: Label> MatcherInterface<T> for Scripted {
        fn match_nodes(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
            let i = self.left.iter().position(|&id| id == left.id()).unwrap();
            let j = self.right.iter().position(|&id| id == right.id()).unwrap();
            let score = self.scores.get(&(i, j)).copied().unwrap_or(0);
            Ok(Matchings::of(Matching::new(left.id(), right.id(), score, Algorithm::Unordered)))
        }
    }

    fn scripted(left: &Tree<&'static str>, right: &Tree<&'static str>, scores: &[((usize, usize), usize)]) -> Scripted {
        Scripted {
            left: left.root().children().map(|c| c.id()).collect(),
            right: right.root().children().map(|c| c.id()).collect(),
            scores: scores.iter().copied().collect(),
        }
    }

    #[test]
    fn test_swapped_children_are_all_matched() {
        let left = Tree::new(ArtifactNode::new("A", leaves(&["B", "C"])));
        let right = Tree::new(ArtifactNode::new("A", leaves(&["C", "B"])));
        let mut parent = Matcher::default();

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        let root = matchings.get(left.root().id(), right.root().id()).unwrap();

        assert_eq!(root.score(), 3);
        assert_eq!(root.children().len(), 2);
        assert_eq!(matchings.len(), 3);
    }

    #[test]
    fn test_assignment_maximizes_total_score() {
        // A greedy pick of the single best cell (0, 0) = 5 would force
        // (1, 1) = 0; the optimum is (0, 1) + (1, 0) = 4 + 4.
        let left = Tree::new(ArtifactNode::new("A", leaves(&["p", "q"])));
        let right = Tree::new(ArtifactNode::new("A", leaves(&["r", "s"])));
        let mut parent = scripted(&left, &right, &[((0, 0), 5), ((0, 1), 4), ((1, 0), 4)]);

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        let root = matchings.get(left.root().id(), right.root().id()).unwrap();

        assert_eq!(root.score(), 9);
        assert_eq!(root.children().len(), 2);
        assert!(matchings.get(left.root().child(0).unwrap().id(), right.root().child(0).unwrap().id()).is_none());
    }

    #[test]
    fn test_zero_weight_assignments_are_dropped() {
        let left = Tree::new(ArtifactNode::new("A", leaves(&["p", "q"])));
        let right = Tree::new(ArtifactNode::new("A", leaves(&["r", "s", "t"])));
        let mut parent = scripted(&left, &right, &[((1, 2), 2)]);

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        let root = matchings.get(left.root().id(), right.root().id()).unwrap();

        assert_eq!(root.score(), 3);
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].left(), left.root().child(1).unwrap().id());
        assert_eq!(matchings.len(), 2);
    }

    #[test]
    fn test_renamed_root_still_pairs_children() {
        let left = Tree::new(ArtifactNode::new("A", leaves(&["B", "C"])));
        let right = Tree::new(ArtifactNode::new("Z", leaves(&["C", "B"])));
        let mut parent = Matcher::default();

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        let root = matchings.get(left.root().id(), right.root().id()).unwrap();

        assert_eq!(root.score(), 2);
        assert_eq!(root.children().len(), 2);
        assert_eq!(matchings.len(), 3);
        let (lb, rb) = (left.root().child(0).unwrap(), right.root().child(1).unwrap());
        assert_eq!(matchings.get(lb.id(), rb.id()).unwrap().score(), 1);
    }

    #[test]
    fn test_differing_leaf_scores_zero() {
        let left = Tree::new(ArtifactNode::new("A", leaves(&["B"])));
        let right = Tree::new(ArtifactNode::leaf("Z"));
        let mut parent = Matcher::default();

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        assert_eq!(matchings.get(left.root().id(), right.root().id()).unwrap().score(), 0);
    }

    #[test]
    fn test_leaf_on_one_side_scores_one() {
        let left = Tree::new(ArtifactNode::new("A", leaves(&["B"])));
        let right = Tree::new(ArtifactNode::leaf("A"));
        let mut parent = Matcher::default();

        let matchings = UnorderedMatcher.match_with(&mut parent, left.root(), right.root()).unwrap();
        assert_eq!(matchings.len(), 1);
        assert_eq!(matchings.get(left.root().id(), right.root().id()).unwrap().score(), 1);
    }
}
