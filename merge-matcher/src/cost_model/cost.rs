//! Exact cost terms of a candidate within a complete cover.

use std::collections::HashSet;

use super::cover::{CmMatching, CmMatchings};
use super::params::{CmParameters, Weigh};
use crate::artifact::{Artifact, Label};

impl<'t, T: Label, W: Weigh<T>> CmParameters<'t, T, W> {
    /// Exact cost of `matching` given the complete `cover` it is part of.
    pub(crate) fn exact_cost(&self, matching: &CmMatching<'t, T>, cover: &CmMatchings<'t, T>) -> f32 {
        let (Some(m), Some(n)) = (matching.m, matching.n) else {
            return self.weights.no_match();
        };

        self.renaming_cost(m, n)
            + self.ancestry_violation_cost(m, n, cover)
            + self.sibling_group_breakup_cost(m, n, cover)
            + self.ordering_cost(matching, cover)
    }

    pub(crate) fn renaming_cost(&self, m: Artifact<'t, T>, n: Artifact<'t, T>) -> f32 {
        if m.matches(&n) { 0.0 } else { self.weights.renaming(m, n) }
    }

    fn ancestry_violation_cost(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> f32 {
        let violations = self.ancestry_violating_children(m, n, cover) + self.ancestry_violating_children(n, m, cover);
        self.weights.ancestry(m, n, violations as f32)
    }

    /// Children of `m` whose partner is not a child of `n`.
    fn ancestry_violating_children(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> usize {
        m.children()
            .filter_map(|child| self.image(child, cover))
            .filter(|partner| !n.has_child(partner))
            .count()
    }

    fn sibling_group_breakup_cost(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> f32 {
        let ratio = self.breakup_ratio(m, n, cover) + self.breakup_ratio(n, m, cover);
        self.weights.sibling_breakup(m, n, ratio)
    }

    /// Divergent siblings of `m` relative to the invariant ones and the number
    /// of sibling families their partners are spread over.
    fn breakup_ratio(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> f32 {
        let invariant = self.sibling_invariant_subset(m, n, cover);
        let divergent = self
            .siblings(m, cover)
            .iter()
            .filter(|s| !invariant.contains(*s) && self.image(**s, cover).is_some())
            .count();

        if divergent == 0 {
            return 0.0;
        }

        let families = self.distinct_sibling_families(m, cover);
        divergent as f32 / (invariant.len() * families) as f32
    }

    /// Siblings of `m` whose partners are siblings of `n`.
    fn sibling_invariant_subset(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> Vec<Artifact<'t, T>> {
        let n_siblings = self.siblings(n, cover);
        self.siblings(m, cover)
            .iter()
            .copied()
            .filter(|s| self.image(*s, cover).is_some_and(|partner| n_siblings.contains(&partner)))
            .collect()
    }

    /// Number of distinct parents of the partners of `m`'s siblings. The
    /// cover roots count as one family of their own.
    fn distinct_sibling_families(&self, m: Artifact<'t, T>, cover: &CmMatchings<'t, T>) -> usize {
        self.siblings(m, cover)
            .iter()
            .filter_map(|s| self.image(*s, cover))
            .map(|partner| partner.parent().map(|p| p.id()))
            .collect::<HashSet<_>>()
            .len()
    }

    fn ordering_cost(&self, matching: &CmMatching<'t, T>, cover: &CmMatchings<'t, T>) -> f32 {
        let (Some(m), Some(n)) = (matching.m, matching.n) else {
            return 0.0;
        };

        let left_siblings = self.other_siblings(m, cover);
        let right_siblings = self.other_siblings(n, cover);
        let mut checked = HashSet::new();

        let violated = left_siblings
            .iter()
            .chain(right_siblings.iter())
            .filter_map(|s| self.matching_of(*s, cover))
            .filter(|c| !c.is_no_match() && checked.insert(c.key()))
            .any(|c| self.violates_ordering(c, matching, cover));

        if violated { self.weights.ordering(m, n) } else { 0.0 }
    }

    /// Whether the pairs `to_check` and `matching` appear in opposite
    /// relative order in the two trees. Pairs at the same relative position
    /// (one node is an ancestor of the other) never violate the order.
    pub(crate) fn violates_ordering(
        &self,
        to_check: &CmMatching<'t, T>,
        matching: &CmMatching<'t, T>,
        cover: &CmMatchings<'t, T>,
    ) -> bool {
        let (Some(cm), Some(cn), Some(m), Some(n)) = (to_check.m, to_check.n, matching.m, matching.n) else {
            return false;
        };

        let (lx, ly) = self.lca(cm, m, cover);
        let (rx, ry) = self.lca(cn, n, cover);
        let left_siblings = self.siblings(lx, cover);
        let right_siblings = self.siblings(rx, cover);

        let index = |group: &[Artifact<'t, T>], node: Artifact<'t, T>| {
            group.iter().position(|s| *s == node).map_or(-1, |i| i as isize)
        };

        let (left_x, left_y) = (index(left_siblings.as_slice(), lx), index(left_siblings.as_slice(), ly));
        let (right_x, right_y) = (index(right_siblings.as_slice(), rx), index(right_siblings.as_slice(), ry));

        match left_x.cmp(&left_y) {
            std::cmp::Ordering::Less => right_x > right_y,
            std::cmp::Ordering::Greater => right_x < right_y,
            std::cmp::Ordering::Equal => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::artifact::{ArtifactNode, Tree};
    use crate::config::CostModelConfig;
    use crate::cost_model::params::LinearWeights;

    type Node = ArtifactNode<&'static str>;

    fn node(label: &'static str, children: Vec<Node>) -> Node {
        ArtifactNode::new(label, children)
    }

    fn leaf(label: &'static str) -> Node {
        ArtifactNode::leaf(label)
    }

    fn params<'t>() -> CmParameters<'t, &'static str, LinearWeights> {
        CmParameters::new(Arc::new(LinearWeights::default()), &CostModelConfig::default())
    }

    fn cost_of<'t>(params: &CmParameters<'t, &'static str, LinearWeights>, cover: &CmMatchings<'t, &'static str>, index: usize) -> f32 {
        params.exact_cost(cover.get(index).unwrap(), cover)
    }

    #[test]
    fn test_identity_cover_is_free() {
        let left = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let right = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let (l, r) = (left.root(), right.root());

        let mut cover = CmMatchings::new(l, r);
        for (a, b) in left.iter().zip(right.iter()) {
            cover.push(CmMatching::pair(a, b));
        }

        let params = params();
        for i in 0..cover.len() {
            assert_eq!(cost_of(&params, &cover, i), 0.0);
        }
    }

    #[test]
    fn test_no_match_and_renaming() {
        let left = Tree::new(leaf("A"));
        let right = Tree::new(leaf("Z"));
        let (l, r) = (left.root(), right.root());

        let mut cover = CmMatchings::new(l, r);
        cover.push(CmMatching::pair(l, r));
        cover.push(CmMatching::new(Some(l), None));

        let params = params();
        assert_eq!(cost_of(&params, &cover, 0), 1.0);
        assert_eq!(cost_of(&params, &cover, 1), 1.0);
    }

    #[test]
    fn test_ancestry_violation_counts_both_sides() {
        // B moves from below A to below X.
        let left = Tree::new(node("R", vec![node("A", vec![leaf("B")]), leaf("X")]));
        let right = Tree::new(node("R", vec![leaf("A"), node("X", vec![leaf("B")])]));
        let (l, r) = (left.root(), right.root());
        let (la, lx) = (l.child(0).unwrap(), l.child(1).unwrap());
        let (ra, rx) = (r.child(0).unwrap(), r.child(1).unwrap());
        let (lb, rb) = (la.child(0).unwrap(), rx.child(0).unwrap());

        let cover = CmMatchings::with_entries(
            l,
            r,
            vec![
                CmMatching::pair(l, r),
                CmMatching::pair(la, ra),
                CmMatching::pair(lx, rx),
                CmMatching::pair(lb, rb),
            ],
        );
        let params = params();

        // A loses its child B to X.
        assert_eq!(params.ancestry_violation_cost(la, ra, &cover), 1.0);
        // X gains a child whose partner is not below X on the left.
        assert_eq!(params.ancestry_violation_cost(lx, rx, &cover), 1.0);
        assert_eq!(params.ancestry_violation_cost(l, r, &cover), 0.0);
    }

    #[test]
    fn test_swapped_siblings_violate_ordering() {
        let left = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let right = Tree::new(node("A", vec![leaf("C"), leaf("B")]));
        let (l, r) = (left.root(), right.root());
        let (lb, lc) = (l.child(0).unwrap(), l.child(1).unwrap());
        let (rc, rb) = (r.child(0).unwrap(), r.child(1).unwrap());

        let cover = CmMatchings::with_entries(
            l,
            r,
            vec![CmMatching::pair(l, r), CmMatching::pair(lb, rb), CmMatching::pair(lc, rc)],
        );
        let params = params();

        assert!(params.violates_ordering(cover.get(2).unwrap(), cover.get(1).unwrap(), &cover));
        assert_eq!(params.ordering_cost(cover.get(1).unwrap(), &cover), 1.0);
        assert_eq!(params.ordering_cost(cover.get(0).unwrap(), &cover), 0.0);
        // An ancestor and its descendant are never out of order.
        assert!(!params.violates_ordering(cover.get(0).unwrap(), cover.get(1).unwrap(), &cover));
    }

    #[test]
    fn test_sibling_breakup_ratio() {
        // B and C are siblings on the left but land in different families on
        // the right.
        let left = Tree::new(node("R", vec![node("P", vec![leaf("B"), leaf("C")])]));
        let right = Tree::new(node("R", vec![node("P", vec![leaf("B")]), node("Q", vec![leaf("C")])]));
        let (l, r) = (left.root(), right.root());
        let lp = l.child(0).unwrap();
        let (rp, rq) = (r.child(0).unwrap(), r.child(1).unwrap());
        let (lb, lc) = (lp.child(0).unwrap(), lp.child(1).unwrap());
        let (rb, rc) = (rp.child(0).unwrap(), rq.child(0).unwrap());

        let cover = CmMatchings::with_entries(
            l,
            r,
            vec![
                CmMatching::pair(l, r),
                CmMatching::pair(lp, rp),
                CmMatching::new(None, Some(rq)),
                CmMatching::pair(lb, rb),
                CmMatching::pair(lc, rc),
            ],
        );
        let params = params();

        // Left side of (B, B): C diverges, B is invariant, two families.
        assert_eq!(params.breakup_ratio(lb, rb, &cover), 0.5);
        // Right side: B's only sibling is itself.
        assert_eq!(params.breakup_ratio(rb, lb, &cover), 0.0);
        assert_eq!(params.sibling_group_breakup_cost(lb, rb, &cover), 0.5);
    }
}
