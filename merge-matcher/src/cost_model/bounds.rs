//! Cost bounds of a candidate within a partial candidate graph.
//!
//! While the cover is still being assembled the partner of a node is only
//! known to be one of the candidates still containing it. Each term is
//! therefore bounded by asking whether *every* remaining candidate (lower
//! bound) or *any* remaining candidate (upper bound) would incur it.

use super::cover::{Bounds, CmMatching, CmMatchings};
use super::params::{CmParameters, Weigh};
use crate::artifact::{Artifact, Label};

impl<'t, T: Label, W: Weigh<T>> CmParameters<'t, T, W> {
    pub(crate) fn bound_cost(&self, matching: &CmMatching<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let (Some(m), Some(n)) = (matching.m, matching.n) else {
            let wn = self.weights.no_match();
            return Bounds::new(wn, wn);
        };

        let renaming = self.renaming_cost(m, n);
        let ancestry = self.bound_ancestry_violation_cost(m, n, graph);
        let sibling = self.bound_sibling_group_breakup_cost(m, n, graph);
        let ordering = self.bound_ordering_cost(matching, graph);

        Bounds::new(
            renaming + ancestry.lower() + sibling.lower() + ordering.lower(),
            renaming + ancestry.upper() + sibling.upper() + ordering.upper(),
        )
    }

    /// Partners `child` may still end up with: `None` for "no match".
    fn candidate_partners<'g>(
        &'g self,
        child: Artifact<'t, T>,
        graph: &'g CmMatchings<'t, T>,
    ) -> impl Iterator<Item = Option<Artifact<'t, T>>> {
        let indices = self.containing(child, graph);
        (0..indices.len()).filter_map(move |k| graph.get(indices[k]).map(|c| c.other(child.id())))
    }

    fn bound_ancestry_violation_cost(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let count = |parent: Artifact<'t, T>, other: Artifact<'t, T>, upper: bool| {
            parent
                .children()
                .filter(|&child| self.ancestry_indicator(child, other, graph, upper))
                .count()
        };

        let lower = count(m, n, false) + count(n, m, false);
        let upper = count(m, n, true) + count(n, m, true);

        Bounds::new(
            self.weights.ancestry(m, n, lower as f32),
            self.weights.ancestry(m, n, upper as f32),
        )
    }

    /// Lower: every remaining partner of `child` violates ancestry with `n`.
    /// Upper: some remaining partner does.
    fn ancestry_indicator(&self, child: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>, upper: bool) -> bool {
        let mut partners = self.candidate_partners(child, graph);
        let violates = |partner: &Option<Artifact<'t, T>>| partner.is_some_and(|p| !n.has_child(&p));

        if upper {
            partners.any(|p| violates(&p))
        } else {
            partners.all(|p| violates(&p))
        }
    }

    fn bound_sibling_group_breakup_cost(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let (mn_lower, mn_upper) = self.bound_breakup_ratio(m, n, graph);
        let (nm_lower, nm_upper) = self.bound_breakup_ratio(n, m, graph);

        Bounds::new(
            self.weights.sibling_breakup(m, n, mn_lower + nm_lower),
            self.weights.sibling_breakup(m, n, (mn_upper + nm_upper) / 2.0),
        )
    }

    fn bound_breakup_ratio(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> (f32, f32) {
        let divergent = self.bound_distinct_siblings(m, n, graph);

        if divergent.lower() == 0.0 && divergent.upper() == 0.0 {
            return (0.0, 0.0);
        }

        let invariant = self.bound_invariant_siblings(m, n, graph);
        let lower = divergent.lower() / (invariant.upper() * (divergent.lower() + 1.0));
        let upper = divergent.upper() / invariant.lower();
        (lower, upper)
    }

    fn bound_distinct_siblings(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let others = self.other_siblings(m, graph);
        let count = |upper: bool| {
            others
                .iter()
                .filter(|&&sibling| self.distinct_sibling_indicator(sibling, n, graph, upper))
                .count() as f32
        };

        Bounds::new(count(false), count(true))
    }

    /// Lower: every remaining partner of `sibling` lies outside the siblings
    /// of `n`. Upper: some remaining partner does.
    fn distinct_sibling_indicator(&self, sibling: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>, upper: bool) -> bool {
        let n_others = self.other_siblings(n, graph);
        let mut partners = self.candidate_partners(sibling, graph);
        let diverges = |partner: &Option<Artifact<'t, T>>| partner.is_some_and(|p| !n_others.contains(&p));

        if upper {
            partners.any(|p| diverges(&p))
        } else {
            partners.all(|p| diverges(&p))
        }
    }

    /// Both bounds include `m` itself, which is invariant by construction.
    fn bound_invariant_siblings(&self, m: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let others = self.other_siblings(m, graph);
        let count = |upper: bool| {
            others
                .iter()
                .filter(|&&sibling| self.invariant_sibling_indicator(sibling, n, graph, upper))
                .count() as f32
        };

        Bounds::new(count(false) + 1.0, count(true) + 1.0)
    }

    fn invariant_sibling_indicator(&self, sibling: Artifact<'t, T>, n: Artifact<'t, T>, graph: &CmMatchings<'t, T>, upper: bool) -> bool {
        let n_others = self.other_siblings(n, graph);
        let mut partners = self.candidate_partners(sibling, graph);
        let stays = |partner: &Option<Artifact<'t, T>>| partner.is_some_and(|p| n_others.contains(&p));

        if upper {
            partners.any(|p| stays(&p))
        } else {
            partners.all(|p| stays(&p))
        }
    }

    fn bound_ordering_cost(&self, matching: &CmMatching<'t, T>, graph: &CmMatchings<'t, T>) -> Bounds {
        let (Some(m), Some(n)) = (matching.m, matching.n) else {
            return Bounds::default();
        };

        let left_others = self.other_siblings(m, graph);
        let right_others = self.other_siblings(n, graph);
        let siblings = || left_others.iter().chain(right_others.iter()).copied();
        let candidates = |sibling: Artifact<'t, T>| {
            let indices = self.containing(sibling, graph);
            (0..indices.len())
                .filter_map(|k| graph.get(indices[k]))
                .collect::<Vec<_>>()
        };

        let ordering_possible = siblings().all(|sibling| {
            candidates(sibling)
                .iter()
                .any(|c| c.is_no_match() || !self.violates_ordering(c, matching, graph))
        });

        let wo = self.weights.ordering(m, n);
        if !ordering_possible {
            return Bounds::new(wo, wo);
        }

        let violation_possible = siblings().any(|sibling| {
            candidates(sibling)
                .iter()
                .any(|c| !c.is_no_match() && self.violates_ordering(c, matching, graph))
        });

        Bounds::new(0.0, if violation_possible { wo } else { 0.0 })
    }
}
