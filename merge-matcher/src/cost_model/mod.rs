//! Whole-tree matching by cost minimization.
//!
//! Instead of recursing top-down, the cost-model matcher searches the space
//! of complete covers: every node of both trees is paired with exactly one
//! counterpart or with "no match". A cover's cost combines renaming,
//! ancestry violation, sibling group breakup and ordering terms (see
//! [`Weigh`]), normalized by the number of nodes.
//!
//! The search is a Metropolis walk. Each iteration keeps a random part of
//! the current cover fixed and completes the rest by repeatedly committing a
//! candidate edge drawn from the candidates sorted by their cost bounds,
//! with a geometric bias towards the cheapest. Proposals are accepted with
//! probability `min(1, exp(-beta * (cost_new - cost_current)))`. The lowest
//! cost cover seen is the result.

mod bounds;
mod cost;
pub mod cover;
pub mod params;

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::artifact::{Artifact, Label, NodeId};
use crate::config::CostModelConfig;
use crate::error::{MatchError, MatchResult};
use crate::matcher::MatcherInterface;
use crate::matching::{Algorithm, Matching, Matchings};

pub use cover::{Bounds, CmMatching, CmMatchings};
pub use params::{CmParameters, LinearWeights, Weigh};

/// Summary of the last cost-model run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostModelReport {
    pub iterations: usize,
    pub accepted: usize,
    pub initial_cost: f32,
    pub lowest_cost: f32,
    /// Lowest cost seen after each iteration.
    pub lowest_cost_trace: Vec<f32>,
}

pub struct CostModelMatcher<W = LinearWeights> {
    config: CostModelConfig,
    weights: Arc<W>,
    report: Option<CostModelReport>,
}

impl CostModelMatcher<LinearWeights> {
    /// A matcher using the constant weights of `config`.
    pub fn new(config: CostModelConfig) -> Self {
        let weights = LinearWeights::from(&config);
        Self::with_weights(config, weights)
    }
}

impl<W> CostModelMatcher<W> {
    pub fn with_weights(config: CostModelConfig, weights: W) -> Self {
        Self {
            config,
            weights: Arc::new(weights),
            report: None,
        }
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    pub fn report(&self) -> Option<&CostModelReport> {
        self.report.as_ref()
    }

    /// Matches `left` and `right` keeping the consistent part of `prefixed`
    /// (see [`Matchings::optimized`]) verbatim.
    pub fn match_with_prefixed<T>(
        &mut self,
        left: Artifact<'_, T>,
        right: Artifact<'_, T>,
        prefixed: &Matchings,
    ) -> MatchResult<Matchings>
    where
        T: Label,
        W: Weigh<T>,
    {
        let fixed = CmMatchings::with_entries(left, right, Self::resolve(left, right, &prefixed.optimized())?);
        let lowest = self.search(fixed)?;
        Ok(convert(&lowest))
    }

    /// Exact cost of an arbitrary set of matchings over `left` and `right`.
    /// Nodes without a matching are paired with "no match".
    pub fn cost_of<T>(&self, matchings: &Matchings, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<f32>
    where
        T: Label,
        W: Weigh<T>,
    {
        if matchings.is_empty() {
            return Ok(0.0);
        }

        let mut cover = CmMatchings::with_entries(left, right, Self::resolve(left, right, matchings)?);
        let covered: HashSet<NodeId> = cover.iter().flat_map(|c| [c.m, c.n]).flatten().map(|a| a.id()).collect();

        for l in left.dfs().into_iter().filter(|l| !covered.contains(&l.id())) {
            cover.push(CmMatching::new(Some(l), None));
        }
        for r in right.dfs().into_iter().filter(|r| !covered.contains(&r.id())) {
            cover.push(CmMatching::new(None, Some(r)));
        }

        let params = CmParameters::new(Arc::clone(&self.weights), &self.config);
        cost(&mut cover, &params)
    }

    /// Looks up the nodes of `matchings` in the two subtrees.
    fn resolve<'t, T>(
        left: Artifact<'t, T>,
        right: Artifact<'t, T>,
        matchings: &Matchings,
    ) -> MatchResult<Vec<CmMatching<'t, T>>> {
        let find = |root: Artifact<'t, T>, id: NodeId| {
            root.tree()
                .get(id)
                .filter(|node| root.subtree_contains(node))
                .ok_or(MatchError::UnknownNode(id))
        };

        matchings
            .iter()
            .map(|m| -> MatchResult<CmMatching<'t, T>> {
                Ok(CmMatching::pair(find(left, m.left())?, find(right, m.right())?))
            })
            .collect()
    }

    /// Runs the search with `prefixed` kept fixed and returns the lowest cost
    /// cover found.
    pub fn search<'t, T>(&mut self, prefixed: CmMatchings<'t, T>) -> MatchResult<CmMatchings<'t, T>>
    where
        T: Label,
        W: Weigh<T>,
    {
        self.config.validate()?;
        let (left, right) = (prefixed.left, prefixed.right);
        debug!(left = %left.id(), right = %right.id(), "Matching with the cost model");

        let mut params = CmParameters::new(Arc::clone(&self.weights), &self.config);

        let mut current = complete(&prefixed, &mut params, self.config.p_assign)?;
        let mut current_cost = cost(&mut current, &params)?;
        let mut lowest = current.clone();
        let mut report = CostModelReport {
            iterations: self.config.iterations,
            initial_cost: current_cost,
            lowest_cost: current_cost,
            ..Default::default()
        };

        for i in 0..self.config.iterations {
            let mut proposal = self.propose(&current, &prefixed, &mut params)?;
            let proposal_cost = cost(&mut proposal, &params)?;

            let probability = acceptance_probability(self.config.beta, current_cost, proposal_cost);
            let accept = params.rng.chance(probability);
            let improved = proposal_cost < report.lowest_cost;

            trace!(iteration = i, cost = proposal_cost, probability, accept, "Proposal evaluated");

            if improved {
                report.lowest_cost = proposal_cost;
                debug!(iteration = i, cost = proposal_cost, "New lowest cost");
            }

            match (accept, improved) {
                (true, true) => {
                    lowest = proposal.clone();
                    current = proposal;
                }
                (true, false) => current = proposal,
                (false, true) => lowest = proposal,
                (false, false) => {}
            }

            if accept {
                report.accepted += 1;
                current_cost = proposal_cost;
            }

            report.lowest_cost_trace.push(report.lowest_cost);
        }

        info!(
            iterations = report.iterations,
            accepted = report.accepted,
            initial = report.initial_cost,
            lowest = report.lowest_cost,
            "Cost model search finished"
        );

        self.report = Some(report);
        Ok(lowest)
    }

    /// Keeps part of the variable (not prefixed) candidates of `current` and
    /// completes the rest anew.
    fn propose<'t, T>(
        &self,
        current: &CmMatchings<'t, T>,
        prefixed: &CmMatchings<'t, T>,
        params: &mut CmParameters<'t, T, W>,
    ) -> MatchResult<CmMatchings<'t, T>>
    where
        T: Label,
        W: Weigh<T>,
    {
        let prefixed_keys = prefixed.keys();
        let mut variable: Vec<CmMatching<'t, T>> = current
            .iter()
            .filter(|c| !prefixed_keys.contains(&c.key()))
            .cloned()
            .collect();

        let keep = if self.config.fix_random_percentage {
            let lower = (self.config.fix_lower * variable.len() as f64) as usize;
            let upper = (self.config.fix_upper * variable.len() as f64) as usize;

            params.rng.shuffle(&mut variable);
            lower + (params.rng.next_f32() * (upper - lower + 1) as f32) as usize
        } else {
            variable.sort_by(|a, b| a.exact_cost().total_cmp(&b.exact_cost()));
            params.rng.below(variable.len())
        };

        variable.truncate(keep);
        trace!(kept = variable.len(), "Fixing variable matchings of the last iteration");

        let mut fixed = CmMatchings::with_entries(current.left, current.right, variable);
        for c in prefixed {
            fixed.push(c.clone());
        }

        complete(&fixed, params, self.config.p_assign)
    }
}

impl<T: Label, W: Weigh<T>> MatcherInterface<T> for CostModelMatcher<W> {
    fn match_nodes(&mut self, left: Artifact<'_, T>, right: Artifact<'_, T>) -> MatchResult<Matchings> {
        self.match_with_prefixed(left, right, &Matchings::new())
    }
}

/// `min(1, exp(-beta * cost_new) / exp(-beta * cost_current))`, computed in
/// log space.
fn acceptance_probability(beta: f64, current: f32, proposal: f32) -> f64 {
    (-beta * (f64::from(proposal) - f64::from(current))).exp().min(1.0)
}

/// Exact cost of a complete cover. Sets the exact cost of every candidate.
fn cost<'t, T, W>(cover: &mut CmMatchings<'t, T>, params: &CmParameters<'t, T, W>) -> MatchResult<f32>
where
    T: Label,
    W: Weigh<T>,
{
    cover.check_sane()?;

    if cover.is_empty() {
        return Ok(0.0);
    }

    let costs: Vec<f32> = {
        let frozen = &*cover;
        if params.parallel {
            frozen.as_slice().par_iter().map(|c| params.exact_cost(c, frozen)).collect()
        } else {
            frozen.iter().map(|c| params.exact_cost(c, frozen)).collect()
        }
    };
    params.clear_exact_caches();

    let mut sum = 0.0f64;
    for (candidate, cost) in cover.iter_mut().zip(costs) {
        candidate.set_exact_cost(cost);
        sum += f64::from(cost);
    }

    let size = cover.left.tree_size() + cover.right.tree_size();
    Ok((sum / size as f64) as f32)
}

/// Sets the bounds of every candidate of `graph`.
fn bound_cost<'t, T, W>(graph: &mut CmMatchings<'t, T>, params: &CmParameters<'t, T, W>)
where
    T: Label,
    W: Weigh<T>,
{
    trace!(candidates = graph.len(), "Bounding candidates");

    let bounds: Vec<Bounds> = {
        let frozen = &*graph;
        if params.parallel {
            frozen.as_slice().par_iter().map(|c| params.bound_cost(c, frozen)).collect()
        } else {
            frozen.iter().map(|c| params.bound_cost(c, frozen)).collect()
        }
    };
    params.clear_bound_caches();

    for (candidate, bounds) in graph.iter_mut().zip(bounds) {
        candidate.set_bounds(bounds);
    }
}

/// Extends `fixed` to a complete cover of its two subtrees.
fn complete<'t, T, W>(
    fixed: &CmMatchings<'t, T>,
    params: &mut CmParameters<'t, T, W>,
    p_assign: f64,
) -> MatchResult<CmMatchings<'t, T>>
where
    T: Label,
    W: Weigh<T>,
{
    let mut graph = CmMatchings::complete_bipartite(fixed.left, fixed.right, &mut params.rng);
    let mut result = fixed.clone();

    for c in fixed {
        graph.prune(c);
    }

    let mut fixed_keys = fixed.keys();
    let graph_keys = graph.keys();
    if let Some(stray) = fixed_keys.iter().find(|k| !graph_keys.contains(*k)) {
        return Err(MatchError::MalformedWorkingSet(format!(
            "fixed candidate {stray:?} conflicts with another fixed candidate or lies outside the trees"
        )));
    }

    while result.len() < graph.len() {
        bound_cost(&mut graph, params);
        graph.sort_by_bounds();

        let available: Vec<usize> = (0..graph.len())
            .filter(|&i| graph.get(i).is_some_and(|c| !fixed_keys.contains(&c.key())))
            .collect();

        if available.is_empty() {
            return Err(MatchError::MalformedWorkingSet(
                "no candidate left to complete the cover".to_string(),
            ));
        }

        let pick = loop {
            let i = params.rng.geometric(p_assign);
            if i < available.len() {
                break i;
            }
        };

        let Some(chosen) = graph.get(available[pick]).cloned() else {
            break;
        };

        trace!(candidate = ?chosen, bounds = ?chosen.bounds(), "Committing candidate");
        graph.prune(&chosen);
        fixed_keys.insert(chosen.key());
        result.push(chosen);
    }

    Ok(result)
}

/// Converts a cover to matchings. Every real pair is scored with the number
/// of nodes below (and including) its left node whose partner lies below
/// its right node.
fn convert<T>(cover: &CmMatchings<'_, T>) -> Matchings {
    let image = cover.as_map();

    cover
        .iter()
        .filter_map(|c| {
            let (m, n) = (c.m?, c.n?);
            let right_nodes: HashSet<NodeId> = n.dfs().iter().map(|a| a.id()).collect();
            let score = m
                .dfs()
                .iter()
                .filter(|a| image.get(&a.id()).is_some_and(|partner| right_nodes.contains(partner)))
                .count();
            Some(Matching::new(m.id(), n.id(), score, Algorithm::CostModel))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactNode, Tree};

    type Node = ArtifactNode<&'static str>;

    fn node(label: &'static str, children: Vec<Node>) -> Node {
        ArtifactNode::new(label, children)
    }

    fn leaf(label: &'static str) -> Node {
        ArtifactNode::leaf(label)
    }

    fn config(iterations: usize, seed: u64) -> CostModelConfig {
        CostModelConfig {
            iterations,
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn test_acceptance_probability() {
        assert_eq!(acceptance_probability(30.0, 0.5, 0.25), 1.0);
        assert_eq!(acceptance_probability(30.0, 0.5, 0.5), 1.0);
        let p = acceptance_probability(30.0, 0.0, 0.1);
        assert!((p - (-3.0f64).exp()).abs() < 1e-6);
        // No underflow to NaN for huge differences.
        assert_eq!(acceptance_probability(1e6, 0.0, 1e6), 0.0);
    }

    #[test]
    fn test_complete_produces_sane_cover() {
        let left = Tree::new(node("A", vec![leaf("B"), node("C", vec![leaf("D")])]));
        let right = Tree::new(node("A", vec![node("C", vec![leaf("D")]), leaf("E")]));
        let mut params = CmParameters::new(Arc::new(LinearWeights::default()), &CostModelConfig::default());

        for _ in 0..5 {
            let empty = CmMatchings::new(left.root(), right.root());
            let cover = complete(&empty, &mut params, 0.7).unwrap();
            assert!(cover.is_sane(), "{cover:?}");
        }
    }

    #[test]
    fn test_complete_keeps_fixed_candidates() {
        let left = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let right = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let (l, r) = (left.root(), right.root());
        let mut params = CmParameters::new(Arc::new(LinearWeights::default()), &CostModelConfig::default());

        let pinned = CmMatching::pair(l.child(0).unwrap(), r.child(1).unwrap());
        let fixed = CmMatchings::with_entries(l, r, vec![pinned.clone()]);
        let cover = complete(&fixed, &mut params, 0.7).unwrap();

        assert!(cover.is_sane());
        assert!(cover.iter().any(|c| *c == pinned));
    }

    #[test]
    fn test_conflicting_fixed_candidates_are_rejected() {
        let left = Tree::new(node("A", vec![leaf("B")]));
        let right = Tree::new(node("A", vec![leaf("B")]));
        let (l, r) = (left.root(), right.root());
        let mut params = CmParameters::new(Arc::new(LinearWeights::default()), &CostModelConfig::default());

        let fixed = CmMatchings::with_entries(
            l,
            r,
            vec![CmMatching::pair(l, r), CmMatching::pair(l, r.child(0).unwrap())],
        );
        assert!(matches!(complete(&fixed, &mut params, 0.7), Err(MatchError::MalformedWorkingSet(_))));
    }

    #[test]
    fn test_search_covers_every_node_and_never_worsens() {
        let left = Tree::new(node("R", vec![node("A", vec![leaf("x"), leaf("y")]), leaf("B"), leaf("C")]));
        let right = Tree::new(node("R", vec![leaf("C"), node("A", vec![leaf("y"), leaf("x")]), leaf("D")]));
        let mut matcher = CostModelMatcher::new(config(30, 7));

        let lowest = matcher
            .search(CmMatchings::new(left.root(), right.root()))
            .unwrap();
        assert!(lowest.is_sane());

        let report = matcher.report().unwrap();
        assert_eq!(report.lowest_cost_trace.len(), 30);
        assert!(report.lowest_cost <= report.initial_cost);
        assert!(report.lowest_cost_trace.windows(2).all(|w| w[1] <= w[0]));
        assert!(report.accepted <= 30);
    }

    #[test]
    fn test_same_seed_same_result() {
        let left = Tree::new(node("A", vec![leaf("B"), leaf("C"), leaf("D")]));
        let right = Tree::new(node("A", vec![leaf("D"), leaf("B"), leaf("E")]));

        let run = || {
            let mut matcher = CostModelMatcher::new(config(15, 99));
            let matchings = matcher.match_nodes(left.root(), right.root()).unwrap();
            let mut pairs: Vec<_> = matchings.iter().map(|m| (m.left(), m.right(), m.score())).collect();
            pairs.sort();
            (pairs, matcher.report().unwrap().clone())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_identical_trees_reach_zero_cost() {
        let left = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let right = Tree::new(node("A", vec![leaf("B"), leaf("C")]));
        let (l, r) = (left.root(), right.root());

        let identity: Matchings = left
            .iter()
            .zip(right.iter())
            .map(|(a, b)| Matching::new(a.id(), b.id(), 1, Algorithm::Ordered))
            .collect();

        let mut matcher = CostModelMatcher::new(config(5, 1));
        assert_eq!(matcher.cost_of(&identity, l, r).unwrap(), 0.0);

        let matchings = matcher.match_with_prefixed(l, r, &identity).unwrap();
        assert_eq!(matcher.report().unwrap().lowest_cost, 0.0);
        assert_eq!(matchings.get(l.id(), r.id()).unwrap().score(), 3);
        assert_eq!(matchings.len(), 3);
    }

    #[test]
    fn test_cost_of_completes_unmatched_nodes() {
        let left = Tree::new(node("A", vec![leaf("B")]));
        let right = Tree::new(node("A", vec![leaf("C")]));
        let (l, r) = (left.root(), right.root());
        let matcher = CostModelMatcher::new(CostModelConfig::default());

        let roots = Matchings::of(Matching::new(l.id(), r.id(), 1, Algorithm::Ordered));
        // (A, A) is free, B and C cost one each: 2 / 4.
        assert_eq!(matcher.cost_of(&roots, l, r).unwrap(), 0.5);
        assert_eq!(matcher.cost_of(&Matchings::new(), l, r).unwrap(), 0.0);

        let foreign = Matchings::of(Matching::new(r.id(), l.id(), 1, Algorithm::Ordered));
        assert!(matches!(matcher.cost_of(&foreign, l, r), Err(MatchError::UnknownNode(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let left = Tree::new(leaf("A"));
        let right = Tree::new(leaf("A"));
        let mut matcher = CostModelMatcher::new(CostModelConfig {
            p_assign: 1.5,
            ..Default::default()
        });

        let err = matcher.match_nodes(left.root(), right.root()).unwrap_err();
        assert!(matches!(err, MatchError::InvalidParameter { name: "p_assign", .. }));
    }

    #[test]
    fn test_parallel_passes_agree_with_sequential() {
        let left = Tree::new(node("A", vec![leaf("B"), node("C", vec![leaf("D")])]));
        let right = Tree::new(node("A", vec![node("C", vec![leaf("D")]), leaf("B")]));

        let run = |parallel: bool| {
            let mut matcher = CostModelMatcher::new(CostModelConfig {
                parallel,
                ..config(10, 3)
            });
            matcher.match_nodes(left.root(), right.root()).unwrap();
            matcher.report().unwrap().clone()
        };

        assert_eq!(run(true), run(false));
    }
}
